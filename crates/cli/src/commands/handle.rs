use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use swm::{
	CloseApplication, FormSubmitted, HandshakeReceived, JsonResource, JsonResourceCodec, ListenerResult,
	MessageHandler, MessageListener,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::error::Result;

/// Logs every engine event.
struct EventLog;

impl MessageListener<JsonResource> for EventLog {
	fn on_handshake_received(&self, event: &HandshakeReceived) -> ListenerResult {
		info!(target = "swm", message_id = %event.message_id, "handshake received");
		Ok(())
	}

	fn on_form_submitted(&self, event: &FormSubmitted<JsonResource>) -> ListenerResult {
		info!(
			target = "swm",
			message_id = %event.message_id,
			response_id = event.response.id().unwrap_or_default(),
			outcome = event.outcome.is_some(),
			"form submitted"
		);
		Ok(())
	}

	fn on_close_application(&self, event: &CloseApplication) -> ListenerResult {
		info!(target = "swm", message_id = %event.message_id, "close requested");
		Ok(())
	}
}

pub async fn execute(file: Option<&Path>) -> Result<()> {
	let handler = MessageHandler::new(JsonResourceCodec);
	handler.add_listener(Arc::new(EventLog));
	let mut stdout = tokio::io::stdout();

	let replies = match file {
		Some(path) => {
			let input = tokio::fs::File::open(path)
				.await
				.with_context(|| format!("failed to open {}", path.display()))?;
			run(&handler, input, &mut stdout).await?
		}
		None => run(&handler, tokio::io::stdin(), &mut stdout).await?,
	};

	info!(target = "swm", replies, "input exhausted");
	Ok(())
}

/// Passes each non-blank input line through the engine and writes one reply
/// line per reply. Returns the number of replies written.
pub async fn run<R, W>(handler: &MessageHandler<JsonResourceCodec>, input: R, output: &mut W) -> Result<usize>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut lines = BufReader::new(input).lines();
	let mut replies = 0;

	while let Some(line) = lines.next_line().await? {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		match handler.handle_inbound_message(line) {
			Some(reply) => {
				output.write_all(reply.as_bytes()).await?;
				output.write_all(b"\n").await?;
				replies += 1;
			}
			None => debug!(target = "swm", "no reply"),
		}
	}

	output.flush().await?;
	Ok(replies)
}
