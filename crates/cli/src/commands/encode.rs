use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use serde_json::Value;
use swm::protocol::Reference;
use swm::{
	Acknowledgment, Dispatch, FormContext, JsonResource, JsonResourceCodec, LaunchContextEntry, MessageHandler,
	QuestionnaireRef,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::EncodeKind;
use crate::error::{CliError, Result};

pub async fn execute(kind: EncodeKind) -> Result<()> {
	let envelope = encode(kind).await?;
	println!("{envelope}");
	Ok(())
}

/// Builds the envelope for `kind` through the engine's typed sends.
pub async fn encode(kind: EncodeKind) -> Result<String> {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let handler = MessageHandler::new(JsonResourceCodec);
	handler.set_message_sender(Arc::new(move |message: String| {
		let _ = tx.send(message);
		std::future::ready(Ok::<Acknowledgment, swm::Error>(None))
	}));

	let dispatch = send(&handler, kind)?;
	info!(target = "swm", message_id = dispatch.message_id(), "encoded");
	dispatch.await?;

	rx.recv()
		.await
		.ok_or_else(|| CliError::Anyhow(anyhow!("engine produced no envelope")))
}

fn send(handler: &MessageHandler<JsonResourceCodec>, kind: EncodeKind) -> Result<Dispatch> {
	let dispatch = match kind {
		EncodeKind::RequestSubmit => handler.send_form_request_submit(None)?,
		EncodeKind::Persist => handler.send_form_persist(None)?,
		EncodeKind::Configure {
			terminology_server,
			data_server,
			configuration,
		} => {
			let configuration = configuration
				.map(|raw| {
					serde_json::from_str::<Value>(&raw).map_err(|source| CliError::Json {
						what: "--configuration".into(),
						source,
					})
				})
				.transpose()?;
			handler.send_sdc_configure(terminology_server.as_deref(), data_server.as_deref(), configuration, None)?
		}
		EncodeKind::DisplayQuestionnaire {
			canonical,
			questionnaire_file,
			response_file,
			subject,
			author,
			encounter,
			launch_context,
		} => {
			let questionnaire = match (canonical, questionnaire_file) {
				(_, Some(path)) => QuestionnaireRef::Resource(read_resource(&path)?),
				(Some(url), None) => QuestionnaireRef::Canonical(url),
				(None, None) => return Err(anyhow!("a questionnaire is required").into()),
			};
			let response = response_file.as_deref().map(read_resource).transpose()?;
			let context = FormContext {
				subject: subject.as_deref().map(parse_reference),
				author: author.as_deref().map(parse_reference),
				encounter: encounter.as_deref().map(parse_reference),
				launch_context: launch_context
					.iter()
					.map(|arg| parse_launch_context(arg))
					.collect::<Result<_>>()?,
			};
			handler.send_sdc_display_questionnaire(&questionnaire, response.as_ref(), &context, None)?
		}
	};
	Ok(dispatch)
}

fn read_resource(path: &Path) -> Result<JsonResource> {
	let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
	let value = serde_json::from_str::<Value>(&raw).map_err(|source| CliError::Json {
		what: path.display().to_string(),
		source,
	})?;
	JsonResource::new(value).map_err(|err| anyhow!("{}: {err}", path.display()).into())
}

/// `Patient/123` becomes a reference typed `Patient`.
fn parse_reference(raw: &str) -> Reference {
	match raw.split_once('/') {
		Some((resource_type, _)) if !resource_type.is_empty() && !resource_type.contains(':') => {
			Reference::new(raw).with_type(resource_type)
		}
		_ => Reference::new(raw),
	}
}

fn parse_launch_context(arg: &str) -> Result<LaunchContextEntry<JsonResource>> {
	let (name, reference) = arg
		.split_once('=')
		.ok_or_else(|| CliError::LaunchContextArg(arg.to_string()))?;
	Ok(LaunchContextEntry::reference(name, parse_reference(reference))?)
}
