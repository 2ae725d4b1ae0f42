//! Transport seams between the engine and the embedded document.
//!
//! Two traits live here:
//!
//! * [`MessageSender`]: how the engine hands a serialized outbound envelope
//!   to whatever delivers it. The returned future resolves once the message
//!   is acknowledged by the transport, not when the document replies.
//! * [`EmbeddedBrowser`]: the adapter a session drives. It loads URLs, runs
//!   scripts, forwards document messages to a registered handler and reports
//!   page loads.
//!
//! [`fake`] provides an in-memory browser for tests.

pub mod fake;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

/// Opaque value a transport may return when a send is acknowledged.
pub type Acknowledgment = Option<String>;

/// Future returned by [`MessageSender::send`].
pub type SendFuture = Pin<Box<dyn Future<Output = Result<Acknowledgment>> + Send + 'static>>;

/// Delivers serialized outbound envelopes.
pub trait MessageSender: Send + Sync {
    fn send(&self, message: String) -> SendFuture;
}

impl<F, Fut> MessageSender for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Acknowledgment>> + Send + 'static,
{
    fn send(&self, message: String) -> SendFuture {
        Box::pin(self(message))
    }
}

/// Called with each raw message the document sends. The returned string, if
/// any, is the reply the adapter passes back to the document.
pub type IncomingHandler = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Called each time the main frame finishes loading.
pub type PageLoadListener = Arc<dyn Fn() + Send + Sync>;

/// Adapter around a browser component that hosts the form document.
pub trait EmbeddedBrowser: Send + Sync {
    /// Short adapter name, used in traces.
    fn name(&self) -> &str;

    fn load_url(&self, url: &str) -> Result<()>;

    fn execute_script(&self, script: &str) -> Result<()>;

    /// Replaces the handler that receives document-originated messages.
    fn set_incoming_handler(&self, handler: IncomingHandler);

    /// Pushes a host message into the document.
    ///
    /// The default implementation calls `window.swmReceiveMessage` with the
    /// message as an escaped single-quoted string literal.
    fn send_message(&self, message: &str) -> SendFuture {
        let result = self
            .execute_script(&receive_message_script(message))
            .map(|()| None);
        Box::pin(std::future::ready(result))
    }

    /// The listener may fire once per navigation.
    fn add_page_load_listener(&self, listener: PageLoadListener);

    /// Disposes the browser. May block.
    fn close(&self);
}

/// Script that hands `message` to the document's receive hook.
pub fn receive_message_script(message: &str) -> String {
    format!("window.swmReceiveMessage('{}');", escape_js_string(message))
}

/// Escapes text for a single-quoted JavaScript string literal.
fn escape_js_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            '\0' => escaped.push_str("\\u0000"),
            other => escaped.push(other),
        }
    }
    escaped
}
