//! Error types for the messaging engine and sessions.

use std::any::Any;
use std::time::Duration;

use swm_protocol::{EnvelopeError, ErrorResponse};
use thiserror::Error;

/// Boxed error produced by user code (listeners, resource codecs).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for swm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while servicing inbound messages, sending outbound ones, or
/// driving a session.
///
/// Inbound failures never escape [`MessageHandler::handle_inbound_message`];
/// they are turned into error responses whose `errorType` comes from
/// [`Error::error_type`].
///
/// [`MessageHandler::handle_inbound_message`]: crate::MessageHandler::handle_inbound_message
#[derive(Error, Debug)]
pub enum Error {
    /// Unparsable JSON or a required field is missing.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Recognized envelope, unrecognized `messageType`.
    #[error("Unknown messageType: {0}")]
    UnknownMessageType(String),

    /// An embedded resource could not be decoded or encoded.
    #[error("Failed to process {field} resource: {source}")]
    ResourceDecode {
        field: &'static str,
        #[source]
        source: BoxError,
    },

    /// A registered listener returned an error or panicked.
    #[error("Listener failed: {0}")]
    HandlerFailure(String),

    /// No handshake arrived within the configured window.
    #[error("Handshake timeout after {0:?}")]
    HandshakeTimeout(Duration),

    /// Outbound send attempted before a transport was wired.
    #[error("MessageSender must be set before sending messages")]
    TransportNotConfigured,

    /// The transport refused or failed to deliver a message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A queued outbound message was dropped because the document navigated
    /// away before its handshake.
    #[error("Message discarded: the document navigated before it was delivered")]
    Discarded,

    /// The session was closed while the operation was pending.
    #[error("Session closed")]
    SessionClosed,

    /// A reply channel was dropped before a result arrived.
    #[error("Channel closed before a result was delivered")]
    ChannelClosed,

    /// A session was started outside a Tokio runtime.
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid launch context: {0}")]
    InvalidLaunchContext(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EnvelopeError> for Error {
    fn from(err: EnvelopeError) -> Self {
        Error::MalformedEnvelope(err.to_string())
    }
}

impl Error {
    /// Stable name used as `errorType` in error responses.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::MalformedEnvelope(_) => "MalformedEnvelopeException",
            Error::UnknownMessageType(_) => "UnknownMessageTypeException",
            Error::ResourceDecode { .. } => "ResourceDecodeException",
            Error::HandlerFailure(_) => "HandlerFailureException",
            Error::HandshakeTimeout(_) => "TimeoutException",
            Error::TransportNotConfigured | Error::NoRuntime(_) => "IllegalStateException",
            Error::Transport(_) => "TransportException",
            Error::Discarded => "DiscardedException",
            Error::SessionClosed | Error::ChannelClosed => "ClosedException",
            Error::InvalidConfig(_) | Error::InvalidLaunchContext(_) => {
                "IllegalArgumentException"
            }
            Error::Json(_) => "JsonProcessingException",
            Error::Io(_) => "IOException",
        }
    }

    /// Wire payload describing this error.
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.to_string(), self.error_type())
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_message_type_names_the_offending_type() {
        let response = Error::UnknownMessageType("unknown.type".into()).to_error_response();
        assert_eq!(response.error_type, "UnknownMessageTypeException");
        assert!(response.error_message.contains("unknown.type"));
    }

    #[test]
    fn envelope_errors_are_malformed_envelopes() {
        let err: Error = EnvelopeError::MissingField("messageId").into();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
        assert_eq!(err.error_type(), "MalformedEnvelopeException");
        assert!(err.to_string().contains("messageId is required"));
    }

    #[test]
    fn panic_payloads_are_described() {
        assert_eq!(panic_message(Box::new("bad")), "panic: bad");
        assert_eq!(panic_message(Box::new(String::from("worse"))), "panic: worse");
        assert_eq!(panic_message(Box::new(7_u8)), "panic");
    }
}
