//! Request and response envelopes.
//!
//! Format of a request sent by either party:
//! ```json
//! {
//!   "messageId": "6f0f7a4e-…",
//!   "messagingHandle": "smart-web-messaging",
//!   "messageType": "status.handshake",
//!   "payload": {}
//! }
//! ```
//!
//! Format of a response:
//! ```json
//! {
//!   "messageId": "a81c…",
//!   "responseToMessageId": "6f0f7a4e-…",
//!   "additionalResponsesExpected": false,
//!   "payload": {}
//! }
//! ```
//!
//! There is no type tag. A message is a response if and only if its text
//! contains the quoted key `"responseToMessageId"` anywhere, nested or not.
//! Documents rely on this textual rule, so it is kept as is.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::EnvelopeError;
use crate::payload::{ErrorResponse, ResponsePayload};

/// Key whose quoted presence anywhere in the text marks a response.
pub const RESPONSE_DISCRIMINATOR: &str = "responseToMessageId";

const QUOTED_DISCRIMINATOR: &str = "\"responseToMessageId\"";

/// A request: asks the other party to do something and reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub message_id: String,
    pub messaging_handle: String,
    pub message_type: String,
    /// Shape depends on `message_type`; decoded by the payload codec.
    #[serde(default = "empty_object", deserialize_with = "null_as_empty_object")]
    pub payload: Value,
}

/// A reply to an earlier request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub message_id: String,
    /// `None` only when the request being answered could not be identified.
    /// Serialized as an explicit `null` in that case.
    pub response_to_message_id: Option<String>,
    #[serde(default)]
    pub additional_responses_expected: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: ResponsePayload,
}

impl Response {
    /// Final reply with an empty success payload.
    pub fn empty_success(message_id: impl Into<String>, response_to: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            response_to_message_id: Some(response_to.into()),
            additional_responses_expected: false,
            payload: ResponsePayload::default(),
        }
    }

    /// Final reply carrying an error payload.
    pub fn error(
        message_id: impl Into<String>,
        response_to: Option<String>,
        error: ErrorResponse,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            response_to_message_id: response_to,
            additional_responses_expected: false,
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }
}

/// Either shape of message, as read off the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(Request),
    Response(Response),
}

impl Envelope {
    /// Parses raw text into an envelope, applying the discrimination rule and
    /// required-field checks.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(raw).map_err(EnvelopeError::Syntax)?;
        Self::classify(value, is_response_text(raw))
    }

    /// Same as [`Envelope::parse`] for an already decoded JSON value. The
    /// rule is applied to the value's serialized text.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let is_response = is_response_text(&value.to_string());
        Self::classify(value, is_response)
    }

    fn classify(value: Value, is_response: bool) -> Result<Self, EnvelopeError> {
        let Value::Object(object) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        require_string(&object, "messageId")?;

        if is_response {
            serde_json::from_value(Value::Object(object))
                .map(Envelope::Response)
                .map_err(EnvelopeError::Invalid)
        } else {
            require_string(&object, "messagingHandle")?;
            require_string(&object, "messageType")?;
            serde_json::from_value(Value::Object(object))
                .map(Envelope::Request)
                .map_err(EnvelopeError::Invalid)
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            Envelope::Request(request) => &request.message_id,
            Envelope::Response(response) => &response.message_id,
        }
    }
}

fn is_response_text(raw: &str) -> bool {
    raw.contains(QUOTED_DISCRIMINATOR)
}

fn require_string(object: &Map<String, Value>, field: &'static str) -> Result<(), EnvelopeError> {
    match object.get(field) {
        Some(Value::String(_)) => Ok(()),
        _ => Err(EnvelopeError::MissingField(field)),
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn null_as_empty_object<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(if value.is_null() { empty_object() } else { value })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_discriminator_is_a_request() {
        let raw =
            r#"{"messageId":"m1","messagingHandle":"h","messageType":"ui.done","payload":{}}"#;
        match Envelope::parse(raw).unwrap() {
            Envelope::Request(request) => {
                assert_eq!(request.message_id, "m1");
                assert_eq!(request.messaging_handle, "h");
                assert_eq!(request.message_type, "ui.done");
                assert_eq!(request.payload, json!({}));
            }
            other => panic!("Expected Request, got {other:?}"),
        }
    }

    #[test]
    fn discriminator_key_alone_selects_response() {
        // A null value still counts: presence of the key is what matters.
        let raw = r#"{"messageId":"m2","responseToMessageId":null,"payload":{}}"#;
        match Envelope::parse(raw).unwrap() {
            Envelope::Response(response) => {
                assert_eq!(response.message_id, "m2");
                assert_eq!(response.response_to_message_id, None);
                assert!(!response.additional_responses_expected);
            }
            other => panic!("Expected Response, got {other:?}"),
        }
    }

    #[test]
    fn nested_discriminator_selects_response() {
        let raw = json!({
            "messageId": "m3",
            "messagingHandle": "smart-web-messaging",
            "messageType": "status.handshake",
            "payload": { "note": { "responseToMessageId": "nested" } }
        });
        match Envelope::parse(&raw.to_string()).unwrap() {
            Envelope::Response(response) => {
                assert_eq!(response.message_id, "m3");
                assert_eq!(response.response_to_message_id, None);
            }
            other => panic!("Expected Response, got {other:?}"),
        }
        assert!(matches!(Envelope::from_value(raw).unwrap(), Envelope::Response(_)));
    }

    #[test]
    fn missing_required_fields_are_reported_by_name() {
        let err = Envelope::parse(r#"{"messagingHandle":"h","messageType":"x"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingField("messageId")));

        let err = Envelope::parse(r#"{"messageId":"m","messageType":"x"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingField("messagingHandle")));

        let err = Envelope::parse(r#"{"messageId":"m","messagingHandle":"h"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingField("messageType")));

        let err = Envelope::parse(r#"{"responseToMessageId":"x"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingField("messageId")));
    }

    #[test]
    fn syntax_and_shape_errors() {
        assert!(matches!(
            Envelope::parse("{ invalid").unwrap_err(),
            EnvelopeError::Syntax(_)
        ));
        assert!(matches!(
            Envelope::parse("[1,2]").unwrap_err(),
            EnvelopeError::NotAnObject
        ));
    }

    #[test]
    fn missing_or_null_request_payload_is_empty_object() {
        let raw =
            r#"{"messageId":"m","messagingHandle":"h","messageType":"ui.done","payload":null}"#;
        let Envelope::Request(request) = Envelope::parse(raw).unwrap() else {
            panic!("Expected Request");
        };
        assert_eq!(request.payload, json!({}));

        let raw = r#"{"messageId":"m","messagingHandle":"h","messageType":"ui.done"}"#;
        let Envelope::Request(request) = Envelope::parse(raw).unwrap() else {
            panic!("Expected Request");
        };
        assert_eq!(request.payload, json!({}));
    }

    #[test]
    fn error_response_serializes_null_correlation() {
        let response = Response::error("r1", None, ErrorResponse::new("boom", "TestException"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["responseToMessageId"], Value::Null);
        assert_eq!(value["additionalResponsesExpected"], false);
        assert_eq!(value["payload"]["errorMessage"], "boom");
        assert_eq!(value["payload"]["errorType"], "TestException");
    }
}
