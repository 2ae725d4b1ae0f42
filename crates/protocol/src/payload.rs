//! Payload shapes for each message type.
//!
//! Every payload keeps the fields it does not recognize in an `extra` map
//! that is written back out verbatim, so newer peers can add fields without
//! breaking older hosts. Embedded clinical resources stay raw JSON here; the
//! codec in `swm-rs` turns them into typed resources.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ── Response side ────────────────────────────────────────────────────────────

/// Payload of a [`Response`](crate::Response).
///
/// Deduced from the fields present: an object carrying both `errorMessage`
/// and `errorType` strings is an error, anything else is a success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Error(ErrorResponse),
    Success(SuccessPayload),
}

impl Default for ResponsePayload {
    fn default() -> Self {
        ResponsePayload::Success(SuccessPayload::default())
    }
}

impl ResponsePayload {
    pub fn as_error(&self) -> Option<&ErrorResponse> {
        match self {
            ResponsePayload::Error(error) => Some(error),
            ResponsePayload::Success(_) => None,
        }
    }

    /// Fields not claimed by a typed member.
    pub fn extra(&self) -> &Map<String, Value> {
        match self {
            ResponsePayload::Error(error) => &error.extra,
            ResponsePayload::Success(success) => &success.extra,
        }
    }

    /// Looks up any payload field by its wire name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra().get(name)
    }
}

/// Success payload. The protocol defines no fixed members, so everything
/// lives in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessPayload {
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error payload: `{"errorMessage": …, "errorType": …, …extra}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_message: String,
    pub error_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorResponse {
    pub fn new(error_message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            error_type: error_type.into(),
            extra: Map::new(),
        }
    }
}

// ── Request side ─────────────────────────────────────────────────────────────

/// FHIR-style reference: `{"reference": "Patient/123", "type": …, "display": …}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// Named piece of launch context. Carries a reference or an embedded
/// resource; which one is set is not checked at this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchContext {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_resource: Option<Value>,
}

/// `form.submitted` payload as received from the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmit {
    /// The questionnaire response. Required by the protocol; absence is
    /// reported by the codec rather than at parse time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Validation outcome, if the document produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `sdc.configure` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdcConfigure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminology_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `sdc.configureContext` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdcConfigureContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub launch_context: Vec<LaunchContext>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `context` member of `sdc.displayQuestionnaire`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub launch_context: Vec<LaunchContext>,
}

/// `sdc.displayQuestionnaire` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdcDisplayQuestionnaire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire: Option<QuestionnaireSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DisplayContext>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How the questionnaire to display is identified.
///
/// On the wire: a bare string is a canonical URL, an object with a
/// `resourceType` is an embedded resource, any other object is a reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuestionnaireSource {
    Canonical(String),
    Reference(Reference),
    Resource(Value),
}

impl<'de> Deserialize<'de> for QuestionnaireSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        match Value::deserialize(deserializer)? {
            Value::String(url) => Ok(QuestionnaireSource::Canonical(url)),
            Value::Object(object) if object.contains_key("resourceType") => {
                Ok(QuestionnaireSource::Resource(Value::Object(object)))
            }
            Value::Object(object) => serde_json::from_value(Value::Object(object))
                .map(QuestionnaireSource::Reference)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "questionnaire must be a string or object, got {other}"
            ))),
        }
    }
}

/// Outbound request payload, one variant per typed message plus an escape
/// hatch for everything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestPayload {
    /// `{}`; used by `ui.form.requestSubmit` and `ui.form.persist`.
    #[default]
    Empty,
    SdcConfigure(SdcConfigure),
    SdcConfigureContext(SdcConfigureContext),
    SdcDisplayQuestionnaire(SdcDisplayQuestionnaire),
    Raw(Map<String, Value>),
}

impl RequestPayload {
    /// Renders the payload as the JSON object placed under `payload`.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            RequestPayload::Empty => Ok(Value::Object(Map::new())),
            RequestPayload::SdcConfigure(payload) => serde_json::to_value(payload),
            RequestPayload::SdcConfigureContext(payload) => serde_json::to_value(payload),
            RequestPayload::SdcDisplayQuestionnaire(payload) => serde_json::to_value(payload),
            RequestPayload::Raw(fields) => Ok(Value::Object(fields.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_payload_is_deduced_from_fields() {
        let payload: ResponsePayload = serde_json::from_value(json!({
            "errorMessage": "nope",
            "errorType": "SomethingException",
            "traceId": "t-1"
        }))
        .unwrap();

        let error = payload.as_error().expect("error payload");
        assert_eq!(error.error_message, "nope");
        assert_eq!(error.error_type, "SomethingException");
        assert_eq!(payload.field("traceId"), Some(&json!("t-1")));
    }

    #[test]
    fn unknown_response_fields_survive_reserialization() {
        let input = json!({ "status": "saved", "nested": { "a": [1, 2] } });
        let payload: ResponsePayload = serde_json::from_value(input.clone()).unwrap();
        assert!(payload.as_error().is_none());
        assert_eq!(serde_json::to_value(&payload).unwrap(), input);
    }

    #[test]
    fn form_submit_keeps_unrecognized_fields() {
        let payload: FormSubmit = serde_json::from_value(json!({
            "response": { "resourceType": "QuestionnaireResponse" },
            "outcome": null,
            "draft": true
        }))
        .unwrap();

        assert!(payload.response.is_some());
        assert!(payload.outcome.is_none());
        assert_eq!(payload.extra.get("draft"), Some(&json!(true)));
    }

    #[test]
    fn questionnaire_source_deduction() {
        let canonical: QuestionnaireSource =
            serde_json::from_value(json!("http://example.org/Questionnaire/q")).unwrap();
        assert!(matches!(canonical, QuestionnaireSource::Canonical(_)));

        let reference: QuestionnaireSource =
            serde_json::from_value(json!({ "reference": "Questionnaire/q" })).unwrap();
        assert_eq!(
            reference,
            QuestionnaireSource::Reference(Reference::new("Questionnaire/q"))
        );

        let resource: QuestionnaireSource =
            serde_json::from_value(json!({ "resourceType": "Questionnaire", "id": "q" })).unwrap();
        assert!(matches!(resource, QuestionnaireSource::Resource(_)));
    }

    #[test]
    fn reference_omits_absent_members() {
        let value = serde_json::to_value(Reference::new("Patient/1").with_display("Jane")).unwrap();
        assert_eq!(value, json!({ "reference": "Patient/1", "display": "Jane" }));
    }

    #[test]
    fn empty_launch_context_is_omitted() {
        let value = RequestPayload::SdcConfigureContext(SdcConfigureContext {
            subject: Some(Reference::new("Patient/1")),
            ..Default::default()
        })
        .to_value()
        .unwrap();
        assert_eq!(value, json!({ "subject": { "reference": "Patient/1" } }));
        assert_eq!(RequestPayload::Empty.to_value().unwrap(), json!({}));
    }
}
