//! Payload codec: typed request/response payloads <-> wire JSON.
//!
//! Clinical resources embedded in payloads (`response`, `outcome`,
//! `questionnaire`, `questionnaireResponse`, `contentResource`) are opaque to
//! this layer. They are handed to a [`ResourceCodec`], which owns the
//! resource model; the codec here only moves the resulting JSON subtrees into
//! and out of the envelope shapes defined in `swm-protocol`.

use serde_json::{Map, Value};
use swm_protocol::{
    DisplayContext, FormSubmit, LaunchContext, QuestionnaireSource, Reference, RequestPayload,
    SdcConfigure, SdcConfigureContext, SdcDisplayQuestionnaire,
};

use crate::error::{BoxError, Error, Result};

/// Kind of resource a payload field is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    QuestionnaireResponse,
    OperationOutcome,
    Questionnaire,
    /// Launch-context content; any resource type is acceptable.
    Any,
}

impl ResourceKind {
    /// Expected `resourceType`, or `None` when any type is acceptable.
    pub fn resource_type(self) -> Option<&'static str> {
        match self {
            ResourceKind::QuestionnaireResponse => Some("QuestionnaireResponse"),
            ResourceKind::OperationOutcome => Some("OperationOutcome"),
            ResourceKind::Questionnaire => Some("Questionnaire"),
            ResourceKind::Any => None,
        }
    }
}

/// Domain-resource encoder/decoder used for embedded resources.
///
/// Implement this to plug a FHIR model (R4, R5, …) into the engine. The
/// engine never inspects `Resource` values; it only passes them to listeners
/// and back through `encode`.
pub trait ResourceCodec: Send + Sync + 'static {
    type Resource: Clone + Send + Sync + 'static;

    fn encode(&self, resource: &Self::Resource) -> std::result::Result<Value, BoxError>;

    fn decode(
        &self,
        json: &Value,
        expected: ResourceKind,
    ) -> std::result::Result<Self::Resource, BoxError>;
}

/// Resource kept as its JSON object, with `resourceType` validated.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResource(Map<String, Value>);

impl JsonResource {
    /// Wraps a JSON object that carries a string `resourceType`.
    pub fn new(value: Value) -> std::result::Result<Self, BoxError> {
        let Value::Object(object) = value else {
            return Err("resource must be a JSON object".into());
        };
        match object.get("resourceType") {
            Some(Value::String(_)) => Ok(Self(object)),
            _ => Err("resource is missing resourceType".into()),
        }
    }

    pub fn resource_type(&self) -> &str {
        self.0
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }
}

/// [`ResourceCodec`] that keeps resources as JSON and checks their type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResourceCodec;

impl ResourceCodec for JsonResourceCodec {
    type Resource = JsonResource;

    fn encode(&self, resource: &JsonResource) -> std::result::Result<Value, BoxError> {
        Ok(Value::Object(resource.0.clone()))
    }

    fn decode(
        &self,
        json: &Value,
        expected: ResourceKind,
    ) -> std::result::Result<JsonResource, BoxError> {
        let resource = JsonResource::new(json.clone())?;
        match expected.resource_type() {
            Some(wanted) if resource.resource_type() != wanted => Err(format!(
                "expected {wanted}, got {}",
                resource.resource_type()
            )
            .into()),
            _ => Ok(resource),
        }
    }
}

/// One named launch-context entry on the host side.
///
/// Either `content_reference` or `content_resource` is normally set; which one
/// is left to the resource layer to judge. The name is checked again when the
/// entry is encoded, so entries built as struct literals are held to the same
/// rule as [`LaunchContextEntry::named`].
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchContextEntry<R> {
    pub name: String,
    pub content_reference: Option<Reference>,
    pub content_resource: Option<R>,
}

impl<R> LaunchContextEntry<R> {
    /// Entry with no content yet. Fails on a blank name.
    pub fn named(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self {
            name,
            content_reference: None,
            content_resource: None,
        })
    }

    pub fn reference(name: impl Into<String>, reference: Reference) -> Result<Self> {
        let mut entry = Self::named(name)?;
        entry.content_reference = Some(reference);
        Ok(entry)
    }

    pub fn resource(name: impl Into<String>, resource: R) -> Result<Self> {
        let mut entry = Self::named(name)?;
        entry.content_resource = Some(resource);
        Ok(entry)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidLaunchContext(
            "launch context name is required".into(),
        ));
    }
    Ok(())
}

/// Builds the conventional `patient`, `encounter`, `user` entries, in that
/// order, skipping absent resources.
pub fn standard_launch_context<R>(
    patient: Option<R>,
    encounter: Option<R>,
    user: Option<R>,
) -> Vec<LaunchContextEntry<R>> {
    [("patient", patient), ("encounter", encounter), ("user", user)]
        .into_iter()
        .filter_map(|(name, resource)| {
            resource.map(|resource| LaunchContextEntry {
                name: name.to_string(),
                content_reference: None,
                content_resource: Some(resource),
            })
        })
        .collect()
}

/// Clinical context sent with `sdc.configureContext` and
/// `sdc.displayQuestionnaire`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormContext<R> {
    pub subject: Option<Reference>,
    pub author: Option<Reference>,
    pub encounter: Option<Reference>,
    pub launch_context: Vec<LaunchContextEntry<R>>,
}

impl<R> Default for FormContext<R> {
    fn default() -> Self {
        Self {
            subject: None,
            author: None,
            encounter: None,
            launch_context: Vec::new(),
        }
    }
}

impl<R> FormContext<R> {
    pub fn with_launch_context(launch_context: Vec<LaunchContextEntry<R>>) -> Self {
        Self {
            launch_context,
            ..Default::default()
        }
    }
}

/// Questionnaire to display: canonical URL, reference, or embedded resource.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionnaireRef<R> {
    Canonical(String),
    Reference(Reference),
    Resource(R),
}

/// Typed (de)serialization of request payloads around a [`ResourceCodec`].
#[derive(Debug, Clone, Default)]
pub struct PayloadCodec<C> {
    resources: C,
}

impl<C: ResourceCodec> PayloadCodec<C> {
    pub fn new(resources: C) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &C {
        &self.resources
    }

    /// Decodes a `form.submitted` payload into `(response, outcome)`.
    ///
    /// `response` is required; `outcome` may be absent or null.
    pub fn decode_form_submit(
        &self,
        payload: &Value,
    ) -> Result<(C::Resource, Option<C::Resource>)> {
        let submit: FormSubmit = serde_json::from_value(payload.clone())
            .map_err(|err| Error::MalformedEnvelope(format!("form.submitted payload: {err}")))?;

        let response = submit
            .response
            .filter(|value| !value.is_null())
            .ok_or_else(|| Error::MalformedEnvelope("response is required in payload".into()))?;
        let response = self.decode(&response, "response", ResourceKind::QuestionnaireResponse)?;

        let outcome = submit
            .outcome
            .map(|outcome| self.decode(&outcome, "outcome", ResourceKind::OperationOutcome))
            .transpose()?;

        Ok((response, outcome))
    }

    pub fn encode_configure(
        &self,
        terminology_server: Option<&str>,
        data_server: Option<&str>,
        configuration: Option<Value>,
    ) -> RequestPayload {
        RequestPayload::SdcConfigure(SdcConfigure {
            terminology_server: terminology_server.map(str::to_string),
            data_server: data_server.map(str::to_string),
            configuration,
            extra: Map::new(),
        })
    }

    pub fn encode_configure_context(
        &self,
        context: &FormContext<C::Resource>,
    ) -> Result<RequestPayload> {
        Ok(RequestPayload::SdcConfigureContext(SdcConfigureContext {
            subject: context.subject.clone(),
            author: context.author.clone(),
            encounter: context.encounter.clone(),
            launch_context: self.encode_launch_context(&context.launch_context)?,
            extra: Map::new(),
        }))
    }

    pub fn encode_display_questionnaire(
        &self,
        questionnaire: &QuestionnaireRef<C::Resource>,
        questionnaire_response: Option<&C::Resource>,
        context: &FormContext<C::Resource>,
    ) -> Result<RequestPayload> {
        let questionnaire = match questionnaire {
            QuestionnaireRef::Canonical(url) => QuestionnaireSource::Canonical(url.clone()),
            QuestionnaireRef::Reference(reference) => {
                QuestionnaireSource::Reference(reference.clone())
            }
            QuestionnaireRef::Resource(resource) => {
                QuestionnaireSource::Resource(self.encode(resource, "questionnaire")?)
            }
        };

        let questionnaire_response = questionnaire_response
            .map(|resource| self.encode(resource, "questionnaireResponse"))
            .transpose()?;

        Ok(RequestPayload::SdcDisplayQuestionnaire(SdcDisplayQuestionnaire {
            questionnaire: Some(questionnaire),
            questionnaire_response,
            context: Some(DisplayContext {
                subject: context.subject.clone(),
                author: context.author.clone(),
                encounter: context.encounter.clone(),
                launch_context: self.encode_launch_context(&context.launch_context)?,
            }),
            extra: Map::new(),
        }))
    }

    fn encode_launch_context(
        &self,
        entries: &[LaunchContextEntry<C::Resource>],
    ) -> Result<Vec<LaunchContext>> {
        entries
            .iter()
            .map(|entry| {
                check_name(&entry.name)?;
                Ok(LaunchContext {
                    name: entry.name.clone(),
                    content_reference: entry.content_reference.clone(),
                    content_resource: entry
                        .content_resource
                        .as_ref()
                        .map(|resource| self.encode(resource, "contentResource"))
                        .transpose()?,
                })
            })
            .collect()
    }

    fn encode(&self, resource: &C::Resource, field: &'static str) -> Result<Value> {
        self.resources
            .encode(resource)
            .map_err(|source| Error::ResourceDecode { field, source })
    }

    fn decode(&self, json: &Value, field: &'static str, kind: ResourceKind) -> Result<C::Resource> {
        self.resources
            .decode(json, kind)
            .map_err(|source| Error::ResourceDecode { field, source })
    }
}
