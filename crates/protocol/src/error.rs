use thiserror::Error;

/// Structural failures while reading an envelope off the wire.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// The text is not JSON at all.
    #[error("Invalid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("Envelope must be a JSON object")]
    NotAnObject,

    /// A required top-level field is absent, null, or not a string.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Fields are present but do not match the envelope shape.
    #[error("Invalid envelope: {0}")]
    Invalid(#[source] serde_json::Error),
}
