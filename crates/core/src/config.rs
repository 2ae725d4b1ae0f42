//! Session configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::page;

/// SDK script loaded by the generated host page unless overridden.
pub const DEFAULT_SDK_URL: &str = "https://cdn.tiro.health/sdk/latest/tiro-web-sdk.iife.js";

/// Default window for the document's handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// Configuration for a [`Session`](crate::Session).
///
/// Either `target_url` or `sdc_endpoint_address` must be set. With only an
/// SDC endpoint, the session generates a host page that embeds the form
/// filler SDK pointed at that endpoint.
///
/// ```json
/// {
///   "sdcEndpointAddress": "https://sdc.example/fhir",
///   "dataEndpointAddress": "https://ehr.example/fhir",
///   "handshakeTimeoutSecs": 10
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdc_endpoint_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_endpoint_address: Option<String>,
    #[serde(default = "default_sdk_url")]
    pub sdk_url: String,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

fn default_sdk_url() -> String {
    DEFAULT_SDK_URL.to_string()
}

fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if is_blank(self.target_url.as_deref()) && is_blank(self.sdc_endpoint_address.as_deref()) {
            return Err(Error::InvalidConfig(
                "Either targetUrl or sdcEndpointAddress is required".into(),
            ));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// URL the session loads: `target_url` when set, otherwise the file URL
    /// of a generated host page.
    pub fn resolve_target_url(&self) -> Result<String> {
        if let Some(url) = self.target_url.as_deref().filter(|url| !url.trim().is_empty()) {
            return Ok(url.to_string());
        }
        match self.sdc_endpoint_address.as_deref() {
            Some(sdc) if !sdc.trim().is_empty() => {
                page::create_page(sdc, self.data_endpoint_address.as_deref(), &self.sdk_url)
            }
            _ => Err(Error::InvalidConfig(
                "Either targetUrl or sdcEndpointAddress is required".into(),
            )),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|value| value.trim().is_empty())
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    target_url: Option<String>,
    sdc_endpoint_address: Option<String>,
    data_endpoint_address: Option<String>,
    sdk_url: String,
    handshake_timeout_secs: u64,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            target_url: None,
            sdc_endpoint_address: None,
            data_endpoint_address: None,
            sdk_url: default_sdk_url(),
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
        }
    }
}

impl SessionConfigBuilder {
    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn sdc_endpoint_address(mut self, address: impl Into<String>) -> Self {
        self.sdc_endpoint_address = Some(address.into());
        self
    }

    pub fn data_endpoint_address(mut self, address: impl Into<String>) -> Self {
        self.data_endpoint_address = Some(address.into());
        self
    }

    pub fn sdk_url(mut self, url: impl Into<String>) -> Self {
        self.sdk_url = url.into();
        self
    }

    pub fn handshake_timeout_secs(mut self, secs: u64) -> Self {
        self.handshake_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<SessionConfig> {
        let config = SessionConfig {
            target_url: self.target_url,
            sdc_endpoint_address: self.sdc_endpoint_address,
            data_endpoint_address: self.data_endpoint_address,
            sdk_url: self.sdk_url,
            handshake_timeout_secs: self.handshake_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builder_requires_a_target() {
        let err = SessionConfig::builder().build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = SessionConfig::builder().target_url("   ").build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let config = SessionConfig::builder()
            .sdc_endpoint_address("https://sdc.example/fhir")
            .build()
            .unwrap();
        assert_eq!(config.sdk_url, DEFAULT_SDK_URL);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn target_url_wins_over_generated_page() {
        let config = SessionConfig::builder()
            .target_url("https://forms.example/launch")
            .sdc_endpoint_address("https://sdc.example/fhir")
            .build()
            .unwrap();
        assert_eq!(
            config.resolve_target_url().unwrap(),
            "https://forms.example/launch"
        );
    }

    #[test]
    fn json_defaults_and_file_loading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"targetUrl": "https://forms.example/", "handshakeTimeoutSecs": 5}}"#
        )
        .unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.target_url.as_deref(), Some("https://forms.example/"));
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.sdk_url, DEFAULT_SDK_URL);

        let err = SessionConfig::from_json(r#"{"dataEndpointAddress": "x"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
