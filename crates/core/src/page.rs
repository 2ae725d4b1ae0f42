//! Default host page for sessions configured with only an SDC endpoint.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::LazyLock;

use parking_lot::Mutex;
use regex::{Captures, Regex};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

const TEMPLATE: &str = include_str!("../assets/default-form-filler.html");

/// Last generated page as `(key, file URL)`.
static CACHE: LazyLock<Mutex<Option<(String, String)>>> = LazyLock::new(|| Mutex::new(None));

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(\w+)\}\}").expect("PLACEHOLDER_RE should compile")
});

/// Renders the host page HTML.
///
/// Placeholders are substituted in one pass over the template, so values
/// that themselves look like placeholders are written out literally.
pub fn render_page(
    sdc_endpoint_address: &str,
    data_endpoint_address: Option<&str>,
    sdk_url: &str,
) -> String {
    let data_attr = match data_endpoint_address {
        Some(address) if !address.trim().is_empty() => {
            format!(" data-endpoint-address=\"{}\"", escape_attr(address))
        }
        _ => String::new(),
    };
    let sdc_endpoint = escape_attr(sdc_endpoint_address);
    let sdk_url = escape_attr(sdk_url);

    PLACEHOLDER_RE
        .replace_all(TEMPLATE, |caps: &Captures<'_>| match &caps[1] {
            "sdcEndpointAddress" => sdc_endpoint.clone(),
            "dataEndpointAddressAttr" => data_attr.clone(),
            "sdkUrl" => sdk_url.clone(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Writes the host page to the temp directory and returns its `file://` URL.
///
/// The most recent page is cached; asking again with the same arguments
/// returns the same URL without rewriting the file.
pub fn create_page(
    sdc_endpoint_address: &str,
    data_endpoint_address: Option<&str>,
    sdk_url: &str,
) -> Result<String> {
    let key = format!(
        "{sdc_endpoint_address}|{}|{sdk_url}",
        data_endpoint_address.unwrap_or_default()
    );

    let mut cache = CACHE.lock();
    if let Some((cached_key, url)) = cache.as_ref() {
        if *cached_key == key {
            return Ok(url.clone());
        }
    }

    let path = page_path(&key);
    std::fs::write(&path, render_page(sdc_endpoint_address, data_endpoint_address, sdk_url))?;
    let url = Url::from_file_path(&path)
        .map_err(|()| Error::InvalidConfig(format!("not an absolute path: {}", path.display())))?
        .to_string();

    debug!(target = "swm::page", path = %path.display(), "wrote default host page");
    *cache = Some((key, url.clone()));
    Ok(url)
}

fn page_path(key: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    std::env::temp_dir().join(format!("swm-form-filler-{:016x}.html", hasher.finish()))
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
