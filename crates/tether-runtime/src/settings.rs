//! Settings page handshake
//!
//! Opening hands the renderer `<url>#<percent-encoded JSON options>`.
//! Closing receives the page's percent-encoded JSON response.

use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;

/// Passed to settings listener callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsEvent {
    pub url: String,
    pub options: Value,
}

pub type SettingsCallback = Box<dyn Fn(&SettingsEvent)>;

/// Registered by a script to own its settings page. The most recent one wins.
pub struct SettingsListener {
    pub url: String,
    pub open: Option<SettingsCallback>,
    pub close: SettingsCallback,
}

impl SettingsListener {
    pub fn new(url: impl Into<String>, close: SettingsCallback) -> Self {
        Self {
            url: url.into(),
            open: None,
            close,
        }
    }

    pub fn with_open(mut self, open: SettingsCallback) -> Self {
        self.open = Some(open);
        self
    }
}

impl fmt::Debug for SettingsListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsListener")
            .field("url", &self.url)
            .field("open", &self.open.is_some())
            .finish()
    }
}

/// What closing the settings page led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsOutcome {
    /// A script listener handled the response
    Handled,
    /// The main script should be reloaded from this URL
    Reload(String),
    /// Nothing to do
    Ignored,
}

/// `<url>#<percent-encoded JSON>`
pub fn page_url(url: &str, options: &Value) -> String {
    format!("{}#{}", url, urlencoding::encode(&options.to_string()))
}

/// Decode a settings page response into an options mapping.
///
/// An absent or empty response is an empty mapping; so is a malformed one,
/// with a warning.
pub fn decode_response(response: Option<&str>) -> Value {
    let empty = || Value::Object(Map::new());
    let Some(response) = response.filter(|r| !r.is_empty()) else {
        return empty();
    };

    let decoded = match urlencoding::decode(response) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!(target: "settings", "Settings response is not valid UTF-8: {}", e);
            return empty();
        }
    };

    match serde_json::from_str::<Value>(&decoded) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!(target: "settings", "Settings response is not an object: {}", other);
            empty()
        }
        Err(e) => {
            warn!(target: "settings", "Settings response is not JSON: {}", e);
            empty()
        }
    }
}
