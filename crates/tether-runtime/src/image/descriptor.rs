use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::RuntimeError;

/// Image request: source URL plus optional display hints.
///
/// Compact form: `<url>#width:<n>,height:<n>,dither:<name>`. Values that look
/// numeric parse as numbers and bare flags parse as `true`. Keys other than
/// the three hints are kept in `extra` but do not take part in the hash.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageDescriptor {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dither: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

impl ImageDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_dither(mut self, dither: impl Into<String>) -> Self {
        self.dither = Some(dither.into());
        self
    }

    /// Canonical compact form; unset hints contribute nothing
    pub fn encode(&self) -> String {
        let mut hints = Vec::new();
        if let Some(width) = self.width {
            hints.push(format!("width:{}", width));
        }
        if let Some(height) = self.height {
            hints.push(format!("height:{}", height));
        }
        if let Some(dither) = &self.dither {
            hints.push(format!("dither:{}", dither));
        }

        if hints.is_empty() {
            self.url.clone()
        } else {
            format!("{}#{}", self.url, hints.join(","))
        }
    }

    pub fn parse(encoded: &str) -> Self {
        let (url, hints) = match encoded.split_once('#') {
            Some((url, hints)) => (url, hints),
            None => (encoded, ""),
        };

        let mut descriptor = ImageDescriptor::new(url);
        for hint in hints.split(',').filter(|hint| !hint.is_empty()) {
            let (key, value) = match hint.split_once(':') {
                Some((key, raw)) => (key, parse_hint_value(raw)),
                None => (hint, Value::Bool(true)),
            };
            descriptor.set_field(key, value);
        }
        descriptor
    }

    /// Structured form: `{url, width?, height?, dither?, ...}`
    pub fn from_json(value: &Value) -> Result<Self, RuntimeError> {
        let fields = value.as_object().ok_or_else(|| {
            RuntimeError::InvalidArgument(format!("image descriptor must be an object, got {}", value))
        })?;
        let url = fields.get("url").and_then(Value::as_str).ok_or_else(|| {
            RuntimeError::InvalidArgument("image descriptor needs a url".to_string())
        })?;

        let mut descriptor = ImageDescriptor::new(url);
        for (key, value) in fields.iter().filter(|(key, _)| key.as_str() != "url") {
            descriptor.set_field(key, value.clone());
        }
        Ok(descriptor)
    }

    fn set_field(&mut self, key: &str, value: Value) {
        let dimension = value.as_u64().and_then(|n| u32::try_from(n).ok());
        match (key, dimension) {
            ("width", Some(n)) => self.width = Some(n),
            ("height", Some(n)) => self.height = Some(n),
            ("dither", _) if value.is_string() => {
                self.dither = value.as_str().map(str::to_string);
            }
            (key, _) if !value.is_null() => {
                self.extra.insert(key.to_string(), value);
            }
            _ => {}
        }
    }

    /// Hints supplied here that differ from `cached`
    pub fn conflicts_with(&self, cached: &ImageDescriptor) -> bool {
        self.width.is_some_and(|w| cached.width != Some(w))
            || self.height.is_some_and(|h| cached.height != Some(h))
            || self
                .dither
                .as_ref()
                .is_some_and(|d| cached.dither.as_ref() != Some(d))
    }
}

impl fmt::Display for ImageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

fn parse_hint_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<u64>() {
        return Value::from(n);
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::from(n),
        _ => Value::String(raw.to_string()),
    }
}

/// Either form a script may pass
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSpec {
    Descriptor(ImageDescriptor),
    Encoded(String),
}

impl ImageSpec {
    pub fn from_json(value: &Value) -> Result<Self, RuntimeError> {
        match value {
            Value::String(encoded) => Ok(ImageSpec::Encoded(encoded.clone())),
            other => ImageDescriptor::from_json(other).map(ImageSpec::Descriptor),
        }
    }

    pub fn into_descriptor(self) -> ImageDescriptor {
        match self {
            ImageSpec::Descriptor(descriptor) => descriptor,
            ImageSpec::Encoded(encoded) => ImageDescriptor::parse(&encoded),
        }
    }
}

impl From<&str> for ImageSpec {
    fn from(encoded: &str) -> Self {
        ImageSpec::Encoded(encoded.to_string())
    }
}

impl From<ImageDescriptor> for ImageSpec {
    fn from(descriptor: ImageDescriptor) -> Self {
        ImageSpec::Descriptor(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_omits_unset_hints() {
        assert_eq!(ImageDescriptor::new("a.png").encode(), "a.png");
        assert_eq!(
            ImageDescriptor::new("a.png").with_dither("none").encode(),
            "a.png#dither:none"
        );
        assert_eq!(
            ImageDescriptor::new("http://x/a.png")
                .with_size(144, 168)
                .with_dither("atkinson")
                .encode(),
            "http://x/a.png#width:144,height:168,dither:atkinson"
        );
    }

    #[test]
    fn test_parse_inverts_encode_for_every_hint_subset() {
        for mask in 0..8u8 {
            let mut descriptor = ImageDescriptor::new("http://example.com/img/logo.png");
            if mask & 1 != 0 {
                descriptor.width = Some(32);
            }
            if mask & 2 != 0 {
                descriptor.height = Some(16);
            }
            if mask & 4 != 0 {
                descriptor.dither = Some("floyd".to_string());
            }
            assert_eq!(ImageDescriptor::parse(&descriptor.encode()), descriptor);
        }
    }

    #[test]
    fn test_parse_flags_and_numbers() {
        let descriptor = ImageDescriptor::parse("logo.png#invert,scale:1.5,width:10");
        assert_eq!(descriptor.width, Some(10));
        assert_eq!(descriptor.extra["invert"], json!(true));
        assert_eq!(descriptor.extra["scale"], json!(1.5));
    }

    #[test]
    fn test_from_json() {
        let descriptor =
            ImageDescriptor::from_json(&json!({"url": "a.png", "width": 8, "dither": "none"}))
                .unwrap();
        assert_eq!(descriptor.width, Some(8));
        assert_eq!(descriptor.height, None);
        assert_eq!(descriptor.dither.as_deref(), Some("none"));

        assert!(ImageDescriptor::from_json(&json!({"width": 8})).is_err());
    }

    #[test]
    fn test_conflicts_only_on_supplied_hints() {
        let cached = ImageDescriptor::new("a.png").with_size(10, 20);
        assert!(!ImageDescriptor::new("a.png").conflicts_with(&cached));

        let mut request = ImageDescriptor::new("a.png");
        request.width = Some(10);
        assert!(!request.conflicts_with(&cached));

        request.height = Some(21);
        assert!(request.conflicts_with(&cached));
    }
}
