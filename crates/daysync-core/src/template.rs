//! `{{field}}` string templates.
//!
//! Placeholders are replaced by looked-up values. A missing or empty value
//! renders as the empty string, never as `undefined` or `null`.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("Invalid placeholder regex")
});

/// A parsed string template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    fields: Vec<String>,
}

impl Template {
    /// Parses a template string.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let fields = PLACEHOLDER_REGEX
            .captures_iter(&source)
            .map(|c| c[1].to_string())
            .collect();
        Self { source, fields }
    }

    /// Returns the raw template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the placeholder names, in order of appearance.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Renders the template, substituting each placeholder via `lookup`.
    pub fn render<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        PLACEHOLDER_REGEX
            .replace_all(&self.source, |caps: &Captures<'_>| {
                lookup(&caps[1]).unwrap_or_default()
            })
            .into_owned()
    }
}

impl From<&str> for Template {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}
