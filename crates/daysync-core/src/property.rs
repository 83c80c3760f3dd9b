//! Typed page properties and the per-source property registry.
//!
//! - [`PropertyValue`] is the typed envelope a page store speaks
//!   (title, text, number, date, checkbox, select).
//! - [`Page`] is one stored row: an id plus properties keyed by display name.
//! - [`PropertyDescriptor`] / [`PropertyConfig`] map the engine's config keys
//!   onto store display names and carry the enabled flag. Disabled
//!   descriptors never reach a write payload.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::time::CanonicalDate;

/// The type of a store property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Text,
    Number,
    Date,
    Checkbox,
    Select,
    Title,
    RichText,
}

impl PropertyType {
    /// Returns the config name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::Select => "select",
            Self::Title => "title",
            Self::RichText => "rich_text",
        }
    }
}

/// The value of a date property: a whole day or a precise instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateValue {
    Instant(DateTime<FixedOffset>),
    Day(NaiveDate),
}

impl DateValue {
    /// Returns the calendar day as written.
    pub fn day(&self) -> NaiveDate {
        match self {
            Self::Day(d) => *d,
            Self::Instant(dt) => dt.naive_local().date(),
        }
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Instant(dt) => f.write_str(&dt.to_rfc3339()),
        }
    }
}

impl From<CanonicalDate> for DateValue {
    fn from(date: CanonicalDate) -> Self {
        Self::Day(date.date())
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    Text(String),
    RichText(String),
    Number(Option<f64>),
    Date(Option<DateValue>),
    Checkbox(bool),
    Select(Option<String>),
}

impl PropertyValue {
    /// Creates a value of the given type from plain text.
    ///
    /// Used when a source produces text for a property whose declared type
    /// is textual.
    pub fn text_as(kind: PropertyType, text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        match kind {
            PropertyType::Title => Some(Self::Title(text)),
            PropertyType::Text => Some(Self::Text(text)),
            PropertyType::RichText => Some(Self::RichText(text)),
            PropertyType::Select => Some(Self::Select(Some(text))),
            _ => None,
        }
    }

    /// Returns the property type of this value.
    pub fn kind(&self) -> PropertyType {
        match self {
            Self::Title(_) => PropertyType::Title,
            Self::Text(_) => PropertyType::Text,
            Self::RichText(_) => PropertyType::RichText,
            Self::Number(_) => PropertyType::Number,
            Self::Date(_) => PropertyType::Date,
            Self::Checkbox(_) => PropertyType::Checkbox,
            Self::Select(_) => PropertyType::Select,
        }
    }

    /// Returns the text for textual values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Title(s) | Self::Text(s) | Self::RichText(s) => Some(s),
            Self::Select(s) => s.as_deref(),
            _ => None,
        }
    }

    /// Returns the number, if set.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => *n,
            _ => None,
        }
    }

    /// Returns the date, if set.
    pub fn as_date(&self) -> Option<DateValue> {
        match self {
            Self::Date(d) => *d,
            _ => None,
        }
    }

    /// Returns the checkbox state.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Checkbox(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if the value carries nothing (empty text, unset number,
    /// date or select).
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Title(s) | Self::Text(s) | Self::RichText(s) => s.is_empty(),
            Self::Number(n) => n.is_none(),
            Self::Date(d) => d.is_none(),
            Self::Select(s) => s.as_deref().is_none_or(str::is_empty),
            Self::Checkbox(_) => false,
        }
    }

    /// Renders the value for interpolation; `None` when empty.
    pub fn display(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        match self {
            Self::Title(s) | Self::Text(s) | Self::RichText(s) => Some(s.clone()),
            Self::Select(s) => s.clone(),
            Self::Number(n) => n.map(format_number),
            Self::Date(d) => d.map(|d| d.to_string()),
            Self::Checkbox(b) => Some(b.to_string()),
        }
    }
}

/// Formats a number without a trailing `.0` and with at most two decimals.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let rounded = format!("{n:.2}");
        rounded
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// A stored page: id plus properties keyed by display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Page {
    /// Creates a page.
    pub fn new(id: impl Into<String>, properties: BTreeMap<String, PropertyValue>) -> Self {
        Self {
            id: id.into(),
            properties,
        }
    }

    /// Extracts a property by display name.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Extracts a textual property.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(PropertyValue::as_str)
    }

    /// Extracts a number property.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.property(name).and_then(PropertyValue::as_number)
    }

    /// Extracts a date property.
    pub fn date(&self, name: &str) -> Option<DateValue> {
        self.property(name).and_then(PropertyValue::as_date)
    }

    /// Extracts a checkbox; a missing checkbox reads as unchecked.
    pub fn checkbox(&self, name: &str) -> bool {
        self.property(name)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }

    /// Applies an update payload over the existing properties.
    pub fn apply(&mut self, update: PropertyMap) {
        self.properties.extend(update.0);
    }
}

/// A write payload: display name → value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, PropertyValue>);

impl PropertyMap {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property.
    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.0.insert(name.into(), value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns a property by display name.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    /// Checks whether a display name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates over the display names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the payload into its map.
    pub fn into_inner(self) -> BTreeMap<String, PropertyValue> {
        self.0
    }
}

fn default_enabled() -> bool {
    true
}

/// One entry of a source's property registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name in the destination store.
    pub display_name: String,
    /// Declared property type.
    #[serde(rename = "type")]
    pub kind: PropertyType,
    /// Disabled descriptors stay in the config but are never written.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PropertyDescriptor {
    /// Creates an enabled descriptor.
    pub fn new(display_name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            display_name: display_name.into(),
            kind,
            enabled: true,
        }
    }

    /// Builder: set the enabled flag.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A validated per-source registry of config key → descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyConfig {
    source_key: String,
    descriptors: BTreeMap<String, PropertyDescriptor>,
}

impl PropertyConfig {
    /// Validates a registry: display names must be non-empty and unique.
    pub fn new(
        source_key: impl Into<String>,
        descriptors: BTreeMap<String, PropertyDescriptor>,
    ) -> ConfigResult<Self> {
        let source_key = source_key.into();
        let mut seen = std::collections::HashSet::new();
        for (key, descriptor) in &descriptors {
            let name = descriptor.display_name.trim();
            if name.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "source {source_key}: property {key} has an empty display name"
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(ConfigError::DuplicateProperty {
                    source_key,
                    display_name: name.to_string(),
                });
            }
        }
        Ok(Self {
            source_key,
            descriptors,
        })
    }

    /// Returns the source key this registry belongs to.
    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// Returns the descriptor for a config key.
    pub fn descriptor(&self, key: &str) -> ConfigResult<&PropertyDescriptor> {
        self.descriptors
            .get(key)
            .ok_or_else(|| ConfigError::MissingPropertyMapping {
                source_key: self.source_key.clone(),
                key: key.to_string(),
            })
    }

    /// Returns the display name for a config key.
    pub fn display_name(&self, key: &str) -> ConfigResult<&str> {
        self.descriptor(key).map(|d| d.display_name.as_str())
    }

    /// Checks that every key a source emits has a mapping.
    pub fn require_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> ConfigResult<()> {
        for key in keys {
            self.descriptor(key)?;
        }
        Ok(())
    }

    /// Returns true if any descriptor uses the given display name.
    pub fn has_display_name(&self, name: &str) -> bool {
        self.descriptors.values().any(|d| d.display_name == name)
    }

    /// Iterates over `(key, descriptor)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyDescriptor)> {
        self.descriptors.iter().map(|(k, d)| (k.as_str(), d))
    }

    /// Builds a write payload from config-keyed values.
    ///
    /// Disabled properties are dropped; empty values are skipped. A key with
    /// no descriptor, or a value that cannot take the declared type, is a
    /// configuration error.
    pub fn payload<I>(&self, values: I) -> ConfigResult<PropertyMap>
    where
        I: IntoIterator<Item = (&'static str, PropertyValue)>,
    {
        let mut map = PropertyMap::new();
        for (key, value) in values {
            let descriptor = self.descriptor(key)?;
            if !descriptor.enabled || value.is_empty() {
                continue;
            }
            let actual = value.kind();
            let value = coerce(descriptor.kind, value).ok_or_else(|| {
                ConfigError::PropertyTypeMismatch {
                    source_key: self.source_key.clone(),
                    key: key.to_string(),
                    declared: descriptor.kind.as_str(),
                    actual: actual.as_str(),
                }
            })?;
            map.insert(descriptor.display_name.clone(), value);
        }
        Ok(map)
    }
}

/// Re-types a value to the declared type. Only textual values convert, and
/// only into another textual type.
fn coerce(kind: PropertyType, value: PropertyValue) -> Option<PropertyValue> {
    if value.kind() == kind {
        return Some(value);
    }
    value.as_str().and_then(|text| PropertyValue::text_as(kind, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PropertyConfig {
        let mut descriptors = BTreeMap::new();
        descriptors.insert(
            "weight_lbs".to_string(),
            PropertyDescriptor::new("Weight (lbs)", PropertyType::Number),
        );
        descriptors.insert(
            "bone_mass".to_string(),
            PropertyDescriptor::new("Bone Mass", PropertyType::Number).enabled(false),
        );
        descriptors.insert(
            "notes".to_string(),
            PropertyDescriptor::new("Notes", PropertyType::RichText),
        );
        PropertyConfig::new("body_measurement", descriptors).unwrap()
    }

    mod registry {
        use super::*;

        #[test]
        fn disabled_properties_never_reach_payload() {
            let payload = registry()
                .payload([
                    ("weight_lbs", PropertyValue::Number(Some(172.4))),
                    ("bone_mass", PropertyValue::Number(Some(7.1))),
                ])
                .unwrap();
            assert!(payload.contains("Weight (lbs)"));
            assert!(!payload.contains("Bone Mass"));
            assert_eq!(payload.len(), 1);
        }

        #[test]
        fn missing_mapping_is_a_config_error() {
            let err = registry()
                .payload([("fat_ratio", PropertyValue::Number(Some(0.2)))])
                .unwrap_err();
            assert_eq!(
                err,
                ConfigError::MissingPropertyMapping {
                    source_key: "body_measurement".into(),
                    key: "fat_ratio".into(),
                }
            );
        }

        #[test]
        fn empty_values_are_skipped_and_text_is_retyped() {
            let payload = registry()
                .payload([
                    ("weight_lbs", PropertyValue::Number(None)),
                    ("notes", PropertyValue::Text("morning".into())),
                ])
                .unwrap();
            assert!(!payload.contains("Weight (lbs)"));
            assert_eq!(
                payload.get("Notes"),
                Some(&PropertyValue::RichText("morning".into()))
            );
        }

        #[test]
        fn number_into_text_property_is_rejected() {
            let err = registry()
                .payload([("notes", PropertyValue::Number(Some(3.0)))])
                .unwrap_err();
            assert_eq!(
                err,
                ConfigError::PropertyTypeMismatch {
                    source_key: "body_measurement".into(),
                    key: "notes".into(),
                    declared: "rich_text",
                    actual: "number",
                }
            );

            let err = registry()
                .payload([("weight_lbs", PropertyValue::Text("172.4".into()))])
                .unwrap_err();
            assert!(err.to_string().contains("declared number"));
        }

        #[test]
        fn duplicate_display_names_are_rejected() {
            let mut descriptors = BTreeMap::new();
            descriptors.insert("a".into(), PropertyDescriptor::new("Same", PropertyType::Text));
            descriptors.insert("b".into(), PropertyDescriptor::new("Same", PropertyType::Number));
            let err = PropertyConfig::new("commit", descriptors).unwrap_err();
            assert!(matches!(err, ConfigError::DuplicateProperty { .. }));
        }

        #[test]
        fn require_keys_reports_first_missing() {
            let err = registry()
                .require_keys(["weight_lbs", "water_kg"])
                .unwrap_err();
            assert!(err.to_string().contains("water_kg"));
        }

        #[test]
        fn descriptor_deserializes_with_default_enabled() {
            let d: PropertyDescriptor =
                serde_json::from_str(r#"{"display_name":"Steps","type":"number"}"#).unwrap();
            assert!(d.enabled);
            assert_eq!(d.kind, PropertyType::Number);
        }
    }

    mod values {
        use super::*;

        #[test]
        fn display_formats() {
            assert_eq!(PropertyValue::Number(Some(7.0)).display(), Some("7".into()));
            assert_eq!(PropertyValue::Number(Some(7.256)).display(), Some("7.26".into()));
            assert_eq!(PropertyValue::Number(Some(7.5)).display(), Some("7.5".into()));
            assert_eq!(PropertyValue::Number(None).display(), None);
            assert_eq!(PropertyValue::Select(Some(String::new())).display(), None);
            assert_eq!(PropertyValue::Checkbox(false).display(), Some("false".into()));
        }

        #[test]
        fn page_extraction() {
            let mut props = BTreeMap::new();
            props.insert("Name".into(), PropertyValue::Title("Morning Run".into()));
            props.insert("Synced".into(), PropertyValue::Checkbox(true));
            props.insert(
                "Date".into(),
                PropertyValue::Date(Some(DateValue::Day(
                    NaiveDate::from_ymd_opt(2025, 10, 15).unwrap(),
                ))),
            );
            let page = Page::new("p1", props);
            assert_eq!(page.text("Name"), Some("Morning Run"));
            assert!(page.checkbox("Synced"));
            assert!(!page.checkbox("Missing"));
            assert_eq!(page.date("Date").unwrap().to_string(), "2025-10-15");
            assert_eq!(page.number("Name"), None);
        }

        #[test]
        fn envelope_serde() {
            let value = PropertyValue::Number(Some(8.5));
            let json = serde_json::to_string(&value).unwrap();
            assert_eq!(json, r#"{"type":"number","value":8.5}"#);
            let back: PropertyValue = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value);
        }

        #[test]
        fn date_value_parses_both_shapes() {
            let day: DateValue = serde_json::from_str("\"2025-10-15\"").unwrap();
            assert!(matches!(day, DateValue::Day(_)));
            let instant: DateValue =
                serde_json::from_str("\"2025-10-15T07:00:00-07:00\"").unwrap();
            assert!(matches!(instant, DateValue::Instant(_)));
            assert_eq!(instant.day(), NaiveDate::from_ymd_opt(2025, 10, 15).unwrap());
        }
    }
}
