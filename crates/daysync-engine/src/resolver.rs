//! Calendar routing.

use std::collections::BTreeMap;

use daysync_core::{ConfigError, ConfigResult, Page};
use serde::{Deserialize, Serialize};

/// One named value list of a category mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub calendar_id: String,
    pub values: Vec<String>,
}

/// How a routing key turns into a calendar id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarMapping {
    /// Always the same calendar.
    Direct { calendar_id: String },
    /// The page property's value, matched exactly against a table.
    Property {
        property: String,
        values: BTreeMap<String, String>,
    },
    /// The page property's value, matched case-insensitively against
    /// value lists.
    Category {
        property: String,
        categories: Vec<CategoryRule>,
    },
}

impl CalendarMapping {
    fn validate(&self, key: &str) -> ConfigResult<()> {
        let empty = |id: &str| id.trim().is_empty();
        let bad = match self {
            Self::Direct { calendar_id } => empty(calendar_id),
            Self::Property { property, values } => {
                property.trim().is_empty() || values.values().any(|id| empty(id))
            }
            Self::Category {
                property,
                categories,
            } => property.trim().is_empty() || categories.iter().any(|c| empty(&c.calendar_id)),
        };
        if bad {
            return Err(ConfigError::invalid(format!(
                "calendar mapping {key} has an empty property or calendar id"
            )));
        }
        Ok(())
    }
}

/// Resolves routing keys to calendar ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarIdResolver {
    mappings: BTreeMap<String, CalendarMapping>,
}

impl CalendarIdResolver {
    /// Validates and wraps a mapping table.
    pub fn new(mappings: BTreeMap<String, CalendarMapping>) -> ConfigResult<Self> {
        for (key, mapping) in &mappings {
            mapping.validate(key)?;
        }
        Ok(Self { mappings })
    }

    /// Returns the mapping for a routing key.
    pub fn mapping(&self, key: &str) -> ConfigResult<&CalendarMapping> {
        self.mappings
            .get(key)
            .ok_or_else(|| ConfigError::UnknownCalendarMapping(key.to_string()))
    }

    /// Returns true if the routing key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.mappings.contains_key(key)
    }

    /// Resolves the calendar for a page.
    ///
    /// An unknown key is a configuration error. A page whose routing value
    /// is missing or unmapped resolves to `None`.
    pub fn resolve(&self, key: &str, page: &Page) -> ConfigResult<Option<String>> {
        let resolved = match self.mapping(key)? {
            CalendarMapping::Direct { calendar_id } => Some(calendar_id.clone()),
            CalendarMapping::Property { property, values } => routing_value(page, property)
                .and_then(|v| values.get(&v).cloned()),
            CalendarMapping::Category {
                property,
                categories,
            } => routing_value(page, property).and_then(|v| {
                let v = v.trim().to_lowercase();
                categories
                    .iter()
                    .find(|c| c.values.iter().any(|cv| cv.trim().to_lowercase() == v))
                    .map(|c| c.calendar_id.clone())
            }),
        };
        Ok(resolved)
    }
}

fn routing_value(page: &Page, property: &str) -> Option<String> {
    page.property(property).and_then(|v| v.display())
}
