//! Engine configuration.
//!
//! [`EngineConfig`] is the deserialized TOML file. [`EngineConfig::validate`]
//! checks every mapping once at startup and produces [`Settings`], the
//! explicit value injected into the orchestrator. No field is defaulted
//! silently at sync time.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use daysync_core::{
    ConfigError, ConfigResult, DateHandlingConfig, DateNormalizer, PropertyConfig,
    PropertyDescriptor, SourceKind,
};
use daysync_store::RetryPolicy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineResult, SyncError};
use crate::record_store::{SourceSettings, StatusProperty, UniqueIdProperty, UniqueIdType};
use crate::resolver::{CalendarIdResolver, CalendarMapping};
use crate::source::required_property_keys;
use crate::transform::{EventConfig, EventTransformer, EventTransformerBuilder};

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_record_delay_ms() -> u64 {
    350
}

fn default_source_delay_ms() -> u64 {
    1000
}

/// The configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// IANA name of the destination timezone.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Pause between records, in milliseconds.
    #[serde(default = "default_record_delay_ms")]
    pub record_delay_ms: u64,

    /// Pause between sources in a "run all", in milliseconds.
    #[serde(default = "default_source_delay_ms")]
    pub source_delay_ms: u64,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Per-source settings keyed by source name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,

    /// Calendar routing keyed by mapping name.
    #[serde(default)]
    pub calendars: BTreeMap<String, CalendarMapping>,

    /// Event transformers keyed by name.
    #[serde(default)]
    pub events: BTreeMap<String, EventConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            record_delay_ms: default_record_delay_ms(),
            source_delay_ms: default_source_delay_ms(),
            retry: RetrySettings::default(),
            sources: BTreeMap::new(),
            calendars: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }
}

/// Retry settings for transient store failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    /// Converts to a retry policy.
    pub fn policy(&self) -> ConfigResult<RetryPolicy> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "retry.backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_backoff(
                Duration::from_millis(self.initial_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
                self.backoff_multiplier,
            ))
    }
}

/// Settings of one source as written in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub database_id: String,
    #[serde(default)]
    pub unique_id_property: Option<String>,
    #[serde(default)]
    pub unique_id_type: UniqueIdType,
    pub date_property: String,
    /// Checkbox marking a record as synced to the calendar.
    #[serde(default)]
    pub synced_property: Option<String>,
    /// Property holding the external calendar event id.
    #[serde(default)]
    pub event_id_property: Option<String>,
    #[serde(default)]
    pub date_handling: Option<DateHandlingConfig>,
    /// Config key → store property.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescriptor>,
}

impl SourceConfig {
    fn validate(&self, kind: SourceKind) -> ConfigResult<SourceSettings> {
        if self.database_id.trim().is_empty() {
            return Err(ConfigError::invalid(format!(
                "source {kind}: database_id is empty"
            )));
        }
        if self.date_property.trim().is_empty() {
            return Err(ConfigError::invalid(format!(
                "source {kind}: date_property is empty"
            )));
        }
        let status = StatusProperty::detect(
            kind,
            self.synced_property.as_deref(),
            self.event_id_property.as_deref(),
        )?;
        let unique_id = self
            .unique_id_property
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| UniqueIdProperty {
                name: name.to_string(),
                kind: self.unique_id_type,
            });

        let properties = PropertyConfig::new(kind.as_str(), self.properties.clone())?;
        properties.require_keys(required_property_keys(kind).iter().copied())?;

        let mut reserved: Vec<&str> = vec![self.date_property.as_str()];
        reserved.extend(unique_id.as_ref().map(|u| u.name.as_str()));
        reserved.extend(status.property_names());
        for (i, name) in reserved.iter().enumerate() {
            if properties.has_display_name(name) || reserved[..i].contains(name) {
                return Err(ConfigError::DuplicateProperty {
                    source_key: kind.to_string(),
                    display_name: name.to_string(),
                });
            }
        }

        Ok(SourceSettings {
            kind,
            database_id: self.database_id.clone(),
            unique_id,
            date_property: self.date_property.clone(),
            status,
            properties,
        })
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub timezone: Tz,
    pub normalizer: DateNormalizer,
    pub sources: BTreeMap<SourceKind, Arc<SourceSettings>>,
    pub resolver: Arc<CalendarIdResolver>,
    pub events: BTreeMap<String, EventTransformer>,
    pub record_delay: Duration,
    pub source_delay: Duration,
    pub retry: RetryPolicy,
}

impl Settings {
    /// Returns the settings of a source.
    pub fn source(&self, kind: SourceKind) -> ConfigResult<&Arc<SourceSettings>> {
        self.sources
            .get(&kind)
            .ok_or_else(|| ConfigError::invalid(format!("source {kind} is not configured")))
    }

    /// Returns a transformer by name.
    pub fn transformer(&self, name: &str) -> ConfigResult<&EventTransformer> {
        self.events
            .get(name)
            .ok_or_else(|| ConfigError::invalid(format!("no event transformer named {name}")))
    }

    /// Configured sources in "run all" order.
    pub fn source_kinds(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|k| self.sources.contains_key(k))
            .collect()
    }
}

impl EngineConfig {
    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> EngineResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SyncError::config_read(path, e))?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), sources = config.sources.len(), "loaded config");
        Ok(config)
    }

    /// Serializes back to TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validates every mapping and builds the settings.
    pub fn validate(&self) -> ConfigResult<Settings> {
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))?;

        let mut sources = BTreeMap::new();
        let mut date_rules = Vec::new();
        for (key, source) in &self.sources {
            let kind: SourceKind = key.parse()?;
            let handling = source
                .date_handling
                .as_ref()
                .ok_or_else(|| ConfigError::MissingDateRule(kind.to_string()))?;
            date_rules.push((kind, handling));
            sources.insert(kind, Arc::new(source.validate(kind)?));
        }
        let normalizer = DateNormalizer::from_configs(timezone, date_rules)?;

        let resolver = Arc::new(CalendarIdResolver::new(self.calendars.clone())?);

        let mut events = BTreeMap::new();
        for (name, config) in &self.events {
            let transformer = EventTransformerBuilder::new(name, config.clone())
                .build(resolver.clone(), timezone)?;
            if !sources.contains_key(&transformer.source()) {
                return Err(ConfigError::invalid(format!(
                    "event {name}: source {} is not configured",
                    transformer.source()
                )));
            }
            events.insert(name.clone(), transformer);
        }

        Ok(Settings {
            timezone,
            normalizer,
            sources,
            resolver,
            events,
            record_delay: Duration::from_millis(self.record_delay_ms),
            source_delay: Duration::from_millis(self.source_delay_ms),
            retry: self.retry.policy()?,
        })
    }
}
