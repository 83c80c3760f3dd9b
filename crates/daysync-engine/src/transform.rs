//! Config-driven transformation of stored pages into calendar events.
//!
//! An [`EventConfig`] names the store properties to extract, how to build the
//! start and end, which calendar to route to, and the summary and
//! description templates. [`EventTransformerBuilder`] validates it once and
//! produces an [`EventTransformer`] that can be applied to any page of the
//! source.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone,
};
use chrono_tz::Tz;
use daysync_core::{
    CalendarEvent, ConfigError, ConfigResult, DataError, DataResult, DateValue, EventSpan, Page,
    PropertyValue, SourceKind, Template,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::EngineResult;
use crate::resolver::CalendarIdResolver;

/// Summary used when the rendered summary is blank.
pub const DEFAULT_FALLBACK_SUMMARY: &str = "Untitled event";

/// Whole-day or timed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(alias = "allDay")]
    AllDay,
    #[serde(alias = "dateTime")]
    DateTime,
}

/// Where one end of an event comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSource {
    /// A single extracted value: a date, an instant, or an ISO string.
    Field(String),
    /// A date value combined with a time-of-day value.
    Pair { date: String, time: String },
}

impl TimeSource {
    fn names(&self) -> Vec<&str> {
        match self {
            Self::Field(f) => vec![f.as_str()],
            Self::Pair { date, time } => vec![date.as_str(), time.as_str()],
        }
    }
}

/// Unit of a duration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
}

impl DurationUnit {
    fn delta(&self, amount: f64) -> Option<TimeDelta> {
        let secs = match self {
            Self::Seconds => amount,
            Self::Minutes => amount * 60.0,
            Self::Hours => amount * 3600.0,
        };
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        TimeDelta::try_milliseconds((secs * 1000.0).round() as i64)
    }
}

/// End computed as start + a duration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSpec {
    pub field: String,
    pub unit: DurationUnit,
}

/// Declarative configuration of one event transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Source whose pages are transformed.
    pub source: String,
    /// Routing key into the calendar mappings.
    pub calendar: String,
    pub event_type: EventType,
    pub summary: Template,
    #[serde(default)]
    pub description: Option<Template>,
    pub start: TimeSource,
    #[serde(default)]
    pub end: Option<TimeSource>,
    #[serde(default)]
    pub end_from_duration: Option<DurationSpec>,
    /// Extracted name → store property.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub fallback_summary: Option<String>,
}

/// Values extracted from a page, keyed by extraction name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted(BTreeMap<String, PropertyValue>);

impl Extracted {
    /// Returns a value by name; empty values read as absent.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name).filter(|v| !v.is_empty())
    }

    /// Renders a value for interpolation.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(PropertyValue::display)
    }

    fn require(&self, name: &str) -> DataResult<&PropertyValue> {
        self.get(name).ok_or_else(|| DataError::missing(name))
    }
}

/// A function computing summary or description text.
pub type TextFn = Arc<dyn Fn(&Extracted) -> String + Send + Sync>;

#[derive(Clone)]
enum TextSpec {
    Template(Template),
    Function(TextFn),
}

impl TextSpec {
    fn render(&self, values: &Extracted) -> String {
        match self {
            Self::Template(t) => t.render(|name| values.text(name)),
            Self::Function(f) => f(values),
        }
    }
}

impl fmt::Debug for TextSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(&t.source()).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Builds an [`EventTransformer`] from an [`EventConfig`].
pub struct EventTransformerBuilder {
    name: String,
    config: EventConfig,
    summary: Option<TextFn>,
    description: Option<TextFn>,
}

impl EventTransformerBuilder {
    /// Starts a builder for the named config.
    pub fn new(name: impl Into<String>, config: EventConfig) -> Self {
        Self {
            name: name.into(),
            config,
            summary: None,
            description: None,
        }
    }

    /// Builder: compute the summary with a function instead of the template.
    pub fn summary_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Extracted) -> String + Send + Sync + 'static,
    {
        self.summary = Some(Arc::new(f));
        self
    }

    /// Builder: compute the description with a function.
    pub fn description_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Extracted) -> String + Send + Sync + 'static,
    {
        self.description = Some(Arc::new(f));
        self
    }

    /// Validates the config and produces the transformer.
    pub fn build(
        self,
        resolver: Arc<CalendarIdResolver>,
        timezone: Tz,
    ) -> ConfigResult<EventTransformer> {
        let config = self.config;
        let name = self.name;
        let source: SourceKind = config.source.parse()?;
        resolver.mapping(&config.calendar)?;

        let mut referenced: Vec<&str> = config.start.names();
        if let Some(end) = &config.end {
            referenced.extend(end.names());
        }
        if let Some(duration) = &config.end_from_duration {
            referenced.push(&duration.field);
        }
        for field in referenced {
            if !config.properties.contains_key(field) {
                return Err(ConfigError::invalid(format!(
                    "event {name}: {field} is not listed in properties"
                )));
            }
        }

        let summary = match self.summary {
            Some(f) => TextSpec::Function(f),
            None => TextSpec::Template(config.summary.clone()),
        };
        let description = match (self.description, &config.description) {
            (Some(f), _) => Some(TextSpec::Function(f)),
            (None, Some(t)) => Some(TextSpec::Template(t.clone())),
            (None, None) => None,
        };
        let fallback_summary = config
            .fallback_summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FALLBACK_SUMMARY.to_string());

        Ok(EventTransformer {
            name,
            source,
            calendar: config.calendar,
            event_type: config.event_type,
            start: config.start,
            end: config.end,
            end_from_duration: config.end_from_duration,
            properties: config.properties,
            summary,
            description,
            fallback_summary,
            resolver,
            timezone,
        })
    }
}

/// Turns pages of one source into calendar events.
#[derive(Debug, Clone)]
pub struct EventTransformer {
    name: String,
    source: SourceKind,
    calendar: String,
    event_type: EventType,
    start: TimeSource,
    end: Option<TimeSource>,
    end_from_duration: Option<DurationSpec>,
    properties: BTreeMap<String, String>,
    summary: TextSpec,
    description: Option<TextSpec>,
    fallback_summary: String,
    resolver: Arc<CalendarIdResolver>,
    timezone: Tz,
}

impl EventTransformer {
    /// Returns the transformer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the source whose pages this transforms.
    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Extracts every named property from a page.
    pub fn extract(&self, page: &Page) -> Extracted {
        Extracted(
            self.properties
                .iter()
                .filter_map(|(name, prop)| page.property(prop).map(|v| (name.clone(), v.clone())))
                .collect(),
        )
    }

    /// Resolves the destination calendar for a page.
    pub fn calendar_id(&self, page: &Page) -> ConfigResult<String> {
        self.resolver
            .resolve(&self.calendar, page)?
            .ok_or_else(|| ConfigError::MissingCalendarId(format!("event {} page {}", self.name, page.id)))
    }

    /// Builds the event for a page.
    pub fn transform(&self, page: &Page) -> EngineResult<CalendarEvent> {
        let values = self.extract(page);
        let calendar_id = self.calendar_id(page)?;

        let span = match self.event_type {
            EventType::AllDay => self.all_day_span(&values)?,
            EventType::DateTime => self.timed_span(&values)?,
        };

        let summary = self.summary.render(&values);
        let summary = if summary.trim().is_empty() {
            self.fallback_summary.clone()
        } else {
            summary
        };
        let description = self
            .description
            .as_ref()
            .map(|d| d.render(&values))
            .unwrap_or_default();

        trace!(event = %self.name, page_id = %page.id, %calendar_id, "transformed page");
        Ok(CalendarEvent::new(calendar_id, summary, description, span))
    }

    fn all_day_span(&self, values: &Extracted) -> DataResult<EventSpan> {
        let start = day_of(values, &self.start)?;
        let last = match &self.end {
            Some(end) if has_any(values, end) => day_of(values, end)?,
            _ => start,
        };
        EventSpan::all_day(start, last)
    }

    fn timed_span(&self, values: &Extracted) -> DataResult<EventSpan> {
        let start = self.instant_of(values, &self.start)?;
        let end = match (&self.end, &self.end_from_duration) {
            (Some(end), _) if has_any(values, end) => self.instant_of(values, end)?,
            (_, Some(duration)) => {
                let value = values.require(&duration.field)?;
                let amount = value.as_number().ok_or_else(|| {
                    DataError::invalid_date(
                        value.display().unwrap_or_default(),
                        format!("{} is not a number", duration.field),
                    )
                })?;
                let delta = duration.unit.delta(amount).ok_or_else(|| {
                    DataError::invalid_date(amount.to_string(), "invalid duration")
                })?;
                start.checked_add_signed(delta).ok_or_else(|| {
                    DataError::invalid_date(amount.to_string(), "end out of range")
                })?
            }
            (Some(end), None) => return Err(DataError::missing(end.names().join("/"))),
            (None, None) => return Err(DataError::missing("end")),
        };
        EventSpan::timed(start, end, self.timezone.name())
    }

    fn instant_of(&self, values: &Extracted, source: &TimeSource) -> DataResult<DateTime<FixedOffset>> {
        match source {
            TimeSource::Field(name) => match values.require(name)? {
                PropertyValue::Date(Some(DateValue::Instant(dt))) => Ok(*dt),
                PropertyValue::Date(Some(DateValue::Day(d))) => Err(DataError::invalid_date(
                    d.to_string(),
                    format!("{name} has no time of day"),
                )),
                other => {
                    let text = other.display().unwrap_or_default();
                    parse_instant(&text, &self.timezone)
                }
            },
            TimeSource::Pair { date, time } => {
                let day = day_value(date, values.require(date)?)?;
                let tod = match values.require(time)? {
                    PropertyValue::Date(Some(DateValue::Instant(dt))) => dt.time(),
                    other => parse_time_of_day(&other.display().unwrap_or_default())?,
                };
                localize(day.and_time(tod), &self.timezone)
            }
        }
    }
}

fn has_any(values: &Extracted, source: &TimeSource) -> bool {
    source.names().iter().any(|n| values.get(n).is_some())
}

fn day_of(values: &Extracted, source: &TimeSource) -> DataResult<NaiveDate> {
    let name = match source {
        TimeSource::Field(f) => f,
        TimeSource::Pair { date, .. } => date,
    };
    day_value(name, values.require(name)?)
}

fn day_value(name: &str, value: &PropertyValue) -> DataResult<NaiveDate> {
    match value {
        PropertyValue::Date(Some(d)) => Ok(d.day()),
        other => {
            let text = other.display().unwrap_or_default();
            parse_day(&text).ok_or_else(|| {
                DataError::invalid_date(text.clone(), format!("{name} is not a YYYY-MM-DD date"))
            })
        }
    }
}

/// Reads `YYYY-MM-DD`, also as the date part of an ISO datetime.
fn parse_day(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let date_part = match text.split_once('T') {
        Some((d, _)) => d,
        None => text,
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn parse_instant(text: &str, tz: &Tz) -> DataResult<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
        .map_err(|_| DataError::invalid_date(text, "expected an ISO datetime"))?;
    localize(naive, tz)
}

/// Parses `HH:MM`, `HH:MM:SS` or `H:MM AM/PM`.
pub fn parse_time_of_day(text: &str) -> DataResult<NaiveTime> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    let compact = upper.replace(' ', "");
    let parsed = if compact.ends_with("AM") || compact.ends_with("PM") {
        NaiveTime::parse_from_str(&compact, "%I:%M%p")
            .or_else(|_| NaiveTime::parse_from_str(&compact, "%I:%M:%S%p"))
    } else {
        NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
    };
    parsed.map_err(|_| DataError::InvalidTime {
        value: text.to_string(),
    })
}

/// Resolves a wall-clock time in `tz`. An ambiguous time takes the earlier
/// instant; a time skipped by a spring-forward gap keeps the offset in force
/// before the gap, so 02:30 on a one-hour jump becomes 03:30.
fn localize(naive: NaiveDateTime, tz: &Tz) -> DataResult<DateTime<FixedOffset>> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return Ok(dt.fixed_offset());
    }
    naive
        .checked_sub_signed(TimeDelta::hours(3))
        .and_then(|before| tz.from_local_datetime(&before).earliest())
        .and_then(|before| {
            let offset = TimeDelta::seconds(i64::from(before.offset().fix().local_minus_utc()));
            naive.checked_sub_signed(offset)
        })
        .map(|utc| tz.from_utc_datetime(&utc).fixed_offset())
        .ok_or_else(|| {
            DataError::invalid_date(
                naive.to_string(),
                format!("does not exist in {}", tz.name()),
            )
        })
}
