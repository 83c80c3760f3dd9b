//! Source date normalization.
//!
//! Every source encodes its event date differently. This module maps each
//! encoding onto exactly one [`CanonicalDate`] in the destination timezone:
//!
//! ```text
//! RawDate ──parse──▶ ParsedDate ──extract──▶ NaiveDate ──offset──▶ CanonicalDate
//! ```
//!
//! The loose per-source [`DateHandlingConfig`] is validated into a
//! [`DateRule`]. A night-of rule cannot carry a residual offset: the variant
//! has no field for one, so the day shift is never applied twice.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ConfigError, ConfigResult, DataError, DataResult};
use crate::source::SourceKind;
use crate::time::CanonicalDate;

/// How a source writes its dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// A fixed calendar string, `YYYY-MM-DD`.
    CalendarDate,
    /// An ISO datetime in the wall clock of the event, with or without an
    /// offset suffix.
    LocalIso,
    /// An ISO datetime describing an instant, usually with a `Z` suffix.
    UtcIso,
    /// Seconds since the Unix epoch.
    UnixSeconds,
}

impl SourceFormat {
    fn as_str(&self) -> &'static str {
        match self {
            Self::CalendarDate => "calendar_date",
            Self::LocalIso => "local_iso",
            Self::UtcIso => "utc_iso",
            Self::UnixSeconds => "unix_seconds",
        }
    }
}

/// The domain transform applied after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Shift a wake-up date back to the night the event began.
    NightOf,
    /// Convert an instant into the destination timezone.
    ToTimezone,
    /// Keep the date exactly as written, dropping the time and any offset.
    StripTime,
    /// The value already is the canonical calendar date.
    Identity,
}

impl ExtractionMethod {
    fn as_str(&self) -> &'static str {
        match self {
            Self::NightOf => "night_of",
            Self::ToTimezone => "to_timezone",
            Self::StripTime => "strip_time",
            Self::Identity => "identity",
        }
    }
}

/// Per-source date handling as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateHandlingConfig {
    pub source_format: SourceFormat,
    pub extraction_method: ExtractionMethod,
    /// Residual whole-day adjustment applied after extraction.
    #[serde(default)]
    pub date_offset: i64,
}

/// Extraction methods that do not shift the day on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlainExtraction {
    ToTimezone,
    StripTime,
    Identity,
}

/// A validated date handling rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRule {
    /// Night-of: the written day minus one. Carries no residual offset.
    NightOf { format: SourceFormat },
    /// A non-shifting extraction followed by a residual offset in days.
    Plain {
        format: SourceFormat,
        extraction: PlainExtraction,
        offset_days: i64,
    },
}

impl DateRule {
    /// Validates a configuration entry for the given source.
    pub fn from_config(source: SourceKind, config: &DateHandlingConfig) -> ConfigResult<Self> {
        let format = config.source_format;
        let extraction = match config.extraction_method {
            ExtractionMethod::NightOf => {
                if config.date_offset != 0 {
                    return Err(ConfigError::ConflictingDayShift {
                        source_key: source.to_string(),
                        method: config.extraction_method.as_str().to_string(),
                        offset: config.date_offset,
                    });
                }
                return Ok(Self::NightOf { format });
            }
            ExtractionMethod::ToTimezone => PlainExtraction::ToTimezone,
            ExtractionMethod::StripTime => PlainExtraction::StripTime,
            ExtractionMethod::Identity => {
                if format != SourceFormat::CalendarDate {
                    return Err(ConfigError::invalid(format!(
                        "source {source}: identity extraction requires calendar_date, not {}",
                        format.as_str()
                    )));
                }
                PlainExtraction::Identity
            }
        };
        Ok(Self::Plain {
            format,
            extraction,
            offset_days: config.date_offset,
        })
    }

    /// Returns the source format this rule parses.
    pub fn format(&self) -> SourceFormat {
        match self {
            Self::NightOf { format } | Self::Plain { format, .. } => *format,
        }
    }
}

/// A raw date value as a source delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    /// Seconds since the Unix epoch.
    UnixSeconds(i64),
    /// Any textual encoding.
    Text(String),
}

impl From<&str> for RawDate {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawDate {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for RawDate {
    fn from(value: i64) -> Self {
        Self::UnixSeconds(value)
    }
}

impl fmt::Display for RawDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnixSeconds(secs) => write!(f, "{secs}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Intermediate parse result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParsedDate {
    Day(NaiveDate),
    WithOffset(DateTime<FixedOffset>),
    Wall(NaiveDateTime),
    Instant(DateTime<Utc>),
}

fn parse(format: SourceFormat, raw: &RawDate) -> DataResult<ParsedDate> {
    match (format, raw) {
        (SourceFormat::CalendarDate, RawDate::Text(text)) => {
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map(ParsedDate::Day)
                .map_err(|e| DataError::invalid_date(text, format!("expected YYYY-MM-DD: {e}")))
        }
        (SourceFormat::LocalIso, RawDate::Text(text)) => {
            let text = text.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Ok(ParsedDate::WithOffset(dt));
            }
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .map(ParsedDate::Wall)
                .map_err(|e| DataError::invalid_date(text, format!("expected ISO datetime: {e}")))
        }
        (SourceFormat::UtcIso, RawDate::Text(text)) => DateTime::parse_from_rfc3339(text.trim())
            .map(|dt| ParsedDate::Instant(dt.with_timezone(&Utc)))
            .map_err(|e| DataError::invalid_date(text, format!("expected RFC 3339 instant: {e}"))),
        (SourceFormat::UnixSeconds, RawDate::UnixSeconds(secs)) => from_unix(*secs),
        (SourceFormat::UnixSeconds, RawDate::Text(text)) => {
            let secs = text.trim().parse::<i64>().map_err(|_| {
                DataError::invalid_date(text, "expected Unix seconds")
            })?;
            from_unix(secs)
        }
        (format, RawDate::UnixSeconds(secs)) => Err(DataError::invalid_date(
            secs.to_string(),
            format!("numeric timestamp given for {} source", format.as_str()),
        )),
    }
}

fn from_unix(secs: i64) -> DataResult<ParsedDate> {
    DateTime::from_timestamp(secs, 0)
        .map(ParsedDate::Instant)
        .ok_or_else(|| DataError::invalid_date(secs.to_string(), "timestamp out of range"))
}

/// The date as it reads on the wall clock of the source.
fn written_day(parsed: ParsedDate, tz: &Tz) -> NaiveDate {
    match parsed {
        ParsedDate::Day(d) => d,
        ParsedDate::WithOffset(dt) => dt.naive_local().date(),
        ParsedDate::Wall(dt) => dt.date(),
        ParsedDate::Instant(dt) => dt.with_timezone(tz).date_naive(),
    }
}

fn local_day(parsed: ParsedDate, tz: &Tz) -> NaiveDate {
    match parsed {
        ParsedDate::Day(d) => d,
        ParsedDate::WithOffset(dt) => dt.with_timezone(tz).date_naive(),
        ParsedDate::Wall(dt) => dt.date(),
        ParsedDate::Instant(dt) => dt.with_timezone(tz).date_naive(),
    }
}

fn stripped_day(parsed: ParsedDate) -> NaiveDate {
    match parsed {
        ParsedDate::Day(d) => d,
        ParsedDate::WithOffset(dt) => dt.naive_local().date(),
        ParsedDate::Wall(dt) => dt.date(),
        ParsedDate::Instant(dt) => dt.date_naive(),
    }
}

/// Error returned by [`DateNormalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Maps raw source dates onto canonical calendar days.
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    timezone: Tz,
    rules: HashMap<SourceKind, DateRule>,
}

impl DateNormalizer {
    /// Creates a normalizer with no rules for the given destination timezone.
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            rules: HashMap::new(),
        }
    }

    /// Validates and installs one rule per configured source.
    pub fn from_configs<'a>(
        timezone: Tz,
        configs: impl IntoIterator<Item = (SourceKind, &'a DateHandlingConfig)>,
    ) -> ConfigResult<Self> {
        let mut normalizer = Self::new(timezone);
        for (kind, config) in configs {
            let rule = DateRule::from_config(kind, config)?;
            normalizer.rules.insert(kind, rule);
        }
        Ok(normalizer)
    }

    /// Builder: install a validated rule.
    pub fn with_rule(mut self, kind: SourceKind, rule: DateRule) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    /// Returns the destination timezone.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Returns the rule for a source.
    pub fn rule(&self, kind: SourceKind) -> ConfigResult<&DateRule> {
        self.rules
            .get(&kind)
            .ok_or_else(|| ConfigError::MissingDateRule(kind.to_string()))
    }

    /// Normalizes a raw value for a source given by its config key.
    pub fn normalize_key(&self, key: &str, raw: &RawDate) -> Result<CanonicalDate, NormalizeError> {
        let kind: SourceKind = key.parse()?;
        self.normalize(kind, raw)
    }

    /// Normalizes a raw value: parse, extract, then apply the residual offset.
    pub fn normalize(
        &self,
        kind: SourceKind,
        raw: &RawDate,
    ) -> Result<CanonicalDate, NormalizeError> {
        let rule = self.rule(kind)?;
        let parsed = parse(rule.format(), raw)?;

        let (day, offset) = match *rule {
            DateRule::NightOf { .. } => (written_day(parsed, &self.timezone), -1),
            DateRule::Plain {
                extraction,
                offset_days,
                ..
            } => {
                let day = match extraction {
                    PlainExtraction::ToTimezone => local_day(parsed, &self.timezone),
                    PlainExtraction::StripTime => stripped_day(parsed),
                    PlainExtraction::Identity => match parsed {
                        ParsedDate::Day(d) => d,
                        _ => {
                            return Err(DataError::invalid_date(
                                raw.to_string(),
                                "identity extraction expects a calendar date",
                            )
                            .into());
                        }
                    },
                };
                (day, offset_days)
            }
        };

        let canonical = CanonicalDate::new(day).shift_days(offset).ok_or_else(|| {
            DataError::invalid_date(raw.to_string(), "date offset out of range")
        })?;
        tracing::trace!(source = %kind, raw = %raw, date = %canonical, "normalized date");
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LA: Tz = chrono_tz::America::Los_Angeles;

    fn day(y: i32, m: u32, d: u32) -> CanonicalDate {
        CanonicalDate::from_ymd(y, m, d).unwrap()
    }

    fn config(format: SourceFormat, method: ExtractionMethod, offset: i64) -> DateHandlingConfig {
        DateHandlingConfig {
            source_format: format,
            extraction_method: method,
            date_offset: offset,
        }
    }

    fn normalizer(kind: SourceKind, cfg: DateHandlingConfig) -> DateNormalizer {
        DateNormalizer::from_configs(LA, [(kind, &cfg)]).unwrap()
    }

    mod rules {
        use super::*;

        #[test]
        fn night_of_with_zero_offset_is_valid() {
            let cfg = config(SourceFormat::CalendarDate, ExtractionMethod::NightOf, 0);
            let rule = DateRule::from_config(SourceKind::Sleep, &cfg).unwrap();
            assert_eq!(
                rule,
                DateRule::NightOf {
                    format: SourceFormat::CalendarDate
                }
            );
        }

        #[test]
        fn night_of_with_offset_is_rejected() {
            for offset in [-1, 1, 2] {
                let cfg = config(SourceFormat::CalendarDate, ExtractionMethod::NightOf, offset);
                let err = DateRule::from_config(SourceKind::Sleep, &cfg).unwrap_err();
                assert!(matches!(err, ConfigError::ConflictingDayShift { .. }));
            }
        }

        #[test]
        fn identity_requires_calendar_dates() {
            let cfg = config(SourceFormat::UtcIso, ExtractionMethod::Identity, 0);
            assert!(DateRule::from_config(SourceKind::Commit, &cfg).is_err());
        }

        #[test]
        fn deserializes_from_snake_case() {
            let cfg: DateHandlingConfig = serde_json::from_str(
                r#"{"source_format":"unix_seconds","extraction_method":"to_timezone"}"#,
            )
            .unwrap();
            assert_eq!(cfg.source_format, SourceFormat::UnixSeconds);
            assert_eq!(cfg.extraction_method, ExtractionMethod::ToTimezone);
            assert_eq!(cfg.date_offset, 0);
        }
    }

    mod normalize {
        use super::*;

        #[test]
        fn night_of_maps_wake_date_to_previous_day() {
            let n = normalizer(
                SourceKind::Sleep,
                config(SourceFormat::CalendarDate, ExtractionMethod::NightOf, 0),
            );
            let got = n.normalize(SourceKind::Sleep, &"2025-10-15".into()).unwrap();
            assert_eq!(got, day(2025, 10, 14));

            let got = n.normalize(SourceKind::Sleep, &"2025-03-01".into()).unwrap();
            assert_eq!(got, day(2025, 2, 28));
        }

        #[test]
        fn utc_instants_across_dst() {
            let n = normalizer(
                SourceKind::Commit,
                config(SourceFormat::UtcIso, ExtractionMethod::ToTimezone, 0),
            );
            // Both are 22:30 PDT the previous evening.
            let nov = n
                .normalize(SourceKind::Commit, &"2025-11-02T05:30:00Z".into())
                .unwrap();
            let jul = n
                .normalize(SourceKind::Commit, &"2025-07-02T05:30:00Z".into())
                .unwrap();
            assert_eq!(nov, day(2025, 11, 1));
            assert_eq!(jul, day(2025, 7, 1));

            // After the fall-back transition the offset is -08:00: 23:30 PST.
            let after = n
                .normalize(SourceKind::Commit, &"2025-11-03T07:30:00Z".into())
                .unwrap();
            assert_eq!(after, day(2025, 11, 2));
        }

        #[test]
        fn unix_seconds_convert_to_local_day() {
            let n = normalizer(
                SourceKind::BodyMeasurement,
                config(SourceFormat::UnixSeconds, ExtractionMethod::ToTimezone, 0),
            );
            // 2025-11-02T05:30:00Z
            let got = n
                .normalize(SourceKind::BodyMeasurement, &RawDate::UnixSeconds(1_762_061_400))
                .unwrap();
            assert_eq!(got, day(2025, 11, 1));
            // Numeric strings are accepted too. 2025-10-16T06:45:00Z.
            let got = n
                .normalize(SourceKind::BodyMeasurement, &"1760597100".into())
                .unwrap();
            assert_eq!(got, day(2025, 10, 15));
        }

        #[test]
        fn strip_time_ignores_offset_suffix() {
            let n = normalizer(
                SourceKind::Workout,
                config(SourceFormat::LocalIso, ExtractionMethod::StripTime, 0),
            );
            // Local wall time mislabeled as UTC: the written date wins.
            let got = n
                .normalize(SourceKind::Workout, &"2025-10-15T23:30:00Z".into())
                .unwrap();
            assert_eq!(got, day(2025, 10, 15));
            let got = n
                .normalize(SourceKind::Workout, &"2025-10-15T06:10:00".into())
                .unwrap();
            assert_eq!(got, day(2025, 10, 15));
        }

        #[test]
        fn residual_offset_applies_after_extraction() {
            let n = normalizer(
                SourceKind::GameSession,
                config(SourceFormat::CalendarDate, ExtractionMethod::Identity, 1),
            );
            let got = n
                .normalize(SourceKind::GameSession, &"2025-12-31".into())
                .unwrap();
            assert_eq!(got, day(2026, 1, 1));
        }

        #[test]
        fn unknown_source_key_is_a_config_error() {
            let n = DateNormalizer::new(LA);
            let err = n.normalize_key("fitbit", &"2025-10-15".into()).unwrap_err();
            assert_eq!(
                err,
                NormalizeError::Config(ConfigError::UnknownSource("fitbit".into()))
            );
        }

        #[test]
        fn known_source_without_rule_is_a_config_error() {
            let n = DateNormalizer::new(LA);
            let err = n.normalize(SourceKind::Sleep, &"2025-10-15".into()).unwrap_err();
            assert!(matches!(
                err,
                NormalizeError::Config(ConfigError::MissingDateRule(_))
            ));
        }

        #[test]
        fn malformed_values_are_data_errors() {
            let n = normalizer(
                SourceKind::Sleep,
                config(SourceFormat::CalendarDate, ExtractionMethod::NightOf, 0),
            );
            for raw in [RawDate::from("15/10/2025"), RawDate::UnixSeconds(1_760_597_100)] {
                let err = n.normalize(SourceKind::Sleep, &raw).unwrap_err();
                assert!(matches!(err, NormalizeError::Data(DataError::InvalidDate { .. })));
            }
        }
    }
}
