//! Source records and the fetch port.
//!
//! A [`SourceRecord`] is the raw, already-fetched shape of one source row. It
//! carries a source-defined unique id, a raw date for the
//! [`DateNormalizer`], and a list of data values keyed by config key. The
//! config keys are mapped onto store properties by each source's
//! [`PropertyConfig`](daysync_core::PropertyConfig).

use chrono::{DateTime, NaiveDateTime, Utc};
use daysync_core::{
    CanonicalDate, DataError, DataResult, DateNormalizer, DateRange, DateValue, PropertyValue,
    RawDate, SourceKind,
};
use daysync_store::{BoxFuture, StoreResult};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// A data value keyed by its config key.
pub type FieldValue = (&'static str, PropertyValue);

const KG_TO_LBS: f64 = 2.204_622_62;

/// Config keys every source must map. The title is the row name in the
/// destination store.
pub fn required_property_keys(_kind: SourceKind) -> &'static [&'static str] {
    &["title"]
}

/// Config keys a source can emit.
pub fn property_keys(kind: SourceKind) -> &'static [&'static str] {
    match kind {
        SourceKind::Sleep => &[
            "title",
            "bedtime",
            "wake_time",
            "total_sleep_hours",
            "deep_sleep_hours",
            "rem_sleep_hours",
            "light_sleep_hours",
            "awake_hours",
            "efficiency",
            "lowest_heart_rate",
            "average_heart_rate",
            "average_hrv",
        ],
        SourceKind::Workout => &[
            "title",
            "sport_type",
            "start_time",
            "duration_minutes",
            "moving_minutes",
            "distance_km",
            "elevation_gain_m",
            "average_heart_rate",
            "calories",
        ],
        SourceKind::BodyMeasurement => &[
            "title",
            "measured_at",
            "weight_kg",
            "weight_lbs",
            "fat_percentage",
            "fat_mass_kg",
            "muscle_mass_kg",
            "bone_mass_kg",
            "hydration_kg",
        ],
        SourceKind::GameSession => &[
            "title",
            "app_id",
            "minutes_played",
            "hours_played",
            "session_count",
            "first_session",
            "last_session",
        ],
        SourceKind::Commit => &[
            "title",
            "sha",
            "repository",
            "message",
            "committed_at",
            "additions",
            "deletions",
            "files_changed",
        ],
    }
}

/// One night from the sleep tracker. `day` is the wake-up date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    pub id: String,
    pub day: String,
    #[serde(default)]
    pub bedtime_start: Option<String>,
    #[serde(default)]
    pub bedtime_end: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub total_sleep_duration: Option<i64>,
    #[serde(default)]
    pub deep_sleep_duration: Option<i64>,
    #[serde(default)]
    pub rem_sleep_duration: Option<i64>,
    #[serde(default)]
    pub light_sleep_duration: Option<i64>,
    #[serde(default)]
    pub awake_time: Option<i64>,
    #[serde(default)]
    pub efficiency: Option<f64>,
    #[serde(default)]
    pub lowest_heart_rate: Option<f64>,
    #[serde(default)]
    pub average_heart_rate: Option<f64>,
    #[serde(default)]
    pub average_hrv: Option<f64>,
}

impl SleepRecord {
    fn fields(&self) -> DataResult<Vec<FieldValue>> {
        let total_hours = self.total_sleep_duration.map(seconds_to_hours);
        let title = match total_hours {
            Some(h) => format!("Sleep {}h", daysync_core::format_number(h)),
            None => "Sleep".to_string(),
        };
        Ok(vec![
            ("title", PropertyValue::Title(title)),
            ("bedtime", instant(self.bedtime_start.as_deref())?),
            ("wake_time", instant(self.bedtime_end.as_deref())?),
            ("total_sleep_hours", PropertyValue::Number(total_hours)),
            (
                "deep_sleep_hours",
                PropertyValue::Number(self.deep_sleep_duration.map(seconds_to_hours)),
            ),
            (
                "rem_sleep_hours",
                PropertyValue::Number(self.rem_sleep_duration.map(seconds_to_hours)),
            ),
            (
                "light_sleep_hours",
                PropertyValue::Number(self.light_sleep_duration.map(seconds_to_hours)),
            ),
            (
                "awake_hours",
                PropertyValue::Number(self.awake_time.map(seconds_to_hours)),
            ),
            ("efficiency", PropertyValue::Number(self.efficiency)),
            ("lowest_heart_rate", PropertyValue::Number(self.lowest_heart_rate)),
            ("average_heart_rate", PropertyValue::Number(self.average_heart_rate)),
            ("average_hrv", PropertyValue::Number(self.average_hrv)),
        ])
    }
}

/// One activity from the fitness tracker.
///
/// `start_date_local` is local wall-clock time. Providers append a `Z` that
/// does not mean UTC; it is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sport_type: Option<String>,
    pub start_date_local: String,
    /// Seconds.
    #[serde(default)]
    pub elapsed_time: Option<i64>,
    /// Seconds.
    #[serde(default)]
    pub moving_time: Option<i64>,
    /// Metres.
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub total_elevation_gain: Option<f64>,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub calories: Option<f64>,
}

impl WorkoutRecord {
    fn fields(&self) -> DataResult<Vec<FieldValue>> {
        let wall = wall_clock(&self.start_date_local)?;
        Ok(vec![
            ("title", PropertyValue::Title(self.name.clone())),
            ("sport_type", PropertyValue::Select(self.sport_type.clone())),
            (
                "start_time",
                PropertyValue::Text(wall.format("%H:%M").to_string()),
            ),
            (
                "duration_minutes",
                PropertyValue::Number(self.elapsed_time.map(seconds_to_minutes)),
            ),
            (
                "moving_minutes",
                PropertyValue::Number(self.moving_time.map(seconds_to_minutes)),
            ),
            (
                "distance_km",
                PropertyValue::Number(self.distance.map(|m| round2(m / 1000.0))),
            ),
            (
                "elevation_gain_m",
                PropertyValue::Number(self.total_elevation_gain),
            ),
            ("average_heart_rate", PropertyValue::Number(self.average_heartrate)),
            ("calories", PropertyValue::Number(self.calories)),
        ])
    }
}

/// One measurement group from the smart scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyMeasurementRecord {
    pub grpid: i64,
    /// Unix seconds.
    pub date: i64,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    /// Percent.
    #[serde(default)]
    pub fat_ratio: Option<f64>,
    #[serde(default)]
    pub fat_mass_kg: Option<f64>,
    #[serde(default)]
    pub muscle_mass_kg: Option<f64>,
    #[serde(default)]
    pub bone_mass_kg: Option<f64>,
    #[serde(default)]
    pub hydration_kg: Option<f64>,
}

impl BodyMeasurementRecord {
    fn fields(&self) -> DataResult<Vec<FieldValue>> {
        let measured_at = DateTime::<Utc>::from_timestamp(self.date, 0).ok_or_else(|| {
            DataError::invalid_date(self.date.to_string(), "timestamp out of range")
        })?;
        let weight_lbs = self.weight_kg.map(|kg| round2(kg * KG_TO_LBS));
        let title = match weight_lbs {
            Some(lbs) => format!("Weight {} lbs", daysync_core::format_number(lbs)),
            None => "Measurement".to_string(),
        };
        Ok(vec![
            ("title", PropertyValue::Title(title)),
            (
                "measured_at",
                PropertyValue::Date(Some(DateValue::Instant(measured_at.fixed_offset()))),
            ),
            ("weight_kg", PropertyValue::Number(self.weight_kg)),
            ("weight_lbs", PropertyValue::Number(weight_lbs)),
            ("fat_percentage", PropertyValue::Number(self.fat_ratio)),
            ("fat_mass_kg", PropertyValue::Number(self.fat_mass_kg)),
            ("muscle_mass_kg", PropertyValue::Number(self.muscle_mass_kg)),
            ("bone_mass_kg", PropertyValue::Number(self.bone_mass_kg)),
            ("hydration_kg", PropertyValue::Number(self.hydration_kg)),
        ])
    }
}

/// Playtime for one game on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSessionRecord {
    pub app_id: i64,
    pub name: String,
    pub date: String,
    pub minutes_played: f64,
    #[serde(default)]
    pub session_count: Option<u32>,
    #[serde(default)]
    pub first_session: Option<String>,
    #[serde(default)]
    pub last_session: Option<String>,
}

impl GameSessionRecord {
    fn fields(&self) -> DataResult<Vec<FieldValue>> {
        Ok(vec![
            ("title", PropertyValue::Title(self.name.clone())),
            ("app_id", PropertyValue::Number(Some(self.app_id as f64))),
            ("minutes_played", PropertyValue::Number(Some(self.minutes_played))),
            (
                "hours_played",
                PropertyValue::Number(Some(round2(self.minutes_played / 60.0))),
            ),
            (
                "session_count",
                PropertyValue::Number(self.session_count.map(f64::from)),
            ),
            (
                "first_session",
                PropertyValue::Text(self.first_session.clone().unwrap_or_default()),
            ),
            (
                "last_session",
                PropertyValue::Text(self.last_session.clone().unwrap_or_default()),
            ),
        ])
    }
}

/// One commit from source control. `committed_at` is UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub repository: String,
    pub message: String,
    pub committed_at: String,
    #[serde(default)]
    pub additions: Option<i64>,
    #[serde(default)]
    pub deletions: Option<i64>,
    #[serde(default)]
    pub files_changed: Option<i64>,
}

impl CommitRecord {
    fn fields(&self) -> DataResult<Vec<FieldValue>> {
        let subject = self.message.lines().next().unwrap_or_default().trim();
        Ok(vec![
            ("title", PropertyValue::Title(subject.to_string())),
            ("sha", PropertyValue::Text(self.sha.clone())),
            ("repository", PropertyValue::Select(Some(self.repository.clone()))),
            ("message", PropertyValue::RichText(self.message.clone())),
            ("committed_at", instant(Some(&self.committed_at))?),
            (
                "additions",
                PropertyValue::Number(self.additions.map(|n| n as f64)),
            ),
            (
                "deletions",
                PropertyValue::Number(self.deletions.map(|n| n as f64)),
            ),
            (
                "files_changed",
                PropertyValue::Number(self.files_changed.map(|n| n as f64)),
            ),
        ])
    }
}

/// A raw record from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceRecord {
    Sleep(SleepRecord),
    Workout(WorkoutRecord),
    BodyMeasurement(BodyMeasurementRecord),
    GameSession(GameSessionRecord),
    Commit(CommitRecord),
}

impl SourceRecord {
    /// Parses a JSON array of one source's records.
    pub fn parse_batch(kind: SourceKind, json: &str) -> serde_json::Result<Vec<Self>> {
        fn wrap<T: serde::de::DeserializeOwned>(
            json: &str,
            f: fn(T) -> SourceRecord,
        ) -> serde_json::Result<Vec<SourceRecord>> {
            let rows: Vec<T> = serde_json::from_str(json)?;
            Ok(rows.into_iter().map(f).collect())
        }
        match kind {
            SourceKind::Sleep => wrap(json, Self::Sleep),
            SourceKind::Workout => wrap(json, Self::Workout),
            SourceKind::BodyMeasurement => wrap(json, Self::BodyMeasurement),
            SourceKind::GameSession => wrap(json, Self::GameSession),
            SourceKind::Commit => wrap(json, Self::Commit),
        }
    }

    /// Returns the source this record came from.
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Sleep(_) => SourceKind::Sleep,
            Self::Workout(_) => SourceKind::Workout,
            Self::BodyMeasurement(_) => SourceKind::BodyMeasurement,
            Self::GameSession(_) => SourceKind::GameSession,
            Self::Commit(_) => SourceKind::Commit,
        }
    }

    /// Returns the source-defined unique id.
    pub fn unique_id(&self) -> String {
        match self {
            Self::Sleep(r) => r.id.clone(),
            Self::Workout(r) => r.id.to_string(),
            Self::BodyMeasurement(r) => r.grpid.to_string(),
            Self::GameSession(r) => format!("{}-{}", r.app_id, r.date),
            Self::Commit(r) => r.sha.clone(),
        }
    }

    /// Returns the raw event date as the source delivers it.
    pub fn raw_date(&self) -> RawDate {
        match self {
            Self::Sleep(r) => RawDate::from(r.day.as_str()),
            Self::Workout(r) => RawDate::from(r.start_date_local.as_str()),
            Self::BodyMeasurement(r) => RawDate::UnixSeconds(r.date),
            Self::GameSession(r) => RawDate::from(r.date.as_str()),
            Self::Commit(r) => RawDate::from(r.committed_at.as_str()),
        }
    }

    /// Returns the data values keyed by config key.
    pub fn fields(&self) -> DataResult<Vec<FieldValue>> {
        match self {
            Self::Sleep(r) => r.fields(),
            Self::Workout(r) => r.fields(),
            Self::BodyMeasurement(r) => r.fields(),
            Self::GameSession(r) => r.fields(),
            Self::Commit(r) => r.fields(),
        }
    }

    /// Normalizes the record into a row ready to be written.
    pub fn ingest(&self, normalizer: &DateNormalizer) -> EngineResult<DestinationRecord> {
        let unique_id = self.unique_id();
        if unique_id.trim().is_empty() {
            return Err(DataError::missing("unique id").into());
        }
        let date = normalizer.normalize(self.kind(), &self.raw_date())?;
        Ok(DestinationRecord {
            kind: self.kind(),
            unique_id,
            date,
            values: self.fields()?,
        })
    }
}

/// A normalized row: unique id, canonical date and data values.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRecord {
    pub kind: SourceKind,
    pub unique_id: String,
    pub date: CanonicalDate,
    pub values: Vec<FieldValue>,
}

/// A source of raw records.
pub trait Source: Send + Sync {
    /// Returns the source kind.
    fn kind(&self) -> SourceKind;

    /// Fetches records for a range of source days.
    fn fetch<'a>(&'a self, range: &'a DateRange) -> BoxFuture<'a, StoreResult<Vec<SourceRecord>>>;
}

/// A source serving a fixed list of records.
#[derive(Debug, Clone)]
pub struct MemorySource {
    kind: SourceKind,
    records: Vec<SourceRecord>,
}

impl MemorySource {
    /// Creates a source serving `records`.
    pub fn new(kind: SourceKind, records: Vec<SourceRecord>) -> Self {
        Self { kind, records }
    }
}

impl Source for MemorySource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch<'a>(&'a self, _range: &'a DateRange) -> BoxFuture<'a, StoreResult<Vec<SourceRecord>>> {
        Box::pin(async move { Ok(self.records.clone()) })
    }
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

fn seconds_to_hours(secs: i64) -> f64 {
    round2(secs as f64 / 3600.0)
}

fn seconds_to_minutes(secs: i64) -> f64 {
    round2(secs as f64 / 60.0)
}

fn instant(value: Option<&str>) -> DataResult<PropertyValue> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(PropertyValue::Date(None)),
        Some(v) => DateTime::parse_from_rfc3339(v)
            .map(|dt| PropertyValue::Date(Some(DateValue::Instant(dt))))
            .map_err(|e| DataError::invalid_date(v, e.to_string())),
    }
}

fn wall_clock(value: &str) -> DataResult<NaiveDateTime> {
    let trimmed = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .map_err(|e| DataError::invalid_date(value, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use daysync_core::{DateHandlingConfig, ExtractionMethod, SourceFormat};

    fn normalizer() -> DateNormalizer {
        let cfg = |source_format, extraction_method| DateHandlingConfig {
            source_format,
            extraction_method,
            date_offset: 0,
        };
        let sleep = cfg(SourceFormat::CalendarDate, ExtractionMethod::NightOf);
        let workout = cfg(SourceFormat::LocalIso, ExtractionMethod::StripTime);
        let body = cfg(SourceFormat::UnixSeconds, ExtractionMethod::ToTimezone);
        DateNormalizer::from_configs(
            chrono_tz::America::Los_Angeles,
            [
                (SourceKind::Sleep, &sleep),
                (SourceKind::Workout, &workout),
                (SourceKind::BodyMeasurement, &body),
            ],
        )
        .unwrap()
    }

    fn workout(id: i64, start: &str) -> SourceRecord {
        SourceRecord::Workout(WorkoutRecord {
            id,
            name: "Morning Ride".into(),
            sport_type: Some("Ride".into()),
            start_date_local: start.into(),
            elapsed_time: Some(3725),
            moving_time: None,
            distance: Some(24_512.0),
            total_elevation_gain: None,
            average_heartrate: None,
            calories: None,
        })
    }

    mod parsing {
        use super::*;

        #[test]
        fn parse_batch_per_kind() {
            let json = r#"[
                {"id": "n1", "day": "2025-10-15", "total_sleep_duration": 27000},
                {"id": "n2", "day": "2025-10-16"}
            ]"#;
            let records = SourceRecord::parse_batch(SourceKind::Sleep, json).unwrap();
            assert_eq!(records.len(), 2);
            assert!(records.iter().all(|r| r.kind() == SourceKind::Sleep));
            assert_eq!(records[0].unique_id(), "n1");
        }

        #[test]
        fn parse_batch_rejects_wrong_shape() {
            let json = r#"[{"id": "n1"}]"#;
            assert!(SourceRecord::parse_batch(SourceKind::Workout, json).is_err());
        }

        #[test]
        fn game_session_id_combines_app_and_day() {
            let json = r#"[{"app_id": 570, "name": "Dota 2", "date": "2025-10-15", "minutes_played": 95}]"#;
            let records = SourceRecord::parse_batch(SourceKind::GameSession, json).unwrap();
            assert_eq!(records[0].unique_id(), "570-2025-10-15");
        }
    }

    mod ingest {
        use super::*;

        #[test]
        fn sleep_is_night_of() {
            let record = SourceRecord::Sleep(SleepRecord {
                id: "n1".into(),
                day: "2025-10-15".into(),
                bedtime_start: Some("2025-10-14T23:10:00-07:00".into()),
                bedtime_end: None,
                total_sleep_duration: Some(27_000),
                deep_sleep_duration: None,
                rem_sleep_duration: None,
                light_sleep_duration: None,
                awake_time: None,
                efficiency: Some(91.0),
                lowest_heart_rate: None,
                average_heart_rate: None,
                average_hrv: None,
            });
            let row = record.ingest(&normalizer()).unwrap();
            assert_eq!(row.date.to_string(), "2025-10-14");
            let title = row.values.iter().find(|(k, _)| *k == "title").unwrap();
            assert_eq!(title.1, PropertyValue::Title("Sleep 7.5h".into()));
        }

        #[test]
        fn workout_ignores_fake_utc_suffix() {
            let row = workout(1, "2025-10-15T23:30:00Z")
                .ingest(&normalizer())
                .unwrap();
            assert_eq!(row.date.to_string(), "2025-10-15");
            let values: std::collections::HashMap<_, _> = row.values.into_iter().collect();
            assert_eq!(values["start_time"], PropertyValue::Text("23:30".into()));
            assert_eq!(values["distance_km"], PropertyValue::Number(Some(24.51)));
            assert_eq!(values["duration_minutes"], PropertyValue::Number(Some(62.08)));
        }

        #[test]
        fn body_measurement_converts_units() {
            let record = SourceRecord::BodyMeasurement(BodyMeasurementRecord {
                grpid: 99,
                date: 1_762_061_400,
                weight_kg: Some(78.2),
                fat_ratio: None,
                fat_mass_kg: None,
                muscle_mass_kg: None,
                bone_mass_kg: None,
                hydration_kg: None,
            });
            let row = record.ingest(&normalizer()).unwrap();
            assert_eq!(row.date.to_string(), "2025-11-01");
            let values: std::collections::HashMap<_, _> = row.values.into_iter().collect();
            assert_eq!(values["weight_lbs"], PropertyValue::Number(Some(172.4)));
        }

        #[test]
        fn malformed_date_is_a_data_error() {
            let err = workout(1, "yesterday").ingest(&normalizer()).unwrap_err();
            assert_eq!(err.category(), "data");
        }

        #[test]
        fn unconfigured_source_is_a_config_error() {
            let record = SourceRecord::Commit(CommitRecord {
                sha: "abc".into(),
                repository: "r".into(),
                message: "fix".into(),
                committed_at: "2025-10-15T10:00:00Z".into(),
                additions: None,
                deletions: None,
                files_changed: None,
            });
            let err = record.ingest(&normalizer()).unwrap_err();
            assert_eq!(err.category(), "config");
        }
    }

    #[test]
    fn every_kind_emits_its_declared_keys() {
        let record = workout(1, "2025-10-15T07:00:00Z");
        let keys: Vec<_> = record.fields().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, property_keys(SourceKind::Workout));
        for kind in SourceKind::ALL {
            for key in required_property_keys(kind) {
                assert!(property_keys(kind).contains(key));
            }
        }
    }

    #[tokio::test]
    async fn memory_source_serves_its_records() {
        let source = MemorySource::new(SourceKind::Workout, vec![workout(1, "2025-10-15T07:00:00")]);
        let day = CanonicalDate::parse("2025-10-15").unwrap();
        let records = source.fetch(&DateRange::single(day)).await.unwrap();
        assert_eq!(records.len(), 1);
    }
}
