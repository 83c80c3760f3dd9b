//! End-to-end sync tests against the local store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use daysync_core::{CanonicalDate, DateRange, Page, PropertyMap, PropertyValue, SourceKind};
use daysync_engine::{
    EngineConfig, MemorySource, Settings, Source, SourceOutcome, SourceRecord, SyncOrchestrator,
};
use daysync_store::{
    BoxFuture, CalendarSink, Filter, LocalStore, PageStore, QueryPage, StoreError, StoreResult,
};

const CONFIG: &str = r#"
timezone = "America/Los_Angeles"
record_delay_ms = 350
source_delay_ms = 1000

[retry]
max_attempts = 3
initial_backoff_ms = 500

[sources.workout]
database_id = "workouts"
unique_id_property = "Activity ID"
unique_id_type = "number"
date_property = "Date"
synced_property = "Calendar Synced"
event_id_property = "Calendar Event ID"

[sources.workout.date_handling]
source_format = "local_iso"
extraction_method = "strip_time"

[sources.workout.properties.title]
display_name = "Name"
type = "title"

[sources.workout.properties.start_time]
display_name = "Start Time"
type = "rich_text"

[sources.workout.properties.duration_minutes]
display_name = "Duration (min)"
type = "number"

[sources.workout.properties.calories]
display_name = "Calories"
type = "number"
enabled = false

[sources.sleep]
database_id = "sleep"
unique_id_property = "Sleep ID"
date_property = "Night Of"
synced_property = "Calendar Synced"

[sources.sleep.date_handling]
source_format = "calendar_date"
extraction_method = "night_of"

[sources.sleep.properties.title]
display_name = "Name"
type = "title"

[sources.body_measurement]
database_id = "body"
unique_id_property = "Measurement ID"
unique_id_type = "number"
date_property = "Date"
event_id_property = "Calendar Event ID"

[sources.body_measurement.date_handling]
source_format = "unix_seconds"
extraction_method = "to_timezone"

[sources.body_measurement.properties.title]
display_name = "Name"
type = "title"

[sources.body_measurement.properties.weight_lbs]
display_name = "Weight (lbs)"
type = "number"

[calendars.fitness]
kind = "direct"
calendar_id = "fitness@cal"

[calendars.health]
kind = "direct"
calendar_id = "health@cal"

[events.workouts]
source = "workout"
calendar = "fitness"
event_type = "date_time"
summary = "{{name}}"
start = { date = "date", time = "start" }
end_from_duration = { field = "duration", unit = "minutes" }

[events.workouts.properties]
name = "Name"
date = "Date"
start = "Start Time"
duration = "Duration (min)"

[events.weight]
source = "body_measurement"
calendar = "health"
event_type = "allDay"
summary = "{{weight}} lbs"
start = "date"

[events.weight.properties]
date = "Date"
weight = "Weight (lbs)"
"#;

fn settings() -> Arc<Settings> {
    Arc::new(EngineConfig::from_toml(CONFIG).unwrap().validate().unwrap())
}

fn range(start: &str, end: &str) -> DateRange {
    DateRange::new(
        CanonicalDate::parse(start).unwrap(),
        CanonicalDate::parse(end).unwrap(),
    )
    .unwrap()
}

fn workouts_json() -> &'static str {
    r#"[
        {"id": 101, "name": "Morning Ride", "start_date_local": "2025-10-14T07:00:00Z", "elapsed_time": 3600, "calories": 640},
        {"id": 102, "name": "Lunch Run", "start_date_local": "2025-10-14T12:15:00Z", "elapsed_time": 1800},
        {"id": 103, "name": "Broken", "start_date_local": "not a date"},
        {"id": 104, "name": "Evening Swim", "start_date_local": "2025-10-15T18:30:00Z", "elapsed_time": 2700},
        {"id": 105, "name": "Hike", "start_date_local": "2025-10-16T09:00:00Z", "elapsed_time": 7200}
    ]"#
}

fn workouts() -> Vec<SourceRecord> {
    SourceRecord::parse_batch(SourceKind::Workout, workouts_json()).unwrap()
}

fn orchestrator(store: Arc<LocalStore>) -> SyncOrchestrator {
    SyncOrchestrator::new(settings(), store.clone(), store)
}

mod records {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn partial_failure_keeps_going() {
        let store = Arc::new(LocalStore::in_memory());
        let result = orchestrator(store.clone())
            .sync_records(SourceKind::Workout, workouts())
            .await
            .unwrap();

        assert_eq!(result.total, 5);
        assert_eq!(result.created.len(), 4);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].key, "103");
        assert_eq!(result.errors[0].category, "data");
        assert!(result.is_consistent());
        assert_eq!(store.pages("workouts").await.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn rerun_is_idempotent() {
        let store = Arc::new(LocalStore::in_memory());
        let orchestrator = orchestrator(store.clone());
        orchestrator
            .sync_records(SourceKind::Workout, workouts())
            .await
            .unwrap();

        let second = orchestrator
            .sync_records(SourceKind::Workout, workouts())
            .await
            .unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.skipped.len(), 4);
        assert_eq!(second.errors.len(), 1);
        assert_eq!(store.pages("workouts").await.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_id_in_one_batch_is_skipped() {
        let store = Arc::new(LocalStore::in_memory());
        let json = r#"[
            {"id": "n1", "day": "2025-10-15"},
            {"id": "n1", "day": "2025-10-15"}
        ]"#;
        let records = SourceRecord::parse_batch(SourceKind::Sleep, json).unwrap();
        let result = orchestrator(store.clone())
            .sync_records(SourceKind::Sleep, records)
            .await
            .unwrap();
        assert_eq!(result.created.len(), 1);
        assert_eq!(result.skipped.len(), 1);

        let pages = store.pages("sleep").await;
        assert_eq!(
            pages[0].date("Night Of").map(|d| d.day().to_string()),
            Some("2025-10-14".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_property_is_never_written() {
        let store = Arc::new(LocalStore::in_memory());
        orchestrator(store.clone())
            .sync_records(SourceKind::Workout, workouts())
            .await
            .unwrap();
        for page in store.pages("workouts").await {
            assert!(page.property("Calories").is_none());
            assert!(!page.checkbox("Calendar Synced"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_evening_timestamps_stay_on_local_day() {
        let store = Arc::new(LocalStore::in_memory());
        let json = r#"[
            {"grpid": 1, "date": 1762061400, "weight_kg": 78.2},
            {"grpid": 2, "date": 1751434200, "weight_kg": 78.0}
        ]"#;
        let records = SourceRecord::parse_batch(SourceKind::BodyMeasurement, json).unwrap();
        let result = orchestrator(store)
            .sync_records(SourceKind::BodyMeasurement, records)
            .await
            .unwrap();
        let days: Vec<String> = result
            .created
            .iter()
            .filter_map(|i| i.date.map(|d| d.to_string()))
            .collect();
        assert_eq!(days, ["2025-11-01", "2025-07-01"]);
    }

    #[tokio::test]
    async fn unconfigured_source_fails_the_batch() {
        let store = Arc::new(LocalStore::in_memory());
        let err = orchestrator(store)
            .sync_records(SourceKind::Commit, vec![])
            .await
            .unwrap_err();
        assert_eq!(err.category(), "config");
    }
}

mod sources {
    use super::*;

    /// Fails the first `failures` fetches with a rate limit.
    struct FlakySource {
        inner: MemorySource,
        failures: u32,
        calls: AtomicU32,
    }

    impl Source for FlakySource {
        fn kind(&self) -> SourceKind {
            self.inner.kind()
        }

        fn fetch<'a>(
            &'a self,
            range: &'a DateRange,
        ) -> BoxFuture<'a, StoreResult<Vec<SourceRecord>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Box::pin(async { Err(StoreError::rate_limited("slow down")) });
            }
            self.inner.fetch(range)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sync_source_filters_to_range_and_retries() {
        let store = Arc::new(LocalStore::in_memory());
        let source = FlakySource {
            inner: MemorySource::new(SourceKind::Workout, workouts()),
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let result = orchestrator(store)
            .sync_source(&source, &range("2025-10-14", "2025-10-15"))
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        // 105 falls outside the range, 103 is kept so its error is reported.
        assert_eq!(result.total, 4);
        assert_eq!(result.created.len(), 3);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_all_continues_past_a_failed_source() {
        let store = Arc::new(LocalStore::in_memory());
        let broken: Arc<dyn Source> = Arc::new(FlakySource {
            inner: MemorySource::new(SourceKind::Sleep, vec![]),
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let good: Arc<dyn Source> = Arc::new(MemorySource::new(SourceKind::Workout, workouts()));

        let report = orchestrator(store)
            .run_all(&[broken, good], &range("2025-10-01", "2025-10-31"))
            .await;

        assert_eq!(report.entries.len(), 2);
        assert!(matches!(report.entries[0], (SourceKind::Sleep, SourceOutcome::Failed(_))));
        assert!(matches!(
            &report.entries[1],
            (SourceKind::Workout, SourceOutcome::Synced(r)) if r.created.len() == 4
        ));
        assert_eq!(report.created(), 4);
        assert!(!report.is_success());
    }
}

mod calendar {
    use super::*;

    async fn seeded() -> (Arc<LocalStore>, SyncOrchestrator) {
        let store = Arc::new(LocalStore::in_memory());
        let orchestrator = orchestrator(store.clone());
        orchestrator
            .sync_records(SourceKind::Workout, workouts())
            .await
            .unwrap();
        (store, orchestrator)
    }

    #[tokio::test(start_paused = true)]
    async fn creates_events_and_marks_pages() {
        let (store, orchestrator) = seeded().await;
        let transformer = orchestrator.settings().transformer("workouts").unwrap().clone();
        let october = range("2025-10-01", "2025-10-31");

        let result = orchestrator.sync_calendar(&transformer, &october).await.unwrap();
        assert_eq!(result.created.len(), 4);
        assert!(result.is_consistent());

        let events = store.events().await;
        assert_eq!(events.len(), 4);
        for stored in &events {
            let payload = stored.event.payload();
            for time in [&payload.start, &payload.end] {
                assert!(time.date.is_none());
                assert!(time.date_time.is_some());
            }
        }
        let ride = events
            .iter()
            .find(|e| e.event.summary == "Morning Ride")
            .unwrap();
        assert_eq!(
            ride.event.payload().start.date_time.as_deref(),
            Some("2025-10-14T07:00:00-07:00")
        );

        for page in store.pages("workouts").await {
            assert!(page.checkbox("Calendar Synced"));
            assert!(page.text("Calendar Event ID").is_some_and(|s| !s.is_empty()));
        }

        let again = orchestrator.sync_calendar(&transformer, &october).await.unwrap();
        assert_eq!(again.total, 0);
        assert_eq!(store.events().await.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn all_day_events_use_exclusive_end() {
        let store = Arc::new(LocalStore::in_memory());
        let orchestrator = orchestrator(store.clone());
        let json = r#"[{"grpid": 7, "date": 1760597100, "weight_kg": 78.2}]"#;
        let records = SourceRecord::parse_batch(SourceKind::BodyMeasurement, json).unwrap();
        orchestrator
            .sync_records(SourceKind::BodyMeasurement, records)
            .await
            .unwrap();

        let transformer = orchestrator.settings().transformer("weight").unwrap().clone();
        orchestrator
            .sync_calendar(&transformer, &range("2025-10-15", "2025-10-15"))
            .await
            .unwrap();

        let events = store.events().await;
        insta::assert_json_snapshot!(events[0].event.payload(), @r#"
        {
          "summary": "172.4 lbs",
          "description": "",
          "start": {
            "date": "2025-10-15"
          },
          "end": {
            "date": "2025-10-16"
          }
        }
        "#);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_event_clears_status() {
        let (store, orchestrator) = seeded().await;
        let transformer = orchestrator.settings().transformer("workouts").unwrap().clone();
        let october = range("2025-10-01", "2025-10-31");
        let result = orchestrator.sync_calendar(&transformer, &october).await.unwrap();
        let page_id = result.created[0].page_id.clone().unwrap();

        assert!(orchestrator.remove_calendar_event(&transformer, &page_id).await.unwrap());
        assert_eq!(store.events().await.len(), 3);
        let page = store.retrieve(&page_id).await.unwrap();
        assert!(!page.checkbox("Calendar Synced"));

        let resynced = orchestrator.sync_calendar(&transformer, &october).await.unwrap();
        assert_eq!(resynced.created.len(), 1);
    }

    /// A page store whose updates always fail.
    struct ReadOnlyStore(Arc<LocalStore>);

    impl PageStore for ReadOnlyStore {
        fn name(&self) -> &str {
            "read-only"
        }

        fn query<'a>(
            &'a self,
            database_id: &'a str,
            filter: &'a Filter,
            cursor: Option<String>,
        ) -> BoxFuture<'a, StoreResult<QueryPage>> {
            self.0.query(database_id, filter, cursor)
        }

        fn retrieve<'a>(&'a self, page_id: &'a str) -> BoxFuture<'a, StoreResult<Page>> {
            self.0.retrieve(page_id)
        }

        fn create<'a>(
            &'a self,
            database_id: &'a str,
            properties: PropertyMap,
        ) -> BoxFuture<'a, StoreResult<Page>> {
            PageStore::create(self.0.as_ref(), database_id, properties)
        }

        fn update<'a>(
            &'a self,
            _page_id: &'a str,
            _properties: PropertyMap,
        ) -> BoxFuture<'a, StoreResult<Page>> {
            Box::pin(async { Err(StoreError::bad_request("property is read-only")) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mark_deletes_the_created_event() {
        let local = Arc::new(LocalStore::in_memory());
        orchestrator(local.clone())
            .sync_records(SourceKind::Workout, workouts())
            .await
            .unwrap();

        let calendar: Arc<dyn CalendarSink> = local.clone();
        let orchestrator =
            SyncOrchestrator::new(settings(), Arc::new(ReadOnlyStore(local.clone())), calendar);
        let transformer = orchestrator.settings().transformer("workouts").unwrap().clone();

        let result = orchestrator
            .sync_calendar(&transformer, &range("2025-10-01", "2025-10-31"))
            .await
            .unwrap();
        assert_eq!(result.errors.len(), 4);
        assert!(result.errors.iter().all(|e| e.category == "store"));
        assert!(local.events().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bad_start_time_fails_only_that_page() {
        let (store, orchestrator) = seeded().await;
        let page = store.pages("workouts").await.remove(0);
        store
            .update(
                &page.id,
                PropertyMap::new().with("Start Time", PropertyValue::RichText("25:99".into())),
            )
            .await
            .unwrap();

        let transformer = orchestrator.settings().transformer("workouts").unwrap().clone();
        let result = orchestrator
            .sync_calendar(&transformer, &range("2025-10-01", "2025-10-31"))
            .await
            .unwrap();
        assert_eq!(result.created.len(), 3);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].key, page.id);
    }
}
