//! Calendar event types.
//!
//! - [`EventTime`]: one end of an event, either a whole day or an instant
//! - [`EventSpan`]: start and end of one shape; all-day and timed ends can
//!   never be mixed on the same event
//! - [`CalendarEvent`]: a derived event addressed to a calendar
//! - [`EventPayload`]: the wire shape sent to a calendar service

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// One end of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A whole day.
    AllDay(NaiveDate),
    /// A precise instant.
    DateTime(DateTime<FixedOffset>),
}

impl EventTime {
    /// Returns `true` if this is an all-day time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the calendar day.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::AllDay(d) => *d,
            Self::DateTime(dt) => dt.naive_local().date(),
        }
    }
}

/// The time range of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventSpan {
    /// Whole days. `end` is exclusive, the day after the last covered day.
    AllDay { start: NaiveDate, end: NaiveDate },
    /// A precise range labeled with an IANA timezone.
    Timed {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        time_zone: String,
    },
}

impl EventSpan {
    /// Creates an all-day span covering `first..=last`.
    pub fn all_day(first: NaiveDate, last: NaiveDate) -> DataResult<Self> {
        if last < first {
            return Err(DataError::invalid_date(
                last.to_string(),
                format!("end date is before start date {first}"),
            ));
        }
        let end = last
            .succ_opt()
            .ok_or_else(|| DataError::invalid_date(last.to_string(), "date out of range"))?;
        Ok(Self::AllDay { start: first, end })
    }

    /// Creates a timed span. `end` may equal `start` but not precede it.
    pub fn timed(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        time_zone: impl Into<String>,
    ) -> DataResult<Self> {
        if end < start {
            return Err(DataError::invalid_date(
                end.to_rfc3339(),
                format!("end time is before start time {}", start.to_rfc3339()),
            ));
        }
        Ok(Self::Timed {
            start,
            end,
            time_zone: time_zone.into(),
        })
    }

    /// Returns the start.
    pub fn start(&self) -> EventTime {
        match self {
            Self::AllDay { start, .. } => EventTime::AllDay(*start),
            Self::Timed { start, .. } => EventTime::DateTime(*start),
        }
    }

    /// Returns the end.
    pub fn end(&self) -> EventTime {
        match self {
            Self::AllDay { end, .. } => EventTime::AllDay(*end),
            Self::Timed { end, .. } => EventTime::DateTime(*end),
        }
    }

    /// Returns true for whole-day spans.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay { .. })
    }

    fn time_zone(&self) -> Option<&str> {
        match self {
            Self::AllDay { .. } => None,
            Self::Timed { time_zone, .. } => Some(time_zone),
        }
    }
}

/// An event derived from a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub calendar_id: String,
    pub summary: String,
    pub description: String,
    pub span: EventSpan,
}

impl CalendarEvent {
    /// Creates a new event.
    pub fn new(
        calendar_id: impl Into<String>,
        summary: impl Into<String>,
        description: impl Into<String>,
        span: EventSpan,
    ) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            summary: summary.into(),
            description: description.into(),
            span,
        }
    }

    /// Builds the wire payload for a calendar service.
    pub fn payload(&self) -> EventPayload {
        let tz = self.span.time_zone();
        EventPayload {
            summary: self.summary.clone(),
            description: self.description.clone(),
            start: EventTimePayload::new(self.span.start(), tz),
            end: EventTimePayload::new(self.span.end(), tz),
        }
    }
}

/// Wire shape of one event end: either `date`, or `dateTime` + `timeZone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTimePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTimePayload {
    fn new(time: EventTime, tz: Option<&str>) -> Self {
        match time {
            EventTime::AllDay(d) => Self {
                date: Some(d.format("%Y-%m-%d").to_string()),
                date_time: None,
                time_zone: None,
            },
            EventTime::DateTime(dt) => Self {
                date: None,
                date_time: Some(dt.to_rfc3339()),
                time_zone: tz.map(str::to_string),
            },
        }
    }
}

/// Wire shape of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub summary: String,
    pub description: String,
    pub start: EventTimePayload,
    pub end: EventTimePayload,
}
