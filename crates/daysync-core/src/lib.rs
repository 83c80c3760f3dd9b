//! Core types: canonical dates, date normalization, properties, calendar events

pub mod date;
pub mod error;
pub mod event;
pub mod property;
pub mod source;
pub mod template;
pub mod time;
pub mod tracing;

pub use date::{
    DateHandlingConfig, DateNormalizer, DateRule, ExtractionMethod, NormalizeError,
    PlainExtraction, RawDate, SourceFormat,
};
pub use error::{ConfigError, ConfigResult, DataError, DataResult};
pub use event::{CalendarEvent, EventPayload, EventSpan, EventTime, EventTimePayload};
pub use property::{
    DateValue, Page, PropertyConfig, PropertyDescriptor, PropertyMap, PropertyType,
    PropertyValue, format_number,
};
pub use source::SourceKind;
pub use template::Template;
pub use time::{CanonicalDate, DateRange};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
