//! Data models for the school backend.
//!
//! - `Schedule`, `ScheduleForDate`, `GradeItem`, `Substitution`: the
//!   substitution schedule, grouped by date and then by grade
//! - `Calendar`, `MonthItem`, `DayItem`: the school calendar
//!
//! Both top-level models are rebuilt wholesale from a JSON payload through
//! the `Document` trait.

pub mod calendar;
pub mod schedule;

use thiserror::Error;

pub use calendar::{Calendar, DayItem, MonthItem};
pub use schedule::{GradeItem, Schedule, ScheduleForDate, Substitution};

/// A payload that could not be turned into a model.
#[derive(Error, Debug)]
#[error("Malformed {kind} payload: {source}")]
pub struct ParseError {
    pub kind: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// A model parsed from a cached or fetched JSON payload.
pub trait Document: Sized + Send + 'static {
    /// Human readable name, used in logs and error dialogs.
    const KIND: &'static str;

    fn parse(payload: &str) -> Result<Self, ParseError>;

    /// Fingerprint embedded in the payload, if the server sent one.
    fn digest(&self) -> Option<&str>;
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    payload: &str,
) -> Result<T, ParseError> {
    serde_json::from_str(payload).map_err(|source| ParseError { kind, source })
}
