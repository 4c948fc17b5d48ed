//! Tab content renderers.

pub mod calendar;
pub mod schedule;
