use serde::{Deserialize, Serialize};

use super::{parse_json, Document, ParseError};
use crate::utils::contains_ignore_case;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    #[serde(rename = "_digest", default)]
    pub digest: Option<String>,
    #[serde(rename = "monthItems")]
    pub months: Vec<MonthItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthItem {
    pub name: String,
    #[serde(rename = "dayItems")]
    pub days: Vec<DayItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayItem {
    pub day: String,
    pub event: String,
}

/// A search hit: the day and the month it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct CalendarHit<'a> {
    pub month: &'a str,
    pub day: &'a DayItem,
}

impl Calendar {
    pub fn month_names(&self) -> Vec<&str> {
        self.months.iter().map(|m| m.name.as_str()).collect()
    }

    /// Days whose event text or day label contains `query`, in calendar order.
    /// An empty query matches nothing.
    pub fn search(&self, query: &str) -> Vec<CalendarHit<'_>> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        self.months
            .iter()
            .flat_map(|month| {
                month.days.iter().map(move |day| CalendarHit {
                    month: month.name.as_str(),
                    day,
                })
            })
            .filter(|hit| {
                contains_ignore_case(&hit.day.event, query) || contains_ignore_case(&hit.day.day, query)
            })
            .collect()
    }
}

impl Document for Calendar {
    const KIND: &'static str = "calendar";

    fn parse(payload: &str) -> Result<Self, ParseError> {
        parse_json(Self::KIND, payload)
    }

    fn digest(&self) -> Option<&str> {
        self.digest.as_deref().filter(|d| !d.is_empty())
    }
}
