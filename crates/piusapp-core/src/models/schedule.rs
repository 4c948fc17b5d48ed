use serde::{Deserialize, Deserializer, Serialize};

use super::{parse_json, Document, ParseError};

/// Substitution schedule as delivered by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "_digest", default)]
    pub digest: Option<String>,
    #[serde(rename = "tickerText", default)]
    pub ticker_text: Option<String>,
    #[serde(rename = "additionalText", default)]
    pub additional_text: Option<String>,
    #[serde(rename = "lastUpdate")]
    pub last_update: String,
    pub dates: Vec<ScheduleForDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleForDate {
    #[serde(rename = "title")]
    pub date: String,
    #[serde(rename = "gradeItems")]
    pub grade_items: Vec<GradeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeItem {
    pub grade: String,
    #[serde(rename = "vertretungsplanItems", default)]
    pub substitutions: Vec<Substitution>,
}

/// One row of the schedule.
///
/// The backend sends rows as positional string arrays:
/// `[lesson, kind, course, room, teacher, comment, eva]`. Shorter rows are
/// accepted; missing or blank positions read as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Substitution {
    fields: Vec<String>,
}

impl<'de> Deserialize<'de> for Substitution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Vec::<Option<String>>::deserialize(deserializer)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        Ok(Self { fields })
    }
}

impl Substitution {
    fn field(&self, index: usize) -> Option<&str> {
        self.fields
            .get(index)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn lesson(&self) -> Option<&str> {
        self.field(0)
    }

    /// Kind of change, e.g. "Vertretung" or "Entfall".
    pub fn kind(&self) -> Option<&str> {
        self.field(1)
    }

    pub fn course(&self) -> Option<&str> {
        self.field(2)
    }

    pub fn room(&self) -> Option<&str> {
        self.field(3)
    }

    pub fn teacher(&self) -> Option<&str> {
        self.field(4)
    }

    pub fn comment(&self) -> Option<&str> {
        self.field(5)
    }

    /// Self-study assignment ("Eigenverantwortliches Arbeiten").
    pub fn eva(&self) -> Option<&str> {
        self.field(6)
    }
}

impl GradeItem {
    /// Rows relevant for a course list. An empty list keeps everything, as do
    /// rows without a course.
    pub fn substitutions_for(&self, courses: &[String]) -> Vec<&Substitution> {
        self.substitutions
            .iter()
            .filter(|s| match s.course() {
                Some(course) if !courses.is_empty() => courses
                    .iter()
                    .any(|c| c.trim().eq_ignore_ascii_case(course)),
                _ => true,
            })
            .collect()
    }
}

impl Schedule {
    /// Grade item at (date, grade) position, with the date title it belongs to.
    pub fn grade_item(&self, date_index: usize, grade_index: usize) -> Option<(&str, &GradeItem)> {
        let date = self.dates.get(date_index)?;
        let item = date.grade_items.get(grade_index)?;
        Some((date.date.as_str(), item))
    }

    /// Total number of grade rows over all dates.
    pub fn grade_count(&self) -> usize {
        self.dates.iter().map(|d| d.grade_items.len()).sum()
    }
}

impl Document for Schedule {
    const KIND: &'static str = "substitution schedule";

    fn parse(payload: &str) -> Result<Self, ParseError> {
        parse_json(Self::KIND, payload)
    }

    fn digest(&self) -> Option<&str> {
        self.digest.as_deref().filter(|d| !d.is_empty())
    }
}
