use std::fmt;

/// A cached data category. Each domain owns one digest/payload pair on disk
/// and maps to one backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Full substitution schedule for all grades
    Schedule,
    /// Substitution schedule of a single grade
    Dashboard(String),
    /// School calendar
    Calendar,
}

impl Domain {
    /// Dashboard of a grade selection. Blank grades select nothing.
    pub fn dashboard_for(grade: Option<&str>) -> Option<Self> {
        grade
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(|g| Domain::Dashboard(g.to_string()))
    }

    /// Base name of the cache artifacts, without extension.
    pub fn cache_name(&self) -> String {
        match self {
            Domain::Schedule => "vertretungsplan".to_string(),
            Domain::Dashboard(grade) => format!("dashboard-{}", sanitize(grade)),
            Domain::Calendar => "calendar".to_string(),
        }
    }

    pub fn digest_file(&self) -> String {
        format!("{}.md5", self.cache_name())
    }

    pub fn payload_file(&self) -> String {
        format!("{}.json", self.cache_name())
    }

    /// Endpoint path relative to the backend base URL.
    pub fn endpoint(&self) -> String {
        match self {
            Domain::Schedule => "vertretungsplan".to_string(),
            Domain::Dashboard(grade) => format!("vertretungsplan/{}", grade),
            Domain::Calendar => "calendar".to_string(),
        }
    }

    /// Whether payloads of this domain are schedules (as opposed to calendars).
    pub fn is_schedule(&self) -> bool {
        !matches!(self, Domain::Calendar)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Domain::Schedule => "Vertretungsplan",
            Domain::Dashboard(_) => "Dashboard",
            Domain::Calendar => "Kalender",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_name())
    }
}

/// Keep grade names usable as file names ("Q1", "5A", "EF").
fn sanitize(grade: &str) -> String {
    grade
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
