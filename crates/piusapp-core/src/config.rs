//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! backend URL, grade and course selection, the login name and whether it
//! was validated, and the last push device token.
//!
//! Configuration is stored at `~/.config/piusapp/config.json`. The password
//! is kept in the OS keychain, never here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_BASE_URL;
use crate::auth::{CredentialStore, Credentials};
use crate::domain::Domain;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "piusapp";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment overrides
const ENV_BASE_URL: &str = "PIUSAPP_BASE_URL";
const ENV_USERNAME: &str = "PIUSAPP_USERNAME";
const ENV_PASSWORD: &str = "PIUSAPP_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    /// Grade selection, e.g. "5A" or "Q1"
    pub grade: Option<String>,
    /// Courses of upper-grade students, used to filter the dashboard
    #[serde(default)]
    pub course_list: Vec<String>,
    pub username: Option<String>,
    /// Set once the backend accepted the stored credentials
    #[serde(default)]
    pub authenticated: bool,
    pub device_token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// `~/.config/piusapp/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Backend URL, with the environment taking precedence.
    pub fn base_url(&self) -> String {
        std::env::var(ENV_BASE_URL)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn username(&self) -> Option<String> {
        std::env::var(ENV_USERNAME)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.username.clone())
    }

    /// Username and password, from the environment or the keychain.
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.username()?;
        match std::env::var(ENV_PASSWORD) {
            Ok(password) if !password.is_empty() => Some(Credentials::new(username, password)),
            _ => CredentialStore::load(&username),
        }
    }

    /// Selected grade, if any was set.
    pub fn grade(&self) -> Option<&str> {
        self.grade.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }

    /// Schedule domain for the configured grade.
    pub fn dashboard_domain(&self) -> Option<Domain> {
        Domain::dashboard_for(self.grade())
    }

    /// Replace the grade and course selection. A blank grade clears it.
    pub fn set_selection(&mut self, grade: &str, courses: &str) {
        let grade = grade.trim();
        self.grade = (!grade.is_empty()).then(|| grade.to_string());
        self.course_list = parse_course_list(courses);
    }
}

/// Split a course list typed as "M-LK1, E-GK2" or "M-LK1 E-GK2".
/// Duplicates (ignoring case) are dropped, order is kept.
pub fn parse_course_list(input: &str) -> Vec<String> {
    let mut courses: Vec<String> = Vec::new();
    for course in input.split(|c: char| c == ',' || c.is_whitespace()) {
        if !course.is_empty() && !courses.iter().any(|c| c.eq_ignore_ascii_case(course)) {
            courses.push(course.to_string());
        }
    }
    courses
}
