use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::registration::{DeviceRegistrar, DeviceRegistration};
use crate::auth::Credentials;
use crate::cache::CacheManager;
use crate::config::Config;
use crate::domain::Domain;
use crate::models::{Document, Schedule};

/// Data key carrying an embedded schedule payload
const SCHEDULE_KEY: &str = "substitutionSchedule";
const DELTA_LIST_KEY: &str = "deltaList";
const TIMESTAMP_KEY: &str = "timestamp";

/// Deep link file name in cache directory
const DEEP_LINK_FILE: &str = "deep_link.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushNotification {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// An inbound push message: an optional notification part and a flat
/// string map of data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub notification: Option<PushNotification>,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl PushMessage {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse push message")
    }

    pub fn data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Notification field, falling back to the data key of the same name.
    fn text(&self, key: &str, pick: fn(&PushNotification) -> Option<&String>) -> String {
        self.notification
            .as_ref()
            .and_then(pick)
            .map(String::as_str)
            .or_else(|| self.data(key))
            .unwrap_or_default()
            .to_string()
    }
}

/// Where a tapped notification should take the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepLink {
    pub delta_list: Option<String>,
    pub timestamp: Option<String>,
}

impl DeepLink {
    /// Save the deep link so the next start can open the changes view
    pub fn save(&self, cache_dir: &Path) -> Result<()> {
        let path = Self::path(cache_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load and remove a pending deep link
    pub fn take(cache_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(cache_dir);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read deep link file")?;
        std::fs::remove_file(&path)?;
        let link = serde_json::from_str(&contents).context("Failed to parse deep link file")?;
        Ok(Some(link))
    }

    fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(DEEP_LINK_FILE)
    }
}

/// A notification ready to be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub deep_link: DeepLink,
}

impl Notification {
    pub fn from_message(message: &PushMessage) -> Self {
        Self {
            title: message.text("title", |n| n.title.as_ref()),
            body: message.text("body", |n| n.body.as_ref()),
            deep_link: DeepLink {
                delta_list: message.data(DELTA_LIST_KEY).map(str::to_string),
                timestamp: message.data(TIMESTAMP_KEY).map(str::to_string),
            },
        }
    }
}

/// Presents notifications to the user.
pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: &Notification);

    /// Called after the cached schedule changed.
    fn refresh_widget(&self) {}
}

/// Settings the push handler acts on.
#[derive(Debug, Clone, Default)]
pub struct PushSettings {
    pub grade: Option<String>,
    pub course_list: Vec<String>,
    pub credentials: Option<Credentials>,
    pub authenticated: bool,
    pub app_version: String,
    pub device_token: Option<String>,
}

impl PushSettings {
    pub fn from_config(config: &Config, app_version: impl Into<String>) -> Self {
        Self {
            grade: config.grade().map(str::to_string),
            course_list: config.course_list.clone(),
            credentials: config.credentials(),
            authenticated: config.authenticated,
            app_version: app_version.into(),
            device_token: config.device_token.clone(),
        }
    }
}

/// What handling a message changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    pub notification: Notification,
    /// Domain whose cache was rewritten from the embedded schedule
    pub cache_updated: Option<Domain>,
}

pub struct PushHandler {
    cache: CacheManager,
    settings: PushSettings,
    sink: Arc<dyn NotificationSink>,
    registrar: Arc<dyn DeviceRegistrar>,
}

impl PushHandler {
    pub fn new(
        cache: CacheManager,
        settings: PushSettings,
        sink: Arc<dyn NotificationSink>,
        registrar: Arc<dyn DeviceRegistrar>,
    ) -> Self {
        Self {
            cache,
            settings,
            sink,
            registrar,
        }
    }

    pub fn settings(&self) -> &PushSettings {
        &self.settings
    }

    /// Handle an inbound message.
    ///
    /// The notification is shown before anything else, so a broken schedule
    /// payload never swallows it.
    pub fn on_message_received(&self, message: &PushMessage) -> MessageOutcome {
        let notification = Notification::from_message(message);
        info!(title = %notification.title, "Push message received");
        self.sink.show(&notification);

        let cache_updated = message
            .data(SCHEDULE_KEY)
            .and_then(|payload| self.store_schedule(payload));

        MessageOutcome {
            notification,
            cache_updated,
        }
    }

    /// Pushed schedules are per-grade data, so without a grade nothing is
    /// stored and the full schedule cache stays untouched.
    fn store_schedule(&self, payload: &str) -> Option<Domain> {
        let Some(domain) = Domain::dashboard_for(self.settings.grade.as_deref()) else {
            debug!("No grade selected, not storing pushed schedule");
            return None;
        };
        let schedule = match Schedule::parse(payload) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(error = %e, "Ignoring embedded schedule");
                return None;
            }
        };

        self.cache.store(&domain, payload, schedule.digest());
        self.sink.refresh_widget();
        debug!(domain = %domain, "Stored pushed schedule");
        Some(domain)
    }

    /// Registration body for `token`, or None if registration must not happen.
    pub fn registration(&self, token: &str) -> Option<DeviceRegistration> {
        let Some(grade) = self.settings.grade.as_deref().filter(|g| !g.trim().is_empty()) else {
            debug!("No grade selected, not registering device token");
            return None;
        };
        if !self.settings.authenticated {
            debug!("Not authenticated, not registering device token");
            return None;
        }
        let Some(credentials) = self.settings.credentials.as_ref() else {
            warn!("Credentials unavailable, not registering device token");
            return None;
        };

        Some(DeviceRegistration {
            token: token.to_string(),
            grade: grade.to_string(),
            course_list: self.settings.course_list.clone(),
            version: self.settings.app_version.clone(),
            // Fixed-width hex; the backend has to accept it with leading zeros
            credential: credentials.fingerprint(),
        })
    }

    /// Remember a new device token and register it in the background.
    ///
    /// The returned task only logs the outcome.
    pub fn on_new_token(&mut self, token: &str) -> Option<JoinHandle<()>> {
        self.settings.device_token = Some(token.to_string());
        let registration = self.registration(token)?;
        let registrar = Arc::clone(&self.registrar);

        Some(tokio::spawn(async move {
            match registrar.register(&registration).await {
                Ok(()) => info!(grade = %registration.grade, "Device token sent"),
                Err(e) => warn!(error = %e, "Device token registration failed"),
            }
        }))
    }

    /// Re-send the last known token, e.g. after the grade or login changed.
    pub fn update_device_token(&mut self) -> Option<JoinHandle<()>> {
        let token = self.settings.device_token.clone()?;
        self.on_new_token(&token)
    }
}
