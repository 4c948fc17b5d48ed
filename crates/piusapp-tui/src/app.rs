//! Application state management for the Pius App terminal client.
//!
//! This module contains the core `App` struct: navigation between screens,
//! one load controller per data domain, the login form and the channel
//! through which background fetches report back.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use piusapp_core::api::{ApiClient, ApiError, ConditionalFetch};
use piusapp_core::auth::{CredentialStore, Credentials};
use piusapp_core::cache::{CacheManager, FileCache};
use piusapp_core::config::Config;
use piusapp_core::models::{Calendar, GradeItem, MonthItem, Schedule, Substitution};
use piusapp_core::models::calendar::CalendarHit;
use piusapp_core::push::{DeepLink, PushHandler, PushSettings};
use piusapp_core::screen::{
    Applied, LoadCompletion, Resolution, ScreenController, ScreenError, ScreenState,
};
use piusapp_core::Domain;

use crate::notifier::LogNotifier;

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the load completion channel.
/// At most one load per screen is in flight, so a handful is plenty.
const CHANNEL_BUFFER_SIZE: usize = 8;

/// Maximum length for username input.
const MAX_USERNAME_LENGTH: usize = 50;

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for the grade and course list fields.
const MAX_SETTINGS_LENGTH: usize = 100;

/// Number of items to scroll on page up/down.
pub const PAGE_SCROLL_SIZE: usize = 10;

/// Screens remembered for "back" navigation
const MAX_HISTORY: usize = 32;

const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// UI State Types
// ============================================================================

/// Main navigation tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Schedule,
    Dashboard,
    Calendar,
}

impl Tab {
    pub fn title(&self) -> &'static str {
        match self {
            Tab::Schedule => "Vertretungsplan",
            Tab::Dashboard => "Dashboard",
            Tab::Calendar => "Kalender",
        }
    }

    /// Get the next tab (wrapping around)
    pub fn next(&self) -> Self {
        match self {
            Tab::Schedule => Tab::Dashboard,
            Tab::Dashboard => Tab::Calendar,
            Tab::Calendar => Tab::Schedule,
        }
    }

    /// Get the previous tab (wrapping around)
    pub fn prev(&self) -> Self {
        match self {
            Tab::Schedule => Tab::Calendar,
            Tab::Dashboard => Tab::Schedule,
            Tab::Calendar => Tab::Dashboard,
        }
    }
}

/// A place the user can navigate to and back from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Tab(Tab),
    /// Substitutions of one grade on one date
    GradeDetail { tab: Tab, date: usize, grade: usize },
}

impl Screen {
    pub fn tab(&self) -> Tab {
        match *self {
            Screen::Tab(tab) | Screen::GradeDetail { tab, .. } => tab,
        }
    }
}

/// Current UI focus area (list panel or detail panel)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    List,
    Detail,
}

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    Searching,
    ShowingHelp,
    LoggingIn,
    EditingSettings,
    ShowingError,
    ConfirmingQuit,
    Quitting,
}

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginFocus {
    Username,
    Password,
    Button,
}

/// Settings form focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsFocus {
    Grade,
    Courses,
}

/// Contents of the error dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDialog {
    pub title: String,
    pub message: String,
}

// ============================================================================
// Main Application Struct
// ============================================================================

pub struct App {
    // Core services
    pub config: Config,
    pub api: ApiClient,
    pub cache: CacheManager,
    pub cache_dir: PathBuf,
    /// Where settings and login state are saved; None keeps them in memory
    config_path: Option<PathBuf>,
    fetcher: Arc<dyn ConditionalFetch>,
    credentials: Option<Credentials>,

    // UI State
    pub state: AppState,
    pub screen: Screen,
    history: Vec<Screen>,
    pub focus: Focus,
    pub search_query: String,
    pub error: Option<ErrorDialog>,

    // Login form state
    pub login_username: String,
    pub login_password: String,
    pub login_focus: LoginFocus,
    pub login_error: Option<String>,

    // Settings form state
    pub settings_grade: String,
    pub settings_courses: String,
    pub settings_focus: SettingsFocus,

    // Screens
    pub schedule: ScreenController<Schedule>,
    pub dashboard: Option<ScreenController<Schedule>>,
    pub calendar: ScreenController<Calendar>,

    // Selection indices
    pub schedule_selection: usize,
    pub dashboard_selection: usize,
    pub detail_selection: usize,
    pub month_selection: usize,
    pub day_selection: usize,

    // Background loads
    load_tx: mpsc::Sender<LoadCompletion>,
    load_rx: mpsc::Receiver<LoadCompletion>,

    pub status_message: Option<String>,
    tick: usize,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        let mut app = Self::with_cache_dir(config, cache_dir)?;
        app.config_path = Config::default_path().ok();
        Ok(app)
    }

    /// An app that never writes its config back to disk.
    pub fn with_cache_dir(config: Config, cache_dir: PathBuf) -> Result<Self> {
        debug!(?cache_dir, "Cache directory configured");
        let cache = CacheManager::new(Arc::new(FileCache::new(cache_dir.clone())?));

        let credentials = config.credentials();
        let api = ApiClient::new(config.base_url())?.with_credentials(credentials.clone());
        let fetcher: Arc<dyn ConditionalFetch> = Arc::new(api.clone());

        let (load_tx, load_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        let login_username = config.username().unwrap_or_default();

        let schedule = ScreenController::new(Domain::Schedule, cache.clone());
        let dashboard = config
            .dashboard_domain()
            .map(|domain| ScreenController::new(domain, cache.clone()));
        let calendar = ScreenController::new(Domain::Calendar, cache.clone());

        Ok(Self {
            config,
            api,
            cache,
            cache_dir,
            config_path: None,
            fetcher,
            credentials,

            state: AppState::Normal,
            screen: Screen::Tab(Tab::Schedule),
            history: Vec::new(),
            focus: Focus::List,
            search_query: String::new(),
            error: None,

            login_username,
            login_password: String::new(),
            login_focus: LoginFocus::Username,
            login_error: None,

            settings_grade: String::new(),
            settings_courses: String::new(),
            settings_focus: SettingsFocus::Grade,

            schedule,
            dashboard,
            calendar,

            schedule_selection: 0,
            dashboard_selection: 0,
            detail_selection: 0,
            month_selection: 0,
            day_selection: 0,

            load_tx,
            load_rx,

            status_message: None,
            tick: 0,
        })
    }

    /// Replace the fetcher used for screen loads.
    #[cfg(test)]
    pub fn set_fetcher(&mut self, fetcher: Arc<dyn ConditionalFetch>) {
        self.fetcher = fetcher;
    }

    pub fn current_tab(&self) -> Tab {
        self.screen.tab()
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub fn is_authenticated(&self) -> bool {
        self.config.authenticated && self.credentials.is_some()
    }

    /// Start the login process (show login overlay)
    pub fn start_login(&mut self) {
        self.state = AppState::LoggingIn;
        self.login_focus = if self.login_username.is_empty() {
            LoginFocus::Username
        } else {
            LoginFocus::Password
        };
        self.login_error = None;
    }

    fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.api.set_credentials(credentials.clone());
        self.fetcher = Arc::new(self.api.clone());
        self.credentials = credentials;
    }

    /// Attempt login with the credentials from the login form
    pub async fn attempt_login(&mut self) -> Result<()> {
        let username = self.login_username.trim().to_string();
        let password = self.login_password.clone();

        if username.is_empty() || password.is_empty() {
            self.login_error = Some("Username and password required".to_string());
            return Err(anyhow::anyhow!("Username and password required"));
        }

        self.login_error = None;

        match self.api.validate_login(&username, &password).await {
            Ok(true) => {
                if let Err(e) = CredentialStore::store(&username, &password) {
                    warn!(error = %e, "Failed to store credentials");
                }

                self.config.username = Some(username.clone());
                self.config.authenticated = true;
                self.save_config();

                self.set_credentials(Some(Credentials::new(username, password)));
                self.login_password.clear();
                info!("Login successful");

                self.reload_after_login();
                self.register_device_token();
                Ok(())
            }
            Ok(false) => {
                self.config.authenticated = false;
                self.save_config();
                self.login_error = Some("Invalid username or password".to_string());
                Err(anyhow::anyhow!("Login rejected"))
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                let user_message = match &e {
                    ApiError::NetworkError(err) if err.is_timeout() => {
                        "Connection timed out. Please try again.".to_string()
                    }
                    ApiError::NetworkError(_) => {
                        "Unable to connect to server. Check your internet connection.".to_string()
                    }
                    other => format!("Login failed: {}", other),
                };
                self.login_error = Some(user_message);
                Err(e.into())
            }
        }
    }

    /// Results of loads started without the new credentials are stale: drop
    /// their errors and load the current screen again.
    fn reload_after_login(&mut self) {
        self.error = None;
        self.state = AppState::Normal;
        for tab in [Tab::Schedule, Tab::Dashboard, Tab::Calendar] {
            self.teardown_tab(tab);
        }
        self.dismiss_screen_errors();
        self.load_current(false);
    }

    fn save_config(&self) {
        let Some(ref path) = self.config_path else {
            return;
        };
        if let Err(e) = self.config.save_to(path) {
            warn!(error = %e, "Failed to save config");
        }
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Show the settings form, filled with the current selection.
    pub fn start_settings(&mut self) {
        self.settings_grade = self.config.grade().unwrap_or_default().to_string();
        self.settings_courses = self.config.course_list.join(", ");
        self.settings_focus = SettingsFocus::Grade;
        self.state = AppState::EditingSettings;
    }

    /// Apply the settings form and close it.
    pub fn save_settings(&mut self) {
        let grade = self.settings_grade.clone();
        let courses = self.settings_courses.clone();
        self.apply_settings(&grade, &courses);
        self.close_overlay();
    }

    /// Change grade and courses: saves the config, replaces the dashboard
    /// screen when the grade changed and re-registers the device token.
    pub fn apply_settings(&mut self, grade: &str, courses: &str) {
        let old_domain = self.config.dashboard_domain();
        self.config.set_selection(grade, courses);
        self.save_config();
        info!(grade = ?self.config.grade(), courses = self.config.course_list.len(), "Settings saved");

        let new_domain = self.config.dashboard_domain();
        if new_domain != old_domain {
            self.teardown_tab(Tab::Dashboard);
            self.dashboard = new_domain.map(|domain| ScreenController::new(domain, self.cache.clone()));
            self.dashboard_selection = 0;
            self.history
                .retain(|s| !matches!(s, Screen::GradeDetail { tab: Tab::Dashboard, .. }));

            if self.current_tab() == Tab::Dashboard {
                self.screen = Screen::Tab(Tab::Dashboard);
                self.detail_selection = 0;
                self.load_current(false);
            }
        }
        self.clamp_selections();

        self.register_device_token();
    }

    /// Re-send the stored push token with the current grade and login.
    fn register_device_token(&self) {
        let mut settings = PushSettings::from_config(&self.config, APP_VERSION);
        settings.credentials = self.credentials.clone();

        let mut handler = PushHandler::new(
            self.cache.clone(),
            settings,
            Arc::new(LogNotifier),
            Arc::new(self.api.clone()),
        );
        if handler.update_device_token().is_none() {
            debug!("No device token registration after login");
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Show the first screen and start loading it.
    pub fn start(&mut self) {
        self.load_current(false);
    }

    /// Switch to a tab's main screen.
    pub fn select_tab(&mut self, tab: Tab) {
        if self.screen != Screen::Tab(tab) {
            self.navigate_to(Screen::Tab(tab));
        }
    }

    pub fn navigate_to(&mut self, screen: Screen) {
        self.history.push(self.screen);
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }
        self.set_screen(screen);
    }

    /// Return to the previous screen. Returns false if there is none.
    pub fn go_back(&mut self) -> bool {
        match self.history.pop() {
            Some(screen) => {
                self.set_screen(screen);
                true
            }
            None => false,
        }
    }

    fn set_screen(&mut self, screen: Screen) {
        let old_tab = self.screen.tab();
        self.screen = screen;
        self.focus = Focus::List;
        self.detail_selection = 0;

        if old_tab != screen.tab() {
            self.teardown_tab(old_tab);
            self.search_query.clear();
            self.load_current(false);
        }
    }

    fn teardown_tab(&mut self, tab: Tab) {
        match tab {
            Tab::Schedule => self.schedule.teardown(),
            Tab::Dashboard => {
                if let Some(ref mut dashboard) = self.dashboard {
                    dashboard.teardown();
                }
            }
            Tab::Calendar => self.calendar.teardown(),
        }
    }

    /// Open the detail view of the selected list entry.
    pub fn open_selected(&mut self) {
        let tab = self.current_tab();
        match self.screen {
            Screen::Tab(Tab::Schedule) | Screen::Tab(Tab::Dashboard) => {
                let selection = if tab == Tab::Schedule {
                    self.schedule_selection
                } else {
                    self.dashboard_selection
                };
                if let Some(&(date, grade)) = self.grade_entries(tab).get(selection) {
                    self.navigate_to(Screen::GradeDetail { tab, date, grade });
                }
            }
            Screen::Tab(Tab::Calendar) => {
                self.focus = Focus::Detail;
                self.day_selection = 0;
            }
            Screen::GradeDetail { .. } => {}
        }
    }

    /// Act on a deep link left behind by a push message.
    pub fn open_deep_link(&mut self, link: &DeepLink) {
        let tab = if self.dashboard.is_some() {
            Tab::Dashboard
        } else {
            Tab::Schedule
        };
        self.screen = Screen::Tab(tab);
        self.status_message = Some(match link.timestamp {
            Some(ref ts) => format!("Changes pushed at {}", ts),
            None => "Changes pushed".to_string(),
        });
        debug!(?link, "Opened deep link");
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load the current tab's document. Cached content is shown right away.
    pub fn load_current(&mut self, refreshing: bool) {
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.load_tx.clone();

        let started = match self.current_tab() {
            Tab::Schedule => {
                self.schedule.prime_from_cache();
                self.schedule.spawn_load(fetcher, refreshing, tx)
            }
            Tab::Dashboard => match self.dashboard {
                Some(ref mut dashboard) => {
                    dashboard.prime_from_cache();
                    dashboard.spawn_load(fetcher, refreshing, tx)
                }
                None => return,
            },
            Tab::Calendar => {
                self.calendar.prime_from_cache();
                self.calendar.spawn_load(fetcher, refreshing, tx)
            }
        };

        if refreshing {
            self.status_message = Some(if started {
                "Refreshing...".to_string()
            } else {
                "Refresh already in progress".to_string()
            });
        }
    }

    /// Apply completed background loads
    pub fn check_background_tasks(&mut self) {
        self.tick = self.tick.wrapping_add(1);

        let mut completions = Vec::new();
        while let Ok(completion) = self.load_rx.try_recv() {
            completions.push(completion);
        }

        for completion in completions {
            self.apply_completion(completion);
        }
    }

    fn apply_completion(&mut self, completion: LoadCompletion) {
        let domain = completion.domain.clone();
        let result = match domain {
            Domain::Schedule => self.schedule.apply(completion),
            Domain::Calendar => self.calendar.apply(completion),
            Domain::Dashboard(_) => match self.dashboard {
                Some(ref mut dashboard) => dashboard.apply(completion),
                None => Ok(Applied::Discarded),
            },
        };

        match result {
            Ok(Applied::Displayed(resolution)) => {
                self.clamp_selections();
                self.status_message = match resolution {
                    Resolution::Fetched => Some(format!("{} updated", domain.title())),
                    Resolution::Cached => None,
                };
            }
            Ok(Applied::Discarded) => {}
            Err(e) => self.show_error(&e),
        }
    }

    /// Show the error dialog. While another overlay is open the error waits
    /// until that overlay closes.
    fn show_error(&mut self, e: &ScreenError) {
        self.status_message = None;
        self.error = Some(ErrorDialog {
            title: e.title().to_string(),
            message: e.user_message(),
        });
        if matches!(self.state, AppState::Normal | AppState::ShowingError) {
            self.state = AppState::ShowingError;
        } else {
            debug!(state = ?self.state, "Error dialog queued behind overlay");
        }
    }

    /// Leave an overlay, showing a queued error if there is one.
    pub fn close_overlay(&mut self) {
        self.state = if self.error.is_some() {
            AppState::ShowingError
        } else {
            AppState::Normal
        };
    }

    /// Close the error dialog and return to the previous screen.
    pub fn dismiss_error(&mut self) {
        self.error = None;
        self.state = AppState::Normal;
        self.dismiss_screen_errors();
        self.go_back();
    }

    fn dismiss_screen_errors(&mut self) {
        self.schedule.dismiss_error();
        self.calendar.dismiss_error();
        if let Some(ref mut dashboard) = self.dashboard {
            dashboard.dismiss_error();
        }
    }

    fn clamp_selections(&mut self) {
        let clamp = |selection: usize, len: usize| selection.min(len.saturating_sub(1));
        self.schedule_selection = clamp(self.schedule_selection, self.grade_count(Tab::Schedule));
        self.dashboard_selection = clamp(self.dashboard_selection, self.grade_count(Tab::Dashboard));
        self.month_selection = clamp(self.month_selection, self.months().len());
        self.day_selection = clamp(self.day_selection, self.day_count());
    }

    fn controller_state(&self) -> Option<&ScreenState> {
        match self.current_tab() {
            Tab::Schedule => Some(self.schedule.state()),
            Tab::Dashboard => self.dashboard.as_ref().map(|d| d.state()),
            Tab::Calendar => Some(self.calendar.state()),
        }
    }

    /// A load without anything to show yet
    pub fn is_loading_initial(&self) -> bool {
        let loading = matches!(
            self.controller_state(),
            Some(ScreenState::Loading { refreshing: false })
        );
        let has_document = match self.current_tab() {
            Tab::Calendar => self.calendar.document().is_some(),
            tab => self.schedule_document(tab).is_some(),
        };
        loading && !has_document
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self.controller_state(), Some(ScreenState::Loading { .. }))
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER_FRAMES[self.tick % SPINNER_FRAMES.len()]
    }

    pub fn current_domain(&self) -> Option<Domain> {
        match self.current_tab() {
            Tab::Schedule => Some(Domain::Schedule),
            Tab::Dashboard => self.config.dashboard_domain(),
            Tab::Calendar => Some(Domain::Calendar),
        }
    }

    pub fn cache_age_display(&self) -> String {
        match self.current_domain() {
            Some(domain) => self.cache.age_display(&domain),
            None => "never".to_string(),
        }
    }

    // =========================================================================
    // Schedule data
    // =========================================================================

    pub fn schedule_document(&self, tab: Tab) -> Option<&Schedule> {
        match tab {
            Tab::Schedule => self.schedule.document(),
            Tab::Dashboard => self.dashboard.as_ref().and_then(|d| d.document()),
            Tab::Calendar => None,
        }
    }

    /// (date index, grade index) of every grade item, in document order.
    pub fn grade_entries(&self, tab: Tab) -> Vec<(usize, usize)> {
        self.schedule_document(tab)
            .map(|schedule| {
                schedule
                    .dates
                    .iter()
                    .enumerate()
                    .flat_map(|(d, date)| (0..date.grade_items.len()).map(move |g| (d, g)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of grade rows in a tab's schedule.
    pub fn grade_count(&self, tab: Tab) -> usize {
        self.schedule_document(tab).map(Schedule::grade_count).unwrap_or(0)
    }

    pub fn grade_item(&self, tab: Tab, date: usize, grade: usize) -> Option<(&str, &GradeItem)> {
        self.schedule_document(tab)?.grade_item(date, grade)
    }

    /// Rows shown for a grade. The dashboard only shows the user's courses.
    pub fn visible_substitutions(&self, tab: Tab, date: usize, grade: usize) -> Vec<&Substitution> {
        match self.grade_item(tab, date, grade) {
            Some((_, item)) if tab == Tab::Dashboard => item.substitutions_for(&self.config.course_list),
            Some((_, item)) => item.substitutions.iter().collect(),
            None => Vec::new(),
        }
    }

    // =========================================================================
    // Calendar data
    // =========================================================================

    pub fn months(&self) -> &[MonthItem] {
        self.calendar
            .document()
            .map(|c| c.months.as_slice())
            .unwrap_or_default()
    }

    pub fn selected_month(&self) -> Option<&MonthItem> {
        self.months().get(self.month_selection)
    }

    pub fn search_hits(&self) -> Vec<CalendarHit<'_>> {
        self.calendar
            .document()
            .map(|c| c.search(&self.search_query))
            .unwrap_or_default()
    }

    /// Number of entries in the right calendar pane
    pub fn day_count(&self) -> usize {
        if self.search_query.is_empty() {
            self.selected_month().map(|m| m.days.len()).unwrap_or(0)
        } else {
            self.search_hits().len()
        }
    }

    // =========================================================================
    // Selection movement
    // =========================================================================

    /// Move the selection of the focused list by `delta`.
    pub fn move_selection(&mut self, delta: isize) {
        let step = |current: usize, len: usize| -> usize {
            if len == 0 {
                return 0;
            }
            (current as isize + delta).clamp(0, len as isize - 1) as usize
        };

        match self.screen {
            Screen::Tab(Tab::Schedule) => {
                let len = self.grade_count(Tab::Schedule);
                self.schedule_selection = step(self.schedule_selection, len);
            }
            Screen::Tab(Tab::Dashboard) => {
                let len = self.grade_count(Tab::Dashboard);
                self.dashboard_selection = step(self.dashboard_selection, len);
            }
            Screen::Tab(Tab::Calendar) => match self.focus {
                Focus::List => {
                    let previous = self.month_selection;
                    self.month_selection = step(self.month_selection, self.months().len());
                    if previous != self.month_selection {
                        self.day_selection = 0;
                    }
                }
                Focus::Detail => {
                    self.day_selection = step(self.day_selection, self.day_count());
                }
            },
            Screen::GradeDetail { tab, date, grade } => {
                let len = self.visible_substitutions(tab, date, grade).len();
                self.detail_selection = step(self.detail_selection, len);
            }
        }
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

/// Check if a username character should be accepted
pub fn can_add_username_char(current_len: usize, c: char) -> bool {
    current_len < MAX_USERNAME_LENGTH && is_valid_input_char(c)
}

/// Check if a password character should be accepted
pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LENGTH && is_valid_input_char(c)
}

/// Check if a grade or course list character should be accepted
pub fn can_add_settings_char(current_len: usize, c: char) -> bool {
    current_len < MAX_SETTINGS_LENGTH && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use piusapp_core::api::FetchResponse;
    use std::time::Duration;

    const SCHEDULE: &str = r#"{"_digest":"s1","lastUpdate":"Mo","dates":[
        {"title":"Montag","gradeItems":[
            {"grade":"5A","vertretungsplanItems":[["1","Entfall","D","","","",""]]},
            {"grade":"Q1","vertretungsplanItems":[["2","Vertretung","M-LK1","101","Mü","",""],["3","Vertretung","E-GK2","102","Sch","",""]]}
        ]},
        {"title":"Dienstag","gradeItems":[{"grade":"6B","vertretungsplanItems":[]}]}
    ]}"#;

    /// Answers every fetch with the same status and body.
    struct FixedFetcher {
        status: u16,
        body: Option<&'static str>,
    }

    #[async_trait]
    impl ConditionalFetch for FixedFetcher {
        async fn fetch(&self, _endpoint: &str, _digest: Option<&str>) -> Result<FetchResponse, ApiError> {
            Ok(FetchResponse::new(self.status, self.body.map(str::to_string)))
        }
    }

    /// Never answers, like a request stuck on a slow network.
    struct HangingFetcher;

    #[async_trait]
    impl ConditionalFetch for HangingFetcher {
        async fn fetch(&self, _endpoint: &str, _digest: Option<&str>) -> Result<FetchResponse, ApiError> {
            std::future::pending().await
        }
    }

    fn test_app(config: Config, status: u16, body: Option<&'static str>) -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::with_cache_dir(config, dir.path().to_path_buf()).unwrap();
        app.set_fetcher(Arc::new(FixedFetcher { status, body }));
        (dir, app)
    }

    /// Wait until the current screen's load has been applied.
    async fn settle(app: &mut App) {
        for _ in 0..100 {
            app.check_background_tasks();
            if !app.is_refreshing() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("load did not finish");
    }

    // -------------------------------------------------------------------------
    // Tab Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_tab_next() {
        assert_eq!(Tab::Schedule.next(), Tab::Dashboard);
        assert_eq!(Tab::Dashboard.next(), Tab::Calendar);
        assert_eq!(Tab::Calendar.next(), Tab::Schedule); // Wraps around
    }

    #[test]
    fn test_tab_prev() {
        assert_eq!(Tab::Schedule.prev(), Tab::Calendar); // Wraps around
        assert_eq!(Tab::Calendar.prev(), Tab::Dashboard);
        assert_eq!(Tab::Dashboard.prev(), Tab::Schedule);
    }

    // -------------------------------------------------------------------------
    // Navigation Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_open_grade_detail_and_back() {
        let (_dir, mut app) = test_app(Config::default(), 200, Some(SCHEDULE));
        app.start();
        settle(&mut app).await;

        assert_eq!(app.grade_entries(Tab::Schedule), vec![(0, 0), (0, 1), (1, 0)]);

        app.move_selection(1);
        app.open_selected();
        assert_eq!(
            app.screen,
            Screen::GradeDetail { tab: Tab::Schedule, date: 0, grade: 1 }
        );
        assert_eq!(app.visible_substitutions(Tab::Schedule, 0, 1).len(), 2);

        assert!(app.go_back());
        assert_eq!(app.screen, Screen::Tab(Tab::Schedule));
        assert!(!app.go_back());
    }

    #[tokio::test]
    async fn test_dashboard_filters_courses() {
        let config = Config {
            grade: Some("Q1".into()),
            course_list: vec!["m-lk1".into()],
            ..Default::default()
        };
        let (_dir, mut app) = test_app(config, 200, Some(SCHEDULE));
        app.select_tab(Tab::Dashboard);
        settle(&mut app).await;

        assert_eq!(app.visible_substitutions(Tab::Dashboard, 0, 1).len(), 1);
        assert_eq!(
            app.cache.digest(&Domain::Dashboard("Q1".into())).as_deref(),
            Some("s1")
        );
    }

    #[tokio::test]
    async fn test_failed_load_shows_error_and_goes_back() {
        let (_dir, mut app) = test_app(Config::default(), 500, None);
        app.select_tab(Tab::Calendar);
        settle(&mut app).await;

        assert_eq!(app.state, AppState::ShowingError);
        assert_eq!(app.error.as_ref().unwrap().title, "Server Error");

        app.dismiss_error();
        assert_eq!(app.state, AppState::Normal);
        assert!(app.error.is_none());
        assert_eq!(app.screen, Screen::Tab(Tab::Schedule));
    }

    #[tokio::test]
    async fn test_malformed_calendar_shows_error() {
        let (_dir, mut app) = test_app(Config::default(), 200, Some("{broken"));
        app.select_tab(Tab::Calendar);
        settle(&mut app).await;

        assert_eq!(app.state, AppState::ShowingError);
        assert_eq!(app.error.as_ref().unwrap().title, "Data Error");
        assert!(app.cache.payload(&Domain::Calendar).is_none());
    }

    #[tokio::test]
    async fn test_error_waits_behind_login_form() {
        let (_dir, mut app) = test_app(Config::default(), 401, None);
        app.start();
        app.start_login();
        app.login_password.push_str("geh");
        settle(&mut app).await;

        assert_eq!(app.state, AppState::LoggingIn);
        assert_eq!(app.login_password, "geh");
        assert!(app.error.is_some());

        // Closing the form reveals the queued error
        app.close_overlay();
        assert_eq!(app.state, AppState::ShowingError);
    }

    #[tokio::test]
    async fn test_login_drops_stale_error_and_reloads() {
        let (_dir, mut app) = test_app(Config::default(), 401, None);
        app.start();
        app.start_login();
        settle(&mut app).await;
        assert!(app.error.is_some());

        app.set_fetcher(Arc::new(FixedFetcher { status: 200, body: Some(SCHEDULE) }));
        app.reload_after_login();
        assert_eq!(app.state, AppState::Normal);
        assert!(app.error.is_none());

        settle(&mut app).await;
        assert_eq!(app.state, AppState::Normal);
        assert_eq!(app.grade_count(Tab::Schedule), 3);
    }

    #[tokio::test]
    async fn test_login_replaces_load_still_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::with_cache_dir(Config::default(), dir.path().to_path_buf()).unwrap();
        app.set_fetcher(Arc::new(HangingFetcher));
        app.start();
        assert!(app.is_refreshing());

        app.set_fetcher(Arc::new(FixedFetcher { status: 200, body: Some(SCHEDULE) }));
        app.reload_after_login();
        settle(&mut app).await;

        assert!(app.schedule_document(Tab::Schedule).is_some());
        assert_eq!(app.status_message.as_deref(), Some("Vertretungsplan updated"));
    }

    #[tokio::test]
    async fn test_apply_settings_rebuilds_dashboard() {
        let (_dir, mut app) = test_app(Config::default(), 200, Some(SCHEDULE));
        app.select_tab(Tab::Dashboard);
        assert!(app.dashboard.is_none());

        app.apply_settings("Q1", "m-lk1");
        assert_eq!(app.config.grade(), Some("Q1"));
        assert_eq!(
            app.dashboard.as_ref().map(|d| d.domain().clone()),
            Some(Domain::Dashboard("Q1".into()))
        );
        settle(&mut app).await;
        assert_eq!(app.visible_substitutions(Tab::Dashboard, 0, 1).len(), 1);

        app.apply_settings(" ", "");
        assert!(app.dashboard.is_none());
        assert!(app.config.course_list.is_empty());
        assert_eq!(app.grade_count(Tab::Dashboard), 0);
    }

    #[test]
    fn test_dashboard_without_grade() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::with_cache_dir(Config::default(), dir.path().to_path_buf()).unwrap();
        assert!(app.dashboard.is_none());
        assert!(app.grade_entries(Tab::Dashboard).is_empty());
    }

    // -------------------------------------------------------------------------
    // Input Validation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_can_add_username_char() {
        assert!(can_add_username_char(0, 'a'));
        assert!(can_add_username_char(49, 'z'));
        assert!(!can_add_username_char(50, 'a'));
        assert!(!can_add_username_char(0, '\x00'));
        assert!(!can_add_username_char(0, '\n'));
    }

    #[test]
    fn test_can_add_settings_char() {
        assert!(can_add_settings_char(0, ','));
        assert!(!can_add_settings_char(100, 'a'));
        assert!(!can_add_settings_char(0, '\t'));
    }

    #[test]
    fn test_can_add_password_char() {
        assert!(can_add_password_char(0, 'a'));
        assert!(can_add_password_char(127, '!'));
        assert!(!can_add_password_char(128, 'a'));
        assert!(!can_add_password_char(0, '\r'));
    }
}
