//! Pius App - a terminal client for the school substitution schedule.
//!
//! This application provides a fast, keyboard-driven interface for the
//! Vertretungsplan, the personal dashboard of one grade and the school
//! calendar. A few command line modes cover push messages and syncing.

mod app;
mod notifier;
mod ui;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use piusapp_core::api::ApiClient;
use piusapp_core::auth::CredentialStore;
use piusapp_core::cache::{CacheManager, FileCache};
use piusapp_core::config::Config;
use piusapp_core::push::{DeepLink, PushHandler, PushMessage, PushSettings};
use piusapp_core::sync::{domains_for, refresh_domains};

use app::{App, AppState, APP_VERSION};
use notifier::ConsoleNotifier;
use ui::input::handle_input;
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

/// Log file prefix inside the cache directory
const LOG_FILE: &str = "piusapp.log";

fn env_filter() -> EnvFilter {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Log to stderr, for the command line modes
fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter())
        .init();
}

/// Log to a daily file while the UI owns the terminal.
/// The guard must live until shutdown so buffered lines get flushed.
fn init_file_tracing(dir: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(env_filter())
        .init();
    guard
}

fn load_config() -> Config {
    match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    }
}

fn open_cache(config: &Config) -> Result<(PathBuf, CacheManager)> {
    let cache_dir = config.cache_dir()?;
    let store = FileCache::new(cache_dir.clone()).context("Failed to open cache directory")?;
    Ok((cache_dir, CacheManager::new(Arc::new(store))))
}

fn usage() -> &'static str {
    "Usage: piusapp [--push <file|->] [--register-token <token>] [--sync] [--login] [--logout]\n\
     \x20      piusapp --grade <grade> [--courses <course,course,...>]"
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    // Check for CLI commands
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        init_tracing();
        return match (args[1].as_str(), args.get(2)) {
            ("--push", Some(source)) => handle_push(source).await,
            ("--register-token", Some(token)) => register_token(token).await,
            ("--sync", _) => sync_all().await,
            ("--login", _) => login_interactive().await,
            ("--logout", _) => logout(),
            ("--grade", Some(_)) => {
                let (grade, courses) = parse_selection_args(&args[1..])?;
                set_selection(&grade, &courses).await
            }
            ("--help" | "-h", _) => {
                println!("{}", usage());
                Ok(())
            }
            _ => Err(anyhow::anyhow!(usage())),
        };
    }

    let config = load_config();
    let mut app = App::new(config)?;
    let _guard = init_file_tracing(&app.cache_dir);
    info!(version = APP_VERSION, "Pius App starting");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    match DeepLink::take(&app.cache_dir) {
        Ok(Some(link)) => app.open_deep_link(&link),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to read deep link"),
    }

    app.start();
    if !app.is_authenticated() {
        app.start_login();
    }

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    info!("Pius App shutting down");
    Ok(())
}

/// Feed a push message through the handler, as the push service would.
async fn handle_push(source: &str) -> Result<()> {
    let json = if source == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read push message from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read push message from {}", source))?
    };
    let message = PushMessage::from_json(&json)?;

    let config = load_config();
    let (cache_dir, cache) = open_cache(&config)?;
    let api = ApiClient::new(config.base_url())?;
    let handler = PushHandler::new(
        cache,
        PushSettings::from_config(&config, APP_VERSION),
        Arc::new(ConsoleNotifier),
        Arc::new(api),
    );

    let outcome = handler.on_message_received(&message);
    outcome.notification.deep_link.save(&cache_dir)?;

    match outcome.cache_updated {
        Some(domain) => eprintln!("Stored pushed schedule as {}", domain),
        None => eprintln!("No schedule stored"),
    }
    Ok(())
}

/// Remember a device token and register it with the backend.
async fn register_token(token: &str) -> Result<()> {
    let mut config = load_config();
    config.device_token = Some(token.to_string());
    config.save()?;

    let (_, cache) = open_cache(&config)?;
    let api = ApiClient::new(config.base_url())?;
    let mut handler = PushHandler::new(
        cache,
        PushSettings::from_config(&config, APP_VERSION),
        Arc::new(ConsoleNotifier),
        Arc::new(api),
    );

    match handler.on_new_token(token) {
        Some(task) => {
            task.await.context("Registration task failed")?;
            eprintln!("Device token submitted");
        }
        None => eprintln!("Device token stored; registration needs a grade and a login"),
    }
    Ok(())
}

/// `--grade <grade> [--courses <list>]` as (grade, courses).
fn parse_selection_args(args: &[String]) -> Result<(String, String)> {
    let mut grade = None;
    let mut courses = String::new();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| anyhow::anyhow!("Missing value for {}", flag))?;
        match flag.as_str() {
            "--grade" => grade = Some(value.clone()),
            "--courses" => courses = value.clone(),
            other => return Err(anyhow::anyhow!("Unknown option {}\n{}", other, usage())),
        }
    }
    let grade = grade.ok_or_else(|| anyhow::anyhow!(usage()))?;
    Ok((grade, courses))
}

/// Save grade and courses and register the device token for them.
async fn set_selection(grade: &str, courses: &str) -> Result<()> {
    let mut config = load_config();
    config.set_selection(grade, courses);
    config.save()?;

    match config.grade() {
        Some(grade) => println!("Grade {} with {} course(s)", grade, config.course_list.len()),
        None => println!("Grade cleared"),
    }

    let (_, cache) = open_cache(&config)?;
    let api = ApiClient::new(config.base_url())?;
    let mut handler = PushHandler::new(
        cache,
        PushSettings::from_config(&config, APP_VERSION),
        Arc::new(ConsoleNotifier),
        Arc::new(api),
    );
    if let Some(task) = handler.update_device_token() {
        task.await.context("Registration task failed")?;
        eprintln!("Device token submitted");
    }
    Ok(())
}

/// Forget the stored password and the login state.
fn logout() -> Result<()> {
    let mut config = load_config();
    if let Some(username) = config.username() {
        if let Err(e) = CredentialStore::delete(&username) {
            warn!(error = %e, "No stored password removed");
        }
    }
    config.authenticated = false;
    config.save()?;
    println!("Logged out");
    Ok(())
}

/// Conditionally refresh every domain and print what changed.
async fn sync_all() -> Result<()> {
    let config = load_config();
    let (_, cache) = open_cache(&config)?;
    let api = ApiClient::new(config.base_url())?.with_credentials(config.credentials());

    let reports = refresh_domains(&api, &cache, domains_for(config.grade())).await;
    for report in &reports {
        println!("{}", report.summary());
    }

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        return Err(anyhow::anyhow!("{} of {} domains failed", failed, reports.len()));
    }
    Ok(())
}

/// Interactive login on the command line
async fn login_interactive() -> Result<()> {
    let mut config = load_config();

    print!("Username: ");
    io::stdout().flush()?;
    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    let username = match username.trim() {
        "" => config
            .username()
            .ok_or_else(|| anyhow::anyhow!("Username required"))?,
        name => name.to_string(),
    };
    let password = rpassword::prompt_password("Password: ")?;

    let api = ApiClient::new(config.base_url())?;
    if !api.validate_login(&username, &password).await? {
        config.authenticated = false;
        config.save()?;
        return Err(anyhow::anyhow!("Invalid username or password"));
    }

    CredentialStore::store(&username, &password)?;
    config.username = Some(username);
    config.authenticated = true;
    config.save()?;

    println!("Login successful!");
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        // Draw UI
        terminal.draw(|f| render(f, app))?;

        // Poll for events with timeout to allow background updates
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            if let Event::Key(key) = event::read()? {
                // Ctrl+C to quit
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }

                // Handle input
                if handle_input(app, key).await? {
                    return Ok(());
                }
            }
        }

        // Check for completed background tasks
        app.check_background_tasks();

        // Check if we should quit
        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_selection_args() {
        let (grade, courses) =
            parse_selection_args(&args(&["--grade", "Q1", "--courses", "M-LK1,E-GK2"])).unwrap();
        assert_eq!(grade, "Q1");
        assert_eq!(courses, "M-LK1,E-GK2");

        let (grade, courses) = parse_selection_args(&args(&["--grade", "5A"])).unwrap();
        assert_eq!(grade, "5A");
        assert!(courses.is_empty());
    }

    #[test]
    fn test_parse_selection_args_errors() {
        assert!(parse_selection_args(&args(&["--grade"])).is_err());
        assert!(parse_selection_args(&args(&["--courses", "M-LK1"])).is_err());
        assert!(parse_selection_args(&args(&["--grade", "5A", "--bogus", "x"])).is_err());
    }
}
