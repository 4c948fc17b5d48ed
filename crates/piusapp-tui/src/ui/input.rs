//! Keyboard input handling for the TUI.
//!
//! This module handles all keyboard events and translates them into
//! application state changes.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};

use crate::app::{
    can_add_password_char, can_add_settings_char, can_add_username_char, App, AppState, Focus,
    LoginFocus, Screen, SettingsFocus, Tab, PAGE_SCROLL_SIZE,
};

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match app.state {
        AppState::LoggingIn => return handle_login_input(app, key).await,
        AppState::Searching => return Ok(handle_search_input(app, key)),
        AppState::EditingSettings => return Ok(handle_settings_input(app, key)),
        AppState::ShowingHelp => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                app.close_overlay();
            }
            return Ok(false);
        }
        AppState::ShowingError => {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                app.dismiss_error();
            }
            return Ok(false);
        }
        AppState::ConfirmingQuit => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    app.state = AppState::Quitting;
                    return Ok(true);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.close_overlay();
                }
                _ => {}
            }
            return Ok(false);
        }
        AppState::Normal | AppState::Quitting => {}
    }

    // Global keys
    match key.code {
        KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        KeyCode::Char('l') => app.start_login(),
        KeyCode::Char('s') => app.start_settings(),
        KeyCode::Char('u') => app.load_current(true),
        KeyCode::Char('1') => app.select_tab(Tab::Schedule),
        KeyCode::Char('2') => app.select_tab(Tab::Dashboard),
        KeyCode::Char('3') => app.select_tab(Tab::Calendar),
        KeyCode::Left => app.select_tab(app.current_tab().prev()),
        KeyCode::Right => app.select_tab(app.current_tab().next()),
        KeyCode::Up | KeyCode::Char('k') => app.move_selection(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_selection(1),
        KeyCode::PageUp => app.move_selection(-(PAGE_SCROLL_SIZE as isize)),
        KeyCode::PageDown => app.move_selection(PAGE_SCROLL_SIZE as isize),
        KeyCode::Enter => app.open_selected(),
        KeyCode::Esc | KeyCode::Backspace => handle_back(app),
        _ if app.screen == Screen::Tab(Tab::Calendar) => handle_calendar_input(app, key),
        _ => {}
    }
    Ok(false)
}

fn handle_back(app: &mut App) {
    if matches!(app.screen, Screen::GradeDetail { .. }) {
        app.go_back();
    } else if app.current_tab() == Tab::Calendar {
        if !app.search_query.is_empty() {
            app.search_query.clear();
            app.day_selection = 0;
        }
        app.focus = Focus::List;
    }
}

fn handle_calendar_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('/') => {
            app.state = AppState::Searching;
            app.search_query.clear();
            app.day_selection = 0;
        }
        KeyCode::Tab | KeyCode::BackTab => {
            app.focus = match app.focus {
                Focus::List => Focus::Detail,
                Focus::Detail => Focus::List,
            };
        }
        _ => {}
    }
}

fn handle_search_input(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Esc => {
            app.search_query.clear();
            app.close_overlay();
        }
        KeyCode::Enter => {
            // Keep search query active
            app.focus = Focus::Detail;
            app.close_overlay();
        }
        KeyCode::Backspace => {
            app.search_query.pop();
            app.day_selection = 0;
        }
        KeyCode::Char(c) if !c.is_control() => {
            app.search_query.push(c);
            // Reset selection when search changes
            app.day_selection = 0;
        }
        _ => {}
    }
    false
}

async fn handle_login_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            // Continue with cached data
            app.login_password.clear();
            app.close_overlay();
        }
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Username => LoginFocus::Password,
                LoginFocus::Password => LoginFocus::Button,
                LoginFocus::Button => LoginFocus::Username,
            };
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Username => LoginFocus::Button,
                LoginFocus::Password => LoginFocus::Username,
                LoginFocus::Button => LoginFocus::Password,
            };
        }
        KeyCode::Enter => match app.login_focus {
            LoginFocus::Username => app.login_focus = LoginFocus::Password,
            LoginFocus::Password | LoginFocus::Button => {
                // On failure login_error is set and the form stays open
                if app.attempt_login().await.is_err() {
                    app.login_focus = LoginFocus::Password;
                }
            }
        },
        KeyCode::Backspace => match app.login_focus {
            LoginFocus::Username => {
                app.login_username.pop();
            }
            LoginFocus::Password => {
                app.login_password.pop();
            }
            LoginFocus::Button => {}
        },
        KeyCode::Char(c) => match app.login_focus {
            LoginFocus::Username => {
                if can_add_username_char(app.login_username.chars().count(), c) {
                    app.login_username.push(c);
                }
            }
            LoginFocus::Password => {
                if can_add_password_char(app.login_password.chars().count(), c) {
                    app.login_password.push(c);
                }
            }
            LoginFocus::Button => {}
        },
        _ => {}
    }
    Ok(false)
}

fn handle_settings_input(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Esc => app.close_overlay(),
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            app.settings_focus = match app.settings_focus {
                SettingsFocus::Grade => SettingsFocus::Courses,
                SettingsFocus::Courses => SettingsFocus::Grade,
            };
        }
        KeyCode::Enter => match app.settings_focus {
            SettingsFocus::Grade => app.settings_focus = SettingsFocus::Courses,
            SettingsFocus::Courses => app.save_settings(),
        },
        KeyCode::Backspace => {
            match app.settings_focus {
                SettingsFocus::Grade => app.settings_grade.pop(),
                SettingsFocus::Courses => app.settings_courses.pop(),
            };
        }
        KeyCode::Char(c) => {
            let field = match app.settings_focus {
                SettingsFocus::Grade => &mut app.settings_grade,
                SettingsFocus::Courses => &mut app.settings_courses,
            };
            if can_add_settings_char(field.chars().count(), c) {
                field.push(c);
            }
        }
        _ => {}
    }
    false
}
