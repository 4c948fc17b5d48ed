use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AppState, LoginFocus, Screen, SettingsFocus, Tab};

use super::styles;
use super::tabs::{calendar, schedule};

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(3), // Tabs
            Constraint::Min(10),   // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_tabs(frame, app, chunks[1]);
    render_main_content(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    // Render overlays
    match app.state {
        AppState::ShowingHelp => render_help_overlay(frame),
        AppState::LoggingIn => render_login_overlay(frame, app),
        AppState::EditingSettings => render_settings_overlay(frame, app),
        AppState::ShowingError => render_error_overlay(frame, app),
        AppState::ConfirmingQuit => render_quit_overlay(frame),
        _ => {}
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.config.grade() {
        Some(grade) => format!("  Pius App  ·  {}", grade),
        None => "  Pius App".to_string(),
    };
    let help_hint = "[?] Help";

    let title_line = Line::from(vec![
        Span::styled(title.clone(), styles::title_style()),
        Span::raw(" ".repeat(
            (area.width as usize).saturating_sub(title.chars().count() + help_hint.len() + 4),
        )),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let tabs = [
        ("[1] ", Tab::Schedule),
        ("[2] ", Tab::Dashboard),
        ("[3] ", Tab::Calendar),
    ];

    let mut spans = vec![Span::raw(" ")];
    for (i, (key, tab)) in tabs.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" | ", styles::muted_style()));
        }
        let label = format!("{}{}", key, tab.title());
        if app.current_tab() == *tab {
            spans.push(Span::styled(label, styles::tab_style(true)));
        } else {
            spans.push(Span::styled(label, styles::muted_style()));
        }
    }

    // Search query on the right while searching the calendar
    if app.current_tab() == Tab::Calendar
        && (app.state == AppState::Searching || !app.search_query.is_empty())
    {
        let search = format!("/{}", app.search_query);
        let used: usize = spans.iter().map(|s| s.content.chars().count()).sum();
        let padding = (area.width as usize).saturating_sub(used + search.chars().count() + 2);
        spans.push(Span::raw(" ".repeat(padding)));
        spans.push(Span::styled(search, styles::search_style()));
    }

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_main_content(frame: &mut Frame, app: &App, area: Rect) {
    if app.is_loading_initial() {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            format!("  {} Loading {}...", app.spinner(), app.current_tab().title()),
            styles::muted_style(),
        )));
        frame.render_widget(paragraph, area);
        return;
    }

    match app.screen {
        Screen::Tab(Tab::Schedule) => schedule::render_overview(frame, app, Tab::Schedule, area),
        Screen::Tab(Tab::Dashboard) => schedule::render_overview(frame, app, Tab::Dashboard, area),
        Screen::Tab(Tab::Calendar) => calendar::render(frame, app, area),
        Screen::GradeDetail { tab, date, grade } => {
            schedule::render_grade_detail(frame, app, tab, date, grade, area)
        }
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = "[u]pdate | [s]ettings | [l]ogin | [q]uit";

    let mut left_text = match app.status_message {
        Some(ref msg) => format!(" {} ", msg),
        None => format!(" Updated {} ", app.cache_age_display()),
    };
    if app.is_refreshing() {
        left_text = format!(" {}{}", app.spinner(), left_text);
    }
    let right_text = format!(" {} ", shortcuts);

    let width = area.width as usize;
    let padding_len = width
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());

    let status_line = Line::from(vec![
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    let paragraph = Paragraph::new(status_line).style(styles::status_bar_style());
    frame.render_widget(paragraph, area);
}

fn help_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", key), styles::help_key_style()),
        Span::styled(desc, styles::help_desc_style()),
    ])
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(52, 24, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");

    let help_text = vec![
        Line::from(Span::styled("  Pius App", styles::title_style())),
        Line::from(Span::styled(format!("  version {}", version), styles::muted_style())),
        Line::from(""),
        Line::from(Span::styled(" Navigation", styles::highlight_style())),
        help_line("1-3", "Switch tabs"),
        help_line("←/→", "Prev/next tab"),
        help_line("Tab", "Switch focus (months ↔ days)"),
        help_line("↑/↓", "Navigate list"),
        help_line("Enter", "Open grade / month"),
        help_line("Esc", "Go back"),
        Line::from(""),
        Line::from(Span::styled(" Actions", styles::highlight_style())),
        help_line("/", "Search calendar"),
        help_line("u", "Update from server"),
        help_line("s", "Grade and courses"),
        help_line("l", "Log in"),
        help_line("q", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::styled("       Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

fn render_login_overlay(frame: &mut Frame, app: &App) {
    let height = if app.login_error.is_some() { 11 } else { 9 };
    let area = centered_rect_fixed(46, height, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(Span::styled("  Login", styles::title_style())),
        Line::from(""),
    ];

    let username_focused = app.login_focus == LoginFocus::Username;
    let username_style = if username_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let cursor = if username_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("      "),
        Span::styled("Username: [", styles::muted_style()),
        Span::styled(format!("{:<16}{}", app.login_username, cursor), username_style),
        Span::styled("]", styles::muted_style()),
    ]));

    let password_focused = app.login_focus == LoginFocus::Password;
    let password_style = if password_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let password_masked = "*".repeat(app.login_password.chars().count().min(16));
    let cursor = if password_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("      "),
        Span::styled("Password: [", styles::muted_style()),
        Span::styled(format!("{:<16}{}", password_masked, cursor), password_style),
        Span::styled("]", styles::muted_style()),
    ]));

    let button_focused = app.login_focus == LoginFocus::Button;
    let button_style = if button_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let button = if button_focused { " ▶ Login ◀ " } else { "   Login   " };
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("            ["),
        Span::styled(button, button_style),
        Span::raw("]"),
    ]));

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!(" {}", error), styles::error_style())));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_settings_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect_fixed(56, 10, frame.area());
    frame.render_widget(Clear, area);

    let field = |label: &'static str, value: &str, focused: bool| {
        let style = if focused {
            styles::selected_style()
        } else {
            styles::list_item_style()
        };
        let cursor = if focused { "▌" } else { "" };
        Line::from(vec![
            Span::styled(format!("  {:<9}[", label), styles::muted_style()),
            Span::styled(format!("{:<30}{}", value, cursor), style),
            Span::styled("]", styles::muted_style()),
        ])
    };

    let lines = vec![
        Line::from(Span::styled("  Settings", styles::title_style())),
        Line::from(""),
        field("Grade:", &app.settings_grade, app.settings_focus == SettingsFocus::Grade),
        field("Courses:", &app.settings_courses, app.settings_focus == SettingsFocus::Courses),
        Line::from(Span::styled(
            "           e.g. Q1 with M-LK1, E-GK2",
            styles::muted_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("  ", styles::muted_style()),
            Span::styled("[Enter]", styles::help_key_style()),
            Span::styled(" save  ", styles::muted_style()),
            Span::styled("[Esc]", styles::help_key_style()),
            Span::styled(" cancel", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_error_overlay(frame: &mut Frame, app: &App) {
    let Some(ref error) = app.error else {
        return;
    };

    let area = centered_rect_fixed(50, 9, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(format!(" {}", error.message), styles::list_item_style())),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Enter]", styles::help_key_style()),
            Span::styled(" to go back", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .title(format!(" {} ", error.title))
        .title_style(styles::error_style())
        .borders(Borders::ALL)
        .border_style(styles::error_style())
        .style(Style::default());

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 7, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Are you sure you want to quit?",
            styles::highlight_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to quit, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
