use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use piusapp_core::models::Schedule;
use piusapp_core::utils::{format_optional, truncate_string};

use crate::app::{App, Tab};
use crate::ui::styles;

/// Longest comment shown in the detail table before truncation
const MAX_COMMENT_LEN: usize = 60;

/// Dates with their grades; Enter opens a grade.
pub fn render_overview(frame: &mut Frame, app: &App, tab: Tab, area: Rect) {
    if tab == Tab::Dashboard && app.dashboard.is_none() {
        render_no_grade(frame, area);
        return;
    }

    let Some(schedule) = app.schedule_document(tab) else {
        render_empty(frame, area, "No data yet. Press [u] to update.");
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(5)])
        .split(area);

    render_header(frame, schedule, chunks[0]);
    render_grade_list(frame, app, tab, schedule, chunks[1]);
}

fn render_header(frame: &mut Frame, schedule: &Schedule, area: Rect) {
    let mut lines = vec![Line::from(vec![
        Span::styled("Stand: ", styles::muted_style()),
        Span::raw(schedule.last_update.clone()),
    ])];
    if let Some(ref ticker) = schedule.ticker_text {
        lines.push(Line::from(Span::styled(ticker.clone(), styles::highlight_style())));
    }
    if let Some(ref additional) = schedule.additional_text {
        lines.push(Line::from(Span::styled(additional.clone(), styles::muted_style())));
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::BOTTOM).border_style(styles::muted_style()))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_grade_list(frame: &mut Frame, app: &App, tab: Tab, schedule: &Schedule, area: Rect) {
    let selection = match tab {
        Tab::Dashboard => app.dashboard_selection,
        _ => app.schedule_selection,
    };

    let mut rows = Vec::new();
    let mut selected_row = None;
    let mut entry = 0;

    for (d, date) in schedule.dates.iter().enumerate() {
        rows.push(Row::new(vec![Cell::from(date.date.clone()), Cell::from("")]).style(styles::title_style()));

        for (g, item) in date.grade_items.iter().enumerate() {
            let count = app.visible_substitutions(tab, d, g).len();
            let style = if entry == selection {
                selected_row = Some(rows.len());
                styles::selected_style()
            } else if count == 0 {
                styles::muted_style()
            } else {
                styles::list_item_style()
            };
            let label = if count == 1 {
                "1 Eintrag".to_string()
            } else {
                format!("{} Einträge", count)
            };
            rows.push(Row::new(vec![Cell::from(format!("  {}", item.grade)), Cell::from(label)]).style(style));
            entry += 1;
        }
    }

    let widths = [Constraint::Percentage(50), Constraint::Fill(1)];
    let title = format!(" {} ({} dates) ", tab.title(), schedule.dates.len());

    let table = Table::new(rows, widths)
        .block(
            Block::default()
                .title(title)
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(true)),
        )
        .row_highlight_style(styles::selected_style());

    let mut state = TableState::default();
    state.select(selected_row);
    frame.render_stateful_widget(table, area, &mut state);
}

/// Substitution rows of one grade on one date.
pub fn render_grade_detail(
    frame: &mut Frame,
    app: &App,
    tab: Tab,
    date: usize,
    grade: usize,
    area: Rect,
) {
    let Some((date_title, item)) = app.grade_item(tab, date, grade) else {
        render_empty(frame, area, "This entry is no longer available. Press [Esc] to go back.");
        return;
    };

    let header = Row::new(vec!["Std.", "Art", "Kurs", "Raum", "Lehrer", "Bemerkung", "EVA"])
        .style(styles::title_style())
        .height(1);

    let substitutions = app.visible_substitutions(tab, date, grade);
    let rows: Vec<Row> = substitutions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let style = if i == app.detail_selection {
                styles::selected_style()
            } else {
                styles::substitution_style(s.kind())
            };
            Row::new(vec![
                Cell::from(format_optional(s.lesson(), "-")),
                Cell::from(format_optional(s.kind(), "-")),
                Cell::from(format_optional(s.course(), "")),
                Cell::from(format_optional(s.room(), "")),
                Cell::from(format_optional(s.teacher(), "")),
                Cell::from(truncate_string(s.comment().unwrap_or_default(), MAX_COMMENT_LEN)),
                Cell::from(format_optional(s.eva(), "")),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(5),
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(10),
        Constraint::Fill(1),
        Constraint::Length(12),
    ];

    let title = format!(" {} · {} ({}) - [Esc] back ", date_title, item.grade, substitutions.len());
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(true)),
        )
        .row_highlight_style(styles::selected_style());

    let mut state = TableState::default();
    if !substitutions.is_empty() {
        state.select(Some(app.detail_selection));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_no_grade(frame: &mut Frame, area: Rect) {
    render_empty(
        frame,
        area,
        "No grade selected. Press [s] to choose your grade and courses.",
    );
}

fn render_empty(frame: &mut Frame, area: Rect, message: &str) {
    let paragraph = Paragraph::new(Line::from(Span::styled(
        format!("  {}", message),
        styles::muted_style(),
    )))
    .block(Block::default().borders(Borders::ALL).border_style(styles::border_style(false)));
    frame.render_widget(paragraph, area);
}
