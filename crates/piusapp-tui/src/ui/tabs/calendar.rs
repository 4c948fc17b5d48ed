use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::app::{App, Focus};
use crate::ui::styles;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let Some(calendar) = app.calendar.document() else {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            "  No calendar yet. Press [u] to update.",
            styles::muted_style(),
        )))
        .block(Block::default().borders(Borders::ALL).border_style(styles::border_style(false)));
        frame.render_widget(paragraph, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(24), Constraint::Min(20)])
        .split(area);

    let months: Vec<ListItem> = calendar
        .month_names()
        .into_iter()
        .map(|name| ListItem::new(name.to_string()))
        .collect();
    let month_list = List::new(months)
        .block(
            Block::default()
                .title(" Monate ")
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(app.focus == Focus::List)),
        )
        .highlight_style(styles::selected_style());

    let mut month_state = ListState::default();
    month_state.select(Some(app.month_selection));
    frame.render_stateful_widget(month_list, chunks[0], &mut month_state);

    if app.search_query.is_empty() {
        render_days(frame, app, chunks[1]);
    } else {
        render_search_hits(frame, app, chunks[1]);
    }
}

fn render_days(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Detail;
    let (title, rows): (String, Vec<Row>) = match app.selected_month() {
        Some(month) => (
            format!(" {} ({}) ", month.name, month.days.len()),
            month
                .days
                .iter()
                .map(|d| Row::new(vec![Cell::from(d.day.clone()), Cell::from(d.event.clone())]))
                .collect(),
        ),
        None => (" Termine ".to_string(), Vec::new()),
    };

    render_day_table(frame, app, area, title, rows, focused);
}

fn render_search_hits(frame: &mut Frame, app: &App, area: Rect) {
    let hits = app.search_hits();
    let title = format!(" Suche \"{}\" ({} Treffer) ", app.search_query, hits.len());
    let rows: Vec<Row> = hits
        .iter()
        .map(|hit| {
            Row::new(vec![
                Cell::from(format!("{} · {}", hit.month, hit.day.day)),
                Cell::from(hit.day.event.clone()),
            ])
        })
        .collect();

    render_day_table(frame, app, area, title, rows, true);
}

fn render_day_table(
    frame: &mut Frame,
    app: &App,
    area: Rect,
    title: String,
    rows: Vec<Row>,
    focused: bool,
) {
    let empty = rows.is_empty();
    let widths = [Constraint::Length(22), Constraint::Fill(1)];
    let table = Table::new(rows, widths)
        .block(
            Block::default()
                .title(title)
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(focused)),
        )
        .style(styles::list_item_style())
        .row_highlight_style(styles::selected_style());

    let mut state = TableState::default();
    if focused && !empty {
        state.select(Some(app.day_selection));
    }
    frame.render_stateful_widget(table, area, &mut state);
}
