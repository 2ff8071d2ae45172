//! UI rendering.

use crate::live::ChannelState;
use crate::tui::app::App;
use crate::tui::state::{ConfigField, NoticeLevel, Panel};
use dvt_common::{TestCategory, TestResult, TestStatus};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap},
};

struct Palette {
    accent: Color,
    running: Color,
    passed: Color,
    failed: Color,
    dim: Color,
    selection: Style,
}

fn palette(high_contrast: bool) -> Palette {
    if high_contrast {
        Palette {
            accent: Color::White,
            running: Color::Yellow,
            passed: Color::White,
            failed: Color::White,
            dim: Color::White,
            selection: Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD),
        }
    } else {
        Palette {
            accent: Color::Cyan,
            running: Color::Yellow,
            passed: Color::Green,
            failed: Color::Red,
            dim: Color::DarkGray,
            selection: Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        }
    }
}

fn status_color(status: &TestStatus, p: &Palette) -> Color {
    match status {
        TestStatus::Running => p.running,
        TestStatus::Completed => p.passed,
        TestStatus::Failed => p.failed,
        TestStatus::Unknown(_) => p.dim,
    }
}

fn format_time(result: &TestResult) -> String {
    result
        .start_time
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn format_duration(result: &TestResult) -> String {
    match result.duration() {
        Some(d) if d.num_minutes() > 0 => {
            format!("{}m{:02}s", d.num_minutes(), d.num_seconds() % 60)
        }
        Some(d) => format!("{}s", d.num_seconds()),
        None => "-".to_string(),
    }
}

/// Render the whole dashboard.
pub fn render(frame: &mut Frame, app: &App) {
    let p = palette(app.state.high_contrast);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Length(1), // panel tabs
            Constraint::Min(6),    // panel body
            Constraint::Length(1), // status line
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app, &p);
    render_tabs(frame, chunks[1], app, &p);
    match app.state.panel {
        Panel::Launch => render_launch(frame, chunks[2], app, &p),
        Panel::History => render_history(frame, chunks[2], app, &p),
        Panel::Config => render_config(frame, chunks[2], app, &p),
    }
    render_status_line(frame, chunks[3], app, &p);

    if app.state.show_help {
        render_help_popup(frame);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App, p: &Palette) {
    let channel_color = match app.state.channel {
        ChannelState::Open => p.passed,
        ChannelState::Connecting => p.running,
        ChannelState::Closed { .. } => p.failed,
    };
    let running = app.reconciler.active().len();
    let line = Line::from(vec![
        Span::styled(
            " DVT Compatibility Dashboard ",
            Style::default().fg(p.accent).add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ "),
        Span::raw(app.state.api_url.clone()),
        Span::raw(" │ live: "),
        Span::styled(app.state.channel.to_string(), Style::default().fg(channel_color)),
        Span::raw(format!(" │ running: {running}")),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_tabs(frame: &mut Frame, area: Rect, app: &App, p: &Palette) {
    let titles: Vec<Line> = Panel::ALL.iter().map(|panel| Line::from(panel.title())).collect();
    let selected = Panel::ALL
        .iter()
        .position(|panel| *panel == app.state.panel)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(Style::default().fg(p.accent).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, area);
}

fn render_launch(frame: &mut Frame, area: Rect, app: &App, p: &Palette) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(TestCategory::ALL.len() as u16 + 3),
            Constraint::Min(3),
        ])
        .split(area);

    let rows = TestCategory::ALL.iter().enumerate().map(|(i, category)| {
        let running = app.reconciler.category_running(*category);
        let state = if running {
            Cell::from("RUNNING").style(Style::default().fg(p.running))
        } else {
            Cell::from("idle").style(Style::default().fg(p.dim))
        };
        let latest = app.reconciler.latest_result_for(category.test_type());
        let (last, finished) = match latest {
            Some(result) => (
                Cell::from(result.status.label())
                    .style(Style::default().fg(status_color(&result.status, p))),
                result
                    .end_time
                    .map(|t| {
                        t.with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M")
                            .to_string()
                    })
                    .unwrap_or_else(|| "-".to_string()),
            ),
            None => (Cell::from("never run"), "-".to_string()),
        };
        let row = Row::new(vec![
            Cell::from(category.definition().name),
            state,
            last,
            Cell::from(finished),
        ]);
        if i == app.state.selected_index {
            row.style(p.selection)
        } else if running {
            row.style(Style::default().add_modifier(Modifier::DIM))
        } else {
            row
        }
    });

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(35),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Min(16),
        ],
    )
    .header(
        Row::new(vec!["Test", "State", "Last", "Finished"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().title(" Tests ").borders(Borders::ALL));
    frame.render_widget(table, chunks[0]);

    let category = app.selected_category();
    let definition = category.definition();
    let mut lines = vec![
        Line::from(Span::styled(
            definition.name,
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(definition.description),
        Line::from(""),
    ];
    lines.extend(
        definition
            .sub_checks
            .iter()
            .map(|check| Line::from(format!("  • {check}"))),
    );
    if let Some(latest) = app.reconciler.latest_result_for(category.test_type())
        && let Some(error) = latest.terminal_error()
    {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Last run failed: {error}"),
            Style::default().fg(p.failed).add_modifier(Modifier::BOLD),
        )));
    }
    let hint = if app.reconciler.category_running(category) {
        "Running; launch disabled"
    } else {
        "Enter: launch with current config"
    };
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(hint, Style::default().fg(p.dim))));

    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(" Details ").borders(Borders::ALL));
    frame.render_widget(detail, chunks[1]);
}

fn render_history(frame: &mut Frame, area: Rect, app: &App, p: &Palette) {
    let history = app.history();
    let expanded = app
        .state
        .expanded
        .as_ref()
        .and_then(|id| history.iter().find(|r| &r.id == id).copied());

    let (list_area, payload_area) = if expanded.is_some() {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);
        (chunks[0], Some(chunks[1]))
    } else {
        (area, None)
    };

    if history.is_empty() {
        let empty = Paragraph::new("No results yet")
            .alignment(Alignment::Center)
            .block(Block::default().title(" History ").borders(Borders::ALL));
        frame.render_widget(empty, list_area);
        return;
    }

    let rows = history.iter().enumerate().map(|(i, result)| {
        let mut detail = result.id.to_string();
        if let Some(error) = result.terminal_error() {
            detail = format!("{detail}  {error}");
        }
        let row = Row::new(vec![
            Cell::from(format_time(result)),
            Cell::from(result.test_type.clone()),
            Cell::from(result.status.label())
                .style(Style::default().fg(status_color(&result.status, p))),
            Cell::from(format_duration(result)),
            Cell::from(detail),
        ]);
        if i == app.state.selected_index {
            row.style(p.selection)
        } else {
            row
        }
    });
    let title = match app.reconciler.results().fetched_at() {
        Some(at) => format!(
            " History (updated {}) ",
            at.with_timezone(&chrono::Local).format("%H:%M:%S")
        ),
        None => " History ".to_string(),
    };
    let table = Table::new(
        rows,
        [
            Constraint::Length(19),
            Constraint::Length(18),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["Started", "Type", "Status", "Took", "Run / error"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(table, list_area);

    if let (Some(result), Some(area)) = (expanded, payload_area) {
        let body = serde_json::to_string_pretty(&result.result_payload)
            .unwrap_or_else(|err| format!("unprintable payload: {err}"));
        let payload = Paragraph::new(body)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(format!(" {} ", result.id))
                    .borders(Borders::ALL),
            );
        frame.render_widget(payload, area);
    }
}

fn render_config(frame: &mut Frame, area: Rect, app: &App, p: &Palette) {
    let mut lines = Vec::new();
    for (i, field) in ConfigField::ALL.iter().enumerate() {
        let editing = app
            .state
            .editing
            .as_ref()
            .filter(|(f, _)| f == field)
            .map(|(_, buffer)| buffer.as_str());
        let value = match editing {
            Some(buffer) => format!("{buffer}▏"),
            None => app.state.form.field(*field).to_string(),
        };
        let label_style = if i == app.state.selected_index {
            p.selection
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };
        lines.push(Line::from(Span::styled(field.label(), label_style)));
        let value_style = if editing.is_some() {
            Style::default().fg(p.accent)
        } else {
            Style::default()
        };
        let shown = if value.is_empty() { "(empty)" } else { value.as_str() };
        lines.push(Line::from(Span::styled(format!("  {shown}"), value_style)));
        lines.push(Line::from(""));
    }
    if let Err(err) = app.state.form.to_test_config() {
        lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(p.failed),
        )));
    }
    let hint = if app.state.is_input_mode() {
        "Enter: save   Esc: cancel"
    } else {
        "Enter: edit field"
    };
    lines.push(Line::from(Span::styled(hint, Style::default().fg(p.dim))));

    let form = Paragraph::new(lines)
        .block(Block::default().title(" Test configuration ").borders(Borders::ALL));
    frame.render_widget(form, area);
}

fn render_status_line(frame: &mut Frame, area: Rect, app: &App, p: &Palette) {
    let line = match app.state.latest_notice() {
        Some(notice) => {
            let color = match notice.level {
                NoticeLevel::Info => p.accent,
                NoticeLevel::Warn => p.running,
                NoticeLevel::Error => p.failed,
            };
            Line::from(vec![
                Span::styled(
                    format!(
                        " {} ",
                        notice.at.with_timezone(&chrono::Local).format("%H:%M:%S")
                    ),
                    Style::default().fg(p.dim),
                ),
                Span::styled(notice.message.clone(), Style::default().fg(color)),
            ])
        }
        None => Line::from(Span::styled(
            " Tab: panels  j/k: move  Enter: select  r: refresh  c: reconnect  ?: help  q: quit",
            Style::default().fg(p.dim),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_help_popup(frame: &mut Frame) {
    let area = centered_rect(60, 60, frame.area());
    let lines = vec![
        Line::from("Tab / Shift-Tab   switch panel"),
        Line::from("j / k, arrows     move selection"),
        Line::from("Enter             launch / expand / edit"),
        Line::from("r                 refresh results"),
        Line::from("c                 reconnect live channel"),
        Line::from("?                 toggle this help"),
        Line::from("q / Esc           quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().title(" Help ").borders(Borders::ALL)),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
