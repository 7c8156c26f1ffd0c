//! Render dispatch: header, feed panel, status bar, detail overlay.

use crate::app::App;
use habitat::feed::FetchState;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::{cards, detail, status};

pub(super) const MIN_WIDTH: u16 = 30;
pub(super) const MIN_HEIGHT: u16 = 6;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
pub(super) const SPINNER_FRAMES: usize = SPINNER.len();

/// Height of the feed panel for a terminal of `height` rows (header and
/// status bar take one row each).
pub(super) fn feed_viewport(height: u16) -> usize {
    height.saturating_sub(2) as usize
}

pub(super) fn render(f: &mut Frame, app: &App) {
    let area = f.area();
    if area.width < 1 || area.height < 1 {
        return;
    }
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = if area.height < 3 || area.width < 20 {
            Paragraph::new("Too small")
        } else {
            Paragraph::new(format!(
                "Terminal too small\nMinimum: {MIN_WIDTH}x{MIN_HEIGHT}"
            ))
            .alignment(Alignment::Center)
        };
        f.render_widget(msg, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_feed(f, app, chunks[1]);
    status::render(f, app, chunks[2]);

    if app.detail.is_some() {
        detail::render(f, app);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let session = &app.session;
    let state = match session.state() {
        FetchState::Idle => String::new(),
        FetchState::Fetching => format!(" {} loading", SPINNER[app.spinner_frame % SPINNER_FRAMES]),
        FetchState::Exhausted => " · end of feed".to_string(),
    };
    let position = match session.window().focused_index() {
        Some(i) => format!("{}/{}", i + 1, session.items().len()),
        None => "0/0".to_string(),
    };

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", app.habitat_label()),
            Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {position}")),
        Span::styled(state, Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_feed(f: &mut Frame, app: &App, area: Rect) {
    if app.session.items().is_empty() {
        let msg = match app.session.state() {
            FetchState::Fetching => "Loading…",
            FetchState::Exhausted => "No posts yet",
            FetchState::Idle => "Press r to load",
        };
        f.render_widget(
            Paragraph::new(msg)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray)),
            area,
        );
        return;
    }
    cards::render(f, app, area);
}
