//! Fixed-height post cards for the feed panel.
//!
//! Only the session's visible range is turned into widgets. Each card is
//! exactly `item_height` rows so its position follows from its index.

use crate::app::App;
use chrono::{DateTime, Utc};
use habitat::storage::FeedItem;
use habitat::util::{fit_width, sanitize, wrap_lines};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Image lines shown per card before collapsing into "+N more".
const MAX_IMAGE_LINES: usize = 2;

/// Relative age: minutes, hours, days, then a short date.
pub fn format_relative_time(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - created).num_seconds();
    if diff < 0 {
        return "now".to_string();
    }
    if diff < 3600 {
        return format!("{}m", diff / 60);
    }
    if diff < 86400 {
        return format!("{}h", diff / 3600);
    }
    if diff < 604800 {
        return format!("{}d", diff / 86400);
    }
    created.format("%b %d").to_string()
}

/// Build the rows of one card, exactly `height` long.
///
/// Layout: author line, wrapped body, image lines, counters, blank spacer.
/// Images stay placeholders until `images_loaded`.
pub fn card_lines(
    item: &FeedItem,
    width: usize,
    height: usize,
    images_loaded: bool,
    focused: bool,
    now: DateTime<Utc>,
) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::with_capacity(height);
    let marker = if focused { "▌ " } else { "  " };
    let inner = width.saturating_sub(2);

    let author = sanitize(&item.author_name);
    let age = format_relative_time(item.created_at, now);
    let author_width = inner.saturating_sub(age.len() + 3);
    let author_style = if focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };
    lines.push(Line::from(vec![
        Span::styled(marker, Style::default().fg(Color::Cyan)),
        Span::styled(fit_width(&author, author_width).into_owned(), author_style),
        Span::styled(format!(" · {age}"), Style::default().fg(Color::DarkGray)),
    ]));

    // Author line, counters and spacer are fixed; the rest is shared.
    let free = height.saturating_sub(3);
    let image_rows = image_rows(item.image_urls.len(), free.saturating_sub(1));
    let body_rows = free.saturating_sub(image_rows);

    let body = sanitize(&item.body);
    for text in wrap_lines(&body, inner, body_rows) {
        lines.push(Line::from(vec![Span::raw("  "), Span::raw(text)]));
    }
    while lines.len() < 1 + body_rows {
        lines.push(Line::default());
    }

    lines.extend(image_lines(&item.image_urls, inner, image_rows, images_loaded));

    let heart_style = if item.is_heart {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Gray)
    };
    let heart = if item.is_heart { "♥" } else { "♡" };
    lines.push(Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{heart} {}", item.heart_count), heart_style),
        Span::styled(
            format!("   {} comments", item.comment_count),
            Style::default().fg(Color::Gray),
        ),
    ]));

    lines.truncate(height.saturating_sub(1));
    while lines.len() < height {
        lines.push(Line::default());
    }
    lines
}

fn image_rows(count: usize, available: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let wanted = if count > MAX_IMAGE_LINES {
        MAX_IMAGE_LINES + 1
    } else {
        count
    };
    wanted.min(available)
}

fn image_lines(urls: &[String], width: usize, rows: usize, loaded: bool) -> Vec<Line<'static>> {
    if rows == 0 {
        return Vec::new();
    }
    let style = Style::default().fg(Color::DarkGray);
    let overflow = urls.len() > rows;
    let shown = if overflow { rows - 1 } else { rows };

    let mut lines: Vec<Line<'static>> = urls
        .iter()
        .take(shown)
        .map(|url| {
            let text = if loaded {
                format!("▣ {}", fit_width(&sanitize(url), width.saturating_sub(2)))
            } else {
                "▢ image".to_string()
            };
            Line::from(vec![Span::raw("  "), Span::styled(text, style)])
        })
        .collect();
    if overflow {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("+{} more", urls.len() - shown), style),
        ]));
    }
    lines
}

/// Draw the cards in `app.session.visible_range()` into `area`.
///
/// Cards partly above the viewport are clipped with a paragraph scroll;
/// cards past the bottom are clipped by the area height.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let session = &app.session;
    let window = session.window();
    let offset = window.offset();
    let height = window.item_height();
    let focused = window.focused_index();
    let now = Utc::now();

    for index in session.visible_range() {
        let Some(item) = session.items().get(index) else {
            continue;
        };
        let top = window.item_top(index) as isize - offset as isize;
        let bottom = top + height as isize;
        if bottom <= 0 || top >= area.height as isize {
            continue;
        }

        let skip = (-top).max(0) as u16;
        let y = area.y + top.max(0) as u16;
        let rows = (bottom.min(area.height as isize) - top.max(0)) as u16;
        let card_area = Rect::new(area.x, y, area.width, rows);

        let lines = card_lines(
            item,
            area.width as usize,
            height,
            session.images().is_loaded(item.id),
            focused == Some(index),
            now,
        );
        f.render_widget(Paragraph::new(lines).scroll((skip, 0)), card_area);
    }
}
