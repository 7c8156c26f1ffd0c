//! Post detail overlay.

use crate::app::{App, Comments};
use chrono::Utc;
use habitat::storage::{Comment, FeedItem};
use habitat::util::sanitize;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::cards::format_relative_time;

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let width = area.width * percent_x / 100;
    let height = area.height * percent_y / 100;
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

pub fn render(f: &mut Frame, app: &App) {
    let (Some(detail), Some(item)) = (app.detail.as_ref(), app.detail_item()) else {
        return;
    };
    let area = centered_rect(80, 80, f.area());
    if area.width < 4 || area.height < 3 {
        return;
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", sanitize(&item.author_name)))
        .title_bottom(" [h]eart [Esc]close ")
        .border_style(Style::default().fg(Color::Cyan));

    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(detail_lines(item, &detail.comments))
            .block(block)
            .wrap(Wrap { trim: false }),
        area,
    );
}

/// Full post text, every image URL, counters and the comment thread.
fn detail_lines(item: &FeedItem, comments: &Comments) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);
    let now = Utc::now();
    let mut lines: Vec<Line<'static>> = sanitize(&item.body)
        .lines()
        .map(|line| Line::from(line.to_string()))
        .collect();

    if !item.image_urls.is_empty() {
        lines.push(Line::default());
        for url in &item.image_urls {
            lines.push(Line::styled(format!("▣ {}", sanitize(url)), dim));
        }
    }

    lines.push(Line::default());
    let heart = if item.is_heart { "♥" } else { "♡" };
    lines.push(Line::from(vec![
        Span::styled(
            format!("{heart} {}", item.heart_count),
            Style::default().fg(Color::Red),
        ),
        Span::styled(
            format!("   posted {}", format_relative_time(item.created_at, now)),
            dim,
        ),
    ]));
    lines.push(Line::default());

    match comments {
        Comments::Loading => lines.push(Line::styled("Loading comments…", dim)),
        Comments::Failed(e) => lines.push(Line::styled(
            format!("Comments unavailable: {e}"),
            Style::default().fg(Color::Yellow),
        )),
        Comments::Loaded(list) if list.is_empty() => {
            lines.push(Line::styled("No comments yet", dim));
        }
        Comments::Loaded(list) => {
            lines.push(Line::styled(
                format!("Comments ({})", list.len()),
                Style::default().add_modifier(Modifier::BOLD),
            ));
            lines.extend(list.iter().map(|c| comment_line(c, now)));
        }
    }
    lines
}

fn comment_line(comment: &Comment, now: chrono::DateTime<Utc>) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            sanitize(&comment.nickname).into_owned(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" {} ", format_relative_time(comment.created_at, now)),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(sanitize(&comment.content).into_owned()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> FeedItem {
        FeedItem {
            id: 1,
            author_id: 1,
            author_name: "Owl".to_string(),
            image_urls: vec!["https://cdn.example.com/moon.png".to_string()],
            body: "hoot\nhoot again".to_string(),
            created_at: Utc::now(),
            heart_count: 1,
            comment_count: 1,
            is_heart: false,
            avatar_url: None,
        }
    }

    fn text(lines: &[Line<'_>]) -> String {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_detail_shows_full_body_and_urls() {
        let out = text(&detail_lines(&item(), &Comments::Loading));
        assert!(out.starts_with("hoot\nhoot again"));
        assert!(out.contains("https://cdn.example.com/moon.png"));
        assert!(out.contains("Loading comments"));
    }

    #[test]
    fn test_detail_lists_comments_in_order() {
        let comments = ["first", "second"]
            .iter()
            .enumerate()
            .map(|(i, content)| Comment {
                id: i as i64 + 1,
                post_id: 1,
                user_id: 2,
                nickname: "Mouse".to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            })
            .collect();
        let out = text(&detail_lines(&item(), &Comments::Loaded(comments)));
        let first = out.find("first").unwrap();
        let second = out.find("second").unwrap();
        assert!(out.contains("Comments (2)"));
        assert!(first < second);
    }
}
