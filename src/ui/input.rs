//! Keyboard input handling.

use crate::app::{App, AppEvent};
use crossterm::event::{KeyCode, KeyModifiers};
use tokio::sync::mpsc;

use super::events::reveal_images;
use super::helpers::{maybe_fetch, spawn_detail_load, spawn_heart_toggle, spawn_page_fetch};
use super::Action;

/// Route a key press to the detail overlay or the feed.
pub(super) fn handle_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Action {
    if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    if app.detail.is_some() {
        return handle_detail_input(app, code, event_tx);
    }
    handle_feed_input(app, code, event_tx)
}

fn handle_detail_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    match code {
        KeyCode::Esc | KeyCode::Backspace => {
            app.close_detail();
        }
        KeyCode::Char('h') => {
            if let Some(post_id) = app.detail.as_ref().map(|d| d.post_id) {
                spawn_heart_toggle(app, post_id, event_tx);
            }
        }
        KeyCode::Char('q') => return Action::Quit,
        _ => {}
    }
    Action::Continue
}

fn handle_feed_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    let page = app.session.window().viewport().max(1) as isize;
    let request = match code {
        KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
        KeyCode::Char('j') | KeyCode::Down => app.session.scroll_by(1),
        KeyCode::Char('k') | KeyCode::Up => app.session.scroll_by(-1),
        KeyCode::Char('J') => app.session.scroll_items(1),
        KeyCode::Char('K') => app.session.scroll_items(-1),
        KeyCode::PageDown | KeyCode::Char(' ') => app.session.scroll_by(page),
        KeyCode::PageUp => app.session.scroll_by(-page),
        KeyCode::Char('g') | KeyCode::Home => app.session.scroll_to(0),
        KeyCode::Char('G') | KeyCode::End => app.session.scroll_to_end(),
        KeyCode::Char('r') => retry(app),
        KeyCode::Enter => {
            if let Some(post_id) = app.open_detail() {
                spawn_detail_load(app, post_id, event_tx);
            }
            None
        }
        KeyCode::Char('h') => {
            if let Some(post_id) = app.session.focused().map(|item| item.id) {
                spawn_heart_toggle(app, post_id, event_tx);
            }
            None
        }
        KeyCode::Char(']') => switch_habitat(app, 1),
        KeyCode::Char('[') => switch_habitat(app, -1),
        _ => return Action::Continue,
    };

    reveal_images(app);
    maybe_fetch(app, request, event_tx);
    Action::Continue
}

/// Re-run the trigger after a failure without scrolling.
fn retry(app: &mut App) -> Option<habitat::feed::PageRequest> {
    let request = app.session.poll();
    if request.is_none() && !app.is_loading() {
        app.set_status("Nothing to fetch here");
    }
    request
}

fn switch_habitat(app: &mut App, step: isize) -> Option<habitat::feed::PageRequest> {
    let Some(habitat_id) = app.neighbor_habitat(step) else {
        app.set_status("No other habitats");
        return None;
    };
    app.close_detail();
    let request = app.session.switch_habitat(habitat_id);
    tracing::info!(habitat_id, "Switched habitat");
    let label = app.habitat_label().into_owned();
    app.set_status(label);
    request
}

/// Fetch the first page for the session's habitat. Called once at startup.
pub(super) fn start(app: &mut App, event_tx: &mpsc::Sender<AppEvent>) {
    if let Some(request) = app.session.poll() {
        spawn_page_fetch(app, request, event_tx);
    }
}
