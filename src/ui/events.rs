//! Background task event processing.

use crate::app::{App, AppEvent};
use habitat::feed::PageOutcome;
use tokio::sync::mpsc;

use super::helpers::maybe_fetch;

/// Apply a background task result to the application state.
pub(super) fn handle_app_event(app: &mut App, event: AppEvent, event_tx: &mpsc::Sender<AppEvent>) {
    match event {
        AppEvent::PageLoaded { generation, result } => {
            let error = result.as_ref().err().map(|e| e.to_string());
            match app.session.apply_page(generation, result) {
                PageOutcome::Appended(count) => {
                    tracing::debug!(
                        habitat_id = app.session.habitat_id(),
                        count,
                        total = app.session.items().len(),
                        "Feed page appended"
                    );
                    app.page_handle = None;
                    reveal_images(app);
                    // A short page may still leave the viewport unfilled.
                    let request = app.session.poll();
                    maybe_fetch(app, request, event_tx);
                }
                PageOutcome::Exhausted => {
                    app.page_handle = None;
                    if app.session.items().is_empty() {
                        let message = format!("No posts in {} yet", app.habitat_label());
                        app.set_status(message);
                    }
                }
                PageOutcome::Failed => {
                    app.page_handle = None;
                    let message = error.unwrap_or_default();
                    app.set_status(format!("Feed failed: {message} (scroll to retry)"));
                }
                PageOutcome::Stale => {}
            }
        }
        AppEvent::HabitatsLoaded(Ok(habitats)) => {
            tracing::debug!(count = habitats.len(), "Habitats loaded");
            app.habitats = habitats;
        }
        AppEvent::HabitatsLoaded(Err(e)) => {
            tracing::warn!(error = %e, "Failed to load habitats");
            app.set_status(format!("Could not load habitats: {e}"));
        }
        AppEvent::DetailLoaded { post_id, result } => {
            app.detail_handle = None;
            app.apply_detail(post_id, result);
        }
        AppEvent::HeartToggled { post_id, state } => {
            app.finish_heart(post_id, state);
        }
        AppEvent::HeartToggleFailed {
            post_id,
            previous,
            error,
        } => {
            app.revert_heart(post_id, previous);
            app.set_status(format!("Heart failed: {error}"));
        }
        AppEvent::TaskPanicked { task, error } => {
            tracing::error!(task, error, "Background task panicked");
            app.set_status(format!("Internal error in {task} task"));
        }
    }
    app.needs_redraw = true;
}

/// Switch newly visible cards from placeholders to their image URLs.
pub(super) fn reveal_images(app: &mut App) {
    let revealed = app.session.reveal_images();
    if !revealed.is_empty() {
        tracing::trace!(posts = ?revealed, "Images revealed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use habitat::client::{ApiClient, FetchError};
    use habitat::feed::{FeedSession, FetchState, SessionConfig};
    use habitat::storage::{FeedItem, HeartState};
    use pretty_assertions::assert_eq;

    fn item(id: i64) -> FeedItem {
        FeedItem {
            id,
            author_id: 4,
            author_name: "Heron".to_string(),
            image_urls: vec![format!("https://img.example.com/{id}.jpg")],
            body: "fish".to_string(),
            created_at: Utc::now(),
            heart_count: 0,
            comment_count: 1,
            is_heart: false,
            avatar_url: None,
        }
    }

    fn page(range: std::ops::RangeInclusive<i64>) -> Vec<FeedItem> {
        range.rev().map(item).collect()
    }

    fn test_app() -> (App, mpsc::Sender<AppEvent>, mpsc::Receiver<AppEvent>) {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let session = FeedSession::new(1, 24, SessionConfig::default());
        let (tx, rx) = mpsc::channel(8);
        (App::new(client, session, None), tx, rx)
    }

    #[tokio::test]
    async fn stale_page_after_habitat_switch_is_ignored() {
        let (mut app, tx, _rx) = test_app();
        let first = app.session.poll().unwrap();
        app.session.switch_habitat(2);

        handle_app_event(
            &mut app,
            AppEvent::PageLoaded {
                generation: first.generation,
                result: Ok(page(1..=5)),
            },
            &tx,
        );
        assert!(app.session.items().is_empty());
        assert_eq!(app.session.habitat_id(), 2);
    }

    #[tokio::test]
    async fn failed_page_returns_to_idle_with_status() {
        let (mut app, tx, _rx) = test_app();
        let request = app.session.poll().unwrap();

        handle_app_event(
            &mut app,
            AppEvent::PageLoaded {
                generation: request.generation,
                result: Err(FetchError::Timeout),
            },
            &tx,
        );
        assert_eq!(app.session.state(), FetchState::Idle);
        let (message, _) = app.status_message.as_ref().unwrap();
        assert!(message.starts_with("Feed failed"));
    }

    async fn page_panics() -> Result<Vec<FeedItem>, FetchError> {
        panic!("page task exploded")
    }

    #[tokio::test]
    async fn panicked_page_task_releases_fetching_state() {
        let (mut app, tx, _rx) = test_app();
        let request = app.session.poll().unwrap();
        assert_eq!(app.session.state(), FetchState::Fetching);

        let result = crate::ui::helpers::guard_page(page_panics()).await;
        handle_app_event(
            &mut app,
            AppEvent::PageLoaded {
                generation: request.generation,
                result,
            },
            &tx,
        );
        assert_eq!(app.session.state(), FetchState::Idle);
        // The next trigger issues a fresh request.
        assert!(app.session.poll().is_some());
        let (message, _) = app.status_message.as_ref().unwrap();
        assert!(message.contains("panicked"));
    }

    #[tokio::test]
    async fn appended_page_reveals_images_in_view() {
        let (mut app, tx, _rx) = test_app();
        let request = app.session.poll().unwrap();

        handle_app_event(
            &mut app,
            AppEvent::PageLoaded {
                generation: request.generation,
                result: Ok(page(1..=20)),
            },
            &tx,
        );
        assert_eq!(app.session.items().len(), 20);
        assert!(app.session.images().is_loaded(20));
        assert!(!app.session.images().is_loaded(1));
    }

    #[tokio::test]
    async fn empty_first_page_reports_empty_habitat() {
        let (mut app, tx, _rx) = test_app();
        let request = app.session.poll().unwrap();

        handle_app_event(
            &mut app,
            AppEvent::PageLoaded {
                generation: request.generation,
                result: Ok(Vec::new()),
            },
            &tx,
        );
        assert_eq!(app.session.state(), FetchState::Exhausted);
        let (message, _) = app.status_message.as_ref().unwrap();
        assert_eq!(&**message, "No posts in habitat 1 yet");
    }

    #[tokio::test]
    async fn heart_failure_restores_previous_state() {
        let (mut app, tx, _rx) = test_app();
        let request = app.session.poll().unwrap();
        app.session.apply_page::<FetchError>(request.generation, Ok(page(1..=3)));

        let previous = app.begin_heart(3).unwrap();
        handle_app_event(
            &mut app,
            AppEvent::HeartToggleFailed {
                post_id: 3,
                previous,
                error: "401".to_string(),
            },
            &tx,
        );
        let item = app.session.item(3).unwrap();
        assert_eq!(
            HeartState { is_heart: item.is_heart, heart_count: item.heart_count },
            previous
        );
    }
}
