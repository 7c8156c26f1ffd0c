//! Background task spawning shared across the UI layer.
//!
//! Every network call runs in its own task and reports back through the
//! `AppEvent` channel. Panics inside a task are caught and surfaced as
//! `AppEvent::TaskPanicked` instead of silently killing the task.

use crate::app::{App, AppEvent};
use futures::FutureExt;
use habitat::client::FetchError;
use habitat::feed::PageRequest;
use habitat::storage::FeedItem;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Wraps a future to catch panics and convert them to errors.
///
/// Returns `Err(panic_message)` if the future panics.
pub(super) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            }
        })
}

/// Spawn `work` and send the event it produces. A panic is reported as
/// `TaskPanicked { task }`.
fn spawn_reporting<F>(task: &'static str, tx: mpsc::Sender<AppEvent>, work: F) -> JoinHandle<()>
where
    F: Future<Output = AppEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let event = match catch_task_panic(work).await {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(task, error = %error, "Background task panicked");
                AppEvent::TaskPanicked { task, error }
            }
        };
        if let Err(e) = tx.send(event).await {
            tracing::warn!(task, error = %e, "Channel send failed (receiver dropped)");
        }
    })
}

/// Fetch the page the session asked for.
///
/// The session guarantees at most one request in flight per generation, so a
/// previous handle only survives here across a habitat switch; it is aborted
/// since its result would be discarded as stale anyway.
pub(super) fn spawn_page_fetch(
    app: &mut App,
    request: PageRequest,
    event_tx: &mpsc::Sender<AppEvent>,
) {
    if let Some(handle) = app.page_handle.take() {
        handle.abort();
    }

    tracing::debug!(
        habitat_id = request.habitat_id,
        cursor = ?request.cursor,
        generation = request.generation,
        "Fetching feed page"
    );

    let client = app.client.clone();
    let limit = app.page_limit;
    app.page_handle = Some(spawn_reporting("page_fetch", event_tx.clone(), async move {
        let result = guard_page(client.fetch_page(request.habitat_id, request.cursor, limit)).await;
        AppEvent::PageLoaded {
            generation: request.generation,
            result,
        }
    }));
}

/// Run a page fetch, turning a panic into an error so the session still
/// receives a result for its generation and leaves Fetching.
pub(super) async fn guard_page<F>(fetch: F) -> Result<Vec<FeedItem>, FetchError>
where
    F: Future<Output = Result<Vec<FeedItem>, FetchError>>,
{
    match catch_task_panic(fetch).await {
        Ok(result) => result,
        Err(error) => {
            tracing::error!(task = "page_fetch", error = %error, "Background task panicked");
            Err(FetchError::Panicked(error))
        }
    }
}

/// Forward an optional request from a session transition.
pub(super) fn maybe_fetch(
    app: &mut App,
    request: Option<PageRequest>,
    event_tx: &mpsc::Sender<AppEvent>,
) {
    if let Some(request) = request {
        spawn_page_fetch(app, request, event_tx);
    }
}

pub(super) fn spawn_habitats_load(app: &App, event_tx: &mpsc::Sender<AppEvent>) {
    let client = app.client.clone();
    spawn_reporting("habitats_load", event_tx.clone(), async move {
        AppEvent::HabitatsLoaded(client.list_habitats().await)
    });
}

pub(super) fn spawn_detail_load(app: &mut App, post_id: i64, event_tx: &mpsc::Sender<AppEvent>) {
    if let Some(handle) = app.detail_handle.take() {
        handle.abort();
    }
    let client = app.client.clone();
    app.detail_handle = Some(spawn_reporting("detail_load", event_tx.clone(), async move {
        AppEvent::DetailLoaded {
            post_id,
            result: client.fetch_post(post_id).await,
        }
    }));
}

/// Optimistically flip the heart on `post_id` and send the request.
pub(super) fn spawn_heart_toggle(app: &mut App, post_id: i64, event_tx: &mpsc::Sender<AppEvent>) {
    if !app.client.has_token() {
        app.set_status("Hearts need a token (--token or api_token)");
        return;
    }
    let Some(previous) = app.begin_heart(post_id) else {
        return;
    };
    app.needs_redraw = true;

    let client = app.client.clone();
    spawn_reporting("heart_toggle", event_tx.clone(), async move {
        match client.toggle_heart(post_id).await {
            Ok(state) => AppEvent::HeartToggled { post_id, state },
            Err(e) => {
                tracing::error!(error = %e, post_id, "Failed to toggle heart");
                AppEvent::HeartToggleFailed {
                    post_id,
                    previous,
                    error: e.to_string(),
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catch_task_panic_passes_values_through() {
        assert_eq!(catch_task_panic(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn catch_task_panic_reports_message() {
        let result = catch_task_panic(async {
            panic!("habitat {} vanished", 3);
        })
        .await;
        assert_eq!(result, Err::<(), _>("habitat 3 vanished".to_string()));
    }

    async fn page_panics() -> Result<Vec<FeedItem>, FetchError> {
        panic!("decoder blew up")
    }

    #[tokio::test]
    async fn page_panic_becomes_fetch_error() {
        match guard_page(page_panics()).await {
            Err(FetchError::Panicked(message)) => assert_eq!(message, "decoder blew up"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    async fn explode() -> AppEvent {
        panic!("static message")
    }

    #[tokio::test]
    async fn panicking_task_becomes_event() {
        let (tx, mut rx) = mpsc::channel(1);
        spawn_reporting("boom", tx, explode());
        match rx.recv().await {
            Some(AppEvent::TaskPanicked { task, error }) => {
                assert_eq!(task, "boom");
                assert_eq!(error, "static message");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
