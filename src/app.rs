use habitat::client::{ApiClient, FetchError};
use habitat::feed::{FeedSession, FetchState};
use habitat::storage::{Comment, FeedItem, Habitat, HeartState, PostDetail};
use std::borrow::Cow;
use std::collections::HashSet;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Seconds a status message stays on screen.
const STATUS_TTL_SECS: u64 = 3;

// ============================================================================
// Events
// ============================================================================

/// Results reported back to the event loop by background tasks.
#[derive(Debug)]
pub enum AppEvent {
    /// A feed page finished. `generation` is the session generation at the
    /// time the request was issued.
    PageLoaded {
        generation: u64,
        result: Result<Vec<FeedItem>, FetchError>,
    },
    HabitatsLoaded(Result<Vec<Habitat>, FetchError>),
    /// Comments for the post shown in the detail overlay.
    DetailLoaded {
        post_id: i64,
        result: Result<PostDetail, FetchError>,
    },
    HeartToggled {
        post_id: i64,
        state: HeartState,
    },
    /// The server rejected the toggle; `previous` is restored.
    HeartToggleFailed {
        post_id: i64,
        previous: HeartState,
        error: String,
    },
    TaskPanicked {
        task: &'static str,
        error: String,
    },
}

// ============================================================================
// Detail Overlay
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Comments {
    Loading,
    Loaded(Vec<Comment>),
    Failed(String),
}

/// Post opened with Enter. The post itself is read from the session on
/// every frame so heart changes show through.
#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    pub post_id: i64,
    pub comments: Comments,
}

// ============================================================================
// Application State
// ============================================================================

pub struct App {
    pub client: ApiClient,
    pub session: FeedSession,
    /// Page size sent with each feed request; the server default when unset.
    pub page_limit: Option<i64>,
    pub habitats: Vec<Habitat>,
    pub detail: Option<Detail>,
    pub status_message: Option<(Cow<'static, str>, Instant)>,
    pub needs_redraw: bool,
    /// Posts whose heart request has not come back yet.
    pub hearts_in_flight: HashSet<i64>,
    pub spinner_frame: usize,
    pub page_handle: Option<JoinHandle<()>>,
    pub detail_handle: Option<JoinHandle<()>>,
}

impl App {
    pub fn new(client: ApiClient, session: FeedSession, page_limit: Option<i64>) -> Self {
        Self {
            client,
            session,
            page_limit,
            habitats: Vec::new(),
            detail: None,
            status_message: None,
            needs_redraw: true,
            hearts_in_flight: HashSet::new(),
            spinner_frame: 0,
            page_handle: None,
            detail_handle: None,
        }
    }

    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
    }

    /// Returns true if a message was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed().as_secs() >= STATUS_TTL_SECS {
                self.status_message = None;
                return true;
            }
        }
        false
    }

    pub fn is_loading(&self) -> bool {
        self.session.state() == FetchState::Fetching
    }

    pub fn current_habitat(&self) -> Option<&Habitat> {
        self.habitats
            .iter()
            .find(|h| h.id == self.session.habitat_id())
    }

    pub fn habitat_label(&self) -> Cow<'_, str> {
        match self.current_habitat() {
            Some(h) => Cow::Borrowed(h.name.as_str()),
            None => Cow::Owned(format!("habitat {}", self.session.habitat_id())),
        }
    }

    /// Id of the habitat `step` positions away in the loaded list, wrapping.
    /// `None` when the list is empty or only holds the current habitat.
    pub fn neighbor_habitat(&self, step: isize) -> Option<i64> {
        let len = self.habitats.len();
        if len < 2 {
            return None;
        }
        let current = self
            .habitats
            .iter()
            .position(|h| h.id == self.session.habitat_id())
            .unwrap_or(0);
        let next = (current as isize + step).rem_euclid(len as isize) as usize;
        let id = self.habitats[next].id;
        (id != self.session.habitat_id()).then_some(id)
    }

    // ========================================================================
    // Detail overlay
    // ========================================================================

    /// Open the focused post. Returns its id so the caller can fetch comments.
    pub fn open_detail(&mut self) -> Option<i64> {
        let post_id = self.session.focused()?.id;
        self.detail = Some(Detail {
            post_id,
            comments: Comments::Loading,
        });
        Some(post_id)
    }

    /// Close the overlay. The scroll window is left exactly as it was.
    pub fn close_detail(&mut self) -> bool {
        if let Some(handle) = self.detail_handle.take() {
            handle.abort();
        }
        self.detail.take().is_some()
    }

    pub fn detail_item(&self) -> Option<&FeedItem> {
        self.detail
            .as_ref()
            .and_then(|detail| self.session.item(detail.post_id))
    }

    pub fn apply_detail(&mut self, post_id: i64, result: Result<PostDetail, FetchError>) {
        let Some(detail) = self.detail.as_mut().filter(|d| d.post_id == post_id) else {
            tracing::debug!(post_id, "Discarding detail for closed overlay");
            return;
        };
        detail.comments = match result {
            Ok(post) => Comments::Loaded(post.comments),
            Err(e) => {
                tracing::warn!(post_id, error = %e, "Failed to load comments");
                Comments::Failed(e.to_string())
            }
        };
    }

    // ========================================================================
    // Hearts
    // ========================================================================

    /// Flip the heart on `post_id` locally. Returns the previous state, or
    /// `None` if the post is unknown or a request for it is still pending.
    pub fn begin_heart(&mut self, post_id: i64) -> Option<HeartState> {
        if self.hearts_in_flight.contains(&post_id) {
            return None;
        }
        let previous = self.session.toggle_heart(post_id)?;
        self.hearts_in_flight.insert(post_id);
        Some(previous)
    }

    pub fn finish_heart(&mut self, post_id: i64, state: HeartState) {
        self.hearts_in_flight.remove(&post_id);
        self.session.set_heart(post_id, state);
    }

    pub fn revert_heart(&mut self, post_id: i64, previous: HeartState) {
        self.hearts_in_flight.remove(&post_id);
        self.session.set_heart(post_id, previous);
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(handle) = self.page_handle.take() {
            handle.abort();
            tracing::debug!("Aborted page fetch on App drop");
        }
        if let Some(handle) = self.detail_handle.take() {
            handle.abort();
            tracing::debug!("Aborted detail fetch on App drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use habitat::feed::SessionConfig;
    use pretty_assertions::assert_eq;
    use tokio::time::{self, Duration};

    fn item(id: i64) -> FeedItem {
        FeedItem {
            id,
            author_id: 1,
            author_name: "Otter".to_string(),
            image_urls: Vec::new(),
            body: format!("post {id}"),
            created_at: Utc::now(),
            heart_count: 2,
            comment_count: 0,
            is_heart: false,
            avatar_url: None,
        }
    }

    fn habitat(id: i64, name: &str) -> Habitat {
        Habitat {
            id,
            name: name.to_string(),
            color: None,
        }
    }

    /// App over habitat 1 with posts 30..=21 loaded into a 24-row viewport.
    fn test_app() -> App {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let mut session = FeedSession::new(1, 24, SessionConfig::default());
        let request = session.poll().unwrap();
        session.apply_page::<FetchError>(request.generation, Ok((21..=30).rev().map(item).collect()));
        App::new(client, session, None)
    }

    #[tokio::test]
    async fn status_expires_after_three_seconds() {
        let mut app = test_app();
        time::pause();
        app.set_status("Hearted");

        time::advance(Duration::from_secs(2)).await;
        assert!(!app.clear_expired_status());
        assert!(app.status_message.is_some());

        time::advance(Duration::from_secs(2)).await;
        assert!(app.clear_expired_status());
        assert!(app.status_message.is_none());
    }

    #[tokio::test]
    async fn detail_reads_loaded_item_and_keeps_scroll() {
        let mut app = test_app();
        app.session.scroll_items(3);
        let offset = app.session.window().offset();

        let opened = app.open_detail().unwrap();
        assert_eq!(opened, 27);
        assert_eq!(app.detail_item().map(|i| i.id), Some(27));
        assert_eq!(app.detail.as_ref().unwrap().comments, Comments::Loading);

        assert!(app.close_detail());
        assert!(app.detail.is_none());
        assert_eq!(app.session.window().offset(), offset);
        assert!(!app.close_detail());
    }

    #[tokio::test]
    async fn late_detail_for_closed_overlay_is_dropped() {
        let mut app = test_app();
        let post_id = app.open_detail().unwrap();
        app.close_detail();

        let detail = PostDetail {
            item: item(post_id),
            comments: Vec::new(),
        };
        app.apply_detail(post_id, Ok(detail));
        assert!(app.detail.is_none());
    }

    #[tokio::test]
    async fn heart_is_optimistic_and_reverts_on_failure() {
        let mut app = test_app();
        let previous = app.begin_heart(30).unwrap();
        assert_eq!(previous, HeartState { is_heart: false, heart_count: 2 });

        let shown = app.session.item(30).unwrap();
        assert!(shown.is_heart);
        assert_eq!(shown.heart_count, 3);

        // A second press while the first is pending is ignored.
        assert!(app.begin_heart(30).is_none());

        app.revert_heart(30, previous);
        let shown = app.session.item(30).unwrap();
        assert!(!shown.is_heart);
        assert_eq!(shown.heart_count, 2);
        assert!(app.hearts_in_flight.is_empty());
    }

    #[tokio::test]
    async fn heart_takes_server_count_on_success() {
        let mut app = test_app();
        app.begin_heart(29).unwrap();
        app.finish_heart(29, HeartState { is_heart: true, heart_count: 7 });
        assert_eq!(app.session.item(29).unwrap().heart_count, 7);
        assert!(app.begin_heart(29).is_some());
    }

    #[tokio::test]
    async fn neighbor_habitat_wraps() {
        let mut app = test_app();
        assert_eq!(app.neighbor_habitat(1), None);

        app.habitats = vec![habitat(1, "Savanna"), habitat(2, "Reef"), habitat(3, "Tundra")];
        assert_eq!(app.neighbor_habitat(1), Some(2));
        assert_eq!(app.neighbor_habitat(-1), Some(3));
        assert_eq!(app.habitat_label(), "Savanna");
    }
}
