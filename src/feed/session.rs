use std::ops::Range;

use super::lazy::LazyImages;
use super::window::ScrollWindow;
use crate::storage::{FeedItem, HeartState};

/// Layout and trigger tuning for a [`FeedSession`], in terminal rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub item_height: usize,
    pub fetch_margin: usize,
    pub image_margin: usize,
    pub overscan: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            item_height: 12,
            fetch_margin: 24,
            image_margin: 12,
            overscan: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching,
    /// An empty page came back. Terminal until the habitat changes.
    Exhausted,
}

/// A page the session wants fetched. The caller performs the request and
/// hands the result back to [`FeedSession::apply_page`] with `generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub habitat_id: i64,
    pub cursor: Option<i64>,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Items were appended; carries the number added.
    Appended(usize),
    Exhausted,
    /// The result belonged to an earlier habitat and was dropped.
    Stale,
    /// The fetch failed; the session is Idle again and the next scroll
    /// near the bottom retries.
    Failed,
}

/// Client-side state of one habitat feed.
///
/// Holds the loaded items, the cursor, the fetch state machine, the scroll
/// window and lazy image tracking. All transitions are synchronous; network
/// I/O happens outside and is correlated by `generation`.
#[derive(Debug, Clone)]
pub struct FeedSession {
    habitat_id: i64,
    items: Vec<FeedItem>,
    cursor: Option<i64>,
    state: FetchState,
    generation: u64,
    window: ScrollWindow,
    images: LazyImages,
    config: SessionConfig,
}

impl FeedSession {
    pub fn new(habitat_id: i64, viewport: usize, config: SessionConfig) -> Self {
        Self {
            habitat_id,
            items: Vec::new(),
            cursor: None,
            state: FetchState::Idle,
            generation: 0,
            window: ScrollWindow::new(config.item_height, viewport, config.overscan),
            images: LazyImages::new(config.image_margin),
            config,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn habitat_id(&self) -> i64 {
        self.habitat_id
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn window(&self) -> &ScrollWindow {
        &self.window
    }

    pub fn images(&self) -> &LazyImages {
        &self.images
    }

    /// Range of `items()` to render this frame.
    pub fn visible_range(&self) -> Range<usize> {
        self.window.visible_range()
    }

    /// Look up a loaded item by id (detail view). No network involved.
    pub fn item(&self, id: i64) -> Option<&FeedItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn focused(&self) -> Option<&FeedItem> {
        self.window.focused_index().and_then(|i| self.items.get(i))
    }

    // ========================================================================
    // Scrolling and the fetch trigger
    // ========================================================================

    /// Issue a request if the viewport is near the end of loaded content and
    /// nothing is in flight. Used for the very first page as well.
    pub fn poll(&mut self) -> Option<PageRequest> {
        if self.state != FetchState::Idle || !self.window.near_bottom(self.config.fetch_margin) {
            return None;
        }
        self.state = FetchState::Fetching;
        Some(PageRequest {
            habitat_id: self.habitat_id,
            cursor: self.cursor,
            generation: self.generation,
        })
    }

    pub fn scroll_to(&mut self, offset: usize) -> Option<PageRequest> {
        self.window.scroll_to(offset);
        self.poll()
    }

    pub fn scroll_by(&mut self, delta: isize) -> Option<PageRequest> {
        self.window.scroll_by(delta);
        self.poll()
    }

    pub fn scroll_items(&mut self, items: isize) -> Option<PageRequest> {
        let rows = items.saturating_mul(self.window.item_height() as isize);
        self.scroll_by(rows)
    }

    pub fn scroll_to_end(&mut self) -> Option<PageRequest> {
        let end = self.window.max_offset();
        self.scroll_to(end)
    }

    pub fn resize(&mut self, viewport: usize) -> Option<PageRequest> {
        self.window.set_viewport(viewport);
        self.poll()
    }

    /// Switch to another habitat: clear everything, bump the generation so
    /// in-flight results are recognized as stale, and request its first page.
    pub fn switch_habitat(&mut self, habitat_id: i64) -> Option<PageRequest> {
        self.habitat_id = habitat_id;
        self.items.clear();
        self.cursor = None;
        self.state = FetchState::Idle;
        self.generation = self.generation.wrapping_add(1);
        self.window.set_len(0);
        self.window.scroll_to(0);
        self.images.clear();
        tracing::debug!(habitat_id, generation = self.generation, "Feed session reset");
        self.poll()
    }

    // ========================================================================
    // Page results
    // ========================================================================

    pub fn apply_page<E: std::fmt::Display>(
        &mut self,
        generation: u64,
        result: Result<Vec<FeedItem>, E>,
    ) -> PageOutcome {
        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                "Discarding stale feed page"
            );
            return PageOutcome::Stale;
        }
        if self.state != FetchState::Fetching {
            return PageOutcome::Stale;
        }

        let mut page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(habitat_id = self.habitat_id, error = %e, "Feed page failed");
                self.state = FetchState::Idle;
                return PageOutcome::Failed;
            }
        };

        // Keep the list strictly descending even if the server misbehaves.
        if let Some(cursor) = self.cursor {
            page.retain(|item| item.id < cursor);
        }
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.dedup_by_key(|item| item.id);

        let Some(last) = page.last() else {
            self.state = FetchState::Exhausted;
            return PageOutcome::Exhausted;
        };

        self.cursor = Some(last.id);
        let added = page.len();
        self.items.append(&mut page);
        self.window.set_len(self.items.len());
        self.state = FetchState::Idle;
        PageOutcome::Appended(added)
    }

    /// Items whose images should switch from placeholder to real source.
    pub fn reveal_images(&mut self) -> Vec<i64> {
        self.images.reveal(&self.window, &self.items, |item| item.id)
    }

    // ========================================================================
    // Optimistic hearts
    // ========================================================================

    /// Flip the heart locally. Returns the state before the flip so a failed
    /// request can restore it.
    pub fn toggle_heart(&mut self, id: i64) -> Option<HeartState> {
        let item = self.items.iter_mut().find(|item| item.id == id)?;
        let previous = HeartState {
            is_heart: item.is_heart,
            heart_count: item.heart_count,
        };
        item.is_heart = !item.is_heart;
        item.heart_count = if item.is_heart {
            item.heart_count + 1
        } else {
            (item.heart_count - 1).max(0)
        };
        Some(previous)
    }

    /// Overwrite the heart state of an item (server confirmation or revert).
    pub fn set_heart(&mut self, id: i64, state: HeartState) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
            item.is_heart = state.is_heart;
            item.heart_count = state.heart_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn item(id: i64) -> FeedItem {
        FeedItem {
            id,
            author_id: 1,
            author_name: "Hare".to_string(),
            image_urls: vec![format!("https://cdn.example.com/{id}.png")],
            body: format!("post {id}"),
            created_at: Utc::now(),
            heart_count: 2,
            comment_count: 0,
            is_heart: false,
            avatar_url: None,
        }
    }

    fn page(ids: Range<i64>) -> Result<Vec<FeedItem>, String> {
        Ok(ids.rev().map(item).collect())
    }

    fn config() -> SessionConfig {
        SessionConfig {
            item_height: 10,
            fetch_margin: 20,
            image_margin: 0,
            overscan: 0,
        }
    }

    #[test]
    fn test_first_page_requested_on_poll() {
        let mut session = FeedSession::new(3, 40, config());
        let request = session.poll().unwrap();
        assert_eq!(
            request,
            PageRequest {
                habitat_id: 3,
                cursor: None,
                generation: 0
            }
        );
        assert_eq!(session.state(), FetchState::Fetching);
    }

    #[test]
    fn test_triggers_suppressed_while_fetching() {
        let mut session = FeedSession::new(3, 40, config());
        assert!(session.poll().is_some());
        assert!(session.poll().is_none());
        assert!(session.scroll_by(5).is_none());
    }

    #[test]
    fn test_append_advances_cursor() {
        let mut session = FeedSession::new(3, 40, config());
        let request = session.poll().unwrap();

        let outcome = session.apply_page(request.generation, page(41..51));
        assert_eq!(outcome, PageOutcome::Appended(10));
        assert_eq!(session.cursor(), Some(41));
        assert_eq!(session.state(), FetchState::Idle);
        assert_eq!(session.window().content_height(), 100);

        // Offset 0 + viewport 40 + margin 20 < 100: no fetch yet.
        assert!(session.poll().is_none());

        let request = session.scroll_to(45).unwrap();
        assert_eq!(request.cursor, Some(41));
    }

    #[test]
    fn test_exhaustion_is_sticky() {
        let mut session = FeedSession::new(3, 40, config());
        let request = session.poll().unwrap();
        assert_eq!(
            session.apply_page(request.generation, page(1..1)),
            PageOutcome::Exhausted
        );
        assert_eq!(session.state(), FetchState::Exhausted);
        assert!(session.poll().is_none());
        assert!(session.scroll_by(100).is_none());
    }

    #[test]
    fn test_failure_returns_to_idle() {
        let mut session = FeedSession::new(3, 40, config());
        let request = session.poll().unwrap();
        let failed: Result<Vec<FeedItem>, String> = Err("connection refused".to_string());
        assert_eq!(
            session.apply_page(request.generation, failed),
            PageOutcome::Failed
        );
        assert_eq!(session.state(), FetchState::Idle);
        assert_eq!(session.poll().unwrap().cursor, None);
    }

    #[test]
    fn test_habitat_switch_discards_in_flight_page() {
        let mut session = FeedSession::new(3, 40, config());
        let old = session.poll().unwrap();

        let new = session.switch_habitat(4).unwrap();
        assert_eq!(new.habitat_id, 4);
        assert_ne!(new.generation, old.generation);

        assert_eq!(
            session.apply_page(old.generation, page(1..11)),
            PageOutcome::Stale
        );
        assert!(session.items().is_empty());
        assert_eq!(session.state(), FetchState::Fetching);

        assert_eq!(
            session.apply_page(new.generation, page(20..25)),
            PageOutcome::Appended(5)
        );
    }

    #[test]
    fn test_switch_clears_exhaustion() {
        let mut session = FeedSession::new(3, 40, config());
        let request = session.poll().unwrap();
        session.apply_page(request.generation, page(1..1));
        assert_eq!(session.state(), FetchState::Exhausted);

        assert!(session.switch_habitat(5).is_some());
        assert_eq!(session.state(), FetchState::Fetching);
    }

    #[test]
    fn test_overlapping_page_is_filtered() {
        let mut session = FeedSession::new(3, 40, config());
        let request = session.poll().unwrap();
        session.apply_page(request.generation, page(41..51));
        let request = session.scroll_to_end().unwrap();

        // 45..50 overlap the loaded page and are dropped.
        assert_eq!(
            session.apply_page(request.generation, page(35..46)),
            PageOutcome::Appended(6)
        );
        let ids: Vec<i64> = session.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, (35..51).rev().collect::<Vec<i64>>());
    }

    #[test]
    fn test_detail_lookup_and_hearts() {
        let mut session = FeedSession::new(3, 40, config());
        let request = session.poll().unwrap();
        session.apply_page(request.generation, page(1..4));

        assert_eq!(session.item(2).map(|i| i.body.as_str()), Some("post 2"));
        assert!(session.item(9).is_none());

        let before = session.toggle_heart(2).unwrap();
        assert_eq!(before.heart_count, 2);
        let toggled = session.item(2).unwrap();
        assert!(toggled.is_heart);
        assert_eq!(toggled.heart_count, 3);

        session.set_heart(2, before);
        let reverted = session.item(2).unwrap();
        assert!(!reverted.is_heart);
        assert_eq!(reverted.heart_count, 2);

        assert!(session.toggle_heart(99).is_none());
    }

    #[test]
    fn test_reveal_images_follow_scroll() {
        let mut session = FeedSession::new(3, 20, config());
        let request = session.poll().unwrap();
        session.apply_page(request.generation, page(1..11));

        assert_eq!(session.reveal_images(), vec![10, 9]);
        session.scroll_to(30);
        assert_eq!(session.reveal_images(), vec![7, 6]);
        assert!(session.images().is_loaded(10));
    }
}
