use thiserror::Error;

use crate::storage::{Database, FeedItem};

/// Page-size policy shared by every paginated endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default: i64,
    pub max: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default: 10,
            max: 50,
        }
    }
}

/// A page size that has passed [`PageLimits`] policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimit(i64);

impl PageLimit {
    /// Absent → default; zero or negative → [`PaginationError::InvalidLimit`];
    /// above the maximum → clamped.
    pub fn resolve(requested: Option<i64>, limits: PageLimits) -> Result<Self, PaginationError> {
        match requested {
            None => Ok(Self(limits.default.clamp(1, limits.max.max(1)))),
            Some(n) if n <= 0 => Err(PaginationError::InvalidLimit(n)),
            Some(n) => Ok(Self(n.min(limits.max.max(1)))),
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("habitat {0} not found")]
    HabitatNotFound(i64),
    #[error("page size must be positive (got {0})")]
    InvalidLimit(i64),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Cursor paginator over a habitat's posts.
///
/// Pages are strictly descending by post id. The cursor of the next page is
/// the id of the last item of the previous one; an empty page means the
/// feed is exhausted. The cursor is only an ordering bound, so a cursor
/// naming a deleted post (or a post of another habitat) still yields every
/// older post of the requested habitat.
#[derive(Clone)]
pub struct Paginator {
    db: Database,
}

impl Paginator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn first_page(
        &self,
        habitat_id: i64,
        limit: PageLimit,
        viewer: Option<i64>,
    ) -> Result<Vec<FeedItem>, PaginationError> {
        self.ensure_habitat(habitat_id).await?;
        Ok(self.db.recent_posts(habitat_id, limit.get(), viewer).await?)
    }

    pub async fn page_after(
        &self,
        habitat_id: i64,
        cursor: i64,
        limit: PageLimit,
        viewer: Option<i64>,
    ) -> Result<Vec<FeedItem>, PaginationError> {
        self.ensure_habitat(habitat_id).await?;
        Ok(self
            .db
            .posts_before(habitat_id, cursor, limit.get(), viewer)
            .await?)
    }

    /// `first_page` without a cursor, `page_after` with one.
    pub async fn page(
        &self,
        habitat_id: i64,
        cursor: Option<i64>,
        limit: PageLimit,
        viewer: Option<i64>,
    ) -> Result<Vec<FeedItem>, PaginationError> {
        let items = match cursor {
            None => self.first_page(habitat_id, limit, viewer).await?,
            Some(cursor) => self.page_after(habitat_id, cursor, limit, viewer).await?,
        };
        tracing::debug!(habitat_id, ?cursor, limit = limit.get(), count = items.len(), "Feed page");
        Ok(items)
    }

    async fn ensure_habitat(&self, habitat_id: i64) -> Result<(), PaginationError> {
        if self.db.habitat_exists(habitat_id).await? {
            Ok(())
        } else {
            Err(PaginationError::HabitatNotFound(habitat_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewPost, NewUser};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_limit_resolution() {
        let limits = PageLimits::default();
        assert_eq!(PageLimit::resolve(None, limits).unwrap().get(), 10);
        assert_eq!(PageLimit::resolve(Some(7), limits).unwrap().get(), 7);
        assert_eq!(PageLimit::resolve(Some(500), limits).unwrap().get(), 50);
        assert!(matches!(
            PageLimit::resolve(Some(0), limits),
            Err(PaginationError::InvalidLimit(0))
        ));
        assert!(matches!(
            PageLimit::resolve(Some(-3), limits),
            Err(PaginationError::InvalidLimit(-3))
        ));
    }

    #[test]
    fn test_default_never_exceeds_max() {
        let limits = PageLimits { default: 80, max: 20 };
        assert_eq!(PageLimit::resolve(None, limits).unwrap().get(), 20);
    }

    async fn seeded(count: usize) -> (Paginator, i64, Vec<i64>) {
        let db = Database::open(":memory:").await.unwrap();
        let habitat = db.create_habitat("Meadow", None).await.unwrap();
        let user = db
            .create_user(&NewUser {
                username: "hare".to_string(),
                nickname: "Hare".to_string(),
                habitat_id: habitat,
                name: Some("Hare".to_string()),
                ..NewUser::default()
            })
            .await
            .unwrap();

        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let id = db
                .create_post(&NewPost {
                    user_id: user.id,
                    habitat_id: habitat,
                    body: format!("post {i}"),
                    image_urls: Vec::new(),
                })
                .await
                .unwrap();
            ids.push(id);
        }
        ids.reverse();
        (Paginator::new(db), habitat, ids)
    }

    fn ids(items: &[FeedItem]) -> Vec<i64> {
        items.iter().map(|i| i.id).collect()
    }

    #[tokio::test]
    async fn test_fifty_posts_walkthrough() {
        let (paginator, habitat, _) = seeded(50).await;
        let ten = PageLimit::resolve(Some(10), PageLimits::default()).unwrap();

        let first = paginator.first_page(habitat, ten, None).await.unwrap();
        assert_eq!(ids(&first), (41..=50).rev().collect::<Vec<i64>>());

        let second = paginator.page_after(habitat, 41, ten, None).await.unwrap();
        assert_eq!(ids(&second), (31..=40).rev().collect::<Vec<i64>>());

        let last = paginator.page_after(habitat, 1, ten, None).await.unwrap();
        assert!(last.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_habitat() {
        let (paginator, habitat, _) = seeded(1).await;
        let limit = PageLimit::resolve(None, PageLimits::default()).unwrap();

        assert!(matches!(
            paginator.first_page(habitat + 1, limit, None).await,
            Err(PaginationError::HabitatNotFound(_))
        ));
        assert!(matches!(
            paginator.page(habitat + 1, Some(10), limit, None).await,
            Err(PaginationError::HabitatNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_page_dispatches_on_cursor() {
        let (paginator, habitat, all) = seeded(5).await;
        let two = PageLimit::resolve(Some(2), PageLimits::default()).unwrap();

        let first = paginator.page(habitat, None, two, None).await.unwrap();
        assert_eq!(ids(&first), all[..2].to_vec());

        let next = paginator
            .page(habitat, Some(first[1].id), two, None)
            .await
            .unwrap();
        assert_eq!(ids(&next), all[2..4].to_vec());
    }

    #[tokio::test]
    async fn test_cursor_beyond_newest_returns_first_page() {
        let (paginator, habitat, all) = seeded(3).await;
        let limit = PageLimit::resolve(None, PageLimits::default()).unwrap();
        let items = paginator
            .page_after(habitat, i64::MAX, limit, None)
            .await
            .unwrap();
        assert_eq!(ids(&items), all);
    }
}
