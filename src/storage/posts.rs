use anyhow::Result;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;

use super::schema::Database;
use super::types::{
    CommentRow, FeedItem, FeedItemRow, HeartState, NewPost, Ownership, PostDetail, PostInputError,
    PostPatch,
};
use crate::util::validate_image_url;

// ============================================================================
// Query Constants
// ============================================================================

/// Hard cap on rows returned by any single feed query (OOM protection).
/// The paginator clamps well below this; the cap guards direct callers.
const MAX_FEED_ROWS: i64 = 1000;

/// Shared projection for feed queries. The single bind parameter is the
/// viewer id used for `is_heart` (NULL matches nothing).
const FEED_SELECT: &str = r#"
    SELECT p.id, p.user_id, u.nickname, p.body, p.created_at,
           (SELECT COUNT(*) FROM hearts h WHERE h.post_id = p.id) AS heart_count,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
           EXISTS(SELECT 1 FROM hearts h WHERE h.post_id = p.id AND h.user_id = ?) AS is_heart,
           avatar.url AS avatar_url
    FROM posts p
    JOIN users u ON u.id = p.user_id
    LEFT JOIN contents avatar ON avatar.id = u.content_id
"#;

// ============================================================================
// Input Validation
// ============================================================================

fn validate_images(urls: &[String], max_images: usize) -> Result<(), PostInputError> {
    if urls.len() > max_images {
        return Err(PostInputError::TooManyImages {
            max: max_images,
            got: urls.len(),
        });
    }
    for url in urls {
        validate_image_url(url).map_err(|e| PostInputError::InvalidImageUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

impl NewPost {
    /// Check body and image list before anything touches the database.
    pub fn validate(&self, max_images: usize) -> Result<(), PostInputError> {
        if self.body.trim().is_empty() {
            return Err(PostInputError::EmptyBody);
        }
        validate_images(&self.image_urls, max_images)
    }
}

impl PostPatch {
    pub fn validate(&self, max_images: usize) -> Result<(), PostInputError> {
        if let Some(body) = &self.body {
            if body.trim().is_empty() {
                return Err(PostInputError::EmptyBody);
            }
        }
        if let Some(urls) = &self.image_urls {
            validate_images(urls, max_images)?;
        }
        Ok(())
    }
}

impl Database {
    // ========================================================================
    // Feed Queries
    // ========================================================================

    /// The `limit` most recent posts of a habitat, newest first.
    pub async fn recent_posts(
        &self,
        habitat_id: i64,
        limit: i64,
        viewer: Option<i64>,
    ) -> Result<Vec<FeedItem>> {
        let limit = limit.clamp(0, MAX_FEED_ROWS);
        let sql = format!("{FEED_SELECT} WHERE p.habitat_id = ? ORDER BY p.id DESC LIMIT ?");
        let rows = sqlx::query_as::<_, FeedItemRow>(&sql)
            .bind(viewer)
            .bind(habitat_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        self.attach_images(rows).await
    }

    /// Up to `limit` posts of a habitat with `id < cursor`, newest first.
    ///
    /// The cursor is only an ordering bound; it does not need to name an
    /// existing post of this habitat.
    pub async fn posts_before(
        &self,
        habitat_id: i64,
        cursor: i64,
        limit: i64,
        viewer: Option<i64>,
    ) -> Result<Vec<FeedItem>> {
        let limit = limit.clamp(0, MAX_FEED_ROWS);
        let sql = format!(
            "{FEED_SELECT} WHERE p.habitat_id = ? AND p.id < ? ORDER BY p.id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, FeedItemRow>(&sql)
            .bind(viewer)
            .bind(habitat_id)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(habitat_id, cursor, limit, rows = rows.len(), "posts_before");
        self.attach_images(rows).await
    }

    /// Up to `limit` posts written by a user across all habitats, newest
    /// first, with `id < cursor` when a cursor is given.
    pub async fn posts_by_user(
        &self,
        user_id: i64,
        cursor: Option<i64>,
        limit: i64,
        viewer: Option<i64>,
    ) -> Result<Vec<FeedItem>> {
        let limit = limit.clamp(0, MAX_FEED_ROWS);
        let sql = format!(
            "{FEED_SELECT} WHERE p.user_id = ? AND (? IS NULL OR p.id < ?) ORDER BY p.id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, FeedItemRow>(&sql)
            .bind(viewer)
            .bind(user_id)
            .bind(cursor)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(user_id, ?cursor, limit, rows = rows.len(), "posts_by_user");
        self.attach_images(rows).await
    }

    /// Single feed item by id.
    pub async fn get_post(&self, post_id: i64, viewer: Option<i64>) -> Result<Option<FeedItem>> {
        let sql = format!("{FEED_SELECT} WHERE p.id = ?");
        let row = sqlx::query_as::<_, FeedItemRow>(&sql)
            .bind(viewer)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.attach_images(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Feed item plus its comments, oldest comment first.
    pub async fn get_post_detail(
        &self,
        post_id: i64,
        viewer: Option<i64>,
    ) -> Result<Option<PostDetail>> {
        let Some(item) = self.get_post(post_id, viewer).await? else {
            return Ok(None);
        };

        let comments = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT c.id, c.post_id, c.user_id, u.nickname, c.body, c.created_at
            FROM comments c
            JOIN users u ON u.id = c.user_id
            WHERE c.post_id = ?
            ORDER BY c.id ASC
        "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(PostDetail {
            item,
            comments: comments.into_iter().map(CommentRow::into_comment).collect(),
        }))
    }

    /// Load image URLs for a batch of feed rows in one query, preserving
    /// row order and per-post image position.
    async fn attach_images(&self, rows: Vec<FeedItemRow>) -> Result<Vec<FeedItem>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT pc.post_id, c.url
               FROM post_contents pc JOIN contents c ON c.id = pc.content_id
               WHERE pc.post_id IN ("#,
        );
        let mut separated = builder.separated(", ");
        for row in &rows {
            separated.push_bind(row.id);
        }
        separated.push_unseparated(") ORDER BY pc.post_id, pc.position");

        let images: Vec<(i64, String)> = builder.build_query_as().fetch_all(&self.pool).await?;

        let mut by_post: HashMap<i64, Vec<String>> = HashMap::with_capacity(rows.len());
        for (post_id, url) in images {
            by_post.entry(post_id).or_default().push(url);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let urls = by_post.remove(&row.id).unwrap_or_default();
                row.into_item(urls)
            })
            .collect())
    }

    // ========================================================================
    // Post Mutations
    // ========================================================================

    /// Insert a post and its image links atomically, returning the new id.
    ///
    /// Callers validate with [`NewPost::validate`] and check the habitat
    /// first; a missing habitat or user surfaces as a foreign-key error.
    pub async fn create_post(&self, post: &NewPost) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let post_id = sqlx::query(
            "INSERT INTO posts (user_id, habitat_id, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(post.user_id)
        .bind(post.habitat_id)
        .bind(&post.body)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        insert_images(&mut tx, post_id, &post.image_urls).await?;

        tx.commit().await?;
        tracing::info!(
            post_id,
            habitat_id = post.habitat_id,
            images = post.image_urls.len(),
            "Post created"
        );
        Ok(post_id)
    }

    /// Apply a patch if the caller authored the post.
    pub async fn update_post(
        &self,
        post_id: i64,
        user_id: i64,
        patch: &PostPatch,
    ) -> Result<Ownership> {
        let mut tx = self.pool.begin().await?;

        match post_owner(&mut tx, post_id).await? {
            None => return Ok(Ownership::Missing),
            Some(owner) if owner != user_id => return Ok(Ownership::Forbidden),
            Some(_) => {}
        }

        if let Some(body) = &patch.body {
            sqlx::query("UPDATE posts SET body = ? WHERE id = ?")
                .bind(body)
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(urls) = &patch.image_urls {
            drop_images(&mut tx, post_id).await?;
            insert_images(&mut tx, post_id, urls).await?;
        }

        tx.commit().await?;
        Ok(Ownership::Applied)
    }

    /// Delete a post (cascading comments, hearts and image links) if the
    /// caller authored it.
    pub async fn delete_post(&self, post_id: i64, user_id: i64) -> Result<Ownership> {
        let mut tx = self.pool.begin().await?;

        match post_owner(&mut tx, post_id).await? {
            None => return Ok(Ownership::Missing),
            Some(owner) if owner != user_id => return Ok(Ownership::Forbidden),
            Some(_) => {}
        }

        drop_images(&mut tx, post_id).await?;
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(post_id, user_id, "Post deleted");
        Ok(Ownership::Applied)
    }

    /// Flip the caller's heart on a post. `None` if the post does not exist.
    pub async fn toggle_heart(&self, post_id: i64, user_id: i64) -> Result<Option<HeartState>> {
        let mut tx = self.pool.begin().await?;

        if post_owner(&mut tx, post_id).await?.is_none() {
            return Ok(None);
        }

        let removed = sqlx::query("DELETE FROM hearts WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            sqlx::query("INSERT INTO hearts (post_id, user_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let (heart_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hearts WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(HeartState {
            is_heart: removed == 0,
            heart_count,
        }))
    }
}

async fn post_owner(conn: &mut SqliteConnection, post_id: i64) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|(owner,)| owner))
}

/// Delete a post's image rows. Every image gets its own `contents` row in
/// [`insert_images`], so nothing else points at them; the links go with
/// them through `ON DELETE CASCADE`.
async fn drop_images(conn: &mut SqliteConnection, post_id: i64) -> Result<()> {
    let removed = sqlx::query(
        "DELETE FROM contents WHERE id IN (SELECT content_id FROM post_contents WHERE post_id = ?)",
    )
    .bind(post_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    tracing::debug!(post_id, removed, "Post images dropped");
    Ok(())
}

async fn insert_images(conn: &mut SqliteConnection, post_id: i64, urls: &[String]) -> Result<()> {
    for (position, url) in urls.iter().enumerate() {
        let content_id = sqlx::query("INSERT INTO contents (url) VALUES (?)")
            .bind(url)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

        sqlx::query("INSERT INTO post_contents (post_id, content_id, position) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(content_id)
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
