use anyhow::Result;

use super::schema::Database;
use super::types::{timestamp, Comment, NewComment, PostInputError};

impl NewComment {
    pub fn validate(&self) -> Result<(), PostInputError> {
        if self.body.trim().is_empty() {
            return Err(PostInputError::EmptyComment);
        }
        Ok(())
    }
}

impl Database {
    /// Add a comment to a post. `None` if the post does not exist.
    pub async fn create_comment(&self, comment: &NewComment) -> Result<Option<Comment>> {
        let mut tx = self.pool.begin().await?;

        let post: Option<(i64,)> = sqlx::query_as("SELECT id FROM posts WHERE id = ?")
            .bind(comment.post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if post.is_none() {
            return Ok(None);
        }

        let now = chrono::Utc::now().timestamp();
        let id = sqlx::query(
            "INSERT INTO comments (post_id, user_id, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(comment.post_id)
        .bind(comment.user_id)
        .bind(&comment.body)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let (nickname,): (String,) = sqlx::query_as("SELECT nickname FROM users WHERE id = ?")
            .bind(comment.user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(comment_id = id, post_id = comment.post_id, "Comment created");

        Ok(Some(Comment {
            id,
            post_id: comment.post_id,
            user_id: comment.user_id,
            nickname,
            content: comment.body.clone(),
            created_at: timestamp(now),
        }))
    }
}
