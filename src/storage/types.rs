use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The habitat database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// lock-style messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// Rejected user-creation input.
///
/// A user either picks an existing species or describes a custom one with a
/// name and/or sound. Supplying both, or neither, is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserInputError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("nickname must not be empty")]
    EmptyNickname,
    #[error("choose either an existing species or a custom name/sound, not both")]
    SpeciesAndCustom,
    #[error("either a species or a custom name/sound is required")]
    NoSpecies,
}

/// Errors from [`Database::create_user`](super::Database::create_user).
#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error(transparent)]
    Invalid(#[from] UserInputError),
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("habitat {0} does not exist")]
    UnknownHabitat(i64),
    #[error("species {0} does not exist")]
    UnknownSpecies(i64),
    #[error("invalid avatar url: {0}")]
    InvalidAvatar(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Rejected post or comment input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PostInputError {
    #[error("post body must not be empty")]
    EmptyBody,
    #[error("at most {max} images per post (got {got})")]
    TooManyImages { max: usize, got: usize },
    #[error("invalid image url '{url}': {reason}")]
    InvalidImageUrl { url: String, reason: String },
    #[error("comment must not be empty")]
    EmptyComment,
}

// ============================================================================
// Internal Row Types
// ============================================================================

/// Row shape shared by every feed query (see `posts::FEED_SELECT`).
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedItemRow {
    pub id: i64,
    pub user_id: i64,
    pub nickname: String,
    pub body: String,
    pub created_at: i64,
    pub heart_count: i64,
    pub comment_count: i64,
    pub is_heart: bool,
    pub avatar_url: Option<String>,
}

impl FeedItemRow {
    pub(crate) fn into_item(self, image_urls: Vec<String>) -> FeedItem {
        FeedItem {
            id: self.id,
            author_id: self.user_id,
            author_name: self.nickname,
            image_urls,
            body: self.body,
            created_at: timestamp(self.created_at),
            heart_count: self.heart_count,
            comment_count: self.comment_count,
            is_heart: self.is_heart,
            avatar_url: self.avatar_url,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub nickname: String,
    pub body: String,
    pub created_at: i64,
}

impl CommentRow {
    pub(crate) fn into_comment(self) -> Comment {
        Comment {
            id: self.id,
            post_id: self.post_id,
            user_id: self.user_id,
            nickname: self.nickname,
            content: self.body,
            created_at: timestamp(self.created_at),
        }
    }
}

pub(crate) fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ============================================================================
// Wire Records
// ============================================================================

/// One post as it appears in a habitat feed.
///
/// Field names on the wire follow the feed JSON consumed by existing clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(rename = "post_id")]
    pub id: i64,
    #[serde(rename = "user_id")]
    pub author_id: i64,
    #[serde(rename = "nickname")]
    pub author_name: String,
    #[serde(rename = "contents_url_array", default)]
    pub image_urls: Vec<String>,
    #[serde(rename = "human_content")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "numOfHearts")]
    pub heart_count: i64,
    #[serde(rename = "numOfComments")]
    pub comment_count: i64,
    pub is_heart: bool,
    #[serde(rename = "user_image_url")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub nickname: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Single-post view: the feed item plus its comments, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub item: FeedItem,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Habitat {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Species {
    pub id: i64,
    pub name: String,
    pub sound: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub habitat_id: i64,
    #[serde(rename = "speciesId")]
    pub species_id: Option<i64>,
    pub name: Option<String>,
    pub sound: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitatRef {
    pub id: i64,
    pub name: String,
}

/// Profile summary joined across habitat, species and avatar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub habitat: HabitatRef,
    pub species: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartState {
    pub is_heart: bool,
    #[serde(rename = "numOfHearts")]
    pub heart_count: i64,
}

// ============================================================================
// Write Inputs
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub habitat_id: i64,
    pub body: String,
    pub image_urls: Vec<String>,
}

/// Partial post update. `image_urls`, when present, replaces the whole list.
#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub body: Option<String>,
    pub image_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub user_id: i64,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub nickname: String,
    pub habitat_id: i64,
    pub species_id: Option<i64>,
    pub name: Option<String>,
    pub sound: Option<String>,
    pub avatar_url: Option<String>,
}

/// Outcome of an author-scoped mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The row existed, belonged to the caller, and was changed.
    Applied,
    /// No row with that id.
    Missing,
    /// The row belongs to someone else.
    Forbidden,
}
