use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::auth::{AuthUser, MaybeAuthUser};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::feed::PageLimit;
use crate::storage::{
    Comment, FeedItem, HeartState, NewComment, NewPost, Ownership, PostDetail, PostPatch,
};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(rename = "lastPostId")]
    pub last_post_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostBody {
    pub habitat_id: i64,
    pub human_content: String,
    #[serde(default)]
    pub contents_url_array: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostBody {
    pub human_content: Option<String>,
    pub contents_url_array: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentBody {
    pub post_id: i64,
    pub content: String,
}

fn post_not_found(post_id: i64) -> ApiError {
    ApiError::NotFound(format!("post {post_id} not found"))
}

/// `GET /posts/habitats/:habitat_id?lastPostId=&limit=`
pub async fn list_feed(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    habitat: Result<Path<i64>, PathRejection>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<FeedItem>>> {
    let Path(habitat_id) = habitat?;
    let Query(query) = query?;
    let limit = PageLimit::resolve(query.limit, state.limits)?;

    let items = state
        .paginator
        .page(habitat_id, query.last_post_id, limit, viewer)
        .await?;
    Ok(Json(items))
}

/// `GET /posts/:id`
pub async fn get_post(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    post: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<PostDetail>> {
    let Path(post_id) = post?;
    state
        .db
        .get_post_detail(post_id, viewer)
        .await?
        .map(Json)
        .ok_or_else(|| post_not_found(post_id))
}

/// `POST /posts`
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<CreatePostBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeedItem>)> {
    let Json(body) = body?;
    let post = NewPost {
        user_id,
        habitat_id: body.habitat_id,
        body: body.human_content,
        image_urls: body.contents_url_array,
    };
    post.validate(state.max_images)?;

    if !state.db.habitat_exists(post.habitat_id).await? {
        return Err(ApiError::NotFound(format!(
            "habitat {} not found",
            post.habitat_id
        )));
    }

    let post_id = state.db.create_post(&post).await?;
    let item = state
        .db
        .get_post(post_id, Some(user_id))
        .await?
        .ok_or_else(|| post_not_found(post_id))?;
    Ok((StatusCode::CREATED, Json(item)))
}

fn ownership(outcome: Ownership, post_id: i64) -> ApiResult<Json<bool>> {
    match outcome {
        Ownership::Applied => Ok(Json(true)),
        Ownership::Missing => Err(post_not_found(post_id)),
        Ownership::Forbidden => Err(ApiError::Forbidden("only the author may change this post")),
    }
}

/// `PATCH /posts/:id`
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    post: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdatePostBody>, JsonRejection>,
) -> ApiResult<Json<bool>> {
    let Path(post_id) = post?;
    let Json(body) = body?;
    let patch = PostPatch {
        body: body.human_content,
        image_urls: body.contents_url_array,
    };
    patch.validate(state.max_images)?;

    let outcome = state.db.update_post(post_id, user_id, &patch).await?;
    ownership(outcome, post_id)
}

/// `DELETE /posts/:id`
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    post: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<bool>> {
    let Path(post_id) = post?;
    let outcome = state.db.delete_post(post_id, user_id).await?;
    ownership(outcome, post_id)
}

/// `POST /posts/:id/hearts`
pub async fn toggle_heart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    post: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<HeartState>> {
    let Path(post_id) = post?;
    state
        .db
        .toggle_heart(post_id, user_id)
        .await?
        .map(Json)
        .ok_or_else(|| post_not_found(post_id))
}

/// `POST /comments`
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<CreateCommentBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let Json(body) = body?;
    let comment = NewComment {
        post_id: body.post_id,
        user_id,
        body: body.content,
    };
    comment.validate()?;

    let created = state
        .db
        .create_comment(&comment)
        .await?
        .ok_or_else(|| post_not_found(comment.post_id))?;
    Ok((StatusCode::CREATED, Json(created)))
}
