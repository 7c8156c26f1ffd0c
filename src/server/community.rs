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
use super::posts::FeedQuery;
use super::AppState;
use crate::feed::PageLimit;
use crate::storage::{FeedItem, Habitat, NewUser, Species, User, UserInfo};

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    pub username: String,
    pub nickname: String,
    pub habitat_id: i64,
    #[serde(rename = "speciesId")]
    pub species_id: Option<i64>,
    pub name: Option<String>,
    pub sound: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeciesQuery {
    #[serde(rename = "lastId")]
    pub last_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSpeciesBody {
    pub name: String,
    pub sound: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateHabitatBody {
    pub name: String,
    pub color: Option<String>,
}

// ============================================================================
// Users
// ============================================================================

/// `POST /users`
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let Json(body) = body?;
    let user = state
        .db
        .create_user(&NewUser {
            username: body.username,
            nickname: body.nickname,
            habitat_id: body.habitat_id,
            species_id: body.species_id,
            name: body.name,
            sound: body.sound,
            avatar_url: body.avatar_url,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/:id`
pub async fn get_user(
    State(state): State<AppState>,
    user: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<UserInfo>> {
    let Path(user_id) = user?;
    state
        .db
        .get_user_info(user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user {user_id} not found")))
}

/// `GET /users/:id/posts?lastPostId=&limit=`
pub async fn list_user_posts(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    user: Result<Path<i64>, PathRejection>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<FeedItem>>> {
    let Path(user_id) = user?;
    let Query(query) = query?;
    let limit = PageLimit::resolve(query.limit, state.limits)?;

    if !state.db.user_exists(user_id).await? {
        return Err(ApiError::NotFound(format!("user {user_id} not found")));
    }
    let items = state
        .db
        .posts_by_user(user_id, query.last_post_id, limit.get(), viewer)
        .await?;
    Ok(Json(items))
}

// ============================================================================
// Species
// ============================================================================

/// `GET /species?lastId=&limit=`
pub async fn list_species(
    State(state): State<AppState>,
    query: Result<Query<SpeciesQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Species>>> {
    let Query(query) = query?;
    let limit = PageLimit::resolve(query.limit, state.limits)?;
    let species = state.db.list_species(query.last_id, limit.get()).await?;
    Ok(Json(species))
}

/// `POST /species`
pub async fn create_species(
    State(state): State<AppState>,
    _caller: AuthUser,
    body: Result<Json<CreateSpeciesBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Species>)> {
    let Json(body) = body?;
    if body.name.trim().is_empty() || body.sound.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "species name and sound must not be empty".to_string(),
        ));
    }
    let species = state.db.create_species(&body.name, &body.sound).await?;
    Ok((StatusCode::CREATED, Json(species)))
}

// ============================================================================
// Habitats
// ============================================================================

/// `GET /habitats`
pub async fn list_habitats(State(state): State<AppState>) -> ApiResult<Json<Vec<Habitat>>> {
    Ok(Json(state.db.list_habitats().await?))
}

/// `GET /habitats/:id`
pub async fn get_habitat(
    State(state): State<AppState>,
    habitat: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Habitat>> {
    let Path(habitat_id) = habitat?;
    state
        .db
        .get_habitat(habitat_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("habitat {habitat_id} not found")))
}

/// `POST /habitats`. Creating an existing name returns that habitat.
pub async fn create_habitat(
    State(state): State<AppState>,
    _caller: AuthUser,
    body: Result<Json<CreateHabitatBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Habitat>)> {
    let Json(body) = body?;
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("habitat name must not be empty".to_string()));
    }
    let id = state
        .db
        .create_habitat(body.name.trim(), body.color.as_deref())
        .await?;
    let habitat = state
        .db
        .get_habitat(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("habitat {id} not found")))?;
    Ok((StatusCode::CREATED, Json(habitat)))
}
