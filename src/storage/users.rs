use anyhow::Result;

use super::schema::Database;
use super::types::{
    timestamp, CreateUserError, HabitatRef, NewUser, User, UserInfo, UserInputError,
};
use crate::util::validate_image_url;

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl NewUser {
    /// A user picks exactly one of: an existing species, or a custom
    /// name and/or sound.
    pub fn validate(&self) -> Result<(), UserInputError> {
        if self.username.trim().is_empty() {
            return Err(UserInputError::EmptyUsername);
        }
        if self.nickname.trim().is_empty() {
            return Err(UserInputError::EmptyNickname);
        }

        let custom = non_blank(&self.name) || non_blank(&self.sound);
        match (custom, self.species_id.is_some()) {
            (true, true) => Err(UserInputError::SpeciesAndCustom),
            (false, false) => Err(UserInputError::NoSpecies),
            _ => Ok(()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserInfoRow {
    id: i64,
    username: String,
    nickname: String,
    habitat_id: i64,
    habitat_name: String,
    species_name: Option<String>,
    avatar_url: Option<String>,
}

impl Database {
    /// Register a user.
    ///
    /// Validation, the duplicate-username check and the inserts run in one
    /// transaction; a concurrent insert of the same username still maps to
    /// [`CreateUserError::UsernameTaken`] via the unique constraint.
    pub async fn create_user(&self, user: &NewUser) -> Result<User, CreateUserError> {
        user.validate()?;

        if let Some(avatar) = &user.avatar_url {
            validate_image_url(avatar)
                .map_err(|e| CreateUserError::InvalidAvatar(e.to_string()))?;
        }

        let mut tx = self.pool.begin().await?;

        let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(&user.username)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(CreateUserError::UsernameTaken(user.username.clone()));
        }

        let habitat: Option<(i64,)> = sqlx::query_as("SELECT id FROM habitats WHERE id = ?")
            .bind(user.habitat_id)
            .fetch_optional(&mut *tx)
            .await?;
        if habitat.is_none() {
            return Err(CreateUserError::UnknownHabitat(user.habitat_id));
        }

        if let Some(species_id) = user.species_id {
            let species: Option<(i64,)> = sqlx::query_as("SELECT id FROM species WHERE id = ?")
                .bind(species_id)
                .fetch_optional(&mut *tx)
                .await?;
            if species.is_none() {
                return Err(CreateUserError::UnknownSpecies(species_id));
            }
        }

        let content_id = match &user.avatar_url {
            Some(url) => Some(
                sqlx::query("INSERT INTO contents (url) VALUES (?)")
                    .bind(url)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid(),
            ),
            None => None,
        };

        let now = chrono::Utc::now().timestamp();
        let name = user.name.clone().filter(|v| !v.trim().is_empty());
        let sound = user.sound.clone().filter(|v| !v.trim().is_empty());

        let id = sqlx::query(
            r#"
            INSERT INTO users
                (username, nickname, habitat_id, species_id, custom_name, custom_sound, content_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&user.username)
        .bind(&user.nickname)
        .bind(user.habitat_id)
        .bind(user.species_id)
        .bind(&name)
        .bind(&sound)
        .bind(content_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                CreateUserError::UsernameTaken(user.username.clone())
            } else {
                CreateUserError::Database(e)
            }
        })?
        .last_insert_rowid();

        tx.commit().await?;
        tracing::info!(user_id = id, username = %user.username, "User created");

        Ok(User {
            id,
            username: user.username.clone(),
            nickname: user.nickname.clone(),
            habitat_id: user.habitat_id,
            species_id: user.species_id,
            name,
            sound,
            avatar_url: user.avatar_url.clone(),
            created_at: timestamp(now),
        })
    }

    /// Profile summary. The species is the catalog name when one was picked,
    /// otherwise the user's custom name.
    pub async fn get_user_info(&self, user_id: i64) -> Result<Option<UserInfo>> {
        let row = sqlx::query_as::<_, UserInfoRow>(
            r#"
            SELECT u.id, u.username, u.nickname,
                   h.id AS habitat_id, h.name AS habitat_name,
                   COALESCE(s.name, u.custom_name) AS species_name,
                   c.url AS avatar_url
            FROM users u
            JOIN habitats h ON h.id = u.habitat_id
            LEFT JOIN species s ON s.id = u.species_id
            LEFT JOIN contents c ON c.id = u.content_id
            WHERE u.id = ?
        "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserInfo {
            id: r.id,
            username: r.username,
            nickname: r.nickname,
            habitat: HabitatRef {
                id: r.habitat_id,
                name: r.habitat_name,
            },
            species: r.species_name,
            avatar_url: r.avatar_url,
        }))
    }

    pub async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
