use anyhow::Result;

use super::schema::Database;
use super::types::Species;

impl Database {
    pub async fn create_species(&self, name: &str, sound: &str) -> Result<Species> {
        let id = sqlx::query("INSERT INTO species (name, sound) VALUES (?, ?)")
            .bind(name)
            .bind(sound)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(Species {
            id,
            name: name.to_string(),
            sound: sound.to_string(),
        })
    }

    /// Species ordered by id ascending, starting after `last_id` when given.
    ///
    /// Same cursor contract as the post feed, in the opposite direction:
    /// the last id of one page is the cursor for the next.
    pub async fn list_species(&self, last_id: Option<i64>, limit: i64) -> Result<Vec<Species>> {
        let species = match last_id {
            None => {
                sqlx::query_as::<_, Species>(
                    "SELECT id, name, sound FROM species ORDER BY id ASC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            Some(last_id) => {
                sqlx::query_as::<_, Species>(
                    "SELECT id, name, sound FROM species WHERE id > ? ORDER BY id ASC LIMIT ?",
                )
                .bind(last_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(species)
    }
}
