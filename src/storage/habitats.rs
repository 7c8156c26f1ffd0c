use anyhow::Result;

use super::schema::Database;
use super::types::Habitat;

impl Database {
    /// Create a habitat and return its id.
    ///
    /// Habitat names are unique; inserting an existing name returns the
    /// existing row's id.
    pub async fn create_habitat(&self, name: &str, color: Option<&str>) -> Result<i64> {
        let inserted = sqlx::query("INSERT OR IGNORE INTO habitats (name, color) VALUES (?, ?)")
            .bind(name)
            .bind(color)
            .execute(&self.pool)
            .await?;

        if inserted.rows_affected() > 0 {
            tracing::info!(name = %name, "Habitat created");
            return Ok(inserted.last_insert_rowid());
        }

        let (id,): (i64,) = sqlx::query_as("SELECT id FROM habitats WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn get_habitat(&self, habitat_id: i64) -> Result<Option<Habitat>> {
        let habitat = sqlx::query_as::<_, Habitat>("SELECT id, name, color FROM habitats WHERE id = ?")
            .bind(habitat_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(habitat)
    }

    pub async fn habitat_exists(&self, habitat_id: i64) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM habitats WHERE id = ?")
            .bind(habitat_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn list_habitats(&self) -> Result<Vec<Habitat>> {
        let habitats =
            sqlx::query_as::<_, Habitat>("SELECT id, name, color FROM habitats ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(habitats)
    }
}
