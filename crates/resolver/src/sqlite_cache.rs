use async_trait::async_trait;
use dix_types::{AliasEntry, StoreError};
use sqlx::{Row, SqlitePool};

use crate::cache::AliasCache;

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE ALIAS CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Alias cache on the shared SQLite pool
#[derive(Clone)]
pub struct SqliteAliasCache {
    pool: SqlitePool,
}

impl SqliteAliasCache {
    /// Wrap an open pool and create the `aliases` table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let cache = Self { pool };
        cache.run_migrations().await?;
        Ok(cache)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(include_str!("../migrations/001_create_aliases.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl AliasCache for SqliteAliasCache {
    async fn get(&self, username: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT owner FROM aliases WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        Ok(row.map(|r| r.get("owner")))
    }

    async fn put(&self, entry: &AliasEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO aliases (username, owner) VALUES (?, ?)
            ON CONFLICT(username) DO UPDATE SET owner = excluded.owner
            "#,
        )
        .bind(&entry.username)
        .bind(&entry.owner)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<AliasEntry>, StoreError> {
        let rows = sqlx::query("SELECT username, owner FROM aliases ORDER BY username ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| AliasEntry {
                username: row.get("username"),
                owner: row.get("owner"),
            })
            .collect())
    }
}
