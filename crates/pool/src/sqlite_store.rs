use async_trait::async_trait;
use dix_types::{InsertOutcome, Pool, PoolMember, PoolStatus, StoreError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::store::{invalid_round, round_predecessors, PoolStore};

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct SqlitePoolStore {
    pool: SqlitePool,
}

impl SqlitePoolStore {
    /// Wrap an open pool and create the pool tables if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(include_str!("../migrations/001_create_pools.sql"))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        sqlx::query(include_str!("../migrations/002_create_pool_members.sql"))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(())
    }

    fn row_to_pool(row: &SqliteRow) -> Result<Pool, StoreError> {
        let contribution: String = row.get("contribution");
        let members: String = row.get("members");
        let status: String = row.get("status");

        Ok(Pool {
            id: row.get("id"),
            name: row.get("name"),
            token: row.get("token"),
            contribution: contribution.parse().map_err(|e| {
                StoreError::SerializationError(format!("contribution {contribution}: {e}"))
            })?,
            members: serde_json::from_str(&members)
                .map_err(|e| StoreError::SerializationError(e.to_string()))?,
            round: row.get::<i64, _>("round") as u32,
            status: status.parse()?,
            created_at: row.get::<i64, _>("created_at") as u64,
        })
    }

    fn row_to_member(row: &SqliteRow) -> PoolMember {
        PoolMember {
            pool_id: row.get("pool_id"),
            username: row.get("username"),
            pubkey: row.get("pubkey"),
            paid: row.get::<i64, _>("paid") != 0,
            claimed: row.get::<i64, _>("claimed") != 0,
            order: row.get::<i64, _>("member_order") as u32,
        }
    }

    async fn insert_member(
        conn: &mut SqliteConnection,
        member: &PoolMember,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO pool_members (pool_id, username, pubkey, paid, claimed, member_order)
            VALUES (?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(&member.pool_id)
        .bind(&member.username)
        .bind(&member.pubkey)
        .bind(member.order as i64)
        .execute(conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                StoreError::DuplicateId(format!("{}/{}", member.pool_id, member.username)),
            ),
            Err(e) => Err(db_error(e)),
        }
    }
}

#[async_trait]
impl PoolStore for SqlitePoolStore {
    async fn create_pool(&self, pool: &Pool) -> Result<InsertOutcome<Pool>, StoreError> {
        let creator = pool
            .members
            .first()
            .ok_or_else(|| StoreError::SerializationError("pool has no creator".into()))?;
        let members = serde_json::to_string(&pool.members)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let result = sqlx::query(
            r#"
            INSERT INTO pools (id, name, token, contribution, members, round, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&pool.id)
        .bind(&pool.name)
        .bind(&pool.token)
        .bind(pool.contribution.to_string())
        .bind(&members)
        .bind(pool.round as i64)
        .bind(pool.status.as_str())
        .bind(pool.created_at as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            drop(tx);
            let existing = self
                .get_pool(&pool.id)
                .await?
                .ok_or_else(|| StoreError::NotFound(pool.id.clone()))?;
            return Ok(InsertOutcome::Existing(existing));
        }

        Self::insert_member(&mut *tx, &PoolMember::new(&pool.id, creator, None, 0)).await?;
        tx.commit().await.map_err(db_error)?;

        Ok(InsertOutcome::Inserted)
    }

    async fn get_pool(&self, id: &str) -> Result<Option<Pool>, StoreError> {
        let row = sqlx::query("SELECT * FROM pools WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_pool).transpose()
    }

    async fn list_pools(&self, limit: usize) -> Result<Vec<Pool>, StoreError> {
        let rows = sqlx::query("SELECT * FROM pools ORDER BY created_at DESC, rowid DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(Self::row_to_pool).collect()
    }

    async fn add_member(
        &self,
        pool_id: &str,
        username: &str,
        pubkey: Option<String>,
    ) -> Result<PoolMember, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Touch the pool row first: takes the write lock and checks it exists
        let touched = sqlx::query("UPDATE pools SET members = members WHERE id = ?")
            .bind(pool_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::NotFound(pool_id.to_string()));
        }

        // Next join order is computed inside the insert so concurrent joins
        // cannot share one
        let result = sqlx::query(
            r#"
            INSERT INTO pool_members (pool_id, username, pubkey, paid, claimed, member_order)
            SELECT ?, ?, ?, 0, 0, COUNT(*) FROM pool_members WHERE pool_id = ?
            "#,
        )
        .bind(pool_id)
        .bind(username)
        .bind(pubkey.as_deref().filter(|p| !p.is_empty()))
        .bind(pool_id)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(StoreError::DuplicateId(format!("{pool_id}/{username}")));
            }
            Err(e) => return Err(db_error(e)),
        }

        let names: Vec<String> = sqlx::query(
            "SELECT username FROM pool_members WHERE pool_id = ? ORDER BY member_order ASC",
        )
        .bind(pool_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?
        .iter()
        .map(|row| row.get("username"))
        .collect();
        let members = serde_json::to_string(&names)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        sqlx::query("UPDATE pools SET members = ? WHERE id = ?")
            .bind(&members)
            .bind(pool_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let row = sqlx::query("SELECT * FROM pool_members WHERE pool_id = ? AND username = ?")
            .bind(pool_id)
            .bind(username)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        let member = Self::row_to_member(&row);

        tx.commit().await.map_err(db_error)?;
        Ok(member)
    }

    async fn get_member(
        &self,
        pool_id: &str,
        username: &str,
    ) -> Result<Option<PoolMember>, StoreError> {
        let row = sqlx::query("SELECT * FROM pool_members WHERE pool_id = ? AND username = ?")
            .bind(pool_id)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.as_ref().map(Self::row_to_member))
    }

    async fn list_members(&self, pool_id: &str) -> Result<Vec<PoolMember>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM pool_members WHERE pool_id = ? ORDER BY member_order ASC")
                .bind(pool_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(rows.iter().map(Self::row_to_member).collect())
    }

    async fn mark_paid(
        &self,
        pool_id: &str,
        username: &str,
        round: u32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pool_members SET paid = 1
            WHERE pool_id = ? AND username = ? AND paid = 0
            AND EXISTS (
                SELECT 1 FROM pools WHERE id = ? AND round = ? AND status = 'active'
            )
            "#,
        )
        .bind(pool_id)
        .bind(username)
        .bind(pool_id)
        .bind(round as i64)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_claimed(&self, pool_id: &str, username: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE pool_members SET claimed = 1 WHERE pool_id = ? AND username = ?")
                .bind(pool_id)
                .bind(username)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{pool_id}/{username}")));
        }
        Ok(())
    }

    async fn save_round(
        &self,
        pool_id: &str,
        round: u32,
        status: PoolStatus,
        reset_paid: bool,
    ) -> Result<Pool, StoreError> {
        let predecessors = round_predecessors(status);
        let placeholders = vec!["?"; predecessors.len()].join(", ");
        let sql = format!(
            "UPDATE pools SET round = ?, status = ? WHERE id = ? AND status IN ({placeholders})"
        );

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut query = sqlx::query(&sql)
            .bind(round as i64)
            .bind(status.as_str())
            .bind(pool_id);
        for predecessor in predecessors {
            query = query.bind(predecessor.as_str());
        }
        let result = query.execute(&mut *tx).await.map_err(db_error)?;

        if result.rows_affected() == 0 {
            drop(tx);
            let current = self
                .get_pool(pool_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(pool_id.to_string()))?;
            return Err(invalid_round(&current, status));
        }

        if reset_paid {
            sqlx::query("UPDATE pool_members SET paid = 0 WHERE pool_id = ?")
                .bind(pool_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;

        self.get_pool(pool_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(pool_id.to_string()))
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
