use async_trait::async_trait;
use dix_types::{InsertOutcome, Intent, IntentStatus, StoreError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::store::{invalid_transition, IntentStore, IntentTransition, IntentUpdate};

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct SqliteIntentStore {
    pool: SqlitePool,
}

impl SqliteIntentStore {
    /// Wrap an open pool and create the intent tables if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for migration in [
            include_str!("../migrations/001_create_intents.sql"),
            include_str!("../migrations/002_create_intent_transitions.sql"),
            include_str!("../migrations/003_index_intents_created_at.sql"),
        ] {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }

        Ok(())
    }

    fn row_to_intent(row: &SqliteRow) -> Result<Intent, StoreError> {
        let status: String = row.get("status");
        let amount: String = row.get("amount");

        Ok(Intent {
            id: row.get("id"),
            from: row.get("from_addr"),
            to: row.get("to_addr"),
            to_resolved: row.get("to_resolved"),
            amount: amount
                .parse()
                .map_err(|e| StoreError::SerializationError(format!("amount {amount}: {e}")))?,
            token: row.get("token"),
            settlement_ref: row.get("settlement_ref"),
            created_at: row.get::<i64, _>("created_at") as u64,
            status: status.parse()?,
        })
    }

    async fn current_status(&self, id: &str) -> Result<IntentStatus, StoreError> {
        let row = sqlx::query("SELECT status FROM intents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        Ok(row.get::<String, _>("status").parse()?)
    }
}

#[async_trait]
impl IntentStore for SqliteIntentStore {
    async fn insert_if_absent(&self, intent: &Intent) -> Result<InsertOutcome<Intent>, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO intents (
                id, from_addr, to_addr, to_resolved, amount, token,
                settlement_ref, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&intent.id)
        .bind(&intent.from)
        .bind(&intent.to)
        .bind(&intent.to_resolved)
        .bind(intent.amount.to_string())
        .bind(&intent.token)
        .bind(&intent.settlement_ref)
        .bind(intent.status.as_str())
        .bind(intent.created_at as i64)
        .bind(intent.created_at as i64)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        let existing = self
            .get(&intent.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(intent.id.clone()))?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn advance(&self, id: &str, update: IntentUpdate) -> Result<Intent, StoreError> {
        let from = self.current_status(id).await?;
        if !from.can_transition_to(update.status) {
            return Err(invalid_transition(id, from, update.status));
        }

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Compare-and-set on the status read above
        let result = sqlx::query(
            r#"
            UPDATE intents
            SET status = ?,
                to_resolved = COALESCE(?, to_resolved),
                settlement_ref = COALESCE(?, settlement_ref),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.to_resolved)
        .bind(&update.settlement_ref)
        .bind(update.at as i64)
        .bind(id)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            drop(tx);
            let now = self.current_status(id).await?;
            return Err(invalid_transition(id, now, update.status));
        }

        sqlx::query(
            r#"
            INSERT INTO intent_transitions (intent_id, from_status, to_status, at, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(update.status.as_str())
        .bind(update.at as i64)
        .bind(&update.details)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get(&self, id: &str) -> Result<Option<Intent>, StoreError> {
        let row = sqlx::query("SELECT * FROM intents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_intent).transpose()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Intent>, StoreError> {
        let rows = sqlx::query("SELECT * FROM intents ORDER BY created_at DESC, rowid DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(Self::row_to_intent).collect()
    }

    async fn list_unsettled(&self, created_before: u64) -> Result<Vec<Intent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM intents
            WHERE status IN ('pending', 'sent') AND created_at < ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(created_before as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(Self::row_to_intent).collect()
    }

    async fn history(&self, id: &str) -> Result<Vec<IntentTransition>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM intent_transitions WHERE intent_id = ? ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter()
            .map(|row| {
                Ok(IntentTransition {
                    intent_id: row.get("intent_id"),
                    from: row.get::<String, _>("from_status").parse()?,
                    to: row.get::<String, _>("to_status").parse()?,
                    at: row.get::<i64, _>("at") as u64,
                    details: row.get("details"),
                })
            })
            .collect()
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteIntentStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteIntentStore::from_pool(pool).await.unwrap()
    }

    fn intent(to: &str, amount: u64, created_at: u64) -> Intent {
        Intent::new("payer", to, amount, "usdc", created_at)
    }

    #[tokio::test]
    async fn test_sqlite_insert_if_absent() {
        let store = store().await;
        let intent = intent("alice", 100, 1_000);

        assert!(store.insert_if_absent(&intent).await.unwrap().is_inserted());
        assert_eq!(
            store.insert_if_absent(&intent).await.unwrap(),
            InsertOutcome::Existing(intent.clone())
        );
        assert_eq!(store.get(&intent.id).await.unwrap(), Some(intent));
    }

    #[tokio::test]
    async fn test_sqlite_full_amount_range() {
        let store = store().await;
        let intent = intent("alice", u64::MAX, 1_000);
        store.insert_if_absent(&intent).await.unwrap();

        assert_eq!(
            store.get(&intent.id).await.unwrap().unwrap().amount,
            u64::MAX
        );
    }

    #[tokio::test]
    async fn test_sqlite_advance_and_history() {
        let store = store().await;
        let intent = intent("alice", 100, 1_000);
        store.insert_if_absent(&intent).await.unwrap();

        store
            .advance(
                &intent.id,
                IntentUpdate::new(IntentStatus::Sent, 1_001)
                    .with_resolved("addr")
                    .with_settlement_ref("sig-1"),
            )
            .await
            .unwrap();
        let failed = store
            .advance(
                &intent.id,
                IntentUpdate::new(IntentStatus::Fail, 1_031).with_details("timeout"),
            )
            .await
            .unwrap();

        // fields learned earlier survive a later update that omits them
        assert_eq!(failed.to_resolved.as_deref(), Some("addr"));
        assert_eq!(failed.settlement_ref.as_deref(), Some("sig-1"));

        let history = store.history(&intent.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].from, IntentStatus::Sent);
        assert_eq!(history[1].details.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_sqlite_rejects_regression() {
        let store = store().await;
        let intent = intent("alice", 100, 1_000);
        store.insert_if_absent(&intent).await.unwrap();
        store
            .advance(&intent.id, IntentUpdate::new(IntentStatus::Fail, 1_001))
            .await
            .unwrap();

        let err = store
            .advance(&intent.id, IntentUpdate::new(IntentStatus::Done, 1_002))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let err = store
            .advance("missing", IntentUpdate::new(IntentStatus::Sent, 1_002))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sqlite_listing() {
        let store = store().await;
        let old = intent("alice", 100, 1_000);
        let new = intent("bob", 100, 2_000);
        store.insert_if_absent(&old).await.unwrap();
        store.insert_if_absent(&new).await.unwrap();
        store
            .advance(&new.id, IntentUpdate::new(IntentStatus::Sent, 2_001))
            .await
            .unwrap();

        let recent = store.list_recent(10).await.unwrap();
        assert_eq!(recent[0].id, new.id);
        assert_eq!(recent[1].id, old.id);
        assert_eq!(store.list_recent(1).await.unwrap().len(), 1);

        let unsettled = store.list_unsettled(2_500).await.unwrap();
        assert_eq!(unsettled.len(), 2);
        assert_eq!(unsettled[0].id, old.id);
        assert_eq!(store.list_unsettled(1_500).await.unwrap().len(), 1);
    }
}
