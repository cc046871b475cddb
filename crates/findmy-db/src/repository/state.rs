//! # Secure State Repository
//!
//! `secure_state` table backend for [`SecureStateStore`].
//!
//! ## Table
//! ```text
//! key (PK) | value | updated_at (RFC 3339)
//! ─────────┼───────┼──────────────────────
//! device_id│ dev123│ 2024-05-01T10:00:00Z
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::store::SecureStateStore;

/// SQLite-backed state store.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a new SqliteStateStore.
    pub fn new(pool: SqlitePool) -> Self {
        SqliteStateStore { pool }
    }

    /// Removes every row. Used by factory reset in tests and tooling.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM secure_state")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SecureStateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM secure_state WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO secure_state (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM secure_state WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        debug!(key = %key, removed = result.rows_affected(), "State key removed");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::store::{DeviceState, StateKey};

    #[tokio::test]
    async fn test_upsert_and_remove() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.state_store();

        assert_eq!(store.get("device_id").await.unwrap(), None);

        store.put("device_id", "dev123").await.unwrap();
        store.put("device_id", "dev456").await.unwrap();
        assert_eq!(
            store.get("device_id").await.unwrap().as_deref(),
            Some("dev456")
        );

        store.remove("device_id").await.unwrap();
        assert!(!store.contains("device_id").await.unwrap());

        store.put("a", "1").await.unwrap();
        store.put("b", "2").await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            let state = DeviceState::new(db.state_store());
            state.commit_poll_since_id(42).await.unwrap();
            state
                .put_string(StateKey::LastSimSerial, "8901260000000000001")
                .await
                .unwrap();
            db.close().await;
        }

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let state = DeviceState::new(db.state_store());
        assert_eq!(state.poll_since_id().await.unwrap(), 42);
        assert_eq!(
            state.last_sim_serial().await.unwrap().as_deref(),
            Some("8901260000000000001")
        );
    }
}
