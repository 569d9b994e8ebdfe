//! Dedup ticket store backing the webhook acceptance gate
//!
//! A ticket claims an idempotency key for a window. `begin` is a single
//! atomic statement: the insert wins the key outright, and the conflict
//! branch only steals it when the previous ticket has expired. Whichever
//! caller gets a row back owns the key; everyone else is a duplicate.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{MetaDataErrorExt, MetaDataResult};
use crate::models::TicketStatus;

/// Store for idempotency tickets
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Try to claim a key for `window`. Returns the new ticket ID, or
    /// `None` when an unexpired ticket already holds the key.
    async fn begin(&self, idempotency_key: &str, window: Duration) -> MetaDataResult<Option<Uuid>>;

    /// Mark a ticket completed and keep suppressing the key for `retention`
    async fn complete(&self, ticket_id: Uuid, retention: Duration) -> MetaDataResult<()>;

    /// Remove expired tickets, returning the count deleted
    async fn sweep_expired(&self) -> MetaDataResult<u64>;
}

/// `PostgreSQL` implementation of the dedup store
#[derive(Clone)]
pub struct DbDedupStore {
    pool: PgPool,
}

impl DbDedupStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DedupStore for DbDedupStore {
    async fn begin(&self, idempotency_key: &str, window: Duration) -> MetaDataResult<Option<Uuid>> {
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(0));
        let ticket_id = Uuid::new_v4();

        let row = sqlx::query(
            r"
            INSERT INTO dedup_tickets (idempotency_key, ticket_id, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (idempotency_key) DO UPDATE
            SET ticket_id = EXCLUDED.ticket_id,
                status = EXCLUDED.status,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE dedup_tickets.expires_at <= $4
            RETURNING ticket_id
            ",
        )
        .bind(idempotency_key)
        .bind(ticket_id)
        .bind(TicketStatus::InFlight.to_string())
        .bind(now)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("dedup_begin")?;

        Ok(row.map(|r| r.try_get("ticket_id").unwrap_or(ticket_id)))
    }

    async fn complete(&self, ticket_id: Uuid, retention: Duration) -> MetaDataResult<()> {
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));

        sqlx::query(
            r"
            UPDATE dedup_tickets
            SET status = $1, expires_at = $2
            WHERE ticket_id = $3
            ",
        )
        .bind(TicketStatus::Completed.to_string())
        .bind(expires_at)
        .bind(ticket_id)
        .execute(&self.pool)
        .await
        .map_db_err("dedup_complete")?;

        Ok(())
    }

    async fn sweep_expired(&self) -> MetaDataResult<u64> {
        let result = sqlx::query("DELETE FROM dedup_tickets WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_db_err("dedup_sweep")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockDedupStore;

    #[tokio::test]
    async fn first_claim_wins_second_is_duplicate() {
        let store = MockDedupStore::new();
        let window = Duration::from_secs(600);

        let first = store.begin("push:team/app:main", window).await.unwrap();
        assert!(first.is_some());

        let second = store.begin("push:team/app:main", window).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let store = MockDedupStore::new();
        let window = Duration::from_secs(600);

        assert!(store.begin("push:a:main", window).await.unwrap().is_some());
        assert!(store.begin("push:b:main", window).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_ticket_can_be_reclaimed() {
        let store = MockDedupStore::new();

        let first = store
            .begin("push:team/app:main", Duration::from_secs(0))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .begin("push:team/app:main", Duration::from_secs(600))
            .await
            .unwrap();
        assert!(second.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn completion_keeps_suppressing_until_retention_elapses() {
        let store = MockDedupStore::new();
        let window = Duration::from_secs(600);

        let ticket = store
            .begin("push:team/app:main", window)
            .await
            .unwrap()
            .unwrap();
        store.complete(ticket, window).await.unwrap();

        let replay = store.begin("push:team/app:main", window).await.unwrap();
        assert!(replay.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_tickets() {
        let store = MockDedupStore::new();

        store
            .begin("stale", Duration::from_secs(0))
            .await
            .unwrap();
        store
            .begin("fresh", Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        // The fresh key is still held after the sweep.
        assert!(store
            .begin("fresh", Duration::from_secs(600))
            .await
            .unwrap()
            .is_none());
    }
}
