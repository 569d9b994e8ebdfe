//! Webhook deduplication gate
//!
//! Webhook providers redeliver events at-least-once. The gate derives a
//! deterministic idempotency key from the event's identity fields and
//! claims it in the dedup store before any work starts; redeliveries of
//! the same event inside the window are rejected without side effects.

use repolens_meta_data::{DedupStore, hash_content};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::IngestionResult;

/// Kind of repository event delivered by the webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    MergeRequest,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Push => "push",
            Self::MergeRequest => "merge_request",
        };
        write!(f, "{kind}")
    }
}

/// Incoming webhook event, reduced to the fields that identify it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub kind: EventKind,
    /// Project identifier as reported by the provider
    pub project: String,
    /// Branch ref for pushes, merge request ID for MR events
    pub reference: String,
    /// Last-updated marker (head SHA or MR updated-at), so a genuinely new
    /// state of the same ref is not treated as a duplicate
    pub updated_marker: String,
    /// Clone URL of the repository; not part of the identity
    pub repository_locator: String,
}

impl WebhookEvent {
    /// Deterministic key over the identity fields only. Payload noise
    /// (ordering, extra fields) never changes the key.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        let identity = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.kind, self.project, self.reference, self.updated_marker
        );
        hash_content(&identity)
    }
}

/// Gate decision for one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// First delivery; the caller owns the ticket
    Accepted { ticket_id: Uuid },
    /// An unexpired ticket already holds this key
    Duplicate,
}

/// Deduplication gate in front of webhook intake
pub struct DedupGate {
    store: Arc<dyn DedupStore>,
    window: Duration,
}

impl DedupGate {
    pub fn new(store: Arc<dyn DedupStore>, window: Duration) -> Self {
        Self { store, window }
    }

    /// Claim the event's idempotency key.
    ///
    /// Store failures surface to the caller; a delivery is never treated
    /// as accepted when the gate cannot record it.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::Store` when the ticket store fails.
    pub async fn begin_processing(&self, event: &WebhookEvent) -> IngestionResult<GateDecision> {
        let key = event.idempotency_key();
        match self.store.begin(&key, self.window).await? {
            Some(ticket_id) => {
                debug!(
                    kind = %event.kind,
                    project = %event.project,
                    "Webhook event accepted"
                );
                Ok(GateDecision::Accepted { ticket_id })
            }
            None => {
                info!(
                    kind = %event.kind,
                    project = %event.project,
                    reference = %event.reference,
                    "Duplicate webhook delivery suppressed"
                );
                Ok(GateDecision::Duplicate)
            }
        }
    }

    /// Mark the ticket completed. The key keeps suppressing redeliveries
    /// for the remainder of the dedup window.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::Store` when the ticket store fails.
    pub async fn complete_processing(&self, ticket_id: Uuid) -> IngestionResult<()> {
        self.store.complete(ticket_id, self.window).await?;
        Ok(())
    }

    /// Remove expired tickets, returning the count deleted
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::Store` when the ticket store fails.
    pub async fn sweep(&self) -> IngestionResult<u64> {
        Ok(self.store.sweep_expired().await?)
    }
}
