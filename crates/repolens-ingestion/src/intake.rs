//! Webhook intake: gate first, enqueue second
//!
//! Intake is the only writer that turns external deliveries into jobs.
//! The gate runs before any durable work; a duplicate delivery produces
//! no job. The ticket is completed once the job is durably enqueued, so
//! redeliveries keep being suppressed for the rest of the window.

use repolens_meta_data::JobStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::dedup::{DedupGate, EventKind, GateDecision, WebhookEvent};
use crate::error::IngestionResult;

/// Outcome of handling one webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// A job was enqueued; poll with the processing ID
    Enqueued { processing_id: Uuid },
    /// Duplicate delivery, no job created
    Duplicate,
}

/// Priorities per event kind. Merge request events answer a person
/// waiting on review, pushes refresh the knowledge base.
const PRIORITY_MERGE_REQUEST: i32 = 10;
const PRIORITY_PUSH: i32 = 0;

/// Turns accepted webhook events into ingestion jobs
pub struct WebhookIntake {
    gate: DedupGate,
    job_store: Arc<dyn JobStore>,
    max_attempts: i32,
}

impl WebhookIntake {
    pub fn new(gate: DedupGate, job_store: Arc<dyn JobStore>, max_attempts: i32) -> Self {
        Self {
            gate,
            job_store,
            max_attempts,
        }
    }

    /// Handle one delivery end to end: claim the key, enqueue the job,
    /// complete the ticket.
    ///
    /// If enqueue fails the ticket stays in-flight and expires on its own,
    /// so a later redelivery can retry the whole intake.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::Store` when the gate or job store fails.
    pub async fn handle_event(&self, event: &WebhookEvent) -> IngestionResult<IntakeOutcome> {
        let ticket_id = match self.gate.begin_processing(event).await? {
            GateDecision::Accepted { ticket_id } => ticket_id,
            GateDecision::Duplicate => return Ok(IntakeOutcome::Duplicate),
        };

        let priority = match event.kind {
            EventKind::MergeRequest => PRIORITY_MERGE_REQUEST,
            EventKind::Push => PRIORITY_PUSH,
        };

        let job = self
            .job_store
            .enqueue(&event.repository_locator, priority, self.max_attempts)
            .await?;
        self.gate.complete_processing(ticket_id).await?;

        info!(
            processing_id = %job.processing_id,
            project = %event.project,
            priority = priority,
            "Enqueued ingestion job for webhook event"
        );
        Ok(IntakeOutcome::Enqueued {
            processing_id: job.processing_id,
        })
    }
}
