//! Domain models for database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an ingestion job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states are immutable; the record can only be superseded by
    /// a new job.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "retrying" => Ok(Self::Retrying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{status}")
    }
}

/// A durable unit of scheduled ingestion work
///
/// Created by the enqueue operation, mutated only by the worker that
/// currently owns it, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: Uuid,
    /// Externally-correlatable ID used by API callers to poll/await
    pub processing_id: Uuid,
    /// Address of the content source (clone URL or local path)
    pub repository_locator: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    /// Higher dequeues first
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl IngestionJob {
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One vector per content unit (file or documentation section)
///
/// `(source_id, unit_path)` is unique per source. The relational store is
/// authoritative; the vector engine holds a derived, possibly-lagging copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Deterministic v5 UUID of `(source_id, unit_path)` so re-ingestion
    /// overwrites the same point in both backends
    pub id: Uuid,
    pub source_id: String,
    pub unit_path: String,
    pub content: String,
    pub language: Option<String>,
    /// Commit SHA or document version the content was taken from
    pub revision: String,
    pub vector: Vec<f32>,
    pub updated_at: DateTime<Utc>,
}

/// An embedding record paired with a similarity score
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: EmbeddingRecord,
    pub score: f32,
}

/// One row per ingested repository/documentation source
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceMetadata {
    pub source_id: String,
    pub last_revision: String,
    pub last_processed_at: DateTime<Utc>,
    pub active: bool,
}

/// State of a deduplication ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    InFlight,
    Completed,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
        };
        write!(f, "{status}")
    }
}

/// Ephemeral concurrency-control marker for webhook deduplication
#[derive(Debug, Clone)]
pub struct DedupTicket {
    pub ticket_id: Uuid,
    pub idempotency_key: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Job counts per status, for the status/statistics surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub retrying: i64,
    pub completed: i64,
    pub failed: i64,
}
