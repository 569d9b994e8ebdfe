//! Request-scoped correlation IDs
//!
//! Every ingestion run carries one of these from snapshot through
//! storage, so log lines emitted by the pipeline, the coordinator, and
//! the vector engine can be stitched back into a single story.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier tying together the log events of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a fresh ID for a new operation
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_render_as_uuids() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }
}
