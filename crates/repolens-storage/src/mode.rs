//! Storage operating modes

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// How reads and writes are routed across the two stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Relational store only; the vector engine is untouched
    PrimaryOnly,
    /// Vector engine serves reads; the relational store stays authoritative
    /// for writes
    VectorPrimary,
    /// Write both, read vector with primary fallback
    Hybrid,
}

impl StorageMode {
    /// True when the vector engine participates at all
    pub const fn vector_enabled(self) -> bool {
        matches!(self, Self::VectorPrimary | Self::Hybrid)
    }
}

impl std::str::FromStr for StorageMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary_only" => Ok(Self::PrimaryOnly),
            "vector_primary" => Ok(Self::VectorPrimary),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(StorageError::InvalidMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            Self::PrimaryOnly => "primary_only",
            Self::VectorPrimary => "vector_primary",
            Self::Hybrid => "hybrid",
        };
        write!(f, "{mode}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip() {
        for mode in [
            StorageMode::PrimaryOnly,
            StorageMode::VectorPrimary,
            StorageMode::Hybrid,
        ] {
            assert_eq!(mode.to_string().parse::<StorageMode>().ok(), Some(mode));
        }
    }

    #[test]
    fn only_primary_only_disables_the_vector_engine() {
        assert!(!StorageMode::PrimaryOnly.vector_enabled());
        assert!(StorageMode::VectorPrimary.vector_enabled());
        assert!(StorageMode::Hybrid.vector_enabled());
    }
}
