//! Hybrid storage coordination across the relational store and the
//! vector engine
//!
//! The relational store is always authoritative. The vector engine is a
//! derived mirror that can lag or be rebuilt; `migrate` and `verify`
//! exist to bring it back in line and to prove it is in line.

pub mod coordinator;
pub mod error;
pub mod migration;
pub mod mode;

pub use coordinator::StorageCoordinator;
pub use error::{StorageError, StorageResult};
pub use migration::{
    MigrateOptions, MigrationProgress, MigrationReport, SourceVerification, VerifyReport,
};
pub use mode::StorageMode;
