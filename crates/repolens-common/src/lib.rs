//! Common utilities and patterns shared across Repolens crates
//!
//! This crate provides shared functionality to reduce duplication across
//! the various Repolens components.

pub mod correlation;
pub mod init;

pub use correlation::CorrelationId;
pub use init::initialize_environment;
