//! Vector engine client for the derived embedding mirror
//!
//! The relational store remains authoritative; this crate holds the
//! Qdrant-backed secondary copy used for approximate similarity search.

pub mod error;
pub mod storage;

pub use error::{VectorDataError, VectorDataResult};
pub use storage::{DisabledVectorStorage, MockVectorStorage, QdrantStorage, VectorStorage};
