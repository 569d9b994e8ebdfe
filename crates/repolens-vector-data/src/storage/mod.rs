//! Vector storage backends

pub mod disabled;
pub mod mock;
pub mod qdrant;
pub mod traits;

pub use disabled::DisabledVectorStorage;
pub use mock::MockVectorStorage;
pub use qdrant::QdrantStorage;
pub use traits::VectorStorage;
