//! zkv-storage: where encrypted chunks and upload records live
//!
//! - `operator`: OpenDAL operator factory (S3, local filesystem, memory)
//! - `backend`: named blob backends with timeouts, and the round-robin pool
//! - `metadata`: upload records and the identity row
//! - `health`: reachability checks

pub mod backend;
pub mod health;
pub mod metadata;
pub mod operator;

pub use backend::{Backend, BackendPool, StoredBlob};
pub use health::check_health;
pub use metadata::{JsonMetadataStore, MemoryMetadataStore, MetadataStore};
pub use operator::{build_operator, memory_operator};
