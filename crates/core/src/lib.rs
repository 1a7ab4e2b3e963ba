//! Shared building blocks for the generation-progress client: error
//! type, job identifiers, per-tab job persistence and file hashing.

pub mod error;
pub mod hashing;
pub mod job_id;
pub mod task_store;
pub mod types;
