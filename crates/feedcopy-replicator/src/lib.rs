//! Single-feed replication from a source store into a target store.
//!
//! [`replicate`] copies one feed, the selected provider profiles and a page
//! of posts inside a single target transaction.

pub mod error;
pub mod replicate;
pub mod types;

pub use error::ReplicateError;
pub use replicate::replicate;
pub use types::{ReplicationOutcome, ReplicationRequest, RunState};
