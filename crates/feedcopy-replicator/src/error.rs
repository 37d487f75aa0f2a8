use feedcopy_db::DbError;
use thiserror::Error;

use crate::RunState;

#[derive(Debug, Error)]
pub enum ReplicateError {
    /// The source store has no feed with this id. Nothing was written.
    #[error("feed {0} not found in source store")]
    FeedNotFound(i64),

    /// Reading the feed itself failed, before any transaction was opened.
    #[error("failed to read feed {source_feed_id} from source store")]
    SourceRead {
        source_feed_id: i64,
        #[source]
        source: DbError,
    },

    /// A step inside the target transaction failed; the transaction was
    /// rolled back.
    #[error("copy of feed {source_feed_id} failed and was rolled back")]
    Replication {
        source_feed_id: i64,
        #[source]
        source: DbError,
    },
}

impl ReplicateError {
    /// Terminal state the run ended in.
    #[must_use]
    pub fn state(&self) -> RunState {
        match self {
            ReplicateError::FeedNotFound(_) => RunState::NotFound,
            ReplicateError::SourceRead { .. } => RunState::NotStarted,
            ReplicateError::Replication { .. } => RunState::RolledBack,
        }
    }

    /// True when the feed upsert produced no target id.
    #[must_use]
    pub fn is_identity_failure(&self) -> bool {
        matches!(
            self,
            ReplicateError::Replication {
                source: DbError::MissingIdentity { .. },
                ..
            }
        )
    }
}
