use std::collections::BTreeSet;

use feedcopy_core::{Provider, ProviderSelection};
use serde::Serialize;

/// Inputs for one replication run. Validated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationRequest {
    pub source_feed_id: i64,
    pub selection: ProviderSelection,
    /// How many of the most recent posts to copy; `0` copies none.
    pub post_limit: u32,
}

impl ReplicationRequest {
    #[must_use]
    pub fn new(source_feed_id: i64) -> Self {
        Self {
            source_feed_id,
            selection: ProviderSelection::all(),
            post_limit: 0,
        }
    }

    #[must_use]
    pub fn with_selection(mut self, selection: ProviderSelection) -> Self {
        self.selection = selection;
        self
    }

    #[must_use]
    pub fn with_post_limit(mut self, post_limit: u32) -> Self {
        self.post_limit = post_limit;
        self
    }
}

/// Result of a committed replication run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationOutcome {
    pub source_feed_id: i64,
    pub target_feed_id: i64,
    /// Providers that were both selected and present on the source.
    pub copied: BTreeSet<Provider>,
    /// Posts read from the source and submitted for insert.
    pub posts_copied: usize,
    /// Of those, how many were new to the target.
    pub posts_inserted: u64,
    /// Providers left out by the selection that do have source data.
    ///
    /// Best-effort and read after commit. `None` when nothing was found,
    /// when the check did not apply, or when the check itself failed.
    pub available_not_copied: Option<BTreeSet<Provider>>,
}

/// Lifecycle of a single replication run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    FeedFetched,
    TransactionOpen,
    Committed,
    RolledBack,
    NotFound,
}

impl RunState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Committed | RunState::RolledBack | RunState::NotFound
        )
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::NotStarted, RunState::FeedFetched | RunState::NotFound)
                | (RunState::FeedFetched, RunState::TransactionOpen)
                | (
                    RunState::TransactionOpen,
                    RunState::Committed | RunState::RolledBack
                )
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not_started"),
            RunState::FeedFetched => write!(f, "feed_fetched"),
            RunState::TransactionOpen => write!(f, "transaction_open"),
            RunState::Committed => write!(f, "committed"),
            RunState::RolledBack => write!(f, "rolled_back"),
            RunState::NotFound => write!(f, "not_found"),
        }
    }
}
