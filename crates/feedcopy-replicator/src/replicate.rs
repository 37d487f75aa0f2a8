//! The replication run: selection policy, transaction boundary, outcome.

use std::collections::BTreeSet;

use feedcopy_core::{Feed, Provider, ProviderSelection};
use feedcopy_db::{DbError, FeedSource, FeedTarget};

use crate::{ReplicateError, ReplicationOutcome, ReplicationRequest, RunState};

/// Tracks the [`RunState`] of one invocation and logs each transition.
struct RunTracker {
    source_feed_id: i64,
    state: RunState,
}

impl RunTracker {
    fn new(source_feed_id: i64) -> Self {
        Self {
            source_feed_id,
            state: RunState::NotStarted,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal run transition {} -> {next}",
            self.state
        );
        tracing::debug!(
            source_feed_id = self.source_feed_id,
            from = %self.state,
            to = %next,
            "replication run state changed"
        );
        self.state = next;
    }
}

/// What the transaction wrote, before the advisory check.
struct Copied {
    target_feed_id: i64,
    providers: BTreeSet<Provider>,
    posts_copied: usize,
    posts_inserted: u64,
}

/// Copy one feed and its selected children from `source` into `target`.
///
/// The feed is read first; if it does not exist nothing else happens. All
/// later steps, including the remaining source reads, run inside one target
/// transaction that is committed at the end or rolled back on the first
/// fault. After commit, providers excluded by the selection are probed on the
/// source and reported in [`ReplicationOutcome::available_not_copied`]; that
/// probe never affects the result.
///
/// # Errors
///
/// - [`ReplicateError::FeedNotFound`] when the source feed is absent.
/// - [`ReplicateError::SourceRead`] when reading the feed fails.
/// - [`ReplicateError::Replication`] when anything after `begin` fails; the
///   target is left as it was before the run.
pub async fn replicate<S, T>(
    source: &S,
    target: &mut T,
    request: &ReplicationRequest,
) -> Result<ReplicationOutcome, ReplicateError>
where
    S: FeedSource + ?Sized,
    T: FeedTarget + ?Sized,
{
    let source_feed_id = request.source_feed_id;
    let mut run = RunTracker::new(source_feed_id);

    let feed = match source.fetch_feed(source_feed_id).await {
        Ok(Some(feed)) => feed,
        Ok(None) => {
            run.advance(RunState::NotFound);
            return Err(ReplicateError::FeedNotFound(source_feed_id));
        }
        Err(err) => {
            return Err(ReplicateError::SourceRead {
                source_feed_id,
                source: err,
            });
        }
    };
    run.advance(RunState::FeedFetched);

    tracing::info!(
        source_feed_id,
        feed = %feed.name,
        instagram = request.selection.includes(Provider::Instagram),
        tiktok = request.selection.includes(Provider::TikTok),
        post_limit = request.post_limit,
        "replicating feed"
    );

    run.advance(RunState::TransactionOpen);
    let copied = match copy_in_transaction(source, target, &feed, request).await {
        Ok(copied) => copied,
        Err(cause) => {
            rollback_best_effort(target, source_feed_id).await;
            run.advance(RunState::RolledBack);
            tracing::error!(source_feed_id, error = %cause, "replication rolled back");
            return Err(ReplicateError::Replication {
                source_feed_id,
                source: cause,
            });
        }
    };
    run.advance(RunState::Committed);

    tracing::info!(
        source_feed_id,
        target_feed_id = copied.target_feed_id,
        providers = ?copied.providers,
        posts_copied = copied.posts_copied,
        posts_inserted = copied.posts_inserted,
        "replication committed"
    );

    let available_not_copied = if !copied.providers.is_empty()
        && copied.providers.len() < Provider::ALL.len()
    {
        find_available_not_copied(source, source_feed_id, &request.selection).await
    } else {
        None
    };

    Ok(ReplicationOutcome {
        source_feed_id,
        target_feed_id: copied.target_feed_id,
        copied: copied.providers,
        posts_copied: copied.posts_copied,
        posts_inserted: copied.posts_inserted,
        available_not_copied,
    })
}

/// Everything between `begin` and `commit`. Any error leaves the transaction
/// open for the caller to roll back.
async fn copy_in_transaction<S, T>(
    source: &S,
    target: &mut T,
    feed: &Feed,
    request: &ReplicationRequest,
) -> Result<Copied, DbError>
where
    S: FeedSource + ?Sized,
    T: FeedTarget + ?Sized,
{
    let source_feed_id = request.source_feed_id;

    target.begin().await?;

    let mut profiles = Vec::new();
    for provider in Provider::ALL {
        if !request.selection.includes(provider) {
            continue;
        }
        match source.fetch_profile(source_feed_id, provider).await? {
            Some(profile) => profiles.push(profile),
            None => tracing::debug!(
                source_feed_id,
                %provider,
                "selected provider has no source profile; skipping"
            ),
        }
    }

    let posts = if request.post_limit > 0 {
        source
            .fetch_posts(source_feed_id, request.post_limit, 0)
            .await?
    } else {
        Vec::new()
    };

    let target_feed_id = target.upsert_feed(feed, source_feed_id).await?;

    let mut providers = BTreeSet::new();
    for profile in &profiles {
        target.upsert_profile(target_feed_id, profile).await?;
        providers.insert(profile.provider);
    }

    let posts_inserted = if posts.is_empty() {
        0
    } else {
        target.insert_posts(target_feed_id, &posts).await?
    };

    target.commit().await?;

    Ok(Copied {
        target_feed_id,
        providers,
        posts_copied: posts.len(),
        posts_inserted,
    })
}

/// Roll back, logging rather than propagating a rollback failure so the
/// original cause is what the caller sees.
async fn rollback_best_effort<T>(target: &mut T, source_feed_id: i64)
where
    T: FeedTarget + ?Sized,
{
    if let Err(rollback_err) = target.rollback().await {
        tracing::error!(
            source_feed_id,
            error = %rollback_err,
            "failed to roll back target transaction"
        );
    }
}

/// Providers excluded by `selection` that have a profile on the source.
///
/// Read-only and outside any transaction. A read failure is logged and
/// yields `None`.
async fn find_available_not_copied<S>(
    source: &S,
    source_feed_id: i64,
    selection: &ProviderSelection,
) -> Option<BTreeSet<Provider>>
where
    S: FeedSource + ?Sized,
{
    let mut available = BTreeSet::new();
    for provider in Provider::ALL {
        if selection.includes(provider) {
            continue;
        }
        match source.fetch_profile(source_feed_id, provider).await {
            Ok(Some(_)) => {
                available.insert(provider);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    source_feed_id,
                    %provider,
                    error = %err,
                    "could not check for uncopied provider data"
                );
                return None;
            }
        }
    }

    (!available.is_empty()).then_some(available)
}

#[cfg(test)]
#[path = "replicate_test.rs"]
mod tests;
