//! Capabilities the replicator needs from each store.
//!
//! [`FeedSource`] is the read-only side; [`FeedTarget`] is the transactional
//! write side. The Postgres implementations live in [`crate::source`] and
//! [`crate::target`].

use async_trait::async_trait;
use feedcopy_core::{Feed, Post, Provider, ProviderProfile};

use crate::DbError;

/// Read-only access to the authoritative store.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Look a feed up by its own id.
    async fn fetch_feed(&self, id: i64) -> Result<Option<Feed>, DbError>;

    /// Look a feed up by the `ext_prod_id` it was copied from.
    async fn fetch_feed_by_ext_prod_id(&self, ext_prod_id: i64) -> Result<Option<Feed>, DbError>;

    async fn fetch_profile(
        &self,
        feed_id: i64,
        provider: Provider,
    ) -> Result<Option<ProviderProfile>, DbError>;

    /// Up to `limit` posts for the feed, newest first, after skipping `offset`.
    async fn fetch_posts(&self, feed_id: i64, limit: u32, offset: u32)
        -> Result<Vec<Post>, DbError>;
}

/// Transactional write access to the destination store.
///
/// Writes are only valid between [`begin`](FeedTarget::begin) and one of
/// [`commit`](FeedTarget::commit) / [`rollback`](FeedTarget::rollback).
#[async_trait]
pub trait FeedTarget: Send {
    async fn begin(&mut self) -> Result<(), DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    /// Roll back the open transaction. A no-op when none is open.
    async fn rollback(&mut self) -> Result<(), DbError>;

    /// Insert or update the feed keyed by `source_feed_id`; returns the target id.
    async fn upsert_feed(&mut self, feed: &Feed, source_feed_id: i64) -> Result<i64, DbError>;

    async fn upsert_profile(
        &mut self,
        target_feed_id: i64,
        profile: &ProviderProfile,
    ) -> Result<(), DbError>;

    /// Insert posts that are not already present; returns how many were new.
    async fn insert_posts(&mut self, target_feed_id: i64, posts: &[Post]) -> Result<u64, DbError>;
}
