//! Write operations against the target store.
//!
//! Every statement runs on a caller-supplied connection so that it lands in
//! the replication transaction. [`PgFeedTarget`] owns that transaction.

use async_trait::async_trait;
use feedcopy_core::{Feed, Post, ProviderProfile};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::source::profile_table;
use crate::{DbError, FeedTarget};

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Upserts a feed keyed by `ext_prod_id = source_feed_id`.
///
/// Conflicts on `ext_prod_id` overwrite `name` and refresh `updated_at`.
/// Returns the target-side `id` of the row.
///
/// # Errors
///
/// Returns [`DbError::MissingIdentity`] if the statement yields no id, or
/// [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_feed(
    conn: &mut PgConnection,
    feed: &Feed,
    source_feed_id: i64,
) -> Result<i64, DbError> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO feeds (name, ext_prod_id) \
         VALUES ($1, $2) \
         ON CONFLICT (ext_prod_id) DO UPDATE SET \
             name       = EXCLUDED.name, \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(&feed.name)
    .bind(source_feed_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::MissingIdentity { source_feed_id })
}

/// Upserts a provider profile for `target_feed_id`.
///
/// Conflicts on `feed_id` overwrite `name` and `fan_count` and refresh
/// `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_provider_profile(
    conn: &mut PgConnection,
    target_feed_id: i64,
    profile: &ProviderProfile,
) -> Result<(), DbError> {
    let sql = format!(
        "INSERT INTO {} (feed_id, name, fan_count) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (feed_id) DO UPDATE SET \
             name       = EXCLUDED.name, \
             fan_count  = EXCLUDED.fan_count, \
             updated_at = NOW()",
        profile_table(profile.provider)
    );
    sqlx::query(&sql)
        .bind(target_feed_id)
        .bind(&profile.name)
        .bind(profile.fan_count)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Inserts posts for `target_feed_id`, skipping any `(feed_id, url)` already
/// present. Existing rows are left untouched.
///
/// Returns the number of rows actually inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on the first failing insert.
pub async fn insert_posts(
    conn: &mut PgConnection,
    target_feed_id: i64,
    posts: &[Post],
) -> Result<u64, DbError> {
    let mut inserted = 0u64;
    for post in posts {
        inserted += sqlx::query(
            "INSERT INTO posts (feed_id, url) \
             VALUES ($1, $2) \
             ON CONFLICT (feed_id, url) DO NOTHING",
        )
        .bind(target_feed_id)
        .bind(&post.url)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }
    Ok(inserted)
}

// ---------------------------------------------------------------------------
// FeedTarget
// ---------------------------------------------------------------------------

/// [`FeedTarget`] over a Postgres pool, holding at most one open transaction.
///
/// Dropping it with a transaction still open rolls that transaction back.
pub struct PgFeedTarget {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl std::fmt::Debug for PgFeedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgFeedTarget")
            .field("in_transaction", &self.tx.is_some())
            .finish_non_exhaustive()
    }
}

impl PgFeedTarget {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    fn conn(&mut self) -> Result<&mut PgConnection, DbError> {
        self.tx.as_deref_mut().ok_or(DbError::NoActiveTransaction)
    }
}

#[async_trait]
impl FeedTarget for PgFeedTarget {
    async fn begin(&mut self) -> Result<(), DbError> {
        if self.tx.is_some() {
            return Err(DbError::TransactionAlreadyOpen);
        }
        self.tx = Some(self.pool.begin().await?);
        tracing::debug!("target transaction opened");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let tx = self.tx.take().ok_or(DbError::NoActiveTransaction)?;
        tx.commit().await?;
        tracing::debug!("target transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            tracing::debug!("target transaction rolled back");
        }
        Ok(())
    }

    async fn upsert_feed(&mut self, feed: &Feed, source_feed_id: i64) -> Result<i64, DbError> {
        upsert_feed(self.conn()?, feed, source_feed_id).await
    }

    async fn upsert_profile(
        &mut self,
        target_feed_id: i64,
        profile: &ProviderProfile,
    ) -> Result<(), DbError> {
        upsert_provider_profile(self.conn()?, target_feed_id, profile).await
    }

    async fn insert_posts(&mut self, target_feed_id: i64, posts: &[Post]) -> Result<u64, DbError> {
        let inserted = insert_posts(self.conn()?, target_feed_id, posts).await?;
        tracing::debug!(
            target_feed_id,
            submitted = posts.len(),
            inserted,
            "posts inserted"
        );
        Ok(inserted)
    }
}
