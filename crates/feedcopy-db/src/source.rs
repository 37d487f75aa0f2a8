//! Read-only queries against the source store: `feeds`, the per-provider
//! profile tables, and `posts`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedcopy_core::{Feed, Post, Provider, ProviderProfile};
use sqlx::PgPool;

use crate::{DbError, FeedSource};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `feeds` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedRow {
    pub id: i64,
    pub name: String,
    /// Set only on rows that were copied from another store.
    pub ext_prod_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            name: row.name,
        }
    }
}

/// A row from `instagram_sources` or `tiktok_sources`; both share one shape.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProviderProfileRow {
    pub id: i64,
    pub feed_id: i64,
    pub name: String,
    pub fan_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderProfileRow {
    #[must_use]
    pub fn into_profile(self, provider: Provider) -> ProviderProfile {
        ProviderProfile {
            provider,
            feed_id: self.feed_id,
            name: self.name,
            fan_count: self.fan_count,
        }
    }
}

/// A row from the `posts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub feed_id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            feed_id: row.feed_id,
            url: row.url,
        }
    }
}

/// Table holding profiles for `provider`.
pub(crate) fn profile_table(provider: Provider) -> &'static str {
    match provider {
        Provider::Instagram => "instagram_sources",
        Provider::TikTok => "tiktok_sources",
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Get a feed by its primary key.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn get_feed(pool: &PgPool, id: i64) -> Result<Option<FeedRow>, DbError> {
    Ok(sqlx::query_as::<_, FeedRow>(
        "SELECT id, name, ext_prod_id, created_at, updated_at FROM feeds WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

/// Get a feed by the external reference it was copied from.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn get_feed_by_ext_prod_id(
    pool: &PgPool,
    ext_prod_id: i64,
) -> Result<Option<FeedRow>, DbError> {
    Ok(sqlx::query_as::<_, FeedRow>(
        "SELECT id, name, ext_prod_id, created_at, updated_at FROM feeds WHERE ext_prod_id = $1",
    )
    .bind(ext_prod_id)
    .fetch_optional(pool)
    .await?)
}

/// Get the `provider` profile for a feed, if that provider has one.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn get_provider_profile(
    pool: &PgPool,
    feed_id: i64,
    provider: Provider,
) -> Result<Option<ProviderProfileRow>, DbError> {
    let sql = format!(
        "SELECT id, feed_id, name, fan_count, created_at, updated_at \
         FROM {} WHERE feed_id = $1",
        profile_table(provider)
    );
    Ok(sqlx::query_as::<_, ProviderProfileRow>(&sql)
        .bind(feed_id)
        .fetch_optional(pool)
        .await?)
}

/// List up to `limit` posts for a feed, newest (highest id) first.
///
/// A `limit` of zero returns an empty list without querying.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn list_recent_posts(
    pool: &PgPool,
    feed_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostRow>, DbError> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    Ok(sqlx::query_as::<_, PostRow>(
        "SELECT id, feed_id, url, created_at FROM posts \
         WHERE feed_id = $1 \
         ORDER BY id DESC \
         LIMIT $2 OFFSET $3",
    )
    .bind(feed_id)
    .bind(i64::from(limit))
    .bind(i64::from(offset))
    .fetch_all(pool)
    .await?)
}

// ---------------------------------------------------------------------------
// FeedSource
// ---------------------------------------------------------------------------

/// [`FeedSource`] over a Postgres pool. Issues plain reads, no transaction.
#[derive(Debug, Clone)]
pub struct PgFeedSource {
    pool: PgPool,
}

impl PgFeedSource {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedSource for PgFeedSource {
    async fn fetch_feed(&self, id: i64) -> Result<Option<Feed>, DbError> {
        Ok(get_feed(&self.pool, id).await?.map(Feed::from))
    }

    async fn fetch_feed_by_ext_prod_id(&self, ext_prod_id: i64) -> Result<Option<Feed>, DbError> {
        Ok(get_feed_by_ext_prod_id(&self.pool, ext_prod_id)
            .await?
            .map(Feed::from))
    }

    async fn fetch_profile(
        &self,
        feed_id: i64,
        provider: Provider,
    ) -> Result<Option<ProviderProfile>, DbError> {
        Ok(get_provider_profile(&self.pool, feed_id, provider)
            .await?
            .map(|row| row.into_profile(provider)))
    }

    async fn fetch_posts(
        &self,
        feed_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Post>, DbError> {
        let rows = list_recent_posts(&self.pool, feed_id, limit, offset).await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }
}
