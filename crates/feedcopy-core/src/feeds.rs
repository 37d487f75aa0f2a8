use serde::{Deserialize, Serialize};

use crate::Provider;

/// A feed as read from the source store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub name: String,
}

/// A provider-specific profile attached to a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub provider: Provider,
    pub feed_id: i64,
    pub name: String,
    /// Follower/fan count. Never negative; the schema carries a `CHECK`.
    pub fan_count: i64,
}

/// A single content item belonging to a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub url: String,
}
