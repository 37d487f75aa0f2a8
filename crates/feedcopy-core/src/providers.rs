use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// A platform that can hold a profile for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Instagram,
    TikTok,
}

impl Provider {
    /// Every supported provider, in display order.
    pub const ALL: [Provider; 2] = [Provider::Instagram, Provider::TikTok];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Instagram => "instagram",
            Provider::TikTok => "tiktok",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| CoreError::InvalidProvider(token.to_string()))
    }
}

/// Which providers a replication run should copy.
///
/// `None` inside means "every provider"; an explicit set is never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSelection(Option<BTreeSet<Provider>>);

impl ProviderSelection {
    #[must_use]
    pub fn all() -> Self {
        Self(None)
    }

    /// Restrict the selection to `providers`. An empty iterator selects all.
    pub fn only<I>(providers: I) -> Self
    where
        I: IntoIterator<Item = Provider>,
    {
        let set: BTreeSet<Provider> = providers.into_iter().collect();
        if set.is_empty() {
            Self(None)
        } else {
            Self(Some(set))
        }
    }

    #[must_use]
    pub fn includes(&self, provider: Provider) -> bool {
        self.0.as_ref().is_none_or(|set| set.contains(&provider))
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        self.0.is_none()
    }

    /// Parse a comma-separated list such as `"Instagram, tiktok"`.
    ///
    /// Tokens are trimmed and matched case-insensitively; blanks are ignored
    /// and duplicates collapse.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidProvider`] for the first unknown token.
    pub fn parse_list(raw: &str) -> Result<Self, CoreError> {
        let providers = raw
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Provider::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::only(providers))
    }
}

impl FromStr for ProviderSelection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_list(s)
    }
}
