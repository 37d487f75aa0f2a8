use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use feedcopy_core::Post;
use feedcopy_core::ProviderProfile;

use super::*;

fn injected(what: &str) -> DbError {
    DbError::Sqlx(sqlx::Error::Protocol(format!("injected {what} failure")))
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceCall {
    Feed(i64),
    Profile(Provider),
    Posts { limit: u32 },
}

#[derive(Default)]
struct FakeSource {
    feeds: HashMap<i64, Feed>,
    profiles: HashMap<(i64, Provider), ProviderProfile>,
    posts: HashMap<i64, Vec<Post>>,
    fail_feed_read: bool,
    failing_profile: Option<Provider>,
    calls: Mutex<Vec<SourceCall>>,
}

impl FakeSource {
    fn with_feed(mut self, id: i64, name: &str) -> Self {
        self.feeds.insert(
            id,
            Feed {
                id,
                name: name.to_string(),
            },
        );
        self
    }

    fn with_profile(mut self, feed_id: i64, provider: Provider, fan_count: i64) -> Self {
        self.profiles.insert(
            (feed_id, provider),
            ProviderProfile {
                provider,
                feed_id,
                name: format!("{provider}-{feed_id}"),
                fan_count,
            },
        );
        self
    }

    /// Posts with ids `1..=count`; a higher id is more recent.
    fn with_posts(mut self, feed_id: i64, count: i64) -> Self {
        let posts = (1..=count)
            .map(|id| Post {
                id,
                feed_id,
                url: format!("https://example.com/{feed_id}/{id}"),
            })
            .collect();
        self.posts.insert(feed_id, posts);
        self
    }

    fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn profile_reads(&self) -> Vec<Provider> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SourceCall::Profile(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn post_reads(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SourceCall::Posts { limit } => Some(limit),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SourceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl FeedSource for FakeSource {
    async fn fetch_feed(&self, id: i64) -> Result<Option<Feed>, DbError> {
        self.record(SourceCall::Feed(id));
        if self.fail_feed_read {
            return Err(injected("feed read"));
        }
        Ok(self.feeds.get(&id).cloned())
    }

    async fn fetch_feed_by_ext_prod_id(&self, _ext_prod_id: i64) -> Result<Option<Feed>, DbError> {
        Ok(None)
    }

    async fn fetch_profile(
        &self,
        feed_id: i64,
        provider: Provider,
    ) -> Result<Option<ProviderProfile>, DbError> {
        self.record(SourceCall::Profile(provider));
        if self.failing_profile == Some(provider) {
            return Err(injected("profile read"));
        }
        Ok(self.profiles.get(&(feed_id, provider)).cloned())
    }

    async fn fetch_posts(
        &self,
        feed_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Post>, DbError> {
        self.record(SourceCall::Posts { limit });
        let mut posts = self.posts.get(&feed_id).cloned().unwrap_or_default();
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory target with transactional staging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TargetRows {
    /// ext_prod_id -> (target id, name)
    feeds: BTreeMap<i64, (i64, String)>,
    /// (target feed id, provider) -> (name, fan_count)
    profiles: BTreeMap<(i64, Provider), (String, i64)>,
    posts: BTreeSet<(i64, String)>,
    next_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetCall {
    Begin,
    Commit,
    Rollback,
    UpsertFeed,
    UpsertProfile(Provider),
    InsertPosts(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailOn {
    Begin,
    UpsertFeed,
    MissingIdentity,
    InsertPosts,
    Commit,
}

#[derive(Default)]
struct FakeTarget {
    committed: TargetRows,
    open: Option<TargetRows>,
    calls: Vec<TargetCall>,
    fail_on: Option<FailOn>,
}

impl FakeTarget {
    fn failing_on(op: FailOn) -> Self {
        Self {
            fail_on: Some(op),
            ..Self::default()
        }
    }

    fn count(&self, call: TargetCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn check(&self, op: FailOn) -> Result<(), DbError> {
        if self.fail_on == Some(op) {
            return Err(injected("target write"));
        }
        Ok(())
    }

    fn rows(&mut self) -> Result<&mut TargetRows, DbError> {
        self.open.as_mut().ok_or(DbError::NoActiveTransaction)
    }
}

#[async_trait]
impl FeedTarget for FakeTarget {
    async fn begin(&mut self) -> Result<(), DbError> {
        self.calls.push(TargetCall::Begin);
        self.check(FailOn::Begin)?;
        if self.open.is_some() {
            return Err(DbError::TransactionAlreadyOpen);
        }
        self.open = Some(self.committed.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.calls.push(TargetCall::Commit);
        let rows = self.open.take().ok_or(DbError::NoActiveTransaction)?;
        self.check(FailOn::Commit)?;
        self.committed = rows;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.calls.push(TargetCall::Rollback);
        self.open = None;
        Ok(())
    }

    async fn upsert_feed(&mut self, feed: &Feed, source_feed_id: i64) -> Result<i64, DbError> {
        self.calls.push(TargetCall::UpsertFeed);
        self.check(FailOn::UpsertFeed)?;
        if self.fail_on == Some(FailOn::MissingIdentity) {
            return Err(DbError::MissingIdentity { source_feed_id });
        }
        let rows = self.rows()?;
        if let Some((id, name)) = rows.feeds.get_mut(&source_feed_id) {
            name.clone_from(&feed.name);
            return Ok(*id);
        }
        rows.next_id += 1;
        let id = rows.next_id;
        rows.feeds.insert(source_feed_id, (id, feed.name.clone()));
        Ok(id)
    }

    async fn upsert_profile(
        &mut self,
        target_feed_id: i64,
        profile: &ProviderProfile,
    ) -> Result<(), DbError> {
        self.calls.push(TargetCall::UpsertProfile(profile.provider));
        let rows = self.rows()?;
        rows.profiles.insert(
            (target_feed_id, profile.provider),
            (profile.name.clone(), profile.fan_count),
        );
        Ok(())
    }

    async fn insert_posts(&mut self, target_feed_id: i64, posts: &[Post]) -> Result<u64, DbError> {
        self.calls.push(TargetCall::InsertPosts(posts.len()));
        self.check(FailOn::InsertPosts)?;
        let rows = self.rows()?;
        let mut inserted = 0;
        for post in posts {
            if rows.posts.insert((target_feed_id, post.url.clone())) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

fn creator_with_both_profiles() -> FakeSource {
    FakeSource::default()
        .with_feed(123, "Creator")
        .with_profile(123, Provider::Instagram, 5_000)
        .with_profile(123, Provider::TikTok, 7_000)
}

fn only(provider: Provider) -> ProviderSelection {
    ProviderSelection::only([provider])
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn copies_both_providers_without_posts_by_default() {
    let source = creator_with_both_profiles();
    let mut target = FakeTarget::default();

    let outcome = replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .expect("replication should succeed");

    assert_eq!(
        outcome.copied,
        BTreeSet::from([Provider::Instagram, Provider::TikTok])
    );
    assert_eq!(outcome.posts_copied, 0);
    assert!(outcome.available_not_copied.is_none());
    assert_eq!(outcome.target_feed_id, target.committed.feeds[&123].0);
    assert!(source.post_reads().is_empty());
    assert_eq!(target.count(TargetCall::Commit), 1);
    assert_eq!(target.count(TargetCall::Rollback), 0);
}

#[tokio::test]
async fn copies_only_instagram_and_reports_tiktok_available() {
    let source = creator_with_both_profiles().with_posts(123, 3);
    let mut target = FakeTarget::default();
    let request = ReplicationRequest::new(123)
        .with_selection(only(Provider::Instagram))
        .with_post_limit(3);

    let outcome = replicate(&source, &mut target, &request).await.unwrap();

    assert_eq!(outcome.copied, BTreeSet::from([Provider::Instagram]));
    assert_eq!(outcome.posts_copied, 3);
    assert_eq!(outcome.posts_inserted, 3);
    assert_eq!(
        outcome.available_not_copied,
        Some(BTreeSet::from([Provider::TikTok]))
    );

    // TikTok is only read by the post-commit probe, never inside the copy.
    assert_eq!(
        source.calls(),
        vec![
            SourceCall::Feed(123),
            SourceCall::Profile(Provider::Instagram),
            SourceCall::Posts { limit: 3 },
            SourceCall::Profile(Provider::TikTok),
        ]
    );
    assert_eq!(target.count(TargetCall::UpsertProfile(Provider::TikTok)), 0);
    assert!(!target
        .committed
        .profiles
        .contains_key(&(outcome.target_feed_id, Provider::TikTok)));
}

#[tokio::test]
async fn missing_feed_opens_no_transaction() {
    let source = creator_with_both_profiles();
    let mut target = FakeTarget::default();

    let err = replicate(&source, &mut target, &ReplicationRequest::new(999))
        .await
        .expect_err("missing feed should fail");

    assert!(matches!(err, ReplicateError::FeedNotFound(999)));
    assert_eq!(err.state(), RunState::NotFound);
    assert_eq!(err.to_string(), "feed 999 not found in source store");
    assert!(target.calls.is_empty());
    assert_eq!(source.calls(), vec![SourceCall::Feed(999)]);
}

#[tokio::test]
async fn feed_upsert_failure_rolls_back_exactly_once() {
    let source = creator_with_both_profiles();
    let mut target = FakeTarget::failing_on(FailOn::UpsertFeed);

    let err = replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .expect_err("upsert failure should fail the run");

    assert!(matches!(
        err,
        ReplicateError::Replication {
            source_feed_id: 123,
            ..
        }
    ));
    assert_eq!(err.state(), RunState::RolledBack);
    assert_eq!(
        err.to_string(),
        "copy of feed 123 failed and was rolled back"
    );
    let cause = std::error::Error::source(&err).map(ToString::to_string);
    assert!(cause.is_some_and(|c| c.contains("injected target write failure")));
    assert_eq!(target.count(TargetCall::Rollback), 1);
    assert_eq!(target.count(TargetCall::Commit), 0);
    assert_eq!(target.committed, TargetRows::default());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replicating_twice_is_idempotent() {
    let source = creator_with_both_profiles().with_posts(123, 4);
    let mut target = FakeTarget::default();
    let request = ReplicationRequest::new(123).with_post_limit(4);

    let first = replicate(&source, &mut target, &request).await.unwrap();
    let after_first = target.committed.clone();
    let second = replicate(&source, &mut target, &request).await.unwrap();

    assert_eq!(first.target_feed_id, second.target_feed_id);
    assert_eq!(first.posts_inserted, 4);
    assert_eq!(second.posts_copied, 4);
    assert_eq!(second.posts_inserted, 0);
    assert_eq!(target.committed, after_first);
    assert_eq!(target.committed.feeds.len(), 1);
    assert_eq!(target.committed.profiles.len(), 2);
    assert_eq!(target.committed.posts.len(), 4);
}

#[tokio::test]
async fn post_insert_failure_leaves_target_as_before() {
    let mut source = creator_with_both_profiles().with_posts(123, 2);
    let mut target = FakeTarget::default();
    replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .unwrap();
    let before = target.committed.clone();

    source = source
        .with_feed(123, "Renamed Creator")
        .with_profile(123, Provider::Instagram, 9_999);
    target.fail_on = Some(FailOn::InsertPosts);

    let err = replicate(
        &source,
        &mut target,
        &ReplicationRequest::new(123).with_post_limit(2),
    )
    .await
    .expect_err("post insert failure should fail the run");

    assert_eq!(err.state(), RunState::RolledBack);
    assert_eq!(target.committed, before);
    assert_eq!(target.committed.feeds[&123].1, "Creator");
    assert!(target.open.is_none());
}

#[tokio::test]
async fn single_provider_selection_never_reads_or_writes_the_other() {
    for (selected, other) in [
        (Provider::Instagram, Provider::TikTok),
        (Provider::TikTok, Provider::Instagram),
    ] {
        // A read of `other` inside the transaction would fail the run.
        let source = FakeSource {
            failing_profile: Some(other),
            ..creator_with_both_profiles()
        };
        let mut target = FakeTarget::default();
        let request = ReplicationRequest::new(123).with_selection(only(selected));

        let outcome = replicate(&source, &mut target, &request)
            .await
            .unwrap_or_else(|e| panic!("selection {selected} failed: {e}"));

        assert_eq!(outcome.copied, BTreeSet::from([selected]));
        assert_eq!(target.count(TargetCall::UpsertProfile(selected)), 1);
        assert_eq!(target.count(TargetCall::UpsertProfile(other)), 0);
        // The advisory probe hit the failing read and was dropped.
        assert!(outcome.available_not_copied.is_none());
        assert_eq!(source.profile_reads(), vec![selected, other]);
    }
}

#[tokio::test]
async fn zero_post_limit_reads_and_writes_no_posts() {
    let source = creator_with_both_profiles().with_posts(123, 5);
    let mut target = FakeTarget::default();

    let outcome = replicate(
        &source,
        &mut target,
        &ReplicationRequest::new(123).with_post_limit(0),
    )
    .await
    .unwrap();

    assert_eq!(outcome.posts_copied, 0);
    assert!(source.post_reads().is_empty());
    assert!(!target
        .calls
        .iter()
        .any(|c| matches!(c, TargetCall::InsertPosts(_))));
    assert!(target.committed.posts.is_empty());
}

#[tokio::test]
async fn post_limit_copies_the_most_recent_posts() {
    let source = creator_with_both_profiles().with_posts(123, 5);
    let mut target = FakeTarget::default();

    let outcome = replicate(
        &source,
        &mut target,
        &ReplicationRequest::new(123).with_post_limit(2),
    )
    .await
    .unwrap();

    assert_eq!(source.post_reads(), vec![2]);
    assert_eq!(target.count(TargetCall::InsertPosts(2)), 1);
    assert_eq!(outcome.posts_copied, 2);
    let urls: BTreeSet<String> = target
        .committed
        .posts
        .iter()
        .map(|(_, url)| url.clone())
        .collect();
    assert_eq!(
        urls,
        BTreeSet::from([
            "https://example.com/123/4".to_string(),
            "https://example.com/123/5".to_string(),
        ])
    );
}

#[tokio::test]
async fn post_limit_above_available_copies_what_exists() {
    let source = creator_with_both_profiles().with_posts(123, 2);
    let mut target = FakeTarget::default();

    let outcome = replicate(
        &source,
        &mut target,
        &ReplicationRequest::new(123).with_post_limit(50),
    )
    .await
    .unwrap();

    assert_eq!(source.post_reads(), vec![50]);
    assert_eq!(outcome.posts_copied, 2);
}

#[tokio::test]
async fn selected_provider_without_profile_is_skipped() {
    let source = FakeSource::default()
        .with_feed(123, "Creator")
        .with_profile(123, Provider::Instagram, 10);
    let mut target = FakeTarget::default();

    let outcome = replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .unwrap();

    assert_eq!(outcome.copied, BTreeSet::from([Provider::Instagram]));
    // Everything was selected, so there is nothing to advise about.
    assert!(outcome.available_not_copied.is_none());
    assert_eq!(
        source.profile_reads(),
        vec![Provider::Instagram, Provider::TikTok]
    );
    assert_eq!(target.count(TargetCall::UpsertProfile(Provider::TikTok)), 0);
}

#[tokio::test]
async fn feed_without_profiles_still_copies_the_feed() {
    let source = FakeSource::default().with_feed(123, "Bare");
    let mut target = FakeTarget::default();

    let outcome = replicate(
        &source,
        &mut target,
        &ReplicationRequest::new(123).with_selection(only(Provider::TikTok)),
    )
    .await
    .unwrap();

    assert!(outcome.copied.is_empty());
    assert!(outcome.available_not_copied.is_none());
    // No provider copied, so no advisory probe.
    assert_eq!(source.profile_reads(), vec![Provider::TikTok]);
    assert_eq!(target.committed.feeds[&123].1, "Bare");
}

#[tokio::test]
async fn advisory_lists_nothing_when_other_provider_is_absent() {
    let source = FakeSource::default()
        .with_feed(123, "Creator")
        .with_profile(123, Provider::Instagram, 10);
    let mut target = FakeTarget::default();

    let outcome = replicate(
        &source,
        &mut target,
        &ReplicationRequest::new(123).with_selection(only(Provider::Instagram)),
    )
    .await
    .unwrap();

    assert!(outcome.available_not_copied.is_none());
    assert_eq!(
        source.profile_reads(),
        vec![Provider::Instagram, Provider::TikTok]
    );
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn source_fault_after_begin_rolls_back() {
    let source = FakeSource {
        failing_profile: Some(Provider::Instagram),
        ..creator_with_both_profiles()
    };
    let mut target = FakeTarget::default();

    let err = replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .expect_err("profile read failure should fail the run");

    assert_eq!(err.state(), RunState::RolledBack);
    assert_eq!(
        target.calls,
        vec![TargetCall::Begin, TargetCall::Rollback]
    );
}

#[tokio::test]
async fn feed_read_fault_opens_no_transaction() {
    let source = FakeSource {
        fail_feed_read: true,
        ..creator_with_both_profiles()
    };
    let mut target = FakeTarget::default();

    let err = replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .expect_err("feed read failure should fail the run");

    assert!(matches!(err, ReplicateError::SourceRead { .. }));
    assert!(target.calls.is_empty());
}

#[tokio::test]
async fn missing_identity_is_a_rolled_back_failure() {
    let source = creator_with_both_profiles();
    let mut target = FakeTarget::failing_on(FailOn::MissingIdentity);

    let err = replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .expect_err("missing identity should fail the run");

    assert!(err.is_identity_failure());
    assert_eq!(err.state(), RunState::RolledBack);
    assert_eq!(target.count(TargetCall::Rollback), 1);
    assert_eq!(target.count(TargetCall::UpsertProfile(Provider::Instagram)), 0);
}

#[tokio::test]
async fn commit_failure_rolls_back_and_reports() {
    let source = creator_with_both_profiles();
    let mut target = FakeTarget::failing_on(FailOn::Commit);

    let err = replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .expect_err("commit failure should fail the run");

    assert!(!err.is_identity_failure());
    assert_eq!(target.count(TargetCall::Commit), 1);
    assert_eq!(target.count(TargetCall::Rollback), 1);
    assert_eq!(target.committed, TargetRows::default());
}

#[tokio::test]
async fn begin_failure_reads_nothing_further() {
    let source = creator_with_both_profiles();
    let mut target = FakeTarget::failing_on(FailOn::Begin);

    let err = replicate(&source, &mut target, &ReplicationRequest::new(123))
        .await
        .expect_err("begin failure should fail the run");

    assert_eq!(err.state(), RunState::RolledBack);
    assert_eq!(source.calls(), vec![SourceCall::Feed(123)]);
    assert_eq!(target.count(TargetCall::Rollback), 1);
}
