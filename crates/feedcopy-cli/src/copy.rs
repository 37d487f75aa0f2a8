//! `feedcopy copy`: wires the two pools to the replicator and prints the
//! outcome.

use anyhow::Context;
use clap::Args;
use feedcopy_core::{AppConfig, Provider, ProviderSelection};
use feedcopy_db::{PgFeedSource, PgFeedTarget, PoolConfig};
use feedcopy_replicator::{replicate, ReplicationOutcome, ReplicationRequest};

#[derive(Debug, Args)]
pub(crate) struct CopyArgs {
    /// Feed ID to copy from the source database
    #[arg(value_parser = clap::value_parser!(i64).range(1..))]
    pub feed_id: i64,

    /// Comma-separated providers to copy (instagram,tiktok); all when omitted
    #[arg(long, value_parser = parse_selection)]
    pub only: Option<ProviderSelection>,

    /// Number of most recent posts to copy
    #[arg(long, default_value_t = 0)]
    pub include_posts: u32,

    /// Print the outcome as JSON instead of a summary line
    #[arg(long)]
    pub json: bool,
}

impl CopyArgs {
    pub(crate) fn request(&self) -> ReplicationRequest {
        ReplicationRequest::new(self.feed_id)
            .with_selection(self.only.clone().unwrap_or_default())
            .with_post_limit(self.include_posts)
    }
}

fn parse_selection(raw: &str) -> Result<ProviderSelection, String> {
    ProviderSelection::parse_list(raw).map_err(|e| e.to_string())
}

/// Copy a single feed from the source database into the target database.
///
/// # Errors
///
/// Returns an error if either database is unreachable, the feed does not
/// exist on the source, or the copy fails and is rolled back.
pub(crate) async fn run_copy(config: &AppConfig, args: &CopyArgs) -> anyhow::Result<()> {
    let pool_config = PoolConfig::from_app_config(config);

    let source_pool = feedcopy_db::connect_read_only_pool(&config.source_database_url, pool_config)
        .await
        .context("failed to connect to source database")?;
    let target_pool = feedcopy_db::connect_pool(&config.target_database_url, pool_config)
        .await
        .context("failed to connect to target database")?;

    let source = PgFeedSource::new(source_pool);
    let mut target = PgFeedTarget::new(target_pool);

    let outcome = replicate(&source, &mut target, &args.request()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        for line in summary_lines(&outcome) {
            println!("{line}");
        }
    }

    Ok(())
}

fn join_providers<'a, I>(providers: I) -> String
where
    I: IntoIterator<Item = &'a Provider>,
{
    providers
        .into_iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Human-readable summary of a committed run.
pub(crate) fn summary_lines(outcome: &ReplicationOutcome) -> Vec<String> {
    let providers = if outcome.copied.is_empty() {
        "none".to_string()
    } else {
        join_providers(&outcome.copied)
    };

    let mut lines = vec![format!(
        "Copied feed {} to local feed {}. Sources: [{}]. Posts: {} ({} new).",
        outcome.source_feed_id,
        outcome.target_feed_id,
        providers,
        outcome.posts_copied,
        outcome.posts_inserted,
    )];

    if let Some(available) = &outcome.available_not_copied {
        lines.push(format!(
            "Other sources available but not copied: {}",
            join_providers(available)
        ));
    }

    lines
}
