//! `feedcopy db` handlers.

use anyhow::Context;
use feedcopy_core::AppConfig;
use feedcopy_db::PoolConfig;

/// Ping both databases. The source is opened read-only, as for a copy.
pub(crate) async fn run_ping(config: &AppConfig) -> anyhow::Result<()> {
    let pool_config = PoolConfig::from_app_config(config);

    let source = feedcopy_db::connect_read_only_pool(&config.source_database_url, pool_config)
        .await
        .context("failed to connect to source database")?;
    feedcopy_db::ping(&source)
        .await
        .context("source database ping failed")?;
    println!("source: ok");

    let target = feedcopy_db::connect_pool(&config.target_database_url, pool_config)
        .await
        .context("failed to connect to target database")?;
    feedcopy_db::ping(&target)
        .await
        .context("target database ping failed")?;
    println!("target: ok");

    Ok(())
}

/// Apply pending migrations to the target database only.
pub(crate) async fn run_migrate(config: &AppConfig) -> anyhow::Result<()> {
    let pool_config = PoolConfig::from_app_config(config);
    let target = feedcopy_db::connect_pool(&config.target_database_url, pool_config)
        .await
        .context("failed to connect to target database")?;

    let applied = feedcopy_db::run_migrations(&target)
        .await
        .context("target migrations failed")?;
    tracing::info!(applied, "target migrations complete");
    println!("applied {applied} migration(s) to target database");

    Ok(())
}
