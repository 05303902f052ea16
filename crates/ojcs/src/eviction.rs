//! The weekly eviction of the durable cache of inactive users.

use chrono::{TimeDelta, Utc};
use ojstats_lib::{Database, profile};

/// Clears the cached aggregates of every user inactive for more than `inactive_days`.
/// The username bindings are kept; only the cache tier of the row is evicted.
pub async fn run(db: Database, inactive_days: i64) -> anyhow::Result<()> {
    let before = Utc::now().naive_utc() - TimeDelta::days(inactive_days);
    let evicted = profile::clear_inactive_cache(&db.mysql_pool, before).await?;
    tracing::info!("weekly eviction done: {evicted} users inactive since {before} evicted");
    Ok(())
}
