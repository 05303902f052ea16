//! The nightly active-user refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::StreamExt;
use futures::stream;
use ojstats_lib::stats::OjStatsService;
use ojstats_lib::update::UpdateOutcome;
use ojstats_lib::{Database, profile};

/// Refreshes the statistics of every user active within the last `active_days`, in
/// batches of `batch_size` with a pause between batches. At most `concurrency` users
/// are refreshed at once, whatever the batch size.
///
/// A failed user is logged and does not stop the run.
pub async fn run(
    db: Database,
    stats: Arc<OjStatsService>,
    active_days: i64,
    batch_size: usize,
    batch_pause: Duration,
    concurrency: usize,
) -> anyhow::Result<()> {
    let since = Utc::now().naive_utc() - TimeDelta::days(active_days);
    let user_ids = profile::find_active_user_ids(&db.mysql_pool, since).await?;
    tracing::info!(
        "nightly refresh: {} users active since {since}",
        user_ids.len()
    );

    let mut refreshed = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    let mut batches = user_ids.chunks(batch_size.max(1)).peekable();
    while let Some(batch) = batches.next() {
        // Owned ids only, so the whole run stays spawnable as a scheduler task.
        let outcomes: Vec<_> = stream::iter(batch.to_vec())
            .map(|user_id| {
                let stats = Arc::clone(&stats);
                async move { (user_id, stats.refresh_user(user_id).await) }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        for (user_id, outcome) in outcomes {
            match outcome {
                Ok(UpdateOutcome::Done) => refreshed += 1,
                Ok(UpdateOutcome::Skipped) => skipped += 1,
                Ok(UpdateOutcome::Failed) => failed += 1,
                Err(e) => {
                    tracing::warn!("nightly refresh of user {user_id} failed: {e}");
                    failed += 1;
                }
            }
        }

        if batches.peek().is_some() {
            tokio::time::sleep(batch_pause).await;
        }
    }

    tracing::info!("nightly refresh done: {refreshed} refreshed, {skipped} skipped, {failed} failed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ojstats_lib::cache::profile_cache;
    use ojstats_lib::fetch::OjClient;
    use ojstats_lib::lock::UpdateLocks;
    use ojstats_lib::update::UpdateService;

    #[tokio::test]
    async fn refresh_run_is_spawnable() {
        // A lazy pool pointing at a closed port: every query errors without a server.
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .connect_lazy("mysql://oj:oj@127.0.0.1:9/oj")
            .unwrap();
        let db = Database { mysql_pool: pool };
        let client = Arc::new(OjClient::new(
            "http://127.0.0.1:9".to_owned(),
            Duration::from_millis(200),
            2,
        ));
        let locks = Arc::new(UpdateLocks::new(Duration::from_secs(60)));
        let updater = Arc::new(UpdateService::new(
            db.clone(),
            locks,
            Duration::from_millis(1),
        ));
        let stats = Arc::new(OjStatsService::new(
            db.clone(),
            client,
            profile_cache(16, Duration::from_secs(60)),
            updater,
            6,
        ));

        // The run future crosses a task boundary, like the scheduler loops do.
        let handle = tokio::spawn(run(db, stats, 7, 10, Duration::from_millis(1), 4));
        // Without a reachable database the run reports the error instead of hanging.
        assert!(handle.await.unwrap().is_err());
    }
}
