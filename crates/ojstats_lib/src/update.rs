//! The async persistence writer: commits an aggregated snapshot to the `user_oj` row,
//! guarded by the per-user update lock, with retries and an escalating backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mkenv::prelude::*;

use crate::Database;
use crate::error::StatsResult;
use crate::lock::{UpdateLocks, update_lock_key};
use crate::models::{OjUserData, UserOj};
use crate::platform::Platform;
use crate::profile;

/// The amount of write attempts before a persistence cycle is reported failed.
const MAX_ATTEMPTS: u32 = 3;

/// The outcome of a persistence cycle.
///
/// Lock contention is an expected condition, not an error: a `Skipped` cycle means
/// another writer is already in flight for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The snapshot was committed.
    Done,
    /// Another writer holds the user's lock; nothing was written.
    Skipped,
    /// All the attempts failed, or the profile row no longer exists.
    Failed,
}

/// The persistence writer. Holds the database pool and the shared lock registry.
pub struct UpdateService {
    db: Database,
    locks: Arc<UpdateLocks>,
    retry_interval: Duration,
}

impl UpdateService {
    /// Creates a new writer with the provided backoff base interval.
    pub fn new(db: Database, locks: Arc<UpdateLocks>, retry_interval: Duration) -> Self {
        Self {
            db,
            locks,
            retry_interval,
        }
    }

    /// Creates a new writer from the global library environment.
    pub fn from_env(db: Database, locks: Arc<UpdateLocks>) -> Self {
        Self::new(db, locks, crate::env().update_retry_interval.get())
    }

    /// Commits an aggregated snapshot to the user's profile row.
    ///
    /// Acquires the per-user lock first; on contention, reports [`UpdateOutcome::Skipped`]
    /// without writing. Otherwise attempts up to 3 writes, each one re-reading the
    /// profile to confirm it still exists, then updating all the counters and the three
    /// timestamps atomically. The lock is released whatever the outcome.
    pub async fn persist_user_data(&self, user_id: u64, data: &OjUserData) -> UpdateOutcome {
        let lock_key = update_lock_key(user_id);
        if !self.locks.try_lock(&lock_key) {
            tracing::info!("user {user_id} is already being updated, skipping");
            return UpdateOutcome::Skipped;
        }

        let outcome = self.write_with_retries(user_id, data).await;
        self.locks.release(&lock_key);
        outcome
    }

    async fn write_with_retries(&self, user_id: u64, data: &OjUserData) -> UpdateOutcome {
        let written = with_retries(MAX_ATTEMPTS, self.retry_interval, |attempt| async move {
            let row: Option<UserOj> = profile::get_user_oj(&self.db.mysql_pool, user_id).await?;
            if row.is_none() {
                tracing::warn!("profile of user {user_id} no longer exists, dropping the update");
                return Ok(false);
            }
            if attempt > 1 {
                tracing::info!("retrying the update of user {user_id} (attempt {attempt})");
            }
            self.write_row(user_id, data).await?;
            Ok(true)
        })
        .await;

        match written {
            Ok(true) => UpdateOutcome::Done,
            Ok(false) => UpdateOutcome::Failed,
            Err(e) => {
                tracing::error!(
                    "update of user {user_id} failed after {MAX_ATTEMPTS} attempts: {e}"
                );
                UpdateOutcome::Failed
            }
        }
    }

    /// One atomic write of the per-platform counters, the aggregates, and the three
    /// timestamp fields.
    async fn write_row(&self, user_id: u64, data: &OjUserData) -> StatsResult {
        let now = Utc::now().naive_utc();

        // Platforms that returned no data are written back as zero, like the aggregates.
        let counters_of = |platform: Platform| {
            data.platforms
                .iter()
                .find(|d| d.platform == platform)
                .map(|d| (d.solved, d.submitted))
                .unwrap_or((0, 0))
        };
        let (luogu_ac, luogu_submit) = counters_of(Platform::Luogu);
        let (leetcode_ac, leetcode_submit) = counters_of(Platform::LeetcodeCn);
        let (nowcoder_ac, nowcoder_submit) = counters_of(Platform::Nowcoder);
        let (codeforces_ac, codeforces_submit) = counters_of(Platform::Codeforces);

        sqlx::query(
            "UPDATE user_oj SET \
                total_ac_num = ?, total_submit_num = ?, \
                luogu_ac_num = ?, luogu_submit_num = ?, \
                leetcode_ac_num = ?, leetcode_submit_num = ?, \
                nowcoder_ac_num = ?, nowcoder_submit_num = ?, \
                codeforces_ac_num = ?, codeforces_submit_num = ?, \
                cache_time = ?, last_access_time = ?, update_time = ? \
             WHERE user_id = ?",
        )
        .bind(data.total_ac)
        .bind(data.total_submit)
        .bind(luogu_ac)
        .bind(luogu_submit)
        .bind(leetcode_ac)
        .bind(leetcode_submit)
        .bind(nowcoder_ac)
        .bind(nowcoder_submit)
        .bind(codeforces_ac)
        .bind(codeforces_submit)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .execute(&self.db.mysql_pool)
        .await?;

        Ok(())
    }

    /// Updates the last access time of a profile, logging failures instead of
    /// propagating them.
    pub async fn touch_last_access(&self, user_id: u64) {
        let now = Utc::now().naive_utc();
        if let Err(e) = profile::touch_last_access(&self.db.mysql_pool, user_id, now).await {
            tracing::error!("couldn't update the access time of user {user_id}: {e}");
        }
    }

    /// Spawns a supervised persistence cycle. Failures are logged, never propagated
    /// to the caller.
    pub fn spawn_persist(self: &Arc<Self>, user_id: u64, data: OjUserData) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.persist_user_data(user_id, &data).await;
            tracing::debug!("background update of user {user_id}: {outcome:?}");
        });
    }

    /// Spawns a supervised access-time update.
    pub fn spawn_touch(self: &Arc<Self>, user_id: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.touch_last_access(user_id).await;
        });
    }
}

/// Runs `attempt_fn` up to `max_attempts` times, sleeping `attempt × base_interval`
/// between two attempts (escalating backoff).
///
/// An `Ok` stops the loop immediately; the last error is returned when every attempt
/// failed.
///
/// Each call of `attempt_fn` must return a future owning its state (no borrow of the
/// closure), so the whole walk stays spawnable from the background writer.
async fn with_retries<T, F>(
    max_attempts: u32,
    base_interval: Duration,
    mut attempt_fn: impl FnMut(u32) -> F,
) -> StatsResult<T>
where
    F: Future<Output = StatsResult<T>>,
{
    let mut attempt = 1;
    loop {
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                tracing::error!("attempt {attempt} failed: {e}");
                tokio::time::sleep(base_interval * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal;

    #[tokio::test]
    async fn retries_stop_on_first_success() {
        let mut calls = 0;
        let res = with_retries(3, Duration::from_millis(1), |attempt| {
            calls += 1;
            async move {
                if attempt < 3 {
                    Err(internal!("boom {attempt}"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(res.unwrap(), 3);
        // No 4th attempt after the success on the 3rd one.
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn retries_give_up_after_the_last_attempt() {
        let mut calls = 0;
        let res: StatsResult<()> = with_retries(3, Duration::from_millis(1), |_| {
            calls += 1;
            async { Err(internal!("boom")) }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn immediate_success_takes_one_attempt() {
        let mut calls = 0;
        let res = with_retries(3, Duration::from_millis(1), |_| {
            calls += 1;
            async { Ok(977) }
        })
        .await;
        assert_eq!(res.unwrap(), 977);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn background_persistence_is_spawnable() {
        // A lazy pool pointing at a closed port: every query errors without a server.
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .connect_lazy("mysql://oj:oj@127.0.0.1:9/oj")
            .unwrap();
        let db = Database { mysql_pool: pool };
        let locks = Arc::new(UpdateLocks::new(Duration::from_secs(60)));
        let updater = Arc::new(UpdateService::new(db, locks, Duration::from_millis(1)));

        updater.spawn_persist(1, OjUserData::empty());

        // An unreachable database exhausts the attempts and reports a failure.
        let outcome = updater.persist_user_data(2, &OjUserData::empty()).await;
        assert_eq!(outcome, UpdateOutcome::Failed);
    }
}
