//! The tiered read path of the aggregated profile:
//! L1 in-process cache → L2 durable `user_oj` row → L3 live fetch.

use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta, Utc};
use mkenv::prelude::*;

use crate::Database;
use crate::cache::ProfileCache;
use crate::error::StatsResult;
use crate::fetch::{OjClient, UserDataSource};
use crate::models::{OjUserData, UserOj};
use crate::profile;
use crate::update::UpdateService;

/// The profile read path service.
///
/// Reads never raise for degraded underlying data: they always resolve to a
/// structured (possibly stale or zero-valued) aggregate. The live tier is any
/// [`UserDataSource`], the upstream API client in production.
pub struct OjStatsService<C = OjClient> {
    db: Database,
    client: Arc<C>,
    cache: ProfileCache,
    updater: Arc<UpdateService>,
    expire_hours: i64,
}

/// Returns whether the durable cache tier of a profile row is still valid: the cache
/// timestamp and both aggregates must be present, and the expiry window not elapsed.
pub fn db_cache_valid(row: &UserOj, expire_hours: i64, now: NaiveDateTime) -> bool {
    match (row.cache_time, row.total_ac_num, row.total_submit_num) {
        (Some(cache_time), Some(_), Some(_)) => {
            now < cache_time + TimeDelta::hours(expire_hours)
        }
        _ => false,
    }
}

impl OjStatsService {
    /// Creates a new read path service from the global library environment.
    pub fn from_env(
        db: Database,
        client: Arc<OjClient>,
        cache: ProfileCache,
        updater: Arc<UpdateService>,
    ) -> Self {
        let expire_hours = crate::env().cache_expire_hours.get();
        Self::new(db, client, cache, updater, expire_hours)
    }
}

impl<C: UserDataSource> OjStatsService<C> {
    /// Creates a new read path service over the provided tiers.
    pub fn new(
        db: Database,
        client: Arc<C>,
        cache: ProfileCache,
        updater: Arc<UpdateService>,
        expire_hours: i64,
    ) -> Self {
        Self {
            db,
            client,
            cache,
            updater,
            expire_hours,
        }
    }

    /// Returns the aggregated OJ statistics of a user, through the cache tiers.
    ///
    /// 1. L1 hit: returned as-is, the access time is touched in the background.
    /// 2. L2 hit (row present, counters present, within the expiry window): the
    ///    aggregate is rebuilt from the stored counters and backfilled into L1.
    /// 3. Otherwise: live fetch, returned immediately; L1 is populated and the
    ///    persistence writer is spawned in the background.
    ///
    /// A missing profile row resolves to the zero-valued aggregate, not an error.
    pub async fn get_user_data(&self, user_id: u64) -> Arc<OjUserData> {
        if let Some(cached) = self.cache.get(&user_id).await {
            tracing::info!("user {user_id}: L1 cache hit");
            self.updater.spawn_touch(user_id);
            return cached;
        }

        match self.read_lower_tiers(user_id).await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("couldn't read the OJ data of user {user_id}: {e}");
                Arc::new(OjUserData::empty())
            }
        }
    }

    async fn read_lower_tiers(&self, user_id: u64) -> StatsResult<Arc<OjUserData>> {
        let Some(row) = profile::get_user_oj(&self.db.mysql_pool, user_id).await? else {
            tracing::warn!("user {user_id} has no OJ profile row");
            return Ok(Arc::new(OjUserData::empty()));
        };

        if db_cache_valid(&row, self.expire_hours, Utc::now().naive_utc()) {
            tracing::info!("user {user_id}: database cache hit");
            let data = Arc::new(OjUserData::from_cached_row(&row));
            self.cache.insert(user_id, Arc::clone(&data)).await;
            self.updater.spawn_touch(user_id);
            return Ok(data);
        }

        tracing::info!("user {user_id}: caches invalid, fetching live data");
        Ok(self.fetch_live(row).await)
    }

    /// Bypasses both cache tiers: fetches live data, refreshes L1 and spawns the
    /// persistence writer. Reserved to internal callers (the read path fallback and
    /// the binding-update flows of the surrounding service).
    pub async fn fetch_real_time(&self, user_id: u64) -> Arc<OjUserData> {
        match profile::get_user_oj(&self.db.mysql_pool, user_id).await {
            Ok(Some(row)) => self.fetch_live(row).await,
            Ok(None) => {
                tracing::warn!("user {user_id} has no OJ profile row");
                Arc::new(OjUserData::empty())
            }
            Err(e) => {
                tracing::error!("couldn't read the profile of user {user_id}: {e}");
                Arc::new(OjUserData::empty())
            }
        }
    }

    async fn fetch_live(&self, row: UserOj) -> Arc<OjUserData> {
        let user_id = row.user_id;
        let bindings = row.bound_platforms();
        if bindings.is_empty() {
            tracing::warn!("user {user_id} has no OJ account bound");
            return Arc::new(OjUserData::empty());
        }

        let data = Arc::new(self.client.fetch_user_data(&bindings).await);
        self.cache.insert(user_id, Arc::clone(&data)).await;
        self.updater.spawn_persist(user_id, (*data).clone());
        data
    }

    /// Refreshes a user synchronously: live fetch, L1 refresh, then an *awaited*
    /// persistence cycle. Used by the scheduler so that a batch joins on its writes.
    pub async fn refresh_user(&self, user_id: u64) -> StatsResult<crate::update::UpdateOutcome> {
        let Some(row) = profile::get_user_oj(&self.db.mysql_pool, user_id).await? else {
            return Err(crate::error::StatsError::ProfileNotFound(user_id));
        };

        let bindings = row.bound_platforms();
        if bindings.is_empty() {
            return Ok(crate::update::UpdateOutcome::Skipped);
        }

        let data = Arc::new(self.client.fetch_user_data(&bindings).await);
        self.cache.insert(user_id, Arc::clone(&data)).await;
        Ok(self.updater.persist_user_data(user_id, &data).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::cache::profile_cache;
    use crate::lock::UpdateLocks;
    use crate::models::PlatformData;
    use crate::platform::Platform;
    use chrono::TimeDelta;

    fn cached_row(cache_age_hours: i64) -> UserOj {
        UserOj {
            user_id: 1,
            luogu_username: Some("alice".to_owned()),
            luogu_ac_num: Some(25),
            luogu_submit_num: Some(50),
            total_ac_num: Some(25),
            total_submit_num: Some(50),
            cache_time: Some(Utc::now().naive_utc() - TimeDelta::hours(cache_age_hours)),
            ..Default::default()
        }
    }

    #[test]
    fn fresh_row_is_valid() {
        let now = Utc::now().naive_utc();
        assert!(db_cache_valid(&cached_row(1), 6, now));
    }

    #[test]
    fn expired_row_is_invalid() {
        let now = Utc::now().naive_utc();
        assert!(!db_cache_valid(&cached_row(7), 6, now));
    }

    #[test]
    fn row_without_totals_is_invalid() {
        let now = Utc::now().naive_utc();
        let mut row = cached_row(1);
        row.total_ac_num = None;
        assert!(!db_cache_valid(&row, 6, now));

        let mut row = cached_row(1);
        row.cache_time = None;
        assert!(!db_cache_valid(&row, 6, now));
    }

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicU32,
    }

    impl UserDataSource for CountingSource {
        async fn fetch_user_data(&self, _bindings: &[(Platform, String)]) -> OjUserData {
            self.calls.fetch_add(1, Ordering::SeqCst);
            OjUserData::from_results([PlatformData {
                platform: Platform::Luogu,
                solved: 25,
                submitted: 50,
            }])
        }
    }

    fn counting_service(source: Arc<CountingSource>) -> OjStatsService<CountingSource> {
        // A lazy pool pointing at a closed port: every query errors without a server.
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .connect_lazy("mysql://oj:oj@127.0.0.1:9/oj")
            .unwrap();
        let db = Database { mysql_pool: pool };
        let locks = Arc::new(UpdateLocks::new(Duration::from_secs(60)));
        let updater = Arc::new(UpdateService::new(
            db.clone(),
            locks,
            Duration::from_millis(1),
        ));
        OjStatsService::new(
            db,
            source,
            profile_cache(16, Duration::from_secs(60)),
            updater,
            6,
        )
    }

    #[tokio::test]
    async fn reads_within_the_cache_window_fetch_at_most_once() {
        let source = Arc::new(CountingSource::default());
        let service = counting_service(Arc::clone(&source));

        let row = UserOj {
            user_id: 7,
            luogu_username: Some("alice".to_owned()),
            ..Default::default()
        };
        let first = service.fetch_live(row).await;
        let second = service.get_user_data(7).await;

        // The second read is an L1 hit: one live fetch, identical aggregates.
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
