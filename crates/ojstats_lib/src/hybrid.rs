//! The hybrid ranking read path: "my rank on platform X" through three tiers,
//! L1 in-process cache → L2 precomputed `user_platform_ranking` row → L3 single-user
//! real-time computation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta, Utc};
use mkenv::prelude::*;

use crate::Database;
use crate::MySqlPool;
use crate::cache::RankingCache;
use crate::error::{StatsError, StatsResult};
use crate::models::{PlatformRankingInfo, UserPlatformRanking};
use crate::platform::Platform;
use crate::profile;
use crate::ranking::round2;

/// The hybrid ranking read path service.
pub struct HybridRankingService {
    db: Database,
    cache: RankingCache,
    validity: Duration,
}

/// Returns whether a precomputed ranking row is still within its validity window.
pub fn ranking_row_valid(
    row: &UserPlatformRanking,
    validity: Duration,
    now: NaiveDateTime,
) -> bool {
    match TimeDelta::from_std(validity) {
        Ok(window) => now < row.last_calc_time + window,
        Err(_) => false,
    }
}

/// Fetches the precomputed ranking row of a user on a platform, if any.
pub async fn get_ranking_row(
    pool: &MySqlPool,
    user_id: u64,
    platform: Platform,
) -> StatsResult<Option<UserPlatformRanking>> {
    sqlx::query_as("SELECT * FROM user_platform_ranking WHERE user_id = ? AND platform_id = ?")
        .bind(user_id)
        .bind(platform.id())
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
}

/// Upserts the ranking row of a single user, keyed on `(user_id, platform_id)`.
pub async fn upsert_ranking_row(pool: &MySqlPool, row: &UserPlatformRanking) -> StatsResult {
    sqlx::query(
        "INSERT INTO user_platform_ranking (\
            user_id, platform_id, platform_name, username, ranking, \
            ac_count, submit_count, total_users, ranking_percentage, last_calc_time\
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON DUPLICATE KEY UPDATE \
            platform_name = VALUES(platform_name), \
            username = VALUES(username), \
            ranking = VALUES(ranking), \
            ac_count = VALUES(ac_count), \
            submit_count = VALUES(submit_count), \
            total_users = VALUES(total_users), \
            ranking_percentage = VALUES(ranking_percentage), \
            last_calc_time = VALUES(last_calc_time)",
    )
    .bind(row.user_id)
    .bind(&row.platform_id)
    .bind(&row.platform_name)
    .bind(&row.username)
    .bind(row.ranking)
    .bind(row.ac_count)
    .bind(row.submit_count)
    .bind(row.total_users)
    .bind(row.ranking_percentage)
    .bind(row.last_calc_time)
    .execute(pool)
    .await?;
    Ok(())
}

/// Counts the users who strictly rank better on a platform: higher AC count, or the
/// same AC count with fewer submissions.
async fn count_better_users(
    pool: &MySqlPool,
    platform: Platform,
    ac_count: i32,
    submit_count: i32,
) -> StatsResult<i64> {
    let (username, ac, submit) = (
        platform.username_col(),
        platform.ac_col(),
        platform.submit_col(),
    );
    let q = format!(
        "SELECT COUNT(*) FROM user_oj \
         WHERE {username} IS NOT NULL AND {username} != '' \
           AND ({ac} > ? OR ({ac} = ? AND {submit} < ?))"
    );

    sqlx::query_scalar(&q)
        .bind(ac_count)
        .bind(ac_count)
        .bind(submit_count)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

/// Counts the users with data on a platform.
async fn count_platform_users(pool: &MySqlPool, platform: Platform) -> StatsResult<i64> {
    let username = platform.username_col();
    let q = format!("SELECT COUNT(*) FROM user_oj WHERE {username} IS NOT NULL AND {username} != ''");

    sqlx::query_scalar(&q).fetch_one(pool).await.map_err(Into::into)
}

impl HybridRankingService {
    /// Creates a new read path service with the provided L2 validity window.
    pub fn new(db: Database, cache: RankingCache, validity: Duration) -> Self {
        Self {
            db,
            cache,
            validity,
        }
    }

    /// Creates a new read path service from the global library environment.
    pub fn from_env(db: Database, cache: RankingCache) -> Self {
        let validity = crate::env().ranking_validity.get();
        Self::new(db, cache, validity)
    }

    /// Returns the rank of a user on a platform, through the cache tiers.
    ///
    /// An unknown platform id or an unbound account surfaces as an error; everything
    /// else resolves to a (possibly freshly computed) ranking.
    pub async fn get_user_platform_ranking(
        &self,
        platform_id: &str,
        user_id: u64,
    ) -> StatsResult<Arc<PlatformRankingInfo>> {
        let platform = Platform::try_from_id(platform_id)?;

        if let Some(cached) = self.cache.get(&(platform, user_id)).await {
            tracing::info!("user {user_id}: {platform} ranking L1 hit");
            return Ok(cached);
        }

        if let Some(row) = get_ranking_row(&self.db.mysql_pool, user_id, platform).await? {
            if ranking_row_valid(&row, self.validity, Utc::now().naive_utc()) {
                if let Some(info) = PlatformRankingInfo::from_row(&row) {
                    tracing::info!("user {user_id}: {platform} ranking L2 hit");
                    let info = Arc::new(info);
                    self.cache.insert((platform, user_id), Arc::clone(&info)).await;
                    return Ok(info);
                }
            }
        }

        tracing::info!("user {user_id}: {platform} ranking caches stale, computing");
        let info = Arc::new(self.compute_real_time(platform, user_id).await?);
        self.spawn_upsert(&info, user_id);
        self.cache.insert((platform, user_id), Arc::clone(&info)).await;
        Ok(info)
    }

    /// Recomputes the rank of a user in real time and repopulates both cache tiers.
    /// Used after a binding update invalidates the precomputed row.
    pub async fn refresh_platform_ranking(
        &self,
        platform_id: &str,
        user_id: u64,
    ) -> StatsResult<Arc<PlatformRankingInfo>> {
        let platform = Platform::try_from_id(platform_id)?;
        let info = Arc::new(self.compute_real_time(platform, user_id).await?);
        self.spawn_upsert(&info, user_id);
        self.cache.insert((platform, user_id), Arc::clone(&info)).await;
        Ok(info)
    }

    /// Invalidates the whole L1 ranking cache, forcing subsequent reads to repopulate
    /// from the freshly recomputed L2 rows.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        tracing::info!("ranking L1 cache invalidated");
    }

    /// The L3 fallback: ranks a single user against the platform population, with the
    /// same rule as the batch engine ("better AC, or equal AC with fewer submissions").
    async fn compute_real_time(
        &self,
        platform: Platform,
        user_id: u64,
    ) -> StatsResult<PlatformRankingInfo> {
        tracing::warn!("real-time {platform} ranking computation for user {user_id}");

        let row = profile::get_user_oj(&self.db.mysql_pool, user_id)
            .await?
            .ok_or(StatsError::ProfileNotFound(user_id))?;

        let username = row
            .binding(platform)
            .ok_or(StatsError::PlatformNotBound { user_id, platform })?
            .to_owned();
        let (ac_count, submit_count) = row.counters(platform);

        let ranking =
            count_better_users(&self.db.mysql_pool, platform, ac_count, submit_count).await? + 1;
        let total_users = count_platform_users(&self.db.mysql_pool, platform).await?;

        let ranking_percentage = if total_users > 0 {
            round2(ranking as f64 / total_users as f64 * 100.0)
        } else {
            0.0
        };

        Ok(PlatformRankingInfo {
            platform,
            platform_name: platform.display_name().to_owned(),
            username,
            ranking: ranking as i32,
            ac_count,
            submit_count,
            total_users: total_users as i32,
            ranking_percentage,
        })
    }

    /// Spawns a supervised upsert of the computed row into L2. The caller never waits
    /// on it.
    fn spawn_upsert(&self, info: &Arc<PlatformRankingInfo>, user_id: u64) {
        let pool = self.db.mysql_pool.clone();
        let row = UserPlatformRanking {
            user_id,
            platform_id: info.platform.id().to_owned(),
            platform_name: info.platform_name.clone(),
            username: info.username.clone(),
            ranking: info.ranking,
            ac_count: info.ac_count,
            submit_count: info.submit_count,
            total_users: info.total_users,
            ranking_percentage: info.ranking_percentage,
            last_calc_time: Utc::now().naive_utc(),
        };
        tokio::spawn(async move {
            if let Err(e) = upsert_ranking_row(&pool, &row).await {
                tracing::error!(
                    "couldn't upsert the {} ranking of user {user_id}: {e}",
                    row.platform_id
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(age_secs: i64) -> UserPlatformRanking {
        UserPlatformRanking {
            user_id: 1,
            platform_id: "luogu".to_owned(),
            platform_name: "Luogu".to_owned(),
            username: "alice".to_owned(),
            ranking: 3,
            ac_count: 8,
            submit_count: 9,
            total_users: 5,
            ranking_percentage: 60.0,
            last_calc_time: Utc::now().naive_utc() - TimeDelta::seconds(age_secs),
        }
    }

    #[test]
    fn row_within_the_window_is_valid() {
        let now = Utc::now().naive_utc();
        assert!(ranking_row_valid(&row(60), Duration::from_secs(300), now));
    }

    #[test]
    fn row_past_the_window_is_stale() {
        let now = Utc::now().naive_utc();
        assert!(!ranking_row_valid(&row(301), Duration::from_secs(300), now));
    }

    #[test]
    fn row_conversion_keeps_the_stored_values() {
        let info = PlatformRankingInfo::from_row(&row(0)).unwrap();
        assert_eq!(info.platform, Platform::Luogu);
        assert_eq!(info.ranking, 3);
        assert_eq!(info.ranking_percentage, 60.0);
    }
}
