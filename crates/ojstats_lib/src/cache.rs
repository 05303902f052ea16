//! The in-process (L1) caches of the read paths.
//!
//! Both caches are explicit objects with a documented lifecycle: they are built once
//! at service startup and injected into the components that need them. The durable
//! store stays the authoritative source; every entry here can be rebuilt from it.

use std::sync::Arc;
use std::time::Duration;

use mkenv::prelude::*;

use crate::models::{OjUserData, PlatformRankingInfo};
use crate::platform::Platform;

/// The L1 cache of the profile read path, keyed by user id.
///
/// Entries expire a fixed amount of hours after write, matching the validity rule of
/// the durable `user_oj` cache tier.
pub type ProfileCache = moka::future::Cache<u64, Arc<OjUserData>>;

/// The L1 cache of the hybrid ranking read path, keyed by `(platform, user)`.
///
/// Entries carry a short write-TTL plus an access-refresh TTL, and the whole cache is
/// invalidated after each full ranking recompute.
pub type RankingCache = moka::future::Cache<(Platform, u64), Arc<PlatformRankingInfo>>;

/// Builds the profile L1 cache.
pub fn profile_cache(max_capacity: u64, ttl: Duration) -> ProfileCache {
    moka::future::Cache::builder()
        .max_capacity(max_capacity)
        .time_to_live(ttl)
        .build()
}

/// Builds the profile L1 cache from the global library environment.
pub fn profile_cache_from_env() -> ProfileCache {
    let env = crate::env();
    profile_cache(
        env.cache_max_size.get(),
        Duration::from_secs(env.cache_expire_hours.get().max(0) as u64 * 3600),
    )
}

/// Builds the ranking L1 cache.
pub fn ranking_cache(max_capacity: u64, ttl: Duration, tti: Duration) -> RankingCache {
    moka::future::Cache::builder()
        .max_capacity(max_capacity)
        .time_to_live(ttl)
        .time_to_idle(tti)
        .build()
}

/// Builds the ranking L1 cache from the global library environment.
pub fn ranking_cache_from_env() -> RankingCache {
    let env = crate::env();
    ranking_cache(
        env.cache_max_size.get(),
        env.ranking_l1_ttl.get(),
        env.ranking_l1_tti.get(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn profile_entries_expire_after_write() {
        let cache = profile_cache(16, Duration::from_millis(30));
        cache.insert(1, Arc::new(OjUserData::empty())).await;
        assert!(cache.get(&1).await.is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get(&1).await.is_none());
    }

    #[tokio::test]
    async fn ranking_cache_invalidation_empties_every_key() {
        let cache = ranking_cache(16, Duration::from_secs(60), Duration::from_secs(60));
        let info = Arc::new(PlatformRankingInfo {
            platform: Platform::Luogu,
            platform_name: Platform::Luogu.display_name().to_owned(),
            username: "alice".to_owned(),
            ranking: 1,
            ac_count: 10,
            submit_count: 20,
            total_users: 5,
            ranking_percentage: 20.0,
        });
        cache.insert((Platform::Luogu, 1), Arc::clone(&info)).await;
        cache.insert((Platform::Codeforces, 2), info).await;

        cache.invalidate_all();
        // moka applies invalidation lazily; a read after sync must miss.
        cache.run_pending_tasks().await;
        assert!(cache.get(&(Platform::Luogu, 1)).await.is_none());
        assert!(cache.get(&(Platform::Codeforces, 2)).await.is_none());
    }
}
