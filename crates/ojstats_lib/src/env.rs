use std::time::Duration;

use once_cell::sync::OnceCell;

#[cfg(debug_assertions)]
mkenv::make_config! {
    /// The environment used to set up a connection to the MySQL/MariaDB database.
    pub struct DbUrlEnv {
        /// The database URL.
        pub db_url: {
            var_name: "DATABASE_URL",
            description: "The URL to the MySQL/MariaDB database",
        }
    }
}
#[cfg(not(debug_assertions))]
mkenv::make_config! {
    /// The environment used to set up a connection to the MySQL/MariaDB database.
    pub struct DbUrlEnv {
        /// The path to the file containing the database URL.
        pub db_url: {
            var_name: "DATABASE_URL",
            layers: [
                file_read(),
            ],
            description: "The path to the file containing the URL to the MySQL/MariaDB database",
        }
    }
}

mkenv::make_config! {
    /// The environment used by this crate.
    pub struct LibEnv {
        /// The base URL of the upstream OJ statistics API.
        pub oj_api_url: {
            var_name: "OJ_STATS_API_URL",
            layers: [
                or_default_val(|| "https://ojhunt.com/api/crawlers".to_owned()),
            ],
            description: "The base URL of the upstream OJ statistics API",
            default_val_fmt: "https://ojhunt.com/api/crawlers",
        },

        /// The maximum amount of entries kept in each in-process cache.
        pub cache_max_size: {
            var_name: "OJ_STATS_CACHE_MAX_SIZE",
            layers: [
                parsed_from_str<u64>(),
                or_default_val(|| 10_000),
            ],
            description: "The maximum amount of entries kept in each in-process cache",
            default_val_fmt: "10,000",
        },

        /// The validity window of an aggregated profile, both in the in-process cache
        /// and in the durable `user_oj` row.
        pub cache_expire_hours: {
            var_name: "OJ_STATS_CACHE_EXPIRE_HOURS",
            layers: [
                parsed_from_str<i64>(),
                or_default_val(|| 6),
            ],
            description: "The validity window of a cached aggregated profile, in hours",
            default_val_fmt: "6",
        },

        /// The window within which a user counts as active for the nightly refresh.
        pub active_user_days: {
            var_name: "OJ_STATS_ACTIVE_USER_DAYS",
            layers: [
                parsed_from_str<i64>(),
                or_default_val(|| 7),
            ],
            description: "The last-access window within which a user counts as active, in days",
            default_val_fmt: "7",
        },

        /// The TTL of an update lock, equal to the maximum allowed refresh duration.
        pub async_update_timeout: {
            var_name: "OJ_STATS_ASYNC_UPDATE_TIMEOUT_SECONDS",
            layers: [
                parsed<Duration>(|input| {
                    input.parse().map(Duration::from_secs).map_err(From::from)
                }),
                or_default_val(|| Duration::from_secs(300)),
            ],
            description: "The TTL of a per-user update lock, in seconds",
            default_val_fmt: "5min",
        },

        /// The amount of users refreshed together during the nightly batch refresh.
        pub schedule_batch_size: {
            var_name: "OJ_STATS_SCHEDULE_BATCH_SIZE",
            layers: [
                parsed_from_str<usize>(),
                or_default_val(|| 50),
            ],
            description: "The amount of users refreshed together by the scheduler",
            default_val_fmt: "50",
        },

        /// The bound on concurrently refreshed users during the nightly refresh,
        /// independent of the batch size.
        pub schedule_concurrency: {
            var_name: "OJ_STATS_SCHEDULE_CONCURRENCY",
            layers: [
                parsed_from_str<usize>(),
                or_default_val(|| 4),
            ],
            description: "The bound on concurrently refreshed users during the nightly refresh",
            default_val_fmt: "4",
        },

        /// The pause between two batches of the nightly refresh.
        pub schedule_batch_pause: {
            var_name: "OJ_STATS_SCHEDULE_BATCH_PAUSE_SECONDS",
            layers: [
                parsed<Duration>(|input| {
                    input.parse().map(Duration::from_secs).map_err(From::from)
                }),
                or_default_val(|| Duration::from_secs(5)),
            ],
            description: "The pause between two batches of the nightly refresh, in seconds",
            default_val_fmt: "5s",
        },

        /// The validity window of a precomputed `user_platform_ranking` row.
        pub ranking_validity: {
            var_name: "OJ_STATS_RANKING_VALIDITY_MINUTES",
            layers: [
                parsed<Duration>(|input| {
                    input
                        .parse()
                        .map(|min: u64| Duration::from_secs(min * 60))
                        .map_err(From::from)
                }),
                or_default_val(|| Duration::from_secs(5 * 60)),
            ],
            description: "The validity window of a precomputed ranking row, in minutes",
            default_val_fmt: "5min",
        },

        /// The hard timeout of a single upstream platform call.
        pub fetch_timeout: {
            var_name: "OJ_STATS_FETCH_TIMEOUT_SECONDS",
            layers: [
                parsed<Duration>(|input| {
                    input.parse().map(Duration::from_secs).map_err(From::from)
                }),
                or_default_val(|| Duration::from_secs(10)),
            ],
            description: "The hard timeout of a single upstream platform call, in seconds",
            default_val_fmt: "10s",
        },

        /// The bound on concurrent upstream platform calls.
        pub fetch_concurrency: {
            var_name: "OJ_STATS_FETCH_CONCURRENCY",
            layers: [
                parsed_from_str<usize>(),
                or_default_val(|| 8),
            ],
            description: "The bound on concurrent upstream platform calls",
            default_val_fmt: "8",
        },

        /// The base interval of the escalating backoff used by the persistence writer.
        pub update_retry_interval: {
            var_name: "OJ_STATS_UPDATE_RETRY_INTERVAL_SECONDS",
            layers: [
                parsed<Duration>(|input| {
                    input.parse().map(Duration::from_secs).map_err(From::from)
                }),
                or_default_val(|| Duration::from_secs(1)),
            ],
            description: "The base interval of the persistence writer backoff, in seconds",
            default_val_fmt: "1s",
        },

        /// The size of the batches used when upserting ranking rows.
        pub ranking_upsert_batch: {
            var_name: "OJ_STATS_RANKING_UPSERT_BATCH",
            layers: [
                parsed_from_str<usize>(),
                or_default_val(|| 500),
            ],
            description: "The size of the batches used when upserting ranking rows",
            default_val_fmt: "500",
        },

        /// The interval of the full ranking recompute.
        pub ranking_recompute_interval: {
            var_name: "OJ_STATS_RANKING_RECOMPUTE_INTERVAL_SECONDS",
            layers: [
                parsed<Duration>(|input| {
                    input.parse().map(Duration::from_secs).map_err(From::from)
                }),
                or_default_val(|| Duration::from_secs(600)),
            ],
            description: "The interval of the full ranking recompute, in seconds",
            default_val_fmt: "10min",
        },

        /// The inactivity threshold of the weekly cache eviction.
        pub inactive_user_days: {
            var_name: "OJ_STATS_INACTIVE_USER_DAYS",
            layers: [
                parsed_from_str<i64>(),
                or_default_val(|| 30),
            ],
            description: "The inactivity threshold of the weekly cache eviction, in days",
            default_val_fmt: "30",
        },

        /// The write-TTL of the in-process ranking cache.
        pub ranking_l1_ttl: {
            var_name: "OJ_STATS_RANKING_L1_TTL_SECONDS",
            layers: [
                parsed<Duration>(|input| {
                    input.parse().map(Duration::from_secs).map_err(From::from)
                }),
                or_default_val(|| Duration::from_secs(120)),
            ],
            description: "The write-TTL of the in-process ranking cache, in seconds",
            default_val_fmt: "2min",
        },

        /// The access-refresh TTL of the in-process ranking cache.
        pub ranking_l1_tti: {
            var_name: "OJ_STATS_RANKING_L1_TTI_SECONDS",
            layers: [
                parsed<Duration>(|input| {
                    input.parse().map(Duration::from_secs).map_err(From::from)
                }),
                or_default_val(|| Duration::from_secs(300)),
            ],
            description: "The access-refresh TTL of the in-process ranking cache, in seconds",
            default_val_fmt: "5min",
        }
    }
}

static ENV: OnceCell<LibEnv> = OnceCell::new();

/// Initializes the provided library environment as global.
///
/// If this function has already been called, the provided environment will be ignored.
pub fn init_env(env: LibEnv) {
    let _ = ENV.set(env);
}

/// Returns a static reference to the global library environment.
///
/// **Caution**: To use this function, the [`init_env()`] function must have been called at the start
/// of the program.
pub fn env() -> &'static LibEnv {
    ENV.get().unwrap()
}
