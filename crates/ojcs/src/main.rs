//! The OJ Stats Cache Scheduler (OJCS)
//!
//! The scheduler is a service that runs alongside the statistics library. It refreshes
//! the statistics of active users every night, recomputes the per-platform rankings
//! periodically, and evicts the durable cache of long-inactive users every week.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use chrono::{NaiveTime, Utc, Weekday};
use mkenv::prelude::*;
use ojstats_lib::cache;
use ojstats_lib::fetch::OjClient;
use ojstats_lib::hybrid::HybridRankingService;
use ojstats_lib::lock::UpdateLocks;
use ojstats_lib::stats::OjStatsService;
use ojstats_lib::update::UpdateService;
use ojstats_lib::{Database, DbUrlEnv, LibEnv};
use tokio::{task::JoinHandle, time};
use tracing::info;

mod eviction;
mod ranking;
mod refresh;
mod schedule;

/// Runs `f` on every tick of a fixed interval, starting immediately. A failed run is
/// logged and the loop keeps ticking.
async fn every<F, Fut>(period: Duration, task_name: &'static str, f: F) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut interval = time::interval(period);

    loop {
        interval.tick().await;
        if let Err(e) = f().await {
            tracing::error!("{task_name} failed: {e:#}");
        }
    }
}

/// Runs `f` at every occurrence of a wall-clock time, restricted to a weekday if any.
/// A failed run is logged and the loop keeps waiting for the next occurrence.
async fn at_calendar<F, Fut>(
    weekday: Option<Weekday>,
    at: NaiveTime,
    task_name: &'static str,
    f: F,
) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    loop {
        let wait = schedule::duration_until_next(Utc::now().naive_utc(), weekday, at);
        info!("{task_name}: next run in {}s", wait.as_secs());
        time::sleep(wait).await;
        if let Err(e) = f().await {
            tracing::error!("{task_name} failed: {e:#}");
        }
    }
}

#[inline]
async fn join<O>(
    task: JoinHandle<anyhow::Result<O>>,
    join_ctx: &'static str,
    task_ctx: &'static str,
) -> anyhow::Result<O> {
    task.await.context(join_ctx)?.context(task_ctx)
}

fn setup_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .try_init()
        .map_err(|e| anyhow::format_err!("{e}"))
}

mkenv::make_config! {
    struct Env {
        db_env: { DbUrlEnv },
        lib_env: { LibEnv },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    setup_tracing()?;
    let env = Env::define();
    env.init();
    let db_url = env.db_env.db_url.get();
    let active_user_days = env.lib_env.active_user_days.get();
    let schedule_batch_size = env.lib_env.schedule_batch_size.get();
    let schedule_batch_pause = env.lib_env.schedule_batch_pause.get();
    let schedule_concurrency = env.lib_env.schedule_concurrency.get();
    let ranking_recompute_interval = env.lib_env.ranking_recompute_interval.get();
    let inactive_user_days = env.lib_env.inactive_user_days.get();
    ojstats_lib::init_env(env.lib_env);

    let db = Database::from_db_url(&db_url).await?;
    ojstats_lib::MIGRATOR
        .run(&db.mysql_pool)
        .await
        .context("When running the database migrations")?;

    let client = Arc::new(OjClient::from_env());
    let locks = Arc::new(UpdateLocks::from_env());
    let updater = Arc::new(UpdateService::from_env(db.clone(), locks));
    let stats = Arc::new(OjStatsService::from_env(
        db.clone(),
        client,
        cache::profile_cache_from_env(),
        updater,
    ));
    let hybrid = Arc::new(HybridRankingService::from_env(
        db.clone(),
        cache::ranking_cache_from_env(),
    ));

    let nightly_refresh_handle = tokio::spawn(at_calendar(
        None,
        NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        "nightly refresh",
        {
            let db = db.clone();
            let stats = Arc::clone(&stats);
            move || {
                refresh::run(
                    db.clone(),
                    Arc::clone(&stats),
                    active_user_days,
                    schedule_batch_size,
                    schedule_batch_pause,
                    schedule_concurrency,
                )
            }
        },
    ));

    let ranking_handle = tokio::spawn(every(
        ranking_recompute_interval,
        "ranking recompute",
        {
            let db = db.clone();
            let hybrid = Arc::clone(&hybrid);
            move || ranking::run(db.clone(), Arc::clone(&hybrid))
        },
    ));

    let eviction_handle = tokio::spawn(at_calendar(
        Some(Weekday::Sun),
        NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
        "weekly eviction",
        {
            let db = db.clone();
            move || eviction::run(db.clone(), inactive_user_days)
        },
    ));

    info!("Spawned all tasks");

    join(
        nightly_refresh_handle,
        "When joining the refresh::run task",
        "When refreshing active users",
    )
    .await?;

    join(
        ranking_handle,
        "When joining the ranking::run task",
        "When recomputing the rankings",
    )
    .await?;

    join(
        eviction_handle,
        "When joining the eviction::run task",
        "When evicting inactive users",
    )
    .await?;

    Ok(())
}
