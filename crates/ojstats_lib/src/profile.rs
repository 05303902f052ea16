//! Row-level queries on the `user_oj` table.

use chrono::NaiveDateTime;

use crate::MySqlPool;
use crate::error::StatsResult;
use crate::models::UserOj;

/// Fetches the OJ profile of a user, if any.
pub async fn get_user_oj(pool: &MySqlPool, user_id: u64) -> StatsResult<Option<UserOj>> {
    sqlx::query_as("SELECT * FROM user_oj WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
}

/// Inserts an empty profile row for a freshly-created user account.
///
/// The bindings and counters all start NULL; the row is never deleted independently
/// of the account.
pub async fn insert_empty_profile(pool: &MySqlPool, user_id: u64) -> StatsResult<bool> {
    let res = sqlx::query("INSERT IGNORE INTO user_oj (user_id) VALUES (?)")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Updates the last access time of a profile.
pub async fn touch_last_access(
    pool: &MySqlPool,
    user_id: u64,
    at: NaiveDateTime,
) -> StatsResult {
    sqlx::query("UPDATE user_oj SET last_access_time = ? WHERE user_id = ?")
        .bind(at)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Returns the ids of the users whose last access is at or after the provided date.
pub async fn find_active_user_ids(
    pool: &MySqlPool,
    active_since: NaiveDateTime,
) -> StatsResult<Vec<u64>> {
    sqlx::query_scalar("SELECT user_id FROM user_oj WHERE last_access_time >= ?")
        .bind(active_since)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
}

/// Soft-resets the cached counters of the users inactive since before the provided
/// date: the aggregates and `cache_time` are nulled, the row and bindings persist.
///
/// Returns the amount of evicted profiles.
pub async fn clear_inactive_cache(
    pool: &MySqlPool,
    inactive_before: NaiveDateTime,
) -> StatsResult<u64> {
    let res = sqlx::query(
        "UPDATE user_oj SET total_ac_num = NULL, total_submit_num = NULL, cache_time = NULL \
         WHERE last_access_time < ?",
    )
    .bind(inactive_before)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}
