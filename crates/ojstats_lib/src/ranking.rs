//! The batch ranking engine: per-platform computation of tie-aware competition ranks,
//! upserted into the `user_platform_ranking` cache table.

use chrono::{NaiveDateTime, Utc};
use itertools::Itertools as _;
use mkenv::prelude::*;

use crate::Database;
use crate::MySqlPool;
use crate::error::StatsResult;
use crate::models::UserPlatformRanking;
use crate::platform::Platform;

/// The per-user input row of a platform ranking computation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlatformUserRow {
    /// The user id.
    pub user_id: u64,
    /// The username bound on the platform.
    pub username: String,
    /// The AC count on the platform.
    pub ac_count: i32,
    /// The submit count on the platform.
    pub submit_count: i32,
}

/// Rounds to 2 decimals, half-up (e.g. `33.333…` → `33.33`, `66.666…` → `66.67`).
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0 + 0.5).floor() / 100.0
}

/// Computes the competition ranks of a pre-sorted user sequence.
///
/// The input must be sorted by `(AC count descending, submit count ascending)` —
/// this ordering *is* the ranking rule. The rank jumps to `index + 1` only when the
/// `(AC, submit)` pair differs from the previous record, which yields standard
/// competition ranking with gaps after ties (1, 1, 3, 4).
///
/// Rerunning with identical input yields identical rows, so a recompute is idempotent.
pub fn compute_rankings(
    platform: Platform,
    users: &[PlatformUserRow],
    calc_time: NaiveDateTime,
) -> Vec<UserPlatformRanking> {
    let total_users = users.len() as i32;
    let mut rankings = Vec::with_capacity(users.len());

    let mut current_rank = 1;
    let mut last_key: Option<(i32, i32)> = None;

    for (i, user) in users.iter().enumerate() {
        let key = (user.ac_count, user.submit_count);
        if last_key.is_some_and(|last| last != key) {
            current_rank = i as i32 + 1;
        }
        last_key = Some(key);

        let percentage = round2(current_rank as f64 / total_users as f64 * 100.0);

        rankings.push(UserPlatformRanking {
            user_id: user.user_id,
            platform_id: platform.id().to_owned(),
            platform_name: platform.display_name().to_owned(),
            username: user.username.clone(),
            ranking: current_rank,
            ac_count: user.ac_count,
            submit_count: user.submit_count,
            total_users,
            ranking_percentage: percentage,
            last_calc_time: calc_time,
        });
    }

    rankings
}

/// Fetches the users with data on the provided platform, ordered by the ranking rule.
///
/// The final `user_id` sort key makes the order of equal `(AC, submit)` pairs
/// deterministic, which the tie-break walk of [`compute_rankings`] relies on.
pub async fn platform_users_ordered(
    pool: &MySqlPool,
    platform: Platform,
) -> StatsResult<Vec<PlatformUserRow>> {
    let (username, ac, submit) = (
        platform.username_col(),
        platform.ac_col(),
        platform.submit_col(),
    );

    let q = format!(
        "SELECT user_id, {username} AS username, \
            COALESCE({ac}, 0) AS ac_count, COALESCE({submit}, 0) AS submit_count \
         FROM user_oj \
         WHERE {username} IS NOT NULL AND {username} != '' AND {ac} IS NOT NULL \
         ORDER BY {ac} DESC, {submit} ASC, user_id ASC"
    );

    sqlx::query_as(&q).fetch_all(pool).await.map_err(Into::into)
}

/// Upserts ranking rows in one statement, keyed on `(user_id, platform_id)`.
async fn upsert_ranking_batch(pool: &MySqlPool, batch: &[UserPlatformRanking]) -> StatsResult {
    if batch.is_empty() {
        return Ok(());
    }

    let values = std::iter::repeat_n("(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)", batch.len()).join(", ");
    let q = format!(
        "INSERT INTO user_platform_ranking (\
            user_id, platform_id, platform_name, username, ranking, \
            ac_count, submit_count, total_users, ranking_percentage, last_calc_time\
         ) VALUES {values} \
         ON DUPLICATE KEY UPDATE \
            platform_name = VALUES(platform_name), \
            username = VALUES(username), \
            ranking = VALUES(ranking), \
            ac_count = VALUES(ac_count), \
            submit_count = VALUES(submit_count), \
            total_users = VALUES(total_users), \
            ranking_percentage = VALUES(ranking_percentage), \
            last_calc_time = VALUES(last_calc_time)"
    );

    let mut query = sqlx::query(&q);
    for row in batch {
        query = query
            .bind(row.user_id)
            .bind(&row.platform_id)
            .bind(&row.platform_name)
            .bind(&row.username)
            .bind(row.ranking)
            .bind(row.ac_count)
            .bind(row.submit_count)
            .bind(row.total_users)
            .bind(row.ranking_percentage)
            .bind(row.last_calc_time);
    }
    query.execute(pool).await?;

    Ok(())
}

/// Recomputes the rankings of a single platform and upserts them in fixed-size
/// batches. Returns the amount of upserted rows.
pub async fn update_platform_rankings(
    db: &Database,
    platform: Platform,
    upsert_batch: usize,
) -> StatsResult<usize> {
    let users = platform_users_ordered(&db.mysql_pool, platform).await?;
    if users.is_empty() {
        tracing::warn!("platform {platform} has no user with data");
        return Ok(0);
    }

    let rankings = compute_rankings(platform, &users, Utc::now().naive_utc());
    for batch in rankings.chunks(upsert_batch.max(1)) {
        upsert_ranking_batch(&db.mysql_pool, batch).await?;
    }

    tracing::info!("platform {platform}: {} ranking rows updated", rankings.len());
    Ok(rankings.len())
}

/// Recomputes the rankings of every supported platform, sequentially.
///
/// A failure on one platform is logged and does not block the others. Returns the
/// total amount of upserted rows.
pub async fn update_all_platforms(db: &Database) -> usize {
    let upsert_batch = crate::env().ranking_upsert_batch.get();
    let mut total = 0;

    for platform in Platform::ALL {
        match update_platform_rankings(db, platform, upsert_batch).await {
            Ok(count) => total += count,
            Err(e) => {
                tracing::error!("couldn't recompute the {platform} rankings: {e}");
            }
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_id: u64, ac: i32, submit: i32) -> PlatformUserRow {
        PlatformUserRow {
            user_id,
            username: format!("user{user_id}"),
            ac_count: ac,
            submit_count: submit,
        }
    }

    #[test]
    fn ties_keep_the_rank_and_leave_gaps() {
        let users = [
            user(1, 10, 5),
            user(2, 10, 5),
            user(3, 8, 9),
            user(4, 8, 9),
            user(5, 5, 1),
        ];
        let rankings = compute_rankings(Platform::Luogu, &users, Utc::now().naive_utc());

        let ranks: Vec<_> = rankings.iter().map(|r| r.ranking).collect();
        assert_eq!(ranks, [1, 1, 3, 3, 5]);

        // Rank 3 among 5 users.
        assert_eq!(rankings[2].ranking_percentage, 60.00);
        assert!(rankings.iter().all(|r| r.total_users == 5));
    }

    #[test]
    fn same_ac_different_submit_breaks_the_tie() {
        let users = [user(1, 10, 5), user(2, 10, 6), user(3, 10, 6)];
        let rankings = compute_rankings(Platform::Codeforces, &users, Utc::now().naive_utc());
        let ranks: Vec<_> = rankings.iter().map(|r| r.ranking).collect();
        assert_eq!(ranks, [1, 2, 2]);
    }

    #[test]
    fn recompute_is_idempotent() {
        let users = [user(1, 10, 5), user(2, 8, 9), user(3, 8, 9)];
        let calc_time = Utc::now().naive_utc();
        let first = compute_rankings(Platform::Nowcoder, &users, calc_time);
        let second = compute_rankings(Platform::Nowcoder, &users, calc_time);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(compute_rankings(Platform::Luogu, &[], Utc::now().naive_utc()).is_empty());
    }

    #[test]
    fn percentages_round_half_up() {
        assert_eq!(round2(100.0 / 3.0), 33.33);
        assert_eq!(round2(200.0 / 3.0), 66.67);
        assert_eq!(round2(60.0), 60.00);
    }
}
