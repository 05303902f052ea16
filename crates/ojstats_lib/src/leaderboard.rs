//! The global leaderboard: ranks over the aggregated totals of `user_oj`, rather than
//! over any single platform.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

use crate::MySqlPool;
use crate::error::StatsResult;
use crate::ranking::round2;

/// A row of the global leaderboard.
#[derive(Serialize, FromRow, Clone, Debug, PartialEq)]
pub struct UserRankEntry {
    /// The id of the ranked user.
    pub user_id: u64,
    /// The aggregated AC count over the bound platforms.
    pub total_ac_num: i32,
    /// The aggregated submit count over the bound platforms.
    pub total_submit_num: i32,
    /// `total_ac_num / total_submit_num × 100`, rounded half-up to 2 decimals; 0 when
    /// the user has no submission.
    #[sqlx(skip)]
    pub ac_rate: f64,
    /// The date of the last successful full refresh of this user.
    pub cache_time: Option<NaiveDateTime>,
}

/// The position of a single user on the global leaderboard.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UserGlobalRank {
    /// The 1-based competition rank.
    pub ranking: i64,
    /// The amount of users with at least one AC.
    pub total_users: i64,
    /// The aggregated AC count of the user.
    pub total_ac_num: i32,
    /// The aggregated submit count of the user.
    pub total_submit_num: i32,
    /// The AC rate of the user, as a rounded percentage.
    pub ac_rate: f64,
}

/// A page of the global leaderboard.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RankingPage {
    /// The requested 1-based page number.
    pub page: u32,
    /// The requested page size.
    pub per_page: u32,
    /// The amount of pages available.
    pub total_pages: u32,
    /// The amount of users on the leaderboard.
    pub total_users: i64,
    /// Whether a page follows this one.
    pub has_next: bool,
    /// Whether a page precedes this one.
    pub has_previous: bool,
    /// The rank of the first entry of this page.
    pub first_rank: i64,
    /// The entries of this page, best first.
    pub entries: Vec<UserRankEntry>,
}

/// Computes the amount of pages needed to show `total` entries, `per_page` at a time.
pub fn page_count(total: i64, per_page: u32) -> u32 {
    if total <= 0 || per_page == 0 {
        return 0;
    }
    (total as u64).div_ceil(per_page as u64) as u32
}

/// The board filter of a leaderboard page: the whole user base, or only the users
/// with at least one AC.
fn board_filter(only_active: bool) -> &'static str {
    if only_active {
        " WHERE total_ac_num > 0"
    } else {
        ""
    }
}

fn rate(ac: i32, submit: i32) -> f64 {
    if submit > 0 {
        round2(ac as f64 / submit as f64 * 100.0)
    } else {
        0.0
    }
}

/// Returns the global rank of a user, or `None` if they have no aggregated totals yet.
///
/// The rank counts the users with strictly better totals (more ACs, or as many ACs and
/// fewer submissions) among the users with at least one AC, plus one.
pub async fn get_user_rank(pool: &MySqlPool, user_id: u64) -> StatsResult<Option<UserGlobalRank>> {
    let totals: Option<(i32, i32)> = sqlx::query_as(
        "SELECT total_ac_num, total_submit_num FROM user_oj \
         WHERE user_id = ? AND total_ac_num IS NOT NULL AND total_submit_num IS NOT NULL",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some((ac, submit)) = totals else {
        return Ok(None);
    };

    let better: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_oj \
         WHERE total_ac_num > 0 \
           AND (total_ac_num > ? OR (total_ac_num = ? AND total_submit_num < ?))",
    )
    .bind(ac)
    .bind(ac)
    .bind(submit)
    .fetch_one(pool)
    .await?;

    let total_users: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM user_oj WHERE total_ac_num > 0")
            .fetch_one(pool)
            .await?;

    Ok(Some(UserGlobalRank {
        ranking: better + 1,
        total_users,
        total_ac_num: ac,
        total_submit_num: submit,
        ac_rate: rate(ac, submit),
    }))
}

/// Returns a page of the global leaderboard, best users first.
///
/// With `only_active`, the board holds only the users with at least one AC; without
/// it, the whole user base is listed, users with no aggregates counting as zero.
/// Pages are 1-based; an out-of-range page returns an empty entry list with the
/// metadata filled in.
pub async fn get_ranking_page(
    pool: &MySqlPool,
    page: u32,
    per_page: u32,
    only_active: bool,
) -> StatsResult<RankingPage> {
    let page = page.max(1);
    let per_page = per_page.clamp(1, 100);
    let offset = (page as i64 - 1) * per_page as i64;
    let filter = board_filter(only_active);

    let count_q = format!("SELECT COUNT(*) FROM user_oj{filter}");
    let total_users: i64 = sqlx::query_scalar(&count_q).fetch_one(pool).await?;

    let page_q = format!(
        "SELECT user_id, COALESCE(total_ac_num, 0) AS total_ac_num, \
            COALESCE(total_submit_num, 0) AS total_submit_num, cache_time \
         FROM user_oj{filter} \
         ORDER BY total_ac_num DESC, total_submit_num ASC, user_id ASC \
         LIMIT ? OFFSET ?"
    );
    let mut entries: Vec<UserRankEntry> = sqlx::query_as(&page_q)
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    for entry in &mut entries {
        entry.ac_rate = rate(entry.total_ac_num, entry.total_submit_num);
    }

    let total_pages = page_count(total_users, per_page);

    Ok(RankingPage {
        page,
        per_page,
        total_pages,
        total_users,
        has_next: page < total_pages,
        has_previous: page > 1 && total_pages > 0,
        first_rank: offset + 1,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, 20), 0);
        assert_eq!(page_count(1, 20), 1);
        assert_eq!(page_count(20, 20), 1);
        assert_eq!(page_count(21, 20), 2);
        assert_eq!(page_count(100, 20), 5);
    }

    #[test]
    fn only_active_restricts_the_board_to_users_with_an_ac() {
        assert_eq!(board_filter(true), " WHERE total_ac_num > 0");
        // The full board lists the whole user base, zero-AC users included.
        assert_eq!(board_filter(false), "");
    }

    #[test]
    fn rate_handles_zero_submissions() {
        assert_eq!(rate(10, 0), 0.0);
        assert_eq!(rate(1, 3), 33.33);
        assert_eq!(rate(2, 3), 66.67);
        assert_eq!(rate(3, 5), 60.0);
    }
}
