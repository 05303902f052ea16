//! The models saved in the database, and the aggregated values built from them.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

use crate::platform::Platform;

/// The `user_oj` row: the OJ profile of a user.
///
/// The per-platform counters and the aggregate totals form the durable cache tier of
/// the profile read path. They are written only by the persistence writer; the username
/// bindings are maintained by the surrounding service.
#[derive(Serialize, FromRow, Clone, Debug, Default)]
pub struct UserOj {
    /// The id of the user owning this profile.
    pub user_id: u64,

    /// The username bound on Luogu.
    pub luogu_username: Option<String>,
    /// The username bound on the LeetCode China site.
    pub leetcode_cn_username: Option<String>,
    /// The user id bound on Nowcoder.
    pub nowcoder_user_id: Option<String>,
    /// The username bound on Codeforces.
    pub codeforce_username: Option<String>,

    /// The AC count on Luogu.
    pub luogu_ac_num: Option<i32>,
    /// The submit count on Luogu.
    pub luogu_submit_num: Option<i32>,
    /// The AC count on LeetCode.
    pub leetcode_ac_num: Option<i32>,
    /// The submit count on LeetCode.
    pub leetcode_submit_num: Option<i32>,
    /// The AC count on Nowcoder.
    pub nowcoder_ac_num: Option<i32>,
    /// The submit count on Nowcoder.
    pub nowcoder_submit_num: Option<i32>,
    /// The AC count on Codeforces.
    pub codeforces_ac_num: Option<i32>,
    /// The submit count on Codeforces.
    pub codeforces_submit_num: Option<i32>,

    /// The aggregate AC count, over the platforms with a non-empty binding.
    pub total_ac_num: Option<i32>,
    /// The aggregate submit count, over the platforms with a non-empty binding.
    pub total_submit_num: Option<i32>,

    /// The date of the last successful full refresh.
    pub cache_time: Option<NaiveDateTime>,
    /// The date of the last read of this profile.
    pub last_access_time: Option<NaiveDateTime>,
    /// The date of the last write to this row.
    pub update_time: Option<NaiveDateTime>,
}

impl UserOj {
    /// Returns the username bound on the provided platform, if non-empty.
    pub fn binding(&self, platform: Platform) -> Option<&str> {
        let username = match platform {
            Platform::Luogu => self.luogu_username.as_deref(),
            Platform::LeetcodeCn => self.leetcode_cn_username.as_deref(),
            Platform::Nowcoder => self.nowcoder_user_id.as_deref(),
            Platform::Codeforces => self.codeforce_username.as_deref(),
        };
        username.map(str::trim).filter(|u| !u.is_empty())
    }

    /// Returns the stored `(AC, submit)` counters of the provided platform, absent
    /// counters counting as zero.
    pub fn counters(&self, platform: Platform) -> (i32, i32) {
        let (ac, submit) = match platform {
            Platform::Luogu => (self.luogu_ac_num, self.luogu_submit_num),
            Platform::LeetcodeCn => (self.leetcode_ac_num, self.leetcode_submit_num),
            Platform::Nowcoder => (self.nowcoder_ac_num, self.nowcoder_submit_num),
            Platform::Codeforces => (self.codeforces_ac_num, self.codeforces_submit_num),
        };
        (ac.unwrap_or(0), submit.unwrap_or(0))
    }

    /// Returns the platforms with a non-empty binding, with their usernames.
    pub fn bound_platforms(&self) -> Vec<(Platform, String)> {
        Platform::ALL
            .into_iter()
            .filter_map(|p| self.binding(p).map(|u| (p, u.to_owned())))
            .collect()
    }
}

/// The statistics of a user on a single platform.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlatformData {
    /// The platform.
    #[serde(rename = "name")]
    pub platform: Platform,
    /// The amount of solved problems.
    pub solved: i32,
    /// The amount of submissions.
    pub submitted: i32,
}

/// The aggregated OJ statistics of a user, over the platforms that returned data.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct OjUserData {
    /// The per-platform statistics, for the platforms with data.
    pub platforms: Vec<PlatformData>,
    /// The sum of the solved counts of [`platforms`](Self::platforms).
    pub total_ac: i32,
    /// The sum of the submission counts of [`platforms`](Self::platforms).
    pub total_submit: i32,
}

impl OjUserData {
    /// The zero-valued aggregate, returned when a user has no profile row or no binding.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the aggregate from per-platform results, summing the totals over exactly
    /// the platforms that returned data.
    pub fn from_results(results: impl IntoIterator<Item = PlatformData>) -> Self {
        let mut data = Self::default();
        for res in results {
            data.total_ac += res.solved;
            data.total_submit += res.submitted;
            data.platforms.push(res);
        }
        data
    }

    /// Builds the aggregate from the counters stored in a `user_oj` row, for the
    /// platforms with a non-empty binding.
    pub fn from_cached_row(row: &UserOj) -> Self {
        Self::from_results(Platform::ALL.into_iter().filter_map(|p| {
            row.binding(p).map(|_| {
                let (solved, submitted) = row.counters(p);
                PlatformData {
                    platform: p,
                    solved,
                    submitted,
                }
            })
        }))
    }
}

/// The `user_platform_ranking` row: the precomputed rank of a user on a platform.
///
/// Bulk-overwritten by the ranking engine, and read-only to the hybrid read path.
#[derive(Serialize, FromRow, Clone, Debug, PartialEq)]
pub struct UserPlatformRanking {
    /// The id of the ranked user.
    pub user_id: u64,
    /// The platform id.
    pub platform_id: String,
    /// The human-readable platform name.
    pub platform_name: String,
    /// The username bound on the platform.
    pub username: String,
    /// The 1-based competition rank.
    pub ranking: i32,
    /// The AC count used for this rank.
    pub ac_count: i32,
    /// The submit count used for this rank.
    pub submit_count: i32,
    /// The amount of users with data on the platform.
    pub total_users: i32,
    /// `ranking / total_users × 100`, rounded half-up to 2 decimals.
    pub ranking_percentage: f64,
    /// The date this row was computed.
    pub last_calc_time: NaiveDateTime,
}

/// The response of the hybrid ranking read path: the rank of a user on a platform.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PlatformRankingInfo {
    /// The platform.
    pub platform: Platform,
    /// The human-readable platform name.
    pub platform_name: String,
    /// The username bound on the platform.
    pub username: String,
    /// The 1-based competition rank.
    pub ranking: i32,
    /// The AC count used for this rank.
    pub ac_count: i32,
    /// The submit count used for this rank.
    pub submit_count: i32,
    /// The amount of users with data on the platform.
    pub total_users: i32,
    /// `ranking / total_users × 100`, rounded half-up to 2 decimals.
    pub ranking_percentage: f64,
}

impl PlatformRankingInfo {
    /// Converts a stored ranking row into a response. Returns `None` if the row holds
    /// an unsupported platform id (e.g. after a platform was dropped).
    pub fn from_row(row: &UserPlatformRanking) -> Option<Self> {
        let platform = Platform::from_id(&row.platform_id)?;
        Some(Self {
            platform,
            platform_name: row.platform_name.clone(),
            username: row.username.clone(),
            ranking: row.ranking,
            ac_count: row.ac_count,
            submit_count: row.submit_count,
            total_users: row.total_users,
            ranking_percentage: row.ranking_percentage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserOj {
        UserOj {
            user_id: 1,
            luogu_username: Some("alice".to_owned()),
            luogu_ac_num: Some(25),
            luogu_submit_num: Some(50),
            codeforce_username: Some("  ".to_owned()),
            codeforces_ac_num: Some(99),
            codeforces_submit_num: Some(120),
            ..Default::default()
        }
    }

    #[test]
    fn blank_binding_counts_as_unbound() {
        let row = profile();
        assert_eq!(row.binding(Platform::Luogu), Some("alice"));
        assert_eq!(row.binding(Platform::Codeforces), None);
        assert_eq!(row.bound_platforms(), vec![(Platform::Luogu, "alice".to_owned())]);
    }

    #[test]
    fn cached_row_aggregate_skips_unbound_platforms() {
        let data = OjUserData::from_cached_row(&profile());
        // The Codeforces counters are present but the binding is blank.
        assert_eq!(data.total_ac, 25);
        assert_eq!(data.total_submit, 50);
        assert_eq!(
            data.platforms,
            vec![PlatformData {
                platform: Platform::Luogu,
                solved: 25,
                submitted: 50,
            }]
        );
    }

    #[test]
    fn aggregate_totals_are_the_sum_of_the_parts() {
        let data = OjUserData::from_results([
            PlatformData {
                platform: Platform::Luogu,
                solved: 10,
                submitted: 30,
            },
            PlatformData {
                platform: Platform::Nowcoder,
                solved: 5,
                submitted: 7,
            },
        ]);
        assert_eq!(data.total_ac, 15);
        assert_eq!(data.total_submit, 37);
        assert_eq!(data.platforms.len(), 2);
    }
}
