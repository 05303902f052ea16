//! The supported online-judge platforms.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// A supported online-judge platform.
///
/// Each platform has a *platform id* (the identifier used in the database rows and by
/// the callers of this crate) and a *platform code* (the path segment used when calling
/// the upstream statistics API). The two differ only for LeetCode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Luogu.
    Luogu,
    /// The LeetCode China site.
    #[serde(rename = "leetcode")]
    LeetcodeCn,
    /// Nowcoder.
    Nowcoder,
    /// Codeforces.
    Codeforces,
}

impl Platform {
    /// All the supported platforms, in ranking-recompute order.
    pub const ALL: [Platform; 4] = [
        Platform::Luogu,
        Platform::LeetcodeCn,
        Platform::Nowcoder,
        Platform::Codeforces,
    ];

    /// The platform id, used in the database rows and by the callers of this crate.
    pub const fn id(self) -> &'static str {
        match self {
            Platform::Luogu => "luogu",
            Platform::LeetcodeCn => "leetcode",
            Platform::Nowcoder => "nowcoder",
            Platform::Codeforces => "codeforces",
        }
    }

    /// The platform code, used as the path segment of the upstream API calls.
    pub const fn code(self) -> &'static str {
        match self {
            Platform::Luogu => "luogu",
            Platform::LeetcodeCn => "leetcode_cn",
            Platform::Nowcoder => "nowcoder",
            Platform::Codeforces => "codeforces",
        }
    }

    /// The human-readable platform name, stored in the ranking rows.
    pub const fn display_name(self) -> &'static str {
        match self {
            Platform::Luogu => "Luogu",
            Platform::LeetcodeCn => "LeetCode CN",
            Platform::Nowcoder => "Nowcoder",
            Platform::Codeforces => "Codeforces",
        }
    }

    /// Returns the platform with the provided platform id, if supported.
    pub fn from_id(id: &str) -> Option<Platform> {
        Platform::ALL.into_iter().find(|p| p.id() == id)
    }

    /// Returns the platform with the provided platform code, if supported.
    pub fn from_code(code: &str) -> Option<Platform> {
        Platform::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Returns the platform with the provided platform id, or an
    /// [`UnsupportedPlatform`](StatsError::UnsupportedPlatform) error.
    pub fn try_from_id(id: &str) -> Result<Platform, StatsError> {
        Platform::from_id(id).ok_or_else(|| StatsError::UnsupportedPlatform(id.to_owned()))
    }

    /// The name of the `user_oj` column holding the username bound on this platform.
    pub(crate) const fn username_col(self) -> &'static str {
        match self {
            Platform::Luogu => "luogu_username",
            Platform::LeetcodeCn => "leetcode_cn_username",
            Platform::Nowcoder => "nowcoder_user_id",
            Platform::Codeforces => "codeforce_username",
        }
    }

    /// The name of the `user_oj` column holding the AC count on this platform.
    pub(crate) const fn ac_col(self) -> &'static str {
        match self {
            Platform::Luogu => "luogu_ac_num",
            Platform::LeetcodeCn => "leetcode_ac_num",
            Platform::Nowcoder => "nowcoder_ac_num",
            Platform::Codeforces => "codeforces_ac_num",
        }
    }

    /// The name of the `user_oj` column holding the submit count on this platform.
    pub(crate) const fn submit_col(self) -> &'static str {
        match self {
            Platform::Luogu => "luogu_submit_num",
            Platform::LeetcodeCn => "leetcode_submit_num",
            Platform::Nowcoder => "nowcoder_submit_num",
            Platform::Codeforces => "codeforces_submit_num",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrip() {
        for p in Platform::ALL {
            assert_eq!(Platform::from_id(p.id()), Some(p));
            assert_eq!(Platform::from_code(p.code()), Some(p));
        }
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert_eq!(Platform::from_id("atcoder"), None);
        assert!(matches!(
            Platform::try_from_id("atcoder"),
            Err(StatsError::UnsupportedPlatform(id)) if id == "atcoder"
        ));
    }

    #[test]
    fn serde_names_match_platform_ids() {
        for p in Platform::ALL {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.id()));
        }
    }
}
