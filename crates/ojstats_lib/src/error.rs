//! A module containing the [`StatsError`] struct, which contains various basic error types.

use crate::platform::Platform;

/// Represents any type of error that could happen when using this crate.
#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    // --------
    // --- Internal errors
    // --------
    /// An error that happened when interacting with the MySQL/MariaDB database.
    #[error(transparent)]
    MySql(#[from] sqlx::Error),
    /// An error that happened when sending an external request.
    #[error(transparent)]
    ExternalRequest(#[from] reqwest::Error),
    /// An internal error.
    #[error("internal error: {0}")]
    Internal(String),

    // --------
    // --- Logical errors
    // --------
    /// The provided platform id is not a supported platform.
    #[error("unsupported OJ platform `{0}`")]
    UnsupportedPlatform(
        /// The platform id.
        String,
    ),
    /// The user exists but has no account bound on the requested platform.
    #[error("user {user_id} has no account bound on platform `{platform}`")]
    PlatformNotBound {
        /// The user id.
        user_id: u64,
        /// The requested platform.
        platform: Platform,
    },
    /// The OJ profile row of the user was not found.
    #[error("OJ profile of user {0} not found in database")]
    ProfileNotFound(
        /// The user id.
        u64,
    ),
}

/// Shortcut for creating an internal error, by formatting a message.
///
/// See [`StatsError::Internal`].
#[macro_export]
macro_rules! internal {
    ($($t:tt)*) => {{
        $crate::error::StatsError::Internal($crate::error::__private::format!($($t)*))
    }};
}

#[doc(hidden)]
pub mod __private {
    pub use std::format;
}

/// Represents the result of a computation that could return a [`StatsError`].
pub type StatsResult<T = ()> = Result<T, StatsError>;
