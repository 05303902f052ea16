//! The main crate of the OJ statistics infrastructure.
//!
//! This crate is used by all the services that aggregate online-judge (OJ)
//! problem-solving statistics. It contains the environment setup functions,
//! the models saved in the database, the external platform fetcher, the
//! caching tiers, and the ranking computations.
//!
//! The scheduler service that drives the periodic refreshes lives in the
//! `ojcs` package.

#![warn(missing_docs)]

mod env;

pub mod cache;
pub mod error;
pub mod fetch;
pub mod hybrid;
pub mod leaderboard;
pub mod lock;
pub mod models;
pub mod platform;
pub mod profile;
pub mod ranking;
pub mod stats;
pub mod update;

pub use env::*;

use rand::Rng as _;

/// The MySQL/MariaDB pool type.
pub type MySqlPool = sqlx::MySqlPool;

/// The embedded schema migrations of this crate.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Returns a randomly-generated string with the `len` length. It contains alphanumeric characters.
///
/// Used to tag the holder of an update lock.
pub fn gen_random_str(len: usize) -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .map(char::from)
        .take(len)
        .collect()
}

/// Represents the database of the services, meaning the MySQL (more precisely MariaDB) pool.
///
/// The durable store is the authoritative source: every cache entry managed by this
/// crate can be rebuilt from it.
#[derive(Clone)]
pub struct Database {
    /// The MySQL (more precisely MariaDB) pool.
    pub mysql_pool: MySqlPool,
}

impl Database {
    /// Connects to the database with the provided URL.
    pub async fn from_db_url(db_url: &str) -> Result<Self, sqlx::Error> {
        let mysql_pool = MySqlPool::connect(db_url).await?;
        Ok(Self { mysql_pool })
    }
}
