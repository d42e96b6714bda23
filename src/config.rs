//! Settings read from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_STORE_DIR: &str = "uploads";
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 2;
const SECONDS_PER_HOUR: u64 = 60 * 60;

fn ttl_from_hours(hours: u64) -> anyhow::Result<Duration> {
    hours
        .checked_mul(SECONDS_PER_HOUR)
        .map(Duration::from_secs)
        .with_context(|| format!("PROGRESS_SESSION_TTL_HOURS is too large: {hours}"))
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Postgres connection string, only needed by the Postgres session store.
    pub database_url: Option<String>,
    /// Root of the filesystem session store (`PROGRESS_STORE_DIR`).
    pub store_dir: PathBuf,
    /// Sessions older than this are evicted before a new one is saved
    /// (`PROGRESS_SESSION_TTL_HOURS`).
    pub session_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        let store_dir = env::var("PROGRESS_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_DIR));
        let ttl_hours = match env::var("PROGRESS_SESSION_TTL_HOURS") {
            Ok(value) => value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("PROGRESS_SESSION_TTL_HOURS must be a whole number of hours, got {value:?}"))?,
            Err(_) => DEFAULT_SESSION_TTL_HOURS,
        };

        Ok(Self {
            database_url,
            store_dir,
            session_ttl: ttl_from_hours(ttl_hours)?,
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to use the Postgres session store")
    }
}
