use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
const DEFAULT_BODY_LIMIT_MB: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub sync_url: Option<String>,
    pub sync_interval: Duration,
    pub sync_relay_url: Option<String>,
    pub body_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr = non_empty("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address such as 0.0.0.0:5000")?;

        let sync_interval_secs = match non_empty("SYNC_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("SYNC_INTERVAL_SECS must be a whole number of seconds")?,
            None => DEFAULT_SYNC_INTERVAL_SECS,
        };

        let body_limit_mb = match non_empty("BODY_LIMIT_MB") {
            Some(raw) => raw
                .parse::<usize>()
                .context("BODY_LIMIT_MB must be a whole number of megabytes")?,
            None => DEFAULT_BODY_LIMIT_MB,
        };

        let body_limit_bytes = body_limit_mb
            .checked_mul(1024 * 1024)
            .context("BODY_LIMIT_MB is too large")?;

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            bind_addr,
            sync_url: non_empty("SYNC_URL"),
            sync_interval: Duration::from_secs(sync_interval_secs.max(1)),
            sync_relay_url: non_empty("SYNC_RELAY_URL"),
            body_limit_bytes,
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }
}
