//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{TtlPolicy, TtlTable};
use crate::error::Result;
use crate::storage::PersistentOptions;
use crate::tasks::PruneSettings;

const ENV_PREFIX: &str = "MARKET_CACHE_";

// == Metadata Refresh ==
/// When ticker metadata is refreshed after a successful price fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataRefresh {
    /// Only for symbols with no metadata yet
    #[default]
    FirstSight,
    /// After every successful price fetch
    EveryFetch,
    /// Never; metadata only arrives through explicit metadata fetches
    Never,
}

impl fmt::Display for MetadataRefresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetadataRefresh::FirstSight => "first_sight",
            MetadataRefresh::EveryFetch => "every_fetch",
            MetadataRefresh::Never => "never",
        })
    }
}

impl FromStr for MetadataRefresh {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first_sight" => Ok(MetadataRefresh::FirstSight),
            "every_fetch" => Ok(MetadataRefresh::EveryFetch),
            "never" => Ok(MetadataRefresh::Never),
            other => Err(format!("unknown metadata refresh policy '{}'", other)),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. Durations are given in seconds, retention in days.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file backing the persistent tier
    pub db_path: PathBuf,
    pub price_ttl: TtlTable,
    pub history_ttl: TtlTable,
    pub news_ttl: TtlTable,
    pub metadata_ttl: Duration,
    /// Age after which persisted entries are pruned
    pub retention: Duration,
    /// Age after which unverified metadata is pruned
    pub metadata_retention: Duration,
    pub prune_interval: Duration,
    /// How far back `warm_up` loads persisted entries into memory
    pub warm_window: Duration,
    pub metadata_refresh: MetadataRefresh,
    /// Consecutive persistence failures before the tier switches off
    pub persist_failure_limit: u32,
    pub read_pool_size: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MARKET_CACHE_DB_PATH` - Store file (default: `market_cache.db`)
    /// - `MARKET_CACHE_PRICE_TTL_OPEN` / `_EXTENDED` / `_CLOSED` (default: 300 / 900 / 86400)
    /// - `MARKET_CACHE_HISTORY_TTL_OPEN` / `_EXTENDED` / `_CLOSED` (default: 900 / 1800 / 86400)
    /// - `MARKET_CACHE_NEWS_TTL_OPEN` / `_EXTENDED` / `_CLOSED` (default: 3600 / 7200 / 86400)
    /// - `MARKET_CACHE_METADATA_TTL` - (default: 30 days)
    /// - `MARKET_CACHE_RETENTION_DAYS` - (default: 7)
    /// - `MARKET_CACHE_METADATA_RETENTION_DAYS` - (default: 180)
    /// - `MARKET_CACHE_PRUNE_INTERVAL` - (default: 3600)
    /// - `MARKET_CACHE_WARM_WINDOW` - (default: 86400)
    /// - `MARKET_CACHE_METADATA_REFRESH` - `first_sight`, `every_fetch` or `never`
    /// - `MARKET_CACHE_PERSIST_FAILURE_LIMIT` - (default: 5)
    /// - `MARKET_CACHE_READ_POOL_SIZE` - (default: 4)
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    /// Builds a config from any name-to-value source, names without prefix.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            parse_var(&lookup, name).map(Duration::from_secs).unwrap_or(default)
        };
        let days = |name: &str, default: Duration| {
            parse_var(&lookup, name)
                .map(|d: u64| Duration::from_secs(d.saturating_mul(86_400)))
                .unwrap_or(default)
        };
        let table = |prefix: &str, default: TtlTable| {
            TtlTable::new(
                secs(&format!("{}_TTL_OPEN", prefix), default.open),
                secs(&format!("{}_TTL_EXTENDED", prefix), default.extended),
                secs(&format!("{}_TTL_CLOSED", prefix), default.closed),
            )
        };

        Self {
            db_path: lookup("DB_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            price_ttl: table("PRICE", defaults.price_ttl),
            history_ttl: table("HISTORY", defaults.history_ttl),
            news_ttl: table("NEWS", defaults.news_ttl),
            metadata_ttl: secs("METADATA_TTL", defaults.metadata_ttl),
            retention: days("RETENTION_DAYS", defaults.retention),
            metadata_retention: days("METADATA_RETENTION_DAYS", defaults.metadata_retention),
            prune_interval: secs("PRUNE_INTERVAL", defaults.prune_interval),
            warm_window: secs("WARM_WINDOW", defaults.warm_window),
            metadata_refresh: parse_var(&lookup, "METADATA_REFRESH")
                .unwrap_or(defaults.metadata_refresh),
            persist_failure_limit: parse_var(&lookup, "PERSIST_FAILURE_LIMIT")
                .unwrap_or(defaults.persist_failure_limit),
            read_pool_size: parse_var(&lookup, "READ_POOL_SIZE").unwrap_or(defaults.read_pool_size),
        }
    }

    /// Freshness policy from the configured TTLs.
    ///
    /// Fails if any category's TTLs do not grow from open to closed.
    pub fn ttl_policy(&self) -> Result<TtlPolicy> {
        TtlPolicy::new(self.price_ttl, self.history_ttl, self.news_ttl, self.metadata_ttl)
    }

    pub fn persistent_options(&self) -> PersistentOptions {
        PersistentOptions {
            read_pool_size: self.read_pool_size,
            failure_limit: self.persist_failure_limit,
        }
    }

    pub fn prune_settings(&self) -> PruneSettings {
        PruneSettings {
            retention: self.retention,
            metadata_retention: self.metadata_retention,
            interval: self.prune_interval,
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let policy = TtlPolicy::default();
        let prune = PruneSettings::default();
        let persistent = PersistentOptions::default();
        Self {
            db_path: PathBuf::from("market_cache.db"),
            price_ttl: policy.price,
            history_ttl: policy.history,
            news_ttl: policy.news,
            metadata_ttl: policy.metadata,
            retention: prune.retention,
            metadata_retention: prune.metadata_retention,
            prune_interval: prune.interval,
            warm_window: Duration::from_secs(86_400),
            metadata_refresh: MetadataRefresh::default(),
            persist_failure_limit: persistent.failure_limit,
            read_pool_size: persistent.read_pool_size,
        }
    }
}
