//! Persistent Tier Module
//!
//! Durable cache entries and ticker metadata in SQLite. All writes go through
//! the writer actor; reads run on pooled query-only connections via
//! `spawn_blocking`.
//!
//! The tier never takes the application down. If the store cannot be opened,
//! or keeps failing, it switches itself off and every call returns
//! `CacheError::Disabled`, leaving the memory tier to carry on alone.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, error, info, warn};

use crate::cache::{
    is_metadata, CacheEntry, CacheKey, Category, EntrySource, Granularity, MetadataEntry,
    PutOutcome,
};
use crate::error::{CacheError, Result};
use crate::market::MarketStatus;
use crate::storage::db::{open_or_reinitialize, open_reader};
use crate::storage::writer::{spawn_writer, WriteHandle};

const ENTRY_COLUMNS: &str =
    "category, symbol, granularity, payload, fetched_at, market_status, source";

const UPSERT_ENTRY: &str = "
INSERT INTO cache_entries (category, symbol, granularity, payload, fetched_at, market_status, source)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT (category, symbol, granularity) DO UPDATE SET
    payload = excluded.payload,
    fetched_at = excluded.fetched_at,
    market_status = excluded.market_status,
    source = excluded.source
WHERE excluded.fetched_at >= cache_entries.fetched_at";

const UPSERT_METADATA: &str = "
INSERT INTO ticker_metadata (symbol, exchange, display_name, last_verified_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (symbol) DO UPDATE SET
    exchange = excluded.exchange,
    display_name = excluded.display_name,
    last_verified_at = excluded.last_verified_at
WHERE excluded.last_verified_at >= ticker_metadata.last_verified_at";

// == Options ==
/// Tuning knobs for the persistent tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentOptions {
    /// Idle reader connections kept open
    pub read_pool_size: usize,
    /// Consecutive failures after which persistence is switched off
    pub failure_limit: u32,
}

impl Default for PersistentOptions {
    fn default() -> Self {
        Self {
            read_pool_size: 4,
            failure_limit: 5,
        }
    }
}

/// Counts from a multi-entry write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub rejected: usize,
}

// == Reader Pool ==
struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl ReaderPool {
    fn new(path: PathBuf, max_idle: usize) -> Self {
        Self {
            path,
            idle: Mutex::new(Vec::new()),
            max_idle: max_idle.max(1),
        }
    }

    /// Runs `f` on an idle reader, opening a new one if none is free.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let pooled = self.lock()?.pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => open_reader(&self.path)?,
        };

        let result = f(&conn);

        // A connection that just failed may be the problem; let it go.
        if result.is_ok() {
            let mut idle = self.lock()?;
            if idle.len() < self.max_idle {
                idle.push(conn);
            }
        }
        result
    }

    fn clear(&self) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Connection>>> {
        self.idle
            .lock()
            .map_err(|_| CacheError::Internal("reader pool lock poisoned".to_string()))
    }
}

struct Store {
    writer: WriteHandle,
    readers: Arc<ReaderPool>,
}

// == Persistent Tier ==
pub struct PersistentTier {
    store: Option<Store>,
    path: Option<PathBuf>,
    disabled: AtomicBool,
    consecutive_failures: AtomicU32,
    failure_limit: u32,
}

impl PersistentTier {
    // == Constructors ==
    /// Opens (or creates) the store at `path`.
    ///
    /// Never fails: a store that cannot be opened even after being rebuilt
    /// yields a disabled tier.
    pub fn open(path: impl AsRef<Path>, options: PersistentOptions) -> Self {
        let path = path.as_ref().to_path_buf();
        let store = open_or_reinitialize(&path).and_then(|conn| {
            Ok(Store {
                writer: spawn_writer(conn)?,
                readers: Arc::new(ReaderPool::new(path.clone(), options.read_pool_size)),
            })
        });

        match store {
            Ok(store) => {
                info!("Persistent store opened at {}", path.display());
                Self {
                    store: Some(store),
                    path: Some(path),
                    disabled: AtomicBool::new(false),
                    consecutive_failures: AtomicU32::new(0),
                    failure_limit: options.failure_limit.max(1),
                }
            }
            Err(e) => {
                error!(
                    "Cannot open persistent store at {}: {}; running memory-only",
                    path.display(),
                    e
                );
                Self::disabled()
            }
        }
    }

    /// A tier that stores nothing.
    pub fn disabled() -> Self {
        Self {
            store: None,
            path: None,
            disabled: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            failure_limit: 1,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some() && !self.disabled.load(Ordering::Acquire)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // == Entries ==
    /// Reads the entry stored under `key`. Metadata keys read the metadata table.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        if key.category == Category::Metadata {
            return match self.get_metadata(&key.symbol).await? {
                Some(meta) => Ok(Some(meta.to_cache_entry()?)),
                None => Ok(None),
            };
        }

        let key = key.clone();
        self.read(move |conn| {
            let row = conn
                .prepare_cached(&format!(
                    "SELECT {} FROM cache_entries WHERE category = ?1 AND symbol = ?2 AND granularity = ?3",
                    ENTRY_COLUMNS
                ))?
                .query_row(
                    params![key.category.as_str(), key.symbol, key.granularity_key()],
                    EntryRow::from_row,
                )
                .optional()?;

            Ok(row.and_then(|row| match row.into_entry() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Ignoring undecodable stored entry {}: {}", key, e);
                    None
                }
            }))
        })
        .await
    }

    /// Upserts one entry, keeping the stored one if it is newer.
    pub async fn put(&self, entry: CacheEntry) -> Result<PutOutcome> {
        self.write(move |conn| upsert_entry(conn, &entry)).await
    }

    /// Upserts several entries in a single transaction.
    pub async fn put_batch(&self, entries: Vec<CacheEntry>) -> Result<BatchOutcome> {
        if entries.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.write(move |conn| {
            let mut outcome = BatchOutcome::default();
            for entry in &entries {
                match upsert_entry(conn, entry)? {
                    PutOutcome::Applied => outcome.applied += 1,
                    PutOutcome::Rejected => outcome.rejected += 1,
                }
            }
            Ok(outcome)
        })
        .await
    }

    /// Deletes price, history and news entries fetched before `older_than`.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let cutoff = older_than.timestamp_millis();
        self.write(move |conn| {
            Ok(conn.execute("DELETE FROM cache_entries WHERE fetched_at < ?1", params![cutoff])?)
        })
        .await
    }

    /// Entries fetched at or after `since`, for warming the memory tier.
    ///
    /// Rows that no longer decode are skipped.
    pub async fn load_recent(&self, since: DateTime<Utc>) -> Result<Vec<CacheEntry>> {
        let cutoff = since.timestamp_millis();
        self.read(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM cache_entries WHERE fetched_at >= ?1 ORDER BY fetched_at",
                ENTRY_COLUMNS
            ))?;
            let rows = stmt.query_map(params![cutoff], EntryRow::from_row)?;

            let mut entries = Vec::new();
            for row in rows {
                match row?.into_entry() {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Skipping undecodable stored entry: {}", e),
                }
            }
            Ok(entries)
        })
        .await
    }

    /// Number of stored price, history and news entries.
    pub async fn entry_count(&self) -> Result<usize> {
        self.read(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    // == Metadata ==
    pub async fn get_metadata(&self, symbol: &str) -> Result<Option<MetadataEntry>> {
        let symbol = symbol.trim().to_uppercase();
        self.read(move |conn| {
            Ok(conn
                .prepare_cached(
                    "SELECT symbol, exchange, display_name, last_verified_at \
                     FROM ticker_metadata WHERE symbol = ?1",
                )?
                .query_row(params![symbol], metadata_from_row)
                .optional()?
                .flatten())
        })
        .await
    }

    pub async fn put_metadata(&self, entry: MetadataEntry) -> Result<PutOutcome> {
        self.write(move |conn| upsert_metadata(conn, &entry)).await
    }

    /// Deletes metadata last verified before `older_than`.
    pub async fn prune_metadata(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let cutoff = older_than.timestamp_millis();
        self.write(move |conn| {
            Ok(conn.execute(
                "DELETE FROM ticker_metadata WHERE last_verified_at < ?1",
                params![cutoff],
            )?)
        })
        .await
    }

    /// All stored metadata.
    pub async fn load_metadata(&self) -> Result<Vec<MetadataEntry>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT symbol, exchange, display_name, last_verified_at FROM ticker_metadata",
            )?;
            let rows = stmt.query_map([], metadata_from_row)?;
            let mut entries = Vec::new();
            for row in rows {
                if let Some(entry) = row? {
                    entries.push(entry);
                }
            }
            Ok(entries)
        })
        .await
    }

    // == Lifecycle ==
    /// Waits for queued writes to finish, then stops the tier.
    pub async fn close(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if self.disabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        store.readers.clear();
        let result = store.writer.shutdown().await;
        info!("Persistent store closed");
        result
    }

    // == Internals ==
    fn active(&self) -> Result<&Store> {
        match &self.store {
            Some(store) if !self.disabled.load(Ordering::Acquire) => Ok(store),
            _ => Err(CacheError::Disabled),
        }
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let readers = self.active()?.readers.clone();
        let result = tokio::task::spawn_blocking(move || readers.with_conn(f))
            .await
            .map_err(|e| CacheError::Internal(format!("reader task failed: {}", e)))
            .and_then(|r| r);
        self.track(result)
    }

    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let result = self.active()?.writer.exec(move |tx| f(&**tx)).await;
        self.track(result)
    }

    /// Counts consecutive failures and switches the tier off at the limit.
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.consecutive_failures.store(0, Ordering::Release),
            Err(CacheError::Disabled) => {}
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                warn!("Persistent store operation failed ({}/{}): {}", failures, self.failure_limit, e);
                if failures >= self.failure_limit && !self.disabled.swap(true, Ordering::AcqRel) {
                    error!(
                        "Disabling persistence for this session after {} consecutive failures",
                        failures
                    );
                }
            }
        }
        result
    }
}

// == Row Mapping ==
struct EntryRow {
    category: String,
    symbol: String,
    granularity: String,
    payload: String,
    fetched_at: i64,
    market_status: String,
    source: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            category: row.get(0)?,
            symbol: row.get(1)?,
            granularity: row.get(2)?,
            payload: row.get(3)?,
            fetched_at: row.get(4)?,
            market_status: row.get(5)?,
            source: row.get(6)?,
        })
    }

    fn into_entry(self) -> Result<CacheEntry> {
        let category: Category = self.category.parse().map_err(CacheError::Internal)?;
        let granularity = match self.granularity.as_str() {
            "" => None,
            g => Some(
                Granularity::parse(g)
                    .ok_or_else(|| CacheError::Internal(format!("bad granularity '{}'", g)))?,
            ),
        };
        Ok(CacheEntry {
            key: CacheKey::new(category, &self.symbol, granularity),
            payload: serde_json::from_str(&self.payload)?,
            fetched_at: from_millis(self.fetched_at)?,
            market_status_at_fetch: self.market_status.parse::<MarketStatus>().map_err(CacheError::Internal)?,
            source: self.source.parse::<EntrySource>().map_err(CacheError::Internal)?,
        })
    }
}

/// `None` for a row whose timestamp is out of range.
fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<Option<MetadataEntry>> {
    let symbol: String = row.get(0)?;
    let exchange: Option<String> = row.get(1)?;
    let display_name: Option<String> = row.get(2)?;
    let verified: i64 = row.get(3)?;
    Ok(DateTime::from_timestamp_millis(verified)
        .map(|at| MetadataEntry::new(&symbol, exchange, display_name, at)))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CacheError::Internal(format!("timestamp {} out of range", ms)))
}

fn upsert_entry(conn: &Connection, entry: &CacheEntry) -> Result<PutOutcome> {
    if is_metadata(entry) {
        return match MetadataEntry::from_cache_entry(entry) {
            Ok(meta) => upsert_metadata(conn, &meta),
            Err(e) => {
                warn!("Not persisting malformed metadata for {}: {}", entry.key.symbol, e);
                Ok(PutOutcome::Rejected)
            }
        };
    }

    let payload = serde_json::to_string(&entry.payload)?;
    let changed = conn.prepare_cached(UPSERT_ENTRY)?.execute(params![
        entry.key.category.as_str(),
        entry.key.symbol,
        entry.key.granularity_key(),
        payload,
        entry.fetched_at.timestamp_millis(),
        entry.market_status_at_fetch.as_str(),
        entry.source.as_str(),
    ])?;

    if changed == 0 {
        debug!("Stored entry for {} is newer; write rejected", entry.key);
        Ok(PutOutcome::Rejected)
    } else {
        Ok(PutOutcome::Applied)
    }
}

fn upsert_metadata(conn: &Connection, entry: &MetadataEntry) -> Result<PutOutcome> {
    let changed = conn.prepare_cached(UPSERT_METADATA)?.execute(params![
        entry.symbol,
        entry.exchange,
        entry.display_name,
        entry.last_verified_at.timestamp_millis(),
    ])?;
    Ok(if changed == 0 {
        PutOutcome::Rejected
    } else {
        PutOutcome::Applied
    })
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    fn price(symbol: &str, value: f64, fetched_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(
            CacheKey::price(symbol),
            serde_json::json!({ "symbol": symbol, "price": value }),
            fetched_at,
            MarketStatus::Open,
        )
    }

    fn open_temp() -> (TempDir, PersistentTier) {
        let dir = TempDir::new().unwrap();
        let tier = PersistentTier::open(dir.path().join("cache.db"), PersistentOptions::default());
        (dir, tier)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_dir, tier) = open_temp();
        assert!(tier.is_enabled());

        let entry = price("AAPL", 190.0, at(0));
        assert_eq!(tier.put(entry.clone()).await.unwrap(), PutOutcome::Applied);

        let stored = tier.get(&CacheKey::price("AAPL")).await.unwrap().unwrap();
        assert_eq!(stored, entry);
        assert!(tier.get(&CacheKey::price("MSFT")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_granularities_are_separate_rows() {
        let (_dir, tier) = open_temp();
        let daily = CacheKey::history("AAPL", Granularity::new("1d", "1mo"));
        let hourly = CacheKey::history("AAPL", Granularity::new("1h", "5d"));
        tier.put(CacheEntry::new(daily.clone(), serde_json::json!([1]), at(0), MarketStatus::Closed))
            .await
            .unwrap();
        tier.put(CacheEntry::new(hourly.clone(), serde_json::json!([2]), at(0), MarketStatus::Closed))
            .await
            .unwrap();

        assert_eq!(tier.get(&daily).await.unwrap().unwrap().payload, serde_json::json!([1]));
        assert_eq!(tier.get(&hourly).await.unwrap().unwrap().payload, serde_json::json!([2]));
        assert_eq!(tier.entry_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_write_rejected() {
        let (_dir, tier) = open_temp();
        tier.put(price("AAPL", 2.0, at(10))).await.unwrap();

        assert_eq!(tier.put(price("AAPL", 1.0, at(0))).await.unwrap(), PutOutcome::Rejected);
        assert_eq!(tier.put(price("AAPL", 3.0, at(10))).await.unwrap(), PutOutcome::Applied);

        let stored = tier.get(&CacheKey::price("AAPL")).await.unwrap().unwrap();
        assert_eq!(stored.payload["price"], 3.0);
    }

    #[tokio::test]
    async fn test_put_batch_counts_outcomes() {
        let (_dir, tier) = open_temp();
        tier.put(price("MSFT", 9.0, at(60))).await.unwrap();

        let outcome = tier
            .put_batch(vec![price("AAPL", 1.0, at(0)), price("MSFT", 8.0, at(0))])
            .await
            .unwrap();
        assert_eq!(outcome, BatchOutcome { applied: 1, rejected: 1 });
    }

    #[tokio::test]
    async fn test_metadata_keys_use_metadata_table() {
        let (_dir, tier) = open_temp();
        let meta = MetadataEntry::new("AAPL", Some("NMS".into()), Some("Apple Inc.".into()), at(0));
        tier.put(meta.to_cache_entry().unwrap()).await.unwrap();

        assert_eq!(tier.get_metadata("aapl").await.unwrap(), Some(meta.clone()));
        let via_key = tier.get(&CacheKey::metadata("AAPL")).await.unwrap().unwrap();
        assert_eq!(MetadataEntry::from_cache_entry(&via_key).unwrap(), meta);
        assert_eq!(tier.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_metadata_out_of_order_rejected() {
        let (_dir, tier) = open_temp();
        tier.put_metadata(MetadataEntry::new("AAPL", Some("NMS".into()), None, at(100)))
            .await
            .unwrap();
        let outcome = tier
            .put_metadata(MetadataEntry::new("AAPL", Some("NYQ".into()), None, at(0)))
            .await
            .unwrap();

        assert_eq!(outcome, PutOutcome::Rejected);
        let stored = tier.get_metadata("AAPL").await.unwrap().unwrap();
        assert_eq!(stored.exchange.as_deref(), Some("NMS"));
    }

    #[tokio::test]
    async fn test_prune_by_horizon() {
        let (_dir, tier) = open_temp();
        let now = at(0);
        tier.put(price("OLD", 1.0, now - Duration::days(31))).await.unwrap();
        tier.put(price("NEW", 1.0, now - Duration::days(29))).await.unwrap();

        let removed = tier.prune(now - Duration::days(30)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(tier.get(&CacheKey::price("OLD")).await.unwrap().is_none());
        assert!(tier.get(&CacheKey::price("NEW")).await.unwrap().is_some());

        // Idempotent
        assert_eq!(tier.prune(now - Duration::days(30)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_metadata_by_horizon() {
        let (_dir, tier) = open_temp();
        let now = at(0);
        tier.put_metadata(MetadataEntry::new("OLD", None, None, now - Duration::days(200)))
            .await
            .unwrap();
        tier.put_metadata(MetadataEntry::new("NEW", None, None, now - Duration::days(10)))
            .await
            .unwrap();

        assert_eq!(tier.prune_metadata(now - Duration::days(180)).await.unwrap(), 1);
        let remaining = tier.load_metadata().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].symbol, "NEW");
    }

    #[tokio::test]
    async fn test_load_recent_window() {
        let (_dir, tier) = open_temp();
        let now = at(0);
        tier.put_batch(vec![
            price("A", 1.0, now - Duration::hours(30)),
            price("B", 1.0, now - Duration::hours(2)),
            CacheEntry::new(CacheKey::news("B"), serde_json::json!([]), now, MarketStatus::Open),
        ])
        .await
        .unwrap();

        let recent = tier.load_recent(now - Duration::hours(24)).await.unwrap();
        let keys: Vec<String> = recent.iter().map(|e| e.key.to_string()).collect();
        assert_eq!(keys, vec!["price:B".to_string(), "news:B".to_string()]);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        {
            let tier = PersistentTier::open(&path, PersistentOptions::default());
            tier.put(price("AAPL", 5.0, at(0))).await.unwrap();
            tier.close().await.unwrap();
        }

        let tier = PersistentTier::open(&path, PersistentOptions::default());
        let stored = tier.get(&CacheKey::price("AAPL")).await.unwrap().unwrap();
        assert_eq!(stored.payload["price"], 5.0);
    }

    #[tokio::test]
    async fn test_closed_tier_reports_disabled() {
        let (_dir, tier) = open_temp();
        tier.close().await.unwrap();

        assert!(!tier.is_enabled());
        assert!(matches!(tier.get(&CacheKey::price("AAPL")).await, Err(CacheError::Disabled)));
        assert!(tier.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_unopenable_path_yields_disabled_tier() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let tier = PersistentTier::open(blocker.join("cache.db"), PersistentOptions::default());
        assert!(!tier.is_enabled());
        assert!(matches!(tier.put(price("AAPL", 1.0, at(0))).await, Err(CacheError::Disabled)));
    }

    #[tokio::test]
    async fn test_repeated_failures_disable_tier() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        let tier = PersistentTier::open(
            &path,
            PersistentOptions {
                read_pool_size: 1,
                failure_limit: 2,
            },
        );

        Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE cache_entries")
            .unwrap();

        assert!(tier.put(price("AAPL", 1.0, at(0))).await.is_err());
        assert!(tier.is_enabled());
        assert!(tier.put(price("AAPL", 1.0, at(1))).await.is_err());
        assert!(!tier.is_enabled());
        assert!(matches!(tier.put(price("AAPL", 1.0, at(2))).await, Err(CacheError::Disabled)));
    }
}
