//! Store File Module
//!
//! Opens the SQLite file behind the persistent tier, creates or checks its
//! schema, and recovers from a damaged file by starting over.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{CacheError, Result};

/// Bumped whenever the table layout changes; older files are rebuilt.
pub const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    category      TEXT    NOT NULL,
    symbol        TEXT    NOT NULL,
    granularity   TEXT    NOT NULL DEFAULT '',
    payload       TEXT    NOT NULL,
    fetched_at    INTEGER NOT NULL,
    market_status TEXT    NOT NULL,
    source        TEXT    NOT NULL,
    PRIMARY KEY (category, symbol, granularity)
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_fetched_at ON cache_entries (fetched_at);

CREATE TABLE IF NOT EXISTS ticker_metadata (
    symbol           TEXT    PRIMARY KEY,
    exchange         TEXT,
    display_name     TEXT,
    last_verified_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ticker_metadata_verified ON ticker_metadata (last_verified_at);
";

// == Open ==
/// Opens the writer connection, rebuilding the file if it cannot be used.
///
/// A file that is unreadable, not a database, fails its integrity check or
/// carries an unknown schema version is removed together with its WAL
/// companions and recreated empty.
pub fn open_or_reinitialize(path: &Path) -> Result<Connection> {
    match open_writer(path) {
        Ok(conn) => Ok(conn),
        Err(e) => {
            warn!("Store at {} is unusable ({}); reinitialising", path.display(), e);
            remove_store_files(path)?;
            open_writer(path)
        }
    }
}

/// Opens a reader connection. Readers never write.
pub fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(conn)
}

fn open_writer(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if check != "ok" {
        return Err(CacheError::Internal(format!("integrity check failed: {}", check)));
    }

    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!("Store journal mode is {} rather than WAL", mode);
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    match version {
        0 => {
            conn.execute_batch(SCHEMA)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            info!("Initialised store schema v{} at {}", SCHEMA_VERSION, path.display());
        }
        SCHEMA_VERSION => conn.execute_batch(SCHEMA)?,
        other => {
            return Err(CacheError::Internal(format!(
                "unsupported schema version {} (expected {})",
                other, SCHEMA_VERSION
            )))
        }
    }

    Ok(conn)
}

/// Deletes the store file and its `-wal`/`-shm` companions if present.
pub fn remove_store_files(path: &Path) -> Result<()> {
    for file in store_files(path) {
        match fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn store_files(path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}
