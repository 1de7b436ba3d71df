//! Prune Task
//!
//! Background task that periodically deletes persisted entries whose
//! `fetched_at` is past the retention horizon, and metadata that has not been
//! verified within its own, longer horizon.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::storage::PersistentTier;

// == Settings ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneSettings {
    /// Age beyond which price, history and news entries are deleted
    pub retention: Duration,
    /// Age beyond which ticker metadata is deleted
    pub metadata_retention: Duration,
    /// Time between runs
    pub interval: Duration,
}

impl Default for PruneSettings {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 86_400),
            metadata_retention: Duration::from_secs(180 * 86_400),
            interval: Duration::from_secs(3_600),
        }
    }
}

/// Rows removed by one pruning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub entries_removed: usize,
    pub metadata_removed: usize,
}

// == Prune Once ==
/// Deletes everything older than the configured horizons as of `now`.
///
/// Safe to run repeatedly; a second run with the same `now` removes nothing.
pub async fn prune_once(
    store: &PersistentTier,
    settings: &PruneSettings,
    now: DateTime<Utc>,
) -> Result<PruneReport> {
    let entries_removed = store.prune(horizon(now, settings.retention)).await?;
    let metadata_removed = store
        .prune_metadata(horizon(now, settings.metadata_retention))
        .await?;
    Ok(PruneReport {
        entries_removed,
        metadata_removed,
    })
}

fn horizon(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Spawns a background task that prunes the persistent tier.
///
/// The first run happens immediately, then one every `settings.interval`.
/// Pruning goes through the store's ordinary writer, so it never blocks
/// readers and never interleaves with another write.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let store = Arc::new(PersistentTier::open("cache.db", PersistentOptions::default()));
/// let prune_handle = spawn_prune_task(store.clone(), PruneSettings::default());
/// // Later, during shutdown:
/// prune_handle.abort();
/// ```
pub fn spawn_prune_task(store: Arc<PersistentTier>, settings: PruneSettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting prune task: retention {:?}, metadata retention {:?}, interval {:?}",
            settings.retention, settings.metadata_retention, settings.interval
        );

        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately
            ticker.tick().await;

            if !store.is_enabled() {
                debug!("Prune skipped: persistent store is disabled");
                continue;
            }

            match prune_once(&store, &settings, Utc::now()).await {
                Ok(report) if report.entries_removed + report.metadata_removed > 0 => info!(
                    "Pruned {} entries and {} metadata rows",
                    report.entries_removed, report.metadata_removed
                ),
                Ok(_) => debug!("Prune: nothing past the retention horizon"),
                Err(e) => warn!("Prune failed: {}", e),
            }
        }
    })
}
