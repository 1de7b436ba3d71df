//! Fetch Pipeline
//!
//! Answers category requests for a set of symbols from memory, then from the
//! persistent tier, and finally with one remote batch call for whatever is
//! missing or expired. Identical in-flight keys share a call, failures are
//! isolated per symbol, and successes are written through to both tiers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::cache::{
    normalize_symbol, normalize_symbols, now_millis, CacheEntry, CacheKey, CacheStats, Category,
    Decision, Granularity, MemoryTier, PutOutcome, TtlPolicy,
};
use crate::config::MetadataRefresh;
use crate::error::{CacheError, FetchError, Result};
use crate::market::{MarketOracle, MarketPhase, MarketStatus};
use crate::models::{FetchResult, Served, Tier};
use crate::pipeline::flight::{BatchOutcomes, FlightMap};
use crate::pipeline::source::MarketDataSource;
use crate::storage::PersistentTier;

/// Completion notifications buffered per subscriber.
const EVENT_CAPACITY: usize = 256;

// == Options ==
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub policy: TtlPolicy,
    pub oracle: MarketOracle,
    pub metadata_refresh: MetadataRefresh,
    /// How far back `warm_up` reaches into the persistent tier
    pub warm_window: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            policy: TtlPolicy::default(),
            oracle: MarketOracle::new(),
            metadata_refresh: MetadataRefresh::default(),
            warm_window: Duration::from_secs(86_400),
        }
    }
}

// == Requests and Notifications ==
/// A fetch to run in the background with `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub category: Category,
    pub symbols: Vec<String>,
    pub granularity: Option<Granularity>,
    pub force: bool,
}

impl FetchRequest {
    pub fn new<I, S>(category: Category, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category,
            symbols: symbols.into_iter().map(Into::into).collect(),
            granularity: None,
            force: false,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Bypass cached entries and go to the remote source.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Broadcast when a submitted fetch finishes.
#[derive(Debug, Clone)]
pub struct FetchCompleted {
    pub request_id: u64,
    pub category: Category,
    pub result: Arc<FetchResult>,
}

/// What `submit` hands back.
#[derive(Debug)]
pub enum Submission {
    /// Every symbol was fresh in memory
    Ready(FetchResult),
    /// A worker is fetching; the result also goes out as `FetchCompleted`
    Pending(PendingFetch),
}

#[derive(Debug)]
pub struct PendingFetch {
    pub request_id: u64,
    receiver: oneshot::Receiver<FetchResult>,
}

impl PendingFetch {
    /// Waits for the worker to finish.
    pub async fn wait(self) -> Result<FetchResult> {
        self.receiver
            .await
            .map_err(|_| CacheError::Internal("fetch worker stopped before answering".to_string()))
    }
}

/// What `warm_up` loaded into memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmUpReport {
    pub entries: usize,
    pub metadata: usize,
}

// == Internals ==
#[derive(Debug, Clone, Copy)]
enum Lookup {
    /// Consult the tiers under the freshness policy
    Cached { force: bool },
    /// Skip the freshness check and always call the remote source
    Remote,
}

impl Lookup {
    fn is_forced(&self) -> bool {
        !matches!(self, Lookup::Cached { force: false })
    }
}

enum Cached {
    Hit(Served),
    /// Needs a remote call; carries the best entry to fall back on
    Refresh(Option<(CacheEntry, Tier)>),
}

struct Pending {
    symbol: String,
    key: CacheKey,
    status: MarketStatus,
    fallback: Option<(CacheEntry, Tier)>,
}

struct Inner {
    memory: MemoryTier,
    persistent: Arc<PersistentTier>,
    source: Arc<dyn MarketDataSource>,
    policy: TtlPolicy,
    oracle: MarketOracle,
    metadata_refresh: MetadataRefresh,
    warm_window: Duration,
    flights: FlightMap,
    /// Symbols the persistent tier had no exchange for
    unresolved: RwLock<HashSet<String>>,
    stats: Mutex<CacheStats>,
    events: broadcast::Sender<FetchCompleted>,
    next_request_id: AtomicU64,
}

impl Inner {
    async fn record(&self, f: impl FnOnce(&mut CacheStats)) {
        f(&mut *self.stats.lock().await);
    }
}

// == Fetch Pipeline ==
/// Cheap to clone; clones share tiers, flights and statistics.
#[derive(Clone)]
pub struct FetchPipeline {
    inner: Arc<Inner>,
}

impl FetchPipeline {
    // == Constructor ==
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        persistent: Arc<PersistentTier>,
        options: PipelineOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                memory: MemoryTier::new(),
                persistent,
                source,
                policy: options.policy,
                oracle: options.oracle,
                metadata_refresh: options.metadata_refresh,
                warm_window: options.warm_window,
                flights: FlightMap::default(),
                unresolved: RwLock::new(HashSet::new()),
                stats: Mutex::new(CacheStats::new()),
                events,
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    // == Fetch ==
    /// Returns one outcome per distinct requested symbol.
    ///
    /// `granularity` only matters for history and defaults to daily bars
    /// over one month. With `force`, cached entries are bypassed (metadata
    /// excepted) but still served, flagged stale, if the refresh fails.
    pub async fn fetch<I, S>(
        &self,
        category: Category,
        symbols: I,
        granularity: Option<Granularity>,
        force: bool,
    ) -> FetchResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.execute(
            category,
            normalize_symbols(symbols),
            granularity,
            Lookup::Cached { force },
        )
        .await
    }

    /// Runs a request in the background unless memory can answer it outright.
    pub async fn submit(&self, request: FetchRequest) -> Submission {
        let symbols = normalize_symbols(&request.symbols);
        let granularity = effective_granularity(request.category, request.granularity);

        if !request.force {
            if let Some(result) = self
                .memory_answer(request.category, &symbols, granularity.clone())
                .await
            {
                return Submission::Ready(result);
            }
        }

        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        let pipeline = self.clone();
        let category = request.category;
        let lookup = Lookup::Cached {
            force: request.force,
        };

        tokio::spawn(async move {
            let result = pipeline.execute(category, symbols, granularity, lookup).await;
            // No subscribers is fine
            let _ = pipeline.inner.events.send(FetchCompleted {
                request_id,
                category,
                result: Arc::new(result.clone()),
            });
            let _ = reply_tx.send(result);
        });

        Submission::Pending(PendingFetch {
            request_id,
            receiver: reply_rx,
        })
    }

    /// Receives a `FetchCompleted` for every submitted fetch that finishes.
    pub fn subscribe(&self) -> broadcast::Receiver<FetchCompleted> {
        self.inner.events.subscribe()
    }

    // == Peeks ==
    /// Memory-only lookup, regardless of freshness.
    pub async fn cached(
        &self,
        category: Category,
        symbol: &str,
        granularity: Option<Granularity>,
    ) -> Option<CacheEntry> {
        let key = CacheKey::new(category, symbol, granularity);
        self.inner.memory.get(&key).await
    }

    /// Exchange code of `symbol`, from memory or stored metadata.
    ///
    /// The store is asked at most once per symbol; metadata fetched later
    /// lands in memory and is found there.
    pub async fn exchange_for(&self, symbol: &str) -> Option<String> {
        let symbol = normalize_symbol(symbol)?;
        if let Some(exchange) = self.inner.memory.exchange_of(&symbol).await {
            return Some(exchange);
        }
        if !self.inner.persistent.is_enabled() {
            return None;
        }
        if self.inner.unresolved.read().await.contains(&symbol) {
            return None;
        }

        match self.inner.persistent.get_metadata(&symbol).await {
            Ok(Some(meta)) => {
                if let Ok(entry) = meta.to_cache_entry() {
                    self.inner.memory.put(entry).await;
                }
                if meta.exchange.is_none() {
                    self.inner.unresolved.write().await.insert(symbol);
                }
                meta.exchange
            }
            Ok(None) => {
                self.inner.unresolved.write().await.insert(symbol);
                None
            }
            Err(e) => {
                self.note_persistence_error(&e).await;
                None
            }
        }
    }

    /// Market phase used for `symbol` right now.
    pub async fn phase_for(&self, symbol: &str) -> MarketPhase {
        let exchange = self.exchange_for(symbol).await;
        self.inner.oracle.phase_for(exchange.as_deref(), Utc::now())
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.stats.lock().await.clone()
    }

    /// Keys currently waiting on a remote call.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.in_flight()
    }

    // == Lifecycle ==
    /// Loads recently fetched entries and all metadata into memory.
    pub async fn warm_up(&self) -> WarmUpReport {
        let persistent = &self.inner.persistent;
        if !persistent.is_enabled() {
            return WarmUpReport::default();
        }

        let since = chrono::Duration::from_std(self.inner.warm_window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let entries = match persistent.load_recent(since).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Warm-up could not load stored entries: {}", e);
                Vec::new()
            }
        };
        let metadata: Vec<CacheEntry> = match persistent.load_metadata().await {
            Ok(metadata) => metadata
                .iter()
                .filter_map(|meta| meta.to_cache_entry().ok())
                .collect(),
            Err(e) => {
                warn!("Warm-up could not load stored metadata: {}", e);
                Vec::new()
            }
        };

        let report = WarmUpReport {
            entries: entries.len(),
            metadata: metadata.len(),
        };
        self.inner.memory.put_all(entries).await;
        self.inner.memory.put_all(metadata).await;

        info!(
            "Warmed memory tier with {} entries and {} metadata records",
            report.entries, report.metadata
        );
        report
    }

    /// Closes the persistent tier once queued writes have landed.
    ///
    /// Later fetches still work, from memory and the remote source only.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.persistent.close().await
    }

    // == Pipeline ==
    async fn execute(
        &self,
        category: Category,
        symbols: Vec<String>,
        granularity: Option<Granularity>,
        lookup: Lookup,
    ) -> FetchResult {
        let granularity = effective_granularity(category, granularity);
        let now = now_millis();
        let mut result = FetchResult::new(category, granularity.clone());
        let mut pending = Vec::new();

        for symbol in symbols {
            let key = CacheKey::new(category, &symbol, granularity.clone());
            let phase = self.phase_at(category, &symbol, now).await;

            match self.lookup_cached(&key, &phase, lookup, now).await {
                Cached::Hit(served) => result.insert(symbol, Ok(served)),
                Cached::Refresh(fallback) => pending.push(Pending {
                    symbol,
                    key,
                    status: phase.status,
                    fallback,
                }),
            }
        }

        if !pending.is_empty() {
            self.refresh(category, granularity, pending, lookup.is_forced(), &mut result)
                .await;
        }

        if category == Category::Price {
            let fetched: Vec<String> = result
                .entries()
                .filter(|(_, served)| served.tier == Tier::Remote)
                .map(|(symbol, _)| symbol.to_string())
                .collect();
            self.schedule_metadata_refresh(fetched);
        }

        result
    }

    async fn lookup_cached(
        &self,
        key: &CacheKey,
        phase: &MarketPhase,
        lookup: Lookup,
        now: DateTime<Utc>,
    ) -> Cached {
        let inner = &self.inner;
        let force = match lookup {
            Lookup::Cached { force } => Some(force),
            Lookup::Remote => None,
        };

        let in_memory = inner.memory.get(key).await;
        if let (Some(entry), Some(force)) = (&in_memory, force) {
            if inner.policy.decide(Some(entry), phase, force, now) == Decision::Hit {
                inner.record(CacheStats::record_memory_hit).await;
                return Cached::Hit(Served::fresh(entry.clone(), Tier::Memory));
            }
        }

        let stored = self.stored(key).await;
        let fallback = newest(
            in_memory.map(|e| (e, Tier::Memory)),
            stored.map(|e| (e, Tier::Persistent)),
        );

        if let (Some((entry, Tier::Persistent)), Some(force)) = (&fallback, force) {
            if inner.policy.decide(Some(entry), phase, force, now) == Decision::Hit {
                inner.memory.put(entry.clone()).await;
                inner.record(CacheStats::record_persistent_hit).await;
                return Cached::Hit(Served::fresh(entry.clone(), Tier::Persistent));
            }
        }

        inner.record(CacheStats::record_miss).await;
        Cached::Refresh(fallback)
    }

    /// Issues (or joins) remote calls for `pending` and records each outcome.
    async fn refresh(
        &self,
        category: Category,
        granularity: Option<Granularity>,
        pending: Vec<Pending>,
        forced: bool,
        result: &mut FetchResult,
    ) {
        let keys: Vec<CacheKey> = pending.iter().map(|p| p.key.clone()).collect();
        let statuses: HashMap<CacheKey, MarketStatus> =
            pending.iter().map(|p| (p.key.clone(), p.status)).collect();

        let inner = self.inner.clone();
        let slots = self.inner.flights.claim(&keys, forced, move |flight_id, leading| {
            let task = tokio::spawn(run_batch(
                inner,
                flight_id,
                category,
                granularity,
                leading,
                statuses,
            ));
            async move {
                task.await.unwrap_or_else(|e| {
                    error!("Remote batch task failed: {}", e);
                    Arc::new(HashMap::new())
                })
            }
            .boxed()
        });

        let joined = slots.iter().filter(|slot| slot.is_joined()).count();
        if joined > 0 {
            debug!(category = %category, joined, "Joined in-flight requests");
            self.inner
                .record(|stats| stats.record_joined_flights(joined))
                .await;
        }

        for (pending, slot) in pending.into_iter().zip(slots) {
            let outcomes = slot.batch().await;
            let outcome = outcomes
                .get(&pending.symbol)
                .cloned()
                .unwrap_or(Err(FetchError::NetworkFailure));

            let served = match outcome {
                Ok(entry) => Ok(Served::fresh(entry, Tier::Remote)),
                Err(error) => match pending.fallback {
                    Some((entry, tier)) if error.allows_stale_fallback() => {
                        debug!(symbol = %pending.symbol, %error, "Serving last known value");
                        self.inner.record(CacheStats::record_stale_served).await;
                        Ok(Served::stale(entry, tier))
                    }
                    _ => Err(error),
                },
            };
            result.insert(pending.symbol, served);
        }
    }

    /// Answers from memory alone, or `None` if any symbol is not a fresh hit.
    async fn memory_answer(
        &self,
        category: Category,
        symbols: &[String],
        granularity: Option<Granularity>,
    ) -> Option<FetchResult> {
        let now = now_millis();
        let mut result = FetchResult::new(category, granularity.clone());
        for symbol in symbols {
            let key = CacheKey::new(category, symbol, granularity.clone());
            let entry = self.inner.memory.get(&key).await?;
            let phase = self.phase_at(category, symbol, now).await;
            if self.inner.policy.decide(Some(&entry), &phase, false, now) != Decision::Hit {
                return None;
            }
            result.insert(symbol.clone(), Ok(Served::fresh(entry, Tier::Memory)));
        }

        let hits = result.len() as u64;
        self.inner.record(|stats| stats.memory_hits += hits).await;
        Some(result)
    }

    async fn phase_at(&self, category: Category, symbol: &str, now: DateTime<Utc>) -> MarketPhase {
        if category == Category::Metadata {
            return MarketPhase::unknown();
        }
        let exchange = self.exchange_for(symbol).await;
        self.inner.oracle.phase_for(exchange.as_deref(), now)
    }

    /// Persistent read with failures reduced to a miss.
    async fn stored(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.inner.persistent.is_enabled() {
            return None;
        }
        match self.inner.persistent.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                self.note_persistence_error(&e).await;
                None
            }
        }
    }

    async fn note_persistence_error(&self, e: &CacheError) {
        if !matches!(e, CacheError::Disabled) {
            warn!("Persistent tier read failed: {}", e);
            self.inner
                .record(CacheStats::record_persistence_failure)
                .await;
        }
    }

    // == Metadata Refresh ==
    fn schedule_metadata_refresh(&self, symbols: Vec<String>) {
        let policy = self.inner.metadata_refresh;
        if symbols.is_empty() || policy == MetadataRefresh::Never {
            return;
        }
        tokio::spawn(self.clone().refresh_metadata(symbols, policy));
    }

    fn refresh_metadata(self, symbols: Vec<String>, policy: MetadataRefresh) -> BoxFuture<'static, ()> {
        async move {
            let (targets, lookup) = match policy {
                MetadataRefresh::EveryFetch => (symbols, Lookup::Remote),
                _ => {
                    let mut unseen = Vec::new();
                    for symbol in symbols {
                        if self.inner.memory.get(&CacheKey::metadata(&symbol)).await.is_none() {
                            unseen.push(symbol);
                        }
                    }
                    (unseen, Lookup::Cached { force: false })
                }
            };
            if targets.is_empty() {
                return;
            }

            let result = self.execute(Category::Metadata, targets, None, lookup).await;
            let failed = result.errors().count();
            debug!(
                symbols = result.len(),
                failed, "Metadata refresh finished"
            );
        }
        .boxed()
    }
}

// == Remote Batch ==
/// Calls the remote source once for `keys` and writes successes through.
///
/// Runs as its own task so the write-through completes even if every
/// waiting caller goes away. The flight is released on every exit, panics
/// included, so later requests issue a fresh call.
async fn run_batch(
    inner: Arc<Inner>,
    flight_id: u64,
    category: Category,
    granularity: Option<Granularity>,
    keys: Vec<CacheKey>,
    statuses: HashMap<CacheKey, MarketStatus>,
) -> BatchOutcomes {
    let _release = inner.flights.release_on_drop(&keys, flight_id);
    let symbols: Vec<String> = keys.iter().map(|k| k.symbol.clone()).collect();
    // Stamped at issue time so a slow older call cannot overwrite a newer one.
    let fetched_at = now_millis();

    debug!(category = %category, symbols = symbols.len(), "Issuing remote batch");
    inner.record(CacheStats::record_remote_batch).await;

    let mut answers: HashMap<String, std::result::Result<serde_json::Value, FetchError>> = match inner
        .source
        .fetch_batch(category, &symbols, granularity.as_ref())
        .await
    {
        Ok(response) => response
            .into_iter()
            .filter_map(|(symbol, answer)| normalize_symbol(&symbol).map(|s| (s, answer)))
            .collect(),
        Err(error) => {
            warn!(category = %category, %error, symbols = symbols.len(), "Remote batch failed");
            symbols.iter().map(|s| (s.clone(), Err(error))).collect()
        }
    };

    let mut outcomes = HashMap::with_capacity(keys.len());
    let mut written = Vec::new();
    for key in &keys {
        let outcome = match answers.remove(&key.symbol).unwrap_or(Err(FetchError::NoData)) {
            Ok(payload) => {
                let status = statuses.get(key).copied().unwrap_or(MarketStatus::Open);
                let entry = CacheEntry::new(key.clone(), payload, fetched_at, status);
                match inner.memory.put(entry.clone()).await {
                    PutOutcome::Applied => {
                        written.push(entry.clone());
                        Ok(entry)
                    }
                    PutOutcome::Rejected => {
                        // A later-issued call already landed; hand out its value.
                        inner.record(CacheStats::record_rejected_write).await;
                        Ok(inner.memory.get(key).await.unwrap_or(entry))
                    }
                }
            }
            Err(error) => {
                debug!(symbol = %key.symbol, %error, "Symbol failed");
                Err(error)
            }
        };
        outcomes.insert(key.symbol.clone(), outcome);
    }

    persist(&inner, written).await;
    Arc::new(outcomes)
}

/// Best-effort write-through; failures are logged and counted, never returned.
async fn persist(inner: &Inner, entries: Vec<CacheEntry>) {
    if entries.is_empty() || !inner.persistent.is_enabled() {
        return;
    }
    match inner.persistent.put_batch(entries).await {
        Ok(outcome) if outcome.rejected > 0 => {
            inner
                .record(|stats| stats.rejected_writes += outcome.rejected as u64)
                .await
        }
        Ok(_) | Err(CacheError::Disabled) => {}
        Err(e) => {
            warn!("Could not persist fetched entries: {}", e);
            inner.record(CacheStats::record_persistence_failure).await;
        }
    }
}

fn effective_granularity(category: Category, granularity: Option<Granularity>) -> Option<Granularity> {
    (category == Category::History).then(|| granularity.unwrap_or_default())
}

/// The more recently fetched of two candidates; memory wins ties.
fn newest(
    memory: Option<(CacheEntry, Tier)>,
    stored: Option<(CacheEntry, Tier)>,
) -> Option<(CacheEntry, Tier)> {
    match (memory, stored) {
        (Some(m), Some(s)) => Some(if s.0.fetched_at > m.0.fetched_at { s } else { m }),
        (m, s) => m.or(s),
    }
}
