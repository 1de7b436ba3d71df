//! In-flight request tracking
//!
//! Maps each cache key being fetched to the shared future of the batch that
//! will answer it, so identical concurrent requests attach to one remote call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::cache::{CacheEntry, CacheKey};
use crate::error::FetchError;

/// Outcome of one symbol within a batch.
pub(crate) type FlightOutcome = Result<CacheEntry, FetchError>;

/// Outcomes of a whole batch, keyed by normalised symbol.
pub(crate) type BatchOutcomes = Arc<HashMap<String, FlightOutcome>>;

pub(crate) type SharedBatch = Shared<BoxFuture<'static, BatchOutcomes>>;

/// How a key was attached to a flight.
pub(crate) enum Slot {
    /// This caller started the batch
    Led(SharedBatch),
    /// An identical request was already running
    Joined(SharedBatch),
}

impl Slot {
    pub(crate) fn batch(&self) -> SharedBatch {
        match self {
            Slot::Led(batch) | Slot::Joined(batch) => batch.clone(),
        }
    }

    pub(crate) fn is_joined(&self) -> bool {
        matches!(self, Slot::Joined(_))
    }
}

struct Flight {
    id: u64,
    forced: bool,
    batch: SharedBatch,
}

#[derive(Default)]
struct Flights {
    next_id: u64,
    by_key: HashMap<CacheKey, Flight>,
}

// == Flight Map ==
#[derive(Default)]
pub(crate) struct FlightMap {
    inner: Mutex<Flights>,
}

impl FlightMap {
    /// Attaches every key to a flight, starting one batch for the keys that
    /// have none.
    ///
    /// A non-forced request joins any flight for its key. A forced request
    /// only joins forced flights; otherwise it leads a new one, which takes
    /// over the key while the older flight finishes on its own.
    ///
    /// `start` receives the flight id and the keys to fetch, and is called
    /// at most once. Slots come back in the order of `keys`.
    pub(crate) fn claim<F>(&self, keys: &[CacheKey], forced: bool, start: F) -> Vec<Slot>
    where
        F: FnOnce(u64, Vec<CacheKey>) -> BoxFuture<'static, BatchOutcomes>,
    {
        let mut flights = self.lock();

        let mut slots: Vec<Option<Slot>> = Vec::with_capacity(keys.len());
        let mut leading = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            match flights.by_key.get(key) {
                Some(flight) if flight.forced || !forced => {
                    slots.push(Some(Slot::Joined(flight.batch.clone())))
                }
                _ => {
                    slots.push(None);
                    leading.push(index);
                }
            }
        }

        if !leading.is_empty() {
            let id = flights.next_id;
            flights.next_id += 1;

            let batch = start(id, leading.iter().map(|&i| keys[i].clone()).collect()).shared();
            for &index in &leading {
                flights.by_key.insert(
                    keys[index].clone(),
                    Flight {
                        id,
                        forced,
                        batch: batch.clone(),
                    },
                );
                slots[index] = Some(Slot::Led(batch.clone()));
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Detaches the keys of a finished flight.
    ///
    /// Keys since taken over by a newer flight are left alone.
    pub(crate) fn complete(&self, keys: &[CacheKey], id: u64) {
        let mut flights = self.lock();
        for key in keys {
            if flights.by_key.get(key).is_some_and(|flight| flight.id == id) {
                flights.by_key.remove(key);
            }
        }
    }

    /// Number of keys currently being fetched.
    pub(crate) fn in_flight(&self) -> usize {
        self.lock().by_key.len()
    }

    /// Guard that completes flight `id` for `keys` when dropped.
    ///
    /// Held by the batch task, so the keys are released even if the remote
    /// call panics or the task is cancelled.
    pub(crate) fn release_on_drop<'a>(&'a self, keys: &'a [CacheKey], id: u64) -> FlightRelease<'a> {
        FlightRelease {
            flights: self,
            keys,
            id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Flights> {
        // Every critical section leaves the map consistent, so a panic
        // elsewhere does not invalidate it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) struct FlightRelease<'a> {
    flights: &'a FlightMap,
    keys: &'a [CacheKey],
    id: u64,
}

impl Drop for FlightRelease<'_> {
    fn drop(&mut self) {
        self.flights.complete(self.keys, self.id);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ready_batch() -> BoxFuture<'static, BatchOutcomes> {
        futures::future::ready(Arc::new(HashMap::new())).boxed()
    }

    fn pending_batch() -> BoxFuture<'static, BatchOutcomes> {
        futures::future::pending().boxed()
    }

    #[test]
    fn test_first_claim_leads() {
        let flights = FlightMap::default();
        let slots = flights.claim(&[CacheKey::price("AAPL"), CacheKey::price("MSFT")], false, |_, keys| {
            assert_eq!(keys.len(), 2);
            pending_batch()
        });

        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| !s.is_joined()));
        assert_eq!(flights.in_flight(), 2);
    }

    #[test]
    fn test_identical_claim_joins() {
        let flights = FlightMap::default();
        let starts = AtomicUsize::new(0);
        let start = |_, _| {
            starts.fetch_add(1, Ordering::SeqCst);
            pending_batch()
        };

        flights.claim(&[CacheKey::price("AAPL")], false, start);
        let slots = flights.claim(&[CacheKey::price("AAPL")], false, |_, _| {
            starts.fetch_add(1, Ordering::SeqCst);
            pending_batch()
        });

        assert!(slots[0].is_joined());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_partial_overlap_starts_batch_for_the_rest() {
        let flights = FlightMap::default();
        flights.claim(&[CacheKey::price("AAPL")], false, |_, _| pending_batch());

        let slots = flights.claim(&[CacheKey::price("AAPL"), CacheKey::price("MSFT")], false, |_, keys| {
            assert_eq!(keys, vec![CacheKey::price("MSFT")]);
            pending_batch()
        });
        assert!(slots[0].is_joined());
        assert!(!slots[1].is_joined());
    }

    #[test]
    fn test_forced_does_not_join_unforced() {
        let flights = FlightMap::default();
        flights.claim(&[CacheKey::price("AAPL")], false, |_, _| pending_batch());

        let forced = flights.claim(&[CacheKey::price("AAPL")], true, |_, _| pending_batch());
        assert!(!forced[0].is_joined());

        // Both kinds of request may join the forced flight
        let again = flights.claim(&[CacheKey::price("AAPL")], true, |_, _| pending_batch());
        let plain = flights.claim(&[CacheKey::price("AAPL")], false, |_, _| pending_batch());
        assert!(again[0].is_joined());
        assert!(plain[0].is_joined());
    }

    #[test]
    fn test_complete_ignores_superseded_keys() {
        let flights = FlightMap::default();
        let mut first_id = None;
        flights.claim(&[CacheKey::price("AAPL")], false, |id, _| {
            first_id = Some(id);
            pending_batch()
        });
        flights.claim(&[CacheKey::price("AAPL")], true, |_, _| pending_batch());

        flights.complete(&[CacheKey::price("AAPL")], first_id.unwrap());
        assert_eq!(flights.in_flight(), 1, "the forced flight still owns the key");
    }

    #[tokio::test]
    async fn test_complete_frees_key() {
        let flights = FlightMap::default();
        let mut flight_id = 0;
        let slots = flights.claim(&[CacheKey::price("AAPL")], false, |id, _| {
            flight_id = id;
            ready_batch()
        });
        slots[0].batch().await;
        flights.complete(&[CacheKey::price("AAPL")], flight_id);

        assert_eq!(flights.in_flight(), 0);
    }

    #[test]
    fn test_release_guard_frees_keys_during_unwind() {
        let flights = FlightMap::default();
        let keys = vec![CacheKey::price("AAPL"), CacheKey::price("MSFT")];
        let mut flight_id = 0;
        flights.claim(&keys, false, |id, _| {
            flight_id = id;
            pending_batch()
        });
        assert_eq!(flights.in_flight(), 2);

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _release = flights.release_on_drop(&keys, flight_id);
            panic!("remote call blew up");
        }));

        assert!(unwound.is_err());
        assert_eq!(flights.in_flight(), 0);
    }
}
