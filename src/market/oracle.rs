//! Market Status Oracle
//!
//! Answers "is this exchange trading right now" for the cache policy. Unknown
//! exchanges degrade to `Open`, the shortest TTL, so a calendar gap costs
//! extra remote calls instead of serving stale prices as fresh.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::calendar::ExchangeCalendar;
use super::registry::default_calendars;
use super::MarketStatus;

// == Market Phase ==
/// Snapshot of an exchange's session at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketPhase {
    pub status: MarketStatus,
    /// When the current status began, if known
    pub since: Option<DateTime<Utc>>,
    /// When the status next changes, if ever
    pub next_boundary: Option<DateTime<Utc>>,
}

impl MarketPhase {
    /// Phase used when the exchange cannot be resolved.
    pub fn unknown() -> Self {
        Self {
            status: MarketStatus::Open,
            since: None,
            next_boundary: None,
        }
    }
}

// == Market Oracle ==
/// Resolves exchange codes to calendars and reports session status.
#[derive(Debug, Clone)]
pub struct MarketOracle {
    calendars: HashMap<String, Arc<ExchangeCalendar>>,
}

impl Default for MarketOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketOracle {
    // == Constructors ==
    /// Creates an oracle loaded with the built-in exchange calendars.
    pub fn new() -> Self {
        let mut oracle = Self::empty();
        for (codes, calendar) in default_calendars() {
            for code in codes {
                oracle.calendars.insert(code.to_string(), calendar.clone());
            }
        }
        oracle
    }

    /// Creates an oracle that knows no exchanges.
    pub fn empty() -> Self {
        Self {
            calendars: HashMap::new(),
        }
    }

    /// Registers (or replaces) a calendar under the given exchange code.
    pub fn with_calendar(mut self, code: &str, calendar: ExchangeCalendar) -> Self {
        self.calendars
            .insert(code.to_uppercase(), Arc::new(calendar));
        self
    }

    fn calendar(&self, exchange: &str) -> Option<&ExchangeCalendar> {
        self.calendars
            .get(exchange.trim().to_uppercase().as_str())
            .map(Arc::as_ref)
    }

    /// Returns true if a calendar is registered for this exchange code.
    pub fn knows(&self, exchange: &str) -> bool {
        self.calendar(exchange).is_some()
    }

    // == Status ==
    /// Returns the session status of `exchange` at `at`.
    pub fn status(&self, exchange: &str, at: DateTime<Utc>) -> MarketStatus {
        self.phase(exchange, at).status
    }

    // == Next Boundary ==
    /// Returns when the session status of `exchange` next changes after `at`.
    ///
    /// `None` for always-open and unknown exchanges.
    pub fn next_boundary(&self, exchange: &str, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.phase(exchange, at).next_boundary
    }

    // == Phase ==
    /// Returns status, start of the current phase and the next boundary.
    pub fn phase(&self, exchange: &str, at: DateTime<Utc>) -> MarketPhase {
        match self.calendar(exchange) {
            Some(calendar) => MarketPhase {
                status: calendar.status_at(at),
                since: calendar.previous_boundary(at),
                next_boundary: calendar.next_boundary(at),
            },
            None => {
                debug!(exchange = exchange, "Unknown exchange, assuming market open");
                MarketPhase::unknown()
            }
        }
    }

    /// Like `phase`, for symbols whose exchange may not be known yet.
    pub fn phase_for(&self, exchange: Option<&str>, at: DateTime<Utc>) -> MarketPhase {
        match exchange {
            Some(exchange) => self.phase(exchange, at),
            None => MarketPhase::unknown(),
        }
    }
}
