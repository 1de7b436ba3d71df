//! Market Module
//!
//! Trading calendars and the market status oracle used to pick cache TTLs.

mod calendar;
mod oracle;
mod registry;

pub use calendar::{ExchangeCalendar, Schedule, SessionHours};
pub use oracle::{MarketOracle, MarketPhase};
pub use registry::default_calendars;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// == Market Status ==
/// Trading-session phase of an exchange at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    Closed,
    Pre,
    Post,
}

impl MarketStatus {
    /// Stable lowercase name, used as the persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Open => "open",
            MarketStatus::Closed => "closed",
            MarketStatus::Pre => "pre",
            MarketStatus::Post => "post",
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(MarketStatus::Open),
            "closed" => Ok(MarketStatus::Closed),
            "pre" => Ok(MarketStatus::Pre),
            "post" => Ok(MarketStatus::Post),
            other => Err(format!("unknown market status '{}'", other)),
        }
    }
}
