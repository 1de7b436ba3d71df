//! Exchange Calendar Module
//!
//! Session hours for a single exchange, evaluated in the exchange's own
//! time zone so daylight-saving shifts are handled by `chrono-tz`.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use super::MarketStatus;

/// Days scanned when searching for the next or previous session boundary.
/// Covers the longest run of weekends plus holidays any calendar ships.
const BOUNDARY_SEARCH_DAYS: i64 = 15;

// == Session Hours ==
/// Local wall-clock times of one trading day.
#[derive(Debug, Clone)]
pub struct SessionHours {
    /// Start of the pre-market window, if the exchange has one
    pub pre_open: Option<NaiveTime>,
    /// Regular session open
    pub open: NaiveTime,
    /// Midday break during which the exchange does not trade
    pub lunch: Option<(NaiveTime, NaiveTime)>,
    /// Regular session close
    pub close: NaiveTime,
    /// End of the post-market window, if the exchange has one
    pub post_close: Option<NaiveTime>,
}

impl SessionHours {
    /// Regular session without extended hours or a lunch break.
    pub fn regular(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            pre_open: None,
            open,
            lunch: None,
            close,
            post_close: None,
        }
    }

    pub fn with_extended(mut self, pre_open: NaiveTime, post_close: NaiveTime) -> Self {
        self.pre_open = Some(pre_open);
        self.post_close = Some(post_close);
        self
    }

    pub fn with_lunch(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.lunch = Some((start, end));
        self
    }

    /// Local times at which the status changes, with the status that begins there.
    ///
    /// Every trading day starts and ends `Closed`, so transitions never
    /// straddle midnight.
    fn local_transitions(&self) -> Vec<(NaiveTime, MarketStatus)> {
        let mut transitions = Vec::with_capacity(6);
        if let Some(pre) = self.pre_open {
            transitions.push((pre, MarketStatus::Pre));
        }
        transitions.push((self.open, MarketStatus::Open));
        if let Some((start, end)) = self.lunch {
            transitions.push((start, MarketStatus::Closed));
            transitions.push((end, MarketStatus::Open));
        }
        match self.post_close {
            Some(post) => {
                transitions.push((self.close, MarketStatus::Post));
                transitions.push((post, MarketStatus::Closed));
            }
            None => transitions.push((self.close, MarketStatus::Closed)),
        }
        transitions
    }
}

// == Schedule ==
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Trades around the clock, every day (crypto)
    AlwaysOpen,
    /// Trades in sessions on weekdays outside holidays
    Sessions(SessionHours),
}

// == Exchange Calendar ==
/// Trading calendar of one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeCalendar {
    /// Human-readable exchange name
    pub name: &'static str,
    /// Exchange time zone
    pub tz: Tz,
    pub schedule: Schedule,
    /// Full-day closures, in exchange-local dates
    pub holidays: BTreeSet<NaiveDate>,
}

impl ExchangeCalendar {
    // == Constructors ==
    /// Creates a weekday calendar with the given session hours.
    pub fn new(name: &'static str, tz: Tz, hours: SessionHours) -> Self {
        Self {
            name,
            tz,
            schedule: Schedule::Sessions(hours),
            holidays: BTreeSet::new(),
        }
    }

    /// Creates a calendar that is open at every instant.
    pub fn always_open(name: &'static str) -> Self {
        Self {
            name,
            tz: chrono_tz::UTC,
            schedule: Schedule::AlwaysOpen,
            holidays: BTreeSet::new(),
        }
    }

    /// Adds full-day closures.
    pub fn with_holidays<I>(mut self, holidays: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        self.holidays.extend(holidays);
        self
    }

    // == Trading Day ==
    /// Returns true if the exchange holds a session on this local date.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        match self.schedule {
            Schedule::AlwaysOpen => true,
            Schedule::Sessions(_) => {
                !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
                    && !self.holidays.contains(&date)
            }
        }
    }

    // == Status ==
    /// Returns the session status at the given instant.
    pub fn status_at(&self, at: DateTime<Utc>) -> MarketStatus {
        if matches!(self.schedule, Schedule::AlwaysOpen) {
            return MarketStatus::Open;
        }

        let local_date = at.with_timezone(&self.tz).date_naive();
        self.transitions_on(local_date)
            .into_iter()
            .take_while(|(instant, _)| *instant <= at)
            .last()
            .map(|(_, status)| status)
            .unwrap_or(MarketStatus::Closed)
    }

    // == Boundaries ==
    /// Returns the first instant strictly after `at` at which the status changes.
    ///
    /// `None` for always-open calendars or when no session exists in the
    /// search window.
    pub fn next_boundary(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if matches!(self.schedule, Schedule::AlwaysOpen) {
            return None;
        }

        let start = at.with_timezone(&self.tz).date_naive();
        (0..BOUNDARY_SEARCH_DAYS)
            .filter_map(|offset| start.checked_add_signed(Duration::days(offset)))
            .flat_map(|date| self.transitions_on(date))
            .map(|(instant, _)| instant)
            .find(|instant| *instant > at)
    }

    /// Returns the last instant at or before `at` at which the status changed.
    pub fn previous_boundary(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if matches!(self.schedule, Schedule::AlwaysOpen) {
            return None;
        }

        let start = at.with_timezone(&self.tz).date_naive();
        (0..BOUNDARY_SEARCH_DAYS)
            .filter_map(|offset| start.checked_sub_signed(Duration::days(offset)))
            .find_map(|date| {
                self.transitions_on(date)
                    .into_iter()
                    .map(|(instant, _)| instant)
                    .filter(|instant| *instant <= at)
                    .last()
            })
    }

    /// UTC instants of the status transitions on one local date, in order.
    fn transitions_on(&self, date: NaiveDate) -> Vec<(DateTime<Utc>, MarketStatus)> {
        let hours = match &self.schedule {
            Schedule::Sessions(hours) if self.is_trading_day(date) => hours,
            _ => return Vec::new(),
        };

        hours
            .local_transitions()
            .into_iter()
            .filter_map(|(time, status)| {
                local_instant(&self.tz, date, time).map(|instant| (instant, status))
            })
            .collect()
    }
}

// == Utility Functions ==
/// Converts a local wall-clock time to UTC.
///
/// Ambiguous times (clocks falling back) resolve to the earlier instant;
/// times inside a spring-forward gap shift forward by an hour.
fn local_instant(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
}
