//! Exchange Registry
//!
//! Built-in calendars keyed by the exchange codes market data sources report:
//! Yahoo-style codes (`NMS`, `NYQ`, ...), ISO 10383 MIC codes and friendly names.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::{America, Asia, Europe};

use super::calendar::{ExchangeCalendar, SessionHours};

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn dates(days: &[(i32, u32, u32)]) -> Vec<NaiveDate> {
    days.iter()
        .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .collect()
}

/// Full-day NYSE and NASDAQ closures.
fn us_holidays() -> Vec<NaiveDate> {
    dates(&[
        // 2025
        (2025, 1, 1),
        (2025, 1, 9),
        (2025, 1, 20),
        (2025, 2, 17),
        (2025, 4, 18),
        (2025, 5, 26),
        (2025, 6, 19),
        (2025, 7, 4),
        (2025, 9, 1),
        (2025, 11, 27),
        (2025, 12, 25),
        // 2026
        (2026, 1, 1),
        (2026, 1, 19),
        (2026, 2, 16),
        (2026, 4, 3),
        (2026, 5, 25),
        (2026, 6, 19),
        (2026, 7, 3),
        (2026, 9, 7),
        (2026, 11, 26),
        (2026, 12, 25),
    ])
}

// == Default Calendars ==
/// Returns every built-in calendar together with the codes that resolve to it.
pub fn default_calendars() -> Vec<(&'static [&'static str], Arc<ExchangeCalendar>)> {
    let us = Arc::new(
        ExchangeCalendar::new(
            "NYSE/NASDAQ",
            America::New_York,
            SessionHours::regular(hm(9, 30), hm(16, 0)).with_extended(hm(4, 0), hm(20, 0)),
        )
        .with_holidays(us_holidays()),
    );

    let toronto = Arc::new(ExchangeCalendar::new(
        "TSX",
        America::Toronto,
        SessionHours::regular(hm(9, 30), hm(16, 0)),
    ));

    let london = Arc::new(ExchangeCalendar::new(
        "LSE",
        Europe::London,
        SessionHours::regular(hm(8, 0), hm(16, 30)),
    ));

    let xetra = Arc::new(ExchangeCalendar::new(
        "XETRA",
        Europe::Berlin,
        SessionHours::regular(hm(9, 0), hm(17, 30)),
    ));

    let euronext = Arc::new(ExchangeCalendar::new(
        "Euronext",
        Europe::Paris,
        SessionHours::regular(hm(9, 0), hm(17, 30)),
    ));

    let tokyo = Arc::new(ExchangeCalendar::new(
        "TSE",
        Asia::Tokyo,
        SessionHours::regular(hm(9, 0), hm(15, 30)).with_lunch(hm(11, 30), hm(12, 30)),
    ));

    let hong_kong = Arc::new(ExchangeCalendar::new(
        "HKEX",
        Asia::Hong_Kong,
        SessionHours::regular(hm(9, 30), hm(16, 0)).with_lunch(hm(12, 0), hm(13, 0)),
    ));

    let korea = Arc::new(ExchangeCalendar::new(
        "KRX",
        Asia::Seoul,
        SessionHours::regular(hm(9, 0), hm(15, 30)),
    ));

    let crypto = Arc::new(ExchangeCalendar::always_open("Crypto"));

    vec![
        (
            &[
                "NMS", "NYQ", "NGM", "NCM", "ASE", "PCX", "BTS", "NYSE", "NASDAQ", "XNYS",
                "XNAS", "XASE", "ARCX", "BATS",
            ][..],
            us,
        ),
        (&["TOR", "VAN", "TSX", "XTSE", "XTSX"][..], toronto),
        (&["LSE", "XLON"][..], london),
        (&["GER", "FRA", "XETRA", "XETR", "XFRA"][..], xetra),
        (&["PAR", "AMS", "BRU", "XPAR", "XAMS", "XBRU"][..], euronext),
        (&["JPX", "TYO", "XTKS"][..], tokyo),
        (&["HKG", "XHKG"][..], hong_kong),
        (&["KSC", "KOE", "XKRX", "XKOS"][..], korea),
        (&["CCC", "CCY", "GDAX", "CRYPTO"][..], crypto),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let mut seen = HashSet::new();
        for (codes, _) in default_calendars() {
            for code in codes {
                assert!(seen.insert(*code), "duplicate exchange code {}", code);
            }
        }
    }

    #[test]
    fn test_us_holidays_cover_both_years() {
        let holidays = us_holidays();
        assert_eq!(holidays.len(), 21);
        assert!(holidays.contains(&NaiveDate::from_ymd_opt(2026, 7, 3).unwrap()));
    }
}
