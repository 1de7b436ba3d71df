//! Cache Key Module
//!
//! Identifies one logical market data request: category, symbol and, for
//! history, the bar interval and lookback range.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// == Category ==
/// Kind of market data an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Price,
    History,
    News,
    Metadata,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Price => "price",
            Category::History => "history",
            Category::News => "news",
            Category::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" => Ok(Category::Price),
            "history" => Ok(Category::History),
            "news" => Ok(Category::News),
            "metadata" => Ok(Category::Metadata),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

// == Granularity ==
/// Bar interval and lookback range of a history request, e.g. `1d` over `1mo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Granularity {
    pub interval: String,
    pub range: String,
}

impl Granularity {
    pub fn new(interval: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            interval: interval.into().trim().to_lowercase(),
            range: range.into().trim().to_lowercase(),
        }
    }

    /// Persisted form, `interval:range`.
    pub fn as_key(&self) -> String {
        format!("{}:{}", self.interval, self.range)
    }

    /// Parses the persisted form. Empty input means "no granularity".
    pub fn parse(s: &str) -> Option<Self> {
        let (interval, range) = s.split_once(':')?;
        if interval.is_empty() || range.is_empty() {
            return None;
        }
        Some(Self::new(interval, range))
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Self::new("1d", "1mo")
    }
}

// == Cache Key ==
/// Composite key shared by both cache tiers.
///
/// Built through `CacheKey::new`, which normalises the symbol and keeps a
/// granularity only for history requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub category: Category,
    pub symbol: String,
    pub granularity: Option<Granularity>,
}

impl CacheKey {
    // == Constructor ==
    pub fn new(category: Category, symbol: &str, granularity: Option<Granularity>) -> Self {
        let granularity = match category {
            Category::History => Some(granularity.unwrap_or_default()),
            _ => None,
        };
        Self {
            category,
            symbol: symbol.trim().to_uppercase(),
            granularity,
        }
    }

    pub fn price(symbol: &str) -> Self {
        Self::new(Category::Price, symbol, None)
    }

    pub fn history(symbol: &str, granularity: Granularity) -> Self {
        Self::new(Category::History, symbol, Some(granularity))
    }

    pub fn news(symbol: &str) -> Self {
        Self::new(Category::News, symbol, None)
    }

    pub fn metadata(symbol: &str) -> Self {
        Self::new(Category::Metadata, symbol, None)
    }

    /// Granularity column value, empty for non-history keys.
    pub fn granularity_key(&self) -> String {
        self.granularity
            .as_ref()
            .map(Granularity::as_key)
            .unwrap_or_default()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.granularity {
            Some(g) => write!(f, "{}:{}:{}", self.category, self.symbol, g.as_key()),
            None => write!(f, "{}:{}", self.category, self.symbol),
        }
    }
}

// == Symbol Normalisation ==
/// Trims and upper-cases a symbol; blank input yields `None`.
pub fn normalize_symbol(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Normalises a symbol list, dropping blanks and duplicates, keeping first-seen order.
pub fn normalize_symbols<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    symbols
        .into_iter()
        .filter_map(|s| normalize_symbol(s.as_ref()))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalises_symbol() {
        let key = CacheKey::price("  aapl ");
        assert_eq!(key.symbol, "AAPL");
        assert_eq!(key, CacheKey::price("AAPL"));
    }

    #[test]
    fn test_granularity_only_for_history() {
        let key = CacheKey::new(Category::Price, "AAPL", Some(Granularity::new("1h", "5d")));
        assert!(key.granularity.is_none());
        assert_eq!(key.granularity_key(), "");

        let key = CacheKey::new(Category::History, "AAPL", None);
        assert_eq!(key.granularity, Some(Granularity::default()));
        assert_eq!(key.granularity_key(), "1d:1mo");
    }

    #[test]
    fn test_history_keys_differ_by_granularity() {
        let daily = CacheKey::history("AAPL", Granularity::new("1d", "1mo"));
        let hourly = CacheKey::history("AAPL", Granularity::new("1h", "5d"));
        assert_ne!(daily, hourly);
        assert_eq!(hourly.to_string(), "history:AAPL:1h:5d");
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!(Granularity::parse("1wk:1y"), Some(Granularity::new("1wk", "1y")));
        assert_eq!(Granularity::parse(""), None);
        assert_eq!(Granularity::parse("1d:"), None);
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("news".parse::<Category>(), Ok(Category::News));
        assert!("quotes".parse::<Category>().is_err());
    }

    #[test]
    fn test_normalize_symbols_dedupes() {
        let symbols = normalize_symbols(["aapl", "MSFT", " AAPL", "", "  "]);
        assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }
}
