//! Payload records for each market data category
//!
//! The cache stores payloads as opaque JSON; these are the shapes consumers
//! decode them into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest quote for a symbol (price category).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub description: String,
    pub price: Option<f64>,
    pub previous_close: Option<f64>,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
}

impl PriceQuote {
    /// Absolute change against the previous close, if both are known.
    pub fn change(&self) -> Option<f64> {
        Some(self.price? - self.previous_close?)
    }

    /// Percentage change against the previous close.
    pub fn change_percent(&self) -> Option<f64> {
        let previous = self.previous_close.filter(|p| *p != 0.0)?;
        Some(self.change()? / previous * 100.0)
    }
}

/// One OHLCV bar (history category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// One news article (news category payloads are lists of these).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub publisher: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Semi-static ticker information (metadata category).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerMetadata {
    pub exchange: Option<String>,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_change() {
        let quote = PriceQuote {
            symbol: "AAPL".to_string(),
            price: Some(110.0),
            previous_close: Some(100.0),
            ..PriceQuote::default()
        };
        assert_eq!(quote.change(), Some(10.0));
        assert_eq!(quote.change_percent(), Some(10.0));
    }

    #[test]
    fn test_quote_change_missing_fields() {
        let quote = PriceQuote {
            symbol: "AAPL".to_string(),
            price: Some(110.0),
            previous_close: Some(0.0),
            ..PriceQuote::default()
        };
        assert_eq!(quote.change_percent(), None);
        assert_eq!(PriceQuote::default().change(), None);
    }

    #[test]
    fn test_metadata_deserializes_with_missing_fields() {
        let meta: TickerMetadata = serde_json::from_str(r#"{"exchange":"NMS"}"#).unwrap();
        assert_eq!(meta.exchange.as_deref(), Some("NMS"));
        assert!(meta.display_name.is_none());
    }
}
