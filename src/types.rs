// =============================================================================
// Shared types used across the Candela OHLC service
// =============================================================================

use serde::{Deserialize, Serialize};

/// A canonical daily candle: UNIX seconds (UTC) plus OHLCV.
///
/// Invariant: every numeric field is finite. The normalizer drops any row
/// that cannot satisfy this, so downstream code never has to re-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    /// The candle's trading date as a `YYYY-MM-DD` string (UTC).
    pub fn date_string(&self) -> String {
        chrono::DateTime::from_timestamp(self.time, 0)
            .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

/// A daily candle as persisted in the document store, keyed by date string
/// rather than epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCandle {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// One point of a derived indicator series.
///
/// `value` is `None` whenever the computed number is not finite — the engine
/// never serialises NaN or Infinity literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub time: i64,
    pub value: Option<f64>,
}

impl IndicatorPoint {
    /// Build a point, mapping non-finite values to `None`.
    pub fn new(time: i64, value: f64) -> Self {
        Self {
            time,
            value: value.is_finite().then_some(value),
        }
    }
}

/// A notional paper trade held in memory for the profit/loss endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PaperTrade {
    pub symbol: String,
    pub credits: f64,
    pub shares: f64,
    pub price: f64,
    pub opened_at: chrono::DateTime<chrono::Utc>,
}
