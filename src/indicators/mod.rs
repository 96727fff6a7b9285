// =============================================================================
// Indicator Engine — pure, deterministic series computations
// =============================================================================
//
// Every function here takes a close-price slice plus an aligned timestamp
// slice and returns point series whose times are a suffix of the input times.
// Nothing in this module touches shared state or I/O, so all of it is safe to
// call concurrently.
// =============================================================================

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ApiError;
use crate::types::{Candle, IndicatorPoint};

/// Indicator names callers may request.
pub const SUPPORTED_INDICATORS: &[&str] = &["sma20", "ema50", "rsi14", "macd", "bb20"];

/// One named indicator output: either a single line or a multi-line bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IndicatorSeries {
    Line(Vec<IndicatorPoint>),
    Macd(macd::MacdSeries),
    Bands(bollinger::BandSeries),
}

/// Canonicalise a requested indicator set: trim, lowercase, drop empties,
/// dedupe and sort. Equivalent requests in any order share one shape (and
/// therefore one cache entry).
pub fn canonicalize_names(requested: &[String]) -> Vec<String> {
    let set: std::collections::BTreeSet<String> = requested
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    set.into_iter().collect()
}

/// Compute the requested indicators over a candle snapshot.
///
/// Unknown names are a caller input error, not a silent no-op. Too-short
/// inputs yield empty series, which is a valid answer.
pub fn compute_indicators(
    candles: &[Candle],
    names: &[String],
) -> Result<BTreeMap<String, IndicatorSeries>, ApiError> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let times: Vec<i64> = candles.iter().map(|c| c.time).collect();

    let mut series = BTreeMap::new();
    for name in names {
        let output = match name.as_str() {
            "sma20" => IndicatorSeries::Line(sma::calculate_sma(&closes, &times, 20)),
            "ema50" => IndicatorSeries::Line(ema::calculate_ema(&closes, &times, 50)),
            "rsi14" => IndicatorSeries::Line(rsi::calculate_rsi(&closes, &times, 14)),
            "macd" => IndicatorSeries::Macd(macd::calculate_macd(&closes, &times)),
            "bb20" => IndicatorSeries::Bands(bollinger::calculate_bollinger(
                &closes,
                &times,
                20,
                bollinger::DEFAULT_NUM_STD,
            )),
            other => return Err(ApiError::UnknownIndicator(other.to_string())),
        };
        series.insert(name.clone(), output);
    }

    Ok(series)
}
