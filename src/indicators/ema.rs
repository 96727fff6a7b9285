// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the SMA.
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The first EMA value is seeded with the SMA of the first `period` closes
// and sits at index `period - 1`.
// =============================================================================

use crate::types::IndicatorPoint;

/// Compute the raw EMA values for `closes`, returning the value list and the
/// input index of the first value (`period - 1`).
///
/// Used directly by the MACD, which needs values without timestamps.
pub(crate) fn ema_values(closes: &[f64], period: usize) -> (Vec<f64>, usize) {
    if period == 0 || closes.len() < period {
        return (Vec::new(), 0);
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;

    let mut values = Vec::with_capacity(closes.len() - period + 1);
    values.push(seed);

    let mut prev = seed;
    for &close in &closes[period..] {
        prev = (close - prev) * multiplier + prev;
        values.push(prev);
    }

    (values, period - 1)
}

/// Compute the EMA series for `closes` with aligned `times`.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period` => empty vec
/// - Non-finite intermediates become null-valued points, never NaN output.
pub fn calculate_ema(closes: &[f64], times: &[i64], period: usize) -> Vec<IndicatorPoint> {
    debug_assert_eq!(closes.len(), times.len());
    let (values, start) = ema_values(closes, period);
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| IndicatorPoint::new(times[start + i], v))
        .collect()
}
