// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Computed with a running sum (add the incoming close, subtract the outgoing
// one) so the whole series costs O(n) regardless of the period.
// =============================================================================

use crate::types::IndicatorPoint;

/// Compute the SMA series for `closes` with the given look-back `period`.
///
/// `times` must be aligned with `closes`. The output starts at index
/// `period - 1`; earlier observations are omitted, not emitted as nulls.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period` => empty vec
pub fn calculate_sma(closes: &[f64], times: &[i64], period: usize) -> Vec<IndicatorPoint> {
    debug_assert_eq!(closes.len(), times.len());
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let period_f = period as f64;
    let mut window_sum: f64 = closes[..period].iter().sum();

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(IndicatorPoint::new(times[period - 1], window_sum / period_f));

    for idx in period..closes.len() {
        window_sum += closes[idx] - closes[idx - period];
        result.push(IndicatorPoint::new(times[idx], window_sum / period_f));
    }

    result
}
