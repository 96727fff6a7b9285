// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Per-step gains (`max(delta, 0)`) and losses (`abs(min(delta, 0))`)
//          from consecutive closes.
// Step 2 — Seed average gain / loss with the arithmetic mean of the first
//          `period` gains / losses.
// Step 3 — Wilder's recursive smoothing for the rest:
//            avg = (avg * (period - 1) + new) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// A zero average loss is handled by an explicit branch (RSI = 100) instead of
// floating-point infinity arithmetic, which propagates NaN on some targets.
// =============================================================================

use crate::types::IndicatorPoint;

/// Compute the Wilder RSI series for `closes` with aligned `times`.
///
/// The first defined value sits at input index `period` — the deltas consume
/// one degree of freedom, so `period` gains need `period + 1` closes.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() <= period` => empty vec
/// - `avg_loss == 0` => RSI clamped to 100.0
pub fn calculate_rsi(closes: &[f64], times: &[i64], period: usize) -> Vec<IndicatorPoint> {
    debug_assert_eq!(closes.len(), times.len());
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for window in closes.windows(2) {
        let delta = window[1] - window[0];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let period_f = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / period_f;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period_f;

    let mut result = Vec::with_capacity(gains.len() - period + 1);
    result.push(IndicatorPoint::new(
        times[period],
        rsi_from_averages(avg_gain, avg_loss),
    ));

    for idx in period..gains.len() {
        avg_gain = (avg_gain * (period_f - 1.0) + gains[idx]) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + losses[idx]) / period_f;
        result.push(IndicatorPoint::new(
            times[idx + 1],
            rsi_from_averages(avg_gain, avg_loss),
        ));
    }

    result
}

/// Convert average gain / average loss into an RSI value.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // Only gains (or no movement at all): the ratio degenerates, RSI
        // collapses to 100.
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn times_for(n: usize) -> Vec<i64> {
        (0..n).map(|i| 1_700_000_000 + i as i64 * 86_400).collect()
    }

    #[test]
    fn rsi_empty_input() {
        assert!(calculate_rsi(&[], &[], 14).is_empty());
    }

    #[test]
    fn rsi_period_zero() {
        assert!(calculate_rsi(&[1.0, 2.0, 3.0], &times_for(3), 0).is_empty());
    }

    #[test]
    fn rsi_needs_more_than_period_closes() {
        // Exactly `period` closes give only period-1 deltas — still undefined.
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert!(calculate_rsi(&closes, &times_for(14), 14).is_empty());

        let closes: Vec<f64> = (1..=15).map(|x| x as f64).collect();
        assert_eq!(calculate_rsi(&closes, &times_for(15), 14).len(), 1);
    }

    #[test]
    fn rsi_first_value_aligns_one_past_seed_window() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let times = times_for(20);
        let rsi = calculate_rsi(&closes, &times, 14);
        assert_eq!(rsi[0].time, times[14]);
        assert_eq!(rsi.last().unwrap().time, times[19]);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let rsi = calculate_rsi(&closes, &times_for(30), 14);
        assert!(!rsi.is_empty());
        for point in &rsi {
            assert!((point.value.unwrap() - 100.0).abs() < 1e-10);
        }
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let rsi = calculate_rsi(&closes, &times_for(30), 14);
        assert!(!rsi.is_empty());
        for point in &rsi {
            assert!(point.value.unwrap().abs() < 1e-10);
        }
    }

    #[test]
    fn rsi_always_within_bounds() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13, 44.01, 43.50,
        ];
        let rsi = calculate_rsi(&closes, &times_for(closes.len()), 14);
        assert!(!rsi.is_empty());
        for point in &rsi {
            let v = point.value.unwrap();
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    #[test]
    fn rsi_flat_market_uses_explicit_branch() {
        // Zero losses AND zero gains — the explicit avg_loss branch wins,
        // no NaN from 0/0.
        let closes = vec![100.0; 30];
        let rsi = calculate_rsi(&closes, &times_for(30), 14);
        for point in &rsi {
            assert_eq!(point.value, Some(100.0));
        }
    }
}
