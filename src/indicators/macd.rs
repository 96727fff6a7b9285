// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD line = EMA(fast) - EMA(slow), aligned from the later of the two EMA
// start indices. Signal = EMA(signal_period) of the MACD line. Histogram =
// MACD - signal at each aligned point.
//
// All three outputs are empty whenever any input EMA cannot be computed.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::ema::ema_values;
use crate::types::IndicatorPoint;

/// Conventional fast EMA period.
pub const DEFAULT_FAST: usize = 12;
/// Conventional slow EMA period.
pub const DEFAULT_SLOW: usize = 26;
/// Conventional signal EMA period.
pub const DEFAULT_SIGNAL: usize = 9;

/// The three aligned MACD output series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacdSeries {
    pub macd: Vec<IndicatorPoint>,
    pub signal: Vec<IndicatorPoint>,
    pub hist: Vec<IndicatorPoint>,
}

/// Compute MACD with the conventional 12/26/9 periods.
pub fn calculate_macd(closes: &[f64], times: &[i64]) -> MacdSeries {
    calculate_macd_with(closes, times, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}

/// Compute MACD with explicit fast/slow/signal periods.
pub fn calculate_macd_with(
    closes: &[f64],
    times: &[i64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> MacdSeries {
    debug_assert_eq!(closes.len(), times.len());

    let (fast_ema, fast_start) = ema_values(closes, fast);
    let (slow_ema, slow_start) = ema_values(closes, slow);
    if fast_ema.is_empty() || slow_ema.is_empty() {
        return MacdSeries::default();
    }

    // Align both EMAs from the later start index.
    let start_idx = fast_start.max(slow_start);
    let fast_offset = start_idx - fast_start;
    let slow_offset = start_idx - slow_start;
    let common_len = (fast_ema.len() - fast_offset).min(slow_ema.len() - slow_offset);
    if common_len == 0 {
        return MacdSeries::default();
    }

    let mut macd_values = Vec::with_capacity(common_len);
    let mut macd_times = Vec::with_capacity(common_len);
    for i in 0..common_len {
        macd_values.push(fast_ema[fast_offset + i] - slow_ema[slow_offset + i]);
        macd_times.push(times[start_idx + i]);
    }

    let (signal_values, signal_offset) = ema_values(&macd_values, signal_period);
    if signal_values.is_empty() {
        return MacdSeries::default();
    }

    let mut series = MacdSeries::default();
    for (i, &signal_value) in signal_values.iter().enumerate() {
        let idx = i + signal_offset;
        let time = macd_times[idx];
        let macd_value = macd_values[idx];
        series.macd.push(IndicatorPoint::new(time, macd_value));
        series.signal.push(IndicatorPoint::new(time, signal_value));
        series
            .hist
            .push(IndicatorPoint::new(time, macd_value - signal_value));
    }

    series
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
    fn macd_empty_when_too_short_for_slow_ema() {
        let closes: Vec<f64> = (1..=25).map(|x| x as f64).collect();
        let series = calculate_macd(&closes, &times_for(25));
        assert!(series.macd.is_empty());
        assert!(series.signal.is_empty());
        assert!(series.hist.is_empty());
    }

    #[test]
    fn macd_empty_when_too_short_for_signal() {
        // 30 closes: slow EMA starts producing at index 25, leaving 5 MACD
        // points — fewer than the 9 the signal EMA needs.
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let series = calculate_macd(&closes, &times_for(30));
        assert!(series.macd.is_empty());
    }

    #[test]
    fn macd_outputs_are_aligned_and_consistent() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.2)
            .collect();
        let times = times_for(60);
        let series = calculate_macd(&closes, &times);

        // Slow EMA start 25, signal offset 8 => first output at index 33.
        assert_eq!(series.macd.len(), 60 - 25 - 8);
        assert_eq!(series.macd.len(), series.signal.len());
        assert_eq!(series.macd.len(), series.hist.len());
        assert_eq!(series.macd[0].time, times[33]);

        for i in 0..series.macd.len() {
            assert_eq!(series.macd[i].time, series.signal[i].time);
            assert_eq!(series.macd[i].time, series.hist[i].time);
            let macd = series.macd[i].value.unwrap();
            let signal = series.signal[i].value.unwrap();
            let hist = series.hist[i].value.unwrap();
            assert!((hist - (macd - signal)).abs() < 1e-9);
        }
    }

    #[test]
    fn macd_of_flat_series_is_zero() {
        let closes = vec![50.0; 60];
        let series = calculate_macd(&closes, &times_for(60));
        for point in series.macd.iter().chain(&series.signal).chain(&series.hist) {
            assert!(point.value.unwrap().abs() < 1e-9);
        }
    }

    #[test]
    fn macd_custom_periods() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let times = times_for(20);
        let series = calculate_macd_with(&closes, &times, 3, 5, 2);
        assert!(!series.macd.is_empty());
        // Slow start index 4, signal offset 1 => first output at index 5.
        assert_eq!(series.macd[0].time, times[5]);
    }
}
