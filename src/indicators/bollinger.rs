// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Per sliding window of `period` closes:
//   middle = arithmetic mean
//   sigma  = population standard deviation (divide by period, not period - 1)
//   upper  = middle + k * sigma
//   lower  = middle - k * sigma
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::IndicatorPoint;

/// Conventional band width multiplier.
pub const DEFAULT_NUM_STD: f64 = 2.0;

/// The three aligned Bollinger output series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandSeries {
    pub upper: Vec<IndicatorPoint>,
    pub middle: Vec<IndicatorPoint>,
    pub lower: Vec<IndicatorPoint>,
}

/// Compute Bollinger Bands over every full window of `period` closes.
///
/// # Edge cases
/// - `period == 0` or `closes.len() < period` => all three series empty
pub fn calculate_bollinger(
    closes: &[f64],
    times: &[i64],
    period: usize,
    num_std: f64,
) -> BandSeries {
    debug_assert_eq!(closes.len(), times.len());
    if period == 0 || closes.len() < period {
        return BandSeries::default();
    }

    let period_f = period as f64;
    let mut series = BandSeries::default();

    for idx in (period - 1)..closes.len() {
        let window = &closes[idx + 1 - period..=idx];
        let mean = window.iter().sum::<f64>() / period_f;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period_f;
        let std_dev = variance.sqrt();

        let time = times[idx];
        series.middle.push(IndicatorPoint::new(time, mean));
        series
            .upper
            .push(IndicatorPoint::new(time, mean + num_std * std_dev));
        series
            .lower
            .push(IndicatorPoint::new(time, mean - num_std * std_dev));
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
    fn bollinger_insufficient_data() {
        let bands = calculate_bollinger(&[1.0, 2.0, 3.0], &times_for(3), 20, 2.0);
        assert!(bands.upper.is_empty());
        assert!(bands.middle.is_empty());
        assert!(bands.lower.is_empty());
    }

    #[test]
    fn bollinger_period_zero() {
        assert!(calculate_bollinger(&[1.0], &times_for(1), 0, 2.0).middle.is_empty());
    }

    #[test]
    fn bollinger_window_count_and_alignment() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let times = times_for(30);
        let bands = calculate_bollinger(&closes, &times, 20, 2.0);
        assert_eq!(bands.middle.len(), 11);
        assert_eq!(bands.middle[0].time, times[19]);
        assert_eq!(bands.middle.last().unwrap().time, times[29]);
    }

    #[test]
    fn bollinger_band_ordering_holds_everywhere() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + (i as f64 * 1.3).sin() * 7.0)
            .collect();
        let bands = calculate_bollinger(&closes, &times_for(40), 10, 2.0);
        for i in 0..bands.middle.len() {
            let upper = bands.upper[i].value.unwrap();
            let middle = bands.middle[i].value.unwrap();
            let lower = bands.lower[i].value.unwrap();
            assert!(upper >= middle && middle >= lower);
        }
    }

    #[test]
    fn bollinger_population_std_known_values() {
        // Window [2, 4, 6]: mean 4, population variance 8/3.
        let closes = [2.0, 4.0, 6.0];
        let bands = calculate_bollinger(&closes, &times_for(3), 3, 2.0);
        let sigma = (8.0f64 / 3.0).sqrt();
        assert!((bands.middle[0].value.unwrap() - 4.0).abs() < 1e-12);
        assert!((bands.upper[0].value.unwrap() - (4.0 + 2.0 * sigma)).abs() < 1e-12);
        assert!((bands.lower[0].value.unwrap() - (4.0 - 2.0 * sigma)).abs() < 1e-12);
    }

    #[test]
    fn bollinger_flat_series_collapses_bands() {
        let closes = vec![100.0; 25];
        let bands = calculate_bollinger(&closes, &times_for(25), 20, 2.0);
        for i in 0..bands.middle.len() {
            assert_eq!(bands.upper[i].value, Some(100.0));
            assert_eq!(bands.middle[i].value, Some(100.0));
            assert_eq!(bands.lower[i].value, Some(100.0));
        }
    }
}
