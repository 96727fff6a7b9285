// =============================================================================
// Technical-Analysis Service — cached history and indicator snapshots
// =============================================================================
//
// Both entry points are cache-through: a hit returns the memoized value, a
// miss does the upstream fetch + computation and stores the result for the
// configured TTL. Indicator cache keys embed the canonicalized name list, so
// equivalent requests in any order share one entry.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::indicators::{compute_indicators, IndicatorSeries};
use crate::normalize;
use crate::types::Candle;

/// Normalized candle history for one security.
#[derive(Debug, Clone, Serialize)]
pub struct TaHistory {
    pub symbol: String,
    #[serde(rename = "securityId")]
    pub security_id: i64,
    pub candles: Vec<Candle>,
}

/// Indicator series computed over one security's history.
#[derive(Debug, Clone, Serialize)]
pub struct TaIndicators {
    #[serde(rename = "securityId")]
    pub security_id: i64,
    #[serde(flatten)]
    pub series: BTreeMap<String, IndicatorSeries>,
}

/// Fetch and normalize the candle history for `security_id`, serving from
/// the cache when fresh.
///
/// When the upstream fails or yields nothing, candles recorded in the local
/// document store for the resolved symbol are substituted so charts survive
/// an upstream outage. The fetch error surfaces only when the store has
/// nothing either.
pub async fn history(state: &Arc<AppState>, security_id: i64) -> Result<TaHistory, ApiError> {
    let cache_key = format!("ta_history:{security_id}");
    if let Some(cached) = state.history_cache.get(&cache_key) {
        debug!(security_id, "history cache hit");
        return Ok(cached);
    }

    let symbol = state.feed.security_symbol(security_id).await;

    let (mut candles, fetch_err) = match state.feed.security_history(security_id).await {
        Ok(payload) => (normalize::normalize(&payload), None),
        Err(e) => {
            warn!(security_id, error = %e, "history fetch failed — trying the document store");
            (Vec::new(), Some(e))
        }
    };

    if candles.is_empty() {
        let (stored, _) = state.document_store.candles_for_symbol(&symbol);
        candles = stored
            .iter()
            .filter_map(|c| {
                normalize::normalize_row(&json!({
                    "date": c.date,
                    "open": c.open,
                    "high": c.high,
                    "low": c.low,
                    "close": c.close,
                    "volume": c.volume,
                }))
            })
            .collect();

        if candles.is_empty() {
            if let Some(e) = fetch_err {
                return Err(ApiError::Upstream(e));
            }
        } else {
            info!(security_id, symbol = %symbol, "serving history from the document store");
        }
    }

    candles.sort_by_key(|c| c.time);

    let result = TaHistory {
        symbol,
        security_id,
        candles,
    };
    state.history_cache.insert(cache_key, result.clone());
    Ok(result)
}

/// Compute the requested indicator series for `security_id`, serving from
/// the cache when fresh. `names` must already be canonicalized.
pub async fn indicators(
    state: &Arc<AppState>,
    security_id: i64,
    names: &[String],
) -> Result<TaIndicators, ApiError> {
    let cache_key = format!("ta_indicators:{security_id}:{}", names.join(","));
    if let Some(cached) = state.indicator_cache.get(&cache_key) {
        debug!(security_id, "indicator cache hit");
        return Ok(cached);
    }

    let history = history(state, security_id).await?;
    let series = compute_indicators(&history.candles, names)?;

    let result = TaIndicators {
        security_id,
        series,
    };
    state.indicator_cache.insert(cache_key, result.clone());
    Ok(result)
}
