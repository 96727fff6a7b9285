// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Market-data and technical-analysis endpoints live under `/api/`; the two
// paper-trading endpoints keep their legacy top-level paths for existing
// clients. The TA endpoints are rate limited per (route, client).
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Json, Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::indicators::{canonicalize_names, SUPPORTED_INDICATORS};
use crate::normalize;
use crate::rate_limit::{client_identity, Admission};
use crate::ta;
use crate::types::PaperTrade;

/// Default candle count for document-store history reads.
const DEFAULT_HISTORY_LIMIT: usize = 90;
/// Default span and row cap for relational range reads.
const DEFAULT_RANGE_DAYS: i64 = 90;
const DEFAULT_RANGE_LIMIT: i64 = 500;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Health ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Technical analysis (rate limited) ───────────────────────
        .route("/api/ta/history", get(ta_history))
        .route("/api/ta/indicators", get(ta_indicators))
        // ── Daily OHLC persistence ──────────────────────────────────
        .route("/api/ohlc/snapshot", post(ohlc_snapshot))
        .route("/api/ohlc/refresh", get(ohlc_refresh).post(ohlc_refresh))
        .route("/api/ohlc/history", get(ohlc_document_history))
        .route("/api/ohlc/symbols", get(ohlc_symbols))
        .route("/api/ohlc/latest/:symbol", get(ohlc_latest))
        .route("/api/ohlc/:symbol", get(ohlc_range))
        // ── Paper trading (legacy paths) ────────────────────────────
        .route("/simulateTrade", post(simulate_trade))
        .route("/checkProfitLoss", get(check_profit_loss))
        // ── Middleware & State ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

/// Admit or reject one request against the shared limiter.
fn enforce_rate_limit(
    state: &AppState,
    route: &str,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<(), ApiError> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let client = client_identity(forwarded, &peer.ip().to_string());

    match state.rate_limiter.admit(route, &client) {
        Admission::Allowed => Ok(()),
        Admission::Rejected { retry_after_secs } => {
            Err(ApiError::RateLimited { retry_after_secs })
        }
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        server_time: Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Technical analysis
// =============================================================================

#[derive(Deserialize)]
struct TaQuery {
    #[serde(rename = "securityId")]
    security_id: i64,
    /// Comma-separated indicator names; absent means all supported.
    indicators: Option<String>,
}

async fn ta_history(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TaQuery>,
) -> Result<impl IntoResponse, ApiError> {
    enforce_rate_limit(&state, "ta_history", &headers, peer)?;
    let history = ta::history(&state, query.security_id).await?;
    Ok(Json(history))
}

async fn ta_indicators(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TaQuery>,
) -> Result<impl IntoResponse, ApiError> {
    enforce_rate_limit(&state, "ta_indicators", &headers, peer)?;

    let names = requested_indicator_names(query.indicators.as_deref())?;
    let result = ta::indicators(&state, query.security_id, &names).await?;
    Ok(Json(result))
}

/// Resolve the `indicators` query parameter into canonical names.
///
/// An absent or empty parameter means all supported indicators; unknown
/// names are rejected as a whole.
fn requested_indicator_names(param: Option<&str>) -> Result<Vec<String>, ApiError> {
    let requested: Vec<String> = param
        .map(|csv| csv.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    let names = canonicalize_names(&requested);

    if names.is_empty() {
        return Ok(SUPPORTED_INDICATORS.iter().map(|s| s.to_string()).collect());
    }

    let invalid: Vec<String> = names
        .iter()
        .filter(|n| !SUPPORTED_INDICATORS.contains(&n.as_str()))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(ApiError::UnknownIndicator(invalid.join(",")));
    }

    Ok(names)
}

// =============================================================================
// Daily OHLC persistence
// =============================================================================

/// Pull today's price-volume snapshot and merge it into the document store.
async fn ohlc_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = state.feed.price_volume().await.map_err(ApiError::Upstream)?;
    let date = Utc::now().date_naive().format("%Y-%m-%d").to_string();

    let entries: Vec<_> = normalize::extract_rows(&payload)
        .iter()
        .filter_map(|row| normalize::daily_candle_from_price_volume(row, &date))
        .collect();

    let updated = state
        .document_store
        .upsert_today(&entries)
        .map_err(ApiError::Storage)?;
    info!(updated, %date, "document snapshot complete");

    Ok(Json(json!({ "symbolsUpdated": updated, "date": date })))
}

/// Pull today's price-volume snapshot and upsert it into Postgres.
async fn ohlc_refresh(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let relational = state.relational()?;
    let payload = state.feed.price_volume().await.map_err(ApiError::Upstream)?;

    let rows: Vec<_> = normalize::extract_rows(&payload)
        .iter()
        .filter_map(normalize::daily_row_from_price_volume)
        .collect();

    let upserted = relational
        .upsert_batch(&rows)
        .await
        .map_err(ApiError::Storage)?;
    info!(upserted, "relational refresh complete");

    Ok(Json(json!({ "upserted": upserted })))
}

#[derive(Deserialize)]
struct DocumentHistoryQuery {
    symbol: String,
    limit: Option<usize>,
}

/// Recent candles for one symbol from the document store.
async fn ohlc_document_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DocumentHistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let (candles, message) = state.document_store.recent_candles(&query.symbol, limit);

    Ok(Json(json!({
        "symbol": query.symbol.trim().to_uppercase(),
        "candles": candles,
        "message": message,
    })))
}

/// All symbols known to the relational store.
async fn ohlc_symbols(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let symbols = state
        .relational()?
        .symbols()
        .await
        .map_err(ApiError::Storage)?;
    Ok(Json(json!({ "symbols": symbols })))
}

/// The most recent stored row for one symbol.
async fn ohlc_latest(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .relational()?
        .latest(&symbol)
        .await
        .map_err(ApiError::Storage)?;

    match row {
        Some(row) => Ok(Json(json!({
            "symbol": symbol.trim().to_uppercase(),
            "latest": row,
        }))),
        None => Err(ApiError::NotFound(format!(
            "No data stored for symbol {}",
            symbol.trim().to_uppercase()
        ))),
    }
}

#[derive(Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
    limit: Option<i64>,
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid {field} date: {raw}")))
}

/// Candles for one symbol in an inclusive date range, ascending.
///
/// Defaults: `to` is today, `from` is 90 days before `to`. `limit` caps the
/// result to the most recent rows of the range.
async fn ohlc_range(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let to = match query.to.as_deref() {
        Some(raw) => parse_date(raw, "to")?,
        None => Utc::now().date_naive(),
    };
    let from = match query.from.as_deref() {
        Some(raw) => parse_date(raw, "from")?,
        None => to - ChronoDuration::days(DEFAULT_RANGE_DAYS),
    };
    if from > to {
        return Err(ApiError::BadRequest(format!(
            "Range start {from} is after range end {to}"
        )));
    }
    let limit = query.limit.unwrap_or(DEFAULT_RANGE_LIMIT).max(1);

    let candles = state
        .relational()?
        .candles_in_range(&symbol, from, to, limit)
        .await
        .map_err(ApiError::Storage)?;

    Ok(Json(json!({
        "symbol": symbol.trim().to_uppercase(),
        "from": from.format("%Y-%m-%d").to_string(),
        "to": to.format("%Y-%m-%d").to_string(),
        "candles": candles,
    })))
}

// =============================================================================
// Paper trading
// =============================================================================

#[derive(Deserialize)]
struct SimulateTradeRequest {
    symbol: String,
    credits: f64,
}

/// Open a notional position at today's last traded price.
async fn simulate_trade(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SimulateTradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let symbol = request.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ApiError::BadRequest("Symbol is required".to_string()));
    }
    if !request.credits.is_finite() || request.credits <= 0.0 {
        return Err(ApiError::BadRequest(
            "Credits must be a positive number".to_string(),
        ));
    }

    let price = today_price(&state, &symbol).await?.ok_or_else(|| {
        ApiError::NotFound(format!("Symbol {symbol} not found in today's data"))
    })?;
    if price <= 0.0 {
        return Err(ApiError::BadRequest(format!(
            "Symbol {symbol} has no tradeable price today"
        )));
    }

    let trade = PaperTrade {
        symbol: symbol.clone(),
        credits: request.credits,
        shares: request.credits / price,
        price,
        opened_at: Utc::now(),
    };
    state.paper_trades.write().insert(symbol, trade.clone());

    Ok(Json(json!({
        "message": "Trade simulated",
        "trade": trade,
    })))
}

/// Mark every open paper trade against today's prices.
async fn check_profit_loss(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let trades: Vec<PaperTrade> = state.paper_trades.read().values().cloned().collect();
    if trades.is_empty() {
        return Ok(Json(json!({ "trades": [] })));
    }

    let payload = state.feed.price_volume().await.map_err(ApiError::Upstream)?;
    let rows = normalize::extract_rows(&payload);

    let mut report = Vec::with_capacity(trades.len());
    for trade in trades {
        let current = price_from_rows(&rows, &trade.symbol);
        let entry = match current {
            Some(price) => {
                let value = trade.shares * price;
                json!({
                    "symbol": trade.symbol,
                    "entryPrice": trade.price,
                    "currentPrice": price,
                    "shares": trade.shares,
                    "credits": trade.credits,
                    "currentValue": value,
                    "profit": value - trade.credits,
                })
            }
            None => json!({
                "symbol": trade.symbol,
                "entryPrice": trade.price,
                "shares": trade.shares,
                "credits": trade.credits,
                "message": "No current price available",
            }),
        };
        report.push(entry);
    }

    Ok(Json(json!({ "trades": report })))
}

/// Today's last traded price for `symbol`, from the price-volume snapshot.
async fn today_price(state: &Arc<AppState>, symbol: &str) -> Result<Option<f64>, ApiError> {
    let payload = state.feed.price_volume().await.map_err(ApiError::Upstream)?;
    Ok(price_from_rows(&normalize::extract_rows(&payload), symbol))
}

fn price_from_rows(rows: &[serde_json::Value], symbol: &str) -> Option<f64> {
    rows.iter().find_map(|row| {
        let obj = row.as_object()?;
        let row_symbol = obj.get("symbol").and_then(serde_json::Value::as_str)?;
        if !row_symbol.trim().eq_ignore_ascii_case(symbol.trim()) {
            return None;
        }
        normalize::safe_float(obj.get("lastTradedPrice")?)
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_lookup_is_case_insensitive() {
        let rows = vec![
            json!({ "symbol": "abc", "lastTradedPrice": "1,250.5" }),
            json!({ "symbol": "DEF", "lastTradedPrice": 99 }),
        ];
        assert_eq!(price_from_rows(&rows, "ABC"), Some(1250.5));
        assert_eq!(price_from_rows(&rows, "def"), Some(99.0));
        assert_eq!(price_from_rows(&rows, "GHI"), None);
    }

    #[test]
    fn date_parsing_rejects_garbage() {
        assert!(parse_date("2024-03-01", "from").is_ok());
        assert!(parse_date("01/03/2024", "from").is_err());
        assert!(parse_date("", "to").is_err());
    }

    #[test]
    fn absent_or_empty_indicator_param_means_all_supported() {
        let all: Vec<String> = SUPPORTED_INDICATORS.iter().map(|s| s.to_string()).collect();
        assert_eq!(requested_indicator_names(None).unwrap(), all);
        assert_eq!(requested_indicator_names(Some("")).unwrap(), all);
        assert_eq!(requested_indicator_names(Some(" , ,")).unwrap(), all);
    }

    #[test]
    fn indicator_param_is_canonicalized() {
        assert_eq!(
            requested_indicator_names(Some("MACD, sma20 ,sma20")).unwrap(),
            vec!["macd", "sma20"]
        );
    }

    #[test]
    fn unknown_indicator_names_are_rejected() {
        let err = requested_indicator_names(Some("sma20,zzz")).unwrap_err();
        assert!(matches!(err, ApiError::UnknownIndicator(ref n) if n == "zzz"));
    }
}
