// =============================================================================
// Candle Normalizer — heterogeneous upstream rows to canonical candles
// =============================================================================
//
// The upstream feed has no stable schema: the candle list may arrive bare or
// nested under one of several container keys, field names differ between
// endpoints (`open` vs `openPrice`, `close` vs `lastTradedPrice`, ...), and
// timestamps show up as millisecond epochs, second epochs, ISO-8601 strings
// or plain dates — sometimes all in the same payload.
//
// Resolution is table-driven: each canonical field has a prioritized alias
// list and a single lookup walks it, first present wins. Rows that cannot
// resolve time/open/high/low/close to finite numbers are dropped silently;
// a partial batch is always better than no batch.
// =============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::store::relational::DailyRow;
use crate::types::{Candle, DailyCandle};

// =============================================================================
// Field resolution tables
// =============================================================================

/// Container keys tried when the payload nests its row list inside an object.
const CONTAINER_KEYS: &[&str] = &["content", "data", "history", "ohlc", "candles", "rows", "items"];
/// Container keys tried one level deeper (object inside object).
const NESTED_CONTAINER_KEYS: &[&str] = &["content", "data", "rows", "items"];

const TIME_ALIASES: &[&str] = &["time", "timestamp", "date", "businessDate", "tradeDate"];
const OPEN_ALIASES: &[&str] = &["open", "openPrice"];
const HIGH_ALIASES: &[&str] = &["high", "highPrice"];
const LOW_ALIASES: &[&str] = &["low", "lowPrice"];
const CLOSE_ALIASES: &[&str] = &["close", "closePrice", "lastTradedPrice"];
const VOLUME_ALIASES: &[&str] = &["volume", "totalTradeQuantity", "lastTradedVolume"];

/// Return the first non-null value among `aliases`, in priority order.
fn resolve<'a>(row: &'a serde_json::Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|key| row.get(*key).filter(|v| !v.is_null()))
}

// =============================================================================
// Tolerant scalar parsing
// =============================================================================

/// Parse a JSON value into a finite f64, tolerating the feed's quirks.
///
/// - `null` and empty strings are a failure signal, not zero.
/// - Thousands-separator commas are stripped (`"1,234.5"` -> 1234.5).
/// - Anything non-numeric fails.
pub fn safe_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// [`safe_float`] truncated to an integer.
pub fn safe_int(value: &Value) -> Option<i64> {
    safe_float(value).map(|v| v as i64)
}

/// Map a numeric timestamp onto UNIX seconds by magnitude.
///
/// Values above 1e12 are millisecond epochs, values in (1e9, 1e12] are
/// second epochs, anything smaller is ambiguous and fails.
fn numeric_to_unix_seconds(value: f64) -> Option<i64> {
    if value > 1.0e12 {
        Some((value / 1000.0) as i64)
    } else if value > 1.0e9 {
        Some(value as i64)
    } else {
        None
    }
}

/// Parse a date or datetime string into UNIX seconds (UTC).
fn parse_datetime_string(raw: &str) -> Option<i64> {
    // ISO-8601 with an explicit offset; `Z` is normalized first.
    let with_offset = raw.replace('Z', "+00:00");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&with_offset) {
        return Some(dt.timestamp());
    }

    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp());
    }

    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }

    None
}

/// Parse any supported timestamp encoding into UNIX seconds.
///
/// Stages, applied in order until one succeeds:
/// 1. Numeric magnitude heuristic (ms vs s epoch).
/// 2. The same heuristic on numeric strings.
/// 3. ISO-8601 (`Z` normalized to `+00:00`).
/// 4. Explicit fallback formats (`YYYY-MM-DD`, space/`T` datetimes,
///    optional fractional seconds).
pub fn parse_time_to_unix_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => numeric_to_unix_seconds(n.as_f64()?),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            // A numeric string may still be an epoch; small numbers fall
            // through to date parsing.
            if let Ok(numeric) = trimmed.parse::<f64>() {
                if let Some(unix) = numeric_to_unix_seconds(numeric) {
                    return Some(unix);
                }
            }
            parse_datetime_string(trimmed)
        }
        _ => None,
    }
}

/// Parse an upstream `lastUpdatedDateTime`-style value into a UTC timestamp.
pub fn parse_last_updated(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }
    let unix = parse_datetime_string(raw)?;
    DateTime::from_timestamp(unix, 0)
}

// =============================================================================
// Row extraction & normalization
// =============================================================================

/// Pull the row list out of a raw payload.
///
/// Accepts a bare list, or an object nesting the list under one of the known
/// container keys (including one level of object nesting). Anything else
/// yields an empty list.
pub fn extract_rows(payload: &Value) -> Vec<Value> {
    if let Value::Array(rows) = payload {
        return rows.clone();
    }

    let Some(map) = payload.as_object() else {
        return Vec::new();
    };

    for key in CONTAINER_KEYS {
        match map.get(*key) {
            Some(Value::Array(rows)) => return rows.clone(),
            Some(Value::Object(nested)) => {
                for nested_key in NESTED_CONTAINER_KEYS {
                    if let Some(Value::Array(rows)) = nested.get(*nested_key) {
                        return rows.clone();
                    }
                }
            }
            _ => {}
        }
    }

    Vec::new()
}

/// Normalize a single raw row into a canonical candle.
///
/// Returns `None` when any of time/open/high/low/close fails to resolve to a
/// finite number. Volume defaults to 0 when unresolved.
pub fn normalize_row(raw: &Value) -> Option<Candle> {
    let row = raw.as_object()?;

    let time = resolve(row, TIME_ALIASES).and_then(parse_time_to_unix_seconds)?;
    let open = resolve(row, OPEN_ALIASES).and_then(safe_float)?;
    let high = resolve(row, HIGH_ALIASES).and_then(safe_float)?;
    let low = resolve(row, LOW_ALIASES).and_then(safe_float)?;
    let close = resolve(row, CLOSE_ALIASES).and_then(safe_float)?;
    let volume = resolve(row, VOLUME_ALIASES)
        .and_then(safe_float)
        .unwrap_or(0.0);

    Some(Candle {
        time,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Normalize a whole raw payload into canonical candles.
///
/// Unparseable rows are dropped, not surfaced as errors — the caller gets
/// every candle that survived.
pub fn normalize(payload: &Value) -> Vec<Candle> {
    let rows = extract_rows(payload);
    let total = rows.len();
    let candles: Vec<Candle> = rows.iter().filter_map(normalize_row).collect();
    if candles.len() < total {
        debug!(
            accepted = candles.len(),
            dropped = total - candles.len(),
            "normalizer dropped malformed rows"
        );
    }
    candles
}

// =============================================================================
// Snapshot row mapping (price-volume feed -> store shapes)
// =============================================================================

/// Map one price-volume row onto a document-store entry for `date`.
///
/// Returns `None` when the symbol is missing or any OHLC price fails to
/// resolve; such rows are skipped, not zero-filled.
pub fn daily_candle_from_price_volume(row: &Value, date: &str) -> Option<(String, DailyCandle)> {
    let obj = row.as_object()?;

    let symbol = obj.get("symbol")?.as_str()?.trim().to_uppercase();
    if symbol.is_empty() {
        return None;
    }

    let open = obj.get("openPrice").and_then(safe_float)?;
    let high = obj.get("highPrice").and_then(safe_float)?;
    let low = obj.get("lowPrice").and_then(safe_float)?;
    let close = obj.get("lastTradedPrice").and_then(safe_float)?;

    // Volume fallback: prefer lastTradedVolume, then totalTradeQuantity.
    let volume = obj
        .get("lastTradedVolume")
        .filter(|v| !v.is_null())
        .or_else(|| obj.get("totalTradeQuantity"))
        .and_then(safe_float)
        .unwrap_or(0.0);

    Some((
        symbol,
        DailyCandle {
            date: date.to_string(),
            open,
            high,
            low,
            close,
            volume,
        },
    ))
}

/// Map one price-volume row onto a relational upsert row.
///
/// Unlike the document path, individual prices may be null here — the table
/// keeps nullable columns and the upsert overwrites them wholesale.
pub fn daily_row_from_price_volume(row: &Value) -> Option<DailyRow> {
    let obj = row.as_object()?;

    let symbol = obj.get("symbol")?.as_str()?.trim().to_uppercase();
    if symbol.is_empty() {
        return None;
    }

    let volume_value = obj
        .get("lastTradedVolume")
        .filter(|v| !v.is_null())
        .or_else(|| obj.get("totalTradeQuantity"));

    Some(DailyRow {
        security_id: obj.get("securityId").and_then(safe_int),
        symbol,
        security_name: obj
            .get("securityName")
            .and_then(Value::as_str)
            .map(str::to_string),
        sector: obj
            .get("sectorName")
            .and_then(Value::as_str)
            .map(str::to_string),
        open_price: obj.get("openPrice").and_then(safe_float),
        high_price: obj.get("highPrice").and_then(safe_float),
        low_price: obj.get("lowPrice").and_then(safe_float),
        close_price: obj.get("lastTradedPrice").and_then(safe_float),
        prev_close: obj.get("previousClose").and_then(safe_float),
        volume: volume_value.and_then(safe_float),
        trade_qty: obj.get("totalTradeQuantity").and_then(safe_float),
        trade_value: obj.get("totalTradeValue").and_then(safe_float),
        pct_change: obj.get("percentageChange").and_then(safe_float),
        last_updated: obj.get("lastUpdatedDateTime").and_then(parse_last_updated),
    })
}
