// =============================================================================
// Upstream Feed Client — raw JSON fetches from the exchange mirrors
// =============================================================================
//
// The exchange publishes the same endpoints behind several base hosts of
// varying reliability, so every fetch walks an ordered base-URL list and the
// first successful JSON response wins. The last failure propagates unchanged
// — callers decide retry/backoff policy, this client never infers values.
// =============================================================================

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

/// Per-request timeout for upstream fetches.
const FETCH_TIMEOUT_SECS: u64 = 20;

/// Path for one security's OHLC history.
const SECURITY_HISTORY_PATH: &str = "/api/nots/market/history/security";
/// Path for one security's metadata (symbol lookup).
const SECURITY_DETAIL_PATH: &str = "/api/nots/security";
/// Path for the market-wide daily price-volume snapshot.
const PRICE_VOLUME_PATH: &str = "/api/nots/nepse-data/today-price?size=500";

/// JSON feed client over an ordered list of upstream base URLs.
#[derive(Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    bases: Vec<String>,
}

impl FeedClient {
    /// Build a client with the default headers the upstream expects.
    pub fn new(bases: Vec<String>, user_agent: &str, referer: &str) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, val);
        }
        if let Ok(val) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, val);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");

        Self { client, bases }
    }

    /// GET `path` against each base in order; first parsed JSON body wins.
    pub async fn fetch(&self, path: &str) -> Result<Value> {
        let mut last_err: Option<anyhow::Error> = None;

        for base in &self.bases {
            let base = base.trim().trim_end_matches('/');
            if base.is_empty() {
                continue;
            }
            let url = format!("{base}{path}");

            let outcome = async {
                let resp = self.client.get(&url).send().await?;
                let resp = resp.error_for_status()?;
                Ok::<Value, reqwest::Error>(resp.json::<Value>().await?)
            }
            .await;

            match outcome {
                Ok(value) => {
                    debug!(url = %url, "upstream fetch ok");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "upstream fetch failed — trying next base");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("no upstream base URLs configured")))
    }

    /// The market-wide daily price-volume snapshot.
    pub async fn price_volume(&self) -> Result<Value> {
        self.fetch(PRICE_VOLUME_PATH).await
    }

    /// Raw OHLC history for one security.
    pub async fn security_history(&self, security_id: i64) -> Result<Value> {
        self.fetch(&format!("{SECURITY_HISTORY_PATH}/{security_id}"))
            .await
    }

    /// Resolve a security id to its ticker symbol, falling back to the id
    /// itself when the lookup fails or the payload carries no symbol.
    pub async fn security_symbol(&self, security_id: i64) -> String {
        match self.fetch(&format!("{SECURITY_DETAIL_PATH}/{security_id}")).await {
            Ok(payload) => {
                symbol_from_payload(&payload).unwrap_or_else(|| security_id.to_string())
            }
            Err(e) => {
                warn!(security_id, error = %e, "symbol lookup failed — using id");
                security_id.to_string()
            }
        }
    }
}

/// Pull a ticker symbol out of a security-detail payload.
///
/// Checks `symbol | stockSymbol | ticker` at the top level, then the same
/// keys nested under `data | content`.
fn symbol_from_payload(payload: &Value) -> Option<String> {
    const SYMBOL_KEYS: &[&str] = &["symbol", "stockSymbol", "ticker"];
    const NEST_KEYS: &[&str] = &["data", "content"];

    let obj = payload.as_object()?;

    for key in SYMBOL_KEYS {
        if let Some(s) = obj.get(*key).and_then(Value::as_str) {
            if !s.trim().is_empty() {
                return Some(s.trim().to_string());
            }
        }
    }

    for nest in NEST_KEYS {
        if let Some(inner) = obj.get(*nest).and_then(Value::as_object) {
            for key in SYMBOL_KEYS {
                if let Some(s) = inner.get(*key).and_then(Value::as_str) {
                    if !s.trim().is_empty() {
                        return Some(s.trim().to_string());
                    }
                }
            }
        }
    }

    None
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbol_found_at_top_level() {
        assert_eq!(
            symbol_from_payload(&json!({ "symbol": "ABC" })),
            Some("ABC".to_string())
        );
        assert_eq!(
            symbol_from_payload(&json!({ "stockSymbol": "DEF" })),
            Some("DEF".to_string())
        );
    }

    #[test]
    fn symbol_found_nested() {
        assert_eq!(
            symbol_from_payload(&json!({ "data": { "ticker": "GHI" } })),
            Some("GHI".to_string())
        );
        assert_eq!(
            symbol_from_payload(&json!({ "content": { "symbol": "JKL" } })),
            Some("JKL".to_string())
        );
    }

    #[test]
    fn symbol_absent_or_blank_is_none() {
        assert_eq!(symbol_from_payload(&json!({ "symbol": "" })), None);
        assert_eq!(symbol_from_payload(&json!({ "other": "x" })), None);
        assert_eq!(symbol_from_payload(&json!([1, 2])), None);
    }
}
