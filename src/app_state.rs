// =============================================================================
// Application State — shared handles behind one Arc
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::cache::TtlCache;
use crate::config::RuntimeConfig;
use crate::error::ApiError;
use crate::rate_limit::RateLimiter;
use crate::store::{DocumentStore, RelationalStore};
use crate::ta::{TaHistory, TaIndicators};
use crate::types::PaperTrade;
use crate::upstream::FeedClient;

/// Everything the request handlers share. Constructed once at startup and
/// cloned behind an `Arc` into the router.
pub struct AppState {
    pub config: RuntimeConfig,
    pub feed: FeedClient,
    pub document_store: DocumentStore,
    pub relational: Option<RelationalStore>,
    pub history_cache: TtlCache<TaHistory>,
    pub indicator_cache: TtlCache<TaIndicators>,
    pub rate_limiter: RateLimiter,
    pub paper_trades: RwLock<HashMap<String, PaperTrade>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig, relational: Option<RelationalStore>) -> Self {
        let feed = FeedClient::new(
            config.upstream_bases.clone(),
            &config.user_agent,
            &config.referer,
        );
        let document_store = DocumentStore::new(&config.history_path);
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        let rate_limiter = RateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window_secs,
        );

        Self {
            config,
            feed,
            document_store,
            relational,
            history_cache: TtlCache::new(ttl),
            indicator_cache: TtlCache::new(ttl),
            rate_limiter,
            paper_trades: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// The relational backend, or a storage error when it was never
    /// configured.
    pub fn relational(&self) -> Result<&RelationalStore, ApiError> {
        self.relational
            .as_ref()
            .ok_or_else(|| ApiError::Storage(anyhow::anyhow!("DATABASE_URL is not set")))
    }
}
