// =============================================================================
// Relational Store — daily_ohlc table with native upsert semantics
// =============================================================================
//
// One row per (symbol, trading_date), enforced by a UNIQUE constraint. The
// write path is INSERT ... ON CONFLICT DO UPDATE overwriting every non-key
// column, which makes batch writes idempotent: re-running an identical batch
// neither duplicates rows nor changes stored values. Per-row atomicity is
// delegated to the database.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS daily_ohlc (
    id BIGSERIAL PRIMARY KEY,
    trading_date DATE NOT NULL,
    security_id BIGINT NULL,
    symbol TEXT NOT NULL,
    security_name TEXT NULL,
    sector TEXT NULL,
    open_price DOUBLE PRECISION NULL,
    high_price DOUBLE PRECISION NULL,
    low_price DOUBLE PRECISION NULL,
    close_price DOUBLE PRECISION NULL,
    prev_close DOUBLE PRECISION NULL,
    volume DOUBLE PRECISION NULL,
    trade_qty DOUBLE PRECISION NULL,
    trade_value DOUBLE PRECISION NULL,
    pct_change DOUBLE PRECISION NULL,
    last_updated TIMESTAMPTZ NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (symbol, trading_date)
);

CREATE INDEX IF NOT EXISTS idx_daily_ohlc_symbol
    ON daily_ohlc (symbol);

CREATE INDEX IF NOT EXISTS idx_daily_ohlc_trading_date
    ON daily_ohlc (trading_date);
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO daily_ohlc (
    trading_date, security_id, symbol, security_name, sector,
    open_price, high_price, low_price, close_price, prev_close,
    volume, trade_qty, trade_value, pct_change, last_updated
)
VALUES (
    $1, $2, $3, $4, $5,
    $6, $7, $8, $9, $10,
    $11, $12, $13, $14, $15
)
ON CONFLICT (symbol, trading_date)
DO UPDATE SET
    security_id = EXCLUDED.security_id,
    security_name = EXCLUDED.security_name,
    sector = EXCLUDED.sector,
    open_price = EXCLUDED.open_price,
    high_price = EXCLUDED.high_price,
    low_price = EXCLUDED.low_price,
    close_price = EXCLUDED.close_price,
    prev_close = EXCLUDED.prev_close,
    volume = EXCLUDED.volume,
    trade_qty = EXCLUDED.trade_qty,
    trade_value = EXCLUDED.trade_value,
    pct_change = EXCLUDED.pct_change,
    last_updated = EXCLUDED.last_updated
"#;

const SELECT_COLUMNS: &str = r#"
SELECT trading_date, open_price, high_price, low_price, close_price,
       prev_close, volume, trade_qty, trade_value, pct_change
  FROM daily_ohlc
"#;

/// One row staged for the daily upsert batch.
#[derive(Debug, Clone, Serialize)]
pub struct DailyRow {
    pub security_id: Option<i64>,
    pub symbol: String,
    pub security_name: Option<String>,
    pub sector: Option<String>,
    pub open_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub close_price: Option<f64>,
    pub prev_close: Option<f64>,
    pub volume: Option<f64>,
    pub trade_qty: Option<f64>,
    pub trade_value: Option<f64>,
    pub pct_change: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// A persisted daily_ohlc row as returned by reads.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDailyRow {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub prev_close: Option<f64>,
    pub volume: Option<f64>,
    pub trade_qty: Option<f64>,
    pub trade_value: Option<f64>,
    pub pct_change: Option<f64>,
}

/// Postgres-backed daily OHLC store.
#[derive(Clone)]
pub struct RelationalStore {
    pool: PgPool,
}

impl RelationalStore {
    /// Connect a small pool to the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("connecting to Postgres");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to Postgres")?;
        Ok(Self { pool })
    }

    /// Create the daily_ohlc table and its indexes. Safe to run repeatedly.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("creating daily_ohlc schema")?;
        debug!("daily_ohlc schema ensured");
        Ok(())
    }

    /// Upsert a batch of rows inside one transaction.
    ///
    /// Idempotent: the UNIQUE (symbol, trading_date) constraint plus
    /// overwrite-on-conflict means re-running an identical batch leaves the
    /// table unchanged.
    pub async fn upsert_batch(&self, rows: &[DailyRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(UPSERT_SQL)
                .bind(trading_date_for(row))
                .bind(row.security_id)
                .bind(&row.symbol)
                .bind(&row.security_name)
                .bind(&row.sector)
                .bind(row.open_price)
                .bind(row.high_price)
                .bind(row.low_price)
                .bind(row.close_price)
                .bind(row.prev_close)
                .bind(row.volume)
                .bind(row.trade_qty)
                .bind(row.trade_value)
                .bind(row.pct_change)
                .bind(row.last_updated)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("upserting {}", row.symbol))?;
        }
        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    /// Candles for `symbol` within the inclusive `[from, to]` range,
    /// ascending by trading date.
    ///
    /// `limit` selects the *most recent* rows of the range: the query orders
    /// descending, applies the limit, and the result is re-ascended in
    /// memory. (A plain ascending LIMIT would return the oldest rows, which
    /// is never what a chart caller wants.)
    pub async fn candles_in_range(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: i64,
    ) -> Result<Vec<StoredDailyRow>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE symbol = $1 AND trading_date BETWEEN $2 AND $3 \
             ORDER BY trading_date DESC LIMIT $4"
        );
        let rows = sqlx::query(&sql)
            .bind(symbol.trim().to_uppercase())
            .bind(from)
            .bind(to)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("querying daily_ohlc range")?;

        let mut out = rows
            .iter()
            .map(row_from_pg)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
        out.reverse();
        Ok(out)
    }

    /// The most recent row for `symbol`, if any.
    pub async fn latest(&self, symbol: &str) -> Result<Option<StoredDailyRow>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE symbol = $1 ORDER BY trading_date DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(symbol.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await
            .context("querying latest daily_ohlc row")?;
        row.as_ref().map(row_from_pg).transpose().map_err(Into::into)
    }

    /// All distinct symbols, ascending.
    pub async fn symbols(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT symbol FROM daily_ohlc ORDER BY symbol ASC")
            .fetch_all(&self.pool)
            .await
            .context("querying daily_ohlc symbols")?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("symbol"))
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }
}

/// The trading date for a staged row: the UTC date of `last_updated`, or
/// today when the feed gave no timestamp. Computed here rather than in SQL so
/// the server's session time zone cannot shift the date.
fn trading_date_for(row: &DailyRow) -> NaiveDate {
    row.last_updated
        .map(|dt| dt.date_naive())
        .unwrap_or_else(|| Utc::now().date_naive())
}

fn row_from_pg(row: &sqlx::postgres::PgRow) -> std::result::Result<StoredDailyRow, sqlx::Error> {
    Ok(StoredDailyRow {
        date: row.try_get("trading_date")?,
        open: row.try_get("open_price")?,
        high: row.try_get("high_price")?,
        low: row.try_get("low_price")?,
        close: row.try_get("close_price")?,
        prev_close: row.try_get("prev_close")?,
        volume: row.try_get("volume")?,
        trade_qty: row.try_get("trade_qty")?,
        trade_value: row.try_get("trade_value")?,
        pct_change: row.try_get("pct_change")?,
    })
}

/// Normalise a deployment-provided database URL: the `postgres://` scheme
/// becomes `postgresql://`, and `sslmode=require` is appended unless the URL
/// already pins an sslmode.
pub fn normalize_database_url(raw: &str) -> String {
    let url = match raw.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => raw.to_string(),
    };

    if url.contains("sslmode=") {
        url
    } else if url.contains('?') {
        format!("{url}&sslmode=require")
    } else {
        format!("{url}?sslmode=require")
    }
}
