// =============================================================================
// Document Store — per-symbol OHLC history in one JSON file
// =============================================================================
//
// On-disk shape (keys sorted, pretty-printed):
//   { "updatedAt": ISO-8601 | null, "symbols": { SYM: [{date, o, h, l, c, v}] } }
//
// Writes go to a temporary sibling file and are renamed into place, so a
// reader never observes a partially written payload. Concurrent writers in
// the same process are serialised by a mutex; writers in different processes
// may still race at the application level (last writer wins) — an accepted,
// documented limitation of this backend.
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::DailyCandle;

/// The whole document as persisted on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPayload {
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub symbols: BTreeMap<String, Vec<DailyCandle>>,
}

/// File-backed document store for daily OHLC histories.
pub struct DocumentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create the file with the empty payload when it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.path.exists() {
            self.save(&HistoryPayload::default())?;
            debug!(path = %self.path.display(), "initialised empty OHLC history store");
        }
        Ok(())
    }

    /// Load the payload from disk.
    ///
    /// A missing, unreadable or structurally invalid file degrades to the
    /// empty payload plus a human-readable message for the caller — reads
    /// never hard-fail on a bad store.
    pub fn load(&self) -> (HistoryPayload, Option<String>) {
        if !self.path.exists() {
            return (
                HistoryPayload::default(),
                Some("OHLC history store not found".to_string()),
            );
        }

        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read history store");
                return (
                    HistoryPayload::default(),
                    Some(format!("Unable to read OHLC history store: {e}")),
                );
            }
        };

        match serde_json::from_str::<HistoryPayload>(&text) {
            Ok(payload) => (payload, None),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "history store has invalid format");
                (
                    HistoryPayload::default(),
                    Some(format!("Unable to read OHLC history store: {e}")),
                )
            }
        }
    }

    /// Persist the payload atomically: write a temporary sibling, then rename
    /// it over the real file.
    pub fn save(&self, payload: &HistoryPayload) -> Result<()> {
        let _guard = self.write_lock.lock();

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(payload).context("serialising history payload")?;
        fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }

    /// All candles for one symbol, ascending by date.
    pub fn candles_for_symbol(&self, symbol: &str) -> (Vec<DailyCandle>, Option<String>) {
        let (payload, message) = self.load();
        let candles = payload
            .symbols
            .get(&symbol.trim().to_uppercase())
            .cloned()
            .unwrap_or_default();
        (candles, message)
    }

    /// The most recent `limit` candles for one symbol, still ascending.
    ///
    /// `limit == 0` means no limit.
    pub fn recent_candles(&self, symbol: &str, limit: usize) -> (Vec<DailyCandle>, Option<String>) {
        let (mut candles, message) = self.candles_for_symbol(symbol);
        candles.sort_by(|a, b| a.date.cmp(&b.date));
        if limit > 0 && candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        (candles, message)
    }

    /// Merge one candle into a symbol's series: replace the same-date entry
    /// if present, else append; the series is re-sorted by date afterwards.
    pub fn merge_candle(payload: &mut HistoryPayload, symbol: &str, candle: DailyCandle) {
        let candles = payload
            .symbols
            .entry(symbol.trim().to_uppercase())
            .or_default();

        match candles.iter_mut().find(|c| c.date == candle.date) {
            Some(slot) => *slot = candle,
            None => candles.push(candle),
        }
        candles.sort_by(|a, b| a.date.cmp(&b.date));
    }

    /// Upsert one candle per (symbol, candle) pair and persist once.
    ///
    /// Re-applying the same batch is idempotent: same-date entries are
    /// replaced in place, so the final row set does not change.
    ///
    /// Returns the number of distinct symbols touched.
    pub fn upsert_today(&self, entries: &[(String, DailyCandle)]) -> Result<usize> {
        let (mut payload, _) = self.load();

        let mut updated: BTreeSet<String> = BTreeSet::new();
        for (symbol, candle) in entries {
            Self::merge_candle(&mut payload, symbol, candle.clone());
            updated.insert(symbol.trim().to_uppercase());
        }

        payload.updated_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
        self.save(&payload)?;
        Ok(updated.len())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn candle(date: &str, close: f64) -> DailyCandle {
        DailyCandle {
            date: date.to_string(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn missing_file_loads_as_empty_with_message() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("ohlc_history.json"));
        let (payload, message) = store.load();
        assert_eq!(payload, HistoryPayload::default());
        assert!(message.is_some());
    }

    #[test]
    fn ensure_exists_writes_the_empty_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ohlc_history.json");
        let store = DocumentStore::new(&path);
        store.ensure_exists().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"updatedAt\": null"));
        assert!(text.contains("\"symbols\": {}"));

        let (_, message) = store.load();
        assert!(message.is_none());
    }

    #[test]
    fn corrupt_file_degrades_to_empty_with_message() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ohlc_history.json");
        fs::write(&path, "{ not valid json").unwrap();

        let store = DocumentStore::new(&path);
        let (payload, message) = store.load();
        assert!(payload.symbols.is_empty());
        assert!(message.is_some());
    }

    #[test]
    fn save_leaves_no_temporary_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ohlc_history.json");
        let store = DocumentStore::new(&path);
        store.save(&HistoryPayload::default()).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("ohlc_history.json.tmp").exists());
    }

    #[test]
    fn merge_replaces_same_date_and_appends_new_dates() {
        let mut payload = HistoryPayload::default();
        DocumentStore::merge_candle(&mut payload, "abc", candle("2024-03-02", 10.0));
        DocumentStore::merge_candle(&mut payload, "abc", candle("2024-03-01", 9.0));
        DocumentStore::merge_candle(&mut payload, "abc", candle("2024-03-02", 11.0));

        let candles = &payload.symbols["ABC"];
        assert_eq!(candles.len(), 2);
        // Sorted ascending, same-date entry replaced in place.
        assert_eq!(candles[0].date, "2024-03-01");
        assert_eq!(candles[1].date, "2024-03-02");
        assert_eq!(candles[1].close, 11.0);
    }

    #[test]
    fn upsert_today_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("ohlc_history.json"));

        // 5 symbols, 3 trading days each.
        let entries: Vec<(String, DailyCandle)> = (1..=5)
            .flat_map(|i| {
                (1..=3).map(move |d| {
                    (
                        format!("SYM{i}"),
                        candle(&format!("2024-03-0{d}"), 100.0 + i as f64 + d as f64),
                    )
                })
            })
            .collect();

        assert_eq!(store.upsert_today(&entries).unwrap(), 5);
        let (first, _) = store.load();

        assert_eq!(store.upsert_today(&entries).unwrap(), 5);
        let (second, _) = store.load();

        assert_eq!(first.symbols, second.symbols);
        for i in 1..=5 {
            assert_eq!(second.symbols[&format!("SYM{i}")].len(), 3);
        }
    }

    #[test]
    fn recent_candles_returns_the_tail_ascending() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("ohlc_history.json"));
        let entries: Vec<(String, DailyCandle)> = (1..=5)
            .map(|d| ("ABC".to_string(), candle(&format!("2024-03-0{d}"), d as f64)))
            .collect();
        store.upsert_today(&entries).unwrap();

        let (tail, _) = store.recent_candles("abc", 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].date, "2024-03-04");
        assert_eq!(tail[1].date, "2024-03-05");

        let (all, _) = store.recent_candles("ABC", 0);
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn unknown_symbol_reads_empty() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("ohlc_history.json"));
        store.ensure_exists().unwrap();
        let (candles, message) = store.candles_for_symbol("NOPE");
        assert!(candles.is_empty());
        assert!(message.is_none());
    }

    // Full pipeline: heterogeneous raw rows -> normalized candles -> stored
    // daily candles -> read back unchanged.
    #[test]
    fn normalized_batch_round_trips_through_the_store() {
        use crate::normalize;
        use serde_json::json;

        let payload = json!({
            "content": [
                // Millisecond epoch, numeric fields.
                { "time": 1_699_920_000_000_i64, "open": 100.0, "high": 104.0,
                  "low": 99.0, "close": 103.0, "volume": 1500 },
                // Second epoch, alternate field names.
                { "timestamp": 1_700_006_400, "openPrice": 103.0, "highPrice": 106.5,
                  "lowPrice": 102.0, "lastTradedPrice": "105.25",
                  "totalTradeQuantity": "2,300" },
                // ISO datetime, string prices with thousands separators.
                { "date": "2023-11-16T00:00:00Z", "open": "1,050.0", "high": "1,090.5",
                  "low": "1,040.0", "close": "1,088.0", "volume": "12,000" },
                // Plain date.
                { "businessDate": "2023-11-17", "open": 108.0, "high": 110.0,
                  "low": 107.0, "close": 109.5, "volume": 900 },
                // Malformed: close is not numeric, must be dropped.
                { "date": "2023-11-18", "open": 109.0, "high": 111.0,
                  "low": 108.0, "close": "n/a", "volume": 500 },
                // Naive datetime without zone.
                { "date": "2023-11-20 00:00:00", "open": 110.0, "high": 112.0,
                  "low": 109.0, "close": 111.0, "volume": 700 },
                // Numeric-string second epoch (2023-11-21).
                { "tradeDate": "1700524800", "open": 111.0, "high": 113.0,
                  "low": 110.5, "close": 112.5 },
                // Missing volume entirely -> defaults to zero.
                { "date": "2023-11-22", "open": 112.0, "high": 114.0,
                  "low": 111.0, "close": 113.0 },
                { "date": "2023-11-23", "open": 113.0, "high": 115.0,
                  "low": 112.0, "close": 114.0, "volume": 650 },
                { "date": "2023-11-24", "open": 114.0, "high": 116.0,
                  "low": 113.0, "close": 115.5, "volume": 800 },
            ]
        });

        let candles = normalize::normalize(&payload);
        assert_eq!(candles.len(), 9, "only the malformed row is dropped");

        let entries: Vec<(String, DailyCandle)> = candles
            .iter()
            .map(|c| {
                (
                    "ABC".to_string(),
                    DailyCandle {
                        date: c.date_string(),
                        open: c.open,
                        high: c.high,
                        low: c.low,
                        close: c.close,
                        volume: c.volume,
                    },
                )
            })
            .collect();

        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("ohlc_history.json"));
        assert_eq!(store.upsert_today(&entries).unwrap(), 1);

        let (stored, message) = store.candles_for_symbol("abc");
        assert!(message.is_none());
        assert_eq!(stored.len(), 9);

        let dates: Vec<&str> = stored.iter().map(|c| c.date.as_str()).collect();
        assert_eq!(
            dates,
            [
                "2023-11-14", "2023-11-15", "2023-11-16", "2023-11-17", "2023-11-20",
                "2023-11-21", "2023-11-22", "2023-11-23", "2023-11-24",
            ]
        );

        assert_eq!(stored[1].close, 105.25);
        assert_eq!(stored[1].volume, 2300.0);
        assert_eq!(stored[2].high, 1090.5);
        // Numeric-string epoch resolved to its UTC trading date.
        assert_eq!(stored[5].close, 112.5);
        // Missing volume defaults to zero, not a dropped row.
        assert_eq!(stored[6].volume, 0.0);
    }
}
