// =============================================================================
// Time-Series Store — two interchangeable persistence backends
// =============================================================================
//
// Both backends answer "give me the candle sequence for symbol X, ascending
// by time". The document backend merges whole per-symbol histories in a
// single JSON file; the relational backend keeps one row per
// (symbol, trading_date) behind a native upsert.
// =============================================================================

pub mod document;
pub mod relational;

pub use document::DocumentStore;
pub use relational::RelationalStore;
