//! The contract a document store must satisfy, and a reference
//! implementation.
//!
//! The core never talks to an index directly; everything goes through
//! [`SearchBackend`]: boolean query execution with per-aggregation domains,
//! batch point lookup, full-replace writes, delete-by-query, and a
//! resumable scroll cursor with a renewable lease. An adapter for a real
//! index translates [`CompiledQuery`] into its wire format; the bundled
//! [`memory::MemoryBackend`] evaluates it in-process.

pub mod memory;

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::model::raw::RawDocument;
use crate::model::types::SourceData;
use crate::query::ast::CompiledQuery;

pub use memory::MemoryBackend;

/// Transport or query-rejection failure from the document store. Surfaced
/// verbatim to the caller; the core performs no retry.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown scroll cursor {0:?}")]
    UnknownCursor(String),

    #[error("scroll cursor {0:?} lease expired")]
    CursorExpired(String),

    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("store failure: {0}")]
    Store(String),
}

/// One scored search hit with per-field highlight fragments.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub doc: RawDocument,
    pub score: f32,
    pub highlights: HashMap<String, Vec<String>>,
}

/// Response to a [`SearchBackend::search`] call.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<SearchHit>,
    /// Aggregation name to bucket-value to count.
    pub aggregations: HashMap<String, HashMap<String, i64>>,
}

/// One page of an open scroll.
#[derive(Debug, Clone)]
pub struct ScrollPage {
    /// Cursor token to pass to [`SearchBackend::continue_scroll`]. Each
    /// continuation renews the lease.
    pub cursor: String,
    pub hits: Vec<RawDocument>,
    pub total: u64,
}

/// Capability interface of the document store.
pub trait SearchBackend: Send + Sync {
    /// Execute a compiled query: scored hits, total, aggregation buckets.
    fn search(&self, query: &CompiledQuery) -> Result<SearchResponse, BackendError>;

    /// Open a scroll cursor over every document matching `query` and return
    /// the first page. The cursor stays valid for `lease` and is renewed on
    /// every [`SearchBackend::continue_scroll`].
    fn open_scroll(
        &self,
        query: &CompiledQuery,
        batch_size: usize,
        lease: Duration,
    ) -> Result<ScrollPage, BackendError>;

    /// Fetch the next page of an open scroll, renewing its lease. An empty
    /// page means the scroll is drained and the cursor is gone.
    fn continue_scroll(&self, cursor: &str) -> Result<ScrollPage, BackendError>;

    /// Batch point lookup by signature. Unknown signatures are skipped, not
    /// errors.
    fn get_documents(&self, signatures: &[String]) -> Result<Vec<RawDocument>, BackendError>;

    /// Full replace keyed by signature. Writing the same signature twice
    /// leaves exactly one logical document.
    fn update(&self, doc: &SourceData) -> Result<(), BackendError>;

    /// Delete every document matching `query`; returns the count removed.
    fn delete_by_query(&self, query: &CompiledQuery) -> Result<u64, BackendError>;
}
