//! Search query engine and entity cache for heterogeneous archival records.
//!
//! Upstream ingesters normalize video/audio/image/PDF records into one
//! canonical document shape ([`model::SourceData`]), which is written to a
//! search backend and served back under an ACL model (metadata visibility
//! vs. content visibility). This crate is the core of that pipeline:
//!
//! - [`model`] — the canonical document and the [`model::Source`] capability
//!   trait every ingester implements.
//! - [`query`] — compiles a [`query::SearchConfig`]/[`query::ScrollConfig`]
//!   into a backend-agnostic query AST, including facet aggregations with
//!   self-exclusion domains.
//! - [`backend`] — the contract a document store must satisfy (boolean and
//!   nested queries, term aggregations, resumable scroll cursors), plus an
//!   in-process reference implementation.
//! - [`cache`] — a compressed TTL cache fronting entity materialization.
//! - [`engine`] — the [`engine::SearchEngine`] facade composing the above.
//!
//! The HTTP layer, template rendering and per-source ingestion CLIs live
//! outside this crate and talk to it exclusively through
//! [`engine::SearchEngine`] and [`model::Source`].

pub mod backend;
pub mod cache;
pub mod engine;
pub mod model;
pub mod query;

pub use backend::{BackendError, SearchBackend};
pub use cache::EntityCache;
pub use engine::{Search, SearchEngine, SearchError};
pub use model::{Source, SourceData, build_source_data};
pub use query::{ScrollConfig, SearchConfig, TermFacet};
