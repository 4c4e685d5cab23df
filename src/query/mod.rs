//! Query compilation: request configs in, backend-agnostic query trees out.

pub mod ast;
pub mod compile;
pub mod config;
pub mod facets;

pub use ast::{AggregationRequest, BoolQuery, CompiledQuery, QueryNode, SortSpec};
pub use compile::{CompileError, compile_scroll, compile_search};
pub use config::{ScrollConfig, SearchConfig, TermFacet};
pub use facets::{merge_facets, reconcile_buckets};
