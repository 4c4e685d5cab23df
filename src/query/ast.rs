//! Backend-agnostic query AST.
//!
//! The compiler emits this small tagged-variant tree instead of
//! backend-native nested maps; a backend adapter translates it into whatever
//! wire format its index speaks, and the reference backend evaluates it
//! directly. That keeps compilation testable without a live index.

use serde::Serialize;

/// One node of the boolean query tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryNode {
    /// Matches every document.
    All,
    /// Exact term equality. List-valued fields match if any element equals.
    Term { field: String, value: String },
    /// Exact equality against any of the values (OR).
    Terms { field: String, values: Vec<String> },
    /// Prefix match, used for hierarchical category paths.
    Prefix { field: String, value: String },
    /// Field has at least one value.
    Exists { field: String },
    /// Scored full-text match of all query tokens within one field.
    Match {
        field: String,
        text: String,
        boost: f32,
    },
    /// Sub-query scoped to one entry of a repeated structure, so a match on
    /// one person's name cannot combine with another person's role.
    Nested { path: String, query: Box<QueryNode> },
    Bool(BoolQuery),
}

/// Boolean composition with the usual must/should/filter semantics:
/// `must` and `filter` clauses are all required, `filter` does not score,
/// and `should` is required (any-of) only when it is the sole clause kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoolQuery {
    pub must: Vec<QueryNode>,
    pub should: Vec<QueryNode>,
    pub filter: Vec<QueryNode>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.filter.is_empty()
    }

    /// Collapse into the simplest equivalent node.
    pub fn into_node(self) -> QueryNode {
        if self.is_empty() {
            QueryNode::All
        } else {
            QueryNode::Bool(self)
        }
    }
}

/// Sort directive; absent means backend-defined order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

/// One term-aggregation request.
///
/// `filter` is the aggregation's own domain query. Self-exclusion for
/// multi-select facets is encoded here structurally: the compiler builds
/// each facet's domain from the base query plus the selections of every
/// *other* facet, never its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationRequest {
    pub name: String,
    pub field: String,
    /// Restrict buckets to values under this prefix; empty means all.
    pub prefix: String,
    /// Bucket cap; 0 means backend default (unbounded within its limits).
    pub size: usize,
    pub filter: QueryNode,
}

/// A fully compiled request, ready for a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub query: QueryNode,
    pub aggregations: Vec<AggregationRequest>,
    pub sort: Option<SortSpec>,
    pub start: usize,
    pub rows: usize,
}
