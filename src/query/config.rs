//! Request-scoped search and scroll configuration.

use std::collections::HashMap;

/// One user-selectable term facet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermFacet {
    /// Backend field the facet aggregates over.
    pub field: String,
    /// Restrict candidate buckets to values under this prefix (hierarchical
    /// facets); empty means no restriction.
    pub prefix: String,
    /// Bucket cap for the aggregation; 0 means backend default.
    pub limit: usize,
    /// Per-value selection state. Only values mapped to `true` become query
    /// filters; `false` entries keep a value visible without filtering.
    pub selected: HashMap<String, bool>,
}

impl TermFacet {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ..Default::default()
        }
    }

    /// Selected values, sorted for deterministic query trees.
    pub fn selected_values(&self) -> Vec<String> {
        let mut values: Vec<String> = self
            .selected
            .iter()
            .filter(|(_, on)| **on)
            .map(|(v, _)| v.clone())
            .collect();
        values.sort();
        values
    }

    pub fn has_selection(&self) -> bool {
        self.selected.values().any(|on| *on)
    }
}

/// Immutable value object describing one search request.
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    /// Fields the free-text query runs against; empty means the default
    /// full-text fields (title, abstract, notes).
    pub fields: Vec<String>,
    /// Free-text query string; empty means match-all.
    pub qstr: String,
    /// Field name to accepted values; values OR within a field, fields AND.
    pub filter_fields: HashMap<String, Vec<String>>,
    /// Per-request facets, merged over the engine's default facet list.
    pub facets: HashMap<String, TermFacet>,
    /// Caller's group memberships for ACL filtering.
    pub groups: Vec<String>,
    /// Require content visibility (media ACL plus attached media).
    pub content_visible: bool,
    /// Admins bypass ACL group checks.
    pub is_admin: bool,
    pub start: usize,
    pub rows: usize,
}

/// Immutable value object describing a full-corpus scroll. Same filter
/// semantics as [`SearchConfig`], without pagination or facets.
#[derive(Debug, Clone, Default)]
pub struct ScrollConfig {
    pub fields: Vec<String>,
    pub qstr: String,
    pub filter_fields: HashMap<String, Vec<String>>,
    pub groups: Vec<String>,
    pub content_visible: bool,
    pub is_admin: bool,
}
