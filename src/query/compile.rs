//! Compilation of request configs into the query AST.
//!
//! Pure functions of their input; safe to call from any number of threads.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::query::ast::{AggregationRequest, BoolQuery, CompiledQuery, QueryNode, SortSpec};
use crate::query::config::{ScrollConfig, SearchConfig, TermFacet};

/// Field of the metadata ACL realm on indexed documents.
pub const FIELD_ACL_META: &str = "acl.meta";
/// Field of the content ACL realm on indexed documents.
pub const FIELD_ACL_CONTENT: &str = "acl.content";
/// Derived media-type list; its existence marks a document as having content.
pub const FIELD_MEDIATYPE: &str = "mediatype";
/// Index write timestamp, the incremental-sync watermark.
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Default free-text targets when a request names no fields.
const DEFAULT_TEXT_FIELDS: &[&str] = &["title", "abstract", "notes"];

/// Boost for person-name matches in the free-text disjunction.
const PERSON_BOOST: f32 = 2.0;
/// Boost for extracted media fulltext, deliberately below plain fields.
const FULLTEXT_BOOST: f32 = 0.5;

/// Malformed filter or facet input. Raised before any backend call; a
/// filter is never silently dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown field {0:?} in filter")]
    UnknownField(String),

    #[error("filter on {0:?} has no values")]
    EmptyFilter(String),

    #[error("facet {facet:?} references unknown field {field:?}")]
    UnknownFacetField { facet: String, field: String },

    #[error("free-text field {0:?} is not a text field")]
    InvalidTextField(String),
}

/// How a filter on a field translates into a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Exact term matching over scalar or list values.
    Plain,
    /// `!!`-delimited hierarchical path, matched by prefix.
    Hierarchical,
    /// Lives inside the repeated `persons` structure.
    NestedPerson,
}

static PLAIN_FIELDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "signature",
        "source",
        "title",
        "series",
        "place",
        "date",
        "collection_title",
        "abstract",
        "notes",
        "url",
        "rights",
        "license",
        "publisher",
        "catalog",
        "tags",
        FIELD_MEDIATYPE,
        FIELD_ACL_META,
        FIELD_ACL_CONTENT,
        FIELD_TIMESTAMP,
    ])
});

fn classify(field: &str) -> Result<FieldKind, CompileError> {
    if field == "category" {
        return Ok(FieldKind::Hierarchical);
    }
    if field == "persons.name" || field == "persons.role" {
        return Ok(FieldKind::NestedPerson);
    }
    if PLAIN_FIELDS.contains(field) {
        return Ok(FieldKind::Plain);
    }
    Err(CompileError::UnknownField(field.to_string()))
}

/// Compile a search request against the already-merged facet set.
///
/// `facets` must be the result of [`crate::query::facets::merge_facets`];
/// the compiler itself does not know about engine-wide defaults.
pub fn compile_search(
    cfg: &SearchConfig,
    facets: &HashMap<String, TermFacet>,
) -> Result<CompiledQuery, CompileError> {
    let base = compile_base(
        &cfg.fields,
        &cfg.qstr,
        &cfg.filter_fields,
        &cfg.groups,
        cfg.content_visible,
        cfg.is_admin,
    )?;

    let aggregations = compile_aggregations(&base, facets)?;

    // Selections of every facet narrow the result rows; the aggregation
    // domains above already encode self-exclusion.
    let mut main = base;
    for name in sorted_keys(facets) {
        let facet = &facets[name.as_str()];
        if facet.has_selection() {
            main.filter.push(selection_filter(facet));
        }
    }

    Ok(CompiledQuery {
        query: main.into_node(),
        aggregations,
        sort: None,
        start: cfg.start,
        rows: cfg.rows,
    })
}

/// Compile a scroll request: same filter semantics, no facets, no paging.
pub fn compile_scroll(cfg: &ScrollConfig) -> Result<CompiledQuery, CompileError> {
    let base = compile_base(
        &cfg.fields,
        &cfg.qstr,
        &cfg.filter_fields,
        &cfg.groups,
        cfg.content_visible,
        cfg.is_admin,
    )?;
    Ok(CompiledQuery {
        query: base.into_node(),
        aggregations: Vec::new(),
        sort: None,
        start: 0,
        rows: 0,
    })
}

fn compile_base(
    fields: &[String],
    qstr: &str,
    filter_fields: &HashMap<String, Vec<String>>,
    groups: &[String],
    content_visible: bool,
    is_admin: bool,
) -> Result<BoolQuery, CompileError> {
    let mut q = BoolQuery::default();

    // ACL goes into filter context: visibility must never influence scoring.
    if !is_admin {
        q.filter.push(QueryNode::Terms {
            field: FIELD_ACL_META.into(),
            values: groups.to_vec(),
        });
    }
    if content_visible {
        if !is_admin {
            q.filter.push(QueryNode::Terms {
                field: FIELD_ACL_CONTENT.into(),
                values: groups.to_vec(),
            });
        }
        // A document with no media is never content-visible, admin or not.
        q.filter.push(QueryNode::Exists {
            field: FIELD_MEDIATYPE.into(),
        });
    }

    // Field filters: values OR within one field, fields AND across.
    let mut filter_names: Vec<&String> = filter_fields.keys().collect();
    filter_names.sort();
    for field in filter_names {
        let values = &filter_fields[field];
        if values.is_empty() {
            return Err(CompileError::EmptyFilter(field.clone()));
        }
        q.filter.push(field_filter(field, values)?);
    }

    if !qstr.trim().is_empty() {
        q.must.push(free_text_query(fields, qstr)?);
    }

    Ok(q)
}

fn field_filter(field: &str, values: &[String]) -> Result<QueryNode, CompileError> {
    match classify(field)? {
        FieldKind::Plain => Ok(QueryNode::Terms {
            field: field.to_string(),
            values: values.to_vec(),
        }),
        FieldKind::Hierarchical => {
            let prefixes: Vec<QueryNode> = values
                .iter()
                .map(|v| QueryNode::Prefix {
                    field: field.to_string(),
                    value: v.clone(),
                })
                .collect();
            Ok(match prefixes.len() {
                1 => prefixes.into_iter().next().unwrap_or(QueryNode::All),
                _ => QueryNode::Bool(BoolQuery {
                    should: prefixes,
                    ..Default::default()
                }),
            })
        }
        FieldKind::NestedPerson => Ok(QueryNode::Nested {
            path: "persons".into(),
            query: Box::new(QueryNode::Terms {
                field: field.to_string(),
                values: values.to_vec(),
            }),
        }),
    }
}

/// The free-text disjunction: a record should be found whether the match is
/// in its descriptive fields, a contributor's name, or deep document text.
/// Recall over precision, hence OR.
fn free_text_query(fields: &[String], qstr: &str) -> Result<QueryNode, CompileError> {
    let text_fields: Vec<String> = if fields.is_empty() {
        DEFAULT_TEXT_FIELDS.iter().map(|f| (*f).to_string()).collect()
    } else {
        for f in fields {
            if classify(f)? != FieldKind::Plain {
                return Err(CompileError::InvalidTextField(f.clone()));
            }
        }
        fields.to_vec()
    };

    let mut should: Vec<QueryNode> = text_fields
        .into_iter()
        .map(|field| QueryNode::Match {
            field,
            text: qstr.to_string(),
            boost: 1.0,
        })
        .collect();
    should.push(QueryNode::Nested {
        path: "persons".into(),
        query: Box::new(QueryNode::Match {
            field: "persons.name".into(),
            text: qstr.to_string(),
            boost: PERSON_BOOST,
        }),
    });
    should.push(QueryNode::Nested {
        path: "media".into(),
        query: Box::new(QueryNode::Match {
            field: "media.fulltext".into(),
            text: qstr.to_string(),
            boost: FULLTEXT_BOOST,
        }),
    });

    Ok(QueryNode::Bool(BoolQuery {
        should,
        ..Default::default()
    }))
}

/// Filter a facet's selected values impose on documents.
fn selection_filter(facet: &TermFacet) -> QueryNode {
    QueryNode::Terms {
        field: facet.field.clone(),
        values: facet.selected_values(),
    }
}

/// One aggregation per facet, each over its own domain: the base query plus
/// the selections of every *other* facet. Excluding a facet's own selection
/// keeps its candidate buckets stable while the user narrows it.
fn compile_aggregations(
    base: &BoolQuery,
    facets: &HashMap<String, TermFacet>,
) -> Result<Vec<AggregationRequest>, CompileError> {
    let mut aggregations = Vec::with_capacity(facets.len());
    for name in sorted_keys(facets) {
        let facet = &facets[name.as_str()];
        classify(&facet.field).map_err(|_| CompileError::UnknownFacetField {
            facet: name.clone(),
            field: facet.field.clone(),
        })?;

        let mut domain = base.clone();
        for other in sorted_keys(facets) {
            if other == name {
                continue;
            }
            let other_facet = &facets[other.as_str()];
            if other_facet.has_selection() {
                domain.filter.push(selection_filter(other_facet));
            }
        }

        aggregations.push(AggregationRequest {
            name: name.clone(),
            field: facet.field.clone(),
            prefix: facet.prefix.clone(),
            size: facet.limit,
            filter: domain.into_node(),
        });
    }
    Ok(aggregations)
}

fn sorted_keys(facets: &HashMap<String, TermFacet>) -> Vec<String> {
    let mut names: Vec<String> = facets.keys().cloned().collect();
    names.sort();
    names
}

/// Rebuild a scroll query as a "most recent write" lookup: one row, sorted
/// by the write timestamp, no aggregations.
pub fn as_last_update(mut query: CompiledQuery) -> CompiledQuery {
    query.aggregations.clear();
    query.sort = Some(SortSpec {
        field: FIELD_TIMESTAMP.into(),
        descending: true,
    });
    query.start = 0;
    query.rows = 1;
    query
}
