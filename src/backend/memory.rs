//! In-process reference backend.
//!
//! Evaluates the query AST directly over a document table. This is what the
//! compiler, the scroll protocol and the facade are tested against; it also
//! serves small deployments that do not warrant an external index.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::{BackendError, ScrollPage, SearchBackend, SearchHit, SearchResponse};
use crate::model::raw::RawDocument;
use crate::model::types::{Media, Person, SourceData};
use crate::query::ast::{AggregationRequest, BoolQuery, CompiledQuery, QueryNode, SortSpec};

struct StoredDocument {
    data: SourceData,
    raw: RawDocument,
}

struct ScrollState {
    queue: VecDeque<String>,
    batch: usize,
    lease: Duration,
    expires_at: Instant,
    total: u64,
}

/// Document store evaluating compiled queries in memory.
///
/// Documents are kept in a `BTreeMap` keyed by signature, so "index order"
/// is signature order and stable within one open cursor.
#[derive(Default)]
pub struct MemoryBackend {
    docs: RwLock<BTreeMap<String, StoredDocument>>,
    cursors: Mutex<HashMap<String, ScrollState>>,
    cursor_seq: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Insert a document whose stored blob differs from its indexed fields.
    /// Lets tests exercise per-document materialization failure paths.
    pub fn insert_with_blob(&self, doc: &SourceData, blob: Vec<u8>) {
        let raw = RawDocument {
            signature: doc.signature.clone(),
            source: doc.source.clone(),
            blob,
            acl: doc.acl.clone(),
            catalog: doc.catalog.clone(),
            timestamp: doc.timestamp,
        };
        self.docs.write().insert(
            doc.signature.clone(),
            StoredDocument {
                data: doc.clone(),
                raw,
            },
        );
    }

    fn matching_signatures(&self, query: &QueryNode) -> Vec<String> {
        self.docs
            .read()
            .iter()
            .filter(|(_, stored)| eval(query, &Scope::Doc(&stored.data)).is_some())
            .map(|(sig, _)| sig.clone())
            .collect()
    }

    fn aggregate(
        docs: &BTreeMap<String, StoredDocument>,
        request: &AggregationRequest,
    ) -> HashMap<String, i64> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for stored in docs.values() {
            if eval(&request.filter, &Scope::Doc(&stored.data)).is_none() {
                continue;
            }
            for value in scope_values(&Scope::Doc(&stored.data), &request.field) {
                if !request.prefix.is_empty() && !value.starts_with(&request.prefix) {
                    continue;
                }
                *counts.entry(value).or_insert(0) += 1;
            }
        }
        if request.size > 0 && counts.len() > request.size {
            let mut ranked: Vec<(String, i64)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            ranked.truncate(request.size);
            counts = ranked.into_iter().collect();
        }
        counts
    }
}

impl SearchBackend for MemoryBackend {
    fn search(&self, query: &CompiledQuery) -> Result<SearchResponse, BackendError> {
        let docs = self.docs.read();

        let mut matched: Vec<(&String, &StoredDocument, f32)> = docs
            .iter()
            .filter_map(|(sig, stored)| {
                eval(&query.query, &Scope::Doc(&stored.data)).map(|score| (sig, stored, score))
            })
            .collect();

        match &query.sort {
            Some(sort) => sort_matched(&mut matched, sort),
            None => {
                matched.sort_by(|a, b| {
                    b.2.partial_cmp(&a.2)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.cmp(b.0))
                });
            }
        }

        let total = matched.len() as u64;
        let hits: Vec<SearchHit> = matched
            .iter()
            .skip(query.start)
            .take(query.rows)
            .map(|(_, stored, score)| {
                let mut highlights = HashMap::new();
                collect_highlights(&query.query, &stored.data, &mut highlights);
                SearchHit {
                    doc: stored.raw.clone(),
                    score: *score,
                    highlights,
                }
            })
            .collect();

        let mut aggregations = HashMap::with_capacity(query.aggregations.len());
        for request in &query.aggregations {
            aggregations.insert(request.name.clone(), Self::aggregate(&docs, request));
        }

        debug!(total, hits = hits.len(), "memory backend search");
        Ok(SearchResponse {
            total,
            hits,
            aggregations,
        })
    }

    fn open_scroll(
        &self,
        query: &CompiledQuery,
        batch_size: usize,
        lease: Duration,
    ) -> Result<ScrollPage, BackendError> {
        if batch_size == 0 {
            return Err(BackendError::QueryRejected(
                "scroll batch size must be positive".into(),
            ));
        }
        let signatures = self.matching_signatures(&query.query);
        let total = signatures.len() as u64;
        let cursor = format!("cursor-{}", self.cursor_seq.fetch_add(1, Ordering::Relaxed));

        let mut state = ScrollState {
            queue: signatures.into(),
            batch: batch_size,
            lease,
            expires_at: Instant::now() + lease,
            total,
        };
        let hits = self.drain_batch(&mut state);

        let mut cursors = self.cursors.lock();
        // Abandoned cursors whose lease ran out are reclaimed here, the way
        // a real index expires server-held scroll contexts.
        cursors.retain(|_, s| Instant::now() <= s.expires_at);
        if !hits.is_empty() {
            cursors.insert(cursor.clone(), state);
        }
        debug!(cursor = %cursor, total, first_page = hits.len(), "opened scroll");
        Ok(ScrollPage {
            cursor,
            hits,
            total,
        })
    }

    fn continue_scroll(&self, cursor: &str) -> Result<ScrollPage, BackendError> {
        let mut cursors = self.cursors.lock();
        let Some(mut state) = cursors.remove(cursor) else {
            return Err(BackendError::UnknownCursor(cursor.to_string()));
        };
        if Instant::now() > state.expires_at {
            return Err(BackendError::CursorExpired(cursor.to_string()));
        }
        state.expires_at = Instant::now() + state.lease;
        let total = state.total;
        let hits = self.drain_batch(&mut state);
        // The cursor survives until it has served its terminal empty page.
        if !hits.is_empty() {
            cursors.insert(cursor.to_string(), state);
        }
        Ok(ScrollPage {
            cursor: cursor.to_string(),
            hits,
            total,
        })
    }

    fn get_documents(&self, signatures: &[String]) -> Result<Vec<RawDocument>, BackendError> {
        let docs = self.docs.read();
        Ok(signatures
            .iter()
            .filter_map(|sig| docs.get(sig).map(|stored| stored.raw.clone()))
            .collect())
    }

    fn update(&self, doc: &SourceData) -> Result<(), BackendError> {
        let raw = RawDocument::encode(doc).map_err(|e| BackendError::Store(e.to_string()))?;
        self.docs.write().insert(
            doc.signature.clone(),
            StoredDocument {
                data: doc.clone(),
                raw,
            },
        );
        Ok(())
    }

    fn delete_by_query(&self, query: &CompiledQuery) -> Result<u64, BackendError> {
        let signatures = self.matching_signatures(&query.query);
        let mut docs = self.docs.write();
        let mut removed = 0u64;
        for sig in signatures {
            if docs.remove(&sig).is_some() {
                removed += 1;
            }
        }
        debug!(removed, "delete by query");
        Ok(removed)
    }
}

impl MemoryBackend {
    fn drain_batch(&self, state: &mut ScrollState) -> Vec<RawDocument> {
        let docs = self.docs.read();
        let mut hits = Vec::with_capacity(state.batch.min(state.queue.len()));
        while hits.len() < state.batch {
            let Some(sig) = state.queue.pop_front() else {
                break;
            };
            // Documents deleted since the snapshot are skipped.
            if let Some(stored) = docs.get(&sig) {
                hits.push(stored.raw.clone());
            }
        }
        hits
    }
}

fn sort_matched(matched: &mut [(&String, &StoredDocument, f32)], sort: &SortSpec) {
    matched.sort_by(|a, b| {
        let ka = sort_key(&a.1.data, &sort.field);
        let kb = sort_key(&b.1.data, &sort.field);
        let ord = ka.cmp(&kb).then_with(|| a.0.cmp(b.0));
        if sort.descending { ord.reverse() } else { ord }
    });
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Time(i64),
    Text(String),
}

fn sort_key(doc: &SourceData, field: &str) -> SortKey {
    match field {
        "timestamp" => SortKey::Time(doc.timestamp.timestamp_millis()),
        "date_added" => SortKey::Time(doc.date_added.timestamp_millis()),
        _ => SortKey::Text(
            scope_values(&Scope::Doc(doc), field)
                .into_iter()
                .next()
                .unwrap_or_default(),
        ),
    }
}

// -------------------------------------------------------------------------
// Query evaluation
// -------------------------------------------------------------------------

/// Evaluation scope: the whole document, or one entry of a repeated
/// structure inside a nested sub-query.
enum Scope<'a> {
    Doc(&'a SourceData),
    Person(&'a Person),
    MediaItem(&'a Media),
}

fn scope_values(scope: &Scope<'_>, field: &str) -> Vec<String> {
    match scope {
        Scope::Doc(doc) => doc_values(doc, field),
        Scope::Person(p) => match field {
            "persons.name" => vec![p.name.clone()],
            "persons.role" => vec![p.role.clone()],
            _ => Vec::new(),
        },
        Scope::MediaItem(m) => match field {
            "media.fulltext" => m.fulltext.clone().into_iter().collect(),
            "media.mimetype" => vec![m.mimetype.clone()],
            _ => Vec::new(),
        },
    }
}

fn doc_values(doc: &SourceData, field: &str) -> Vec<String> {
    let scalar = |s: &String| {
        if s.is_empty() {
            Vec::new()
        } else {
            vec![s.clone()]
        }
    };
    match field {
        "signature" => scalar(&doc.signature),
        "source" => scalar(&doc.source),
        "title" => scalar(&doc.title),
        "series" => scalar(&doc.series),
        "place" => scalar(&doc.place),
        "date" => scalar(&doc.date),
        "collection_title" => scalar(&doc.collection_title),
        "abstract" => scalar(&doc.abstract_),
        "url" => scalar(&doc.url),
        "rights" => scalar(&doc.rights),
        "license" => scalar(&doc.license),
        "publisher" => scalar(&doc.publisher),
        "notes" => doc.notes.clone(),
        "catalog" => doc.catalog.clone(),
        "category" => doc.category.clone(),
        "tags" => doc.tags.clone(),
        "mediatype" => doc.mediatype.clone(),
        "acl.meta" => doc.acl_groups(crate::model::types::ACL_META).to_vec(),
        "acl.content" => doc.acl_groups(crate::model::types::ACL_CONTENT).to_vec(),
        "timestamp" => vec![doc.timestamp.to_rfc3339()],
        "persons.name" => doc.persons.iter().map(|p| p.name.clone()).collect(),
        "persons.role" => doc.persons.iter().map(|p| p.role.clone()).collect(),
        _ => Vec::new(),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Evaluate a node; `Some(score)` on match, `None` otherwise. Filter-style
/// clauses contribute a zero score, match clauses their boost.
fn eval(node: &QueryNode, scope: &Scope<'_>) -> Option<f32> {
    match node {
        QueryNode::All => Some(0.0),
        QueryNode::Term { field, value } => scope_values(scope, field)
            .iter()
            .any(|v| v == value)
            .then_some(0.0),
        QueryNode::Terms { field, values } => scope_values(scope, field)
            .iter()
            .any(|v| values.contains(v))
            .then_some(0.0),
        QueryNode::Prefix { field, value } => scope_values(scope, field)
            .iter()
            .any(|v| v.starts_with(value))
            .then_some(0.0),
        QueryNode::Exists { field } => (!scope_values(scope, field).is_empty()).then_some(0.0),
        QueryNode::Match { field, text, boost } => {
            let tokens = tokenize(text);
            if tokens.is_empty() {
                return None;
            }
            scope_values(scope, field)
                .iter()
                .any(|v| {
                    let doc_tokens = tokenize(v);
                    tokens.iter().all(|t| doc_tokens.contains(t))
                })
                .then_some(*boost)
        }
        QueryNode::Nested { path, query } => {
            let Scope::Doc(doc) = scope else {
                return None;
            };
            match path.as_str() {
                "persons" => doc
                    .persons
                    .iter()
                    .filter_map(|p| eval(query, &Scope::Person(p)))
                    .reduce(f32::max),
                "media" => doc
                    .media
                    .values()
                    .flatten()
                    .filter_map(|m| eval(query, &Scope::MediaItem(m)))
                    .reduce(f32::max),
                _ => None,
            }
        }
        QueryNode::Bool(b) => eval_bool(b, scope),
    }
}

fn eval_bool(b: &BoolQuery, scope: &Scope<'_>) -> Option<f32> {
    let mut score = 0.0;
    for clause in &b.must {
        score += eval(clause, scope)?;
    }
    for clause in &b.filter {
        eval(clause, scope)?;
    }
    let mut should_matched = false;
    for clause in &b.should {
        if let Some(s) = eval(clause, scope) {
            should_matched = true;
            score += s;
        }
    }
    // `should` is required (any-of) only when it is the sole clause kind.
    if !b.should.is_empty() && b.must.is_empty() && b.filter.is_empty() && !should_matched {
        return None;
    }
    Some(score)
}

/// Collect highlight fragments for every matching `Match` clause.
fn collect_highlights(
    node: &QueryNode,
    doc: &SourceData,
    out: &mut HashMap<String, Vec<String>>,
) {
    match node {
        QueryNode::Match { field, text, .. } => {
            let tokens = tokenize(text);
            if tokens.is_empty() {
                return;
            }
            for value in scope_values(&Scope::Doc(doc), field) {
                let doc_tokens = tokenize(&value);
                if tokens.iter().all(|t| doc_tokens.contains(t)) {
                    out.entry(field.clone()).or_default().push(value);
                }
            }
        }
        QueryNode::Nested { query, .. } => collect_highlights(query, doc, out),
        QueryNode::Bool(b) => {
            for clause in b.must.iter().chain(&b.should).chain(&b.filter) {
                collect_highlights(clause, doc, out);
            }
        }
        _ => {}
    }
}
