//! The search facade: the only entry point external collaborators call.

pub mod scroll;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::backend::{BackendError, SearchBackend};
use crate::cache::{EntityCache, MemoryByteStore};
use crate::model::raw::MaterializeError;
use crate::model::types::SourceData;
use crate::query::compile::{CompileError, compile_search};
use crate::query::config::{ScrollConfig, SearchConfig, TermFacet};
use crate::query::facets::{merge_facets, reconcile_buckets};

/// Error surface of the facade. Compile errors fire before any backend
/// call; backend errors pass through verbatim; callback errors abort a
/// scroll and carry whatever the caller raised.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("scroll callback failed: {0}")]
    Callback(#[source] anyhow::Error),
}

/// One result row. Materialization failure degrades per row, never the
/// whole response.
#[derive(Debug)]
pub struct Entity {
    pub signature: String,
    pub result: Result<SourceData, MaterializeError>,
}

/// Response of [`SearchEngine::search`].
#[derive(Debug, Default)]
pub struct SearchResult {
    pub total: u64,
    pub entities: Vec<Entity>,
    /// Per-row highlight fragments, parallel to `entities`.
    pub highlights: Vec<HashMap<String, Vec<String>>>,
    /// Facet name to bucket value to count, reconciled with selections.
    pub facet_counts: HashMap<String, HashMap<String, i64>>,
}

/// Corpus statistics under an ACL context.
#[derive(Debug, Default)]
pub struct AclStats {
    pub total: u64,
    pub facet_counts: HashMap<String, HashMap<String, i64>>,
}

/// Capability interface of the search core. The web layer and the CLIs
/// depend on this trait, never on the backend or the cache directly.
pub trait SearchEngine {
    /// Faceted, ACL-filtered, paginated search.
    fn search(&self, cfg: &SearchConfig) -> Result<SearchResult, SearchError>;

    /// Visit every matching document once, in backend order. A callback
    /// error aborts the whole scroll; recovery is the caller's business.
    fn scroll(
        &self,
        cfg: &ScrollConfig,
        callback: &mut dyn FnMut(&SourceData) -> anyhow::Result<()>,
    ) -> Result<(), SearchError>;

    /// Batch point lookup through the entity cache. Unknown signatures are
    /// absent from the map; per-item materialization failures occupy their
    /// own slot.
    fn load_entities(
        &self,
        signatures: &[String],
    ) -> Result<HashMap<String, Result<SourceData, MaterializeError>>, SearchError>;

    /// Totals and facet counts visible to the given groups, optionally
    /// narrowed to one catalog.
    fn stats_by_acl(&self, catalog: Option<&str>, groups: &[String])
    -> Result<AclStats, SearchError>;

    /// Most recent write timestamp under the given filter; `None` when
    /// nothing matches.
    fn last_update(&self, cfg: &ScrollConfig) -> Result<Option<DateTime<Utc>>, SearchError>;

    /// Delete everything the given context could see; returns the count.
    fn delete(&self, cfg: &ScrollConfig) -> Result<u64, SearchError>;
}

/// Tuning and defaults of one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Facets offered on every search unless overridden per request.
    pub default_facets: HashMap<String, TermFacet>,
    /// Documents per scroll page.
    pub scroll_batch: usize,
    /// Scroll cursor lease. Corpus export is slow; hours, not seconds.
    pub scroll_lease: Duration,
    pub cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut default_facets = HashMap::new();
        for field in ["catalog", "category", "mediatype", "tags"] {
            default_facets.insert(field.to_string(), TermFacet::new(field));
        }
        Self {
            default_facets,
            scroll_batch: 100,
            scroll_lease: Duration::from_secs(2 * 60 * 60),
            cache_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// The orchestrator composing compiler, facet engine, scroll protocol and
/// entity cache over one backend.
pub struct Search<B: SearchBackend> {
    backend: B,
    cache: EntityCache,
    config: EngineConfig,
}

impl<B: SearchBackend> Search<B> {
    /// Engine with a process-local cache store.
    pub fn new(backend: B, config: EngineConfig) -> Self {
        let cache = EntityCache::new(Box::new(MemoryByteStore::new()), config.cache_ttl);
        Self::with_cache(backend, cache, config)
    }

    /// Engine over a caller-provided cache (e.g. a file-backed store).
    pub fn with_cache(backend: B, cache: EntityCache, config: EngineConfig) -> Self {
        Self {
            backend,
            cache,
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Write a document to the index, full replace keyed by signature.
    pub fn update(&self, doc: &SourceData) -> Result<(), SearchError> {
        self.backend.update(doc)?;
        Ok(())
    }

    /// Stamp the write timestamp and index the document. Returns the stamp,
    /// the watermark incremental sync resumes from.
    pub fn update_timestamp(&self, doc: &SourceData) -> Result<DateTime<Utc>, SearchError> {
        let now = Utc::now();
        let mut stamped = doc.clone();
        stamped.timestamp = now;
        self.backend.update(&stamped)?;
        Ok(now)
    }
}

impl<B: SearchBackend> SearchEngine for Search<B> {
    fn search(&self, cfg: &SearchConfig) -> Result<SearchResult, SearchError> {
        let facets = merge_facets(&self.config.default_facets, &cfg.facets);
        let query = compile_search(cfg, &facets)?;
        let resp = self.backend.search(&query)?;

        let mut entities = Vec::with_capacity(resp.hits.len());
        let mut highlights = Vec::with_capacity(resp.hits.len());
        for hit in resp.hits {
            entities.push(Entity {
                signature: hit.doc.signature.clone(),
                result: hit.doc.materialize(),
            });
            highlights.push(hit.highlights);
        }

        let facet_counts = reconcile_buckets(&facets, &resp.aggregations);
        info!(
            qstr = %cfg.qstr,
            total = resp.total,
            rows = entities.len(),
            "search"
        );
        Ok(SearchResult {
            total: resp.total,
            entities,
            highlights,
            facet_counts,
        })
    }

    fn scroll(
        &self,
        cfg: &ScrollConfig,
        callback: &mut dyn FnMut(&SourceData) -> anyhow::Result<()>,
    ) -> Result<(), SearchError> {
        self.run_scroll(cfg, callback)
    }

    fn load_entities(
        &self,
        signatures: &[String],
    ) -> Result<HashMap<String, Result<SourceData, MaterializeError>>, SearchError> {
        self.cache
            .load_entities(signatures, |misses| self.backend.get_documents(misses))
            .map_err(Into::into)
    }

    fn stats_by_acl(
        &self,
        catalog: Option<&str>,
        groups: &[String],
    ) -> Result<AclStats, SearchError> {
        let mut cfg = SearchConfig {
            groups: groups.to_vec(),
            ..Default::default()
        };
        if let Some(catalog) = catalog {
            cfg.filter_fields
                .insert("catalog".to_string(), vec![catalog.to_string()]);
        }
        let result = self.search(&cfg)?;
        Ok(AclStats {
            total: result.total,
            facet_counts: result.facet_counts,
        })
    }

    fn last_update(&self, cfg: &ScrollConfig) -> Result<Option<DateTime<Utc>>, SearchError> {
        self.run_last_update(cfg)
    }

    fn delete(&self, cfg: &ScrollConfig) -> Result<u64, SearchError> {
        self.run_delete(cfg)
    }
}
