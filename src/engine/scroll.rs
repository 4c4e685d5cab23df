//! Scroll protocol driver, plus the two operations sharing its query shape.
//!
//! A scroll moves through `Idle -> Opened(cursor, lease) -> Draining ->
//! Closed`. Opening compiles the query and fetches the first page; every
//! continuation renews the backend-held lease. The callback runs once per
//! document in backend order; its first error aborts the whole scroll with
//! no partial-success result. The one and only success terminator is an
//! empty page.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::backend::SearchBackend;
use crate::engine::{Search, SearchError};
use crate::model::types::SourceData;
use crate::query::compile::{as_last_update, compile_scroll};
use crate::query::config::ScrollConfig;

impl<B: SearchBackend> Search<B> {
    pub(crate) fn run_scroll(
        &self,
        cfg: &ScrollConfig,
        callback: &mut dyn FnMut(&SourceData) -> anyhow::Result<()>,
    ) -> Result<(), SearchError> {
        let query = compile_scroll(cfg)?;
        let mut page =
            self.backend
                .open_scroll(&query, self.config.scroll_batch, self.config.scroll_lease)?;
        debug!(cursor = %page.cursor, total = page.total, "scroll opened");

        let mut visited: u64 = 0;
        while !page.hits.is_empty() {
            for raw in &page.hits {
                match raw.materialize() {
                    Ok(doc) => {
                        callback(&doc).map_err(SearchError::Callback)?;
                        visited += 1;
                    }
                    // One bad payload must not invalidate the rest of the
                    // page; the callback only ever sees well-formed docs.
                    Err(e) => {
                        warn!(signature = %raw.signature, error = %e, "skipping unmaterializable document");
                    }
                }
            }
            page = self.backend.continue_scroll(&page.cursor)?;
        }
        debug!(visited, "scroll drained");
        Ok(())
    }

    pub(crate) fn run_last_update(
        &self,
        cfg: &ScrollConfig,
    ) -> Result<Option<DateTime<Utc>>, SearchError> {
        let query = as_last_update(compile_scroll(cfg)?);
        let resp = self.backend.search(&query)?;
        Ok(resp.hits.first().map(|hit| hit.doc.timestamp))
    }

    pub(crate) fn run_delete(&self, cfg: &ScrollConfig) -> Result<u64, SearchError> {
        let query = compile_scroll(cfg)?;
        let removed = self.backend.delete_by_query(&query)?;
        debug!(removed, "delete by query");
        Ok(removed)
    }
}
