//! The `Source` capability interface implemented by every upstream ingester.
//!
//! Each upstream system (reference manager exports, institutional databases,
//! submission forms, ...) is structurally different; the core never sees any
//! of that. An adapter implements [`Source`] and [`build_source_data`]
//! projects it into the canonical [`SourceData`] shape, recomputing the
//! derived media fields and normalizing repeatable variables.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::types::{Media, MediaList, Metalist, Person, SourceData, Varlist};

/// Capability interface for one upstream record.
///
/// Getters return owned values because adapters typically assemble them on
/// the fly from source-native structures.
pub trait Source {
    /// Tag identifying the adapter (e.g. `zotero2`, `iid`).
    fn name(&self) -> &str;
    /// Globally unique, stable record identifier.
    fn signature(&self) -> String;
    fn title(&self) -> String;
    fn series(&self) -> String {
        String::new()
    }
    fn place(&self) -> String {
        String::new()
    }
    fn date(&self) -> String {
        String::new()
    }
    fn collection_title(&self) -> String {
        String::new()
    }
    fn abstract_text(&self) -> String {
        String::new()
    }
    fn url(&self) -> String {
        String::new()
    }
    fn rights(&self) -> String {
        String::new()
    }
    fn license(&self) -> String {
        String::new()
    }
    fn publisher(&self) -> String {
        String::new()
    }
    fn notes(&self) -> Vec<String> {
        Vec::new()
    }
    fn persons(&self) -> Vec<Person> {
        Vec::new()
    }
    /// Visibility realms to group lists. An absent realm grants nothing.
    fn acl(&self) -> HashMap<String, Vec<String>>;
    fn catalogs(&self) -> Vec<String> {
        Vec::new()
    }
    fn categories(&self) -> Vec<String> {
        Vec::new()
    }
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }
    fn media(&self) -> HashMap<String, MediaList> {
        HashMap::new()
    }
    fn poster(&self) -> Option<Media> {
        None
    }
    fn meta(&self) -> Metalist {
        Metalist::default()
    }
    fn extra(&self) -> Metalist {
        Metalist::default()
    }
    fn vars(&self) -> Varlist {
        Varlist::default()
    }
    /// Record provenance time, when the upstream carries one.
    fn date_added(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Project a [`Source`] into the canonical document shape.
///
/// The write timestamp stays at its zero value here; the index writer stamps
/// it on update (see the engine's `update_timestamp`).
pub fn build_source_data(src: &dyn Source) -> SourceData {
    let mut vars = src.vars();
    vars.unique();

    let mut doc = SourceData {
        signature: src.signature(),
        source: src.name().to_string(),
        title: src.title(),
        series: src.series(),
        place: src.place(),
        date: src.date(),
        collection_title: src.collection_title(),
        abstract_: src.abstract_text(),
        url: src.url(),
        rights: src.rights(),
        license: src.license(),
        publisher: src.publisher(),
        notes: src.notes(),
        persons: src.persons(),
        acl: src.acl(),
        catalog: src.catalogs(),
        category: src.categories(),
        tags: src.tags(),
        poster: src.poster(),
        meta: src.meta(),
        extra: src.extra(),
        vars,
        date_added: src.date_added().unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        ..Default::default()
    };
    doc.set_media(src.media());
    doc
}
