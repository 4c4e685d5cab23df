//! Normalized entity structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// ACL realm for record existence and descriptive metadata.
pub const ACL_META: &str = "meta";
/// ACL realm for media and derived content.
pub const ACL_CONTENT: &str = "content";

/// Separator of hierarchical category paths, most-general component first.
pub const CATEGORY_SEPARATOR: &str = "!!";

/// A person attached to a record, with a free-form role tag
/// (author, director, performer, ...). Order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub role: String,
}

/// One media item belonging to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub name: String,
    pub mimetype: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub duration: i64,
    /// Extracted document text, when a fulltext pass ran over this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulltext: Option<String>,
}

pub type MediaList = Vec<Media>;

/// Unordered string map for source-specific metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metalist(pub HashMap<String, String>);

impl Metalist {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// String to list-of-strings map for repeatable variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Varlist(pub HashMap<String, Vec<String>>);

impl Varlist {
    /// Remove duplicate values per key, keeping first occurrence order.
    pub fn unique(&mut self) {
        for values in self.0.values_mut() {
            let mut seen = std::collections::HashSet::new();
            values.retain(|v| seen.insert(v.clone()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The canonical, index-independent representation of one archival record.
///
/// Produced by a [`crate::model::Source`] adapter, written to the index as a
/// full replace keyed by `signature`, read back via point lookup or search.
///
/// Invariants:
/// - `signature` is globally unique and immutable once assigned.
/// - `has_media == !media.is_empty()` and `mediatype` is exactly the key set
///   of `media`; both are recomputed by [`SourceData::set_media`].
/// - An absent ACL realm means nobody besides admins has that visibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceData {
    pub signature: String,
    /// Tag of the producing source adapter (e.g. `zotero2`, `iid`).
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub series: String,
    #[serde(default)]
    pub place: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub collection_title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub rights: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub persons: Vec<Person>,
    /// Visibility realms (`meta`, `content`) to lists of opaque group ids.
    #[serde(default)]
    pub acl: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub catalog: Vec<String>,
    /// Hierarchical category paths, `!!`-delimited, most-general first.
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Media items keyed by type (`image`, `video`, `audio`, `pdf`, ...).
    #[serde(default)]
    pub media: HashMap<String, MediaList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<Media>,
    /// Derived: key set of `media`. Recomputed on every media change.
    #[serde(default)]
    pub mediatype: Vec<String>,
    /// Derived: whether any media is attached.
    #[serde(default)]
    pub has_media: bool,
    #[serde(default, skip_serializing_if = "Metalist::is_empty")]
    pub meta: Metalist,
    #[serde(default, skip_serializing_if = "Metalist::is_empty")]
    pub extra: Metalist,
    #[serde(default, skip_serializing_if = "Varlist::is_empty")]
    pub vars: Varlist,
    /// Index write time, set by the writer; the "last write" watermark used
    /// for incremental sync.
    #[serde(default = "epoch")]
    pub timestamp: DateTime<Utc>,
    /// Record provenance time, carried over from the upstream source.
    #[serde(default = "epoch")]
    pub date_added: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl SourceData {
    /// Replace the media map and recompute the derived fields.
    pub fn set_media(&mut self, media: HashMap<String, MediaList>) {
        self.media = media;
        let mut types: Vec<String> = self.media.keys().cloned().collect();
        types.sort();
        self.mediatype = types;
        self.has_media = !self.media.is_empty();
    }

    /// Groups granted visibility in the given ACL realm. Empty when the
    /// realm is absent.
    pub fn acl_groups(&self, realm: &str) -> &[String] {
        self.acl.get(realm).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any of `groups` is granted visibility in `realm`.
    pub fn acl_allows(&self, realm: &str, groups: &[String]) -> bool {
        self.acl_groups(realm).iter().any(|g| groups.contains(g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_media_recomputes_derived_fields() {
        let mut doc = SourceData {
            signature: "test-2024.1".into(),
            ..Default::default()
        };
        assert!(!doc.has_media);

        let mut media = HashMap::new();
        media.insert("video".to_string(), vec![Media::default()]);
        media.insert("image".to_string(), vec![Media::default()]);
        doc.set_media(media);

        assert!(doc.has_media);
        assert_eq!(doc.mediatype, vec!["image".to_string(), "video".to_string()]);

        doc.set_media(HashMap::new());
        assert!(!doc.has_media);
        assert!(doc.mediatype.is_empty());
    }

    #[test]
    fn varlist_unique_removes_duplicates_keeping_order() {
        let mut vars = Varlist::default();
        vars.0.insert(
            "lang".into(),
            vec!["de".into(), "en".into(), "de".into(), "fr".into()],
        );
        vars.unique();
        assert_eq!(vars.0["lang"], vec!["de", "en", "fr"]);
    }

    #[test]
    fn absent_acl_realm_grants_nothing() {
        let doc = SourceData::default();
        assert!(!doc.acl_allows(ACL_META, &["global/guest".into()]));
        assert!(doc.acl_groups(ACL_CONTENT).is_empty());
    }

    #[test]
    fn abstract_serializes_under_wire_name() {
        let doc = SourceData {
            signature: "s".into(),
            abstract_: "summary".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["abstract"], "summary");
        assert!(json.get("abstract_").is_none());
    }
}
