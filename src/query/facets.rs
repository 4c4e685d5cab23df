//! Facet merge and bucket reconciliation.

use std::collections::HashMap;

use crate::query::config::TermFacet;

/// Merge the engine-wide default facet list with per-request overrides.
///
/// An override replaces field, prefix and limit wholesale; selection maps
/// merge additively so a request can add selections without re-stating the
/// facet definition.
pub fn merge_facets(
    defaults: &HashMap<String, TermFacet>,
    overrides: &HashMap<String, TermFacet>,
) -> HashMap<String, TermFacet> {
    let mut merged = defaults.clone();
    for (name, over) in overrides {
        match merged.get_mut(name) {
            Some(facet) => {
                facet.field = over.field.clone();
                facet.prefix = over.prefix.clone();
                facet.limit = over.limit;
                for (value, on) in &over.selected {
                    facet.selected.insert(value.clone(), *on);
                }
            }
            None => {
                merged.insert(name.clone(), over.clone());
            }
        }
    }
    merged
}

/// Reconcile backend aggregation buckets into uniform count maps.
///
/// A value the user selected but that currently has zero matches must still
/// render, selected, with count 0; hence the union of backend buckets and
/// current selections.
pub fn reconcile_buckets(
    facets: &HashMap<String, TermFacet>,
    buckets: &HashMap<String, HashMap<String, i64>>,
) -> HashMap<String, HashMap<String, i64>> {
    let mut counts = HashMap::with_capacity(facets.len());
    for (name, facet) in facets {
        let mut facet_counts = buckets.get(name).cloned().unwrap_or_default();
        for (value, on) in &facet.selected {
            if *on {
                facet_counts.entry(value.clone()).or_insert(0);
            }
        }
        counts.insert(name.clone(), facet_counts);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> HashMap<String, TermFacet> {
        let mut catalog = TermFacet::new("catalog");
        catalog.limit = 20;
        HashMap::from([
            ("catalog".to_string(), catalog),
            ("mediatype".to_string(), TermFacet::new("mediatype")),
        ])
    }

    #[test]
    fn override_replaces_definition_and_merges_selection() {
        let mut over = TermFacet::new("catalog");
        over.limit = 5;
        over.prefix = "media".into();
        over.selected.insert("filmarchive".into(), true);

        let merged = merge_facets(
            &defaults(),
            &HashMap::from([("catalog".to_string(), over)]),
        );

        let catalog = &merged["catalog"];
        assert_eq!(catalog.limit, 5);
        assert_eq!(catalog.prefix, "media");
        assert!(catalog.selected["filmarchive"]);
        // Untouched default facets survive.
        assert!(merged.contains_key("mediatype"));
    }

    #[test]
    fn unknown_override_is_added() {
        let mut over = TermFacet::new("tags");
        over.selected.insert("experimental".into(), true);
        let merged = merge_facets(&defaults(), &HashMap::from([("tags".to_string(), over)]));
        assert_eq!(merged.len(), 3);
        assert!(merged["tags"].has_selection());
    }

    #[test]
    fn selected_zero_count_values_survive_reconciliation() {
        let mut catalog = TermFacet::new("catalog");
        catalog.selected.insert("emptycat".into(), true);
        catalog.selected.insert("ignored".into(), false);
        let facets = HashMap::from([("catalog".to_string(), catalog)]);

        let buckets = HashMap::from([(
            "catalog".to_string(),
            HashMap::from([("filmarchive".to_string(), 12i64)]),
        )]);

        let counts = reconcile_buckets(&facets, &buckets);
        assert_eq!(counts["catalog"]["filmarchive"], 12);
        assert_eq!(counts["catalog"]["emptycat"], 0);
        assert!(!counts["catalog"].contains_key("ignored"));
    }

    #[test]
    fn backend_count_wins_over_zero_fill() {
        let mut catalog = TermFacet::new("catalog");
        catalog.selected.insert("filmarchive".into(), true);
        let facets = HashMap::from([("catalog".to_string(), catalog)]);
        let buckets = HashMap::from([(
            "catalog".to_string(),
            HashMap::from([("filmarchive".to_string(), 7i64)]),
        )]);
        let counts = reconcile_buckets(&facets, &buckets);
        assert_eq!(counts["catalog"]["filmarchive"], 7);
    }
}
