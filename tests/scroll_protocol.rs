mod util;

use std::collections::HashSet;

use anyhow::anyhow;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use archival_search::backend::MemoryBackend;
use archival_search::engine::{EngineConfig, Search, SearchEngine, SearchError};
use archival_search::model::types::SourceData;
use archival_search::query::config::ScrollConfig;

fn record(signature: &str) -> SourceData {
    let mut doc = SourceData {
        signature: signature.into(),
        source: "test".into(),
        title: format!("Record {signature}"),
        ..Default::default()
    };
    doc.acl.insert("meta".into(), vec!["g".to_string()]);
    doc
}

fn engine_with_batch(batch: usize) -> Search<MemoryBackend> {
    let config = EngineConfig {
        scroll_batch: batch,
        ..Default::default()
    };
    Search::new(MemoryBackend::new(), config)
}

fn scroll_cfg() -> ScrollConfig {
    ScrollConfig {
        groups: vec!["g".into()],
        ..Default::default()
    }
}

#[test]
fn drain_visits_every_document_exactly_once() {
    let engine = engine_with_batch(7);
    for i in 0..25 {
        engine.update(&record(&format!("d-{i:03}"))).unwrap();
    }

    let mut seen = Vec::new();
    engine
        .scroll(&scroll_cfg(), &mut |doc| {
            seen.push(doc.signature.clone());
            Ok(())
        })
        .unwrap();

    assert_eq!(seen.len(), 25);
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(unique.len(), 25);
}

#[test]
fn empty_corpus_terminates_without_callbacks() {
    let engine = engine_with_batch(10);
    let mut calls = 0;
    engine
        .scroll(&scroll_cfg(), &mut |_| {
            calls += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(calls, 0);
}

#[test]
fn callback_error_aborts_immediately() {
    let engine = engine_with_batch(2);
    for i in 0..10 {
        engine.update(&record(&format!("d-{i}"))).unwrap();
    }

    let mut visited = 0;
    let err = engine
        .scroll(&scroll_cfg(), &mut |_| {
            visited += 1;
            if visited == 3 {
                return Err(anyhow!("stop here"));
            }
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, SearchError::Callback(_)));
    assert_eq!(visited, 3);
}

#[test]
fn scroll_respects_acl_context() {
    let engine = engine_with_batch(5);
    for i in 0..4 {
        engine.update(&record(&format!("mine-{i}"))).unwrap();
    }
    let mut other = record("theirs-0");
    other.acl.insert("meta".into(), vec!["secret".to_string()]);
    engine.update(&other).unwrap();

    let mut seen = Vec::new();
    engine
        .scroll(&scroll_cfg(), &mut |doc| {
            seen.push(doc.signature.clone());
            Ok(())
        })
        .unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|s| s.starts_with("mine-")));
}

#[test]
fn unmaterializable_documents_are_skipped_not_fatal() {
    let tracing = util::TestTracing::new();
    let _guard = tracing.install();

    let engine = engine_with_batch(3);
    for i in 0..5 {
        engine.update(&record(&format!("good-{i}"))).unwrap();
    }
    engine
        .backend()
        .insert_with_blob(&record("broken-0"), vec![0xde, 0xad]);

    let mut seen = Vec::new();
    engine
        .scroll(&scroll_cfg(), &mut |doc| {
            seen.push(doc.signature.clone());
            Ok(())
        })
        .unwrap();
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().all(|s| s.starts_with("good-")));

    // The skip leaves a trace naming the bad document.
    tracing.assert_contains("skipping unmaterializable document");
    tracing.assert_contains("broken-0");
}

#[test]
fn last_update_returns_most_recent_write() {
    let engine = engine_with_batch(10);

    let mut older = record("old-1");
    older.timestamp = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    engine.update(&older).unwrap();

    let mut newer = record("new-1");
    newer.timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    engine.update(&newer).unwrap();

    let watermark = engine.last_update(&scroll_cfg()).unwrap();
    assert_eq!(watermark, Some(newer.timestamp));
}

#[test]
fn last_update_is_none_when_nothing_matches() {
    let engine = engine_with_batch(10);
    engine.update(&record("d-1")).unwrap();

    let cfg = ScrollConfig {
        groups: vec!["nobody".into()],
        ..Default::default()
    };
    assert_eq!(engine.last_update(&cfg).unwrap(), None);
}

#[test]
fn delete_removes_only_what_the_context_sees() {
    let engine = engine_with_batch(10);
    for i in 0..3 {
        engine.update(&record(&format!("mine-{i}"))).unwrap();
    }
    let mut protected = record("theirs-0");
    protected.acl.insert("meta".into(), vec!["secret".to_string()]);
    engine.update(&protected).unwrap();

    let removed = engine.delete(&scroll_cfg()).unwrap();
    assert_eq!(removed, 3);
    assert_eq!(engine.backend().len(), 1);
}

#[test]
fn update_timestamp_stamps_the_watermark() {
    let engine = engine_with_batch(10);
    let before = Utc::now();
    let stamped = engine.update_timestamp(&record("d-1")).unwrap();
    assert!(stamped >= before);

    let watermark = engine.last_update(&scroll_cfg()).unwrap();
    assert_eq!(watermark, Some(stamped));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Exactly-once over arbitrary corpus and page sizes: N callbacks, no
    /// duplicates, regardless of how the pages divide.
    #[test]
    fn drain_is_exactly_once(n in 0usize..60, batch in 1usize..9) {
        let engine = engine_with_batch(batch);
        for i in 0..n {
            engine.update(&record(&format!("d-{i:04}"))).unwrap();
        }

        let mut seen = Vec::new();
        engine
            .scroll(&scroll_cfg(), &mut |doc| {
                seen.push(doc.signature.clone());
                Ok(())
            })
            .unwrap();

        prop_assert_eq!(seen.len(), n);
        let unique: HashSet<_> = seen.iter().collect();
        prop_assert_eq!(unique.len(), n);
    }
}
