use std::time::Duration;

use archival_search::backend::MemoryBackend;
use archival_search::cache::{EntityCache, FsByteStore};
use archival_search::engine::{EngineConfig, Search, SearchEngine};
use archival_search::model::types::SourceData;

fn record(signature: &str, title: &str) -> SourceData {
    let mut doc = SourceData {
        signature: signature.into(),
        source: "test".into(),
        title: title.into(),
        ..Default::default()
    };
    doc.acl.insert("meta".into(), vec!["g".to_string()]);
    doc
}

fn engine_with_ttl(ttl: Duration) -> Search<MemoryBackend> {
    let config = EngineConfig {
        cache_ttl: ttl,
        ..Default::default()
    };
    Search::new(MemoryBackend::new(), config)
}

#[test]
fn point_lookups_are_served_from_cache_once_loaded() {
    let engine = engine_with_ttl(Duration::from_secs(60));
    engine.update(&record("a-1", "Original")).unwrap();

    let first = engine.load_entities(&["a-1".to_string()]).unwrap();
    assert_eq!(first["a-1"].as_ref().unwrap().title, "Original");

    // A backend write does not reach callers until the entry expires.
    engine.update(&record("a-1", "Changed")).unwrap();
    let second = engine.load_entities(&["a-1".to_string()]).unwrap();
    assert_eq!(second["a-1"].as_ref().unwrap().title, "Original");
}

#[test]
fn expired_entries_fall_through_to_the_backend() {
    let engine = engine_with_ttl(Duration::from_millis(40));
    engine.update(&record("a-1", "Original")).unwrap();
    engine.load_entities(&["a-1".to_string()]).unwrap();

    engine.update(&record("a-1", "Changed")).unwrap();
    std::thread::sleep(Duration::from_millis(120));

    let reloaded = engine.load_entities(&["a-1".to_string()]).unwrap();
    assert_eq!(reloaded["a-1"].as_ref().unwrap().title, "Changed");
}

#[test]
fn clear_forces_a_fresh_batch_load() {
    let engine = engine_with_ttl(Duration::from_secs(60));
    engine.update(&record("a-1", "Original")).unwrap();
    engine.load_entities(&["a-1".to_string()]).unwrap();

    engine.update(&record("a-1", "Changed")).unwrap();
    engine.cache().clear();

    let reloaded = engine.load_entities(&["a-1".to_string()]).unwrap();
    assert_eq!(reloaded["a-1"].as_ref().unwrap().title, "Changed");
}

#[test]
fn corrupt_payload_fails_only_its_own_slot() {
    let engine = engine_with_ttl(Duration::from_secs(60));
    engine.update(&record("good-1", "Fine")).unwrap();
    engine
        .backend()
        .insert_with_blob(&record("bad-1", "Broken"), vec![0x00, 0x01]);

    let results = engine
        .load_entities(&["good-1".to_string(), "bad-1".to_string()])
        .unwrap();
    assert!(results["good-1"].is_ok());
    assert!(results["bad-1"].is_err());
}

#[test]
fn unknown_signatures_are_absent_from_the_result() {
    let engine = engine_with_ttl(Duration::from_secs(60));
    engine.update(&record("a-1", "Known")).unwrap();

    let results = engine
        .load_entities(&["a-1".to_string(), "ghost-1".to_string()])
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results.contains_key("a-1"));
}

#[test]
fn file_backed_cache_survives_engine_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let cache = EntityCache::new(
            Box::new(FsByteStore::open(dir.path()).unwrap()),
            Duration::from_secs(60),
        );
        let engine = Search::with_cache(MemoryBackend::new(), cache, EngineConfig::default());
        engine.update(&record("a-1", "Persisted")).unwrap();
        engine.load_entities(&["a-1".to_string()]).unwrap();
    }

    // New engine, empty backend: the cache alone answers.
    let cache = EntityCache::new(
        Box::new(FsByteStore::open(dir.path()).unwrap()),
        Duration::from_secs(60),
    );
    let engine = Search::with_cache(MemoryBackend::new(), cache, EngineConfig::default());
    let results = engine.load_entities(&["a-1".to_string()]).unwrap();
    assert_eq!(results["a-1"].as_ref().unwrap().title, "Persisted");
}
