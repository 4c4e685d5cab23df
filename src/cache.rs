//! TTL entity cache fronting document materialization.
//!
//! Point lookups pay decompress + decode + reprojection on every call; the
//! cache keeps recently materialized documents behind their signature in a
//! pluggable byte store, compressed and TTL-bound. Expiry is checked at
//! read time: a stale entry is treated exactly like a miss and simply
//! overwritten by the next write, never proactively evicted.
//!
//! The whole batch-read/clear path is serialized behind one mutex. Coarse,
//! but materialization is not safe to run unguarded against a concurrent
//! `clear`, and correctness wins over throughput here.

use chrono::Utc;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::BackendError;
use crate::model::raw::{MaterializeError, RawDocument};
use crate::model::types::SourceData;

/// Failure of the underlying byte store. The cache logs and degrades to a
/// miss; it never fails a lookup because of its own storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("byte store I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimal key/value byte store the cache persists through.
pub trait ByteStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn drop_all(&self) -> Result<(), StoreError>;
}

/// Process-local byte store.
#[derive(Default)]
pub struct MemoryByteStore {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteStore for MemoryByteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.map.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn drop_all(&self) -> Result<(), StoreError> {
        self.map.lock().clear();
        Ok(())
    }
}

/// File-per-key byte store under one directory. Keys are hex-encoded so
/// arbitrary signatures stay filesystem-safe.
pub struct FsByteStore {
    dir: PathBuf,
}

impl FsByteStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", hex::encode(key)))
    }
}

impl ByteStore for FsByteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn drop_all(&self) -> Result<(), StoreError> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "bin") {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// What actually lands in the byte store: the document plus its write time.
#[derive(Serialize, Deserialize)]
struct CacheEnvelope {
    stored_at_ms: i64,
    data: SourceData,
}

/// Compressed, TTL-bound cache of materialized documents, keyed by
/// signature.
pub struct EntityCache {
    store: Box<dyn ByteStore>,
    ttl: Duration,
    lock: Mutex<()>,
}

impl EntityCache {
    pub fn new(store: Box<dyn ByteStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            lock: Mutex::new(()),
        }
    }

    /// Look up a fresh entry. Expiry, decode failures and storage failures
    /// all degrade to a miss.
    pub fn get(&self, signature: &str) -> Option<SourceData> {
        let _guard = self.lock.lock();
        self.get_locked(signature)
    }

    pub fn put(&self, doc: &SourceData) {
        let _guard = self.lock.lock();
        self.put_locked(doc, Utc::now().timestamp_millis());
    }

    /// Full wipe, mutually exclusive with in-flight reads and writes.
    pub fn clear(&self) {
        let _guard = self.lock.lock();
        if let Err(e) = self.store.drop_all() {
            warn!(error = %e, "cache clear failed");
        }
    }

    /// Batch point lookup: cache first, misses fetched in one backend call,
    /// successful results written back before being returned.
    ///
    /// At most one batch load runs at a time across the whole cache; the
    /// guard also excludes `clear`, so a batch observes either the state
    /// before a wipe or after it, never a torn cache.
    ///
    /// Signatures unknown to the backend are absent from the result map; a
    /// document that fails to materialize occupies its own error slot and
    /// does not fail its siblings.
    pub fn load_entities<F>(
        &self,
        signatures: &[String],
        fetch: F,
    ) -> Result<HashMap<String, Result<SourceData, MaterializeError>>, BackendError>
    where
        F: FnOnce(&[String]) -> Result<Vec<RawDocument>, BackendError>,
    {
        let _guard = self.lock.lock();

        let mut results = HashMap::with_capacity(signatures.len());
        let mut misses = Vec::new();
        for sig in signatures {
            match self.get_locked(sig) {
                Some(doc) => {
                    results.insert(sig.clone(), Ok(doc));
                }
                None => misses.push(sig.clone()),
            }
        }
        debug!(
            requested = signatures.len(),
            hits = results.len(),
            misses = misses.len(),
            "entity batch load"
        );
        if misses.is_empty() {
            return Ok(results);
        }

        let now = Utc::now().timestamp_millis();
        for raw in fetch(&misses)? {
            let slot = match raw.materialize() {
                Ok(doc) => {
                    self.put_locked(&doc, now);
                    Ok(doc)
                }
                Err(e) => {
                    warn!(signature = %raw.signature, error = %e, "entity materialization failed");
                    Err(e)
                }
            };
            results.insert(raw.signature.clone(), slot);
        }
        Ok(results)
    }

    fn get_locked(&self, signature: &str) -> Option<SourceData> {
        let bytes = match self.store.get(signature) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(signature, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        let envelope = match decode_envelope(&bytes) {
            Ok(env) => env,
            Err(e) => {
                warn!(signature, error = %e, "cache entry undecodable, treating as miss");
                return None;
            }
        };
        let age_ms = Utc::now().timestamp_millis() - envelope.stored_at_ms;
        if age_ms > self.ttl.as_millis() as i64 {
            return None;
        }
        Some(envelope.data)
    }

    fn put_locked(&self, doc: &SourceData, stored_at_ms: i64) {
        let envelope = CacheEnvelope {
            stored_at_ms,
            data: doc.clone(),
        };
        match encode_envelope(&envelope) {
            Ok(bytes) => {
                if let Err(e) = self.store.set(&doc.signature, bytes) {
                    warn!(signature = %doc.signature, error = %e, "cache write failed");
                }
            }
            Err(e) => warn!(signature = %doc.signature, error = %e, "cache encode failed"),
        }
    }

    #[cfg(test)]
    fn put_at(&self, doc: &SourceData, stored_at_ms: i64) {
        let _guard = self.lock.lock();
        self.put_locked(doc, stored_at_ms);
    }
}

fn encode_envelope(envelope: &CacheEnvelope) -> anyhow::Result<Vec<u8>> {
    let packed = rmp_serde::to_vec_named(envelope)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&packed)?;
    Ok(encoder.finish()?)
}

fn decode_envelope(bytes: &[u8]) -> anyhow::Result<CacheEnvelope> {
    let mut packed = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut packed)?;
    Ok(rmp_serde::from_slice(&packed)?)
}
