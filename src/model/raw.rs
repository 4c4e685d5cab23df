//! The index-native document envelope.
//!
//! What the backend stores and returns is not a [`SourceData`] but a raw
//! envelope: the signature, the producing source tag, a compressed
//! MessagePack blob of the full document, and a handful of denormalized
//! columns (ACL, catalog, write timestamp) the backend needs without
//! touching the blob. Materializing the blob back into a `SourceData` can
//! fail independently of the lookup that produced it, so the failure is a
//! per-document value and never a batch error.

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use thiserror::Error;

use crate::model::types::SourceData;

/// Error turning a raw envelope into a [`SourceData`].
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("failed to decompress blob for {signature}: {source}")]
    Decompress {
        signature: String,
        source: std::io::Error,
    },

    #[error("failed to decode blob for {signature}: {source}")]
    Decode {
        signature: String,
        source: rmp_serde::decode::Error,
    },

    #[error("failed to encode document {signature}: {source}")]
    Encode {
        signature: String,
        source: rmp_serde::encode::Error,
    },
}

/// Raw, index-native row from which a [`SourceData`] is materialized lazily.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub signature: String,
    pub source: String,
    /// Zlib-compressed MessagePack encoding of the full document.
    pub blob: Vec<u8>,
    pub acl: HashMap<String, Vec<String>>,
    pub catalog: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl RawDocument {
    /// Build the envelope for a document, compressing its blob.
    pub fn encode(doc: &SourceData) -> Result<Self, MaterializeError> {
        let packed = rmp_serde::to_vec_named(doc).map_err(|e| MaterializeError::Encode {
            signature: doc.signature.clone(),
            source: e,
        })?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&packed)
            .and_then(|()| encoder.finish())
            .map(|blob| RawDocument {
                signature: doc.signature.clone(),
                source: doc.source.clone(),
                blob,
                acl: doc.acl.clone(),
                catalog: doc.catalog.clone(),
                timestamp: doc.timestamp,
            })
            .map_err(|e| MaterializeError::Decompress {
                signature: doc.signature.clone(),
                source: e,
            })
    }

    /// Decompress and decode the blob back into the canonical document.
    pub fn materialize(&self) -> Result<SourceData, MaterializeError> {
        let mut packed = Vec::new();
        ZlibDecoder::new(self.blob.as_slice())
            .read_to_end(&mut packed)
            .map_err(|e| MaterializeError::Decompress {
                signature: self.signature.clone(),
                source: e,
            })?;
        rmp_serde::from_slice(&packed).map_err(|e| MaterializeError::Decode {
            signature: self.signature.clone(),
            source: e,
        })
    }
}
