//! Document identifiers, fingerprints, and records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::signature::MinHashSignature;
use crate::{Error, Result};

/// Unique identifier for a document version.
///
/// Assigned by the ingestion pipeline, not this engine; opaque here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a new document ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a version chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    /// Creates a chain ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random chain ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to a vector stored in the external vector index.
///
/// The vector itself is owned by the external index; this engine only holds
/// the reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingId(String);

impl EmbeddingId {
    /// Creates an embedding ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the embedding reference for a document.
    ///
    /// The ingestion pipeline stores one vector per document version under
    /// the document's own id, so the reference is the id itself.
    #[must_use]
    pub fn for_document(id: &DocumentId) -> Self {
        Self(id.as_str().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmbeddingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 256-bit content fingerprint of normalized document text.
///
/// Collision probability is treated as zero; equal fingerprints mean equal
/// content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// Wraps a raw 32-byte digest.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex encoding (64 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A document handed to the engine by the ingestion pipeline.
///
/// `normalized_text` has already had whitespace and encoding normalization
/// applied upstream; the engine does not re-normalize. The embedding was
/// computed by the embedding pipeline before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocument {
    /// Unique identifier assigned by the ingestion pipeline.
    pub id: DocumentId,
    /// Normalized document text.
    pub normalized_text: String,
    /// Precomputed embedding vector.
    pub embedding: Vec<f32>,
}

impl IngestDocument {
    /// Validates the input before any tier runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty text or non-finite
    /// embedding values. These are the only conditions that surface to the
    /// caller as hard failures.
    pub fn validate(&self) -> Result<()> {
        if self.normalized_text.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "document '{}' has empty normalized text",
                self.id
            )));
        }
        if let Some(pos) = self.embedding.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "document '{}' embedding has non-finite value at index {pos}",
                self.id
            )));
        }
        Ok(())
    }
}

/// One entry per indexed document version.
///
/// Created when a document first passes through the classifier; never
/// deleted by this engine (deletion is an external data-retention concern).
/// After creation the engine mutates only `version_chain_id` and
/// `is_latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique identifier.
    pub id: DocumentId,
    /// 256-bit exact fingerprint of normalized text.
    pub content_hash: Hash256,
    /// MinHash signature; `None` is the too-short sentinel for documents
    /// with fewer words than the shingle size (excluded from the near tier).
    pub minhash_signature: Option<MinHashSignature>,
    /// Reference to the vector in the external vector index.
    pub embedding_id: EmbeddingId,
    /// When this record was indexed.
    pub indexed_at: DateTime<Utc>,
    /// The version chain this record belongs to; `None` means not yet
    /// chained.
    pub version_chain_id: Option<ChainId>,
    /// True for exactly one record per non-null `version_chain_id`.
    pub is_latest: bool,
}

impl DocumentRecord {
    /// Creates an unchained record at the current time.
    #[must_use]
    pub fn new(
        id: DocumentId,
        content_hash: Hash256,
        minhash_signature: Option<MinHashSignature>,
        embedding_id: EmbeddingId,
    ) -> Self {
        Self {
            id,
            content_hash,
            minhash_signature,
            embedding_id,
            indexed_at: Utc::now(),
            version_chain_id: None,
            is_latest: false,
        }
    }
}
