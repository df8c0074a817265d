//! Content hashing for exact-match detection.
//!
//! Produces the 256-bit fingerprint that tier 1 indexes and looks up.
//! Hashing operates on the text exactly as handed over: the ingestion
//! pipeline applies whitespace and encoding normalization before the engine
//! sees the document, and hashing the bytes as given keeps the fingerprint
//! reproducible across re-ingestion.

use sha2::{Digest, Sha256};

use crate::models::Hash256;

/// Content hasher for exact-duplicate detection.
///
/// Deterministic and cryptographic: collision probability is treated as
/// zero, so equal fingerprints mean equal content. Pure function, no side
/// effects.
///
/// # Example
///
/// ```rust
/// use palimpsest::ContentHasher;
///
/// let hash = ContentHasher::hash("the quick brown fox");
/// assert_eq!(hash.to_hex().len(), 64);
/// assert_eq!(hash, ContentHasher::hash("the quick brown fox"));
/// ```
pub struct ContentHasher;

impl ContentHasher {
    /// Computes the SHA-256 fingerprint of normalized text.
    #[must_use]
    pub fn hash(normalized_text: &str) -> Hash256 {
        let mut hasher = Sha256::new();
        hasher.update(normalized_text.as_bytes());
        Hash256::from_bytes(hasher.finalize().into())
    }
}
