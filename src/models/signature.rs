//! MinHash signatures and sketch results.

use serde::{Deserialize, Serialize};

/// Fixed-length MinHash signature over a document's word shingles.
///
/// The signature is immutable once computed for a given text; the fraction
/// of agreeing positions between two signatures estimates the Jaccard
/// similarity of the underlying shingle sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinHashSignature {
    values: Vec<u64>,
}

impl MinHashSignature {
    /// Wraps a vector of per-permutation minima.
    #[must_use]
    pub fn new(values: Vec<u64>) -> Self {
        Self { values }
    }

    /// Returns the number of permutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the signature has no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw signature values.
    #[must_use]
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Estimates Jaccard similarity as the fraction of agreeing positions.
    ///
    /// Returns a value in `[0.0, 1.0]`. Signatures of mismatched length
    /// (produced under different permutation counts) are incomparable and
    /// yield `0.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Signature lengths are small
    pub fn jaccard(&self, other: &Self) -> f64 {
        if self.values.is_empty() || self.values.len() != other.values.len() {
            return 0.0;
        }
        let matches = self
            .values
            .iter()
            .zip(other.values.iter())
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.values.len() as f64
    }
}

/// Result of sketching a document's text.
///
/// Documents with fewer words than the shingle size cannot produce a
/// meaningful shingle set; they carry the `TooShort` sentinel, are excluded
/// from the near tier, and route directly to the semantic tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sketch {
    /// A full MinHash signature.
    Signature(MinHashSignature),
    /// The document had too few words to shingle.
    TooShort {
        /// Number of words found.
        word_count: usize,
    },
}

impl Sketch {
    /// Returns the signature if the sketch is not degenerate.
    #[must_use]
    pub const fn signature(&self) -> Option<&MinHashSignature> {
        match self {
            Self::Signature(sig) => Some(sig),
            Self::TooShort { .. } => None,
        }
    }

    /// Returns true for the too-short sentinel.
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        matches!(self, Self::TooShort { .. })
    }
}
