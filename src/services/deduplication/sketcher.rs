//! MinHash sketching over word shingles.
//!
//! Tokenizes text into words, forms contiguous word n-grams, and computes a
//! fixed-length MinHash signature whose position-wise agreement with another
//! signature estimates the Jaccard similarity of the two shingle sets.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::EngineConfig;
use crate::models::{MinHashSignature, Sketch};

static WORD: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)] // Pattern is a compile-time constant
    let word = Regex::new(r"\w+").unwrap();
    word
});

/// Shingle sketcher producing MinHash signatures.
///
/// Each "permutation" is simulated with a distinct xxh3 seed; the signature
/// position for seed `s` is the minimum of `xxh3(shingle, s)` over all
/// shingles. Signatures are immutable once computed and are only
/// recomputed if the content changes.
///
/// # Degenerate input
///
/// Documents with fewer words than the shingle size produce
/// [`Sketch::TooShort`], which the classifier excludes from the near tier
/// and routes directly to the semantic tier. A one-shingle signature would
/// estimate Jaccard 1.0 against any document sharing that single shingle,
/// which is noise rather than signal.
///
/// # Example
///
/// ```rust
/// use palimpsest::ShingleSketcher;
///
/// let sketcher = ShingleSketcher::new(3, 128);
/// let sketch = sketcher.sketch("the quick brown fox jumps over the lazy dog");
/// assert_eq!(sketch.signature().map(|s| s.len()), Some(128));
/// ```
pub struct ShingleSketcher {
    shingle_size: usize,
    num_permutations: usize,
}

impl ShingleSketcher {
    /// Creates a sketcher with explicit parameters.
    #[must_use]
    pub const fn new(shingle_size: usize, num_permutations: usize) -> Self {
        Self {
            shingle_size,
            num_permutations,
        }
    }

    /// Creates a sketcher from engine configuration.
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.shingle_size, config.minhash_permutations)
    }

    /// Returns the configured shingle size.
    #[must_use]
    pub const fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    /// Sketches normalized text into a MinHash signature.
    ///
    /// Returns [`Sketch::TooShort`] when the text has fewer words than the
    /// shingle size; this is an explicit branch, not a failure.
    #[must_use]
    pub fn sketch(&self, normalized_text: &str) -> Sketch {
        let words: Vec<&str> = WORD
            .find_iter(normalized_text)
            .map(|m| m.as_str())
            .collect();

        if words.len() < self.shingle_size {
            return Sketch::TooShort {
                word_count: words.len(),
            };
        }

        let shingles = self.shingle_hashes(&words);
        let values: Vec<u64> = (0..self.num_permutations as u64)
            .map(|seed| {
                shingles
                    .iter()
                    .map(|&shingle| xxh3_64_with_seed(&shingle.to_le_bytes(), seed))
                    .min()
                    .unwrap_or(u64::MAX)
            })
            .collect();

        Sketch::Signature(MinHashSignature::new(values))
    }

    /// Hashes every contiguous word n-gram into the shingle set.
    fn shingle_hashes(&self, words: &[&str]) -> HashSet<u64> {
        let mut shingles = HashSet::new();
        for window in words.windows(self.shingle_size) {
            let shingle = window.join(" ");
            shingles.insert(xxh3_64_with_seed(shingle.as_bytes(), 0));
        }
        shingles
    }
}
