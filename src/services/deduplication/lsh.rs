//! Locality-sensitive hashing index over MinHash signatures.
//!
//! Partitions each signature into `b` bands of `r` rows; each band's
//! sub-vector is hashed to a bucket key, and documents sharing any band
//! bucket become candidates. The band geometry controls the similarity at
//! which candidates are likely to surface (the LSH S-curve); see
//! [`crate::config::LshParams`].

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::LshParams;
use crate::models::{DocumentId, MinHashSignature};
use crate::storage::traits::NearIndexBackend;
use crate::{Error, Result};

struct Buckets {
    /// One bucket map per band, keyed by the band's sub-vector hash.
    bands: Vec<HashMap<u64, Vec<DocumentId>>>,
    /// Stored signatures for candidate verification.
    signatures: HashMap<DocumentId, MinHashSignature>,
}

/// In-memory LSH index.
///
/// # Concurrency
///
/// A single `RwLock` covers every band and the signature table. An insert
/// writes all bands under one write guard and a query holds a read guard
/// for the whole bucket-union, so a query can never observe a signature
/// present in some bands but not others. Per-band locks cannot give that
/// cross-band atomicity without lock-ordering machinery; the coarse lock is
/// the documented trade-off, acceptable while a single writer per insert
/// sustains batch-ingestion throughput.
///
/// # Lock Poisoning
///
/// Poisoned locks fail closed with [`Error::IndexUnavailable`]; the
/// classifier degrades the near tier with a diagnostic instead of treating
/// "no candidates" as truth.
///
/// # Example
///
/// ```rust
/// use palimpsest::config::LshParams;
/// use palimpsest::{LshIndex, NearIndexBackend, ShingleSketcher};
///
/// let index = LshIndex::new(LshParams::new(16, 8));
/// let sketcher = ShingleSketcher::new(3, 128);
/// let sketch = sketcher.sketch("the quick brown fox jumps over the lazy dog");
/// let sig = sketch.signature().unwrap();
///
/// index.insert(&"doc-1".into(), sig)?;
/// assert_eq!(index.candidates(sig)?, vec!["doc-1".into()]);
/// # Ok::<(), palimpsest::Error>(())
/// ```
pub struct LshIndex {
    params: LshParams,
    buckets: RwLock<Buckets>,
}

impl LshIndex {
    /// Creates an empty index with the given band geometry.
    #[must_use]
    pub fn new(params: LshParams) -> Self {
        Self {
            params,
            buckets: RwLock::new(Buckets {
                bands: (0..params.bands).map(|_| HashMap::new()).collect(),
                signatures: HashMap::new(),
            }),
        }
    }

    /// Returns the band geometry.
    #[must_use]
    pub const fn params(&self) -> LshParams {
        self.params
    }

    /// Hashes one band's sub-vector to its bucket key.
    ///
    /// The band index seeds the hash so identical sub-vectors in different
    /// bands land in unrelated buckets.
    fn band_key(band_idx: usize, rows: &[u64]) -> u64 {
        let mut bytes = Vec::with_capacity(rows.len() * 8);
        for &value in rows {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        xxh3_64_with_seed(&bytes, band_idx as u64)
    }

    fn check_signature(&self, signature: &MinHashSignature) -> Result<()> {
        if signature.len() != self.params.len() {
            return Err(Error::InvalidInput(format!(
                "signature length {} does not match lsh geometry {}x{}",
                signature.len(),
                self.params.bands,
                self.params.rows_per_band
            )));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Buckets>> {
        self.buckets.read().map_err(|_| Error::IndexUnavailable {
            index: "lsh",
            cause: "poisoned lock".to_string(),
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Buckets>> {
        self.buckets.write().map_err(|_| Error::IndexUnavailable {
            index: "lsh",
            cause: "poisoned lock".to_string(),
        })
    }
}

impl NearIndexBackend for LshIndex {
    fn insert(&self, id: &DocumentId, signature: &MinHashSignature) -> Result<()> {
        self.check_signature(signature)?;
        let rows = self.params.rows_per_band;
        let mut buckets = self.write()?;

        for band_idx in 0..self.params.bands {
            let start = band_idx * rows;
            let key = Self::band_key(band_idx, &signature.values()[start..start + rows]);
            let bucket = buckets.bands[band_idx].entry(key).or_default();
            if !bucket.contains(id) {
                bucket.push(id.clone());
            }
        }
        buckets.signatures.insert(id.clone(), signature.clone());
        Ok(())
    }

    fn candidates(&self, signature: &MinHashSignature) -> Result<Vec<DocumentId>> {
        self.check_signature(signature)?;
        let rows = self.params.rows_per_band;
        let buckets = self.read()?;

        let mut seen = HashSet::new();
        for band_idx in 0..self.params.bands {
            let start = band_idx * rows;
            let key = Self::band_key(band_idx, &signature.values()[start..start + rows]);
            if let Some(bucket) = buckets.bands[band_idx].get(&key) {
                for id in bucket {
                    seen.insert(id.clone());
                }
            }
        }

        let mut candidates: Vec<DocumentId> = seen.into_iter().collect();
        candidates.sort();
        Ok(candidates)
    }

    fn signature(&self, id: &DocumentId) -> Result<Option<MinHashSignature>> {
        Ok(self.read()?.signatures.get(id).cloned())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.signatures.len())
    }
}
