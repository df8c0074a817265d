//! Sharded in-memory exact-hash index.

use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::ExactIndexBackend;
use crate::models::{DocumentId, Hash256};
use crate::{Error, Result};

const SHARD_COUNT: usize = 16;

/// In-memory `content_hash -> document_id` index, sharded by the leading
/// hash byte.
///
/// # Thread Safety
///
/// Each shard is an independent `RwLock<HashMap>`, giving concurrent
/// readers with a single writer per shard. SHA-256 output is uniform, so
/// shard load stays balanced without any extra hashing.
///
/// # Lock Poisoning
///
/// Poisoned locks fail closed with [`Error::IndexUnavailable`]: a dedup
/// index silently answering "no match" after a panic would let duplicate
/// content into version chains, which is worse than skipping the tier with
/// a visible diagnostic.
pub struct ShardedExactIndex {
    shards: [RwLock<HashMap<Hash256, DocumentId>>; SHARD_COUNT],
}

impl ShardedExactIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: std::array::from_fn(|_| RwLock::new(HashMap::new())),
        }
    }

    fn shard(&self, hash: &Hash256) -> &RwLock<HashMap<Hash256, DocumentId>> {
        &self.shards[hash.as_bytes()[0] as usize % SHARD_COUNT]
    }
}

impl Default for ShardedExactIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ExactIndexBackend for ShardedExactIndex {
    fn lookup(&self, hash: &Hash256) -> Result<Option<DocumentId>> {
        let shard = self.shard(hash).read().map_err(|_| Error::IndexUnavailable {
            index: "exact",
            cause: "poisoned shard lock".to_string(),
        })?;
        Ok(shard.get(hash).cloned())
    }

    fn insert(&self, hash: Hash256, id: &DocumentId) -> Result<Option<DocumentId>> {
        let mut shard = self
            .shard(&hash)
            .write()
            .map_err(|_| Error::IndexUnavailable {
                index: "exact",
                cause: "poisoned shard lock".to_string(),
            })?;
        if let Some(incumbent) = shard.get(&hash) {
            return Ok(Some(incumbent.clone()));
        }
        shard.insert(hash, id.clone());
        Ok(None)
    }

    fn len(&self) -> Result<usize> {
        let mut total = 0;
        for shard in &self.shards {
            total += shard
                .read()
                .map_err(|_| Error::IndexUnavailable {
                    index: "exact",
                    cause: "poisoned shard lock".to_string(),
                })?
                .len();
        }
        Ok(total)
    }
}
