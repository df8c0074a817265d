//! Version-chain tracking.
//!
//! Maintains chains of related document versions: for every near or
//! semantic duplicate, the new document joins its original's chain and
//! becomes the latest member. Chains start on the first detected link and
//! never close; they stay open for future matches indefinitely.
//!
//! # Invariant
//!
//! Within a chain, exactly one record has `is_latest = true` at all times.
//! Every chain mutation (chain-store write plus record-flag flips) runs
//! under a single tracker-level mutex, so racing attachments are serialized
//! rather than corrupting the flag.
//!
//! # Transitivity
//!
//! Near-duplicate similarity is NOT assumed transitive. A new document only
//! ever attaches to the chain of its single detected original; merging two
//! existing chains is an explicit correction requiring direct pairwise
//! similarity evidence, and every merge is logged for audit.

use std::sync::{Arc, Mutex};
use tracing::instrument;

use crate::models::{ChainId, ChainUpdate, DocumentId, DuplicateResult, VersionChain};
use crate::storage::traits::{ChainStore, RecordStore};
use crate::{Error, Result};

/// Tracker over a chain store and the record store whose `is_latest` flags
/// it maintains.
pub struct VersionChainTracker {
    chains: Arc<dyn ChainStore>,
    records: Arc<dyn RecordStore>,
    /// Minimum direct pairwise Jaccard required to merge two chains.
    near_threshold: f64,
    /// Serializes chain mutations; see module docs.
    update_lock: Mutex<()>,
}

impl VersionChainTracker {
    /// Creates a tracker over the given stores.
    ///
    /// `near_threshold` gates chain merges: a merge without direct pairwise
    /// evidence at or above it is refused.
    #[must_use]
    pub fn new(
        chains: Arc<dyn ChainStore>,
        records: Arc<dyn RecordStore>,
        near_threshold: f64,
    ) -> Self {
        Self {
            chains,
            records,
            near_threshold,
            update_lock: Mutex::new(()),
        }
    }

    /// Updates chain membership for a classified document.
    ///
    /// - `Exact`, `Unique`, `Unknown`: no chain update. Exact duplicates are
    ///   not separate versions; unique documents have nothing to chain to.
    /// - `Near`/`Semantic`: the document joins the original's chain as the
    ///   new latest member, creating the chain if the original was
    ///   unchained. A missing original record (deleted externally between
    ///   classification and this call) is repaired by creating a chain from
    ///   the new document alone, with the inconsistency logged.
    ///
    /// # Errors
    ///
    /// Returns an error only for store-level failures; the missing-original
    /// inconsistency is never fatal.
    #[instrument(skip(self, result), fields(operation = "update_chain", document_id = %doc_id))]
    pub fn update_chain(
        &self,
        doc_id: &DocumentId,
        result: &DuplicateResult,
    ) -> Result<ChainUpdate> {
        match result {
            DuplicateResult::Exact { .. }
            | DuplicateResult::Unique
            | DuplicateResult::Unknown => Ok(ChainUpdate::NoChange),
            DuplicateResult::Near { original_id, .. }
            | DuplicateResult::Semantic { original_id, .. } => self.attach(doc_id, original_id),
        }
    }

    /// Attaches `doc_id` to `original_id`'s chain, creating or repairing as
    /// needed.
    fn attach(&self, doc_id: &DocumentId, original_id: &DocumentId) -> Result<ChainUpdate> {
        let _guard = self.lock()?;

        if let Some(chain_id) = self.chains.chain_of(original_id)? {
            let chain = self.chains.append(&chain_id, doc_id)?;
            let previous_latest = chain
                .member_ids
                .iter()
                .rev()
                .nth(1)
                .cloned()
                .ok_or_else(|| Error::OperationFailed {
                    operation: "chain_append".to_string(),
                    cause: format!("chain '{chain_id}' has no previous member"),
                })?;

            self.records
                .set_chain_membership(&previous_latest, &chain_id, false)?;
            self.records.set_chain_membership(doc_id, &chain_id, true)?;

            metrics::counter!("dedup_chain_updates_total", "kind" => "appended").increment(1);
            tracing::debug!(
                chain_id = %chain_id,
                previous_latest = %previous_latest,
                "Appended new latest version to chain"
            );
            return Ok(ChainUpdate::Appended {
                chain_id,
                new_latest: doc_id.clone(),
                previous_latest,
            });
        }

        if self.records.get(original_id)?.is_none() {
            // The original was deleted by an external retention process
            // between classification and this update.
            let chain_id = self.chains.create(std::slice::from_ref(doc_id))?;
            self.records.set_chain_membership(doc_id, &chain_id, true)?;

            metrics::counter!("dedup_chain_updates_total", "kind" => "repaired").increment(1);
            tracing::warn!(
                original_id = %original_id,
                chain_id = %chain_id,
                "Original record missing at chain update; created chain from new document alone"
            );
            return Ok(ChainUpdate::Repaired {
                chain_id,
                document_id: doc_id.clone(),
            });
        }

        let members = vec![original_id.clone(), doc_id.clone()];
        let chain_id = self.chains.create(&members)?;
        self.records
            .set_chain_membership(original_id, &chain_id, false)?;
        self.records.set_chain_membership(doc_id, &chain_id, true)?;

        metrics::counter!("dedup_chain_updates_total", "kind" => "created").increment(1);
        tracing::debug!(
            chain_id = %chain_id,
            original_id = %original_id,
            "Created new version chain"
        );
        Ok(ChainUpdate::Created { chain_id, members })
    }

    /// Merges `source` into `target`, appending the source members after
    /// the target's in temporal order.
    ///
    /// Near-duplicate similarity is not transitive, so a merge demands
    /// `direct_jaccard` — the Jaccard between the two chains'
    /// representatives, computed by the caller — at or above the near
    /// threshold. Every merge is logged at warn level for audit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the evidence is below threshold
    /// or the chains are invalid, [`Error::OperationFailed`] for store
    /// failures.
    #[instrument(skip(self), fields(operation = "merge_chains", target = %target, source = %source))]
    pub fn merge(
        &self,
        target: &ChainId,
        source: &ChainId,
        direct_jaccard: f64,
    ) -> Result<ChainUpdate> {
        if direct_jaccard < self.near_threshold {
            return Err(Error::InvalidInput(format!(
                "chain merge requires direct pairwise jaccard >= {} (got {direct_jaccard})",
                self.near_threshold
            )));
        }
        if target == source {
            return Err(Error::InvalidInput(
                "cannot merge a chain into itself".to_string(),
            ));
        }

        let _guard = self.lock()?;

        let target_chain = self.fetch(target)?;
        let source_chain = self.fetch(source)?;
        if target_chain.is_empty() || source_chain.is_empty() {
            return Err(Error::InvalidInput(
                "cannot merge an empty chain".to_string(),
            ));
        }

        let old_latest = target_chain.latest().cloned();
        let mut merged_members = target_chain.member_ids;
        merged_members.extend(source_chain.member_ids.iter().cloned());

        self.chains.remove(source)?;
        self.chains
            .replace(VersionChain::new(target.clone(), merged_members.clone()))?;

        // The source's newest member is now the merged chain's latest.
        if let Some(previous) = old_latest {
            self.records.set_chain_membership(&previous, target, false)?;
        }
        for member in &source_chain.member_ids {
            let is_latest = merged_members.last() == Some(member);
            self.records.set_chain_membership(member, target, is_latest)?;
        }

        metrics::counter!("dedup_chain_updates_total", "kind" => "merged").increment(1);
        tracing::warn!(
            target = %target,
            absorbed = %source,
            direct_jaccard = direct_jaccard,
            members = merged_members.len(),
            "Merged version chains on direct pairwise evidence"
        );
        Ok(ChainUpdate::Merged {
            target: target.clone(),
            absorbed: source.clone(),
            direct_jaccard,
        })
    }

    /// Splits a chain, carving the suffix starting at `from` into a fresh
    /// chain.
    ///
    /// Used to correct a chain that was joined by a spurious match. Both
    /// resulting chains keep their temporal order and end up with exactly
    /// one latest member each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `from` is not a member or is the
    /// chain root (splitting there would leave the original empty).
    #[instrument(skip(self), fields(operation = "split_chain", chain_id = %chain_id, from = %from))]
    pub fn split(&self, chain_id: &ChainId, from: &DocumentId) -> Result<ChainUpdate> {
        let _guard = self.lock()?;

        let chain = self.fetch(chain_id)?;
        let position = chain.position(from).ok_or_else(|| {
            Error::InvalidInput(format!(
                "document '{from}' is not a member of chain '{chain_id}'"
            ))
        })?;
        if position == 0 {
            return Err(Error::InvalidInput(
                "cannot split at the chain root".to_string(),
            ));
        }

        let prefix = chain.member_ids[..position].to_vec();
        let suffix = chain.member_ids[position..].to_vec();

        let carved_id = ChainId::generate();
        // Re-point the suffix first so no membership entry is ever dangling.
        self.chains
            .replace(VersionChain::new(carved_id.clone(), suffix.clone()))?;
        self.chains
            .replace(VersionChain::new(chain_id.clone(), prefix.clone()))?;

        for (members, owner) in [(&prefix, chain_id), (&suffix, &carved_id)] {
            for member in members.iter() {
                let is_latest = members.last() == Some(member);
                self.records.set_chain_membership(member, owner, is_latest)?;
            }
        }

        metrics::counter!("dedup_chain_updates_total", "kind" => "split").increment(1);
        tracing::info!(
            original = %chain_id,
            carved = %carved_id,
            prefix_len = prefix.len(),
            suffix_len = suffix.len(),
            "Split version chain"
        );
        Ok(ChainUpdate::Split {
            original: chain_id.clone(),
            carved: carved_id,
        })
    }

    /// Audit helper: true when exactly one member record of the chain has
    /// `is_latest = true` (or the chain is empty).
    ///
    /// # Errors
    ///
    /// Returns an error if a store fails to respond.
    pub fn latest_is_exclusive(&self, chain_id: &ChainId) -> Result<bool> {
        let Some(chain) = self.chains.get(chain_id)? else {
            return Ok(true);
        };
        if chain.is_empty() {
            return Ok(true);
        }
        let mut latest_count = 0;
        for member in &chain.member_ids {
            if let Some(record) = self.records.get(member)? {
                if record.is_latest {
                    latest_count += 1;
                }
            }
        }
        Ok(latest_count == 1)
    }

    fn fetch(&self, chain_id: &ChainId) -> Result<VersionChain> {
        self.chains.get(chain_id)?.ok_or_else(|| Error::OperationFailed {
            operation: "chain_fetch".to_string(),
            cause: format!("chain '{chain_id}' does not exist"),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.update_lock.lock().map_err(|_| Error::OperationFailed {
            operation: "chain_update".to_string(),
            cause: "poisoned tracker lock".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentRecord, EmbeddingId, Hash256};
    use crate::storage::{InMemoryChainStore, InMemoryRecordStore};

    struct Fixture {
        tracker: VersionChainTracker,
        chains: Arc<InMemoryChainStore>,
        records: Arc<InMemoryRecordStore>,
    }

    fn fixture() -> Fixture {
        let chains = Arc::new(InMemoryChainStore::new());
        let records = Arc::new(InMemoryRecordStore::new());
        let tracker = VersionChainTracker::new(
            Arc::clone(&chains) as Arc<dyn ChainStore>,
            Arc::clone(&records) as Arc<dyn RecordStore>,
            0.85,
        );
        Fixture {
            tracker,
            chains,
            records,
        }
    }

    fn seed_record(records: &InMemoryRecordStore, id: &str) {
        records
            .put(DocumentRecord::new(
                DocumentId::new(id),
                Hash256::from_bytes([0; 32]),
                None,
                EmbeddingId::new(id),
            ))
            .unwrap();
    }

    fn near(original: &str) -> DuplicateResult {
        DuplicateResult::Near {
            original_id: DocumentId::new(original),
            jaccard: 0.9,
        }
    }

    #[test]
    fn test_exact_unique_unknown_no_change() {
        let f = fixture();
        for result in [
            DuplicateResult::Exact {
                original_id: DocumentId::new("o"),
            },
            DuplicateResult::Unique,
            DuplicateResult::Unknown,
        ] {
            let update = f
                .tracker
                .update_chain(&DocumentId::new("doc"), &result)
                .unwrap();
            assert_eq!(update, ChainUpdate::NoChange);
        }
        assert_eq!(f.chains.len().unwrap(), 0);
    }

    #[test]
    fn test_near_creates_chain() {
        let f = fixture();
        seed_record(&f.records, "original");
        seed_record(&f.records, "v2");

        let update = f
            .tracker
            .update_chain(&DocumentId::new("v2"), &near("original"))
            .unwrap();

        let ChainUpdate::Created { chain_id, members } = update else {
            panic!("expected created, got {update:?}");
        };
        assert_eq!(
            members,
            vec![DocumentId::new("original"), DocumentId::new("v2")]
        );

        // The new document is latest; the original is not.
        let original = f.records.get(&DocumentId::new("original")).unwrap().unwrap();
        let v2 = f.records.get(&DocumentId::new("v2")).unwrap().unwrap();
        assert_eq!(original.version_chain_id, Some(chain_id.clone()));
        assert!(!original.is_latest);
        assert_eq!(v2.version_chain_id, Some(chain_id.clone()));
        assert!(v2.is_latest);
        assert!(f.tracker.latest_is_exclusive(&chain_id).unwrap());
    }

    #[test]
    fn test_semantic_appends_to_existing_chain() {
        let f = fixture();
        for id in ["original", "v2", "v3"] {
            seed_record(&f.records, id);
        }
        f.tracker
            .update_chain(&DocumentId::new("v2"), &near("original"))
            .unwrap();

        let update = f
            .tracker
            .update_chain(
                &DocumentId::new("v3"),
                &DuplicateResult::Semantic {
                    original_id: DocumentId::new("v2"),
                    cosine: 0.95,
                },
            )
            .unwrap();

        let ChainUpdate::Appended {
            chain_id,
            new_latest,
            previous_latest,
        } = update
        else {
            panic!("expected appended, got {update:?}");
        };
        assert_eq!(new_latest, DocumentId::new("v3"));
        assert_eq!(previous_latest, DocumentId::new("v2"));

        let chain = f.chains.get(&chain_id).unwrap().unwrap();
        assert_eq!(chain.member_ids.len(), 3);
        assert_eq!(chain.latest(), Some(&DocumentId::new("v3")));
        assert!(f.tracker.latest_is_exclusive(&chain_id).unwrap());
    }

    #[test]
    fn test_missing_original_repairs() {
        let f = fixture();
        seed_record(&f.records, "doc");
        // "ghost" was never stored (deleted by external retention).

        let update = f
            .tracker
            .update_chain(&DocumentId::new("doc"), &near("ghost"))
            .unwrap();

        let ChainUpdate::Repaired {
            chain_id,
            document_id,
        } = update
        else {
            panic!("expected repaired, got {update:?}");
        };
        assert_eq!(document_id, DocumentId::new("doc"));

        let chain = f.chains.get(&chain_id).unwrap().unwrap();
        assert_eq!(chain.member_ids, vec![DocumentId::new("doc")]);
        let record = f.records.get(&DocumentId::new("doc")).unwrap().unwrap();
        assert!(record.is_latest);
    }

    #[test]
    fn test_merge_requires_direct_evidence() {
        let f = fixture();
        for id in ["a1", "a2", "b1", "b2"] {
            seed_record(&f.records, id);
        }
        f.tracker
            .update_chain(&DocumentId::new("a2"), &near("a1"))
            .unwrap();
        f.tracker
            .update_chain(&DocumentId::new("b2"), &near("b1"))
            .unwrap();
        let chain_a = f.chains.chain_of(&DocumentId::new("a1")).unwrap().unwrap();
        let chain_b = f.chains.chain_of(&DocumentId::new("b1")).unwrap().unwrap();

        // Below threshold: refused.
        let err = f.tracker.merge(&chain_a, &chain_b, 0.5).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // At threshold: accepted (inclusive boundary).
        let update = f.tracker.merge(&chain_a, &chain_b, 0.85).unwrap();
        assert!(matches!(update, ChainUpdate::Merged { .. }));

        let merged = f.chains.get(&chain_a).unwrap().unwrap();
        assert_eq!(
            merged.member_ids,
            vec![
                DocumentId::new("a1"),
                DocumentId::new("a2"),
                DocumentId::new("b1"),
                DocumentId::new("b2"),
            ]
        );
        assert!(f.chains.get(&chain_b).unwrap().is_none());
        assert!(f.chains.chain_of(&DocumentId::new("b1")).unwrap() == Some(chain_a.clone()));

        // Exactly one latest across the merged chain: the absorbed chain's
        // newest member.
        assert!(f.tracker.latest_is_exclusive(&chain_a).unwrap());
        let b2 = f.records.get(&DocumentId::new("b2")).unwrap().unwrap();
        assert!(b2.is_latest);
        let a2 = f.records.get(&DocumentId::new("a2")).unwrap().unwrap();
        assert!(!a2.is_latest);
    }

    #[test]
    fn test_merge_rejects_self_merge() {
        let f = fixture();
        for id in ["a1", "a2"] {
            seed_record(&f.records, id);
        }
        f.tracker
            .update_chain(&DocumentId::new("a2"), &near("a1"))
            .unwrap();
        let chain = f.chains.chain_of(&DocumentId::new("a1")).unwrap().unwrap();

        assert!(f.tracker.merge(&chain, &chain, 0.99).is_err());
    }

    #[test]
    fn test_split_carves_suffix() {
        let f = fixture();
        for id in ["v1", "v2", "v3", "v4"] {
            seed_record(&f.records, id);
        }
        f.tracker
            .update_chain(&DocumentId::new("v2"), &near("v1"))
            .unwrap();
        f.tracker
            .update_chain(&DocumentId::new("v3"), &near("v2"))
            .unwrap();
        f.tracker
            .update_chain(&DocumentId::new("v4"), &near("v3"))
            .unwrap();
        let chain_id = f.chains.chain_of(&DocumentId::new("v1")).unwrap().unwrap();

        let update = f.tracker.split(&chain_id, &DocumentId::new("v3")).unwrap();
        let ChainUpdate::Split { original, carved } = update else {
            panic!("expected split, got {update:?}");
        };
        assert_eq!(original, chain_id);

        let prefix = f.chains.get(&chain_id).unwrap().unwrap();
        assert_eq!(prefix.member_ids, vec![DocumentId::new("v1"), DocumentId::new("v2")]);
        let suffix = f.chains.get(&carved).unwrap().unwrap();
        assert_eq!(suffix.member_ids, vec![DocumentId::new("v3"), DocumentId::new("v4")]);

        // Each chain has exactly one latest: v2 and v4.
        assert!(f.tracker.latest_is_exclusive(&chain_id).unwrap());
        assert!(f.tracker.latest_is_exclusive(&carved).unwrap());
        assert!(f.records.get(&DocumentId::new("v2")).unwrap().unwrap().is_latest);
        assert!(f.records.get(&DocumentId::new("v4")).unwrap().unwrap().is_latest);
    }

    #[test]
    fn test_split_rejects_root_and_non_member() {
        let f = fixture();
        for id in ["v1", "v2"] {
            seed_record(&f.records, id);
        }
        f.tracker
            .update_chain(&DocumentId::new("v2"), &near("v1"))
            .unwrap();
        let chain_id = f.chains.chain_of(&DocumentId::new("v1")).unwrap().unwrap();

        assert!(f.tracker.split(&chain_id, &DocumentId::new("v1")).is_err());
        assert!(f.tracker.split(&chain_id, &DocumentId::new("zz")).is_err());
    }

    #[test]
    fn test_concurrent_attachments_keep_one_latest() {
        use std::thread;

        let chains = Arc::new(InMemoryChainStore::new());
        let records = Arc::new(InMemoryRecordStore::new());
        let tracker = Arc::new(VersionChainTracker::new(
            Arc::clone(&chains) as Arc<dyn ChainStore>,
            Arc::clone(&records) as Arc<dyn RecordStore>,
            0.85,
        ));

        seed_record(&records, "root");
        seed_record(&records, "first");
        tracker
            .update_chain(&DocumentId::new("first"), &near("root"))
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let tracker = Arc::clone(&tracker);
            let records = Arc::clone(&records);
            handles.push(thread::spawn(move || {
                let id = format!("racer-{i}");
                seed_record(&records, &id);
                tracker
                    .update_chain(&DocumentId::new(&id), &near("root"))
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let chain_id = chains.chain_of(&DocumentId::new("root")).unwrap().unwrap();
        let chain = chains.get(&chain_id).unwrap().unwrap();
        assert_eq!(chain.member_ids.len(), 18);
        assert!(tracker.latest_is_exclusive(&chain_id).unwrap());
    }
}
