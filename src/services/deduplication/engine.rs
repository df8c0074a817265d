//! Deduplication engine: two-phase classify/commit orchestration.
//!
//! The engine is invoked synchronously, once per ingested document, by the
//! ingestion pipeline. It performs no internal parallelism but is safe
//! under concurrent invocation: batch ingestion classifies many documents
//! from a worker pool against the same shared index handles.
//!
//! # Two-phase protocol
//!
//! - [`DedupEngine::classify`] is strictly read-only.
//! - [`DedupEngine::commit`] performs every index mutation (exact-hash
//!   insert, record store, LSH insert, chain update).
//!
//! Cancelling ingestion between the phases leaves no trace. Commit
//! re-verifies the exact tier with a first-wins insert, so two copies of
//! the same content racing through classification collapse to exactly one
//! `Unique` and one `Exact` regardless of interleaving.

use std::sync::Arc;
use tracing::instrument;

use crate::Result;
use crate::config::EngineConfig;
use crate::models::{
    Action, ChainUpdate, Classification, Diagnostic, DocumentRecord, DuplicateResult, EmbeddingId,
    IngestDocument, IngestOutcome, Sketch,
};
use crate::services::chains::VersionChainTracker;
use crate::storage::traits::{
    ChainStore, ExactIndexBackend, NearIndexBackend, RecordStore, VectorSearcher,
};
use crate::storage::{InMemoryChainStore, InMemoryRecordStore, ShardedExactIndex};

use super::classifier::DuplicateClassifier;
use super::lsh::LshIndex;
use super::policy::DuplicatePolicyEngine;

/// Orchestrator over the classifier, policy engine, chain tracker, and the
/// shared index handles.
///
/// # Example
///
/// ```rust,ignore
/// use palimpsest::{DedupEngine, EngineConfig, IngestDocument};
/// use std::sync::Arc;
///
/// let engine = DedupEngine::in_memory(searcher, EngineConfig::default())?;
///
/// // One-shot ingestion:
/// let outcome = engine.ingest(&doc)?;
///
/// // Or two-phase, when ingestion may be cancelled after classification:
/// let classification = engine.classify(&doc)?;
/// if !cancelled {
///     let outcome = engine.commit(&doc, classification)?;
/// }
/// ```
pub struct DedupEngine<X, N, V>
where
    X: ExactIndexBackend,
    N: NearIndexBackend,
    V: VectorSearcher,
{
    classifier: DuplicateClassifier<X, N, V>,
    exact: Arc<X>,
    near: Arc<N>,
    records: Arc<dyn RecordStore>,
    tracker: VersionChainTracker,
    policy: DuplicatePolicyEngine,
}

impl<V: VectorSearcher> DedupEngine<ShardedExactIndex, LshIndex, V> {
    /// Creates an engine over fresh in-memory stores.
    ///
    /// The vector index stays external even here: callers always supply the
    /// searcher handle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the configuration fails
    /// validation.
    pub fn in_memory(searcher: Arc<V>, config: EngineConfig) -> Result<Self> {
        Self::new(
            Arc::new(ShardedExactIndex::new()),
            Arc::new(LshIndex::new(config.lsh)),
            searcher,
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryChainStore::new()),
            config,
        )
    }
}

impl<X, N, V> DedupEngine<X, N, V>
where
    X: ExactIndexBackend,
    N: NearIndexBackend,
    V: VectorSearcher,
{
    /// Creates an engine over explicit store handles.
    ///
    /// Stores are passed in rather than constructed internally so tests get
    /// fresh state per test and deployments can shard or persist them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the configuration fails
    /// validation.
    pub fn new(
        exact: Arc<X>,
        near: Arc<N>,
        searcher: Arc<V>,
        records: Arc<dyn RecordStore>,
        chains: Arc<dyn ChainStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let tracker = VersionChainTracker::new(
            chains,
            Arc::clone(&records),
            config.near_duplicate_threshold,
        );
        let policy = DuplicatePolicyEngine::new(config.clone());
        let classifier = DuplicateClassifier::new(
            Arc::clone(&exact),
            Arc::clone(&near),
            searcher,
            config,
        );
        Ok(Self {
            classifier,
            exact,
            near,
            records,
            tracker,
            policy,
        })
    }

    /// Returns the configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        self.classifier.config()
    }

    /// Returns the chain tracker, for merge/split corrections and audits.
    #[must_use]
    pub const fn tracker(&self) -> &VersionChainTracker {
        &self.tracker
    }

    /// Returns the record store handle.
    #[must_use]
    pub fn records(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.records)
    }

    /// Read-only classification phase.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for rejected input; all other
    /// conditions degrade via diagnostics on the classification.
    pub fn classify(&self, doc: &IngestDocument) -> Result<Classification> {
        self.classifier.classify(doc)
    }

    /// Mutating commit phase.
    ///
    /// Re-verifies the exact tier with a first-wins insert (resolving races
    /// between concurrently classified copies), stores the document record,
    /// indexes the signature, and updates chain membership. Exact
    /// duplicates and `Skip` decisions mutate nothing.
    ///
    /// # Errors
    ///
    /// Propagates store failures: a partially committed document would
    /// poison future classifications, so commit does not degrade.
    #[instrument(
        skip(self, doc, classification),
        fields(operation = "commit", document_id = %doc.id, result = classification.result.kind())
    )]
    pub fn commit(
        &self,
        doc: &IngestDocument,
        classification: Classification,
    ) -> Result<IngestOutcome> {
        let Classification {
            mut result,
            content_hash,
            sketch,
            mut diagnostics,
        } = classification;

        if !matches!(result, DuplicateResult::Exact { .. })
            && self.policy.decide(&result) != Action::Skip
        {
            if let Some(incumbent) = self.exact.insert(content_hash, &doc.id)? {
                if incumbent != doc.id {
                    tracing::info!(
                        original_id = %incumbent,
                        "Concurrent copy won the exact index; reclassifying"
                    );
                    diagnostics.push(Diagnostic::ExactRaceResolved {
                        original_id: incumbent.clone(),
                    });
                    result = DuplicateResult::Exact {
                        original_id: incumbent,
                    };
                }
            }
        }

        let action = self.policy.decide(&result);
        let mut chain_update = ChainUpdate::NoChange;

        let should_index =
            !matches!(result, DuplicateResult::Exact { .. }) && action != Action::Skip;
        if should_index {
            let signature = sketch.as_ref().and_then(Sketch::signature);
            self.records.put(DocumentRecord::new(
                doc.id.clone(),
                content_hash,
                signature.cloned(),
                EmbeddingId::for_document(&doc.id),
            ))?;
            if let Some(signature) = signature {
                self.near.insert(&doc.id, signature)?;
            }

            chain_update = self.tracker.update_chain(&doc.id, &result)?;
            if let ChainUpdate::Repaired { chain_id, .. } = &chain_update {
                diagnostics.push(Diagnostic::ChainRepaired {
                    chain_id: chain_id.clone(),
                });
            }
        }

        metrics::counter!(
            "dedup_commits_total",
            "result" => result.kind(),
            "action" => action.as_str()
        )
        .increment(1);
        tracing::debug!(
            result = result.kind(),
            action = %action,
            indexed = should_index,
            "Commit completed"
        );

        Ok(IngestOutcome {
            document_id: doc.id.clone(),
            result,
            action,
            chain_update,
            diagnostics,
        })
    }

    /// Classifies and commits in one call.
    ///
    /// # Errors
    ///
    /// See [`DedupEngine::classify`] and [`DedupEngine::commit`].
    pub fn ingest(&self, doc: &IngestDocument) -> Result<IngestOutcome> {
        let classification = self.classify(doc)?;
        self.commit(doc, classification)
    }
}
