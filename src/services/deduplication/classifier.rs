//! Three-tier duplicate classifier.
//!
//! Runs the tiers strictly in order, cheapest and highest-confidence first:
//! 1. **Exact**: content-hash lookup; hit short-circuits everything
//! 2. **Near**: LSH candidates re-verified with signature Jaccard
//! 3. **Semantic**: embedding nearest-neighbor probe
//!
//! Threshold comparisons are inclusive (`>=`) for both tiers. A degraded
//! tier never fails the classification: it is skipped with a structured
//! diagnostic and the remaining tiers run. A failed semantic probe yields
//! `Unknown`, never `Unique`.

use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use crate::Result;
use crate::config::EngineConfig;
use crate::models::{
    Classification, Diagnostic, DocumentId, DuplicateResult, Hash256, IngestDocument,
    MinHashSignature, Sketch, Tier,
};
use crate::storage::traits::{ExactIndexBackend, NearIndexBackend, VectorSearcher};

use super::hasher::ContentHasher;
use super::semantic::SemanticProbe;
use super::sketcher::ShingleSketcher;

/// Tier-2 tie-break: highest Jaccard wins; equal scores break toward the
/// lexicographically smaller id so the outcome is deterministic under
/// concurrent ingestion.
///
/// This is a policy choice, not a law of nature; it is a named function so
/// deployments can swap in e.g. "oldest wins" without touching the
/// classifier core.
#[must_use]
pub fn best_by_jaccard(scored: &[(DocumentId, f64)]) -> Option<(DocumentId, f64)> {
    scored.iter().fold(None, |best, (id, jaccard)| match best {
        None => Some((id.clone(), *jaccard)),
        Some((best_id, best_jaccard)) => {
            if *jaccard > best_jaccard || (*jaccard == best_jaccard && *id < best_id) {
                Some((id.clone(), *jaccard))
            } else {
                Some((best_id, best_jaccard))
            }
        }
    })
}

/// Classifier running the three tiers over shared index handles.
///
/// Read-only: classification never mutates an index. All handles are
/// `Arc`-shared so batch-ingestion workers can classify concurrently.
///
/// # Example
///
/// ```rust,ignore
/// use palimpsest::{DuplicateClassifier, EngineConfig};
///
/// let classifier = DuplicateClassifier::new(exact, lsh, searcher, EngineConfig::default());
/// let classification = classifier.classify(&doc)?;
/// println!("{}", classification.result);
/// ```
pub struct DuplicateClassifier<X, N, V>
where
    X: ExactIndexBackend,
    N: NearIndexBackend,
    V: VectorSearcher,
{
    /// Exact-hash index handle.
    exact: Arc<X>,
    /// LSH candidate index handle.
    near: Arc<N>,
    /// Probe over the external vector index.
    probe: SemanticProbe<V>,
    /// Sketcher shared by every classification.
    sketcher: ShingleSketcher,
    /// Thresholds and tier parameters.
    config: EngineConfig,
}

impl<X, N, V> DuplicateClassifier<X, N, V>
where
    X: ExactIndexBackend,
    N: NearIndexBackend,
    V: VectorSearcher,
{
    /// Creates a classifier over the given index handles.
    #[must_use]
    pub fn new(exact: Arc<X>, near: Arc<N>, searcher: Arc<V>, config: EngineConfig) -> Self {
        let probe = SemanticProbe::new(searcher, config.semantic_k);
        let sketcher = ShingleSketcher::from_config(&config);
        Self {
            exact,
            near,
            probe,
            sketcher,
            config,
        }
    }

    /// Returns the configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classifies a document without mutating any index.
    ///
    /// Tiers run strictly in order with short-circuit evaluation. The
    /// returned [`Classification`] carries the content hash and sketch so
    /// the commit phase never recomputes them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for empty text or non-finite
    /// embedding values; every other condition degrades gracefully via
    /// diagnostics.
    #[allow(clippy::cast_possible_truncation)] // Duration in ms won't exceed u64::MAX
    #[instrument(
        skip(self, doc),
        fields(
            operation = "classify",
            document_id = %doc.id,
            content_length = doc.normalized_text.len()
        )
    )]
    pub fn classify(&self, doc: &IngestDocument) -> Result<Classification> {
        doc.validate()?;
        let start = Instant::now();
        let content_hash = ContentHasher::hash(&doc.normalized_text);
        let mut diagnostics = Vec::new();

        // 1. Exact tier (cheapest, highest confidence)
        if let Some(result) = self.check_exact(doc, &content_hash, &mut diagnostics) {
            self.record_outcome(&result, start);
            return Ok(Classification {
                result,
                content_hash,
                sketch: None,
                diagnostics,
            });
        }

        // 2. Near tier (skipped for degenerate sketches)
        let sketch = self.sketcher.sketch(&doc.normalized_text);
        if let Some(result) = self.check_near(doc, &sketch, &mut diagnostics) {
            self.record_outcome(&result, start);
            return Ok(Classification {
                result,
                content_hash,
                sketch: Some(sketch),
                diagnostics,
            });
        }

        // 3. Semantic tier (the only tier that can block on I/O)
        let result = self.check_semantic(doc, &mut diagnostics);
        self.record_outcome(&result, start);
        Ok(Classification {
            result,
            content_hash,
            sketch: Some(sketch),
            diagnostics,
        })
    }

    /// Tier 1: content-hash lookup.
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for duration metrics
    fn check_exact(
        &self,
        doc: &IngestDocument,
        content_hash: &Hash256,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<DuplicateResult> {
        let start = Instant::now();
        match self.exact.lookup(content_hash) {
            Ok(Some(original_id)) if original_id != doc.id => {
                tracing::info!(
                    original_id = %original_id,
                    "Exact duplicate found"
                );
                metrics::histogram!(
                    "dedup_tier_duration_ms",
                    "tier" => "exact",
                    "found" => "true"
                )
                .record(start.elapsed().as_millis() as f64);
                Some(DuplicateResult::Exact { original_id })
            }
            Ok(_) => {
                tracing::debug!("No exact match, checking near tier");
                metrics::histogram!(
                    "dedup_tier_duration_ms",
                    "tier" => "exact",
                    "found" => "false"
                )
                .record(start.elapsed().as_millis() as f64);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Exact tier unavailable, continuing");
                diagnostics.push(Diagnostic::TierSkipped {
                    tier: Tier::Exact,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Tier 2: LSH candidates re-verified with signature Jaccard.
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for duration metrics
    fn check_near(
        &self,
        doc: &IngestDocument,
        sketch: &Sketch,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<DuplicateResult> {
        let start = Instant::now();
        let signature = match sketch {
            Sketch::TooShort { word_count } => {
                tracing::debug!(
                    word_count = word_count,
                    shingle_size = self.sketcher.shingle_size(),
                    "Document too short to shingle; routing to semantic tier"
                );
                diagnostics.push(Diagnostic::DegenerateSignature {
                    word_count: *word_count,
                });
                return None;
            }
            Sketch::Signature(signature) => signature,
        };

        let candidates = match self.near.candidates(signature) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Near tier unavailable, continuing");
                diagnostics.push(Diagnostic::TierSkipped {
                    tier: Tier::Near,
                    reason: e.to_string(),
                });
                return None;
            }
        };

        let scored = self.score_candidates(doc, signature, candidates, diagnostics);
        let (original_id, jaccard) = best_by_jaccard(&scored)?;

        let found = jaccard >= self.config.near_duplicate_threshold;
        metrics::histogram!(
            "dedup_tier_duration_ms",
            "tier" => "near",
            "found" => if found { "true" } else { "false" }
        )
        .record(start.elapsed().as_millis() as f64);

        if found {
            tracing::info!(
                original_id = %original_id,
                jaccard = jaccard,
                "Near duplicate found"
            );
            Some(DuplicateResult::Near {
                original_id,
                jaccard,
            })
        } else {
            tracing::debug!(
                best_jaccard = jaccard,
                threshold = self.config.near_duplicate_threshold,
                "No near match above threshold, checking semantic tier"
            );
            None
        }
    }

    /// Computes true signature Jaccard against every candidate's stored
    /// signature, excluding the document itself.
    fn score_candidates(
        &self,
        doc: &IngestDocument,
        signature: &MinHashSignature,
        candidates: Vec<DocumentId>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<(DocumentId, f64)> {
        let mut scored = Vec::with_capacity(candidates.len());
        let mut degraded = false;
        for candidate in candidates {
            if candidate == doc.id {
                continue;
            }
            match self.near.signature(&candidate) {
                Ok(Some(stored)) => scored.push((candidate, signature.jaccard(&stored))),
                Ok(None) => {
                    tracing::debug!(candidate = %candidate, "Candidate signature missing; skipping");
                }
                Err(e) => {
                    tracing::warn!(candidate = %candidate, error = %e, "Candidate fetch failed");
                    if !degraded {
                        diagnostics.push(Diagnostic::TierSkipped {
                            tier: Tier::Near,
                            reason: e.to_string(),
                        });
                        degraded = true;
                    }
                }
            }
        }
        scored
    }

    /// Tier 3: embedding nearest-neighbor probe. Probe failure yields
    /// `Unknown`, never `Unique`.
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for duration metrics
    fn check_semantic(
        &self,
        doc: &IngestDocument,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> DuplicateResult {
        let start = Instant::now();
        match self.probe.probe(&doc.id, &doc.embedding) {
            Ok(neighbors) => {
                let found = neighbors
                    .first()
                    .is_some_and(|(_, cosine)| *cosine >= self.config.semantic_duplicate_threshold);
                metrics::histogram!(
                    "dedup_tier_duration_ms",
                    "tier" => "semantic",
                    "found" => if found { "true" } else { "false" }
                )
                .record(start.elapsed().as_millis() as f64);

                if let Some((original_id, cosine)) = neighbors.into_iter().next() {
                    if cosine >= self.config.semantic_duplicate_threshold {
                        tracing::info!(
                            original_id = %original_id,
                            cosine = cosine,
                            "Semantic duplicate found"
                        );
                        return DuplicateResult::Semantic {
                            original_id,
                            cosine,
                        };
                    }
                    tracing::debug!(
                        best_cosine = cosine,
                        threshold = self.config.semantic_duplicate_threshold,
                        "No semantic match above threshold"
                    );
                }
                DuplicateResult::Unique
            }
            Err(e) => {
                tracing::warn!(error = %e, "Semantic tier unavailable; result is unknown");
                diagnostics.push(Diagnostic::SemanticUnavailable {
                    reason: e.to_string(),
                });
                DuplicateResult::Unknown
            }
        }
    }

    /// Records the classification outcome counter and total duration.
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for duration metrics
    fn record_outcome(&self, result: &DuplicateResult, start: Instant) {
        metrics::counter!(
            "dedup_classifications_total",
            "result" => result.kind()
        )
        .increment(1);
        metrics::histogram!(
            "dedup_classify_duration_ms",
            "result" => result.kind()
        )
        .record(start.elapsed().as_millis() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LshParams;
    use crate::storage::traits::DistanceMetric;
    use crate::storage::{ExhaustiveVectorIndex, ShardedExactIndex};
    use crate::{Error, LshIndex};
    use std::collections::HashMap;
    use test_case::test_case;

    fn doc(id: &str, text: &str, embedding: Vec<f32>) -> IngestDocument {
        IngestDocument {
            id: DocumentId::new(id),
            normalized_text: text.to_string(),
            embedding,
        }
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn classifier(
        exact: Arc<ShardedExactIndex>,
        near: Arc<LshIndex>,
        vector: Arc<ExhaustiveVectorIndex>,
    ) -> DuplicateClassifier<ShardedExactIndex, LshIndex, ExhaustiveVectorIndex> {
        DuplicateClassifier::new(exact, near, vector, EngineConfig::default())
    }

    fn default_setup() -> (
        Arc<ShardedExactIndex>,
        Arc<LshIndex>,
        Arc<ExhaustiveVectorIndex>,
    ) {
        (
            Arc::new(ShardedExactIndex::new()),
            Arc::new(LshIndex::new(EngineConfig::default().lsh)),
            Arc::new(ExhaustiveVectorIndex::new()),
        )
    }

    #[test]
    fn test_unique_on_empty_indexes() {
        let (exact, near, vector) = default_setup();
        let classifier = classifier(exact, near, vector);

        let classification = classifier
            .classify(&doc("doc-1", &words(50), vec![1.0, 0.0]))
            .unwrap();

        assert_eq!(classification.result, DuplicateResult::Unique);
        assert!(classification.diagnostics.is_empty());
        assert!(classification.is_complete());
        assert!(classification.sketch.is_some());
    }

    #[test]
    fn test_invalid_input_is_a_hard_failure() {
        let (exact, near, vector) = default_setup();
        let classifier = classifier(exact, near, vector);

        let err = classifier
            .classify(&doc("doc-1", "", vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = classifier
            .classify(&doc("doc-1", "text here", vec![f32::INFINITY]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_exact_tier_matches_identical_text() {
        let (exact, near, vector) = default_setup();
        let text = words(100);
        exact
            .insert(ContentHasher::hash(&text), &DocumentId::new("original"))
            .unwrap();

        let classifier = classifier(exact, near, vector);
        let classification = classifier
            .classify(&doc("copy", &text, vec![1.0, 0.0]))
            .unwrap();

        assert_eq!(
            classification.result,
            DuplicateResult::Exact {
                original_id: DocumentId::new("original")
            }
        );
        // Tier 1 short-circuits before any sketching happens.
        assert!(classification.sketch.is_none());
    }

    #[test]
    fn test_exact_tier_ignores_self_match() {
        let (exact, near, vector) = default_setup();
        let text = words(100);
        exact
            .insert(ContentHasher::hash(&text), &DocumentId::new("doc-1"))
            .unwrap();

        let classifier = classifier(exact, near, vector);
        let classification = classifier
            .classify(&doc("doc-1", &text, vec![1.0, 0.0]))
            .unwrap();

        assert_eq!(classification.result, DuplicateResult::Unique);
    }

    #[test]
    fn test_near_tier_matches_edited_variant() {
        let (exact, near, vector) = default_setup();
        let original = words(1000);
        let mut edited_words: Vec<String> = (0..1000).map(|i| format!("word{i}")).collect();
        edited_words[400] = "substitution".to_string();
        let edited = edited_words.join(" ");

        let sketcher = ShingleSketcher::new(3, 128);
        let original_sig = match sketcher.sketch(&original) {
            Sketch::Signature(sig) => sig,
            Sketch::TooShort { .. } => unreachable!(),
        };
        near.insert(&DocumentId::new("original"), &original_sig)
            .unwrap();

        let classifier = classifier(exact, near, vector);
        let classification = classifier
            .classify(&doc("edited", &edited, vec![1.0, 0.0]))
            .unwrap();

        match classification.result {
            DuplicateResult::Near {
                original_id,
                jaccard,
            } => {
                assert_eq!(original_id.as_str(), "original");
                assert!(jaccard >= 0.85, "jaccard {jaccard}");
            }
            other => panic!("expected near, got {other:?}"),
        }
    }

    #[test]
    fn test_semantic_tier_matches_paraphrase() {
        let (exact, near, vector) = default_setup();
        // A paraphrase shares no shingles but sits close in embedding space.
        vector
            .upsert(&DocumentId::new("original"), &[1.0, 0.02])
            .unwrap();

        let classifier = classifier(exact, near, vector);
        let classification = classifier
            .classify(&doc("paraphrase", &words(50), vec![1.0, 0.0]))
            .unwrap();

        match classification.result {
            DuplicateResult::Semantic {
                original_id,
                cosine,
            } => {
                assert_eq!(original_id.as_str(), "original");
                assert!(cosine >= 0.92, "cosine {cosine}");
            }
            other => panic!("expected semantic, got {other:?}"),
        }
    }

    #[test]
    fn test_degenerate_document_routes_to_semantic() {
        let (exact, near, vector) = default_setup();
        vector
            .upsert(&DocumentId::new("original"), &[1.0, 0.0])
            .unwrap();

        let classifier = classifier(exact, near, vector);
        let classification = classifier
            .classify(&doc("tiny", "two words", vec![1.0, 0.0]))
            .unwrap();

        // Two words cannot shingle at size 3; the near tier is bypassed
        // with a diagnostic and the semantic tier still fires.
        assert!(matches!(
            classification.result,
            DuplicateResult::Semantic { .. }
        ));
        assert!(classification
            .diagnostics
            .contains(&Diagnostic::DegenerateSignature { word_count: 2 }));
        assert_eq!(classification.sketch, Some(Sketch::TooShort { word_count: 2 }));
    }

    struct FailingSearcher;

    impl VectorSearcher for FailingSearcher {
        fn metric(&self) -> DistanceMetric {
            DistanceMetric::Cosine
        }

        fn query(&self, _embedding: &[f32], _k: usize) -> crate::Result<Vec<(DocumentId, f32)>> {
            Err(Error::ProbeUnavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_probe_failure_yields_unknown_not_unique() {
        let exact = Arc::new(ShardedExactIndex::new());
        let near = Arc::new(LshIndex::new(EngineConfig::default().lsh));
        let classifier =
            DuplicateClassifier::new(exact, near, Arc::new(FailingSearcher), EngineConfig::default());

        let classification = classifier
            .classify(&doc("doc-1", &words(50), vec![1.0, 0.0]))
            .unwrap();

        assert_eq!(classification.result, DuplicateResult::Unknown);
        assert!(!classification.is_complete());
        assert!(matches!(
            classification.diagnostics.as_slice(),
            [Diagnostic::SemanticUnavailable { .. }]
        ));
    }

    /// Stub near index returning a fixed candidate set, for exercising the
    /// threshold boundary with doctored signatures.
    struct StubNear {
        signatures: HashMap<DocumentId, MinHashSignature>,
    }

    impl NearIndexBackend for StubNear {
        fn insert(&self, _id: &DocumentId, _signature: &MinHashSignature) -> crate::Result<()> {
            Ok(())
        }

        fn candidates(&self, _signature: &MinHashSignature) -> crate::Result<Vec<DocumentId>> {
            let mut ids: Vec<DocumentId> = self.signatures.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        }

        fn signature(&self, id: &DocumentId) -> crate::Result<Option<MinHashSignature>> {
            Ok(self.signatures.get(id).cloned())
        }

        fn len(&self) -> crate::Result<usize> {
            Ok(self.signatures.len())
        }
    }

    /// Classifies against a stored signature that agrees with the query's
    /// own signature in exactly `agreeing` of 100 positions.
    fn classify_at_agreement(agreeing: usize) -> DuplicateResult {
        let config = EngineConfig::default().with_minhash(100, LshParams::new(20, 5));
        config.validate().unwrap();

        let text = words(200);
        let sketcher = ShingleSketcher::from_config(&config);
        let query_sig = match sketcher.sketch(&text) {
            Sketch::Signature(sig) => sig,
            Sketch::TooShort { .. } => unreachable!(),
        };

        let mut doctored = query_sig.values().to_vec();
        for value in doctored.iter_mut().take(100 - agreeing) {
            *value = value.wrapping_add(1);
        }

        let mut signatures = HashMap::new();
        signatures.insert(
            DocumentId::new("candidate"),
            MinHashSignature::new(doctored),
        );

        let classifier = DuplicateClassifier::new(
            Arc::new(ShardedExactIndex::new()),
            Arc::new(StubNear { signatures }),
            Arc::new(ExhaustiveVectorIndex::new()),
            config,
        );

        classifier
            .classify(&doc("query", &text, vec![1.0, 0.0]))
            .unwrap()
            .result
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        // Exactly at the 0.85 default threshold: classified Near.
        match classify_at_agreement(85) {
            DuplicateResult::Near { jaccard, .. } => {
                assert!((jaccard - 0.85).abs() < f64::EPSILON);
            }
            other => panic!("expected near at the boundary, got {other:?}"),
        }

        // Infinitesimally below: falls through (vector index is empty, so
        // the final verdict is unique).
        assert_eq!(classify_at_agreement(84), DuplicateResult::Unique);
    }

    #[test_case(&[("a", 0.9), ("b", 0.8)], Some(("a", 0.9)); "highest wins")]
    #[test_case(&[("b", 0.8), ("a", 0.9)], Some(("a", 0.9)); "order independent")]
    #[test_case(&[("b", 0.9), ("a", 0.9)], Some(("a", 0.9)); "ties break to smaller id")]
    #[test_case(&[], None; "empty yields none")]
    fn test_best_by_jaccard(input: &[(&str, f64)], expected: Option<(&str, f64)>) {
        let scored: Vec<(DocumentId, f64)> = input
            .iter()
            .map(|(id, j)| (DocumentId::new(*id), *j))
            .collect();
        let best = best_by_jaccard(&scored);
        assert_eq!(
            best,
            expected.map(|(id, j)| (DocumentId::new(id), j))
        );
    }
}
