//! Semantic duplicate probing via an external vector index.
//!
//! The nearest-neighbor search itself is external; this component issues
//! the query with a fixed `k`, converts the index's metric into similarity
//! in `[0.0, 1.0]`, and filters the probing document out of its own
//! results.

use std::sync::Arc;
use tracing::instrument;

use crate::Result;
use crate::models::DocumentId;
use crate::storage::traits::{DistanceMetric, VectorSearcher};

/// Converts a raw score from the vector index into similarity in
/// `[0.0, 1.0]`.
///
/// | Metric | Conversion |
/// |--------|------------|
/// | `Cosine` (distance) | `1 - d`, clamped |
/// | `InnerProduct` | midpoint to `[0, 1]` |
/// | `Euclidean` | `1 / (1 + d)` |
#[must_use]
pub fn normalize_similarity(metric: DistanceMetric, raw: f32) -> f64 {
    let similarity = match metric {
        DistanceMetric::Cosine => 1.0 - f64::from(raw),
        DistanceMetric::InnerProduct => f64::midpoint(f64::from(raw), 1.0),
        DistanceMetric::Euclidean => 1.0 / (1.0 + f64::from(raw).max(0.0)),
    };
    similarity.clamp(0.0, 1.0)
}

/// Probe for embedding-nearest neighbors.
///
/// # Example
///
/// ```rust,ignore
/// use palimpsest::{SemanticProbe, storage::ExhaustiveVectorIndex};
/// use std::sync::Arc;
///
/// let probe = SemanticProbe::new(Arc::new(index), 5);
/// let neighbors = probe.probe(&doc_id, &embedding)?;
/// if let Some((id, cosine)) = neighbors.first() {
///     println!("nearest: {id} ({cosine:.2})");
/// }
/// ```
pub struct SemanticProbe<V: VectorSearcher> {
    /// External vector index handle.
    searcher: Arc<V>,
    /// Neighbors requested per probe.
    k: usize,
}

impl<V: VectorSearcher> SemanticProbe<V> {
    /// Creates a probe over an external vector index.
    #[must_use]
    pub const fn new(searcher: Arc<V>, k: usize) -> Self {
        Self { searcher, k }
    }

    /// Returns the configured probe depth.
    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    /// Queries the external index and returns neighbors with similarity in
    /// `[0.0, 1.0]`, best first, the probing document excluded.
    ///
    /// This call is the engine's only potential blocking point; callers may
    /// wrap classification in a timeout and the classifier maps any error
    /// here to an `Unknown` result rather than failing the classification.
    ///
    /// # Errors
    ///
    /// Propagates the index's failure; the classifier converts it into a
    /// degradation diagnostic.
    #[instrument(
        skip(self, embedding),
        fields(operation = "semantic_probe", k = self.k, dimensions = embedding.len())
    )]
    pub fn probe(
        &self,
        doc_id: &DocumentId,
        embedding: &[f32],
    ) -> Result<Vec<(DocumentId, f64)>> {
        // Ask for one extra neighbor: the document's own vector may already
        // be indexed and must not match itself.
        let raw = self.searcher.query(embedding, self.k + 1)?;
        let metric = self.searcher.metric();

        let mut neighbors: Vec<(DocumentId, f64)> = raw
            .into_iter()
            .filter(|(id, _)| id != doc_id)
            .map(|(id, score)| (id, normalize_similarity(metric, score)))
            .collect();
        neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        neighbors.truncate(self.k);

        tracing::debug!(
            neighbors = neighbors.len(),
            top_similarity = neighbors.first().map(|(_, s)| *s),
            "Semantic probe completed"
        );
        Ok(neighbors)
    }
}
