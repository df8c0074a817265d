//! Exhaustive-scan vector index for tests, benchmarks, and small corpora.

use std::sync::RwLock;

use super::traits::{DistanceMetric, VectorSearcher};
use crate::models::DocumentId;
use crate::{Error, Result};

/// Brute-force [`VectorSearcher`] reporting cosine distance.
///
/// Production deployments point the engine at an external ANN index; this
/// reference implementation stands in for it wherever a real index is
/// unavailable or overkill. Query cost is O(n * d).
pub struct ExhaustiveVectorIndex {
    entries: RwLock<Vec<(DocumentId, Vec<f32>)>>,
}

impl ExhaustiveVectorIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Inserts or replaces a vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    pub fn upsert(&self, id: &DocumentId, embedding: &[f32]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| {
            Error::ProbeUnavailable("poisoned vector index lock".to_string())
        })?;
        if let Some(entry) = entries.iter_mut().find(|(existing, _)| existing == id) {
            entry.1 = embedding.to_vec();
        } else {
            entries.push((id.clone(), embedding.to_vec()));
        }
        Ok(())
    }

    /// Returns the number of stored vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    pub fn len(&self) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| Error::ProbeUnavailable("poisoned vector index lock".to_string()))?
            .len())
    }

    /// Returns true if no vectors are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for ExhaustiveVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorSearcher for ExhaustiveVectorIndex {
    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::ProbeUnavailable("poisoned vector index lock".to_string()))?;

        let mut scored: Vec<(DocumentId, f32)> = entries
            .iter()
            .map(|(id, vector)| (id.clone(), 1.0 - cosine(embedding, vector)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_orders_by_distance() {
        let index = ExhaustiveVectorIndex::new();
        index.upsert(&DocumentId::new("same"), &[1.0, 0.0]).unwrap();
        index
            .upsert(&DocumentId::new("orthogonal"), &[0.0, 1.0])
            .unwrap();

        let results = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].0.as_str(), "same");
        assert!(results[0].1.abs() < 1e-6);
        assert_eq!(results[1].0.as_str(), "orthogonal");
        assert!((results[1].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_query_respects_k() {
        let index = ExhaustiveVectorIndex::new();
        for i in 0..10 {
            index
                .upsert(&DocumentId::new(format!("doc-{i}")), &[1.0, i as f32])
                .unwrap();
        }
        assert_eq!(index.query(&[1.0, 0.0], 3).unwrap().len(), 3);
    }

    #[test]
    fn test_upsert_replaces() {
        let index = ExhaustiveVectorIndex::new();
        index.upsert(&DocumentId::new("doc"), &[1.0, 0.0]).unwrap();
        index.upsert(&DocumentId::new("doc"), &[0.0, 1.0]).unwrap();
        assert_eq!(index.len().unwrap(), 1);

        let results = index.query(&[0.0, 1.0], 1).unwrap();
        assert!(results[0].1.abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_maximally_distant() {
        let index = ExhaustiveVectorIndex::new();
        index.upsert(&DocumentId::new("zero"), &[0.0, 0.0]).unwrap();
        let results = index.query(&[1.0, 0.0], 1).unwrap();
        assert!((results[0].1 - 1.0).abs() < 1e-6);
    }
}
