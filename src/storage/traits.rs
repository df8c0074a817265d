//! Backend traits for the engine's shared state.
//!
//! All traits are object-safe and `Send + Sync`; methods take `&self` and
//! implementations use interior mutability so handles can be shared via
//! `Arc<dyn Trait>` across concurrently classifying workers.
//!
//! # Implementor Notes
//!
//! - The exact-hash index and the LSH index are the only structures mutated
//!   on the classification hot path; both must support concurrent readers
//!   with a single-writer-per-bucket (or sharded-lock) discipline.
//! - Record and chain stores are mutated only by the version-chain tracker,
//!   which serializes chain updates itself; implementations still must be
//!   thread-safe for readers.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::models::{ChainId, DocumentId, DocumentRecord, Hash256, MinHashSignature, VersionChain};

/// The distance metric an external vector index reports.
///
/// The engine treats the index as opaque; [`crate::SemanticProbe`] converts
/// whatever the index returns into cosine-style similarity in `[0.0, 1.0]`
/// before thresholds are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance (`1 - cos`), in `[0.0, 2.0]`.
    Cosine,
    /// Inner product of normalized vectors, in `[-1.0, 1.0]`. Higher is
    /// closer.
    InnerProduct,
    /// Euclidean (L2) distance, non-negative. Lower is closer.
    Euclidean,
}

/// Point-lookup index from content hash to the first document indexed with
/// that hash.
pub trait ExactIndexBackend: Send + Sync {
    /// Looks up the document holding this content hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the index store fails to respond.
    fn lookup(&self, hash: &Hash256) -> Result<Option<DocumentId>>;

    /// First-wins insert: maps `hash` to `id` unless the hash is already
    /// mapped, in which case the incumbent is returned and the index is
    /// unchanged.
    ///
    /// The first-wins contract is what lets commit resolve races between
    /// concurrently ingested copies of the same content to exactly one
    /// unique document.
    ///
    /// # Errors
    ///
    /// Returns an error if the index store fails to respond.
    fn insert(&self, hash: Hash256, id: &DocumentId) -> Result<Option<DocumentId>>;

    /// Returns the number of indexed hashes.
    ///
    /// # Errors
    ///
    /// Returns an error if the index store fails to respond.
    fn len(&self) -> Result<usize>;

    /// Returns true if no hashes are indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index store fails to respond.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Candidate index over MinHash signatures.
///
/// Returns *candidates*, not verified matches; the classifier re-verifies
/// every candidate with signature Jaccard before applying the threshold.
pub trait NearIndexBackend: Send + Sync {
    /// Indexes a signature under a document id.
    ///
    /// Insertion must be atomic with respect to concurrent queries: a query
    /// may observe all of the signature's bands or none of them, never a
    /// partial insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature length does not match the index
    /// geometry or the store fails to respond.
    fn insert(&self, id: &DocumentId, signature: &MinHashSignature) -> Result<()>;

    /// Returns candidate ids sharing at least one band with the query
    /// signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature length does not match the index
    /// geometry or the store fails to respond.
    fn candidates(&self, signature: &MinHashSignature) -> Result<Vec<DocumentId>>;

    /// Fetches the stored signature for a candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn signature(&self, id: &DocumentId) -> Result<Option<MinHashSignature>>;

    /// Returns the number of indexed signatures.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn len(&self) -> Result<usize>;
}

/// The external vector index boundary.
///
/// The index's own nearest-neighbor structure (HNSW, IVF, brute force) is
/// outside this engine; the engine only issues `query` calls. The single
/// `query` call is the engine's only potential blocking point; callers may
/// impose a timeout around classification and the probe maps failures to an
/// `Unknown` classification rather than an error.
pub trait VectorSearcher: Send + Sync {
    /// The metric `query` scores are expressed in.
    fn metric(&self) -> DistanceMetric;

    /// Returns the `k` nearest neighbors of `embedding` with raw scores in
    /// the index's native metric.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is unreachable or times out.
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>>;
}

/// Store of [`DocumentRecord`] entries.
///
/// Records are never deleted by this engine; `version_chain_id` and
/// `is_latest` are the only fields mutated after creation.
pub trait RecordStore: Send + Sync {
    /// Fetches a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn get(&self, id: &DocumentId) -> Result<Option<DocumentRecord>>;

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn put(&self, record: DocumentRecord) -> Result<()>;

    /// Updates a record's chain membership fields.
    ///
    /// Returns `false` if the record no longer exists (deleted by an
    /// external retention process); callers treat that as a repairable
    /// inconsistency, never a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn set_chain_membership(
        &self,
        id: &DocumentId,
        chain_id: &ChainId,
        is_latest: bool,
    ) -> Result<bool>;

    /// Returns the number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn len(&self) -> Result<usize>;
}

/// Store of version chains and the document-to-chain membership map.
pub trait ChainStore: Send + Sync {
    /// Fetches a chain by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn get(&self, chain_id: &ChainId) -> Result<Option<VersionChain>>;

    /// Returns the chain a document belongs to, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn chain_of(&self, id: &DocumentId) -> Result<Option<ChainId>>;

    /// Creates a chain with the given members, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if any member already belongs to a chain.
    fn create(&self, members: &[DocumentId]) -> Result<ChainId>;

    /// Appends a member to an existing chain and returns the updated chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain does not exist or the member already
    /// belongs to a chain.
    fn append(&self, chain_id: &ChainId, id: &DocumentId) -> Result<VersionChain>;

    /// Upserts a chain and re-points membership for every listed member.
    ///
    /// Membership entries referring to this chain but absent from the
    /// member list are removed. Used by merge/split corrections.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn replace(&self, chain: VersionChain) -> Result<()>;

    /// Removes a chain (membership entries included). Returns `false` if it
    /// did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn remove(&self, chain_id: &ChainId) -> Result<bool>;

    /// Returns the number of chains.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to respond.
    fn len(&self) -> Result<usize>;
}
