//! # Palimpsest
//!
//! Multi-tier document deduplication and version-chain detection engine.
//!
//! Given a newly ingested document (normalized text plus a precomputed
//! embedding), palimpsest decides whether it is an exact duplicate, a
//! near-duplicate (edited variant), a semantic duplicate (paraphrase,
//! translation, re-export), or genuinely new content, and maintains version
//! chains so searches can default to the latest version while preserving
//! history.
//!
//! ## Classification tiers
//!
//! 1. **Exact**: SHA-256 fingerprint lookup over normalized text
//! 2. **Near**: MinHash signature over word shingles, candidates via LSH
//!    banding, verified with signature Jaccard
//! 3. **Semantic**: embedding nearest-neighbor probe against an external
//!    vector index, interpreted as cosine similarity
//!
//! Tiers run strictly in order with short-circuit evaluation; the cheapest,
//! highest-confidence check wins.
//!
//! ## Two-phase protocol
//!
//! [`DedupEngine::classify`] is read-only; [`DedupEngine::commit`] performs
//! all index mutations. Cancelling ingestion between the two calls leaves no
//! trace in any index.
//!
//! ## Example
//!
//! ```rust,ignore
//! use palimpsest::{DedupEngine, EngineConfig, IngestDocument};
//!
//! let engine = DedupEngine::in_memory(searcher, EngineConfig::default())?;
//! let outcome = engine.ingest(&IngestDocument {
//!     id: "doc-001".into(),
//!     normalized_text: text,
//!     embedding,
//! })?;
//! println!("{} -> {:?}", outcome.result, outcome.action);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{EngineConfig, LshParams};
pub use models::{
    Action, ChainId, ChainUpdate, Classification, Diagnostic, DocumentId, DocumentRecord,
    DuplicateResult, EmbeddingId, Hash256, IngestDocument, IngestOutcome, MinHashSignature,
    Sketch, Tier, VersionChain,
};
pub use services::{
    ContentHasher, DedupEngine, DuplicateClassifier, DuplicatePolicyEngine, LshIndex,
    SemanticProbe, ShingleSketcher, VersionChainTracker,
};
pub use storage::{
    ChainStore, DistanceMetric, ExactIndexBackend, NearIndexBackend, RecordStore, VectorSearcher,
};

/// Error type for palimpsest operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty document text, non-finite embedding values, inconsistent LSH parameters, merge without direct similarity evidence |
/// | `IndexUnavailable` | A shared index store fails to respond (e.g. poisoned lock) |
/// | `ProbeUnavailable` | The external vector index is unreachable or times out |
/// | `OperationFailed` | Storage backend invariant violations, chain bookkeeping failures |
///
/// Only `InvalidInput` propagates to callers as a hard classification
/// failure. Tier-level degradation during classification is reported through
/// [`models::Diagnostic`] entries on the result instead, so batch ingestion
/// throughput is never blocked by a degraded tier.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Document text is empty after upstream normalization
    /// - An embedding contains NaN or infinite values
    /// - Configuration fails validation (e.g. `bands * rows != permutations`)
    /// - A chain merge is requested without meeting the direct pairwise
    ///   similarity requirement
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A shared index store failed to respond.
    ///
    /// During classification this degrades the affected tier; during commit
    /// it propagates, because a partially committed document would poison
    /// future deduplication decisions.
    #[error("index '{index}' unavailable: {cause}")]
    IndexUnavailable {
        /// The index that failed (`exact`, `lsh`).
        index: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// The external vector index is unreachable or timed out.
    ///
    /// The semantic tier maps this to [`models::DuplicateResult::Unknown`]
    /// rather than `Unique`; the policy engine treats `Unknown`
    /// conservatively.
    #[error("vector probe unavailable: {0}")]
    ProbeUnavailable(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - A chain store invariant is violated (append to a missing chain,
    ///   double membership)
    /// - A record store mutation fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for palimpsest operations.
pub type Result<T> = std::result::Result<T, Error>;
