//! Business logic services.
//!
//! Services orchestrate storage backends and provide high-level operations.

mod chains;
pub mod deduplication;

pub use chains::VersionChainTracker;
pub use deduplication::{
    ContentHasher, DedupEngine, DuplicateClassifier, DuplicatePolicyEngine, LshIndex,
    SemanticProbe, ShingleSketcher,
};
