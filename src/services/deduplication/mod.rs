//! Multi-tier deduplication pipeline.
//!
//! This module provides three-tier duplicate detection:
//! 1. **Exact match**: SHA-256 content fingerprint lookup
//! 2. **Near duplicate**: MinHash signatures over word shingles with LSH
//!    candidate retrieval and Jaccard verification
//! 3. **Semantic duplicate**: embedding nearest-neighbor probe against an
//!    external vector index
//!
//! The classifier implements short-circuit evaluation, exiting on the first
//! tier that matches; the engine wraps classification in a two-phase
//! classify/commit protocol so cancelled ingestions leave no trace.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          DedupEngine                               │
//! │  classify() ──────────────────────────────► commit()               │
//! │  ┌──────────────┐ ┌──────────────┐ ┌───────────────┐               │
//! │  │ ExactIndex   │ │ LshIndex     │ │ SemanticProbe │  PolicyEngine │
//! │  │ lookup       │ │ candidates + │ │ external ANN  │  ChainTracker │
//! │  │ (SHA-256)    │ │ Jaccard      │ │ query         │               │
//! │  └──────────────┘ └──────────────┘ └───────────────┘               │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

mod classifier;
mod engine;
mod hasher;
mod lsh;
mod policy;
mod semantic;
mod sketcher;

pub use classifier::{DuplicateClassifier, best_by_jaccard};
pub use engine::DedupEngine;
pub use hasher::ContentHasher;
pub use lsh::LshIndex;
pub use policy::DuplicatePolicyEngine;
pub use semantic::{SemanticProbe, normalize_similarity};
pub use sketcher::ShingleSketcher;
