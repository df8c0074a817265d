//! Core data model types.

mod chain;
mod document;
mod result;
mod signature;

pub use chain::{ChainUpdate, VersionChain};
pub use document::{ChainId, DocumentId, DocumentRecord, EmbeddingId, Hash256, IngestDocument};
pub use result::{Action, Classification, Diagnostic, DuplicateResult, IngestOutcome, Tier};
pub use signature::{MinHashSignature, Sketch};
