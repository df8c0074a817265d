//! Classification results, diagnostics, and policy actions.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::chain::ChainUpdate;
use super::document::{ChainId, DocumentId, Hash256};
use super::signature::Sketch;

/// The three classification tiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Tier 1: content-hash lookup.
    Exact,
    /// Tier 2: MinHash/LSH candidate retrieval and Jaccard verification.
    Near,
    /// Tier 3: embedding nearest-neighbor probe.
    Semantic,
}

impl Tier {
    /// Returns the tier name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Near => "near",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classifier's verdict for one document.
///
/// Exactly one variant is populated; `Near` and `Semantic` carry their
/// similarity score so the policy engine and any human-review surface can
/// rank ambiguous cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplicateResult {
    /// Content hash matches an existing record exactly.
    Exact {
        /// The record whose hash matched.
        original_id: DocumentId,
    },
    /// Signature Jaccard similarity meets the near threshold.
    Near {
        /// The best-scoring candidate.
        original_id: DocumentId,
        /// Jaccard similarity in `[0.0, 1.0]`.
        jaccard: f64,
    },
    /// Embedding similarity meets the semantic threshold.
    Semantic {
        /// The nearest neighbor above threshold.
        original_id: DocumentId,
        /// Cosine similarity in `[0.0, 1.0]`.
        cosine: f64,
    },
    /// No tier matched; the document is new content.
    Unique,
    /// The semantic tier was unavailable and no earlier tier matched.
    ///
    /// Distinct from `Unique`: the document could not be fully classified,
    /// so the policy engine treats it conservatively.
    Unknown,
}

impl DuplicateResult {
    /// Returns true for any duplicate variant.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::Exact { .. } | Self::Near { .. } | Self::Semantic { .. }
        )
    }

    /// Returns the matched original, if any.
    #[must_use]
    pub const fn original_id(&self) -> Option<&DocumentId> {
        match self {
            Self::Exact { original_id }
            | Self::Near { original_id, .. }
            | Self::Semantic { original_id, .. } => Some(original_id),
            Self::Unique | Self::Unknown => None,
        }
    }

    /// Returns the similarity score for `Near`/`Semantic` matches.
    #[must_use]
    pub const fn score(&self) -> Option<f64> {
        match self {
            Self::Near { jaccard, .. } => Some(*jaccard),
            Self::Semantic { cosine, .. } => Some(*cosine),
            Self::Exact { .. } | Self::Unique | Self::Unknown => None,
        }
    }

    /// Returns the variant name used in logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Exact { .. } => "exact",
            Self::Near { .. } => "near",
            Self::Semantic { .. } => "semantic",
            Self::Unique => "unique",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DuplicateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Structured diagnostics attached to a classification.
///
/// Degraded tiers, degenerate inputs, and repairs are reported here rather
/// than as errors, so observability can alert without blocking ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A tier's index store failed to respond; the tier was skipped.
    TierSkipped {
        /// The tier that was skipped.
        tier: Tier,
        /// The underlying failure.
        reason: String,
    },
    /// The document had too few words to shingle; tier 2 was bypassed.
    DegenerateSignature {
        /// Number of words found.
        word_count: usize,
    },
    /// The external vector index was unreachable; the result is `Unknown`.
    SemanticUnavailable {
        /// The underlying failure.
        reason: String,
    },
    /// A concurrently ingested copy won the exact-index insert; this
    /// document was reclassified as its exact duplicate at commit time.
    ExactRaceResolved {
        /// The document that won the race.
        original_id: DocumentId,
    },
    /// The matched original's record was missing at chain-update time; a
    /// chain was created from this document alone.
    ChainRepaired {
        /// The repaired chain.
        chain_id: ChainId,
    },
}

/// Output of the read-only classification phase.
///
/// Carries the content hash and sketch computed during classification so
/// that the commit phase never recomputes them. `sketch` is `None` when the
/// exact tier short-circuited (exact duplicates are never indexed, so no
/// sketch is needed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// The classifier's verdict.
    pub result: DuplicateResult,
    /// Fingerprint of the document's normalized text.
    pub content_hash: Hash256,
    /// MinHash sketch, absent when tier 1 short-circuited.
    pub sketch: Option<Sketch>,
    /// Degradations and repairs observed during classification.
    pub diagnostics: Vec<Diagnostic>,
}

impl Classification {
    /// Returns true when every tier that should have run did run.
    ///
    /// An incomplete classification is still usable (the document is indexed
    /// normally) but should be re-classified by a later reconciliation pass.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.diagnostics.iter().any(|d| {
            matches!(
                d,
                Diagnostic::TierSkipped { .. } | Diagnostic::SemanticUnavailable { .. }
            )
        })
    }
}

/// Action the ingestion pipeline should take for a classified document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Discard the document; nothing is stored or indexed.
    Skip,
    /// Store the document as a new version of its original.
    Version,
    /// Store and index, but queue for human review.
    Flag,
    /// Store and index as new content.
    IndexNormally,
}

impl Action {
    /// Returns the action name used in logs and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Version => "version",
            Self::Flag => "flag",
            Self::IndexNormally => "index",
        }
    }

    /// Parses an action name as written in configuration.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "version" => Some(Self::Version),
            "flag" => Some(Self::Flag),
            "index" | "index_normally" => Some(Self::IndexNormally),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of ingesting one document through classify + commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// The ingested document.
    pub document_id: DocumentId,
    /// The final classification, after commit-time race resolution.
    pub result: DuplicateResult,
    /// The policy decision for the final classification.
    pub action: Action,
    /// What happened to version-chain membership.
    pub chain_update: ChainUpdate,
    /// Diagnostics accumulated across both phases.
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_accessors() {
        let near = DuplicateResult::Near {
            original_id: DocumentId::new("doc-1"),
            jaccard: 0.91,
        };
        assert!(near.is_duplicate());
        assert_eq!(near.original_id().map(DocumentId::as_str), Some("doc-1"));
        assert_eq!(near.score(), Some(0.91));
        assert_eq!(near.kind(), "near");

        assert!(!DuplicateResult::Unique.is_duplicate());
        assert!(DuplicateResult::Unknown.original_id().is_none());
        assert!(DuplicateResult::Exact {
            original_id: DocumentId::new("doc-2")
        }
        .score()
        .is_none());
    }

    #[test]
    fn test_result_serde_tagged() {
        let result = DuplicateResult::Semantic {
            original_id: DocumentId::new("doc-9"),
            cosine: 0.94,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"kind\":\"semantic\""));
        let back: DuplicateResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("skip"), Some(Action::Skip));
        assert_eq!(Action::parse("Version"), Some(Action::Version));
        assert_eq!(Action::parse(" FLAG "), Some(Action::Flag));
        assert_eq!(Action::parse("index"), Some(Action::IndexNormally));
        assert_eq!(Action::parse("index_normally"), Some(Action::IndexNormally));
        assert_eq!(Action::parse("bogus"), None);
    }

    #[test]
    fn test_classification_completeness() {
        let complete = Classification {
            result: DuplicateResult::Unique,
            content_hash: Hash256::from_bytes([0; 32]),
            sketch: None,
            diagnostics: vec![Diagnostic::DegenerateSignature { word_count: 2 }],
        };
        // Degenerate input is a property of the document, not a degradation.
        assert!(complete.is_complete());

        let degraded = Classification {
            result: DuplicateResult::Unknown,
            content_hash: Hash256::from_bytes([0; 32]),
            sketch: None,
            diagnostics: vec![Diagnostic::SemanticUnavailable {
                reason: "timeout".to_string(),
            }],
        };
        assert!(!degraded.is_complete());
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(Tier::Exact.to_string(), "exact");
        assert_eq!(Tier::Near.to_string(), "near");
        assert_eq!(Tier::Semantic.to_string(), "semantic");
    }
}
