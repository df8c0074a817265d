//! Policy mapping from classification to ingestion action.
//!
//! A pure lookup from classification kind to the configured action, plus
//! the optional score-based override. No internal state.

use crate::config::EngineConfig;
use crate::models::{Action, DuplicateResult};

/// Policy engine deciding what the ingestion pipeline does with a
/// classified document.
///
/// Defaults: `Exact -> Skip`, `Near -> Version`, `Semantic -> Flag`,
/// `Unique -> IndexNormally`. `Unknown` (semantic tier unavailable) is
/// hard-mapped to `Flag`: an unclassifiable document goes to review rather
/// than being silently indexed as new content.
///
/// # Score-based override
///
/// With `auto_version_min_jaccard` set and `on_near = Version`, near
/// matches scoring below the floor are flagged for review instead of being
/// auto-versioned ("auto-version only confident matches").
///
/// # Example
///
/// ```rust
/// use palimpsest::{Action, DuplicatePolicyEngine, DuplicateResult, EngineConfig};
///
/// let policy = DuplicatePolicyEngine::new(EngineConfig::default());
/// assert_eq!(policy.decide(&DuplicateResult::Unique), Action::IndexNormally);
/// assert_eq!(policy.decide(&DuplicateResult::Unknown), Action::Flag);
/// ```
pub struct DuplicatePolicyEngine {
    on_exact: Action,
    on_near: Action,
    on_semantic: Action,
    auto_version_min_jaccard: Option<f64>,
}

impl DuplicatePolicyEngine {
    /// Creates a policy engine from engine configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            on_exact: config.on_exact,
            on_near: config.on_near,
            on_semantic: config.on_semantic,
            auto_version_min_jaccard: config.auto_version_min_jaccard,
        }
    }

    /// Maps a classification to the action the caller should take.
    #[must_use]
    pub fn decide(&self, result: &DuplicateResult) -> Action {
        match result {
            DuplicateResult::Exact { .. } => self.on_exact,
            DuplicateResult::Near { jaccard, .. } => self.decide_near(*jaccard),
            DuplicateResult::Semantic { .. } => self.on_semantic,
            DuplicateResult::Unique => Action::IndexNormally,
            DuplicateResult::Unknown => Action::Flag,
        }
    }

    fn decide_near(&self, jaccard: f64) -> Action {
        match self.auto_version_min_jaccard {
            Some(floor) if self.on_near == Action::Version && jaccard < floor => {
                tracing::debug!(
                    jaccard = jaccard,
                    floor = floor,
                    "Near match below auto-version floor; flagging for review"
                );
                Action::Flag
            }
            _ => self.on_near,
        }
    }
}
