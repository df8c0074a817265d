//! Engine configuration.
//!
//! This module defines the configuration consumed by the classifier, the
//! LSH index, and the policy engine, including similarity thresholds and
//! the band/row geometry that couples the LSH candidate threshold to
//! recall/precision.

use serde::{Deserialize, Serialize};

use crate::models::Action;
use crate::{Error, Result};

/// LSH band geometry: `bands * rows_per_band` must equal the number of
/// MinHash permutations.
///
/// The geometry determines the similarity at which candidate pairs become
/// likely to collide in at least one band (the LSH "S-curve"); its
/// characteristic threshold is `(1/b)^(1/r)`. Exposing `b`/`r` rather than a
/// single threshold knob keeps the threshold/recall trade-off explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LshParams {
    /// Number of bands.
    pub bands: usize,
    /// Rows (signature positions) per band.
    pub rows_per_band: usize,
}

impl LshParams {
    /// Creates band geometry directly.
    #[must_use]
    pub const fn new(bands: usize, rows_per_band: usize) -> Self {
        Self {
            bands,
            rows_per_band,
        }
    }

    /// Total signature positions covered (`bands * rows_per_band`).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bands * self.rows_per_band
    }

    /// Returns true when the geometry covers zero positions.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The similarity at which a pair has roughly even odds of becoming an
    /// LSH candidate: `(1/b)^(1/r)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Band counts are small
    pub fn characteristic_threshold(&self) -> f64 {
        if self.bands == 0 || self.rows_per_band == 0 {
            return 0.0;
        }
        (1.0 / self.bands as f64).powf(1.0 / self.rows_per_band as f64)
    }

    /// Derives the band geometry whose characteristic threshold is closest
    /// to `target`, among all factorizations of `permutations`.
    ///
    /// This is the "target-threshold parameter" alternative to setting
    /// `b`/`r` by hand: callers configure the near threshold once and get a
    /// geometry tuned for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `permutations` is zero or `target`
    /// is outside `(0.0, 1.0)`.
    pub fn for_threshold(permutations: usize, target: f64) -> Result<Self> {
        if permutations == 0 {
            return Err(Error::InvalidInput(
                "minhash permutations must be non-zero".to_string(),
            ));
        }
        if !(target > 0.0 && target < 1.0) {
            return Err(Error::InvalidInput(format!(
                "target threshold {target} must be in (0.0, 1.0)"
            )));
        }

        let mut best = Self::new(1, permutations);
        let mut best_distance = (best.characteristic_threshold() - target).abs();
        for bands in 2..=permutations {
            if permutations % bands != 0 {
                continue;
            }
            let candidate = Self::new(bands, permutations / bands);
            let distance = (candidate.characteristic_threshold() - target).abs();
            if distance < best_distance {
                best = candidate;
                best_distance = distance;
            }
        }
        Ok(best)
    }
}

/// Configuration for the deduplication engine.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `PALIMPSEST_NEAR_THRESHOLD` | f64 | `0.85` | Near-duplicate Jaccard threshold (inclusive) |
/// | `PALIMPSEST_SEMANTIC_THRESHOLD` | f64 | `0.92` | Semantic cosine threshold (inclusive) |
/// | `PALIMPSEST_MINHASH_PERMUTATIONS` | usize | `128` | MinHash signature length |
/// | `PALIMPSEST_SHINGLE_SIZE` | usize | `3` | Words per shingle |
/// | `PALIMPSEST_LSH_BANDS` | usize | `16` | LSH bands (with `PALIMPSEST_LSH_ROWS`) |
/// | `PALIMPSEST_LSH_ROWS` | usize | `8` | Rows per band |
/// | `PALIMPSEST_SEMANTIC_K` | usize | `5` | Neighbors requested from the vector index |
/// | `PALIMPSEST_ON_EXACT` | action | `skip` | Action for exact duplicates |
/// | `PALIMPSEST_ON_NEAR` | action | `version` | Action for near duplicates |
/// | `PALIMPSEST_ON_SEMANTIC` | action | `flag` | Action for semantic duplicates |
/// | `PALIMPSEST_AUTO_VERSION_MIN_JACCARD` | f64 | unset | Auto-version floor; below it near matches are flagged |
///
/// If neither `PALIMPSEST_LSH_BANDS` nor `PALIMPSEST_LSH_ROWS` is set, the
/// band geometry is derived from the near threshold via
/// [`LshParams::for_threshold`].
///
/// # Example
///
/// ```rust
/// use palimpsest::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert!((config.near_duplicate_threshold - 0.85).abs() < f64::EPSILON);
/// assert_eq!(config.minhash_permutations, 128);
/// assert_eq!(config.lsh.bands * config.lsh.rows_per_band, 128);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Jaccard threshold for the near tier (inclusive).
    pub near_duplicate_threshold: f64,

    /// Cosine threshold for the semantic tier (inclusive).
    pub semantic_duplicate_threshold: f64,

    /// Number of MinHash permutations (signature length).
    pub minhash_permutations: usize,

    /// Words per shingle.
    pub shingle_size: usize,

    /// LSH band geometry.
    pub lsh: LshParams,

    /// Neighbors requested per semantic probe.
    pub semantic_k: usize,

    /// Action for exact duplicates.
    pub on_exact: Action,

    /// Action for near duplicates.
    pub on_near: Action,

    /// Action for semantic duplicates.
    pub on_semantic: Action,

    /// Score-based override: when set and `on_near` is `Version`, near
    /// matches below this Jaccard are flagged for review instead of being
    /// auto-versioned.
    pub auto_version_min_jaccard: Option<f64>,
}

impl EngineConfig {
    /// Creates a configuration from environment variables.
    ///
    /// Falls back to defaults for any unset variable. Invalid values are
    /// ignored in favor of the default, matching how the rest of the
    /// pipeline treats optional tuning knobs.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let near_duplicate_threshold = env_parse("PALIMPSEST_NEAR_THRESHOLD")
            .unwrap_or(defaults.near_duplicate_threshold);
        let semantic_duplicate_threshold = env_parse("PALIMPSEST_SEMANTIC_THRESHOLD")
            .unwrap_or(defaults.semantic_duplicate_threshold);
        let minhash_permutations =
            env_parse("PALIMPSEST_MINHASH_PERMUTATIONS").unwrap_or(defaults.minhash_permutations);
        let shingle_size = env_parse("PALIMPSEST_SHINGLE_SIZE").unwrap_or(defaults.shingle_size);
        let semantic_k = env_parse("PALIMPSEST_SEMANTIC_K").unwrap_or(defaults.semantic_k);

        let bands: Option<usize> = env_parse("PALIMPSEST_LSH_BANDS");
        let rows: Option<usize> = env_parse("PALIMPSEST_LSH_ROWS");
        let lsh = match (bands, rows) {
            (Some(bands), Some(rows)) => LshParams::new(bands, rows),
            (Some(bands), None) if bands > 0 && minhash_permutations % bands == 0 => {
                LshParams::new(bands, minhash_permutations / bands)
            }
            (None, Some(rows)) if rows > 0 && minhash_permutations % rows == 0 => {
                LshParams::new(minhash_permutations / rows, rows)
            }
            _ => LshParams::for_threshold(minhash_permutations, near_duplicate_threshold)
                .unwrap_or(defaults.lsh),
        };

        let on_exact = env_action("PALIMPSEST_ON_EXACT").unwrap_or(defaults.on_exact);
        let on_near = env_action("PALIMPSEST_ON_NEAR").unwrap_or(defaults.on_near);
        let on_semantic = env_action("PALIMPSEST_ON_SEMANTIC").unwrap_or(defaults.on_semantic);
        let auto_version_min_jaccard = env_parse("PALIMPSEST_AUTO_VERSION_MIN_JACCARD");

        Self {
            near_duplicate_threshold,
            semantic_duplicate_threshold,
            minhash_permutations,
            shingle_size,
            lsh,
            semantic_k,
            on_exact,
            on_near,
            on_semantic,
            auto_version_min_jaccard,
        }
    }

    /// Validates internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the band geometry does not cover
    /// the signature, a threshold is outside `[0.0, 1.0]`, or a structural
    /// parameter is zero.
    pub fn validate(&self) -> Result<()> {
        if self.minhash_permutations == 0 {
            return Err(Error::InvalidInput(
                "minhash_permutations must be non-zero".to_string(),
            ));
        }
        if self.shingle_size == 0 {
            return Err(Error::InvalidInput(
                "shingle_size must be non-zero".to_string(),
            ));
        }
        if self.semantic_k == 0 {
            return Err(Error::InvalidInput("semantic_k must be non-zero".to_string()));
        }
        if self.lsh.len() != self.minhash_permutations {
            return Err(Error::InvalidInput(format!(
                "lsh geometry {}x{} does not cover {} permutations",
                self.lsh.bands, self.lsh.rows_per_band, self.minhash_permutations
            )));
        }
        for (name, value) in [
            ("near_duplicate_threshold", self.near_duplicate_threshold),
            (
                "semantic_duplicate_threshold",
                self.semantic_duplicate_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidInput(format!(
                    "{name} {value} must be in [0.0, 1.0]"
                )));
            }
        }
        if let Some(floor) = self.auto_version_min_jaccard {
            if !(0.0..=1.0).contains(&floor) {
                return Err(Error::InvalidInput(format!(
                    "auto_version_min_jaccard {floor} must be in [0.0, 1.0]"
                )));
            }
        }
        Ok(())
    }

    /// Builder method to set the near threshold.
    #[must_use]
    pub const fn with_near_threshold(mut self, threshold: f64) -> Self {
        self.near_duplicate_threshold = threshold;
        self
    }

    /// Builder method to set the semantic threshold.
    #[must_use]
    pub const fn with_semantic_threshold(mut self, threshold: f64) -> Self {
        self.semantic_duplicate_threshold = threshold;
        self
    }

    /// Builder method to set the MinHash permutation count and band
    /// geometry together.
    #[must_use]
    pub const fn with_minhash(mut self, permutations: usize, lsh: LshParams) -> Self {
        self.minhash_permutations = permutations;
        self.lsh = lsh;
        self
    }

    /// Builder method to set the shingle size.
    #[must_use]
    pub const fn with_shingle_size(mut self, size: usize) -> Self {
        self.shingle_size = size;
        self
    }

    /// Builder method to set the semantic probe depth.
    #[must_use]
    pub const fn with_semantic_k(mut self, k: usize) -> Self {
        self.semantic_k = k;
        self
    }

    /// Builder method to set the per-kind actions.
    #[must_use]
    pub const fn with_actions(mut self, on_exact: Action, on_near: Action, on_semantic: Action) -> Self {
        self.on_exact = on_exact;
        self.on_near = on_near;
        self.on_semantic = on_semantic;
        self
    }

    /// Builder method to set the auto-version floor.
    #[must_use]
    pub const fn with_auto_version_min_jaccard(mut self, floor: f64) -> Self {
        self.auto_version_min_jaccard = Some(floor);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            near_duplicate_threshold: 0.85,
            semantic_duplicate_threshold: 0.92,
            minhash_permutations: 128,
            shingle_size: 3,
            lsh: LshParams::new(16, 8),
            semantic_k: 5,
            on_exact: Action::Skip,
            on_near: Action::Version,
            on_semantic: Action::Flag,
            auto_version_min_jaccard: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_action(key: &str) -> Option<Action> {
    std::env::var(key).ok().and_then(|v| Action::parse(&v))
}
