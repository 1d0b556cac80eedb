//! Engine configuration.
//!
//! Settings can be loaded from a TOML file:
//!
//! ```toml
//! stochastic_tolerance = 1e-5
//! probability_mass_tolerance = 1e-3
//! max_simplification_passes = 10000
//! pre_simplify = true
//! max_merge_width = 20
//! elimination_strategy = "min_width"
//! ```
//!
//! `stochastic_tolerance` applies wherever a rewrite or a gate recomputes the
//! stochastic flag of a factor it builds. Freshly constructed or parsed
//! matrices use [`crate::STOCHASTIC_TOLERANCE`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{GbnError, Result};
use crate::matrix::STOCHASTIC_TOLERANCE;

/// Environment variable naming a configuration file for [`EngineConfig::load_default`].
pub const CONFIG_ENV_VAR: &str = "GBN_CONFIG";

/// Heuristic used to pick the next pair of vertices to merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationStrategy {
    /// Pair whose merged neighborhood has the fewest independent wires.
    #[default]
    MinWidth,
    /// Minimum-degree vertex with its minimum-degree neighbor.
    MinDegree,
}

/// Tunables for evaluation and simplification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Column sums within this distance of one count as stochastic when a
    /// rewrite or gate recomputes a factor's stochastic flag.
    pub stochastic_tolerance: f64,

    /// Allowed deviation of a weighted choice's probabilities from one.
    pub probability_mass_tolerance: f64,

    /// Upper bound on fixed-point passes of a simplification driver.
    pub max_simplification_passes: usize,

    /// Run the local rule set before stepwise evaluation.
    pub pre_simplify: bool,

    /// Global rewrites skip merges and splits that would enumerate more
    /// wires than this.
    pub max_merge_width: usize,

    /// Pair selection for node elimination.
    pub elimination_strategy: EliminationStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stochastic_tolerance: STOCHASTIC_TOLERANCE,
            probability_mass_tolerance: 1e-3,
            max_simplification_passes: 10_000,
            pre_simplify: true,
            max_merge_width: 20,
            elimination_strategy: EliminationStrategy::MinWidth,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GbnError::Config(e.to_string()))
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GbnError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| GbnError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| GbnError::Config(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| GbnError::Config(format!("failed to write {}: {}", path.display(), e)))
    }

    /// Configuration named by `GBN_CONFIG`, or the defaults.
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            match Self::load(Path::new(&path)) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(error = %e, "ignoring configuration file"),
            }
        }
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: EliminationStrategy) -> Self {
        self.elimination_strategy = strategy;
        self
    }

    pub fn with_pre_simplify(mut self, pre_simplify: bool) -> Self {
        self.pre_simplify = pre_simplify;
        self
    }
}
