//! TOML configuration for the engine: database settings plus the approval
//! policy (strategy selection, reviewer levels, top authority).
//!
//! ```toml
//! [database]
//! url = "sqlite://reqflow.db"
//!
//! [policy]
//! top_authority_level = 10
//!
//! [[policy.levels]]
//! level = 6
//! name = "Finance"
//!
//! [[policy.levels]]
//! level = 7
//! name = "Administration"
//!
//! [[policy.levels]]
//! level = 10
//! name = "Direction Générale"
//!
//! [policy.strategy]
//! mode = "tiered"
//! tiers = [
//!   { up_to = "1000", levels = [] },
//!   { up_to = "10000", levels = [6, 7] },
//!   { levels = [6, 7, 10] },
//! ]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::planner::{
    ApprovalPolicy, BudgetTier, RequiredStep, StackingThreshold, ThresholdStackingPolicy,
    TieredPolicy,
};
use crate::state_machine::LevelCapabilityResolver;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub policy: PolicyConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://reqflow.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PolicyConfig {
    pub top_authority_level: u8,
    pub levels: Vec<ReviewerLevel>,
    pub strategy: StrategyConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReviewerLevel {
    pub level: u8,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StrategyConfig {
    Tiered { tiers: Vec<TierConfig> },
    ThresholdStacking { thresholds: Vec<ThresholdConfig> },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TierConfig {
    /// Exclusive upper bound; omitted on the final, unbounded tier.
    pub up_to: Option<Decimal>,
    pub levels: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ThresholdConfig {
    /// Inclusive minimum budget at which this level's step is required.
    pub minimum: Decimal,
    pub level: u8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("policy must declare at least one reviewer level")]
    NoReviewerLevels,
    #[error("reviewer level {0} is declared more than once")]
    DuplicateReviewerLevel(u8),
    #[error("top authority level {0} is not among the declared reviewer levels")]
    UnknownTopAuthority(u8),
    #[error("strategy references undeclared reviewer level {0}")]
    UnknownReviewerLevel(u8),
    #[error("tiered strategy needs at least one tier")]
    NoTiers,
    #[error("tier bounds must be strictly increasing (offending bound: {0})")]
    TierBoundsNotIncreasing(Decimal),
    #[error("exactly the last tier must omit `up_to` so the tiers cover every budget")]
    UnboundedTierMisplaced,
    #[error("stacking strategy declares level {0} more than once")]
    DuplicateStackingLevel(u8),
}

impl WorkflowConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&raw)
            .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;
        config.policy.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.policy.validate()?;
        Ok(config)
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels.is_empty() {
            return Err(ConfigError::NoReviewerLevels);
        }

        let mut seen = BTreeMap::new();
        for reviewer in &self.levels {
            if seen.insert(reviewer.level, &reviewer.name).is_some() {
                return Err(ConfigError::DuplicateReviewerLevel(reviewer.level));
            }
        }
        if !seen.contains_key(&self.top_authority_level) {
            return Err(ConfigError::UnknownTopAuthority(self.top_authority_level));
        }

        match &self.strategy {
            StrategyConfig::Tiered { tiers } => {
                if tiers.is_empty() {
                    return Err(ConfigError::NoTiers);
                }
                let mut previous: Option<Decimal> = None;
                for (index, tier) in tiers.iter().enumerate() {
                    match tier.up_to {
                        Some(bound) => {
                            if index == tiers.len() - 1 {
                                return Err(ConfigError::UnboundedTierMisplaced);
                            }
                            if previous.is_some_and(|prev| bound <= prev) {
                                return Err(ConfigError::TierBoundsNotIncreasing(bound));
                            }
                            previous = Some(bound);
                        }
                        None => {
                            if index != tiers.len() - 1 {
                                return Err(ConfigError::UnboundedTierMisplaced);
                            }
                        }
                    }
                    for level in &tier.levels {
                        if !seen.contains_key(level) {
                            return Err(ConfigError::UnknownReviewerLevel(*level));
                        }
                    }
                }
            }
            StrategyConfig::ThresholdStacking { thresholds } => {
                let mut levels_seen = Vec::new();
                for threshold in thresholds {
                    if !seen.contains_key(&threshold.level) {
                        return Err(ConfigError::UnknownReviewerLevel(threshold.level));
                    }
                    if levels_seen.contains(&threshold.level) {
                        return Err(ConfigError::DuplicateStackingLevel(threshold.level));
                    }
                    levels_seen.push(threshold.level);
                }
            }
        }

        Ok(())
    }

    /// Builds the configured planner strategy. Assumes [`Self::validate`]
    /// passed; unknown levels would already have been rejected.
    pub fn build_policy(&self) -> Box<dyn ApprovalPolicy> {
        let name_of = |level: u8| -> String {
            self.levels
                .iter()
                .find(|reviewer| reviewer.level == level)
                .map(|reviewer| reviewer.name.clone())
                .unwrap_or_else(|| format!("level-{level}"))
        };

        match &self.strategy {
            StrategyConfig::Tiered { tiers } => {
                let tiers = tiers
                    .iter()
                    .map(|tier| BudgetTier {
                        upper: tier.up_to,
                        steps: tier
                            .levels
                            .iter()
                            .map(|&level| RequiredStep {
                                reviewer_level: level,
                                reviewer_name: name_of(level),
                            })
                            .collect(),
                    })
                    .collect();
                Box::new(TieredPolicy::new(tiers))
            }
            StrategyConfig::ThresholdStacking { thresholds } => {
                let thresholds = thresholds
                    .iter()
                    .map(|threshold| StackingThreshold {
                        minimum: threshold.minimum,
                        reviewer_level: threshold.level,
                        reviewer_name: name_of(threshold.level),
                    })
                    .collect();
                Box::new(ThresholdStackingPolicy::new(thresholds))
            }
        }
    }

    pub fn capability_resolver(&self) -> LevelCapabilityResolver {
        LevelCapabilityResolver::new(
            self.levels.iter().map(|reviewer| reviewer.level),
            self.top_authority_level,
        )
    }
}
