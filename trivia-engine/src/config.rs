//! Engine configuration: difficulty model, distractor defaults, slot table.
//!
//! Every field has a serde default so partial JSON overlays work, and
//! `validate` enforces the invariants the builder relies on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_CATEGORY_CAP, DEFAULT_DISTRACTOR_MAX_RANK, EASY_UPPER, ENGINE_VERSION,
    FAMILIARITY_HOUSEHOLD, FAMILIARITY_KNOWN, FAMILIARITY_NICHE, MARGIN_CEILING, MEDIUM_UPPER,
    MONTH_WINDOW, QUARTER_WINDOW, SLOT_COUNT, TARGET_TOLERANCE, TIMING_HISTORY_CAP,
    VALUE_CHOICE_MIN_SEPARATION, WEIGHT_FAMILIARITY, WEIGHT_FORMAT, WEIGHT_MARGIN,
    WEIGHT_VOLATILITY,
};
use crate::slots::{SlotSpec, default_slot_table};

/// Relative weight of each difficulty signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyWeights {
    #[serde(default = "DifficultyWeights::default_format")]
    pub format: f64,
    #[serde(default = "DifficultyWeights::default_familiarity")]
    pub familiarity: f64,
    #[serde(default = "DifficultyWeights::default_margin")]
    pub margin: f64,
    #[serde(default = "DifficultyWeights::default_volatility")]
    pub volatility: f64,
}

impl DifficultyWeights {
    const fn default_format() -> f64 {
        WEIGHT_FORMAT
    }

    const fn default_familiarity() -> f64 {
        WEIGHT_FAMILIARITY
    }

    const fn default_margin() -> f64 {
        WEIGHT_MARGIN
    }

    const fn default_volatility() -> f64 {
        WEIGHT_VOLATILITY
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.format + self.familiarity + self.margin + self.volatility
    }
}

impl Default for DifficultyWeights {
    fn default() -> Self {
        Self {
            format: Self::default_format(),
            familiarity: Self::default_familiarity(),
            margin: Self::default_margin(),
            volatility: Self::default_volatility(),
        }
    }
}

/// Familiarity term per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FamiliarityTerms {
    pub household: f64,
    pub known: f64,
    pub niche: f64,
}

impl Default for FamiliarityTerms {
    fn default() -> Self {
        Self {
            household: FAMILIARITY_HOUSEHOLD,
            known: FAMILIARITY_KNOWN,
            niche: FAMILIARITY_NICHE,
        }
    }
}

/// Difficulty scoring model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyConfig {
    #[serde(default)]
    pub weights: DifficultyWeights,
    #[serde(default)]
    pub familiarity: FamiliarityTerms,
    #[serde(default = "DifficultyConfig::default_margin_ceiling")]
    pub margin_ceiling: f64,
    #[serde(default = "DifficultyConfig::default_easy_upper")]
    pub easy_upper: f64,
    #[serde(default = "DifficultyConfig::default_medium_upper")]
    pub medium_upper: f64,
    #[serde(default = "DifficultyConfig::default_tolerance")]
    pub tolerance: f64,
}

impl DifficultyConfig {
    const fn default_margin_ceiling() -> f64 {
        MARGIN_CEILING
    }

    const fn default_easy_upper() -> f64 {
        EASY_UPPER
    }

    const fn default_medium_upper() -> f64 {
        MEDIUM_UPPER
    }

    const fn default_tolerance() -> f64 {
        TARGET_TOLERANCE
    }

    fn validate(&self) -> Result<(), EngineConfigError> {
        let weights = [
            ("difficulty.weights.format", self.weights.format),
            ("difficulty.weights.familiarity", self.weights.familiarity),
            ("difficulty.weights.margin", self.weights.margin),
            ("difficulty.weights.volatility", self.weights.volatility),
        ];
        for (field, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineConfigError::MinViolation {
                    field,
                    min: 0.0,
                    value,
                });
            }
        }
        if self.weights.total() <= f64::EPSILON {
            return Err(EngineConfigError::ZeroWeights);
        }
        if !(self.margin_ceiling > 0.0 && self.margin_ceiling <= 1.0) {
            return Err(EngineConfigError::RangeViolation {
                field: "difficulty.margin_ceiling",
                min: 0.0,
                max: 1.0,
                value: self.margin_ceiling,
            });
        }
        if !(self.easy_upper > 0.0 && self.easy_upper < self.medium_upper && self.medium_upper < 1.0)
        {
            return Err(EngineConfigError::Thresholds {
                easy: self.easy_upper,
                medium: self.medium_upper,
            });
        }
        if !(0.0..=0.2).contains(&self.tolerance) {
            return Err(EngineConfigError::RangeViolation {
                field: "difficulty.tolerance",
                min: 0.0,
                max: 0.2,
                value: self.tolerance,
            });
        }
        for (field, value) in [
            ("difficulty.familiarity.household", self.familiarity.household),
            ("difficulty.familiarity.known", self.familiarity.known),
            ("difficulty.familiarity.niche", self.familiarity.niche),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineConfigError::RangeViolation {
                    field,
                    min: 0.0,
                    max: 1.0,
                    value,
                });
            }
        }
        Ok(())
    }
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            weights: DifficultyWeights::default(),
            familiarity: FamiliarityTerms::default(),
            margin_ceiling: Self::default_margin_ceiling(),
            easy_upper: Self::default_easy_upper(),
            medium_upper: Self::default_medium_upper(),
            tolerance: Self::default_tolerance(),
        }
    }
}

/// Defaults handed to distractor selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistractorConfig {
    #[serde(default = "DistractorConfig::default_category_cap")]
    pub category_cap: usize,
    #[serde(default = "DistractorConfig::default_value_separation")]
    pub value_separation: f64,
    #[serde(default = "DistractorConfig::default_max_rank")]
    pub max_rank: u32,
    #[serde(default = "DistractorConfig::default_month_window")]
    pub month_window: i32,
    #[serde(default = "DistractorConfig::default_quarter_window")]
    pub quarter_window: i32,
    #[serde(default = "DistractorConfig::default_history_cap")]
    pub history_cap: usize,
}

impl DistractorConfig {
    const fn default_category_cap() -> usize {
        DEFAULT_CATEGORY_CAP
    }

    const fn default_value_separation() -> f64 {
        VALUE_CHOICE_MIN_SEPARATION
    }

    const fn default_max_rank() -> u32 {
        DEFAULT_DISTRACTOR_MAX_RANK
    }

    const fn default_month_window() -> i32 {
        MONTH_WINDOW
    }

    const fn default_quarter_window() -> i32 {
        QUARTER_WINDOW
    }

    const fn default_history_cap() -> usize {
        TIMING_HISTORY_CAP
    }

    fn validate(&self) -> Result<(), EngineConfigError> {
        if self.category_cap == 0 {
            return Err(EngineConfigError::MinViolation {
                field: "distractors.category_cap",
                min: 1.0,
                value: 0.0,
            });
        }
        if !(0.0..1.0).contains(&self.value_separation) {
            return Err(EngineConfigError::RangeViolation {
                field: "distractors.value_separation",
                min: 0.0,
                max: 1.0,
                value: self.value_separation,
            });
        }
        if self.month_window < 1 || self.quarter_window < 1 {
            return Err(EngineConfigError::MinViolation {
                field: "distractors.timing_window",
                min: 1.0,
                value: f64::from(self.month_window.min(self.quarter_window)),
            });
        }
        Ok(())
    }
}

impl Default for DistractorConfig {
    fn default() -> Self {
        Self {
            category_cap: Self::default_category_cap(),
            value_separation: Self::default_value_separation(),
            max_rank: Self::default_max_rank(),
            month_window: Self::default_month_window(),
            quarter_window: Self::default_quarter_window(),
            history_cap: Self::default_history_cap(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub difficulty: DifficultyConfig,
    #[serde(default)]
    pub distractors: DistractorConfig,
    #[serde(default = "default_slot_table")]
    pub slots: Vec<SlotSpec>,
    #[serde(default = "EngineConfig::default_version")]
    pub engine_version: String,
}

impl EngineConfig {
    fn default_version() -> String {
        ENGINE_VERSION.to_string()
    }

    /// Parse a (possibly partial) configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check every invariant the scorer and builder rely on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        self.difficulty.validate()?;
        self.distractors.validate()?;
        if self.slots.len() != SLOT_COUNT {
            return Err(EngineConfigError::SlotCount {
                expected: SLOT_COUNT,
                actual: self.slots.len(),
            });
        }
        for slot in &self.slots {
            if slot.formats.is_empty() {
                return Err(EngineConfigError::SlotWithoutFormats(slot.label.clone()));
            }
        }
        for (idx, slot) in self.slots.iter().enumerate() {
            if self.slots[..idx].iter().any(|prior| prior.label == slot.label) {
                return Err(EngineConfigError::DuplicateSlot(slot.label.clone()));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            difficulty: DifficultyConfig::default(),
            distractors: DistractorConfig::default(),
            slots: default_slot_table(),
            engine_version: Self::default_version(),
        }
    }
}

/// Errors raised when engine configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum EngineConfigError {
    #[error("{field} must be at least {min:.2} (got {value:.2})")]
    MinViolation {
        field: &'static str,
        min: f64,
        value: f64,
    },
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.2})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("difficulty weights sum to zero")]
    ZeroWeights,
    #[error("difficulty thresholds must satisfy 0 < easy ({easy:.2}) < medium ({medium:.2}) < 1")]
    Thresholds { easy: f64, medium: f64 },
    #[error("expected {expected} slots, got {actual}")]
    SlotCount { expected: usize, actual: usize },
    #[error("slot '{0}' allows no formats")]
    SlotWithoutFormats(String),
    #[error("slot label '{0}' appears twice")]
    DuplicateSlot(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.slots.len(), SLOT_COUNT);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = EngineConfig::from_json(r#"{"difficulty": {"tolerance": 0.05}}"#).unwrap();
        assert!((cfg.difficulty.tolerance - 0.05).abs() < f64::EPSILON);
        assert!((cfg.difficulty.weights.format - WEIGHT_FORMAT).abs() < f64::EPSILON);
        assert_eq!(cfg.distractors.category_cap, DEFAULT_CATEGORY_CAP);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn invalid_thresholds_and_weights_are_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.difficulty.easy_upper = 0.7;
        assert!(matches!(
            cfg.validate(),
            Err(EngineConfigError::Thresholds { .. })
        ));

        let mut cfg = EngineConfig::default();
        cfg.difficulty.weights = DifficultyWeights {
            format: 0.0,
            familiarity: 0.0,
            margin: 0.0,
            volatility: 0.0,
        };
        assert_eq!(cfg.validate(), Err(EngineConfigError::ZeroWeights));

        let mut cfg = EngineConfig::default();
        cfg.slots.pop();
        assert_eq!(
            cfg.validate(),
            Err(EngineConfigError::SlotCount {
                expected: SLOT_COUNT,
                actual: SLOT_COUNT - 1
            })
        );
    }
}
