use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RiskError};
use crate::schema::{CropType, DEFAULT_TARGET_COLUMN, N_FEATURES, RiskClass, SoilType};

/// What to do with rows whose target label is empty or unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingLabel {
    High,
    Medium,
    Low,
    Drop,
}

impl MissingLabel {
    /// Class to assign, or `None` when the row should be dropped.
    pub fn class(self) -> Option<RiskClass> {
        match self {
            MissingLabel::High => Some(RiskClass::High),
            MissingLabel::Medium => Some(RiskClass::Medium),
            MissingLabel::Low => Some(RiskClass::Low),
            MissingLabel::Drop => None,
        }
    }
}

/// Training-time handling of categorical values outside the lookup tables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum CategoryPolicy {
    #[default]
    Reject,
    Fallback { crop: CropType, soil: SoilType },
}

/// Trainer settings, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Target column name, after normalization
    pub target_column: String,

    /// Share of each class held out for evaluation
    pub test_ratio: f64,

    /// Seed for the split and the forest bootstrap
    pub seed: u64,

    pub logistic_max_iterations: u64,

    pub tree_max_depth: usize,

    pub forest_trees: usize,

    pub forest_max_depth: usize,

    /// Base SVM penalty, scaled per class by the class weights
    pub svm_c: f64,

    /// Gaussian kernel width; defaults to the feature count
    pub svm_kernel_eps: Option<f64>,

    pub missing_label: MissingLabel,

    pub unknown_category: CategoryPolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_column: DEFAULT_TARGET_COLUMN.to_string(),
            test_ratio: 0.2,
            seed: 42,
            logistic_max_iterations: 1000,
            tree_max_depth: 10,
            forest_trees: 200,
            forest_max_depth: 10,
            svm_c: 1.0,
            svm_kernel_eps: None,
            missing_label: MissingLabel::High,
            unknown_category: CategoryPolicy::Reject,
        }
    }
}

impl TrainingConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TrainingConfig =
            toml::from_str(text).map_err(|e| RiskError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(RiskError::Config(format!(
                "test_ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }
        if self.forest_trees == 0 {
            return Err(RiskError::Config("forest_trees must be at least 1".into()));
        }
        if self.svm_c <= 0.0 || self.svm_kernel_eps.is_some_and(|eps| eps <= 0.0) {
            return Err(RiskError::Config(
                "svm_c and svm_kernel_eps must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn kernel_eps(&self) -> f64 {
        self.svm_kernel_eps.unwrap_or(N_FEATURES as f64)
    }
}
