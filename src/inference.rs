use ndarray::Array2;
use serde::Serialize;
use std::fmt;
use tracing::debug;
use validator::Validate;

use crate::artifacts::ArtifactSet;
use crate::encoder::{self, LoanApplication};
use crate::error::Result;
use crate::models::{RiskClassifier, argmax, normalize_rows};
use crate::schema::{FEATURE_COLUMNS, N_CLASSES, N_FEATURES};

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Display label of a predicted class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RiskLabel {
    Known(String),
    Unknown,
}

impl RiskLabel {
    pub fn as_str(&self) -> &str {
        match self {
            RiskLabel::Known(label) => label,
            RiskLabel::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring one application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub class_index: usize,
    pub label: RiskLabel,
    pub probabilities: [f64; N_CLASSES],
    /// `(feature, importance)` pairs, when the model supports them.
    pub feature_importance: Option<Vec<(&'static str, f64)>>,
}

impl RiskAssessment {
    pub fn confidence(&self) -> f64 {
        self.probabilities[self.class_index]
    }
}

/// Scores applications against one immutable artifact set.
pub struct RiskPredictor {
    artifacts: ArtifactSet,
}

impl RiskPredictor {
    pub fn new(artifacts: ArtifactSet) -> Self {
        RiskPredictor { artifacts }
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    pub fn model_name(&self) -> &'static str {
        self.artifacts.model.name()
    }

    pub fn predict(&self, application: &LoanApplication) -> Result<RiskAssessment> {
        application.validate()?;
        let features = encoder::encode(application)?;
        let x = Array2::from_shape_vec((1, N_FEATURES), features.to_vec())?;
        let scaled = self.artifacts.scaler.transform(&x);

        let mut proba = self.artifacts.model.predict_proba(&scaled);
        normalize_rows(&mut proba);
        let row = proba.row(0);
        let class_index = argmax(row);

        let mut probabilities = [0.0; N_CLASSES];
        for (slot, &p) in probabilities.iter_mut().zip(row.iter()) {
            *slot = p;
        }

        let label = self.resolve_label(class_index);
        debug!(class_index, label = %label, ?probabilities, "scored application");

        Ok(RiskAssessment {
            class_index,
            label,
            probabilities,
            feature_importance: self.feature_importance(),
        })
    }

    pub fn resolve_label(&self, class_index: usize) -> RiskLabel {
        self.artifacts
            .labels
            .get(class_index)
            .map_or(RiskLabel::Unknown, |label| RiskLabel::Known(label.to_string()))
    }

    fn feature_importance(&self) -> Option<Vec<(&'static str, f64)>> {
        let importance = self.artifacts.model.feature_importance()?;
        (importance.len() == N_FEATURES)
            .then(|| FEATURE_COLUMNS.iter().copied().zip(importance).collect())
    }
}
