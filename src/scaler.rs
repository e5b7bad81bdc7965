use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::N_FEATURES;

/// Per-feature standardization fitted on the training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    /// Training-time imputation medians, kept for audit. Serving never imputes.
    pub medians: BTreeMap<String, f64>,
}

impl ScalerState {
    /// Population mean and standard deviation per column. Constant columns get scale 1.
    pub fn fit(x: &Array2<f64>, medians: BTreeMap<String, f64>) -> Self {
        let n = x.ncols();
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n))
            .to_vec();
        let scales = x
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > f64::EPSILON { s } else { 1.0 })
            .collect();
        ScalerState {
            means,
            scales,
            medians,
        }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let means = ArrayView1::from(&self.means[..]);
        let scales = ArrayView1::from(&self.scales[..]);
        (x - &means) / &scales
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn matches_schema(&self) -> bool {
        self.means.len() == N_FEATURES && self.scales.len() == N_FEATURES
    }
}
