use ndarray::{Array1, Array2};
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::artifacts::ArtifactSet;
use crate::config::TrainingConfig;
use crate::dataset::{LabeledDataset, class_counts, stratified_split};
use crate::error::{Result, RiskError};
use crate::models::{
    ForestModel, KernelSvmModel, LogisticModel, RiskClassifier, TrainedModel, TreeModel,
};
use crate::scaler::ScalerState;
use crate::schema::{LabelMap, N_CLASSES, RiskClass};

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Held-out scores of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub accuracy: f64,
    /// `confusion[true][predicted]`
    pub confusion: [[usize; N_CLASSES]; N_CLASSES],
    pub per_class: [ClassMetrics; N_CLASSES],
}

impl Evaluation {
    pub fn from_predictions(y_true: &Array1<usize>, y_pred: &[usize]) -> Self {
        let mut confusion = [[0; N_CLASSES]; N_CLASSES];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t < N_CLASSES && p < N_CLASSES {
                confusion[t][p] += 1;
            }
        }

        let total = y_true.len();
        let correct: usize = (0..N_CLASSES).map(|c| confusion[c][c]).sum();
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };

        let per_class = std::array::from_fn(|c| {
            let tp = confusion[c][c];
            let predicted: usize = (0..N_CLASSES).map(|t| confusion[t][c]).sum();
            let support: usize = confusion[c].iter().sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            let f1_score = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                precision,
                recall,
                f1_score,
                support,
            }
        });

        Evaluation {
            accuracy,
            confusion,
            per_class,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "accuracy: {:.4}", self.accuracy)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for (c, m) in self.per_class.iter().enumerate() {
            let label = RiskClass::from_index(c).map_or("?", RiskClass::label);
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        writeln!(f, "confusion matrix (rows = true, cols = predicted):")?;
        for row in &self.confusion {
            writeln!(f, "  {:?}", row)?;
        }
        Ok(())
    }
}

/// A fitted model with its held-out evaluation.
pub struct Candidate {
    pub model: TrainedModel,
    pub evaluation: Evaluation,
}

/// Everything one training run produced.
pub struct TrainingOutcome {
    pub candidates: Vec<Candidate>,
    pub best: usize,
    pub scaler: ScalerState,
    pub labels: LabelMap,
}

impl TrainingOutcome {
    pub fn best(&self) -> &Candidate {
        &self.candidates[self.best]
    }

    /// The artifact set built from the winning candidate.
    pub fn into_artifacts(self) -> Result<ArtifactSet> {
        let best = self.best;
        self.into_candidate_artifacts(best)
    }

    /// The artifact set built from any candidate, by position in training order.
    pub fn into_candidate_artifacts(mut self, index: usize) -> Result<ArtifactSet> {
        if index >= self.candidates.len() {
            return Err(RiskError::Config(format!("no candidate at index {index}")));
        }
        let candidate = self.candidates.swap_remove(index);
        ArtifactSet::new(candidate.model, self.scaler, self.labels)
    }
}

/// Fits every candidate and selects the best by held-out accuracy.
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Trainer { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train_from_csv(&self, path: &Path) -> Result<TrainingOutcome> {
        info!(path = %path.display(), "loading training data");
        let data = LabeledDataset::from_csv(path, &self.config)?;
        self.train(&data)
    }

    pub fn train(&self, data: &LabeledDataset) -> Result<TrainingOutcome> {
        self.config.validate()?;
        if data.is_empty() {
            return Err(RiskError::EmptyDataset);
        }

        let split = stratified_split(&data.labels, self.config.test_ratio, self.config.seed);
        let (x_train, y_train) = data.subset(&split.train);
        let (x_test, y_test) = data.subset(&split.test);

        let present = class_counts(&y_train).iter().filter(|&&c| c > 0).count();
        if present < 2 {
            return Err(RiskError::InsufficientClasses(present));
        }
        info!(
            train = split.train.len(),
            test = split.test.len(),
            seed = self.config.seed,
            "stratified split"
        );

        let scaler = ScalerState::fit(&x_train, data.medians.clone());
        let x_train = scaler.transform(&x_train);
        let x_test = scaler.transform(&x_test);

        let mut candidates = Vec::new();
        for model in self.fit_candidates(&x_train, &y_train)? {
            let evaluation = Evaluation::from_predictions(&y_test, &model.predict(&x_test));
            info!(
                model = model.name(),
                accuracy = evaluation.accuracy,
                "evaluated candidate"
            );
            candidates.push(Candidate { model, evaluation });
        }

        let best = select_best(&candidates);
        info!(
            model = candidates[best].model.name(),
            accuracy = candidates[best].evaluation.accuracy,
            "selected best model"
        );

        Ok(TrainingOutcome {
            candidates,
            best,
            scaler,
            labels: LabelMap::default(),
        })
    }

    /// Fits the candidates in their fixed order on already scaled data.
    pub fn fit_candidates(
        &self,
        x: &Array2<f64>,
        y: &Array1<usize>,
    ) -> Result<Vec<TrainedModel>> {
        let c = &self.config;
        Ok(vec![
            TrainedModel::Logistic(LogisticModel::fit(x, y, c.logistic_max_iterations)?),
            TrainedModel::DecisionTree(TreeModel::fit(x, y, c.tree_max_depth)?),
            TrainedModel::RandomForest(ForestModel::fit(
                x,
                y,
                c.forest_trees,
                c.forest_max_depth,
                c.seed,
            )?),
            TrainedModel::KernelSvm(KernelSvmModel::fit(x, y, c.svm_c, c.kernel_eps())?),
        ])
    }
}

/// Highest accuracy; the earlier candidate keeps the spot on ties.
fn select_best(candidates: &[Candidate]) -> usize {
    let mut best = 0;
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.evaluation.accuracy > candidates[best].evaluation.accuracy {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn evaluation_matches_hand_count() {
        let y_true = array![0, 0, 1, 1, 2, 2];
        let y_pred = [0, 1, 1, 1, 2, 0];
        let eval = Evaluation::from_predictions(&y_true, &y_pred);
        assert!((eval.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(eval.confusion[0], [1, 1, 0]);
        assert_eq!(eval.confusion[2], [1, 0, 1]);
        assert!((eval.per_class[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(eval.per_class[1].recall, 1.0);
        assert_eq!(eval.per_class[2].support, 2);
        assert!(eval.to_string().contains("Medium Risk"));
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let x = array![[0.0], [1.0], [0.1], [0.9]];
        let y = array![0, 1, 0, 1];
        let eval = |acc: f64| Evaluation {
            accuracy: acc,
            ..Evaluation::from_predictions(&y, &[0, 1, 0, 1])
        };
        let candidates = vec![
            Candidate {
                model: TrainedModel::DecisionTree(TreeModel::fit(&x, &y, 2).unwrap()),
                evaluation: eval(0.75),
            },
            Candidate {
                model: TrainedModel::DecisionTree(TreeModel::fit(&x, &y, 2).unwrap()),
                evaluation: eval(0.9),
            },
            Candidate {
                model: TrainedModel::DecisionTree(TreeModel::fit(&x, &y, 2).unwrap()),
                evaluation: eval(0.9),
            },
        ];
        assert_eq!(select_best(&candidates), 1);
    }
}
