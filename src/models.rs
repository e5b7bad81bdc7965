//! Candidate classifiers. Each one outputs a probability for all three risk
//! classes and compensates class imbalance with balanced inverse-frequency
//! weights `n / (K * n_k)`.

use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::{MultiFittedLogisticRegression, MultiLogisticRegression};
use linfa_svm::{Svm, SvmError};
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::class_counts;
use crate::error::{Result, RiskError};
use crate::schema::N_CLASSES;

pub const LOGISTIC_REGRESSION: &str = "Logistic Regression";
pub const DECISION_TREE: &str = "Decision Tree";
pub const RANDOM_FOREST: &str = "Random Forest";
pub const KERNEL_SVM: &str = "SVM";

/// Common surface of every candidate model.
pub trait RiskClassifier {
    fn name(&self) -> &'static str;

    /// One row per sample, one column per class index. Rows sum to 1.
    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64>;

    /// Relative importance per feature, when the model has a notion of it.
    fn feature_importance(&self) -> Option<Vec<f64>> {
        None
    }

    fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        self.predict_proba(x)
            .rows()
            .into_iter()
            .map(argmax)
            .collect()
    }
}

/// Index of the largest value; the lowest index wins ties.
pub fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &p) in row.iter().enumerate() {
        if p > row[best] {
            best = i;
        }
    }
    best
}

/// Balanced weights; classes absent from `labels` get 0.
pub fn balanced_class_weights(labels: &Array1<usize>) -> [f64; N_CLASSES] {
    let counts = class_counts(labels);
    let present = counts.iter().filter(|&&c| c > 0).count() as f64;
    let n = labels.len() as f64;
    counts.map(|c| if c == 0 { 0.0 } else { n / (present * c as f64) })
}

fn sample_weights(labels: &Array1<usize>, class_weights: &[f64; N_CLASSES]) -> Array1<f32> {
    labels.mapv(|l| class_weights.get(l).copied().unwrap_or(0.0) as f32)
}

/// Rescales every row of non-negative scores to sum to 1.
///
/// Negative and non-finite entries count as 0. A row with no mass becomes
/// uniform.
pub fn normalize_rows(proba: &mut Array2<f64>) {
    for mut row in proba.rows_mut() {
        row.mapv_inplace(|p| if p.is_finite() { p.max(0.0) } else { 0.0 });
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        } else {
            row.fill(1.0 / row.len() as f64);
        }
    }
}

fn one_hot(predictions: &Array1<usize>) -> Array2<f64> {
    let mut proba = Array2::zeros((predictions.len(), N_CLASSES));
    for (i, &class) in predictions.iter().enumerate() {
        if class < N_CLASSES {
            proba[[i, class]] = 1.0;
        }
    }
    proba
}

/// Multinomial logistic regression.
///
/// The solver has no sample weights, so the imbalance correction is applied
/// to its posteriors: each class probability is scaled by the class weight
/// and the row renormalized, which shifts every logit by `log w_k`.
#[derive(Serialize, Deserialize)]
pub struct LogisticModel {
    fitted: MultiFittedLogisticRegression<f64, usize>,
    class_weights: [f64; N_CLASSES],
}

impl LogisticModel {
    pub fn fit(x: &Array2<f64>, y: &Array1<usize>, max_iterations: u64) -> Result<Self> {
        let dataset = Dataset::new(x.clone(), y.clone());
        let fitted = MultiLogisticRegression::default()
            .max_iterations(max_iterations)
            .fit(&dataset)
            .map_err(|e: linfa_logistic::error::Error| RiskError::Training {
                model: LOGISTIC_REGRESSION,
                message: e.to_string(),
            })?;
        Ok(LogisticModel {
            fitted,
            class_weights: balanced_class_weights(y),
        })
    }
}

impl RiskClassifier for LogisticModel {
    fn name(&self) -> &'static str {
        LOGISTIC_REGRESSION
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let raw = self.fitted.predict_probabilities(x);
        let mut proba = Array2::zeros((x.nrows(), N_CLASSES));
        for (col, &class) in self.fitted.classes().iter().enumerate() {
            if class < N_CLASSES {
                let weighted = &raw.column(col) * self.class_weights[class];
                proba.column_mut(class).assign(&weighted);
            }
        }
        normalize_rows(&mut proba);
        proba
    }
}

fn fit_tree(
    x: Array2<f64>,
    y: Array1<usize>,
    weights: Array1<f32>,
    max_depth: usize,
    model: &'static str,
) -> Result<DecisionTree<f64, usize>> {
    let dataset = Dataset::new(x, y).with_weights(weights);
    DecisionTree::<f64, usize>::params()
        .max_depth(Some(max_depth))
        .fit(&dataset)
        .map_err(|e: linfa::Error| RiskError::Training {
            model,
            message: e.to_string(),
        })
}

/// Single CART tree trained with per-sample class weights.
#[derive(Serialize, Deserialize)]
pub struct TreeModel {
    tree: DecisionTree<f64, usize>,
}

impl TreeModel {
    pub fn fit(x: &Array2<f64>, y: &Array1<usize>, max_depth: usize) -> Result<Self> {
        let weights = sample_weights(y, &balanced_class_weights(y));
        let tree = fit_tree(x.clone(), y.clone(), weights, max_depth, DECISION_TREE)?;
        Ok(TreeModel { tree })
    }
}

impl RiskClassifier for TreeModel {
    fn name(&self) -> &'static str {
        DECISION_TREE
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        one_hot(&self.tree.predict(x))
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        Some(self.tree.feature_importance())
    }
}

/// Bagged trees; probabilities are vote shares.
#[derive(Serialize, Deserialize)]
pub struct ForestModel {
    trees: Vec<DecisionTree<f64, usize>>,
}

impl ForestModel {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_trees: usize,
        max_depth: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let class_weights = balanced_class_weights(y);
        let n = x.nrows();
        let mut trees = Vec::with_capacity(n_trees);

        for _ in 0..n_trees {
            let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let yb = y.select(Axis(0), &sample);
            let weights = sample_weights(&yb, &class_weights);
            trees.push(fit_tree(
                x.select(Axis(0), &sample),
                yb,
                weights,
                max_depth,
                RANDOM_FOREST,
            )?);
        }
        debug!(trees = trees.len(), "fitted forest");
        Ok(ForestModel { trees })
    }
}

impl RiskClassifier for ForestModel {
    fn name(&self) -> &'static str {
        RANDOM_FOREST
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut shares = Array2::zeros((x.nrows(), N_CLASSES));
        for tree in &self.trees {
            shares += &one_hot(&tree.predict(x));
        }
        shares /= self.trees.len().max(1) as f64;
        normalize_rows(&mut shares);
        shares
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        let first = self.trees.first()?;
        let mut total = vec![0.0; first.feature_importance().len()];
        for tree in &self.trees {
            for (sum, v) in total.iter_mut().zip(tree.feature_importance()) {
                *sum += v;
            }
        }
        let norm: f64 = total.iter().sum();
        if norm > 0.0 {
            total.iter_mut().for_each(|v| *v /= norm);
        }
        Some(total)
    }
}

/// One-vs-rest member: `f(x) = sum(alpha_i * k(s_i, x)) - rho`, mapped to a
/// probability by a Platt sigmoid fitted on the training decision values.
#[derive(Serialize, Deserialize)]
struct BinarySvm {
    class: usize,
    alpha: Vec<f64>,
    support: Array2<f64>,
    rho: f64,
    platt_a: f64,
    platt_b: f64,
}

impl BinarySvm {
    fn decision(&self, x: ArrayView1<f64>, eps: f64) -> f64 {
        let mut sum = 0.0;
        for (alpha, s) in self.alpha.iter().zip(self.support.rows()) {
            let sq_dist: f64 = s.iter().zip(x.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
            sum += alpha * (-sq_dist / eps).exp();
        }
        sum - self.rho
    }

    fn probability(&self, x: ArrayView1<f64>, eps: f64) -> f64 {
        sigmoid_positive(self.decision(x, eps) * self.platt_a + self.platt_b)
    }
}

/// `1 / (1 + exp(z))` without overflow.
fn sigmoid_positive(z: f64) -> f64 {
    if z >= 0.0 {
        let e = (-z).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + z.exp())
    }
}

/// Fits `P(y=1|f) = 1 / (1 + exp(A f + B))` by Newton's method with
/// backtracking, using Platt's smoothed targets.
fn fit_platt(decisions: &[f64], targets: &[bool]) -> (f64, f64) {
    let prior1 = targets.iter().filter(|&&t| t).count() as f64;
    let prior0 = targets.len() as f64 - prior1;
    let hi = (prior1 + 1.0) / (prior1 + 2.0);
    let lo = 1.0 / (prior0 + 2.0);
    let t: Vec<f64> = targets.iter().map(|&y| if y { hi } else { lo }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decisions
            .iter()
            .zip(&t)
            .map(|(&f, &ti)| {
                let z = f * a + b;
                if z >= 0.0 {
                    ti * z + (1.0 + (-z).exp()).ln()
                } else {
                    (ti - 1.0) * z + (1.0 + z.exp()).ln()
                }
            })
            .sum()
    };

    let (mut a, mut b) = (0.0, ((prior0 + 1.0) / (prior1 + 1.0)).ln());
    let mut fval = objective(a, b);
    const SIGMA: f64 = 1e-12;

    for _ in 0..100 {
        let (mut h11, mut h22, mut h21, mut g1, mut g2) = (SIGMA, SIGMA, 0.0, 0.0, 0.0);
        for (&f, &ti) in decisions.iter().zip(&t) {
            let p = sigmoid_positive(f * a + b);
            let q = 1.0 - p;
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = ti - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= 1e-10 {
            let (na, nb) = (a + step * da, b + step * db);
            let nf = objective(na, nb);
            if nf < fval + 1e-4 * step * gd {
                a = na;
                b = nb;
                fval = nf;
                break;
            }
            step /= 2.0;
        }
        if step < 1e-10 {
            break;
        }
    }
    (a, b)
}

/// RBF-kernel SVM, one-vs-rest over the risk classes.
#[derive(Serialize, Deserialize)]
pub struct KernelSvmModel {
    eps: f64,
    machines: Vec<BinarySvm>,
}

impl KernelSvmModel {
    /// `eps` is the Gaussian kernel width: `k(a, b) = exp(-|a - b|^2 / eps)`.
    pub fn fit(x: &Array2<f64>, y: &Array1<usize>, c: f64, eps: f64) -> Result<Self> {
        let n = y.len() as f64;
        let counts = class_counts(y);
        let mut machines = Vec::new();

        for (class, &n_pos) in counts.iter().enumerate() {
            if n_pos == 0 || n_pos == y.len() {
                continue;
            }
            let n_neg = y.len() - n_pos;
            let targets = y.mapv(|l| l == class);
            let w_pos = n / (2.0 * n_pos as f64);
            let w_neg = n / (2.0 * n_neg as f64);

            let dataset = Dataset::new(x.clone(), targets.clone());
            let svm: Svm<f64, bool> = Svm::<f64, bool>::params()
                .pos_neg_weights(c * w_pos, c * w_neg)
                .gaussian_kernel(eps)
                .fit(&dataset)
                .map_err(|e: SvmError| RiskError::Training {
                    model: KERNEL_SVM,
                    message: e.to_string(),
                })?;

            if svm.alpha.len() != x.nrows() {
                return Err(RiskError::Training {
                    model: KERNEL_SVM,
                    message: format!(
                        "expected {} dual coefficients, got {}",
                        x.nrows(),
                        svm.alpha.len()
                    ),
                });
            }

            let support_idx: Vec<usize> = svm
                .alpha
                .iter()
                .enumerate()
                .filter(|(_, a)| a.abs() > 0.0)
                .map(|(i, _)| i)
                .collect();
            let mut machine = BinarySvm {
                class,
                alpha: support_idx.iter().map(|&i| svm.alpha[i]).collect(),
                support: x.select(Axis(0), &support_idx),
                rho: svm.rho,
                platt_a: 0.0,
                platt_b: 0.0,
            };

            let decisions: Vec<f64> = x.rows().into_iter().map(|r| machine.decision(r, eps)).collect();
            let (a, b) = fit_platt(&decisions, &targets.to_vec());
            machine.platt_a = a;
            machine.platt_b = b;
            debug!(
                class,
                support_vectors = support_idx.len(),
                platt_a = a,
                platt_b = b,
                "fitted one-vs-rest svm"
            );
            machines.push(machine);
        }

        Ok(KernelSvmModel { eps, machines })
    }
}

impl RiskClassifier for KernelSvmModel {
    fn name(&self) -> &'static str {
        KERNEL_SVM
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut proba = Array2::zeros((x.nrows(), N_CLASSES));
        for (i, row) in x.rows().into_iter().enumerate() {
            for machine in &self.machines {
                proba[[i, machine.class]] = machine.probability(row, self.eps);
            }
        }
        normalize_rows(&mut proba);
        proba
    }
}

/// The persisted form of whichever candidate won.
#[derive(Serialize, Deserialize)]
pub enum TrainedModel {
    Logistic(LogisticModel),
    DecisionTree(TreeModel),
    RandomForest(ForestModel),
    KernelSvm(KernelSvmModel),
}

impl TrainedModel {
    fn inner(&self) -> &dyn RiskClassifier {
        match self {
            TrainedModel::Logistic(m) => m,
            TrainedModel::DecisionTree(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::KernelSvm(m) => m,
        }
    }
}

impl RiskClassifier for TrainedModel {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        self.inner().predict_proba(x)
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        self.inner().feature_importance()
    }
}
