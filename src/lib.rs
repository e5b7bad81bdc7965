//! # farm-loan-risk 🌾
//!
//! Estimate farm-loan repayment risk (High / Medium / Low) from ten tabular
//! features using classifiers from the [`linfa`](https://crates.io/crates/linfa) family.
//!
//! Training fits four candidates (logistic regression, decision tree, bagged
//! forest, RBF-kernel SVM) with balanced class weights, keeps the one with the
//! best held-out accuracy, and persists it together with the fitted scaler and
//! the label map as a single stamped artifact set.
//!
//! ## Features
//! - One shared schema for column order and categorical codes
//! - Median imputation and column-name normalization on CSV input
//! - Seeded stratified split, so reruns are reproducible
//! - Probability vector plus optional per-feature importances on prediction
//! - Artifact persistence with `rmp-serde` (MessagePack), checked on load
//! - In-memory prediction history with CSV export
//!
//! ## Example
//! ```no_run
//! use std::path::Path;
//! use farm_loan_risk::{LoanApplication, RiskPredictor, Trainer, TrainingConfig};
//!
//! let artifacts = Trainer::new(TrainingConfig::default())
//!     .train_from_csv(Path::new("data/farm_loan_risk_sample.csv"))?
//!     .into_artifacts()?;
//! artifacts.save(Path::new("artifacts"))?;
//!
//! let predictor = RiskPredictor::new(artifacts);
//! let assessment = predictor.predict(&LoanApplication {
//!     age: 35,
//!     land_size: 5.0,
//!     income: 200_000.0,
//!     loan_amount: 50_000.0,
//!     loan_term: 12,
//!     crop_type: "Rice".into(),
//!     soil_type: "Loamy".into(),
//!     rainfall: 120,
//!     previous_defaults: 0,
//!     market_index: 50.0,
//! })?;
//! println!("{} ({:.1}%)", assessment.label, assessment.confidence() * 100.0);
//! # Ok::<(), farm_loan_risk::RiskError>(())
//! ```

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod history;
pub mod inference;
pub mod models;
pub mod scaler;
pub mod schema;
pub mod trainer;

pub use artifacts::ArtifactSet;
pub use config::{CategoryPolicy, MissingLabel, TrainingConfig};
pub use dataset::LabeledDataset;
pub use encoder::{LoanApplication, encode};
pub use error::{Result, RiskError};
pub use history::{HistoryEntry, PredictionHistory};
pub use inference::{RiskAssessment, RiskLabel, RiskPredictor};
pub use models::{RiskClassifier, TrainedModel};
pub use schema::{CropType, LabelMap, RiskClass, SoilType};
pub use trainer::{Evaluation, Trainer, TrainingOutcome};
