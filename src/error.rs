use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading data, training, persisting, or predicting.
#[derive(Error, Debug)]
pub enum RiskError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Required columns absent from the training CSV
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A categorical value outside the closed lookup table
    #[error("unknown {field} category: {value:?}")]
    UnknownCategory { field: &'static str, value: String },

    /// A numeric column with no parseable value at all
    #[error("column {0} has no numeric values to impute from")]
    EmptyColumn(String),

    /// No usable rows after loading
    #[error("dataset has no usable rows")]
    EmptyDataset,

    /// Loan application outside the accepted ranges
    #[error("invalid loan application: {0}")]
    InvalidApplication(#[from] validator::ValidationErrors),

    /// Training split carries fewer than two classes
    #[error("training split has {0} class(es), need at least two")]
    InsufficientClasses(usize),

    /// Candidate model failed to fit
    #[error("failed to train {model}: {message}")]
    Training { model: &'static str, message: String },

    /// Matrix construction errors
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Artifact serialization errors
    #[error("failed to encode artifact: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Artifact deserialization errors
    #[error("failed to decode artifact: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// An artifact file the set requires is absent
    #[error("missing artifact file: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// Artifacts from different runs or a different schema
    #[error("artifact mismatch in {file}: {reason}")]
    ArtifactMismatch { file: &'static str, reason: String },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RiskError>;
