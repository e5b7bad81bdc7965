//! Model, scaler and label map, persisted and loaded as one set.
//!
//! Each file is a MessagePack envelope stamped with the schema fingerprint and
//! a run id derived from the serialized model and scaler. A set only loads
//! when all three stamps agree with each other and with the running schema.

use rmp_serde::{decode::from_read, encode::write_named};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;
use tracing::info;

use crate::config::TrainingConfig;
use crate::error::{Result, RiskError};
use crate::models::{RiskClassifier, TrainedModel};
use crate::scaler::ScalerState;
use crate::schema::{self, LabelMap};
use crate::trainer::Trainer;

pub const MODEL_FILE: &str = "model.msgpack";
pub const SCALER_FILE: &str = "scaler.msgpack";
pub const LABELS_FILE: &str = "labels.msgpack";

#[derive(Deserialize)]
struct Stamped<T> {
    schema: String,
    run_id: String,
    payload: T,
}

#[derive(Serialize)]
struct StampedRef<'a, T> {
    schema: &'a str,
    run_id: &'a str,
    payload: &'a T,
}

/// A trained model with the exact preprocessing it was fitted behind.
pub struct ArtifactSet {
    pub model: TrainedModel,
    pub scaler: ScalerState,
    pub labels: LabelMap,
    run_id: String,
}

impl ArtifactSet {
    pub fn new(model: TrainedModel, scaler: ScalerState, labels: LabelMap) -> Result<Self> {
        let run_id = run_id(&model, &scaler)?;
        Ok(ArtifactSet {
            model,
            scaler,
            labels,
            run_id,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Writes the three artifact files into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let schema = schema::schema_fingerprint();
        write_stamped(&dir.join(MODEL_FILE), &schema, &self.run_id, &self.model)?;
        write_stamped(&dir.join(SCALER_FILE), &schema, &self.run_id, &self.scaler)?;
        write_stamped(&dir.join(LABELS_FILE), &schema, &self.run_id, &self.labels)?;
        info!(
            dir = %dir.display(),
            model = self.model.name(),
            run_id = %self.run_id,
            "saved artifact set"
        );
        Ok(())
    }

    /// Loads a complete set. Any missing file or mismatched stamp is fatal.
    pub fn load(dir: &Path) -> Result<Self> {
        let schema = schema::schema_fingerprint();
        let model: Stamped<TrainedModel> = read_stamped(&dir.join(MODEL_FILE))?;
        let scaler: Stamped<ScalerState> = read_stamped(&dir.join(SCALER_FILE))?;
        let labels: Stamped<LabelMap> = read_stamped(&dir.join(LABELS_FILE))?;

        for (file, stamp) in [
            (MODEL_FILE, &model.schema),
            (SCALER_FILE, &scaler.schema),
            (LABELS_FILE, &labels.schema),
        ] {
            if *stamp != schema {
                return Err(RiskError::ArtifactMismatch {
                    file,
                    reason: "trained against a different feature schema".into(),
                });
            }
        }
        for (file, run) in [(SCALER_FILE, &scaler.run_id), (LABELS_FILE, &labels.run_id)] {
            if *run != model.run_id {
                return Err(RiskError::ArtifactMismatch {
                    file,
                    reason: format!("run {} does not match model run {}", run, model.run_id),
                });
            }
        }
        if !scaler.payload.matches_schema() {
            return Err(RiskError::ArtifactMismatch {
                file: SCALER_FILE,
                reason: format!("scaler has {} features", scaler.payload.n_features()),
            });
        }

        info!(
            dir = %dir.display(),
            model = model.payload.name(),
            run_id = %model.run_id,
            "loaded artifact set"
        );
        Ok(ArtifactSet {
            model: model.payload,
            scaler: scaler.payload,
            labels: labels.payload,
            run_id: model.run_id,
        })
    }

    /// Loads the set in `dir` if it is newer than `csv_path`, otherwise
    /// retrains from the CSV and saves the result first.
    pub fn load_or_train_if_stale(
        dir: &Path,
        csv_path: &Path,
        config: &TrainingConfig,
    ) -> Result<Self> {
        let model_path = dir.join(MODEL_FILE);
        let model_mtime = model_path
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let csv_mtime = csv_path
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let should_retrain = !model_path.exists() || csv_mtime > model_mtime;

        if should_retrain {
            info!(csv = %csv_path.display(), "training (CSV is newer or artifacts missing)");
            let artifacts = Trainer::new(config.clone())
                .train_from_csv(csv_path)?
                .into_artifacts()?;
            artifacts.save(dir)?;
            Ok(artifacts)
        } else {
            Self::load(dir)
        }
    }
}

fn run_id(model: &TrainedModel, scaler: &ScalerState) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(rmp_serde::to_vec_named(model)?);
    hasher.update(rmp_serde::to_vec_named(scaler)?);
    Ok(schema::to_hex(&hasher.finalize()))
}

fn write_stamped<T: Serialize>(path: &Path, schema: &str, run_id: &str, payload: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_named(
        &mut writer,
        &StampedRef {
            schema,
            run_id,
            payload,
        },
    )?;
    writer.flush()?;
    Ok(())
}

fn read_stamped<T: DeserializeOwned>(path: &Path) -> Result<Stamped<T>> {
    if !path.exists() {
        return Err(RiskError::MissingArtifact(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(from_read(reader)?)
}
