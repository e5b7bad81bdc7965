use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{CategoryPolicy, TrainingConfig};
use crate::error::{Result, RiskError};
use crate::schema::{
    self, CropType, N_CLASSES, N_FEATURES, NUMERIC_COLUMNS, NumericFields, RiskClass, SoilType,
};

/// Encoded training data: one feature row and one class index per record.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub features: Array2<f64>,
    pub labels: Array1<usize>,
    /// Median used to fill missing cells, per numeric column.
    pub medians: BTreeMap<String, f64>,
}

/// Row indices of a train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

struct RawRow {
    numeric: [Option<f64>; 8],
    crop: CropType,
    soil: SoilType,
    class: RiskClass,
}

struct ColumnIndex {
    numeric: [usize; 8],
    crop: usize,
    soil: usize,
    target: usize,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord, target_column: &str) -> Result<Self> {
        let names: Vec<String> = headers.iter().map(schema::normalize_column_name).collect();
        let mut missing = Vec::new();
        let mut find = |column: &str| match names.iter().position(|n| n == column) {
            Some(i) => i,
            None => {
                missing.push(column.to_string());
                usize::MAX
            }
        };

        let mut numeric = [0; 8];
        for (slot, column) in numeric.iter_mut().zip(NUMERIC_COLUMNS) {
            *slot = find(column);
        }
        let crop = find("crop_type");
        let soil = find("soil_type");
        let target = find(&schema::normalize_column_name(target_column));

        if !missing.is_empty() {
            return Err(RiskError::MissingColumns(missing));
        }
        Ok(ColumnIndex {
            numeric,
            crop,
            soil,
            target,
        })
    }
}

impl LabeledDataset {
    /// Loads and encodes a training CSV.
    pub fn from_csv(path: &Path, config: &TrainingConfig) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, config)
    }

    pub fn from_reader<R: Read>(reader: R, config: &TrainingConfig) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let columns = ColumnIndex::resolve(rdr.headers()?, &config.target_column)?;

        let mut rows = Vec::new();
        let mut defaulted_labels = 0usize;
        let mut dropped = 0usize;

        for record in rdr.records() {
            let record = record?;
            let cell = |i: usize| record.get(i).unwrap_or("");

            let class = match RiskClass::from_label(cell(columns.target)) {
                Some(class) => class,
                None => match config.missing_label.class() {
                    Some(class) => {
                        defaulted_labels += 1;
                        class
                    }
                    None => {
                        dropped += 1;
                        continue;
                    }
                },
            };

            let (crop, soil) = resolve_categories(
                cell(columns.crop),
                cell(columns.soil),
                config.unknown_category,
            )?;

            let mut numeric = [None; 8];
            for (slot, &i) in numeric.iter_mut().zip(&columns.numeric) {
                *slot = cell(i).parse::<f64>().ok().filter(|v| v.is_finite());
            }
            rows.push(RawRow {
                numeric,
                crop,
                soil,
                class,
            });
        }

        if defaulted_labels > 0 {
            warn!(
                rows = defaulted_labels,
                policy = ?config.missing_label,
                "assigned default class to rows with missing or unknown labels"
            );
        }
        if dropped > 0 {
            warn!(rows = dropped, "dropped rows with missing or unknown labels");
        }
        if rows.is_empty() {
            return Err(RiskError::EmptyDataset);
        }

        let medians = column_medians(&rows)?;
        let mut features = Array2::zeros((rows.len(), N_FEATURES));
        let mut labels = Array1::zeros(rows.len());
        let mut imputed = 0usize;

        for (i, row) in rows.iter().enumerate() {
            let mut values = [0.0; 8];
            for (c, value) in values.iter_mut().enumerate() {
                *value = row.numeric[c].unwrap_or_else(|| {
                    imputed += 1;
                    medians[c]
                });
            }
            let encoded = schema::assemble(&NumericFields::from_array(values), row.crop, row.soil);
            features.row_mut(i).assign(&Array1::from(encoded.to_vec()));
            labels[i] = row.class.index();
        }

        if imputed > 0 {
            warn!(cells = imputed, "imputed missing numeric cells with column medians");
        }

        let dataset = LabeledDataset {
            features,
            labels,
            medians: NUMERIC_COLUMNS
                .iter()
                .zip(medians)
                .map(|(name, m)| (name.to_string(), m))
                .collect(),
        };

        let counts = dataset.class_counts();
        info!(rows = dataset.len(), columns = N_FEATURES, "loaded dataset");
        for class in [RiskClass::High, RiskClass::Medium, RiskClass::Low] {
            let n = counts[class.index()];
            info!(
                class = class.label(),
                count = n,
                share = n as f64 / dataset.len() as f64,
                "class distribution"
            );
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn class_counts(&self) -> [usize; N_CLASSES] {
        class_counts(&self.labels)
    }

    /// Rows and labels at the given indices, in that order.
    pub fn subset(&self, indices: &[usize]) -> (Array2<f64>, Array1<usize>) {
        (
            self.features.select(Axis(0), indices),
            self.labels.select(Axis(0), indices),
        )
    }
}

fn resolve_categories(
    crop: &str,
    soil: &str,
    policy: CategoryPolicy,
) -> Result<(CropType, SoilType)> {
    match policy {
        CategoryPolicy::Reject => Ok((CropType::parse(crop)?, SoilType::parse(soil)?)),
        CategoryPolicy::Fallback {
            crop: crop_default,
            soil: soil_default,
        } => {
            let crop = CropType::parse(crop).unwrap_or_else(|_| {
                debug!(value = crop, fallback = %crop_default, "unknown crop type");
                crop_default
            });
            let soil = SoilType::parse(soil).unwrap_or_else(|_| {
                debug!(value = soil, fallback = %soil_default, "unknown soil type");
                soil_default
            });
            Ok((crop, soil))
        }
    }
}

fn column_medians(rows: &[RawRow]) -> Result<[f64; 8]> {
    let mut medians = [0.0; 8];
    for (c, median) in medians.iter_mut().enumerate() {
        let mut values: Vec<f64> = rows.iter().filter_map(|r| r.numeric[c]).collect();
        if values.is_empty() {
            return Err(RiskError::EmptyColumn(NUMERIC_COLUMNS[c].to_string()));
        }
        values.sort_by(f64::total_cmp);
        let mid = values.len() / 2;
        *median = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };
    }
    Ok(medians)
}

pub fn class_counts(labels: &Array1<usize>) -> [usize; N_CLASSES] {
    let mut counts = [0; N_CLASSES];
    for &label in labels {
        if label < N_CLASSES {
            counts[label] += 1;
        }
    }
    counts
}

/// Seeded split that holds out `round(n_c * test_ratio)` rows of every class.
///
/// Both index lists come back sorted so the partition does not depend on
/// shuffle order.
pub fn stratified_split(labels: &Array1<usize>, test_ratio: f64, seed: u64) -> DatasetSplit {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        let test_size = ((indices.len() as f64) * test_ratio).round() as usize;
        test.extend_from_slice(&indices[..test_size]);
        train.extend_from_slice(&indices[test_size..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    DatasetSplit { train, test }
}
