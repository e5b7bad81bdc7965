//! The one place that defines feature order, categorical codes and risk classes.
//!
//! Both the trainer and the predictor go through [`assemble`], so the column
//! order a model was fitted on is the order it is queried with.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{Result, RiskError};

pub const N_FEATURES: usize = 10;
pub const N_CLASSES: usize = 3;

/// Model input column order.
pub const FEATURE_COLUMNS: [&str; N_FEATURES] = [
    "age",
    "land_size",
    "income",
    "crop_type",
    "loan_amount",
    "loan_term",
    "previous_defaults",
    "rainfall",
    "soil_type",
    "market_index",
];

/// Numeric columns in the order [`NumericFields::to_array`] yields them.
pub const NUMERIC_COLUMNS: [&str; 8] = [
    "age",
    "land_size",
    "income",
    "loan_amount",
    "loan_term",
    "previous_defaults",
    "rainfall",
    "market_index",
];

pub const DEFAULT_TARGET_COLUMN: &str = "label_repaid";

/// Placeholder until a real market feed exists.
pub const DEFAULT_MARKET_INDEX: f64 = 50.0;

pub type FeatureVector = [f64; N_FEATURES];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum CropType {
    Wheat = 0,
    Rice = 1,
    Cotton = 2,
    Sugarcane = 3,
    Maize = 4,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum SoilType {
    Sandy = 0,
    Clay = 1,
    Loamy = 2,
    Black = 3,
    Red = 4,
}

impl CropType {
    pub fn code(self) -> f64 {
        self as u8 as f64
    }

    pub fn parse(value: &str) -> Result<Self> {
        value.trim().parse().map_err(|_| RiskError::UnknownCategory {
            field: "crop_type",
            value: value.to_string(),
        })
    }
}

impl SoilType {
    pub fn code(self) -> f64 {
        self as u8 as f64
    }

    pub fn parse(value: &str) -> Result<Self> {
        value.trim().parse().map_err(|_| RiskError::UnknownCategory {
            field: "soil_type",
            value: value.to_string(),
        })
    }
}

/// Target classes. The discriminant is the class index the models predict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskClass {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl RiskClass {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        RiskClass::iter().find(|c| c.index() == index)
    }

    /// Label as it appears in the training data.
    pub fn label(self) -> &'static str {
        match self {
            RiskClass::High => "High Risk",
            RiskClass::Medium => "Medium Risk",
            RiskClass::Low => "Low Risk",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        RiskClass::iter().find(|c| c.label() == label)
    }
}

/// Numeric half of a record, already imputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericFields {
    pub age: f64,
    pub land_size: f64,
    pub income: f64,
    pub loan_amount: f64,
    pub loan_term: f64,
    pub previous_defaults: f64,
    pub rainfall: f64,
    pub market_index: f64,
}

impl NumericFields {
    pub fn from_array(v: [f64; 8]) -> Self {
        NumericFields {
            age: v[0],
            land_size: v[1],
            income: v[2],
            loan_amount: v[3],
            loan_term: v[4],
            previous_defaults: v[5],
            rainfall: v[6],
            market_index: v[7],
        }
    }
}

/// Lays out one record in [`FEATURE_COLUMNS`] order.
pub fn assemble(n: &NumericFields, crop: CropType, soil: SoilType) -> FeatureVector {
    [
        n.age,
        n.land_size,
        n.income,
        crop.code(),
        n.loan_amount,
        n.loan_term,
        n.previous_defaults,
        n.rainfall,
        soil.code(),
        n.market_index,
    ]
}

/// Lowercases, trims and replaces spaces with underscores.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Maps predicted class indices to display labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMap(BTreeMap<usize, String>);

impl Default for LabelMap {
    fn default() -> Self {
        LabelMap(
            RiskClass::iter()
                .map(|c| (c.index(), c.label().to_string()))
                .collect(),
        )
    }
}

impl LabelMap {
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, String)>) -> Self {
        LabelMap(entries.into_iter().collect())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(&index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// SHA-256 over column order, categorical codes and target encoding.
pub fn schema_fingerprint() -> String {
    let mut hasher = Sha256::new();
    for column in FEATURE_COLUMNS {
        hasher.update(column.as_bytes());
        hasher.update(b",");
    }
    for crop in CropType::iter() {
        hasher.update(format!("crop:{}={};", crop.as_ref(), crop as u8).as_bytes());
    }
    for soil in SoilType::iter() {
        hasher.update(format!("soil:{}={};", soil.as_ref(), soil as u8).as_bytes());
    }
    for class in RiskClass::iter() {
        hasher.update(format!("label:{}={};", class.label(), class.index()).as_bytes());
    }
    to_hex(&hasher.finalize())
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
