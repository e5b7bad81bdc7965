use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;

use crate::encoder::LoanApplication;
use crate::error::Result;
use crate::inference::RiskAssessment;

pub const HISTORY_HEADER: [&str; 6] = ["Name", "Age", "Crop", "Loan Amount", "Predicted Risk", "Date"];

/// One named prediction, as exported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "Crop")]
    pub crop: String,
    #[serde(rename = "Loan Amount")]
    pub loan_amount: f64,
    #[serde(rename = "Predicted Risk")]
    pub predicted_risk: String,
    #[serde(rename = "Date")]
    pub date: String,
}

/// Append-only log of predictions for the lifetime of the process.
#[derive(Debug, Default)]
pub struct PredictionHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl PredictionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Blank names are not recorded; returns whether it was.
    pub fn record(
        &self,
        name: &str,
        application: &LoanApplication,
        assessment: &RiskAssessment,
    ) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let entry = HistoryEntry {
            name: name.to_string(),
            age: application.age,
            crop: application.crop_type.trim().to_string(),
            loan_amount: application.loan_amount,
            predicted_risk: assessment.label.to_string(),
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        self.entries.lock().push(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    /// Writes the header row, then one row per entry.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(HISTORY_HEADER)?;
        for entry in self.entries.lock().iter() {
            wtr.serialize(entry)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.export_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
