use farm_loan_risk::artifacts::{LABELS_FILE, MODEL_FILE, SCALER_FILE};
use farm_loan_risk::models::{LOGISTIC_REGRESSION, RANDOM_FOREST};
use farm_loan_risk::schema::{DEFAULT_MARKET_INDEX, FEATURE_COLUMNS};
use farm_loan_risk::{
    ArtifactSet, LabelMap, LabeledDataset, LoanApplication, PredictionHistory, RiskClassifier,
    RiskError, RiskLabel, RiskPredictor, Trainer, TrainingConfig, TrainingOutcome,
};
use std::path::{Path, PathBuf};

fn sample_csv() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data/farm_loan_risk_sample.csv")
}

fn config() -> TrainingConfig {
    TrainingConfig {
        forest_trees: 25,
        ..TrainingConfig::default()
    }
}

fn train() -> TrainingOutcome {
    Trainer::new(config()).train_from_csv(&sample_csv()).unwrap()
}

fn borderline() -> LoanApplication {
    LoanApplication {
        age: 65,
        land_size: 0.5,
        income: 50_000.0,
        loan_amount: 400_000.0,
        loan_term: 12,
        crop_type: "Wheat".into(),
        soil_type: "Sandy".into(),
        rainfall: 120,
        previous_defaults: 4,
        market_index: DEFAULT_MARKET_INDEX,
    }
}

fn applications() -> Vec<LoanApplication> {
    let crops = ["Wheat", "Rice", "Cotton", "Sugarcane", "Maize"];
    let soils = ["Sandy", "Clay", "Loamy", "Black", "Red"];
    (0..25u32)
        .map(|i| LoanApplication {
            age: 18 + i * 2,
            land_size: 0.5 + i as f64,
            income: 30_000.0 + i as f64 * 35_000.0,
            loan_amount: 600_000.0 - i as f64 * 20_000.0,
            loan_term: 3 + i * 2,
            crop_type: crops[(i % 5) as usize].into(),
            soil_type: soils[(i / 5) as usize].into(),
            rainfall: i * 20,
            previous_defaults: i % 6,
            market_index: DEFAULT_MARKET_INDEX,
        })
        .chain(std::iter::once(borderline()))
        .collect()
}

#[test]
fn trains_all_candidates_in_order() {
    let outcome = train();
    let names: Vec<_> = outcome.candidates.iter().map(|c| c.model.name()).collect();
    assert_eq!(
        names,
        vec![LOGISTIC_REGRESSION, "Decision Tree", RANDOM_FOREST, "SVM"]
    );
    for candidate in &outcome.candidates {
        let acc = candidate.evaluation.accuracy;
        assert!((0.0..=1.0).contains(&acc));
        assert!(acc <= outcome.best().evaluation.accuracy);
    }
    // 360 rows, stratified 20% hold-out
    let support: usize = outcome.best().evaluation.per_class.iter().map(|m| m.support).sum();
    assert_eq!(support, 72);
    assert_eq!(outcome.scaler.means.len(), FEATURE_COLUMNS.len());
    assert_eq!(outcome.labels, LabelMap::default());
}

#[test]
fn training_is_deterministic() {
    let first = train();
    let second = train();
    assert_eq!(first.scaler, second.scaler);
    assert_eq!(
        rmp_serde::to_vec_named(&first.scaler).unwrap(),
        rmp_serde::to_vec_named(&second.scaler).unwrap()
    );
    assert_eq!(first.best, second.best);
    assert_eq!(first.best().model.name(), second.best().model.name());
    for (a, b) in first.candidates.iter().zip(&second.candidates) {
        assert_eq!(a.evaluation, b.evaluation);
    }
}

#[test]
fn scaler_records_imputation_medians() {
    let data = LabeledDataset::from_csv(&sample_csv(), &config()).unwrap();
    assert_eq!(data.len(), 360);
    assert_eq!(data.medians.len(), 8);
    let outcome = Trainer::new(config()).train(&data).unwrap();
    assert_eq!(outcome.scaler.medians, data.medians);
}

#[test]
fn probabilities_form_a_distribution() {
    let predictor = RiskPredictor::new(train().into_artifacts().unwrap());
    for application in applications() {
        let assessment = predictor.predict(&application).unwrap();
        let sum: f64 = assessment.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum = {sum}");
        assert!(assessment.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(
            assessment.probabilities[assessment.class_index],
            assessment
                .probabilities
                .iter()
                .cloned()
                .fold(f64::MIN, f64::max)
        );
        assert!(matches!(
            assessment.label.as_str(),
            "High Risk" | "Medium Risk" | "Low Risk" | "Unknown"
        ));
    }
}

#[test]
fn borderline_applicant_splits_the_forest_vote() {
    let outcome = train();
    let index = outcome
        .candidates
        .iter()
        .position(|c| c.model.name() == RANDOM_FOREST)
        .unwrap();
    let predictor = RiskPredictor::new(outcome.into_candidate_artifacts(index).unwrap());
    let assessment = predictor.predict(&borderline()).unwrap();

    // 25 trees, so every class that gets a vote holds at least 1/25
    let voted = assessment.probabilities.iter().filter(|&&p| p > 1e-3).count();
    assert!(voted >= 2, "{:?}", assessment.probabilities);
    assert!(assessment.confidence() <= 1.0 - 1.0 / 25.0 + 1e-9);
    for p in assessment.probabilities {
        assert!((p * 25.0 - (p * 25.0).round()).abs() < 1e-9, "{p} is not a vote share");
    }
}

#[test]
fn forest_reports_named_importances() {
    let outcome = train();
    let index = outcome
        .candidates
        .iter()
        .position(|c| c.model.name() == RANDOM_FOREST)
        .unwrap();
    let predictor = RiskPredictor::new(outcome.into_candidate_artifacts(index).unwrap());
    let assessment = predictor.predict(&borderline()).unwrap();

    let importance = assessment.feature_importance.unwrap();
    let names: Vec<_> = importance.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, FEATURE_COLUMNS.to_vec());
    assert!((importance.iter().map(|(_, v)| v).sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn unmapped_class_resolves_to_unknown() {
    let outcome = train();
    let best = outcome.best;
    let mut outcome = outcome;
    outcome.labels = LabelMap::from_entries([(0, "High Risk".to_string())]);
    let predictor = RiskPredictor::new(outcome.into_candidate_artifacts(best).unwrap());

    assert_eq!(predictor.resolve_label(0), RiskLabel::Known("High Risk".into()));
    assert_eq!(predictor.resolve_label(2), RiskLabel::Unknown);
    assert_eq!(predictor.resolve_label(7).to_string(), "Unknown");
}

#[test]
fn serving_rejects_unknown_categories_and_out_of_range_input() {
    let predictor = RiskPredictor::new(train().into_artifacts().unwrap());

    let barley = LoanApplication {
        crop_type: "Barley".into(),
        ..borderline()
    };
    assert!(matches!(
        predictor.predict(&barley),
        Err(RiskError::UnknownCategory { field: "crop_type", .. })
    ));

    let too_old = LoanApplication {
        age: 81,
        ..borderline()
    };
    assert!(matches!(
        predictor.predict(&too_old),
        Err(RiskError::InvalidApplication(_))
    ));

    for application in [
        LoanApplication {
            market_index: f64::NAN,
            ..borderline()
        },
        LoanApplication {
            income: f64::INFINITY,
            ..borderline()
        },
    ] {
        assert!(matches!(
            predictor.predict(&application),
            Err(RiskError::InvalidApplication(_))
        ));
    }
}

#[test]
fn artifact_set_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = train().into_artifacts().unwrap();
    let run_id = artifacts.run_id().to_string();
    let model_name = artifacts.model.name();
    artifacts.save(dir.path()).unwrap();
    for file in [MODEL_FILE, SCALER_FILE, LABELS_FILE] {
        assert!(dir.path().join(file).exists());
    }

    let in_memory = RiskPredictor::new(artifacts);
    let loaded = RiskPredictor::new(ArtifactSet::load(dir.path()).unwrap());
    assert_eq!(loaded.artifacts().run_id(), run_id);
    assert_eq!(loaded.model_name(), model_name);

    for application in applications() {
        let a = in_memory.predict(&application).unwrap();
        let b = loaded.predict(&application).unwrap();
        assert_eq!(a.class_index, b.class_index);
        for (p, q) in a.probabilities.iter().zip(&b.probabilities) {
            assert!((p - q).abs() < 1e-12);
        }
    }
}

#[test]
fn missing_artifact_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    train().into_artifacts().unwrap().save(dir.path()).unwrap();
    std::fs::remove_file(dir.path().join(LABELS_FILE)).unwrap();
    assert!(matches!(
        ArtifactSet::load(dir.path()),
        Err(RiskError::MissingArtifact(_))
    ));
}

#[test]
fn load_or_train_trains_when_artifacts_are_absent() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = dir.path().join("artifacts");
    let trained = ArtifactSet::load_or_train_if_stale(&artifacts, &sample_csv(), &config()).unwrap();
    assert!(artifacts.join(MODEL_FILE).exists());

    let reloaded = ArtifactSet::load_or_train_if_stale(&artifacts, &sample_csv(), &config()).unwrap();
    assert_eq!(trained.run_id(), reloaded.run_id());
}

#[test]
fn missing_target_column_aborts_training() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("no_target.csv");
    let text = std::fs::read_to_string(sample_csv()).unwrap();
    std::fs::write(&csv, text.replacen("Label Repaid", "Outcome", 1)).unwrap();

    match Trainer::new(config()).train_from_csv(&csv) {
        Err(RiskError::MissingColumns(cols)) => assert_eq!(cols, vec!["label_repaid".to_string()]),
        Err(other) => panic!("expected MissingColumns, got {other}"),
        Ok(_) => panic!("trained without a target column"),
    }
}

#[test]
fn history_records_named_predictions_only() {
    let predictor = RiskPredictor::new(train().into_artifacts().unwrap());
    let history = PredictionHistory::new();
    assert_eq!(
        history.to_csv_string().unwrap(),
        "Name,Age,Crop,Loan Amount,Predicted Risk,Date\n"
    );

    let application = borderline();
    let assessment = predictor.predict(&application).unwrap();
    assert!(!history.record("", &application, &assessment));
    assert!(history.record("Gopal", &application, &assessment));

    let entries = history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].crop, "Wheat");
    assert_eq!(entries[0].predicted_risk, assessment.label.to_string());
}
