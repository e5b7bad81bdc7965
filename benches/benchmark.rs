use criterion::{Criterion, criterion_group, criterion_main};
use farm_loan_risk::{LoanApplication, RiskPredictor, Trainer, TrainingConfig};
use std::path::Path;

fn predictor() -> RiskPredictor {
    let csv = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/farm_loan_risk_sample.csv");
    let config = TrainingConfig {
        forest_trees: 50,
        ..TrainingConfig::default()
    };
    let artifacts = Trainer::new(config)
        .train_from_csv(&csv)
        .and_then(|outcome| outcome.into_artifacts())
        .expect("training on the sample dataset");
    RiskPredictor::new(artifacts)
}

fn application(i: u32) -> LoanApplication {
    const CROPS: [&str; 5] = ["Wheat", "Rice", "Cotton", "Sugarcane", "Maize"];
    const SOILS: [&str; 5] = ["Sandy", "Clay", "Loamy", "Black", "Red"];
    LoanApplication {
        age: 20 + i % 55,
        land_size: 0.5 + (i % 40) as f64 * 0.5,
        income: 40_000.0 + (i % 90) as f64 * 10_000.0,
        loan_amount: 10_000.0 + (i % 60) as f64 * 10_000.0,
        loan_term: [6, 12, 24, 36, 60][(i % 5) as usize],
        crop_type: CROPS[(i % 5) as usize].into(),
        soil_type: SOILS[(i / 5 % 5) as usize].into(),
        rainfall: 40 + i % 440,
        previous_defaults: i % 5,
        market_index: 50.0,
    }
}

fn bench_predict_single(c: &mut Criterion) {
    let predictor = predictor();
    let borderline = LoanApplication {
        age: 65,
        land_size: 0.5,
        income: 50_000.0,
        loan_amount: 400_000.0,
        loan_term: 12,
        crop_type: "Wheat".into(),
        soil_type: "Sandy".into(),
        rainfall: 120,
        previous_defaults: 4,
        market_index: 50.0,
    };

    c.bench_function("predict borderline applicant", |b| {
        b.iter(|| {
            let _ = predictor.predict(&borderline);
        })
    });
}

fn bench_bulk_prediction(c: &mut Criterion) {
    let predictor = predictor();
    let applications: Vec<_> = (0..10_000).map(application).collect();

    c.bench_function("bulk predict 10k applications", |b| {
        b.iter(|| {
            for application in &applications {
                let _ = predictor.predict(application);
            }
        });
    });
}

criterion_group!(benches, bench_predict_single, bench_bulk_prediction);
criterion_main!(benches);
