use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use farm_loan_risk::schema::DEFAULT_MARKET_INDEX;
use farm_loan_risk::{
    ArtifactSet, LoanApplication, PredictionHistory, RiskAssessment, RiskClassifier,
    RiskPredictor, Trainer, TrainingConfig,
};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "farm-loan-risk", version, about = "Farm loan repayment risk predictor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train all candidates and save the best artifact set
    Train {
        #[arg(long, default_value = "data/farm_loan_risk_sample.csv")]
        data: PathBuf,
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
        /// TOML file with training settings
        #[arg(long, env = "FARM_LOAN_RISK_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Score one application
    Predict {
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
        #[command(flatten)]
        application: ApplicationArgs,
    },
    /// Interactive scoring with history, retraining first if the data changed
    Session {
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
        #[arg(long, default_value = "data/farm_loan_risk_sample.csv")]
        data: PathBuf,
        #[arg(long, env = "FARM_LOAN_RISK_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ApplicationArgs {
    #[arg(long)]
    age: u32,
    #[arg(long)]
    land_size: f64,
    #[arg(long)]
    income: f64,
    #[arg(long)]
    loan_amount: f64,
    #[arg(long)]
    loan_term: u32,
    #[arg(long)]
    crop_type: String,
    #[arg(long)]
    soil_type: String,
    #[arg(long)]
    rainfall: u32,
    #[arg(long, default_value_t = 0)]
    previous_defaults: u32,
    #[arg(long, default_value_t = DEFAULT_MARKET_INDEX)]
    market_index: f64,
}

impl From<ApplicationArgs> for LoanApplication {
    fn from(a: ApplicationArgs) -> Self {
        LoanApplication {
            age: a.age,
            land_size: a.land_size,
            income: a.income,
            loan_amount: a.loan_amount,
            loan_term: a.loan_term,
            crop_type: a.crop_type,
            soil_type: a.soil_type,
            rainfall: a.rainfall,
            previous_defaults: a.previous_defaults,
            market_index: a.market_index,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "farm_loan_risk=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Train {
            data,
            artifacts,
            config,
        } => train(&data, &artifacts, load_config(config.as_deref())?),
        Command::Predict {
            artifacts,
            application,
        } => {
            let predictor = RiskPredictor::new(
                ArtifactSet::load(&artifacts)
                    .with_context(|| format!("loading artifacts from {}", artifacts.display()))?,
            );
            let assessment = predictor.predict(&application.into())?;
            print_assessment(&assessment);
            Ok(())
        }
        Command::Session {
            artifacts,
            data,
            config,
        } => session(&artifacts, &data, &load_config(config.as_deref())?),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TrainingConfig> {
    match path {
        Some(path) => TrainingConfig::from_toml_file(path)
            .with_context(|| format!("reading config {}", path.display())),
        None => Ok(TrainingConfig::default()),
    }
}

fn train(data: &Path, artifacts: &Path, config: TrainingConfig) -> anyhow::Result<()> {
    println!("🚜 Training models on {}...", data.display());
    let outcome = Trainer::new(config)
        .train_from_csv(data)
        .with_context(|| format!("training from {}", data.display()))?;

    for candidate in &outcome.candidates {
        println!("\n🔹 {}", candidate.model.name());
        print!("{}", candidate.evaluation);
    }
    let best = outcome.best();
    println!(
        "\n🏆 Best model: {} ({:.4})",
        best.model.name(),
        best.evaluation.accuracy
    );

    let set = outcome.into_artifacts()?;
    set.save(artifacts)?;
    println!("💾 Saved artifact set {} to {}", set.run_id(), artifacts.display());
    Ok(())
}

fn print_assessment(assessment: &RiskAssessment) {
    println!(
        "🎯 {} (confidence {:.1}%)",
        assessment.label,
        assessment.confidence() * 100.0
    );
    println!(
        "   P(High) = {:.3}, P(Medium) = {:.3}, P(Low) = {:.3}",
        assessment.probabilities[0], assessment.probabilities[1], assessment.probabilities[2]
    );
    if let Some(importance) = &assessment.feature_importance {
        let mut ranked = importance.clone();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        println!("   Feature importance:");
        for (feature, value) in ranked {
            println!("{:>20} | {:.3}", feature, value);
        }
    }
}

const SESSION_HELP: &str = "Enter: name,age,land_size,income,loan_amount,loan_term,crop_type,soil_type,rainfall,previous_defaults\n\
Commands: history | export <path> | exit";

fn parse_line(line: &str) -> anyhow::Result<(String, LoanApplication)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 10 {
        bail!("expected 10 comma-separated fields, got {}", fields.len());
    }
    let application = LoanApplication {
        age: fields[1].parse().context("age")?,
        land_size: fields[2].parse().context("land_size")?,
        income: fields[3].parse().context("income")?,
        loan_amount: fields[4].parse().context("loan_amount")?,
        loan_term: fields[5].parse().context("loan_term")?,
        crop_type: fields[6].to_string(),
        soil_type: fields[7].to_string(),
        rainfall: fields[8].parse().context("rainfall")?,
        previous_defaults: fields[9].parse().context("previous_defaults")?,
        market_index: DEFAULT_MARKET_INDEX,
    };
    Ok((fields[0].to_string(), application))
}

fn session(artifacts: &Path, data: &Path, config: &TrainingConfig) -> anyhow::Result<()> {
    let set = ArtifactSet::load_or_train_if_stale(artifacts, data, config)?;
    let predictor = RiskPredictor::new(set);
    let history = PredictionHistory::new();
    println!("📦 Using {} model", predictor.model_name());
    println!("{SESSION_HELP}");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        if line.is_empty() {
            continue;
        } else if line.eq_ignore_ascii_case("exit") {
            break;
        } else if line.eq_ignore_ascii_case("history") {
            print!("{}", history.to_csv_string()?);
        } else if let Some(path) = line.strip_prefix("export ") {
            let path = path.trim();
            history.export_csv(File::create(path)?)?;
            println!("⬇️  Exported {} entries to {}", history.len(), path);
        } else {
            match parse_line(line).and_then(|(name, application)| {
                let assessment = predictor.predict(&application)?;
                Ok((name, application, assessment))
            }) {
                Ok((name, application, assessment)) => {
                    print_assessment(&assessment);
                    if !history.record(&name, &application, &assessment) {
                        println!("   (no name given, not saved to history)");
                    }
                }
                Err(e) => eprintln!("❌ {e:#}"),
            }
        }
    }
    Ok(())
}
