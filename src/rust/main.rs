use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use emotive::config::{DEFAULT_DATA_PATH, DEFAULT_NUM_WORDS, DEFAULT_TEXT_COLUMN, MAX_SEQUENCE_LENGTH};
use emotive::{cli, training, web};
use emotive::{ArtifactPaths, InferenceConfig, InferenceContext, SelectionPolicy, TrainingConfig};
use log::info;

#[derive(Parser)]
#[command(author, version, about = "Multi-label GoEmotions text classifier", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyKind {
    TopK,
    Threshold,
}

#[derive(clap::Args)]
struct ArtifactArgs {
    /// Model checkpoint (defaults to $EMOTIVE_ARTIFACTS or saved_models)
    #[arg(long)]
    model: Option<PathBuf>,
    /// Fitted vocabulary
    #[arg(long)]
    tokenizer: Option<PathBuf>,
}

impl ArtifactArgs {
    fn paths(&self) -> ArtifactPaths {
        let defaults = ArtifactPaths::default();
        ArtifactPaths::new(
            self.model.clone().unwrap_or(defaults.model),
            self.tokenizer.clone().unwrap_or(defaults.tokenizer),
        )
    }
}

#[derive(clap::Args)]
struct PolicyArgs {
    #[arg(long, value_enum, default_value_t = PolicyKind::TopK)]
    policy: PolicyKind,
    /// Number of emotions reported by the top-k policy
    #[arg(long, default_value_t = 3)]
    k: usize,
    /// Minimum score for the threshold policy
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,
}

impl PolicyArgs {
    fn policy(&self) -> SelectionPolicy {
        match self.policy {
            PolicyKind::TopK => SelectionPolicy::TopK(self.k),
            PolicyKind::Threshold => SelectionPolicy::Threshold(self.threshold),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Fit a vocabulary on the text column of a CSV dataset
    FitTokenizer {
        #[arg(long, default_value = DEFAULT_DATA_PATH)]
        data: PathBuf,
        #[arg(long, default_value = DEFAULT_TEXT_COLUMN)]
        text_column: String,
        #[arg(long, default_value_t = DEFAULT_NUM_WORDS)]
        num_words: usize,
        /// Destination file (defaults to the artifacts directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Train the BiLSTM classifier
    Train {
        #[arg(long, default_value = DEFAULT_DATA_PATH)]
        data: PathBuf,
        #[arg(long, default_value = DEFAULT_TEXT_COLUMN)]
        text_column: String,
        #[command(flatten)]
        artifacts: ArtifactArgs,
        #[arg(long, default_value_t = MAX_SEQUENCE_LENGTH)]
        max_len: usize,
        #[arg(long, default_value_t = 128)]
        embedding_dim: usize,
        #[arg(long, default_value_t = 128)]
        lstm_units: usize,
        #[arg(long, default_value_t = 64)]
        batch_size: usize,
        #[arg(long, default_value_t = 10)]
        epochs: usize,
        #[arg(long, default_value_t = 0.2)]
        test_size: f64,
        #[arg(long, default_value_t = 1e-3)]
        learning_rate: f64,
        #[arg(long, default_value_t = 3)]
        patience: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Interactive prediction loop on stdin
    Predict {
        #[command(flatten)]
        artifacts: ArtifactArgs,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Serve the web form
    Serve {
        #[arg(long, default_value = web::DEFAULT_ADDR)]
        addr: String,
        #[command(flatten)]
        artifacts: ArtifactArgs,
        #[command(flatten)]
        policy: PolicyArgs,
    },
}

fn load_context(artifacts: &ArtifactArgs, policy: &PolicyArgs) -> anyhow::Result<InferenceContext> {
    let start_time = Instant::now();
    let config = InferenceConfig::new(artifacts.paths()).with_policy(policy.policy());
    let ctx = InferenceContext::load(&config).context("Error loading model or tokenizer")?;
    info!("Model and tokenizer loaded (took {:.2?})", start_time.elapsed());
    Ok(ctx)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    emotive::init_logger();
    let args = Args::parse();

    match args.command {
        Command::FitTokenizer {
            data,
            text_column,
            num_words,
            output,
        } => {
            let output = output.unwrap_or_else(|| ArtifactPaths::default().tokenizer);
            let vocabulary = training::fit_tokenizer_from_csv(&data, &text_column, num_words, &output)?;
            println!(
                "Tokenizer with {} words saved to {}",
                vocabulary.len().saturating_sub(1),
                output.display()
            );
        }
        Command::Train {
            data,
            text_column,
            artifacts,
            max_len,
            embedding_dim,
            lstm_units,
            batch_size,
            epochs,
            test_size,
            learning_rate,
            patience,
            seed,
        } => {
            let paths = artifacts.paths();
            let config = TrainingConfig {
                data_path: data,
                text_column,
                tokenizer_path: paths.tokenizer,
                model_path: paths.model,
                max_len,
                embedding_dim,
                lstm_units,
                batch_size,
                epochs,
                test_size,
                learning_rate,
                patience,
                seed,
                ..TrainingConfig::default()
            };

            let start_time = Instant::now();
            let report = emotive::train_model(&config)?;
            info!("=== Training finished (took {:.2?}) ===", start_time.elapsed());

            if let Some(best) = report.best_metrics() {
                println!(
                    "Best epoch {}: val_loss {:.4}, val_precision {:.4}, val_recall {:.4}",
                    best.epoch, best.val_loss, best.val_precision, best.val_recall
                );
            }
            println!("Model saved to {}", report.model_path.display());
        }
        Command::Predict { artifacts, policy } => {
            let ctx = load_context(&artifacts, &policy)?;
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            cli::run_repl(&ctx, stdin.lock(), &mut stdout)?;
        }
        Command::Serve {
            addr,
            artifacts,
            policy,
        } => {
            let ctx = Arc::new(load_context(&artifacts, &policy)?);
            web::serve(&addr, ctx).await?;
        }
    }

    Ok(())
}
