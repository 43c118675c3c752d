//! Train a Haar cascade from a directory of labelled images.

use anyhow::{Context as _, Result};
use clap::Parser;
use haar::app::{load_config, run_training, TrainConfig};
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(
    name = "haar-train",
    version,
    about = "Train a boosted Haar-feature cascade",
    after_help = "Dataset roots must contain `positive/` and `negative/` image directories.\n\
                  Command-line flags override values from --config."
)]
struct Cli {
    /// JSON training config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Training dataset root
    #[arg(long)]
    train: Option<PathBuf>,

    /// Test dataset root, evaluated after training
    #[arg(long)]
    test: Option<PathBuf>,

    /// Side of the square training window in pixels
    #[arg(short, long)]
    resolution: Option<u16>,

    /// Comma-separated cascade false-positive goals, e.g. 0.7,0.6,0.5
    #[arg(short, long, value_delimiter = ',')]
    goals: Option<Vec<f64>>,

    /// Per-stage false-negative bound on the training positives
    #[arg(long)]
    max_stage_fnr: Option<f64>,

    /// Report output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads for the feature scan (default: all cores)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, cfg: &mut TrainConfig) {
        if let Some(v) = self.train {
            cfg.train = Some(v);
        }
        if let Some(v) = self.test {
            cfg.test = Some(v);
        }
        if let Some(v) = self.resolution {
            cfg.resolution = Some(v);
        }
        if let Some(v) = self.goals {
            cfg.goals = Some(v);
        }
        if let Some(v) = self.max_stage_fnr {
            cfg.max_stage_fnr = Some(v);
        }
        if let Some(v) = self.output {
            cfg.output_json = Some(v);
        }
    }
}

fn log_level(verbose: bool, cfg: &TrainConfig) -> Result<Level> {
    if verbose {
        return Ok(Level::DEBUG);
    }
    match cfg.log_level.as_deref() {
        None => Ok(Level::INFO),
        Some(s) => s.parse().map_err(|_| {
            anyhow::anyhow!("invalid log_level '{s}', expected trace|debug|info|warn|error")
        }),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => TrainConfig::default(),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(cli.verbose, &cfg)?)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    if let Some(n) = cli.threads {
        if n == 0 {
            anyhow::bail!("threads must be >= 1");
        }
        ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("configuring worker threads")?;
    }

    cli.apply(&mut cfg);
    let summary = run_training(cfg)?;

    info!(
        stages = summary.cascade_stages,
        features = summary.features,
        "done"
    );
    if let Some(eval) = &summary.test {
        println!(
            "test: {}/{} positives, {}/{} negatives correct",
            eval.true_positives, eval.positives, eval.true_negatives, eval.negatives
        );
    }
    Ok(())
}
