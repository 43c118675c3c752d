//! Shared application-level helpers for the training CLI.
//!
//! These functions wire up I/O (config file, dataset loading, JSON report)
//! around the `haar-core` training API.

use crate::dataset::{Dataset, DatasetOptions};
use anyhow::{Context, Result};
use haar_core::{
    generate_features, CascadeClassifier, Classifier, SkipReason, StageReport, TrainParams,
    TrainingSet,
};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write, path::Path, path::PathBuf};
use tracing::info;

pub const DEFAULT_RESOLUTION: u16 = 32;
pub const DEFAULT_GOALS: [f64; 3] = [0.70, 0.60, 0.50];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrainConfig {
    /// Dataset root with `positive/` and `negative/`.
    pub train: Option<PathBuf>,
    pub test: Option<PathBuf>,
    pub resolution: Option<u16>,
    pub goals: Option<Vec<f64>>,
    pub max_stage_fnr: Option<f64>,
    pub max_rounds_per_stage: Option<usize>,
    pub min_weighted_error: Option<f64>,
    pub mirror: Option<bool>,
    pub normalize: Option<bool>,
    pub strictness: Option<f64>,
    pub output_json: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOut {
    Trained {
        goal_index: usize,
        goal: f64,
        rounds: usize,
        weak_classifiers: usize,
        threshold: f64,
        hard_negatives: usize,
        validation_fpr: f64,
        reached_goal: bool,
        pruned_positives: usize,
        pruned_negatives: usize,
    },
    Skipped {
        goal_index: usize,
        goal: f64,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub positives: usize,
    pub negatives: usize,
    pub true_positives: usize,
    pub true_negatives: usize,
    pub accuracy: Option<f64>,
    pub false_positive_rate: Option<f64>,
    pub false_negative_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub train: String,
    pub resolution: u16,
    pub features: usize,
    pub train_positives: usize,
    pub train_negatives: usize,
    pub goals: Vec<f64>,
    pub stages: Vec<StageOut>,
    pub cascade_stages: usize,
    pub test: Option<Evaluation>,
}

impl From<&StageReport> for StageOut {
    fn from(r: &StageReport) -> Self {
        match *r {
            StageReport::Trained {
                goal_index,
                goal,
                rounds,
                weak_classifiers,
                threshold,
                hard_negatives,
                validation_fpr,
                reached_goal,
                pruned_positives,
                pruned_negatives,
            } => StageOut::Trained {
                goal_index,
                goal,
                rounds,
                weak_classifiers,
                threshold,
                hard_negatives,
                validation_fpr,
                reached_goal,
                pruned_positives,
                pruned_negatives,
            },
            StageReport::Skipped {
                goal_index,
                goal,
                reason,
            } => StageOut::Skipped {
                goal_index,
                goal,
                reason: match reason {
                    SkipReason::AlreadyBelowGoal { fpr } => {
                        format!("cascade fpr {fpr} already below goal")
                    }
                    SkipReason::NoHardNegatives => "no hard negatives left".to_string(),
                    SkipReason::NoPositives => "no positives left".to_string(),
                },
            },
        }
    }
}

/// Score a classifier on a labelled dataset.
pub fn evaluate(classifier: &impl Classifier, data: &Dataset) -> Evaluation {
    let true_positives = data.positives.iter().filter(|s| classifier.accepts(s)).count();
    let true_negatives = data.negatives.iter().filter(|s| !classifier.accepts(s)).count();
    let total = data.len();
    Evaluation {
        positives: data.positives.len(),
        negatives: data.negatives.len(),
        true_positives,
        true_negatives,
        accuracy: (total > 0).then(|| (true_positives + true_negatives) as f64 / total as f64),
        false_positive_rate: classifier.false_positive_rate(&data.negatives),
        false_negative_rate: classifier.false_negative_rate(&data.positives),
    }
}

pub fn run_training(cfg: TrainConfig) -> Result<TrainingSummary> {
    let train_dir = cfg.train.clone().context("no training dataset given")?;
    let resolution = cfg.resolution.unwrap_or(DEFAULT_RESOLUTION);
    if resolution == 0 {
        anyhow::bail!("resolution must be >= 1");
    }
    let goals = cfg.goals.clone().unwrap_or_else(|| DEFAULT_GOALS.to_vec());

    let mut params = TrainParams::default();
    apply_params_overrides(&mut params, &cfg);
    params.validate()?;

    let opts = DatasetOptions {
        resolution,
        mirror: cfg.mirror.unwrap_or(false),
        normalize: cfg.normalize.unwrap_or(true),
    };
    let train = Dataset::load(&train_dir, &opts)
        .with_context(|| format!("loading training set {}", train_dir.display()))?;
    if train.positives.is_empty() || train.negatives.is_empty() {
        anyhow::bail!(
            "training set needs positives and negatives, found {} and {}",
            train.positives.len(),
            train.negatives.len()
        );
    }

    let features = generate_features(resolution);
    info!(resolution, features = features.len(), "generated feature set");

    let (train_positives, train_negatives) = (train.positives.len(), train.negatives.len());
    let set = TrainingSet {
        validation: train.negatives.clone(),
        positives: train.positives,
        negatives: train.negatives,
    };

    let mut cascade = CascadeClassifier::new(resolution);
    let report = cascade
        .train(&features, set, &goals, &params)
        .context("training cascade")?;
    if let Some(p) = cfg.strictness {
        if !(p > 0.0 && p.is_finite()) {
            anyhow::bail!("strictness must be > 0");
        }
        cascade.strictness(p);
    }
    info!(stages = cascade.len(), "training finished");

    let test = match &cfg.test {
        Some(dir) => {
            let data = Dataset::load(dir, &opts)
                .with_context(|| format!("loading test set {}", dir.display()))?;
            if data.is_empty() {
                anyhow::bail!("test set {} has no readable images", dir.display());
            }
            let eval = evaluate(&cascade, &data);
            info!(
                accuracy = eval.accuracy,
                fpr = eval.false_positive_rate,
                fnr = eval.false_negative_rate,
                "test set evaluated"
            );
            Some(eval)
        }
        None => None,
    };

    let summary = TrainingSummary {
        train: train_dir.to_string_lossy().into_owned(),
        resolution,
        features: features.len(),
        train_positives,
        train_negatives,
        goals,
        stages: report.stages.iter().map(StageOut::from).collect(),
        cascade_stages: cascade.len(),
        test,
    };

    let json_out = cfg
        .output_json
        .clone()
        .unwrap_or_else(|| train_dir.with_extension("report.json"));
    write_json(&json_out, &summary)?;
    info!(path = %json_out.display(), "wrote report");

    Ok(summary)
}

fn apply_params_overrides(params: &mut TrainParams, cfg: &TrainConfig) {
    if let Some(f) = cfg.max_stage_fnr {
        params.max_stage_fnr = f;
    }
    if let Some(n) = cfg.max_rounds_per_stage {
        params.max_rounds_per_stage = n;
    }
    if let Some(e) = cfg.min_weighted_error {
        params.min_weighted_error = e;
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut json_file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(&mut json_file, value)?;
    json_file.write_all(b"\n")?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<TrainConfig> {
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    let cfg: TrainConfig = serde_json::from_reader(file)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}
