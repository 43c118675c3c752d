//! Core primitives for training Haar-feature boosted cascades.
//!
//! # Overview
//!
//! This crate is the training engine only. Images arrive already converted
//! to summed-area tables ([`IntegralImage`]); decoding, resizing and
//! normalization live in the `haar` crate.
//!
//! - [`integral`] – read-only integral image with O(1) rectangle sums.
//! - [`feature`] – the five Haar shapes, feature-space enumeration and
//!   evaluation.
//! - [`weak`] – single-feature threshold classifiers and the exact weighted
//!   error threshold search.
//! - [`strong`] – weighted ensembles with false-negative driven threshold
//!   calibration.
//! - [`boost`] – the per-stage AdaBoost loop and the feature scan.
//! - [`cascade`] – stage sequences with early rejection and the multi-stage
//!   training loop with hard-negative mining.
//!
//! # Features
//!
//! - `rayon` *(default)* – parallelizes the per-round feature scan across
//!   worker threads. The winner is reduced by `(error, enumeration index)`, so
//!   training results are identical with or without this feature.
//! - `tracing` *(default)* – emits spans around the scan, stage and cascade
//!   loops plus per-round events (chosen feature, weighted error, FPR).

pub mod boost;
pub mod cascade;
pub mod classifier;
pub mod error;
pub mod feature;
pub mod integral;
pub mod strong;
pub mod weak;

pub use crate::boost::{
    scan_features, train_stage, BestFeature, StageData, StageResult, StageTarget,
};
pub use crate::cascade::{CascadeClassifier, SkipReason, StageReport, TrainReport, TrainingSet};
pub use crate::classifier::Classifier;
pub use crate::error::TrainError;
pub use crate::feature::{generate_features, Feature, FeatureKind, Rect};
pub use crate::integral::IntegralImage;
pub use crate::strong::StrongClassifier;
pub use crate::weak::{Polarity, WeakClassifier};

/// Tunable parameters for stage and cascade training.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainParams {
    /// Upper bound on each stage's false-negative rate over its positive set.
    pub max_stage_fnr: f64,
    /// Hard cap on boosting rounds per stage. A stage that hits the cap is
    /// committed as-is and reported with `reached_goal = false`.
    pub max_rounds_per_stage: usize,
    /// Floor applied to the winning weighted error before computing
    /// `beta = e / (1 - e)`, so a perfect separator gets a finite weight.
    pub min_weighted_error: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            max_stage_fnr: 0.01,
            max_rounds_per_stage: 200,
            min_weighted_error: 1e-10,
        }
    }
}

impl TrainParams {
    pub fn with_max_stage_fnr(mut self, max_stage_fnr: f64) -> Self {
        self.max_stage_fnr = max_stage_fnr;
        self
    }

    pub fn with_max_rounds_per_stage(mut self, rounds: usize) -> Self {
        self.max_rounds_per_stage = rounds;
        self
    }

    pub fn with_min_weighted_error(mut self, min_weighted_error: f64) -> Self {
        self.min_weighted_error = min_weighted_error;
        self
    }

    /// Reject rates outside `[0, 1]` and a zero round cap.
    pub fn validate(&self) -> Result<(), TrainError> {
        if !(0.0..=1.0).contains(&self.max_stage_fnr) {
            return Err(TrainError::InvalidParameter {
                name: "max_stage_fnr",
                value: self.max_stage_fnr,
            });
        }
        if self.max_rounds_per_stage == 0 {
            return Err(TrainError::InvalidParameter {
                name: "max_rounds_per_stage",
                value: 0.0,
            });
        }
        if !(self.min_weighted_error > 0.0 && self.min_weighted_error < 0.5) {
            return Err(TrainError::InvalidParameter {
                name: "min_weighted_error",
                value: self.min_weighted_error,
            });
        }
        Ok(())
    }
}
