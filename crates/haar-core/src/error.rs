use crate::feature::FeatureKind;
use thiserror::Error;

/// Errors raised while building samples, classifiers or training a cascade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    #[error("integral image {width}x{height} is outside the supported 1..={max} range")]
    DimensionOutOfRange {
        width: usize,
        height: usize,
        max: usize,
    },

    #[error("integral image {width}x{height} expects {expected} values, got {actual}")]
    ValueCountMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{kind:?} feature of size {width}x{height} does not tile into its sub-rectangles")]
    InvalidFeature {
        kind: FeatureKind,
        width: u16,
        height: u16,
    },

    #[error("{set} set is empty")]
    EmptySet { set: &'static str },

    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// The best weak classifier of a round is no better than chance, so its
    /// combination weight `ln(1 / beta)` would be non-positive.
    #[error(
        "training stalled on goal #{goal_index} (fpr goal {goal}) at round {round}: \
         best weighted error {error} >= 0.5"
    )]
    TrainingStalled {
        goal_index: usize,
        goal: f64,
        round: usize,
        error: f64,
    },
}
