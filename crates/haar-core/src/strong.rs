//! Weighted ensembles of weak classifiers (one cascade stage).
use crate::classifier::Classifier;
use crate::error::TrainError;
use crate::integral::IntegralImage;
use crate::weak::WeakClassifier;

/// Ordered `(weak classifier, weight)` pairs plus a decision threshold.
///
/// Starts empty with threshold 0, so an empty ensemble accepts everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StrongClassifier {
    members: Vec<(WeakClassifier, f64)>,
    threshold: f64,
}

impl StrongClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an ensemble from its parts; every weight must be positive.
    pub fn from_parts(
        members: Vec<(WeakClassifier, f64)>,
        threshold: f64,
    ) -> Result<Self, TrainError> {
        let mut sc = Self::new();
        for (wc, weight) in members {
            sc.add(wc, weight)?;
        }
        sc.threshold = threshold;
        Ok(sc)
    }

    /// Append a member. Non-positive or non-finite weights are rejected.
    pub fn add(&mut self, weak: WeakClassifier, weight: f64) -> Result<(), TrainError> {
        if !(weight > 0.0 && weight.is_finite()) {
            return Err(TrainError::InvalidParameter {
                name: "weak classifier weight",
                value: weight,
            });
        }
        self.members.push((weak, weight));
        Ok(())
    }

    pub fn members(&self) -> &[(WeakClassifier, f64)] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Raw ensemble score: `Σ weight · vote`.
    pub fn score(&self, sample: &IntegralImage, mean: f64, stdev: f64) -> f64 {
        self.members
            .iter()
            .map(|(wc, weight)| weight * wc.classify(sample, mean, stdev) as f64)
            .sum()
    }

    /// Accept iff the score reaches the threshold.
    pub fn classify(&self, sample: &IntegralImage, mean: f64, stdev: f64) -> bool {
        self.score(sample, mean, stdev) >= self.threshold
    }

    /// Set the threshold so at most `max_fnr` of `positives` are rejected.
    ///
    /// Scores are sorted ascending and the threshold is taken at rank
    /// `floor(max_fnr · N)`, then moved down past every score equal to it so a
    /// block of tied positives is never split. When that rank is not below
    /// `N` the threshold is left unchanged. If all scores tie, the walk ends
    /// on rank 0 and every positive is accepted.
    pub fn calibrate_threshold(&mut self, positives: &[IntegralImage], max_fnr: f64) {
        let mut scores: Vec<f64> = positives.iter().map(|p| self.score(p, 0.0, 1.0)).collect();
        scores.sort_by(|a, b| a.total_cmp(b));

        let mut rank = (max_fnr * scores.len() as f64).floor() as usize;
        if rank >= scores.len() {
            return;
        }

        let at_rank = scores[rank];
        while rank > 0 && scores[rank] == at_rank {
            rank -= 1;
        }
        self.threshold = scores[rank];
    }

    /// Multiply the threshold by `p` (coarse operating-point knob).
    pub fn strictness(&mut self, p: f64) {
        self.threshold *= p;
    }

    pub fn rescale(&mut self, factor: f64, resolution: u16) {
        for (wc, _) in &mut self.members {
            wc.rescale(factor, resolution);
        }
    }
}

impl Classifier for StrongClassifier {
    #[inline]
    fn accepts(&self, sample: &IntegralImage) -> bool {
        self.classify(sample, 0.0, 1.0)
    }
}
