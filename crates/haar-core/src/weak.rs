//! Single-feature threshold classifiers and the exact threshold search.
use crate::feature::Feature;
use crate::integral::IntegralImage;

/// Which side of the threshold votes positive.
///
/// A value `v` lies *below* the threshold iff `v <= threshold`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    BelowIsPositive,
    BelowIsNegative,
}

/// One feature, a threshold and a polarity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeakClassifier {
    feature: Feature,
    threshold: f64,
    polarity: Polarity,
}

#[derive(Clone, Copy)]
struct Scored {
    value: f64,
    positive: bool,
    weight: f64,
}

/// Error of both polarities at one sweep position.
#[derive(Clone, Copy, Debug)]
struct SweepPoint {
    index: usize,
    below_negative: f64,
    below_positive: f64,
}

impl WeakClassifier {
    pub fn new(feature: Feature) -> Self {
        Self {
            feature,
            threshold: 0.0,
            polarity: Polarity::BelowIsPositive,
        }
    }

    pub fn with_threshold(feature: Feature, threshold: f64, polarity: Polarity) -> Self {
        Self {
            feature,
            threshold,
            polarity,
        }
    }

    #[inline]
    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[inline]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Choose the threshold and polarity minimizing the weighted training
    /// error and return that error.
    ///
    /// `values` holds the feature value of every example, the first
    /// `positive_count` being positives and the remaining `negative_count`
    /// negatives; `weights` is aligned with `values`. Examples are sorted by
    /// value and swept once, tracking weighted positives `S+` and negatives
    /// `S-` at or below the current value against totals `T+`, `T-`:
    ///
    /// - below negative, above positive: `S+ + (T- - S-)`
    /// - below positive, above negative: `S- + (T+ - S+)`
    ///
    /// Only the last position of a run of equal values is a candidate, so the
    /// returned error is exactly the error `classify` makes on these
    /// examples. Ties go to the first candidate in sorted order. Empty input
    /// leaves the classifier unchanged and returns `f64::INFINITY`.
    pub fn find_optimal_threshold(
        &mut self,
        values: &[f64],
        positive_count: usize,
        negative_count: usize,
        weights: &[f64],
    ) -> f64 {
        assert_eq!(values.len(), positive_count + negative_count);
        assert_eq!(weights.len(), values.len());

        let scored = sorted_scores(values, positive_count, weights);

        let mut min_error = f64::INFINITY;
        for p in sweep(&scored) {
            if p.below_negative < p.below_positive {
                if p.below_negative < min_error {
                    min_error = p.below_negative;
                    self.threshold = scored[p.index].value;
                    self.polarity = Polarity::BelowIsNegative;
                }
            } else if p.below_positive < min_error {
                min_error = p.below_positive;
                self.threshold = scored[p.index].value;
                self.polarity = Polarity::BelowIsPositive;
            }
        }
        min_error
    }

    /// Vote (`+1` or `-1`) for a precomputed feature value.
    #[inline]
    pub fn classify_value(&self, value: f64) -> i8 {
        let below = value <= self.threshold;
        match (self.polarity, below) {
            (Polarity::BelowIsPositive, true) | (Polarity::BelowIsNegative, false) => 1,
            _ => -1,
        }
    }

    /// Vote for the window at the sample's origin.
    ///
    /// Three-rectangle features get `width · height · mean / 3` added before
    /// thresholding, and the value is divided by `stdev` unless it is exactly
    /// zero. Training uses `mean = 0`, `stdev = 1` on pre-normalized samples.
    pub fn classify(&self, sample: &IntegralImage, mean: f64, stdev: f64) -> i8 {
        let mut value = self.feature.evaluate(sample, 0, 0);

        if self.feature.kind().is_three_way() {
            value += self.feature.width() as f64 * self.feature.height() as f64 * mean / 3.0;
        }
        if stdev != 0.0 {
            value /= stdev;
        }

        self.classify_value(value)
    }

    /// Rescale the feature geometry for a window of side `resolution`; the
    /// threshold follows the area (`factor²`).
    pub fn rescale(&mut self, factor: f64, resolution: u16) {
        self.feature = self.feature.rescale(factor, resolution);
        self.threshold *= factor * factor;
    }
}

fn sorted_scores(values: &[f64], positive_count: usize, weights: &[f64]) -> Vec<Scored> {
    let mut scored: Vec<Scored> = values
        .iter()
        .zip(weights)
        .enumerate()
        .map(|(i, (&value, &weight))| Scored {
            value,
            positive: i < positive_count,
            weight,
        })
        .collect();
    // stable: equal values keep positives-first input order
    scored.sort_by(|a, b| a.value.total_cmp(&b.value));
    scored
}

fn sweep(scored: &[Scored]) -> impl Iterator<Item = SweepPoint> + '_ {
    let (total_pos, total_neg) = scored.iter().fold((0.0, 0.0), |(p, n), s| {
        if s.positive {
            (p + s.weight, n)
        } else {
            (p, n + s.weight)
        }
    });

    let mut sum_pos = 0.0;
    let mut sum_neg = 0.0;
    scored.iter().enumerate().filter_map(move |(i, s)| {
        if s.positive {
            sum_pos += s.weight;
        } else {
            sum_neg += s.weight;
        }
        if scored.get(i + 1).is_some_and(|next| next.value == s.value) {
            return None;
        }
        Some(SweepPoint {
            index: i,
            below_negative: sum_pos + (total_neg - sum_neg),
            below_positive: sum_neg + (total_pos - sum_pos),
        })
    })
}
