//! Per-stage AdaBoost loop.
//!
//! Each round renormalizes the example weights, scans every candidate
//! feature for its best threshold, keeps the global minimum, down-weights the
//! examples that winner classifies correctly and appends it to the stage with
//! weight `ln(1 / beta)`. The stage threshold is recalibrated after every
//! round to respect the stage false-negative bound.
use crate::cascade::CascadeClassifier;
use crate::classifier::Classifier;
use crate::error::TrainError;
use crate::feature::Feature;
use crate::integral::IntegralImage;
use crate::strong::StrongClassifier;
use crate::weak::WeakClassifier;
use crate::TrainParams;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::{debug, instrument, warn};

/// Winner of one feature scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BestFeature {
    /// Position in the feature sequence that was scanned.
    pub index: usize,
    pub classifier: WeakClassifier,
    pub error: f64,
}

/// Borrowed sample sets for one stage.
#[derive(Clone, Copy, Debug)]
pub struct StageData<'a> {
    pub positives: &'a [IntegralImage],
    /// Hard negatives mined for this stage.
    pub negatives: &'a [IntegralImage],
    /// Negatives used to measure the cascade FPR after each round.
    pub validation: &'a [IntegralImage],
}

/// Which goal a stage is trained for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageTarget {
    pub goal_index: usize,
    /// Cascade-level FPR on the validation set at which the stage stops.
    pub goal: f64,
}

/// A finished stage plus how it got there.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub classifier: StrongClassifier,
    pub rounds: usize,
    /// Cascade FPR on the validation set with this stage appended.
    pub validation_fpr: f64,
    pub reached_goal: bool,
}

/// Uniform weights within each class, each class summing to 0.5.
pub fn initial_weights(positive_count: usize, negative_count: usize) -> Vec<f64> {
    let mut weights = Vec::with_capacity(positive_count + negative_count);
    weights.extend(std::iter::repeat(1.0 / (2 * positive_count) as f64).take(positive_count));
    weights.extend(std::iter::repeat(1.0 / (2 * negative_count) as f64).take(negative_count));
    weights
}

fn normalize(weights: &mut [f64]) {
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
}

/// Multiply the weight of every example `wc` classifies correctly by `beta`.
///
/// The winner's feature is evaluated once per example into `values`; votes
/// come from [`WeakClassifier::classify_value`] on those values.
fn reweight(
    wc: &WeakClassifier,
    positives: &[IntegralImage],
    negatives: &[IntegralImage],
    weights: &mut [f64],
    beta: f64,
    values: &mut Vec<f64>,
) {
    let feature = wc.feature();
    values.clear();
    values.extend(positives.iter().chain(negatives).map(|s| feature.evaluate(s, 0, 0)));

    for (i, (w, &v)) in weights.iter_mut().zip(values.iter()).enumerate() {
        let truth = if i < positives.len() { 1 } else { -1 };
        if wc.classify_value(v) == truth {
            *w *= beta;
        }
    }
}

fn evaluate_feature(
    feature: &Feature,
    positives: &[IntegralImage],
    negatives: &[IntegralImage],
    weights: &[f64],
    values: &mut Vec<f64>,
) -> (WeakClassifier, f64) {
    values.clear();
    values.extend(positives.iter().chain(negatives).map(|s| feature.evaluate(s, 0, 0)));

    let mut wc = WeakClassifier::new(*feature);
    let error = wc.find_optimal_threshold(values, positives.len(), negatives.len(), weights);
    (wc, error)
}

#[inline]
fn better(a: &BestFeature, b: &BestFeature) -> bool {
    a.error < b.error || (a.error == b.error && a.index < b.index)
}

/// Find the feature whose optimal threshold has the lowest weighted error.
///
/// Ties resolve to the lowest index, so the result is independent of how
/// the scan is scheduled. Returns `None` when `features` is empty.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip_all,
        fields(features = features.len(), positives = positives.len(), negatives = negatives.len())
    )
)]
pub fn scan_features(
    features: &[Feature],
    positives: &[IntegralImage],
    negatives: &[IntegralImage],
    weights: &[f64],
) -> Option<BestFeature> {
    let n = positives.len() + negatives.len();

    #[cfg(feature = "rayon")]
    let best = features
        .par_iter()
        .enumerate()
        .map_init(
            || Vec::with_capacity(n),
            |values, (index, f)| {
                let (classifier, error) =
                    evaluate_feature(f, positives, negatives, weights, values);
                BestFeature {
                    index,
                    classifier,
                    error,
                }
            },
        )
        .reduce_with(|a, b| if better(&b, &a) { b } else { a });

    #[cfg(not(feature = "rayon"))]
    let best = {
        let mut values = Vec::with_capacity(n);
        let mut best: Option<BestFeature> = None;
        for (index, f) in features.iter().enumerate() {
            let (classifier, error) =
                evaluate_feature(f, positives, negatives, weights, &mut values);
            let cand = BestFeature {
                index,
                classifier,
                error,
            };
            if best.as_ref().map_or(true, |b| better(&cand, b)) {
                best = Some(cand);
            }
        }
        best
    };

    best
}

/// Boost one strong classifier until the cascade reaches `target.goal`.
///
/// After each round the in-progress stage is appended to `cascade`, the
/// cascade FPR on `data.validation` is measured and the stage is removed
/// again; `cascade` is unchanged on return. The loop also stops when the
/// stage already rejects every training negative or after
/// `params.max_rounds_per_stage` rounds. A winning error of 0.5 or more
/// aborts with [`TrainError::TrainingStalled`].
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip_all,
        fields(goal_index = target.goal_index, goal = target.goal)
    )
)]
pub fn train_stage(
    cascade: &mut CascadeClassifier,
    features: &[Feature],
    data: StageData<'_>,
    target: StageTarget,
    params: &TrainParams,
) -> Result<StageResult, TrainError> {
    let StageData {
        positives,
        negatives,
        validation,
    } = data;
    if positives.is_empty() {
        return Err(TrainError::EmptySet { set: "positive" });
    }
    if negatives.is_empty() {
        return Err(TrainError::EmptySet { set: "negative" });
    }
    if validation.is_empty() {
        return Err(TrainError::EmptySet { set: "validation" });
    }

    let mut weights = initial_weights(positives.len(), negatives.len());
    let mut values = Vec::with_capacity(weights.len());
    let mut strong = StrongClassifier::new();
    let mut cascade_fpr = 1.0;
    let mut rounds = 0;

    let reached_goal = loop {
        if cascade_fpr <= target.goal {
            break true;
        }
        if strong.false_positive_rate(negatives) == Some(0.0) {
            #[cfg(feature = "tracing")]
            warn!(
                rounds,
                cascade_fpr, "stage rejects every training negative before reaching goal"
            );
            break false;
        }
        if rounds >= params.max_rounds_per_stage {
            #[cfg(feature = "tracing")]
            warn!(rounds, cascade_fpr, "round limit reached before goal");
            break false;
        }

        normalize(&mut weights);

        let best = scan_features(features, positives, negatives, &weights)
            .ok_or(TrainError::EmptySet { set: "feature" })?;
        if !(best.error < 0.5) {
            return Err(TrainError::TrainingStalled {
                goal_index: target.goal_index,
                goal: target.goal,
                round: rounds,
                error: best.error,
            });
        }

        let error = best.error.max(params.min_weighted_error);
        let beta = error / (1.0 - error);

        let wc = best.classifier;
        reweight(&wc, positives, negatives, &mut weights, beta, &mut values);

        strong.add(wc, (1.0 / beta).ln())?;
        strong.calibrate_threshold(positives, params.max_stage_fnr);

        cascade.append_stage(strong.clone());
        cascade_fpr = cascade.false_positive_rate(validation).unwrap_or(0.0);
        cascade.remove_last_stage();

        rounds += 1;

        #[cfg(feature = "tracing")]
        debug!(
            round = rounds,
            feature = best.index,
            error = best.error,
            beta,
            threshold = strong.threshold(),
            cascade_fpr,
            "added weak classifier"
        );
    };

    Ok(StageResult {
        classifier: strong,
        rounds,
        validation_fpr: cascade_fpr,
        reached_goal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{generate_features, FeatureKind};

    /// 4x4 window, left half `left`, right half `right`.
    fn split(left: f64, right: f64) -> IntegralImage {
        let px: Vec<f64> = (0..16).map(|i| if i % 4 < 2 { left } else { right }).collect();
        IntegralImage::from_intensities(4, 4, &px).unwrap()
    }

    #[test]
    fn initial_weights_balance_classes() {
        let w = initial_weights(2, 8);
        assert_eq!(w.len(), 10);
        assert_eq!(&w[..2], &[0.25, 0.25]);
        assert!(w[2..].iter().all(|&v| v == 1.0 / 16.0));
        let pos: f64 = w[..2].iter().sum();
        let neg: f64 = w[2..].iter().sum();
        assert!((pos - 0.5).abs() < 1e-12 && (neg - 0.5).abs() < 1e-12);
    }

    #[test]
    fn scan_picks_separating_feature() {
        let positives = [split(9.0, 1.0), split(8.0, 0.0)];
        let negatives = [split(1.0, 1.0), split(0.0, 3.0)];
        let features = generate_features(4);
        let weights = initial_weights(2, 2);

        let best = scan_features(&features, &positives, &negatives, &weights).unwrap();
        assert_eq!(best.error, 0.0);
        assert_eq!(best.index, 0);
        assert_eq!(best.classifier.feature().kind(), FeatureKind::TwoHorizontal);
        for s in &positives {
            assert_eq!(best.classifier.classify(s, 0.0, 1.0), 1);
        }
        for s in &negatives {
            assert_eq!(best.classifier.classify(s, 0.0, 1.0), -1);
        }
    }

    #[test]
    fn scan_breaks_ties_by_enumeration_index() {
        // the same feature repeated: every candidate has the same error
        let f = Feature::new(FeatureKind::TwoVertical, 0, 0, 4, 4).unwrap();
        let features = vec![f; 64];
        let positives = [split(2.0, 1.0)];
        let negatives = [split(5.0, 0.0)];
        let weights = initial_weights(1, 1);
        let best = scan_features(&features, &positives, &negatives, &weights).unwrap();
        assert_eq!(best.index, 0);
    }

    #[test]
    fn reweight_shrinks_only_correct_examples() {
        let f = Feature::new(FeatureKind::TwoHorizontal, 0, 0, 4, 4).unwrap();
        let wc = WeakClassifier::with_threshold(f, 0.0, crate::weak::Polarity::BelowIsNegative);
        // votes: +1, -1 for the positives; -1, +1 for the negatives
        let positives = [split(3.0, 1.0), split(1.0, 3.0)];
        let negatives = [split(0.0, 2.0), split(4.0, 0.0)];
        let mut weights = vec![0.25; 4];
        let mut values = Vec::new();

        reweight(&wc, &positives, &negatives, &mut weights, 0.5, &mut values);
        assert_eq!(weights, vec![0.125, 0.25, 0.125, 0.25]);
        assert_eq!(values, vec![16.0, -16.0, -16.0, 32.0]);
        for (s, &v) in positives.iter().chain(&negatives).zip(&values) {
            assert_eq!(wc.classify_value(v), wc.classify(s, 0.0, 1.0));
        }
    }

    #[test]
    fn scan_of_no_features_is_none() {
        let weights = initial_weights(1, 1);
        assert!(scan_features(&[], &[split(1.0, 0.0)], &[split(0.0, 1.0)], &weights).is_none());
    }

    #[test]
    fn stage_reaches_goal_on_separable_data() {
        let positives: Vec<_> = (0..6).map(|i| split(10.0 + i as f64, 1.0)).collect();
        let negatives: Vec<_> = (0..6).map(|i| split(1.0, 2.0 + i as f64)).collect();
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);

        let res = train_stage(
            &mut cascade,
            &features,
            StageData {
                positives: &positives,
                negatives: &negatives,
                validation: &negatives,
            },
            StageTarget {
                goal_index: 0,
                goal: 0.5,
            },
            &TrainParams::default(),
        )
        .unwrap();

        assert!(res.reached_goal);
        assert_eq!(res.rounds, 1);
        assert_eq!(res.validation_fpr, 0.0);
        assert!(cascade.is_empty());
        assert!(res.classifier.members().iter().all(|(_, w)| *w > 0.0 && w.is_finite()));
        assert_eq!(res.classifier.false_negative_rate(&positives), Some(0.0));
    }

    #[test]
    fn indistinguishable_classes_stall() {
        let positives = vec![split(1.0, 1.0); 3];
        let negatives = vec![split(1.0, 1.0); 3];
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);

        let err = train_stage(
            &mut cascade,
            &features,
            StageData {
                positives: &positives,
                negatives: &negatives,
                validation: &negatives,
            },
            StageTarget {
                goal_index: 2,
                goal: 0.1,
            },
            &TrainParams::default(),
        )
        .unwrap_err();

        assert_eq!(
            err,
            TrainError::TrainingStalled {
                goal_index: 2,
                goal: 0.1,
                round: 0,
                error: 0.5
            }
        );
    }

    #[test]
    fn round_cap_stops_the_stage() {
        // overlapping classes: no single feature separates them
        let positives = vec![split(5.0, 1.0), split(1.0, 5.0), split(3.0, 3.0)];
        let negatives = vec![split(5.0, 1.0), split(1.0, 5.0), split(2.0, 2.0)];
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);
        let params = TrainParams::default().with_max_rounds_per_stage(3).with_max_stage_fnr(0.0);

        let res = train_stage(
            &mut cascade,
            &features,
            StageData {
                positives: &positives,
                negatives: &negatives,
                validation: &negatives,
            },
            StageTarget {
                goal_index: 0,
                goal: 0.0,
            },
            &params,
        );

        match res {
            Ok(stage) => {
                assert!(!stage.reached_goal);
                assert!(stage.rounds <= 3);
                assert_eq!(stage.classifier.false_negative_rate(&positives), Some(0.0));
            }
            Err(e) => assert!(matches!(e, TrainError::TrainingStalled { .. }), "{e}"),
        }
    }

    #[test]
    fn empty_sets_are_rejected() {
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);
        let some = vec![split(1.0, 0.0)];
        let err = train_stage(
            &mut cascade,
            &features,
            StageData {
                positives: &some,
                negatives: &[],
                validation: &some,
            },
            StageTarget {
                goal_index: 0,
                goal: 0.5,
            },
            &TrainParams::default(),
        )
        .unwrap_err();
        assert_eq!(err, TrainError::EmptySet { set: "negative" });
    }
}
