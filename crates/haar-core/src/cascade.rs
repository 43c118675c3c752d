//! Stage sequences with early rejection and the multi-goal training loop.
use crate::boost::{train_stage, StageData, StageTarget};
use crate::classifier::Classifier;
use crate::error::TrainError;
use crate::feature::Feature;
use crate::integral::IntegralImage;
use crate::strong::StrongClassifier;
use crate::TrainParams;

#[cfg(feature = "tracing")]
use tracing::{info, instrument, warn};

/// Ordered stages combined by logical AND plus the nominal window size.
///
/// A window is rejected by the first stage that rejects it; later stages are
/// never evaluated for it. Stages are only ever appended by training.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeClassifier<C = StrongClassifier> {
    stages: Vec<C>,
    base_resolution: u16,
}

/// Sample sets consumed by [`CascadeClassifier::train`].
///
/// `positives` and `negatives` are the working sets; they shrink as stages
/// are committed. `validation` stays fixed and drives the per-round FPR
/// check.
#[derive(Clone, Debug, Default)]
pub struct TrainingSet {
    pub positives: Vec<IntegralImage>,
    pub negatives: Vec<IntegralImage>,
    pub validation: Vec<IntegralImage>,
}

/// Why a goal produced no stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SkipReason {
    /// The cascade's FPR on the working negatives was already under the goal.
    AlreadyBelowGoal { fpr: f64 },
    /// Mining found no negative the cascade still accepts.
    NoHardNegatives,
    /// Every positive was pruned by earlier stages.
    NoPositives,
}

/// Outcome of one goal.
#[derive(Clone, Debug, PartialEq)]
pub enum StageReport {
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
        reason: SkipReason,
    },
}

/// One entry per goal, in goal order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainReport {
    pub stages: Vec<StageReport>,
}

impl TrainReport {
    /// Number of stages appended by the run.
    pub fn trained(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| matches!(s, StageReport::Trained { .. }))
            .count()
    }
}

impl<C> CascadeClassifier<C> {
    pub fn new(base_resolution: u16) -> Self {
        Self {
            stages: Vec::new(),
            base_resolution,
        }
    }

    pub fn append_stage(&mut self, stage: C) {
        self.stages.push(stage);
    }

    pub fn remove_last_stage(&mut self) -> Option<C> {
        self.stages.pop()
    }

    pub fn stages(&self) -> &[C] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[inline]
    pub fn base_resolution(&self) -> u16 {
        self.base_resolution
    }
}

impl<C: Classifier> Classifier for CascadeClassifier<C> {
    /// Samples smaller than the base window are rejected without evaluating
    /// any stage.
    fn accepts(&self, sample: &IntegralImage) -> bool {
        let base = self.base_resolution as usize;
        if sample.width() < base || sample.height() < base {
            return false;
        }
        for stage in &self.stages {
            if !stage.accepts(sample) {
                return false;
            }
        }
        true
    }
}

impl CascadeClassifier<StrongClassifier> {
    /// Scale every stage threshold by `p`. Values above 1 make a cascade of
    /// positive thresholds stricter.
    pub fn strictness(&mut self, p: f64) {
        for stage in &mut self.stages {
            stage.strictness(p);
        }
    }

    /// Adapt the cascade to a window `factor` times the base resolution.
    ///
    /// Every feature is kept inside the new window. The new resolution must
    /// be at least 3, the widest cell grid of any shape.
    pub fn rescale(&mut self, factor: f64) -> Result<(), TrainError> {
        let resolution = (self.base_resolution as f64 * factor).round();
        if !(factor > 0.0 && factor.is_finite()) || !(3.0..=u16::MAX as f64).contains(&resolution)
        {
            return Err(TrainError::InvalidParameter {
                name: "rescale factor",
                value: factor,
            });
        }

        self.base_resolution = resolution as u16;
        for stage in &mut self.stages {
            stage.rescale(factor, self.base_resolution);
        }
        Ok(())
    }

    /// Grow the cascade by one stage per entry of `goals`.
    ///
    /// For each goal the current cascade first checks its FPR on the working
    /// negatives and skips the goal if that is already below it. Otherwise
    /// the negatives it still accepts are mined, a stage is boosted on them
    /// until the cascade FPR on `set.validation` reaches the goal, the stage
    /// is appended, and every working example the new stage rejects is
    /// dropped. Goals whose mined negatives or remaining positives are empty
    /// are skipped.
    ///
    /// A stalled stage aborts training; stages committed before it stay in
    /// the cascade.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(
                goals = goals.len(),
                features = features.len(),
                positives = set.positives.len(),
                negatives = set.negatives.len(),
                validation = set.validation.len()
            )
        )
    )]
    pub fn train(
        &mut self,
        features: &[Feature],
        set: TrainingSet,
        goals: &[f64],
        params: &TrainParams,
    ) -> Result<TrainReport, TrainError> {
        params.validate()?;
        if let Some(&goal) = goals.iter().find(|g| !(0.0..=1.0).contains(*g)) {
            return Err(TrainError::InvalidParameter {
                name: "fpr goal",
                value: goal,
            });
        }
        if features.is_empty() {
            return Err(TrainError::EmptySet { set: "feature" });
        }
        if set.validation.is_empty() {
            return Err(TrainError::EmptySet { set: "validation" });
        }

        let TrainingSet {
            mut positives,
            mut negatives,
            validation,
        } = set;
        let mut report = TrainReport::default();

        for (goal_index, &goal) in goals.iter().enumerate() {
            let skip = |reason| StageReport::Skipped {
                goal_index,
                goal,
                reason,
            };

            if let Some(fpr) = self.false_positive_rate(&negatives) {
                if fpr < goal {
                    #[cfg(feature = "tracing")]
                    info!(goal_index, goal, fpr, "cascade already below goal, skipping");
                    report.stages.push(skip(SkipReason::AlreadyBelowGoal { fpr }));
                    continue;
                }
            }

            let hard_negatives: Vec<IntegralImage> =
                negatives.iter().filter(|n| self.accepts(n)).cloned().collect();
            if positives.is_empty() {
                #[cfg(feature = "tracing")]
                warn!(goal_index, goal, "no positives left, skipping");
                report.stages.push(skip(SkipReason::NoPositives));
                continue;
            }
            if hard_negatives.is_empty() {
                #[cfg(feature = "tracing")]
                warn!(goal_index, goal, "no hard negatives left, skipping");
                report.stages.push(skip(SkipReason::NoHardNegatives));
                continue;
            }

            let stage = train_stage(
                self,
                features,
                StageData {
                    positives: &positives,
                    negatives: &hard_negatives,
                    validation: &validation,
                },
                StageTarget { goal_index, goal },
                params,
            )?;

            let before = (positives.len(), negatives.len());
            positives.retain(|p| stage.classifier.accepts(p));
            negatives.retain(|n| stage.classifier.accepts(n));
            let pruned_positives = before.0 - positives.len();
            let pruned_negatives = before.1 - negatives.len();

            #[cfg(feature = "tracing")]
            info!(
                goal_index,
                goal,
                rounds = stage.rounds,
                validation_fpr = stage.validation_fpr,
                reached_goal = stage.reached_goal,
                pruned_positives,
                pruned_negatives,
                "stage committed"
            );

            report.stages.push(StageReport::Trained {
                goal_index,
                goal,
                rounds: stage.rounds,
                weak_classifiers: stage.classifier.len(),
                threshold: stage.classifier.threshold(),
                hard_negatives: hard_negatives.len(),
                validation_fpr: stage.validation_fpr,
                reached_goal: stage.reached_goal,
                pruned_positives,
                pruned_negatives,
            });
            self.append_stage(stage.classifier);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{generate_features, FeatureKind};
    use crate::weak::{Polarity, WeakClassifier};

    fn split(left: f64, right: f64) -> IntegralImage {
        let px: Vec<f64> = (0..16).map(|i| if i % 4 < 2 { left } else { right }).collect();
        IntegralImage::from_intensities(4, 4, &px).unwrap()
    }

    enum Stage {
        Accept,
        Reject,
        Canary,
    }

    impl Classifier for Stage {
        fn accepts(&self, _: &IntegralImage) -> bool {
            match self {
                Stage::Accept => true,
                Stage::Reject => false,
                Stage::Canary => panic!("stage evaluated after an earlier rejection"),
            }
        }
    }

    fn separable() -> TrainingSet {
        let positives: Vec<_> = (0..6).map(|i| split(10.0 + i as f64, 1.0)).collect();
        let negatives: Vec<_> = (0..6).map(|i| split(1.0, 2.0 + i as f64)).collect();
        TrainingSet {
            positives,
            validation: negatives.clone(),
            negatives,
        }
    }

    #[test]
    fn rejection_stops_evaluation() {
        let mut cascade = CascadeClassifier::new(4);
        cascade.append_stage(Stage::Accept);
        cascade.append_stage(Stage::Reject);
        cascade.append_stage(Stage::Canary);
        assert!(!cascade.accepts(&split(0.0, 0.0)));
        assert_eq!(cascade.false_positive_rate(&[split(1.0, 0.0), split(0.0, 1.0)]), Some(0.0));
    }

    #[test]
    fn empty_cascade_accepts_everything() {
        let cascade: CascadeClassifier = CascadeClassifier::new(4);
        assert!(cascade.accepts(&split(3.0, 1.0)));
        assert_eq!(cascade.false_negative_rate(&[split(0.0, 0.0)]), Some(0.0));
        assert_eq!(cascade.false_positive_rate(&[]), None);
    }

    #[test]
    fn undersized_samples_are_rejected_before_any_stage() {
        let mut cascade = CascadeClassifier::new(8);
        cascade.append_stage(Stage::Canary);
        assert!(!cascade.accepts(&split(5.0, 1.0)));
        let tall = IntegralImage::from_intensities(4, 8, &[1.0; 32]).unwrap();
        assert!(!cascade.accepts(&tall));
    }

    #[test]
    fn speculative_append_and_remove() {
        let mut cascade = CascadeClassifier::new(4);
        cascade.append_stage(Stage::Accept);
        cascade.append_stage(Stage::Reject);
        assert!(matches!(cascade.remove_last_stage(), Some(Stage::Reject)));
        assert_eq!(cascade.len(), 1);
        assert!(cascade.accepts(&split(0.0, 0.0)));
    }

    #[test]
    fn training_commits_one_stage_then_runs_out_of_negatives() {
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);
        let report = cascade
            .train(&features, separable(), &[0.5, 0.3], &TrainParams::default())
            .unwrap();

        assert_eq!(cascade.len(), 1);
        assert_eq!(report.trained(), 1);
        match &report.stages[0] {
            StageReport::Trained {
                goal_index,
                rounds,
                hard_negatives,
                validation_fpr,
                reached_goal,
                pruned_positives,
                pruned_negatives,
                ..
            } => {
                assert_eq!(*goal_index, 0);
                assert_eq!(*rounds, 1);
                assert_eq!(*hard_negatives, 6);
                assert_eq!(*validation_fpr, 0.0);
                assert!(*reached_goal);
                assert_eq!(*pruned_positives, 0);
                assert_eq!(*pruned_negatives, 6);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            report.stages[1],
            StageReport::Skipped {
                goal_index: 1,
                goal: 0.3,
                reason: SkipReason::NoHardNegatives
            }
        );

        let set = separable();
        assert_eq!(cascade.false_positive_rate(&set.negatives), Some(0.0));
        assert_eq!(cascade.false_negative_rate(&set.positives), Some(0.0));
    }

    #[test]
    fn resumed_training_skips_goals_already_met() {
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);
        cascade.train(&features, separable(), &[0.5], &TrainParams::default()).unwrap();

        let report = cascade
            .train(&features, separable(), &[0.2], &TrainParams::default())
            .unwrap();
        assert_eq!(
            report.stages,
            vec![StageReport::Skipped {
                goal_index: 0,
                goal: 0.2,
                reason: SkipReason::AlreadyBelowGoal { fpr: 0.0 }
            }]
        );
        assert_eq!(cascade.len(), 1);
    }

    #[test]
    fn missing_positives_skip_the_goal() {
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);
        let mut set = separable();
        set.positives.clear();
        let report = cascade.train(&features, set, &[0.5], &TrainParams::default()).unwrap();
        assert!(matches!(
            report.stages[0],
            StageReport::Skipped {
                reason: SkipReason::NoPositives,
                ..
            }
        ));
        assert!(cascade.is_empty());
    }

    #[test]
    fn stall_aborts_without_committing() {
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);
        let same = vec![split(2.0, 2.0); 4];
        let set = TrainingSet {
            positives: same.clone(),
            negatives: same.clone(),
            validation: same,
        };
        let err = cascade.train(&features, set, &[0.5], &TrainParams::default()).unwrap_err();
        assert!(matches!(err, TrainError::TrainingStalled { goal_index: 0, .. }));
        assert!(cascade.is_empty());
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let features = generate_features(4);
        let mut cascade = CascadeClassifier::new(4);
        let params = TrainParams::default();

        let mut set = separable();
        set.validation.clear();
        assert_eq!(
            cascade.train(&features, set, &[0.5], &params).unwrap_err(),
            TrainError::EmptySet { set: "validation" }
        );
        assert_eq!(
            cascade.train(&[], separable(), &[0.5], &params).unwrap_err(),
            TrainError::EmptySet { set: "feature" }
        );
        assert!(matches!(
            cascade.train(&features, separable(), &[0.5, 1.5], &params),
            Err(TrainError::InvalidParameter { name: "fpr goal", .. })
        ));
        assert!(cascade
            .train(&features, separable(), &[0.5], &params.clone().with_max_stage_fnr(-0.1))
            .is_err());
    }

    #[test]
    fn strictness_and_rescale_reach_every_stage() {
        let f = Feature::new(FeatureKind::TwoHorizontal, 1, 0, 2, 4).unwrap();
        let wc = WeakClassifier::with_threshold(f, 2.0, Polarity::BelowIsNegative);
        let stage = StrongClassifier::from_parts(vec![(wc, 1.5)], 1.0).unwrap();
        let mut cascade = CascadeClassifier::new(24);
        cascade.append_stage(stage.clone());
        cascade.append_stage(stage);

        cascade.strictness(0.5);
        assert!(cascade.stages().iter().all(|s| s.threshold() == 0.5));

        cascade.rescale(2.0).unwrap();
        assert_eq!(cascade.base_resolution(), 48);
        for s in cascade.stages() {
            let (wc, _) = s.members()[0];
            assert_eq!(wc.threshold(), 8.0);
            assert_eq!(wc.feature().origin(), (2, 0));
            assert_eq!((wc.feature().width(), wc.feature().height()), (4, 8));
        }

        assert!(cascade.rescale(0.0).is_err());
        assert!(cascade.rescale(f64::NAN).is_err());
        assert!(cascade.rescale(1e-6).is_err());
        assert!(cascade.rescale(0.05).is_err());
        assert_eq!(cascade.base_resolution(), 48);
    }

    #[test]
    fn rescaled_cascade_classifies_full_size_windows() {
        // every feature of a 24 window, one weak classifier each
        let members: Vec<_> = generate_features(24)
            .into_iter()
            .map(|f| (WeakClassifier::with_threshold(f, 0.0, Polarity::BelowIsPositive), 1.0))
            .collect();
        let stage = StrongClassifier::from_parts(members, f64::NEG_INFINITY).unwrap();
        let mut cascade = CascadeClassifier::new(24);
        cascade.append_stage(stage);

        cascade.rescale(1.5).unwrap();
        assert_eq!(cascade.base_resolution(), 36);
        for (wc, _) in cascade.stages()[0].members() {
            assert!(wc.feature().fits(36), "{:?}", wc.feature());
        }

        let px: Vec<f64> = (0..36 * 36).map(|i| ((i * 13) % 7) as f64).collect();
        let window = IntegralImage::from_intensities(36, 36, &px).unwrap();
        assert!(cascade.accepts(&window));
    }
}
