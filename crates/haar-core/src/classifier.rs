//! Accept/reject decision over a single window, plus rate measurement.
use crate::integral::IntegralImage;

/// Anything that accepts or rejects a training window at its origin.
///
/// Rates return `None` for an empty set: the fraction is undefined and
/// callers skip whatever depended on it.
pub trait Classifier {
    fn accepts(&self, sample: &IntegralImage) -> bool;

    /// Fraction of `negatives` wrongly accepted.
    fn false_positive_rate(&self, negatives: &[IntegralImage]) -> Option<f64> {
        fraction(negatives, |s| self.accepts(s))
    }

    /// Fraction of `positives` wrongly rejected.
    fn false_negative_rate(&self, positives: &[IntegralImage]) -> Option<f64> {
        fraction(positives, |s| !self.accepts(s))
    }
}

fn fraction(samples: &[IntegralImage], hit: impl Fn(&IntegralImage) -> bool) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let hits = samples.iter().filter(|s| hit(s)).count();
    Some(hits as f64 / samples.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrightWindow;

    impl Classifier for BrightWindow {
        fn accepts(&self, sample: &IntegralImage) -> bool {
            sample.value(sample.width() - 1, sample.height() - 1) > 10.0
        }
    }

    fn window(v: f64) -> IntegralImage {
        IntegralImage::from_intensities(2, 2, &[v; 4]).unwrap()
    }

    #[test]
    fn rates_count_mistakes() {
        let c = BrightWindow;
        let negatives = [window(0.0), window(5.0), window(1.0), window(0.5)];
        let positives = [window(5.0), window(1.0)];
        assert_eq!(c.false_positive_rate(&negatives), Some(0.25));
        assert_eq!(c.false_negative_rate(&positives), Some(0.5));
    }

    #[test]
    fn empty_sets_have_no_rate() {
        assert_eq!(BrightWindow.false_positive_rate(&[]), None);
        assert_eq!(BrightWindow.false_negative_rate(&[]), None);
    }
}
