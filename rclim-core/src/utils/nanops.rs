//! Missing-aware accumulators.
//!
//! Missing samples are `NaN` and are skipped: they count towards neither the
//! numerator nor the denominator of a mean.

use crate::timeseries::FloatValue;

/// Running sum and count of non-missing samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeanAccumulator {
    sum: FloatValue,
    count: usize,
}

impl MeanAccumulator {
    pub fn push(&mut self, value: FloatValue) {
        if !value.is_nan() {
            self.sum += value;
            self.count += 1;
        }
    }

    pub fn with(mut self, value: FloatValue) -> Self {
        self.push(value);
        self
    }

    pub fn merge(&mut self, other: &Self) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of the accumulated samples, `NaN` when none were valid
    pub fn mean(&self) -> FloatValue {
        if self.count == 0 {
            FloatValue::NAN
        } else {
            self.sum / self.count as FloatValue
        }
    }
}

/// Running weighted sum and the sum of weights of non-missing samples.
///
/// Partial sums from disjoint sets of cells can be merged, which is how
/// block-wise spatial means are combined.
///
/// Valid samples are also counted without weights. When every valid sample has
/// a zero weight (cells on a pole row) the mean falls back to their plain mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedAccumulator {
    sum: FloatValue,
    weight: FloatValue,
    unweighted: MeanAccumulator,
}

impl WeightedAccumulator {
    pub fn push(&mut self, value: FloatValue, weight: FloatValue) {
        if value.is_nan() {
            return;
        }
        self.unweighted.push(value);
        if weight > 0.0 {
            self.sum += value * weight;
            self.weight += weight;
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.sum += other.sum;
        self.weight += other.weight;
        self.unweighted.merge(&other.unweighted);
    }

    pub fn weight(&self) -> FloatValue {
        self.weight
    }

    /// Number of valid samples, whatever their weight
    pub fn count(&self) -> usize {
        self.unweighted.count()
    }

    /// Weighted mean normalised by the weights of valid samples only
    pub fn mean(&self) -> FloatValue {
        if self.weight > 0.0 {
            self.sum / self.weight
        } else {
            self.unweighted.mean()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_ignores_nan() {
        let acc = [1.0, FloatValue::NAN, 3.0]
            .iter()
            .fold(MeanAccumulator::default(), |acc, v| acc.with(*v));
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.mean(), 2.0);
    }

    #[test]
    fn empty_mean_is_nan() {
        assert!(MeanAccumulator::default().mean().is_nan());
        assert!(MeanAccumulator::default().with(FloatValue::NAN).mean().is_nan());
        assert!(WeightedAccumulator::default().mean().is_nan());
    }

    #[test]
    fn weighted_merge_matches_single_pass() {
        let samples = [(1.0, 0.5), (FloatValue::NAN, 1.0), (4.0, 1.0), (2.0, 0.25)];

        let mut whole = WeightedAccumulator::default();
        samples.iter().for_each(|(v, w)| whole.push(*v, *w));

        let mut left = WeightedAccumulator::default();
        let mut right = WeightedAccumulator::default();
        samples[..2].iter().for_each(|(v, w)| left.push(*v, *w));
        samples[2..].iter().for_each(|(v, w)| right.push(*v, *w));
        left.merge(&right);

        assert_eq!(left, whole);
        assert!((whole.mean() - (0.5 + 4.0 + 0.5) / 1.75).abs() < 1e-12);
    }

    #[test]
    fn zero_weights_fall_back_to_plain_mean() {
        let mut acc = WeightedAccumulator::default();
        acc.push(4.0, 0.0);
        acc.push(FloatValue::NAN, 0.0);
        acc.push(6.0, 0.0);
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.weight(), 0.0);
        assert_eq!(acc.mean(), 5.0);

        // Any positive weight takes precedence
        let mut other = WeightedAccumulator::default();
        other.push(1.0, 0.5);
        acc.merge(&other);
        assert_eq!(acc.mean(), 1.0);
    }
}
