use rand::Rng;
use rv::misc::pflip;

/// Sample an index from a vector of unnormalized, non-negative weights.
///
/// Only indices `0..=last` take part in the draw (all of them when `last` is
/// `None`). When the considered mass is zero, `last` is returned.
///
/// # Panics
/// If `weights` is empty or `last` is out of bounds.
pub fn sample_unnormalized<R: Rng>(
    weights: &[f64],
    last: Option<usize>,
    rng: &mut R,
) -> usize {
    assert!(!weights.is_empty(), "cannot sample from an empty weight vector");
    let last = last.unwrap_or(weights.len() - 1);
    assert!(
        last < weights.len(),
        "last index {last} out of bounds for {} weights",
        weights.len()
    );

    let support = &weights[..=last];
    let total: f64 = support.iter().sum();
    if total > 0.0 {
        pflip(support, Some(total), rng)
    } else {
        last
    }
}

/// Prevent the inner value from being verbosely / pretty printed during a debug.
pub(crate) struct NoPrettyPrint<T: std::fmt::Debug>(pub T);

impl<T: std::fmt::Debug> NoPrettyPrint<T> {
    pub const fn new(t: T) -> Self {
        Self(t)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for NoPrettyPrint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Prevent "{:#?}" from being used.
        write!(f, "{:?}", self.0)
    }
}

/// Online Mean and Variance
#[derive(Default, Debug, Clone, Copy)]
pub struct MeanAndVariance {
    count: usize,
    mean: f64,
    m2: f64,
}

impl MeanAndVariance {
    #[must_use]
    pub fn update(self, new_value: f64) -> Self {
        let count = self.count + 1;
        let delta = new_value - self.mean;
        #[allow(clippy::cast_precision_loss)]
        let mean = self.mean + delta / (count as f64);
        let delta2 = new_value - mean;
        let m2 = delta.mul_add(delta2, self.m2);

        Self { count, mean, m2 }
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / ((self.count - 1) as f64)
        }
    }
}

impl FromIterator<f64> for MeanAndVariance {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::default(), |acc, x| acc.update(x))
    }
}

/// Two-sample distribution check shared by the sampler tests.
///
/// Panics when the KS p-value drops below `min_p_value`, leaving both samples
/// in a persistent temp file for inspection.
#[cfg(test)]
pub(crate) fn assert_same_distribution(a: &[f64], b: &[f64], min_p_value: f64) {
    use rv::misc::{ks_two_sample, KsAlternative, KsMode};
    use serde::Serialize;

    let (stat, alpha) = ks_two_sample(a, b, KsMode::Auto, KsAlternative::TwoSided)
        .expect("KS Two sample should be valid");

    if alpha < min_p_value {
        #[derive(Serialize)]
        struct Samples<'a> {
            a: &'a [f64],
            b: &'a [f64],
        }

        let mut file = tempfile::NamedTempFile::new().expect("to be able to create a temp file");

        serde_json::to_writer(&mut file, &Samples { a, b }).expect("to write to file");

        let (_, path) = file.keep().expect("to be able to make a persistent temp file");
        let path = path.display();

        panic!(
            "KS alpha is lower than bound: {alpha:5.3} < {min_p_value:5.3} (ks stat = {stat}) (Debug file: {path})"
        );
    }
}
