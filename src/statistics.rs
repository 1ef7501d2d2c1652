//! Streaming statistics without retaining samples.
//!
//! [`OnlineStatistics`] accumulates count, extrema, sum, mean and the second
//! central moment of a stream of `f64` observations in a single pass, using
//! Welford's update. Two independent summaries can be merged into one that
//! describes the union of both streams (Chan et al. parallel formula), which
//! is what makes sharded accumulation and cross-node aggregation possible.
//!
//! [`StatisticsView`] is the immutable, point-in-time copy handed out by
//! counters to readers and exporters.
//!
//! # Invalid input
//!
//! Observations are never validated: a `NaN` added to a summary propagates to
//! its mean and variance. Monitoring code must not fail back into the
//! instrumented application, so data-quality problems surface in the numbers
//! rather than as errors.
//!
//! # Examples
//!
//! ```rust
//! use contatori_stats::statistics::OnlineStatistics;
//!
//! let mut stats = OnlineStatistics::new();
//! stats.add_value(2.0);
//! stats.add_value(4.0);
//! stats.add_value(6.0);
//!
//! assert_eq!(stats.n(), 3);
//! assert_eq!(stats.mean(), 4.0);
//! assert_eq!(stats.variance(), 4.0);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Single-pass summary of a stream of observations.
///
/// For `n == 0` the minimum, maximum and mean are `NaN`; the variance is
/// `NaN` for `n <= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnlineStatistics {
    n: u64,
    min: f64,
    max: f64,
    sum: f64,
    mean: f64,
    m2: f64,
}

impl OnlineStatistics {
    /// Creates an empty summary (the identity element of [`merge`](Self::merge)).
    pub const fn new() -> Self {
        OnlineStatistics {
            n: 0,
            min: f64::NAN,
            max: f64::NAN,
            sum: 0.0,
            mean: f64::NAN,
            m2: 0.0,
        }
    }

    /// Rebuilds a summary from its raw moments.
    ///
    /// Used to restore summaries computed elsewhere (e.g. on a remote node).
    /// When `n == 0` the other arguments are ignored and an empty summary is
    /// returned.
    pub fn from_parts(n: u64, min: f64, max: f64, sum: f64, mean: f64, m2: f64) -> Self {
        if n == 0 {
            return Self::new();
        }
        OnlineStatistics {
            n,
            min,
            max,
            sum,
            mean,
            m2,
        }
    }

    /// Adds one observation.
    #[inline]
    pub fn add_value(&mut self, x: f64) {
        self.n += 1;
        if self.n == 1 {
            self.min = x;
            self.max = x;
            self.sum = x;
            self.mean = x;
            self.m2 = 0.0;
            return;
        }
        if x < self.min {
            self.min = x;
        }
        if x > self.max {
            self.max = x;
        }
        self.sum += x;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Merges a summary of a disjoint set of observations into this one.
    ///
    /// Merging with an empty summary, on either side, is exact.
    pub fn merge(&mut self, other: &OnlineStatistics) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let n1 = self.n as f64;
        let n2 = other.n as f64;
        let n = n1 + n2;
        let delta = other.mean - self.mean;

        self.mean += delta * n2 / n;
        self.m2 += other.m2 + delta * delta * n1 * n2 / n;
        self.n += other.n;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Returns a new summary describing both `self` and `other`.
    pub fn merged(mut self, other: &OnlineStatistics) -> Self {
        self.merge(other);
        self
    }

    /// Returns to the empty state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Number of observations.
    #[inline]
    pub fn n(&self) -> u64 {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sum of squared deviations from the mean.
    #[inline]
    pub fn second_moment(&self) -> f64 {
        self.m2
    }

    /// Sample variance, `m2 / (n - 1)`; `NaN` for fewer than two observations.
    pub fn variance(&self) -> f64 {
        if self.n > 1 {
            self.m2 / (self.n - 1) as f64
        } else {
            f64::NAN
        }
    }

    /// Square root of [`variance`](Self::variance).
    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Immutable copy of this summary, without concurrency information.
    pub fn view(&self) -> StatisticsView {
        StatisticsView {
            hits: self.n,
            sum: self.sum,
            min: self.min,
            max: self.max,
            mean: self.mean,
            second_moment: self.m2,
            variance: self.variance(),
            standard_deviation: self.standard_deviation(),
            concurrency: 0,
            max_concurrency: 0,
        }
    }
}

impl Default for OnlineStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<f64> for OnlineStatistics {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for x in iter {
            self.add_value(x);
        }
    }
}

impl FromIterator<f64> for OnlineStatistics {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = OnlineStatistics::new();
        stats.extend(iter);
        stats
    }
}

/// Immutable point-in-time statistics of a counter.
///
/// Besides the moments of the observed values it carries the concurrency
/// gauge of the counter at the time the view was taken.
///
/// With the `serde` feature, undefined values (NaN) are written as `null`
/// and `null` reads back as NaN, so views of empty or single-hit counters
/// survive formats without a NaN literal such as JSON.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatisticsView {
    /// Number of observations.
    pub hits: u64,
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub sum: f64,
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub min: f64,
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub max: f64,
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub mean: f64,
    /// Sum of squared deviations from the mean, kept so views can be merged.
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub second_moment: f64,
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub variance: f64,
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub standard_deviation: f64,
    /// Operations in flight when the view was taken.
    pub concurrency: i64,
    /// Highest number of operations ever in flight at once.
    pub max_concurrency: i64,
}

impl StatisticsView {
    /// The view of a counter that never observed anything.
    pub fn empty() -> Self {
        OnlineStatistics::new().view()
    }

    /// Sets the concurrency fields, returning `self` for method chaining.
    pub fn with_concurrency(self, concurrency: i64, max_concurrency: i64) -> Self {
        Self {
            concurrency,
            max_concurrency,
            ..self
        }
    }

    /// Rebuilds the mergeable summary this view was taken from.
    pub fn to_statistics(&self) -> OnlineStatistics {
        OnlineStatistics::from_parts(
            self.hits,
            self.min,
            self.max,
            self.sum,
            self.mean,
            self.second_moment,
        )
    }
}

#[cfg(feature = "serde")]
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

impl From<&OnlineStatistics> for StatisticsView {
    fn from(stats: &OnlineStatistics) -> Self {
        stats.view()
    }
}

impl Default for StatisticsView {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn close(a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return a.is_nan() && b.is_nan();
        }
        let scale = a.abs().max(b.abs()).max(1.0);
        (a - b).abs() <= 1e-9 * scale
    }

    fn same(a: &OnlineStatistics, b: &OnlineStatistics) -> bool {
        a.n() == b.n()
            && close(a.min(), b.min())
            && close(a.max(), b.max())
            && close(a.sum(), b.sum())
            && close(a.mean(), b.mean())
            && close(a.second_moment(), b.second_moment())
    }

    #[test]
    fn test_new_is_empty() {
        let stats = OnlineStatistics::new();
        assert_eq!(stats.n(), 0);
        assert!(stats.is_empty());
        assert!(stats.min().is_nan());
        assert!(stats.max().is_nan());
        assert!(stats.mean().is_nan());
        assert!(stats.variance().is_nan());
        assert_eq!(stats.sum(), 0.0);
    }

    #[test]
    fn test_single_observation() {
        let mut stats = OnlineStatistics::new();
        stats.add_value(7.0);
        assert_eq!(stats.n(), 1);
        assert_eq!(stats.min(), 7.0);
        assert_eq!(stats.max(), 7.0);
        assert_eq!(stats.mean(), 7.0);
        assert!(stats.variance().is_nan());
        assert!(stats.standard_deviation().is_nan());
    }

    #[test]
    fn test_two_four_six() {
        let stats: OnlineStatistics = [2.0, 4.0, 6.0].into_iter().collect();
        assert_eq!(stats.n(), 3);
        assert_eq!(stats.min(), 2.0);
        assert_eq!(stats.max(), 6.0);
        assert_eq!(stats.sum(), 12.0);
        assert_eq!(stats.mean(), 4.0);
        assert_eq!(stats.variance(), 4.0);
        assert_eq!(stats.standard_deviation(), 2.0);
    }

    #[test]
    fn test_negative_values() {
        let stats: OnlineStatistics = [-3.0, 1.0, -1.0].into_iter().collect();
        assert_eq!(stats.min(), -3.0);
        assert_eq!(stats.max(), 1.0);
        assert_eq!(stats.sum(), -3.0);
        assert_eq!(stats.mean(), -1.0);
    }

    #[test]
    fn test_nan_propagates() {
        let mut stats = OnlineStatistics::new();
        stats.add_value(1.0);
        stats.add_value(f64::NAN);
        stats.add_value(3.0);
        assert_eq!(stats.n(), 3);
        assert!(stats.mean().is_nan());
        assert!(stats.variance().is_nan());
    }

    #[test]
    fn test_reset() {
        let mut stats: OnlineStatistics = [1.0, 2.0].into_iter().collect();
        stats.reset();
        assert!(stats.is_empty());
        assert!(stats.mean().is_nan());
        stats.add_value(5.0);
        assert_eq!(stats.n(), 1);
        assert_eq!(stats.sum(), 5.0);
        assert_eq!(stats.mean(), 5.0);
    }

    #[test]
    fn test_merge_weighted_means() {
        let a = OnlineStatistics::from_parts(10, 1.0, 9.0, 50.0, 5.0, 12.0);
        let b = OnlineStatistics::from_parts(20, 2.0, 14.0, 160.0, 8.0, 30.0);
        let merged = a.merged(&b);
        assert_eq!(merged.n(), 30);
        assert!(close(merged.mean(), 7.0));
        assert_eq!(merged.sum(), 210.0);
        assert_eq!(merged.min(), 1.0);
        assert_eq!(merged.max(), 14.0);
        // 12 + 30 + 3^2 * 10 * 20 / 30
        assert!(close(merged.second_moment(), 102.0));
    }

    #[test]
    fn test_merge_empty_left_is_exact() {
        let s: OnlineStatistics = [0.1, 0.7, 1.3].into_iter().collect();
        let merged = OnlineStatistics::new().merged(&s);
        assert_eq!(merged, s);
    }

    #[test]
    fn test_merge_empty_right_is_exact() {
        let s: OnlineStatistics = [0.1, 0.7, 1.3].into_iter().collect();
        assert_eq!(s.merged(&OnlineStatistics::new()), s);
    }

    #[test]
    fn test_from_parts_zero_is_empty() {
        let s = OnlineStatistics::from_parts(0, 1.0, 2.0, 3.0, 4.0, 5.0);
        assert!(s.is_empty());
        assert!(s.mean().is_nan());
    }

    #[test]
    fn test_view_round_trip_keeps_moments() {
        let s: OnlineStatistics = [3.0, 5.0, 10.0].into_iter().collect();
        let view = s.view().with_concurrency(2, 4);
        assert_eq!(view.hits, 3);
        assert_eq!(view.concurrency, 2);
        assert_eq!(view.max_concurrency, 4);
        assert_eq!(view.to_statistics(), s);
    }

    #[test]
    fn test_empty_view() {
        let view = StatisticsView::empty();
        assert_eq!(view.hits, 0);
        assert!(view.mean.is_nan());
        assert!(view.variance.is_nan());
        assert!(view.to_statistics().is_empty());
    }

    #[quickcheck]
    fn prop_merge_matches_concatenation(values: Vec<i16>, split: usize) -> bool {
        let values: Vec<f64> = values.into_iter().map(|v| v as f64 / 8.0).collect();
        let at = if values.is_empty() { 0 } else { split % (values.len() + 1) };
        let (left, right) = values.split_at(at);

        let whole: OnlineStatistics = values.iter().copied().collect();
        let a: OnlineStatistics = left.iter().copied().collect();
        let b: OnlineStatistics = right.iter().copied().collect();

        same(&a.merged(&b), &whole) && same(&b.merged(&a), &whole)
    }

    #[quickcheck]
    fn prop_merge_is_associative(a: Vec<i16>, b: Vec<i16>, c: Vec<i16>) -> bool {
        let to_stats =
            |v: &[i16]| -> OnlineStatistics { v.iter().map(|x| *x as f64).collect() };
        let (a, b, c) = (to_stats(&a), to_stats(&b), to_stats(&c));
        same(&a.merged(&b).merged(&c), &a.merged(&b.merged(&c)))
    }

    #[quickcheck]
    fn prop_merge_identity(values: Vec<i16>) -> bool {
        let s: OnlineStatistics = values.iter().map(|x| *x as f64).collect();
        let merged = s.merged(&OnlineStatistics::new());
        merged.n() == s.n()
            && merged.sum() == s.sum()
            && merged.second_moment() == s.second_moment()
            && (merged.mean() == s.mean() || (s.is_empty() && merged.mean().is_nan()))
    }
}
