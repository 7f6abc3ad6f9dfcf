use serde::Serialize;
use thiserror::Error;

/// A bucketed histogram as exported by a metric source.
///
/// `counts[i]` is the number of observations in `[buckets[i], buckets[i + 1])`,
/// so there is always one more boundary than there are counts. The first
/// boundary may be `-inf` and the last `+inf`; those buckets hold overflow
/// and are ignored when computing totals and percentiles.
///
/// Snapshots read from a source are cumulative since process start. Only the
/// difference of two snapshots (see [`Histogram::sub`]) describes what
/// happened over an interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<u64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum HistogramError {
    #[error("histogram needs at least one bucket")]
    NoBuckets,

    #[error("expected {expected} bucket boundaries for {counts} counts, got {got}")]
    BoundaryCount {
        counts: usize,
        expected: usize,
        got: usize,
    },

    #[error("bucket boundaries must be strictly ascending (index {index})")]
    NotAscending { index: usize },

    #[error("bucket boundary {index} is NaN")]
    NanBoundary { index: usize },
}

impl Histogram {
    /// Build a histogram, checking that boundaries and counts line up.
    pub fn new(buckets: Vec<f64>, counts: Vec<u64>) -> Result<Self, HistogramError> {
        if counts.is_empty() {
            return Err(HistogramError::NoBuckets);
        }
        if buckets.len() != counts.len() + 1 {
            return Err(HistogramError::BoundaryCount {
                counts: counts.len(),
                expected: counts.len() + 1,
                got: buckets.len(),
            });
        }
        if let Some(index) = buckets.iter().position(|b| b.is_nan()) {
            return Err(HistogramError::NanBoundary { index });
        }
        if let Some(index) = buckets.windows(2).position(|w| w[0] >= w[1]) {
            return Err(HistogramError::NotAscending { index: index + 1 });
        }
        Ok(Self { buckets, counts })
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Subtract an earlier cumulative snapshot from a later one, yielding
    /// the interval histogram for the time between them.
    ///
    /// Both snapshots must come from the same monotonic source. Mismatched
    /// boundaries or a count going backwards mean that source is broken, so
    /// this panics instead of clamping.
    pub fn sub(later: &Histogram, earlier: &Histogram) -> Histogram {
        assert_eq!(
            later.buckets, earlier.buckets,
            "cannot diff histograms with different bucket boundaries"
        );
        let counts = later
            .counts
            .iter()
            .zip(&earlier.counts)
            .enumerate()
            .map(|(i, (&l, &e))| {
                l.checked_sub(e).unwrap_or_else(|| {
                    panic!("cumulative count went backwards in bucket {i}: {e} -> {l}")
                })
            })
            .collect();
        Histogram {
            buckets: later.buckets.clone(),
            counts,
        }
    }

    /// Sum of all counts outside the infinite overflow buckets.
    pub fn total(&self) -> u64 {
        self.finite_indices().map(|i| self.counts[i]).sum()
    }

    /// Estimate the value below which fraction `p` of the mass falls.
    ///
    /// The result has bucket resolution only:
    ///   p == 0   → lowest non-overflow boundary
    ///   p == 1   → upper boundary of the highest bucket holding mass
    ///   0<p<1    → midpoint of the highest bucket whose tail mass
    ///              (counted from the top) first reaches `1 - p`
    ///
    /// A histogram with no mass yields the lowest boundary for every `p`.
    pub fn percentile(&self, p: f64) -> f64 {
        debug_assert!((0.0..=1.0).contains(&p), "percentile out of range: {p}");
        let p = p.clamp(0.0, 1.0);

        let lowest = self.buckets[self.first_finite()];
        let total = self.total();
        if p == 0.0 || total == 0 {
            return lowest;
        }

        // Walk down from the top; high percentiles are the common case.
        let mut cumulative = 0u64;
        let (mut min, mut max) = (lowest, lowest);
        for i in self.finite_indices().rev() {
            min = self.buckets[i];
            max = self.buckets[i + 1];
            cumulative += self.counts[i];
            if p == 1.0 {
                if cumulative > 0 {
                    return max;
                }
            } else if (total - cumulative) as f64 <= total as f64 * p {
                break;
            }
        }
        (min + max) / 2.0
    }

    fn first_finite(&self) -> usize {
        usize::from(self.buckets[0] == f64::NEG_INFINITY)
    }

    fn finite_indices(&self) -> std::ops::Range<usize> {
        let n = self.counts.len();
        let end = if self.buckets[n] == f64::INFINITY { n - 1 } else { n };
        self.first_finite()..end.max(self.first_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INF: f64 = f64::INFINITY;

    fn hist(buckets: &[f64], counts: &[u64]) -> Histogram {
        Histogram::new(buckets.to_vec(), counts.to_vec()).unwrap()
    }

    #[test]
    fn new_rejects_bad_shapes() {
        assert_eq!(
            Histogram::new(vec![0.0], vec![]),
            Err(HistogramError::NoBuckets)
        );
        assert_eq!(
            Histogram::new(vec![0.0, 1.0], vec![1, 2]),
            Err(HistogramError::BoundaryCount {
                counts: 2,
                expected: 3,
                got: 2
            })
        );
        assert_eq!(
            Histogram::new(vec![0.0, 2.0, 1.0], vec![1, 2]),
            Err(HistogramError::NotAscending { index: 2 })
        );
        assert_eq!(
            Histogram::new(vec![0.0, f64::NAN], vec![1]),
            Err(HistogramError::NanBoundary { index: 1 })
        );
    }

    #[test]
    fn sub_yields_interval_counts() {
        let later = hist(&[0.0, 1.0, 2.0, INF], &[5, 9, 3]);
        let earlier = hist(&[0.0, 1.0, 2.0, INF], &[2, 9, 1]);
        let interval = Histogram::sub(&later, &earlier);
        assert_eq!(interval.counts(), &[3, 0, 2]);
        assert_eq!(interval.buckets(), later.buckets());
    }

    #[test]
    #[should_panic(expected = "went backwards")]
    fn sub_panics_on_decreasing_counts() {
        let later = hist(&[0.0, 1.0, 2.0], &[1, 1]);
        let earlier = hist(&[0.0, 1.0, 2.0], &[2, 1]);
        Histogram::sub(&later, &earlier);
    }

    #[test]
    #[should_panic(expected = "different bucket boundaries")]
    fn sub_panics_on_mismatched_boundaries() {
        let a = hist(&[0.0, 1.0, 2.0], &[1, 1]);
        let b = hist(&[0.0, 1.0, 3.0], &[1, 1]);
        Histogram::sub(&a, &b);
    }

    #[test]
    fn total_skips_infinite_overflow_buckets() {
        let h = hist(&[-INF, 0.0, 1.0, INF], &[7, 4, 9]);
        assert_eq!(h.total(), 4);

        let finite = hist(&[0.0, 1.0, 2.0], &[7, 4]);
        assert_eq!(finite.total(), 11);
    }

    #[test]
    fn percentile_picks_bucket_midpoint() {
        // 100 observations: 90 in [0,1), 9 in [1,2), 1 in [2,4)
        let h = hist(&[0.0, 1.0, 2.0, 4.0, INF], &[90, 9, 1, 0]);
        assert_eq!(h.percentile(0.5), 0.5);
        assert_eq!(h.percentile(0.85), 0.5);
        assert_eq!(h.percentile(0.93), 1.5);
        assert_eq!(h.percentile(0.995), 3.0);
    }

    #[test]
    fn percentile_extremes() {
        let h = hist(&[-INF, 0.0, 1.0, 2.0, 4.0, INF], &[3, 0, 5, 2, 8]);
        assert_eq!(h.percentile(0.0), 0.0);
        assert_eq!(h.percentile(1.0), 4.0);
    }

    #[test]
    fn percentile_of_empty_histogram_is_lowest_boundary() {
        let h = hist(&[0.0, 1.0, 2.0, INF], &[0, 0, 0]);
        for p in [0.0, 0.5, 0.99, 1.0] {
            assert_eq!(h.percentile(p), 0.0);
        }
    }

    #[test]
    fn percentile_ignores_overflow_mass() {
        let h = hist(&[0.0, 1.0, 2.0, INF], &[10, 0, 1_000]);
        assert_eq!(h.percentile(0.99), 0.5);
        assert_eq!(h.percentile(1.0), 1.0);
    }
}
