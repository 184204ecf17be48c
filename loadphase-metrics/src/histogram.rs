use std::time::Duration;

use hdrhistogram::Histogram;

/// Percentiles kept in every [`LatencySummary`].
pub const SUMMARY_PERCENTILES: [u32; 5] = [50, 75, 90, 95, 99];

/// Latency distribution summary. All values are milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

impl LatencySummary {
    /// Looks up one of [`SUMMARY_PERCENTILES`]; anything else is `None`.
    #[must_use]
    pub fn percentile(&self, p: u32) -> Option<f64> {
        match p {
            50 => self.p50,
            75 => self.p75,
            90 => self.p90,
            95 => self.p95,
            99 => self.p99,
            _ => None,
        }
    }
}

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    // Microsecond resolution, up to one hour.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

#[inline]
pub(crate) fn record_latency(h: &mut Histogram<u64>, latency: Duration) {
    let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
    h.saturating_record(micros);
}

/// Nearest-rank percentile: the value at rank `floor(n * p / 100) + 1`.
///
/// The rank is one past the `p`-th share of samples so a single outlier among 100
/// samples is what `p(99)` reports.
fn percentile_micros(h: &Histogram<u64>, percent: u32) -> u64 {
    let n = h.len();
    let rank = ((u128::from(n) * u128::from(percent)) / 100) as u64;
    let rank = rank.saturating_add(1).min(n);

    let mut seen = 0u64;
    for v in h.iter_recorded() {
        seen = seen.saturating_add(v.count_at_value());
        if seen >= rank {
            return h.median_equivalent(v.value_iterated_to()).min(h.max());
        }
    }

    h.max()
}

fn micros_to_ms(v: u64) -> f64 {
    v as f64 / 1000.0
}

pub(crate) fn summarize_histogram(h: &Histogram<u64>) -> LatencySummary {
    let count = h.len();
    if count == 0 {
        return LatencySummary::default();
    }

    let p = |percent| Some(micros_to_ms(percentile_micros(h, percent)));

    LatencySummary {
        count,
        min: Some(micros_to_ms(h.min())),
        max: Some(micros_to_ms(h.max())),
        mean: Some(h.mean() / 1000.0),
        stdev: Some(h.stdev() / 1000.0),
        p50: p(50),
        p75: p(75),
        p90: p(90),
        p95: p(95),
        p99: p(99),
    }
}
