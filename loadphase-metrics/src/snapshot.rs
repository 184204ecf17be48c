use std::collections::BTreeMap;

use crate::histogram::LatencySummary;
use crate::outcome::{FailureCause, Outcome};

#[derive(Debug, Clone)]
pub struct OutcomeSnapshot {
    pub outcome: Outcome,
    pub count: u64,
    pub latency: LatencySummary,
}

#[derive(Debug, Clone)]
pub struct StageSnapshot {
    /// 0-based stage index.
    pub index: usize,
    pub requests: u64,
    pub failures: u64,
    pub latency: LatencySummary,
}

impl StageSnapshot {
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        ratio(self.failures, self.requests)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSnapshot {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

/// Immutable copy of the aggregated run state.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    /// One entry per outcome, in [`Outcome::ALL`] order.
    pub outcomes: Vec<OutcomeSnapshot>,
    /// Latency across every outcome.
    pub request_latency: LatencySummary,
    pub causes: Vec<(FailureCause, u64)>,
    pub stages: Vec<StageSnapshot>,
    pub checks: Vec<CheckSnapshot>,
    pub unexpected_statuses: BTreeMap<u16, u64>,
}

impl RunSnapshot {
    /// Total completed requests: always the sum of the per-outcome counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.outcomes.iter().map(|o| o.count).sum()
    }

    #[must_use]
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.outcomes
            .iter()
            .find(|o| o.outcome == outcome)
            .map_or(0, |o| o.count)
    }

    #[must_use]
    pub fn outcome(&self, outcome: Outcome) -> Option<&OutcomeSnapshot> {
        self.outcomes.iter().find(|o| o.outcome == outcome)
    }

    /// Share of requests classified as `outcome`; 0 when nothing completed.
    #[must_use]
    pub fn share(&self, outcome: Outcome) -> f64 {
        ratio(self.count(outcome), self.total())
    }

    /// `count(Failure) / total`, defined as 0 for an empty run.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        self.share(Outcome::Failure)
    }

    #[must_use]
    pub fn cause_count(&self, cause: FailureCause) -> u64 {
        self.causes
            .iter()
            .find(|(c, _)| *c == cause)
            .map_or(0, |(_, n)| *n)
    }

    #[must_use]
    pub fn checks_passed(&self) -> u64 {
        self.checks.iter().map(|c| c.passed).sum()
    }

    #[must_use]
    pub fn checks_failed(&self) -> u64 {
        self.checks.iter().map(|c| c.failed).sum()
    }

    /// Passed / evaluated checks; `None` when no check ran.
    #[must_use]
    pub fn checks_pass_rate(&self) -> Option<f64> {
        let passed = self.checks_passed();
        let total = passed.saturating_add(self.checks_failed());
        (total > 0).then(|| ratio(passed, total))
    }
}

/// Lock-free counters used for live progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub requests: u64,
    pub success: u64,
    pub conflict: u64,
    pub exhausted: u64,
    pub failure: u64,
}

impl Totals {
    pub(crate) fn from_outcome_counts(c: [u64; 4]) -> Self {
        Self {
            requests: c.iter().sum(),
            success: c[0],
            conflict: c[1],
            exhausted: c[2],
            failure: c[3],
        }
    }

    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        ratio(self.failure, self.requests)
    }

    #[must_use]
    pub fn delta_since(self, prev: Option<Self>) -> u64 {
        match prev {
            Some(prev) => self.requests.saturating_sub(prev.requests),
            None => self.requests,
        }
    }
}

#[inline]
fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    let dt = dt_secs.max(1e-9);
    delta as f64 / dt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Aggregator, AggregatorLayout, Sample};
    use std::time::Duration;

    fn snapshot_with(success: u64, failure: u64) -> RunSnapshot {
        let agg = Aggregator::new(AggregatorLayout::default());
        for (outcome, n) in [(Outcome::Success, success), (Outcome::Failure, failure)] {
            for _ in 0..n {
                agg.record(&Sample {
                    outcome,
                    cause: outcome.is_failure().then_some(FailureCause::Transport),
                    latency: Duration::from_millis(1),
                    stage: 0,
                });
            }
        }
        agg.snapshot()
    }

    #[test]
    fn failure_rate_is_zero_for_an_empty_run() {
        let snap = snapshot_with(0, 0);
        assert_eq!(snap.total(), 0);
        assert_eq!(snap.failure_rate(), 0.0);
        assert!(snap.checks_pass_rate().is_none());
    }

    #[test]
    fn failure_rate_divides_by_total() {
        let snap = snapshot_with(198, 2);
        assert_eq!(snap.total(), 200);
        assert!((snap.failure_rate() - 0.01).abs() < 1e-12);
        assert!((snap.share(Outcome::Success) - 0.99).abs() < 1e-12);
    }

    #[test]
    fn totals_delta_and_rate() {
        let now = Totals::from_outcome_counts([7, 1, 1, 1]);
        assert_eq!(now.requests, 10);
        assert_eq!(now.delta_since(None), 10);
        assert_eq!(now.delta_since(Some(Totals::from_outcome_counts([3, 0, 0, 0]))), 7);

        let rps = per_sec(now.delta_since(None), 2.0);
        assert!((rps - 5.0).abs() < 1e-9);
        // dt=0 must not divide by zero.
        assert!(per_sec(1, 0.0).is_finite());
    }
}
