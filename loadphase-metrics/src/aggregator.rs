use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::histogram::{new_default_histogram, record_latency, summarize_histogram};
use crate::outcome::{FailureCause, Outcome};
use crate::snapshot::{CheckSnapshot, OutcomeSnapshot, RunSnapshot, StageSnapshot, Totals};

/// One classified request, as recorded by a worker.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub outcome: Outcome,
    pub cause: Option<FailureCause>,
    pub latency: Duration,
    /// Index of the stage active when the request completed.
    pub stage: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AggregatorLayout {
    pub stages: usize,
    pub checks: Vec<String>,
}

#[derive(Debug)]
struct Series {
    count: AtomicU64,
    latency: Mutex<Histogram<u64>>,
}

impl Series {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            latency: Mutex::new(new_default_histogram()),
        }
    }

    fn observe(&self, latency: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let mut h = self.latency.lock();
        record_latency(&mut h, latency);
    }
}

#[derive(Debug)]
struct StageSeries {
    requests: Series,
    failures: AtomicU64,
}

#[derive(Debug)]
struct CheckSeries {
    name: String,
    passed: AtomicU64,
    failed: AtomicU64,
}

/// Shared, concurrently written run metrics.
///
/// Counters are atomics; every latency series sits behind its own short-lived lock, so
/// concurrent writers only contend when they hit the same series at the same instant.
#[derive(Debug)]
pub struct Aggregator {
    outcomes: [Series; 4],
    requests: Mutex<Histogram<u64>>,
    causes: [AtomicU64; 5],
    stages: Vec<StageSeries>,
    checks: Vec<CheckSeries>,
    unexpected_statuses: Mutex<BTreeMap<u16, u64>>,
}

impl Aggregator {
    #[must_use]
    pub fn new(layout: AggregatorLayout) -> Self {
        let stages = (0..layout.stages.max(1))
            .map(|_| StageSeries {
                requests: Series::new(),
                failures: AtomicU64::new(0),
            })
            .collect();

        let checks = layout
            .checks
            .into_iter()
            .map(|name| CheckSeries {
                name,
                passed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            })
            .collect();

        Self {
            outcomes: std::array::from_fn(|_| Series::new()),
            requests: Mutex::new(new_default_histogram()),
            causes: std::array::from_fn(|_| AtomicU64::new(0)),
            stages,
            checks,
            unexpected_statuses: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record(&self, sample: &Sample) {
        self.outcomes[sample.outcome.index()].observe(sample.latency);
        {
            let mut h = self.requests.lock();
            record_latency(&mut h, sample.latency);
        }

        if sample.outcome.is_failure() {
            let cause = sample.cause.unwrap_or(FailureCause::Transport);
            self.causes[cause.index()].fetch_add(1, Ordering::Relaxed);
        }

        // Samples past the last stage (drain) are attributed to the last stage.
        let idx = sample.stage.min(self.stages.len().saturating_sub(1));
        if let Some(stage) = self.stages.get(idx) {
            stage.requests.observe(sample.latency);
            if sample.outcome.is_failure() {
                stage.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_check(&self, index: usize, passed: bool) {
        let Some(check) = self.checks.get(index) else {
            return;
        };
        if passed {
            check.passed.fetch_add(1, Ordering::Relaxed);
        } else {
            check.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts an out-of-vocabulary status code. Returns `true` the first time a code is seen.
    pub fn note_unexpected_status(&self, status: u16) -> bool {
        let mut map = self.unexpected_statuses.lock();
        let n = map.entry(status).or_insert(0);
        *n = n.saturating_add(1);
        *n == 1
    }

    /// Counter-only view for live progress. Takes no locks.
    #[must_use]
    pub fn totals(&self) -> Totals {
        let mut per_outcome = [0u64; 4];
        for (slot, series) in per_outcome.iter_mut().zip(&self.outcomes) {
            *slot = series.count.load(Ordering::Relaxed);
        }
        Totals::from_outcome_counts(per_outcome)
    }

    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        let outcomes = Outcome::ALL
            .iter()
            .map(|&outcome| {
                let series = &self.outcomes[outcome.index()];
                let latency = {
                    let h = series.latency.lock();
                    summarize_histogram(&h)
                };
                OutcomeSnapshot {
                    outcome,
                    count: series.count.load(Ordering::Relaxed),
                    latency,
                }
            })
            .collect();

        let request_latency = {
            let h = self.requests.lock();
            summarize_histogram(&h)
        };

        let causes = FailureCause::ALL
            .iter()
            .map(|&c| (c, self.causes[c.index()].load(Ordering::Relaxed)))
            .collect();

        let stages = self
            .stages
            .iter()
            .enumerate()
            .map(|(index, s)| {
                let latency = {
                    let h = s.requests.latency.lock();
                    summarize_histogram(&h)
                };
                StageSnapshot {
                    index,
                    requests: s.requests.count.load(Ordering::Relaxed),
                    failures: s.failures.load(Ordering::Relaxed),
                    latency,
                }
            })
            .collect();

        let checks = self
            .checks
            .iter()
            .map(|c| CheckSnapshot {
                name: c.name.clone(),
                passed: c.passed.load(Ordering::Relaxed),
                failed: c.failed.load(Ordering::Relaxed),
            })
            .collect();

        let unexpected_statuses = self.unexpected_statuses.lock().clone();

        RunSnapshot {
            outcomes,
            request_latency,
            causes,
            stages,
            checks,
            unexpected_statuses,
        }
    }
}
