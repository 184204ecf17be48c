use std::time::Duration;

use loadphase_metrics::Totals;

use crate::schedule::StagePosition;

/// How often the scheduler publishes a [`ProgressUpdate`].
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub stage: Option<StagePosition>,
    pub desired_workers: u64,
    pub active_workers: usize,
    pub totals: Totals,
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
    /// Failures / requests during the last progress interval (0..=1).
    pub failure_rate_now: f64,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
