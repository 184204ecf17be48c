pub mod aggregator;
pub mod histogram;
pub mod outcome;
pub mod snapshot;

pub use aggregator::{Aggregator, AggregatorLayout, Sample};
pub use histogram::{LatencySummary, SUMMARY_PERCENTILES};
pub use outcome::{FailureCause, Outcome};
pub use snapshot::{CheckSnapshot, OutcomeSnapshot, RunSnapshot, StageSnapshot, Totals, per_sec};
