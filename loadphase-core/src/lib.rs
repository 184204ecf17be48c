#![forbid(unsafe_code)]

mod checks;
mod classify;
mod config;
mod error;
mod executor;
mod identity;
mod lint;
mod pool;
mod presets;
mod progress;
mod run;
mod schedule;
mod signal;
mod thresholds;
mod vu;

pub use checks::Check;
pub use classify::{Classification, Classifier};
pub use config::{
    DEFAULT_BASE_URL, DEFAULT_GRACEFUL_STOP, DEFAULT_IDENTITY_PARAM, DEFAULT_TARGET_PATH,
    DEFAULT_TICK, ExecutorKind, LoadProfile, MAX_TICK, ProfileSpec, RunOverrides, RunPlan, Stage,
    Target, TargetSpec,
};
pub use error::{Error, Result};
pub use executor::{ErrorKind, Exchange, HttpExecutor, RequestExecutor};
pub use identity::{
    DEFAULT_IDENTITY_SPACE, IdentityGenerator, IdentityMode, WorkerIdentity, request_identity,
};
pub use lint::{Finding, LintReport, Severity, estimated_iterations_per_worker, lint, lint_plan};
pub use presets::Phase;
pub use progress::{PROGRESS_INTERVAL, ProgressFn, ProgressUpdate};
pub use run::{RunReport, run_plan};
pub use schedule::{RampingSchedule, RunClock, SchedulerState, StagePosition};
pub use signal::Signal;
pub use thresholds::{
    MetricSelector, RunVerdict, ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdRule,
    ThresholdSet, ThresholdViolation, compile_thresholds, evaluate_thresholds,
    parse_threshold_expr,
};
pub use vu::{WorkerContext, WorkerExit, run_worker};

pub use loadphase_metrics as metrics;
