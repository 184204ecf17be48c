use std::time::Duration;

use crate::config::{LoadProfile, ProfileSpec, RunOverrides, RunPlan};
use crate::identity::IdentityMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct LintReport {
    /// Present when the configuration resolved.
    pub plan: Option<RunPlan>,
    pub findings: Vec<Finding>,
}

impl LintReport {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }
}

/// Floor on per-iteration time when estimating how many identities a worker uses.
const MIN_ITERATION_TIME: Duration = Duration::from_millis(1);

pub fn lint(spec: ProfileSpec, overrides: RunOverrides) -> LintReport {
    match RunPlan::resolve(spec, overrides) {
        Ok(plan) => LintReport {
            findings: lint_plan(&plan),
            plan: Some(plan),
        },
        Err(err) => LintReport {
            plan: None,
            findings: vec![Finding {
                severity: Severity::Error,
                message: err.to_string(),
            }],
        },
    }
}

/// Upper bound on iterations one worker can run: it never outlives the schedule.
#[must_use]
pub fn estimated_iterations_per_worker(plan: &RunPlan) -> u64 {
    let per_iteration = plan.think_time.saturating_add(MIN_ITERATION_TIME);
    let n = plan.load.total_duration().as_nanos() / per_iteration.as_nanos().max(1);
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[must_use]
pub fn lint_plan(plan: &RunPlan) -> Vec<Finding> {
    let mut out = Vec::new();

    if let LoadProfile::Ramping { .. } = plan.load
        && plan.load.final_target() != 0
    {
        out.push(Finding::warning(format!(
            "final stage targets {} workers; end with a ramp to 0 so workers exit before the run ends",
            plan.load.final_target()
        )));
    }

    if plan.identity.mode() == IdentityMode::Unique {
        let estimate = estimated_iterations_per_worker(plan);
        if estimate >= plan.identity.space() {
            out.push(Finding::warning(format!(
                "a worker may run up to {estimate} iterations but the identity space is {}; workers stop when they exhaust it",
                plan.identity.space()
            )));
        }
    }

    if plan.thresholds.is_empty() {
        out.push(Finding::warning("no thresholds configured; the run always passes"));
    }

    if plan.timeout.is_none() && !plan.graceful_stop.is_zero() {
        out.push(Finding::warning(format!(
            "no request timeout; hung requests hold their worker until abandoned {} after the schedule ends",
            humantime::format_duration(plan.graceful_stop)
        )));
    }

    out
}
