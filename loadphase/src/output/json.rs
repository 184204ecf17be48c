use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use loadphase_core::metrics::{FailureCause, LatencySummary, Outcome, per_sec};
use loadphase_core::{ProgressUpdate, RunPlan, RunReport};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _plan: &RunPlan) {}

    fn progress(&self) -> Option<loadphase_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_secs: f64,

    /// 1-based; absent once the schedule is over.
    pub stage: Option<usize>,
    pub stages: Option<usize>,
    pub desired_workers: u64,
    pub active_workers: usize,

    pub requests_per_sec: f64,
    pub failure_rate: f64,

    pub total_requests: u64,
    pub success: u64,
    pub conflict: u64,
    pub exhausted: u64,
    pub failure: u64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total_duration.as_secs_f64(),
        stage: u.stage.as_ref().map(|s| s.index + 1),
        stages: u.stage.as_ref().map(|s| s.count),
        desired_workers: u.desired_workers,
        active_workers: u.active_workers,
        requests_per_sec: u.rps_now,
        failure_rate: u.failure_rate_now,
        total_requests: u.totals.requests,
        success: u.totals.success,
        conflict: u.totals.conflict,
        exhausted: u.totals.exhausted,
        failure: u.totals.failure,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub name: String,
    pub wall_time_secs: f64,
    pub aborted: bool,
    pub peak_workers: usize,
    pub totals: JsonTotals,
    pub outcomes: Vec<JsonOutcome>,
    /// Every outcome; milliseconds.
    pub latency: JsonLatencySummary,
    pub causes: BTreeMap<String, u64>,
    pub unexpected_statuses: BTreeMap<u16, u64>,
    pub stages: Vec<JsonStage>,
    pub checks: Vec<JsonCheck>,
    pub thresholds: JsonVerdict,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTotals {
    pub requests: u64,
    pub requests_per_sec: f64,
    pub failure_rate: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonOutcome {
    pub outcome: String,
    pub count: u64,
    pub share: f64,
    pub latency: JsonLatencySummary,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

impl From<&LatencySummary> for JsonLatencySummary {
    fn from(l: &LatencySummary) -> Self {
        Self {
            p50: l.p50,
            p75: l.p75,
            p90: l.p90,
            p95: l.p95,
            p99: l.p99,
            min: l.min,
            max: l.max,
            mean: l.mean,
            stdev: l.stdev,
            count: l.count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStage {
    /// 1-based.
    pub stage: usize,
    pub target: u64,
    pub duration_secs: f64,
    pub requests: u64,
    pub requests_per_sec: f64,
    pub failure_rate: f64,
    pub latency: JsonLatencySummary,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonVerdict {
    pub passed: bool,
    pub rules: usize,
    pub violations: Vec<JsonViolation>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonViolation {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let snap = &report.snapshot;
    let total = snap.total();

    let outcomes = Outcome::ALL
        .iter()
        .map(|&outcome| JsonOutcome {
            outcome: outcome.to_string(),
            count: snap.count(outcome),
            share: snap.share(outcome),
            latency: snap
                .outcome(outcome)
                .map(|o| JsonLatencySummary::from(&o.latency))
                .unwrap_or_else(|| JsonLatencySummary::from(&LatencySummary::default())),
        })
        .collect();

    let causes = FailureCause::ALL
        .iter()
        .map(|&cause| (cause.to_string(), snap.cause_count(cause)))
        .collect();

    let stages = snap
        .stages
        .iter()
        .filter_map(|s| {
            let stage = report.stages.get(s.index)?;
            Some(JsonStage {
                stage: s.index + 1,
                target: stage.target,
                duration_secs: stage.duration.as_secs_f64(),
                requests: s.requests,
                requests_per_sec: per_sec(s.requests, stage.duration.as_secs_f64()),
                failure_rate: s.failure_rate(),
                latency: JsonLatencySummary::from(&s.latency),
            })
        })
        .collect();

    let checks = snap
        .checks
        .iter()
        .map(|c| JsonCheck {
            name: c.name.clone(),
            passed: c.passed,
            failed: c.failed,
        })
        .collect();

    let thresholds = JsonVerdict {
        passed: report.verdict.passed,
        rules: report.verdict.rules,
        violations: report
            .verdict
            .violations
            .iter()
            .map(|v| JsonViolation {
                metric: v.rule.metric.clone(),
                expression: v.rule.expression.clone(),
                observed: v.observed,
            })
            .collect(),
    };

    JsonSummaryLine {
        kind: "summary",
        name: report.name.clone(),
        wall_time_secs: report.wall_time.as_secs_f64(),
        aborted: report.aborted,
        peak_workers: report.peak_workers,
        totals: JsonTotals {
            requests: total,
            requests_per_sec: per_sec(total, report.wall_time.as_secs_f64()),
            failure_rate: snap.failure_rate(),
        },
        outcomes,
        latency: JsonLatencySummary::from(&snap.request_latency),
        causes,
        unexpected_statuses: snap.unexpected_statuses.clone(),
        stages,
        checks,
        thresholds,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
