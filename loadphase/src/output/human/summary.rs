use std::fmt::Write as _;

use loadphase_core::RunReport;
use loadphase_core::metrics::{FailureCause, LatencySummary, Outcome, per_sec};

use super::format::*;

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let snap = &report.snapshot;
    let total = snap.total();

    writeln!(&mut out, "summary: {}", report.name).ok();
    writeln!(
        &mut out,
        "  wall time: {}{}",
        format_duration(report.wall_time),
        if report.aborted { " (aborted)" } else { "" }
    )
    .ok();
    writeln!(&mut out, "  peak workers: {}", report.peak_workers).ok();

    out.push_str("\ntotals\n");
    writeln!(&mut out, "  requests: {total}").ok();
    let rps = per_sec(total, report.wall_time.as_secs_f64());
    writeln!(&mut out, "  throughput: {rps:.2} req/s").ok();

    out.push_str("\noutcomes\n");
    for outcome in Outcome::ALL {
        writeln!(
            &mut out,
            "  {:<10} {:>10} {:>8}",
            outcome.to_string(),
            snap.count(outcome),
            format_percent(snap.share(outcome))
        )
        .ok();
    }

    render_causes(report, &mut out);
    render_latency(report, &mut out);
    render_stages(report, &mut out);
    render_checks(report, &mut out);
    render_verdict(report, &mut out);

    out
}

fn render_causes(report: &RunReport, out: &mut String) {
    let snap = &report.snapshot;
    if snap.count(Outcome::Failure) == 0 {
        return;
    }

    out.push_str("\nfailure causes\n");
    for cause in FailureCause::ALL {
        let n = snap.cause_count(cause);
        if n > 0 {
            writeln!(out, "  {cause}: {n}").ok();
        }
    }

    if !snap.unexpected_statuses.is_empty() {
        let statuses = snap
            .unexpected_statuses
            .iter()
            .map(|(status, n)| format!("{status}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "  unexpected statuses: {statuses}").ok();
    }
}

fn render_latency(report: &RunReport, out: &mut String) {
    let snap = &report.snapshot;

    out.push_str("\nlatency\n");
    writeln!(
        out,
        "  {:<10} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "", "n", "min", "mean", "p50", "p75", "p90", "p95", "p99", "max"
    )
    .ok();

    latency_row(out, "all", &snap.request_latency);
    for o in &snap.outcomes {
        if o.count > 0 {
            latency_row(out, &o.outcome.to_string(), &o.latency);
        }
    }
}

fn latency_row(out: &mut String, label: &str, l: &LatencySummary) {
    writeln!(
        out,
        "  {:<10} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        label,
        l.count,
        format_ms(l.min),
        format_ms(l.mean),
        format_ms(l.p50),
        format_ms(l.p75),
        format_ms(l.p90),
        format_ms(l.p95),
        format_ms(l.p99),
        format_ms(l.max),
    )
    .ok();
}

fn render_stages(report: &RunReport, out: &mut String) {
    if report.stages.len() < 2 {
        return;
    }

    out.push_str("\nstages\n");
    writeln!(
        out,
        "  {:<7} {:>7} {:>8} {:>10} {:>10} {:>8} {:>10}",
        "stage", "target", "length", "requests", "req/s", "failed", "p99"
    )
    .ok();

    let count = report.stages.len();
    for s in &report.snapshot.stages {
        let Some(stage) = report.stages.get(s.index) else {
            continue;
        };
        writeln!(
            out,
            "  {:<7} {:>7} {:>8} {:>10} {:>10.1} {:>8} {:>10}",
            format!("{}/{count}", s.index + 1),
            stage.target,
            format_duration(stage.duration),
            s.requests,
            per_sec(s.requests, stage.duration.as_secs_f64()),
            format_percent(s.failure_rate()),
            format_ms(s.latency.p99),
        )
        .ok();
    }
}

fn render_checks(report: &RunReport, out: &mut String) {
    let checks = &report.snapshot.checks;
    if checks.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for c in checks {
        let status = if c.failed > 0 { "FAIL" } else { "OK" };
        writeln!(
            out,
            "  {}: pass={} fail={} [{status}]",
            c.name, c.passed, c.failed
        )
        .ok();
    }
}

fn render_verdict(report: &RunReport, out: &mut String) {
    let verdict = &report.verdict;
    out.push('\n');

    if verdict.rules == 0 {
        out.push_str("thresholds: none configured\n");
        return;
    }

    if verdict.passed {
        writeln!(out, "thresholds: passed ({} rules)", verdict.rules).ok();
        return;
    }

    writeln!(
        out,
        "thresholds: FAILED ({} of {} rules)",
        verdict.violations.len(),
        verdict.rules
    )
    .ok();
    for v in &verdict.violations {
        writeln!(
            out,
            "  {}: {} (observed {})",
            v.rule.metric,
            v.rule.expression,
            format_observed(v.observed)
        )
        .ok();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use loadphase_core::metrics::{Aggregator, AggregatorLayout, Sample};
    use loadphase_core::{Stage, ThresholdSet, compile_thresholds, evaluate_thresholds};

    use super::*;

    fn sample(outcome: Outcome, cause: Option<FailureCause>, ms: u64, stage: usize) -> Sample {
        Sample {
            outcome,
            cause,
            latency: Duration::from_millis(ms),
            stage,
        }
    }

    fn report(thresholds: &[(&str, &str)]) -> RunReport {
        let metrics = Aggregator::new(AggregatorLayout {
            stages: 2,
            checks: vec!["expected_status".to_string()],
        });
        for _ in 0..6 {
            metrics.record(&sample(Outcome::Success, None, 10, 0));
            metrics.record_check(0, true);
        }
        metrics.record(&sample(Outcome::Conflict, None, 12, 1));
        metrics.record_check(0, true);
        metrics.record(&sample(Outcome::Exhausted, None, 8, 1));
        metrics.record_check(0, true);
        metrics.record(&sample(Outcome::Failure, Some(FailureCause::Timeout), 500, 1));
        metrics.record_check(0, false);
        metrics.record(&sample(
            Outcome::Failure,
            Some(FailureCause::UnexpectedStatus),
            20,
            1,
        ));
        metrics.record_check(0, false);
        metrics.note_unexpected_status(404);

        let snapshot = metrics.snapshot();
        let sets = thresholds
            .iter()
            .map(|(metric, expr)| ThresholdSet {
                metric: metric.to_string(),
                expressions: vec![expr.to_string()],
            })
            .collect::<Vec<_>>();
        let rules = compile_thresholds(&sets).unwrap_or_else(|e| panic!("{e}"));
        let wall_time = Duration::from_secs(10);
        let verdict = evaluate_thresholds(&rules, &snapshot, wall_time);

        RunReport {
            name: "knee".to_string(),
            snapshot,
            verdict,
            wall_time,
            peak_workers: 4,
            stages: vec![
                Stage {
                    duration: Duration::from_secs(5),
                    target: 4,
                },
                Stage {
                    duration: Duration::from_secs(5),
                    target: 0,
                },
            ],
            aborted: false,
        }
    }

    #[test]
    fn render_includes_totals_outcomes_and_latency() {
        let text = render(&report(&[]));
        assert!(text.contains("summary: knee"));
        assert!(text.contains("requests: 10"));
        assert!(text.contains("throughput: 1.00 req/s"));
        assert!(text.contains("60.00%"), "{text}");
        assert!(text.contains("20.00%"), "{text}");
        assert!(text.contains("latency"));
        assert!(text.contains("p99"));
        assert!(text.contains("thresholds: none configured"));
    }

    #[test]
    fn render_breaks_down_causes_stages_and_checks() {
        let text = render(&report(&[]));
        assert!(text.contains("timeout: 1"));
        assert!(text.contains("unexpected_status: 1"));
        assert!(text.contains("unexpected statuses: 404=1"));
        assert!(text.contains("1/2"));
        assert!(text.contains("2/2"));
        assert!(text.contains("expected_status: pass=8 fail=2 [FAIL]"));
        assert!(!text.contains("abandoned"));
    }

    #[test]
    fn render_lists_threshold_violations() {
        let text = render(&report(&[
            ("failed_requests", "rate<0.1"),
            ("success", "count>=5"),
        ]));
        assert!(text.contains("thresholds: FAILED (1 of 2 rules)"), "{text}");
        assert!(text.contains("failed_requests: rate<0.1 (observed 0.2000)"), "{text}");

        let text = render(&report(&[("success", "count>=5")]));
        assert!(text.contains("thresholds: passed (1 rules)"));
    }
}
