use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use loadphase_metrics::{LatencySummary, Outcome, RunSnapshot, SUMMARY_PERCENTILES};

use crate::{Error, Result};

/// Expressions attached to one metric, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Count,
    Rate,
    P(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// Which aggregate a threshold reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSelector {
    Requests,
    FailedRequests,
    /// Latency across every outcome.
    RequestDuration,
    Outcome(Outcome),
    OutcomeDuration(Outcome),
    Checks,
}

impl MetricSelector {
    fn is_duration(self) -> bool {
        matches!(self, Self::RequestDuration | Self::OutcomeDuration(_))
    }

    fn supports(self, agg: ThresholdAgg) -> bool {
        if self.is_duration() {
            !matches!(agg, ThresholdAgg::Rate)
        } else {
            matches!(agg, ThresholdAgg::Count | ThresholdAgg::Rate)
        }
    }
}

impl FromStr for MetricSelector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let sel = match s {
            "requests" | "http_reqs" => Self::Requests,
            "failed_requests" | "http_req_failed" => Self::FailedRequests,
            "request_duration" | "http_req_duration" => Self::RequestDuration,
            "coupon_success" => Self::Outcome(Outcome::Success),
            "coupon_duplicate" => Self::Outcome(Outcome::Conflict),
            "coupon_exhausted" => Self::Outcome(Outcome::Exhausted),
            "coupon_error" => Self::Outcome(Outcome::Failure),
            "latency_success_ms" => Self::OutcomeDuration(Outcome::Success),
            "checks" => Self::Checks,
            other => {
                if let Some(outcome) = other
                    .strip_suffix("_duration")
                    .and_then(|o| o.parse::<Outcome>().ok())
                {
                    Self::OutcomeDuration(outcome)
                } else if let Ok(outcome) = other.parse::<Outcome>() {
                    Self::Outcome(outcome)
                } else {
                    return Err(format!("unknown metric `{other}`"));
                }
            }
        };
        Ok(sel)
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requests => f.write_str("requests"),
            Self::FailedRequests => f.write_str("failed_requests"),
            Self::RequestDuration => f.write_str("request_duration"),
            Self::Outcome(o) => write!(f, "{o}"),
            Self::OutcomeDuration(o) => write!(f, "{o}_duration"),
            Self::Checks => f.write_str("checks"),
        }
    }
}

/// A compiled threshold, ready to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub selector: MetricSelector,
    /// Metric name as configured (may be an alias).
    pub metric: String,
    pub expression: String,
    pub expr: ThresholdExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdViolation {
    pub rule: ThresholdRule,
    /// `None` when the metric had no value to compare.
    pub observed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunVerdict {
    pub passed: bool,
    pub violations: Vec<ThresholdViolation>,
    /// Number of rules evaluated.
    pub rules: usize,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if left.eq_ignore_ascii_case("rate") {
        ThresholdAgg::Rate
    } else if left.eq_ignore_ascii_case("med") {
        ThresholdAgg::P(50)
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: u32 = inner
            .parse()
            .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
        if !SUMMARY_PERCENTILES.contains(&p) {
            return Err(format!(
                "unsupported percentile p({p}) in threshold (supported: {SUMMARY_PERCENTILES:?}): {raw}"
            ));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;

    Ok(ThresholdExpr { agg, op, value })
}

/// Resolves metric names and parses every expression; any problem is a configuration error.
pub fn compile_thresholds(sets: &[ThresholdSet]) -> Result<Vec<ThresholdRule>> {
    let mut rules = Vec::new();
    for set in sets {
        let invalid = |error: String| Error::InvalidThreshold {
            metric: set.metric.clone(),
            error,
        };

        let selector: MetricSelector = set.metric.parse().map_err(invalid)?;
        for raw in &set.expressions {
            let expr = parse_threshold_expr(raw).map_err(invalid)?;
            if !selector.supports(expr.agg) {
                return Err(invalid(format!(
                    "aggregation in `{raw}` does not apply to `{selector}`"
                )));
            }
            rules.push(ThresholdRule {
                selector,
                metric: set.metric.clone(),
                expression: raw.clone(),
                expr,
            });
        }
    }
    Ok(rules)
}

/// Pure function of the snapshot and the wall time used for rates.
#[must_use]
pub fn evaluate_thresholds(
    rules: &[ThresholdRule],
    snapshot: &RunSnapshot,
    wall_time: Duration,
) -> RunVerdict {
    let violations: Vec<ThresholdViolation> = rules
        .iter()
        .filter_map(|rule| {
            let observed = observed_value(rule.selector, rule.expr.agg, snapshot, wall_time);
            let passed = observed
                .map(|v| compare(v, rule.expr.op, rule.expr.value))
                .unwrap_or(false);
            (!passed).then(|| ThresholdViolation {
                rule: rule.clone(),
                observed,
            })
        })
        .collect();

    RunVerdict {
        passed: violations.is_empty(),
        violations,
        rules: rules.len(),
    }
}

fn compare(left: f64, op: ThresholdOp, right: f64) -> bool {
    match op {
        ThresholdOp::Lt => left < right,
        ThresholdOp::Lte => left <= right,
        ThresholdOp::Gt => left > right,
        ThresholdOp::Gte => left >= right,
        ThresholdOp::Eq => left == right,
    }
}

fn latency_value(summary: &LatencySummary, agg: ThresholdAgg) -> Option<f64> {
    match agg {
        ThresholdAgg::Avg => summary.mean,
        ThresholdAgg::Min => summary.min,
        ThresholdAgg::Max => summary.max,
        ThresholdAgg::Count => Some(summary.count as f64),
        ThresholdAgg::P(p) => summary.percentile(p),
        ThresholdAgg::Rate => None,
    }
}

fn observed_value(
    selector: MetricSelector,
    agg: ThresholdAgg,
    snap: &RunSnapshot,
    wall_time: Duration,
) -> Option<f64> {
    match (selector, agg) {
        (MetricSelector::Requests, ThresholdAgg::Count) => Some(snap.total() as f64),
        (MetricSelector::Requests, ThresholdAgg::Rate) => {
            let secs = wall_time.as_secs_f64();
            Some(if secs > 0.0 {
                snap.total() as f64 / secs
            } else {
                0.0
            })
        }
        (MetricSelector::FailedRequests, ThresholdAgg::Count) => {
            Some(snap.count(Outcome::Failure) as f64)
        }
        (MetricSelector::FailedRequests, ThresholdAgg::Rate) => Some(snap.failure_rate()),
        (MetricSelector::RequestDuration, agg) => latency_value(&snap.request_latency, agg),
        (MetricSelector::Outcome(o), ThresholdAgg::Count) => Some(snap.count(o) as f64),
        (MetricSelector::Outcome(o), ThresholdAgg::Rate) => Some(snap.share(o)),
        (MetricSelector::OutcomeDuration(o), agg) => {
            snap.outcome(o).and_then(|s| latency_value(&s.latency, agg))
        }
        (MetricSelector::Checks, ThresholdAgg::Count) => Some(snap.checks_failed() as f64),
        (MetricSelector::Checks, ThresholdAgg::Rate) => snap.checks_pass_rate(),
        (_, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadphase_metrics::{Aggregator, AggregatorLayout, FailureCause, Sample};

    fn set(metric: &str, exprs: &[&str]) -> ThresholdSet {
        ThresholdSet {
            metric: metric.to_string(),
            expressions: exprs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn rules(sets: &[ThresholdSet]) -> Vec<ThresholdRule> {
        compile_thresholds(sets).unwrap_or_else(|e| panic!("{e}"))
    }

    fn snapshot(counts: &[(Outcome, u64, u64)]) -> RunSnapshot {
        let agg = Aggregator::new(AggregatorLayout::default());
        for (outcome, n, ms) in counts {
            for _ in 0..*n {
                agg.record(&Sample {
                    outcome: *outcome,
                    cause: outcome.is_failure().then_some(FailureCause::ServerError),
                    latency: Duration::from_millis(*ms),
                    stage: 0,
                });
            }
        }
        agg.snapshot()
    }

    #[test]
    fn parse_threshold_expr_trims_whitespace() {
        let expr = parse_threshold_expr("  avg  <=  123  ").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(expr.agg, ThresholdAgg::Avg);
        assert_eq!(expr.op, ThresholdOp::Lte);
        assert_eq!(expr.value, 123.0);
    }

    #[test]
    fn parse_threshold_expr_rejects_unsupported_percentiles() {
        let err = match parse_threshold_expr("p(97)<1") {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(err.contains("unsupported percentile"));
    }

    #[test]
    fn failure_rate_at_the_boundary_is_violated() {
        let snap = snapshot(&[(Outcome::Success, 198, 10), (Outcome::Failure, 2, 10)]);
        let verdict = evaluate_thresholds(
            &rules(&[set("failed_requests", &["rate<0.01"])]),
            &snap,
            Duration::from_secs(1),
        );
        assert!(!verdict.passed);
        assert_eq!(verdict.violations.len(), 1);
        assert_eq!(verdict.violations[0].observed, Some(0.01));
    }

    #[test]
    fn empty_run_has_zero_failure_rate() {
        let snap = snapshot(&[]);
        let verdict = evaluate_thresholds(
            &rules(&[set("http_req_failed", &["rate<0.01"])]),
            &snap,
            Duration::ZERO,
        );
        assert!(verdict.passed);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let snap = snapshot(&[(Outcome::Success, 99, 100), (Outcome::Success, 1, 1000)]);
        let rules = rules(&[
            set("latency_success_ms", &["p(99)<500", "p(50)<=100"]),
            set("coupon_error", &["count<5"]),
        ]);
        let a = evaluate_thresholds(&rules, &snap, Duration::from_secs(10));
        let b = evaluate_thresholds(&rules, &snap, Duration::from_secs(10));
        assert_eq!(a, b);
        assert!(!a.passed);
        assert_eq!(a.rules, 3);
        assert_eq!(a.violations.len(), 1);
        assert_eq!(a.violations[0].rule.expression, "p(99)<500");
    }

    #[test]
    fn missing_values_are_violations() {
        let snap = snapshot(&[(Outcome::Failure, 3, 10)]);
        let verdict = evaluate_thresholds(
            &rules(&[set("success_duration", &["p(99)<500"]), set("checks", &["rate>0.9"])]),
            &snap,
            Duration::from_secs(1),
        );
        assert_eq!(verdict.violations.len(), 2);
        assert!(verdict.violations.iter().all(|v| v.observed.is_none()));
    }

    #[test]
    fn aliases_resolve_to_canonical_metrics() {
        let cases = [
            ("http_reqs", MetricSelector::Requests),
            ("http_req_duration", MetricSelector::RequestDuration),
            ("coupon_duplicate", MetricSelector::Outcome(Outcome::Conflict)),
            ("exhausted", MetricSelector::Outcome(Outcome::Exhausted)),
            ("failure_duration", MetricSelector::OutcomeDuration(Outcome::Failure)),
        ];
        for (name, want) in cases {
            assert_eq!(name.parse::<MetricSelector>(), Ok(want), "{name}");
        }
        assert_eq!(MetricSelector::OutcomeDuration(Outcome::Success).to_string(), "success_duration");
    }

    #[test]
    fn compile_rejects_unknown_metrics_and_aggregations() {
        assert!(compile_thresholds(&[set("latency_p42", &["avg<1"])]).is_err());
        assert!(compile_thresholds(&[set("requests", &["p(99)<1"])]).is_err());
        assert!(compile_thresholds(&[set("request_duration", &["rate<1"])]).is_err());
        assert!(compile_thresholds(&[set("requests", &["count>"])]).is_err());
    }

    #[test]
    fn request_rate_uses_wall_time() {
        let snap = snapshot(&[(Outcome::Success, 50, 1)]);
        let verdict = evaluate_thresholds(
            &rules(&[set("requests", &["rate>=5", "count==50"])]),
            &snap,
            Duration::from_secs(10),
        );
        assert!(verdict.passed, "{:?}", verdict.violations);
    }
}
