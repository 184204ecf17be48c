use std::time::Duration;

use crate::config::{ProfileSpec, Stage};
use crate::thresholds::ThresholdSet;

/// Built-in load phases, from a steady baseline to fault injection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Phase {
    Baseline,
    Rampup,
    Stress,
    Spike,
    Failure,
}

impl Phase {
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Baseline => "10 workers for 60s; steady-state reference numbers",
            Self::Rampup => "step 0 -> 1000 workers with holds; find the throughput and latency knees",
            Self::Stress => "300 workers held for 5m; look for drift under sustained load",
            Self::Spike => "10 -> 1000 workers in 10s and back; measure the hit and the recovery",
            Self::Failure => "30 workers for 3m with a 5s timeout; observe behaviour while faults are injected",
        }
    }

    #[must_use]
    pub fn spec(self) -> ProfileSpec {
        let name = Some(self.to_string());
        let expected = vec!["expected_status".to_string()];

        match self {
            Self::Baseline => ProfileSpec {
                name,
                executor: Some("constant-vus".to_string()),
                vus: Some(10),
                duration: Some(secs(60)),
                checks: vec!["expected_status".to_string(), "latency<200ms".to_string()],
                thresholds: vec![
                    threshold("failed_requests", "rate<0.01"),
                    threshold("request_duration", "p(99)<500"),
                    threshold("failure", "count<5"),
                ],
                ..ProfileSpec::default()
            },
            Self::Rampup => {
                let mut stages = vec![stage(30, 10), stage(60, 10)];
                for target in [50, 100, 300, 500, 1000] {
                    stages.push(stage(30, target));
                    stages.push(stage(60, target));
                }
                stages.push(stage(30, 0));

                ProfileSpec {
                    name,
                    executor: Some("ramping-vus".to_string()),
                    start_vus: Some(0),
                    stages,
                    checks: expected,
                    thresholds: vec![
                        threshold("failed_requests", "rate<0.05"),
                        threshold("request_duration", "p(99)<3000"),
                    ],
                    ..ProfileSpec::default()
                }
            }
            Self::Stress => ProfileSpec {
                name,
                executor: Some("ramping-vus".to_string()),
                start_vus: Some(0),
                stages: vec![stage(30, 300), stage(300, 300), stage(30, 0)],
                checks: expected,
                thresholds: vec![
                    threshold("failed_requests", "rate<0.03"),
                    threshold("request_duration", "p(99)<500"),
                ],
                ..ProfileSpec::default()
            },
            Self::Spike => ProfileSpec {
                name,
                executor: Some("ramping-vus".to_string()),
                start_vus: Some(0),
                stages: vec![
                    stage(30, 10),
                    stage(60, 10),
                    stage(10, 1000),
                    stage(60, 1000),
                    stage(10, 10),
                    stage(60, 10),
                    stage(10, 0),
                ],
                checks: expected,
                thresholds: vec![
                    threshold("failed_requests", "rate<0.05"),
                    threshold("request_duration", "p(99)<2000"),
                ],
                ..ProfileSpec::default()
            },
            Self::Failure => ProfileSpec {
                name,
                executor: Some("constant-vus".to_string()),
                vus: Some(30),
                duration: Some(secs(180)),
                timeout: Some(secs(5)),
                think_time: Some(Duration::from_millis(100)),
                checks: vec!["expected_status".to_string(), "no_server_error".to_string()],
                // Observation run: only a total outage fails it.
                thresholds: vec![threshold("failed_requests", "rate<1.0")],
                ..ProfileSpec::default()
            },
        }
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn stage(duration_secs: u64, target: u64) -> Stage {
    Stage {
        duration: secs(duration_secs),
        target,
    }
}

fn threshold(metric: &str, expr: &str) -> ThresholdSet {
    ThresholdSet {
        metric: metric.to_string(),
        expressions: vec![expr.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadProfile, RunOverrides, RunPlan};
    use strum::IntoEnumIterator as _;

    fn plan(phase: Phase) -> RunPlan {
        RunPlan::resolve(phase.spec(), RunOverrides::default())
            .unwrap_or_else(|e| panic!("{phase}: {e}"))
    }

    #[test]
    fn every_phase_resolves() {
        for phase in Phase::iter() {
            let plan = plan(phase);
            assert_eq!(plan.name, phase.to_string());
            assert!(!plan.thresholds.is_empty(), "{phase}");
            assert_eq!(plan.load.final_target() == 0, matches!(plan.load, LoadProfile::Ramping { .. }));
        }
    }

    #[test]
    fn rampup_totals_and_peak() {
        let plan = plan(Phase::Rampup);
        assert_eq!(plan.load.peak_workers(), 1000);
        // 6 ramps of 30s, 6 holds of 60s, final 30s ramp down.
        assert_eq!(plan.load.total_duration(), secs(6 * 30 + 6 * 60 + 30));
    }

    #[test]
    fn failure_phase_bounds_requests() {
        let plan = plan(Phase::Failure);
        assert_eq!(plan.timeout, Some(secs(5)));
        assert_eq!(plan.think_time, Duration::from_millis(100));
        assert_eq!(plan.checks.len(), 2);
    }

    #[test]
    fn phase_names_parse() {
        assert_eq!("spike".parse::<Phase>().ok(), Some(Phase::Spike));
        assert_eq!("Baseline".parse::<Phase>().ok(), Some(Phase::Baseline));
        assert!("soak".parse::<Phase>().is_err());
    }
}
