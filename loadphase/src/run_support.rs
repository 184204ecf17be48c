use loadphase_core::{ProfileSpec, RunOverrides, ThresholdSet};

use crate::cli::{OverrideArgs, SourceArgs};
use crate::profile_yaml;
use crate::run_error::RunError;

/// Without `--phase` or `--profile` the run is shaped by `--vus`/`--duration` alone.
pub(crate) async fn load_source(source: &SourceArgs) -> Result<ProfileSpec, RunError> {
    match (source.phase, &source.profile) {
        (Some(phase), _) => Ok(phase.spec()),
        (None, Some(path)) => profile_yaml::load_profile(path)
            .await
            .map_err(RunError::InvalidInput),
        (None, None) => Ok(ProfileSpec::default()),
    }
}

pub(crate) fn run_overrides(args: &OverrideArgs) -> RunOverrides {
    RunOverrides {
        base_url: args.base_url.clone(),
        vus: args.vus,
        duration: args.duration,
        timeout: args.timeout,
        think_time: args.think_time,
        identity_mode: args.identity_mode,
        identity_space: args.identity_space,
        thresholds: group_thresholds(&args.thresholds),
        tick: args.tick,
        graceful_stop: args.graceful_stop,
    }
}

/// Repeated `--threshold` flags for one metric form one set, in flag order.
fn group_thresholds(flags: &[(String, String)]) -> Vec<ThresholdSet> {
    let mut sets: Vec<ThresholdSet> = Vec::new();
    for (metric, expr) in flags {
        match sets.iter_mut().find(|s| &s.metric == metric) {
            Some(set) => set.expressions.push(expr.clone()),
            None => sets.push(ThresholdSet {
                metric: metric.clone(),
                expressions: vec![expr.clone()],
            }),
        }
    }
    sets
}
