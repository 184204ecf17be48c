use std::time::Duration;

use loadphase_metrics::Outcome;

use crate::checks::Check;
use crate::classify::Classifier;
use crate::identity::{DEFAULT_IDENTITY_SPACE, IdentityGenerator, IdentityMode};
use crate::schedule::RampingSchedule;
use crate::thresholds::{ThresholdRule, ThresholdSet, compile_thresholds};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TARGET_PATH: &str = "/coupon/apply";
pub const DEFAULT_IDENTITY_PARAM: &str = "userId";
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
pub const MAX_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Executor kind (the string form used by profiles and the CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ExecutorKind {
    #[strum(to_string = "constant-vus", serialize = "constant")]
    ConstantVus,

    #[strum(serialize = "ramping-vus")]
    RampingVus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSpec {
    pub path: Option<String>,
    pub param: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// A load profile as written in a preset or profile file; nothing is validated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSpec {
    pub name: Option<String>,
    pub executor: Option<String>,

    // Constant
    pub vus: Option<u64>,
    pub duration: Option<Duration>,

    // Ramping
    pub start_vus: Option<u64>,
    pub stages: Vec<Stage>,

    pub timeout: Option<Duration>,
    pub think_time: Option<Duration>,
    pub graceful_stop: Option<Duration>,
    pub identity_mode: Option<String>,
    pub identity_space: Option<u64>,
    pub target: TargetSpec,

    /// `(status, outcome name)`. Empty means the default vocabulary.
    pub expected_statuses: Vec<(u16, String)>,
    pub checks: Vec<String>,
    pub thresholds: Vec<ThresholdSet>,
}

/// Command-line overrides. Anything set here beats the profile.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub base_url: Option<String>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub timeout: Option<Duration>,
    pub think_time: Option<Duration>,
    pub identity_mode: Option<IdentityMode>,
    pub identity_space: Option<u64>,
    /// Replace the profile's expressions for the same metric.
    pub thresholds: Vec<ThresholdSet>,
    pub tick: Option<Duration>,
    pub graceful_stop: Option<Duration>,
}

impl RunOverrides {
    fn reshapes_load(&self) -> bool {
        self.vus.is_some() || self.duration.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProfile {
    Constant { vus: u64, duration: Duration },
    Ramping { start_vus: u64, stages: Vec<Stage> },
}

impl LoadProfile {
    #[must_use]
    pub fn kind(&self) -> ExecutorKind {
        match self {
            Self::Constant { .. } => ExecutorKind::ConstantVus,
            Self::Ramping { .. } => ExecutorKind::RampingVus,
        }
    }

    /// A constant profile is a single flat stage.
    #[must_use]
    pub fn schedule(&self) -> RampingSchedule {
        match self {
            Self::Constant { vus, duration } => RampingSchedule::new(
                *vus,
                vec![Stage {
                    duration: *duration,
                    target: *vus,
                }],
            ),
            Self::Ramping { start_vus, stages } => RampingSchedule::new(*start_vus, stages.clone()),
        }
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        match self {
            Self::Constant { duration, .. } => *duration,
            Self::Ramping { stages, .. } => stages_duration(stages),
        }
    }

    #[must_use]
    pub fn peak_workers(&self) -> u64 {
        match self {
            Self::Constant { vus, .. } => *vus,
            Self::Ramping { start_vus, stages } => stages
                .iter()
                .map(|s| s.target)
                .max()
                .unwrap_or(0)
                .max(*start_vus),
        }
    }

    #[must_use]
    pub fn final_target(&self) -> u64 {
        match self {
            Self::Constant { vus, .. } => *vus,
            Self::Ramping { start_vus, stages } => {
                stages.last().map(|s| s.target).unwrap_or(*start_vus)
            }
        }
    }
}

fn stages_duration(stages: &[Stage]) -> Duration {
    stages
        .iter()
        .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
}

/// Where requests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Everything up to and including `{param}=`.
    url_prefix: String,
    pub headers: Vec<(String, String)>,
}

impl Target {
    pub fn new(base_url: &str, spec: &TargetSpec) -> Result<Self> {
        let base = url::Url::parse(base_url)
            .map_err(|e| Error::InvalidTarget(format!("base url `{base_url}`: {e}")))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(Error::InvalidTarget(format!(
                "base url `{base_url}` must use http:// or https://"
            )));
        }

        let path = spec.path.as_deref().unwrap_or(DEFAULT_TARGET_PATH);
        if !path.starts_with('/') {
            return Err(Error::InvalidTarget(format!("path `{path}` must start with `/`")));
        }

        let param = spec.param.as_deref().unwrap_or(DEFAULT_IDENTITY_PARAM);
        if param.is_empty() || param.contains(['&', '=', '?', '#']) {
            return Err(Error::InvalidTarget(format!(
                "identity parameter `{param}` is not a valid query key"
            )));
        }

        let sep = if path.contains('?') { '&' } else { '?' };
        let url_prefix = format!("{}{path}{sep}{param}=", base_url.trim_end_matches('/'));

        Ok(Self {
            url_prefix,
            headers: spec.headers.clone(),
        })
    }

    #[must_use]
    pub fn url_for(&self, identity: u64) -> String {
        format!("{}{identity}", self.url_prefix)
    }
}

/// Validated, immutable configuration of one run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub name: String,
    pub load: LoadProfile,
    pub target: Target,
    pub timeout: Option<Duration>,
    pub think_time: Duration,
    pub graceful_stop: Duration,
    pub identity: IdentityGenerator,
    pub classifier: Classifier,
    pub checks: Vec<Check>,
    pub thresholds: Vec<ThresholdRule>,
    pub tick: Duration,
}

impl RunPlan {
    /// Layers `overrides` over `spec` over engine defaults and validates the result.
    pub fn resolve(spec: ProfileSpec, overrides: RunOverrides) -> Result<Self> {
        let load = resolve_load(&spec, &overrides)?;

        let base_url = overrides.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let target = Target::new(base_url, &spec.target)?;

        let mode = match (overrides.identity_mode, spec.identity_mode.as_deref()) {
            (Some(mode), _) => mode,
            (None, Some(raw)) => raw
                .parse::<IdentityMode>()
                .map_err(|_| Error::InvalidIdentityMode(raw.to_string()))?,
            (None, None) => IdentityMode::default(),
        };
        let space = overrides
            .identity_space
            .or(spec.identity_space)
            .unwrap_or(DEFAULT_IDENTITY_SPACE);
        let identity = IdentityGenerator::new(mode, space, load.peak_workers())?;

        let classifier = if spec.expected_statuses.is_empty() {
            Classifier::default()
        } else {
            let mut mapping = Vec::with_capacity(spec.expected_statuses.len());
            for (status, name) in &spec.expected_statuses {
                let outcome: Outcome = name.parse().map_err(|_| {
                    Error::InvalidStatusMapping(format!("{status}: unknown outcome `{name}`"))
                })?;
                mapping.push((*status, outcome));
            }
            Classifier::new(mapping)?
        };

        let checks = spec
            .checks
            .iter()
            .map(|c| c.parse::<Check>())
            .collect::<Result<Vec<_>>>()?;

        let thresholds = compile_thresholds(&merge_thresholds(spec.thresholds, overrides.thresholds))?;

        let tick = overrides.tick.unwrap_or(DEFAULT_TICK);
        if tick < Duration::from_millis(1) || tick > MAX_TICK {
            return Err(Error::InvalidTick(tick));
        }

        Ok(Self {
            name: spec.name.unwrap_or_else(|| "default".to_string()),
            load,
            target,
            timeout: overrides.timeout.or(spec.timeout).filter(|t| !t.is_zero()),
            think_time: overrides.think_time.or(spec.think_time).unwrap_or_default(),
            graceful_stop: overrides
                .graceful_stop
                .or(spec.graceful_stop)
                .unwrap_or(DEFAULT_GRACEFUL_STOP),
            identity,
            classifier,
            checks,
            thresholds,
            tick,
        })
    }
}

fn resolve_load(spec: &ProfileSpec, overrides: &RunOverrides) -> Result<LoadProfile> {
    let kind = match spec.executor.as_deref() {
        Some(name) => name
            .parse::<ExecutorKind>()
            .map_err(|_| Error::InvalidExecutor(name.to_string()))?,
        None if spec.stages.is_empty() => ExecutorKind::ConstantVus,
        None => ExecutorKind::RampingVus,
    };

    // CLI `--vus`/`--duration` ask for a flat run even when the profile ramps.
    if kind == ExecutorKind::ConstantVus || overrides.reshapes_load() {
        let vus = overrides.vus.or(spec.vus).unwrap_or(1);
        if vus == 0 {
            return Err(Error::InvalidVus);
        }

        let ramp_duration = Some(stages_duration(&spec.stages)).filter(|d| !d.is_zero());
        let duration = overrides
            .duration
            .or(spec.duration)
            .or(ramp_duration)
            .unwrap_or(Duration::ZERO);
        if duration.is_zero() {
            return Err(Error::ZeroDuration);
        }

        return Ok(LoadProfile::Constant { vus, duration });
    }

    if spec.stages.is_empty() {
        return Err(Error::EmptyStages);
    }

    let load = LoadProfile::Ramping {
        start_vus: spec.start_vus.unwrap_or(0),
        stages: spec.stages.clone(),
    };
    if load.total_duration().is_zero() {
        return Err(Error::ZeroDuration);
    }
    if load.peak_workers() == 0 {
        return Err(Error::InvalidVus);
    }

    Ok(load)
}

fn merge_thresholds(profile: Vec<ThresholdSet>, cli: Vec<ThresholdSet>) -> Vec<ThresholdSet> {
    let mut merged: Vec<ThresholdSet> = profile
        .into_iter()
        .filter(|p| !cli.iter().any(|c| c.metric == p.metric))
        .collect();
    merged.extend(cli);
    merged
}
