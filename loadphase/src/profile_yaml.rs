use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use loadphase_core::{ProfileSpec, Stage, TargetSpec, ThresholdSet};
use serde::{Deserialize, Serialize};

/// A load profile as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ProfileYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Executor kind: constant-vus | ramping-vus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,

    // constant-vus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<YamlDuration>,

    // ramping-vus
    #[serde(rename = "startVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<u64>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stages: Vec<StageYaml>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub think_time: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub graceful_stop: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityYaml>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetYaml>,

    /// Status code -> outcome name (success | conflict | exhausted).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub expected_statuses: BTreeMap<u16, String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub checks: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub thresholds: BTreeMap<String, ThresholdExprYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub target: u64,

    #[serde(default)]
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct IdentityYaml {
    /// unique | repeat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub space: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct TargetYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Query parameter carrying the identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Many(Vec<String>),
}

impl ThresholdExprYaml {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }

    fn from_slice(expressions: &[String]) -> Self {
        match expressions {
            [one] => Self::One(one.clone()),
            many => Self::Many(many.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration cannot be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl From<ProfileYaml> for ProfileSpec {
    fn from(doc: ProfileYaml) -> Self {
        let ProfileYaml {
            name,
            executor,
            vus,
            duration,
            start_vus,
            stages,
            timeout,
            think_time,
            graceful_stop,
            identity,
            target,
            expected_statuses,
            checks,
            thresholds,
        } = doc;

        let identity = identity.unwrap_or_default();
        let target = target.unwrap_or_default();

        ProfileSpec {
            name,
            executor,
            vus,
            duration: duration.map(YamlDuration::into_inner),
            start_vus,
            stages: stages
                .into_iter()
                .map(|s| Stage {
                    duration: s.duration.into_inner(),
                    target: s.target,
                })
                .collect(),
            timeout: timeout.map(YamlDuration::into_inner),
            think_time: think_time.map(YamlDuration::into_inner),
            graceful_stop: graceful_stop.map(YamlDuration::into_inner),
            identity_mode: identity.mode,
            identity_space: identity.space,
            target: TargetSpec {
                path: target.path,
                param: target.param,
                headers: target.headers.into_iter().collect(),
            },
            expected_statuses: expected_statuses.into_iter().collect(),
            checks,
            thresholds: thresholds
                .into_iter()
                .map(|(metric, exprs)| ThresholdSet {
                    metric,
                    expressions: exprs.into_vec(),
                })
                .collect(),
        }
    }
}

impl From<&ProfileSpec> for ProfileYaml {
    fn from(spec: &ProfileSpec) -> Self {
        let identity = (spec.identity_mode.is_some() || spec.identity_space.is_some()).then(|| {
            IdentityYaml {
                mode: spec.identity_mode.clone(),
                space: spec.identity_space,
            }
        });
        let target = (spec.target != TargetSpec::default()).then(|| TargetYaml {
            path: spec.target.path.clone(),
            param: spec.target.param.clone(),
            headers: spec.target.headers.iter().cloned().collect(),
        });

        let mut thresholds = BTreeMap::<String, Vec<String>>::new();
        for set in &spec.thresholds {
            thresholds
                .entry(set.metric.clone())
                .or_default()
                .extend(set.expressions.iter().cloned());
        }

        ProfileYaml {
            name: spec.name.clone(),
            executor: spec.executor.clone(),
            vus: spec.vus,
            duration: spec.duration.map(YamlDuration::from),
            start_vus: spec.start_vus,
            stages: spec
                .stages
                .iter()
                .map(|st| StageYaml {
                    duration: YamlDuration::from(st.duration),
                    target: st.target,
                })
                .collect(),
            timeout: spec.timeout.map(YamlDuration::from),
            think_time: spec.think_time.map(YamlDuration::from),
            graceful_stop: spec.graceful_stop.map(YamlDuration::from),
            identity,
            target,
            expected_statuses: spec.expected_statuses.iter().cloned().collect(),
            checks: spec.checks.clone(),
            thresholds: thresholds
                .into_iter()
                .map(|(metric, exprs)| (metric, ThresholdExprYaml::from_slice(&exprs)))
                .collect(),
        }
    }
}

pub(crate) fn parse_profile(text: &str) -> anyhow::Result<ProfileSpec> {
    let doc: ProfileYaml = serde_yaml::from_str(text)?;
    Ok(doc.into())
}

/// Reads a profile; a missing `name` falls back to the file stem.
pub(crate) async fn load_profile(path: &Path) -> anyhow::Result<ProfileSpec> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read profile: {}", path.display()))?;

    let mut spec = parse_profile(&text)
        .with_context(|| format!("failed to parse profile YAML: {}", path.display()))?;

    if spec.name.is_none() {
        spec.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(ToString::to_string);
    }
    Ok(spec)
}

pub(crate) async fn write_yaml_file(path: &Path, spec: &ProfileSpec) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&ProfileYaml::from(spec)).context("serialize profile")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    tokio::fs::write(path, yaml)
        .await
        .with_context(|| format!("failed to write profile: {}", path.display()))
}
