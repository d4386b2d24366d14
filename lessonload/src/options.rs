use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use lessonload_core::{RunOptions, Stage, StageSchedule, ThresholdSet};
use serde::{Deserialize, Serialize};

use crate::workload::{DEFAULT_THINK_TIME, default_stages, lesson_thresholds};

/// YAML options file:
///
/// ```yaml
/// stages:
///   - { duration: 5s, target: 10 }
///   - { duration: 10s, target: 10 }
///   - { duration: 5s, target: 0 }
/// thresholds:
///   http_req_duration: ["p(95)<2000", "p(99)<3000"]
///   checkout_duration: "p(95)<2000"
/// thinkTime: 1s
/// ```
///
/// Omitted keys fall back to the built-in lesson-flow defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct OptionsFile {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stages: Vec<StageYaml>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub thresholds: BTreeMap<String, ThresholdExprYaml>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub think_time: Option<YamlDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Many(Vec<String>),
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

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 5s), integer seconds, or float seconds")
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
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl OptionsFile {
    pub(crate) async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read options file: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid options file: {}", path.display()))
    }

    pub(crate) fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub(crate) fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub(crate) fn from_stages(stages: &[Stage]) -> Self {
        Self {
            stages: stages
                .iter()
                .map(|s| StageYaml {
                    duration: s.duration.into(),
                    target: s.target,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub(crate) fn stages(&self) -> Vec<Stage> {
        if self.stages.is_empty() {
            return default_stages();
        }
        self.stages
            .iter()
            .map(|s| Stage::new(s.duration.into_inner(), s.target))
            .collect()
    }

    /// Declared thresholds replace the defaults wholesale.
    pub(crate) fn thresholds(&self) -> Vec<ThresholdSet> {
        if self.thresholds.is_empty() {
            return lesson_thresholds();
        }
        self.thresholds
            .iter()
            .map(|(metric, expr)| match expr {
                ThresholdExprYaml::One(e) => ThresholdSet::new(metric, [e.as_str()]),
                ThresholdExprYaml::Many(v) => ThresholdSet::new(metric, v.iter().cloned()),
            })
            .collect()
    }
}

/// Fully resolved settings for one `run`.
#[derive(Debug, Clone)]
pub(crate) struct LoadOptions {
    pub run: RunOptions,
    pub think_time: Duration,
}

impl LoadOptions {
    pub(crate) fn resolve(
        file: Option<&OptionsFile>,
        think_time: Option<Duration>,
    ) -> lessonload_core::Result<Self> {
        let defaults = OptionsFile::default();
        let file = file.unwrap_or(&defaults);

        let schedule = StageSchedule::new(file.stages())?;
        let think_time = think_time
            .or(file.think_time.map(YamlDuration::into_inner))
            .unwrap_or(DEFAULT_THINK_TIME);

        Ok(Self {
            run: RunOptions {
                schedule,
                thresholds: file.thresholds(),
            },
            think_time,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn stages_round_trip_through_yaml() {
        let declared = vec![
            Stage::new(Duration::from_secs(5), 10),
            Stage::new(Duration::from_secs(10), 10),
            Stage::new(Duration::from_millis(2500), 0),
        ];

        let yaml = OptionsFile::from_stages(&declared).to_yaml().unwrap();
        let parsed = OptionsFile::parse(&yaml).unwrap();

        assert_eq!(parsed.stages(), declared);
    }

    #[test]
    fn parses_full_options_file() {
        let yaml = r#"
stages:
  - duration: 1m
    target: 50
  - { duration: 30, target: 0 }
thresholds:
  http_req_duration: ["p(95)<500", "p(99)<900"]
  checkout_duration: "avg<300"
thinkTime: 250ms
"#;
        let file = OptionsFile::parse(yaml).unwrap();
        let opts = LoadOptions::resolve(Some(&file), None).unwrap();

        assert_eq!(
            opts.run.schedule.stages(),
            [
                Stage::new(Duration::from_secs(60), 50),
                Stage::new(Duration::from_secs(30), 0),
            ]
        );
        assert_eq!(
            opts.run.thresholds,
            vec![
                ThresholdSet::new("checkout_duration", ["avg<300"]),
                ThresholdSet::new("http_req_duration", ["p(95)<500", "p(99)<900"]),
            ]
        );
        assert_eq!(opts.think_time, Duration::from_millis(250));
    }

    #[test]
    fn missing_file_resolves_to_lesson_defaults() {
        let opts = LoadOptions::resolve(None, Some(Duration::ZERO)).unwrap();
        assert_eq!(opts.run.schedule.stages(), default_stages());
        assert_eq!(opts.run.thresholds, lesson_thresholds());
        assert_eq!(opts.think_time, Duration::ZERO);

        let opts = LoadOptions::resolve(None, None).unwrap();
        assert_eq!(opts.think_time, DEFAULT_THINK_TIME);
    }

    #[test]
    fn cli_think_time_overrides_file() {
        let file = OptionsFile::parse("thinkTime: 3s").unwrap();
        let opts = LoadOptions::resolve(Some(&file), Some(Duration::from_millis(10))).unwrap();
        assert_eq!(opts.think_time, Duration::from_millis(10));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(OptionsFile::parse("stages: [{ duration: 5x, target: 1 }]").is_err());
        assert!(OptionsFile::parse("stages: [{ duration: -1, target: 1 }]").is_err());
        assert!(OptionsFile::parse("vus: 10").is_err());

        let zero = OptionsFile::parse("stages: [{ duration: 5s, target: 0 }]").unwrap();
        assert!(matches!(
            LoadOptions::resolve(Some(&zero), None),
            Err(lessonload_core::Error::InvalidVus)
        ));
    }
}
