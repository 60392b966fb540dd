use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How pointer input on the canvas steers the models' gaze.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerSetting {
    #[default]
    Off,
    Follow,
    Click,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageConfig {
    pub version: u32,
    #[serde(default)]
    pub canvas: CanvasSection,
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CanvasSection {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub offset: [f32; 2],
    #[serde(default)]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub show_hit_areas: bool,
    #[serde(default)]
    pub pointer: PointerSetting,
}

impl Default for CanvasSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            offset: [0.0, 0.0],
            clear_color: [0.0; 4],
            show_hit_areas: false,
            pointer: PointerSetting::Off,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerSection {
    #[serde(
        default = "default_frame_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub frame_interval: Duration,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            frame_interval: default_frame_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub archive: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub position: [f32; 2],
    #[serde(default)]
    pub gaze_speed: f32,
    #[serde(default)]
    pub body_speed: f32,
}

/// Where a model entry's assets come from, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocation<'a> {
    Manifest(&'a str),
    Archive(&'a str),
}

impl ModelEntry {
    pub fn location(&self) -> Option<ModelLocation<'_>> {
        match (self.manifest.as_deref(), self.archive.as_deref()) {
            (Some(manifest), None) => Some(ModelLocation::Manifest(manifest)),
            (None, Some(archive)) => Some(ModelLocation::Archive(archive)),
            _ => None,
        }
    }
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_scale() -> f32 {
    1.0
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(16)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl StageConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: StageConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn model(&self, name: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|entry| entry.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ConfigError::Invalid(
                "canvas width and height must be greater than zero".into(),
            ));
        }

        if self.runner.frame_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "runner.frame_interval must be greater than zero".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for entry in &self.models {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("model name may not be empty".into()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "model '{name}' is declared more than once"
                )));
            }

            if entry.location().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "model '{name}' must set exactly one of 'manifest' or 'archive'"
                )));
            }

            if !(entry.scale > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "model '{name}' scale must be > 0"
                )));
            }

            if entry.gaze_speed < 0.0 || entry.body_speed < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "model '{name}' speeds must be >= 0"
                )));
            }
        }

        Ok(())
    }
}
