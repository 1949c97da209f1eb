use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::scale::ScaleLimits;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub document_url: Option<String>,
    pub filename: Option<String>,
    pub scale: ScaleLimits,
    pub timing: TimingConfig,
    pub visibility: VisibilityConfig,
    pub wheel_zoom_divisor: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            document_url: None,
            filename: None,
            scale: ScaleLimits::default(),
            timing: TimingConfig::default(),
            visibility: VisibilityConfig::default(),
            wheel_zoom_divisor: 300.0,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "resize_debounce_ms")]
    pub resize_debounce: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "frame_interval_ms")]
    pub frame_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            resize_debounce: Duration::from_millis(160),
            frame_interval: Duration::from_millis(16),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisibilityConfig {
    pub threshold: f32,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl ViewerConfig {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "pdfscroll", "pdfscroll")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse viewer config")?;
        Ok(config.normalized())
    }

    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }

    fn normalized(mut self) -> Self {
        self.scale = self.scale.normalized();
        if !(self.visibility.threshold > 0.0 && self.visibility.threshold <= 1.0) {
            self.visibility.threshold = VisibilityConfig::default().threshold;
        }
        if !(self.wheel_zoom_divisor.is_finite() && self.wheel_zoom_divisor > 0.0) {
            self.wheel_zoom_divisor = Self::default().wheel_zoom_divisor;
        }
        if self.timing.frame_interval.is_zero() {
            self.timing.frame_interval = TimingConfig::default().frame_interval;
        }
        self
    }
}
