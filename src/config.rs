use crate::transport::FieldNames;
use crate::video::FrameEncoder;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_CAPTURE_RATE_HZ: f64 = 30.0;
const MAX_REFRESH_RATE_HZ: f64 = 240.0;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_analysis_url")]
    pub analysis_url: String,

    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,

    #[serde(default)]
    pub song_id: Option<String>,

    #[serde(default = "default_capture_rate")]
    pub capture_rate_hz: f64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_hz: f64,

    #[serde(default = "default_camera_path")]
    pub camera_path: String,

    #[serde(default = "default_camera_fps")]
    pub camera_fps: u32,

    #[serde(default = "default_image_field")]
    pub image_field: String,

    #[serde(default = "default_context_field")]
    pub context_field: String,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_analysis_url() -> String {
    "http://localhost:8000/analyze-frame".to_string()
}

fn default_catalog_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_capture_rate() -> f64 {
    4.0
}

fn default_jpeg_quality() -> u8 {
    FrameEncoder::DEFAULT_QUALITY
}

fn default_refresh_rate() -> f64 {
    60.0
}

fn default_camera_path() -> String {
    "frames".to_string()
}

fn default_camera_fps() -> u32 {
    30
}

fn default_image_field() -> String {
    "image".to_string()
}

fn default_context_field() -> String {
    "context".to_string()
}

fn default_snapshot_path() -> String {
    "overlay.png".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis_url: default_analysis_url(),
            catalog_url: default_catalog_url(),
            song_id: None,
            capture_rate_hz: default_capture_rate(),
            jpeg_quality: default_jpeg_quality(),
            refresh_rate_hz: default_refresh_rate(),
            camera_path: default_camera_path(),
            camera_fps: default_camera_fps(),
            image_field: default_image_field(),
            context_field: default_context_field(),
            snapshot_path: default_snapshot_path(),
            timeout: default_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/fretsight/config.json)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Save configuration to `config_path`
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("fretsight").join("config.json"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.analysis_url.is_empty() {
            return Err(anyhow::anyhow!("analysis_url cannot be empty"));
        }

        if self.catalog_url.is_empty() {
            return Err(anyhow::anyhow!("catalog_url cannot be empty"));
        }

        if !(self.capture_rate_hz > 0.0 && self.capture_rate_hz <= MAX_CAPTURE_RATE_HZ) {
            return Err(anyhow::anyhow!(
                "capture_rate_hz must be in (0, {}]",
                MAX_CAPTURE_RATE_HZ
            ));
        }

        if !(self.refresh_rate_hz > 0.0 && self.refresh_rate_hz <= MAX_REFRESH_RATE_HZ) {
            return Err(anyhow::anyhow!(
                "refresh_rate_hz must be in (0, {}]",
                MAX_REFRESH_RATE_HZ
            ));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow::anyhow!("jpeg_quality must be between 1 and 100"));
        }

        if self.camera_fps == 0 {
            return Err(anyhow::anyhow!("camera_fps must be positive"));
        }

        if self.image_field.is_empty() || self.context_field.is_empty() {
            return Err(anyhow::anyhow!("multipart field names cannot be empty"));
        }

        Ok(())
    }

    pub fn fields(&self) -> FieldNames {
        FieldNames {
            image: self.image_field.clone(),
            context: self.context_field.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
