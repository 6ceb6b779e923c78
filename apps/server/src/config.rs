//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.
//! Precedence: compiled-in defaults -> YAML file (if given) -> environment
//! variables -> CLI flags (applied by `main.rs` after `load()` returns).

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use camrelay_core::{CoreConfig, PublisherKind, Quality, StreamConfig};
use serde::Deserialize;

/// One camera's configuration as it appears in the YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfigSpec {
    pub stream_id: u32,
    pub listen_port: u16,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_width")]
    pub default_width: u32,
    #[serde(default = "default_height")]
    pub default_height: u32,
    #[serde(default = "default_fps")]
    pub default_fps: u32,
    #[serde(default = "default_audio_enabled")]
    pub default_audio_enabled: bool,
    #[serde(default = "default_sample_rate")]
    pub default_audio_sample_rate: u32,
    #[serde(default = "default_channels")]
    pub default_audio_channels: u16,
    #[serde(default = "default_bitrate")]
    pub default_video_bitrate: u32,
}

fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_fps() -> u32 {
    30
}
fn default_audio_enabled() -> bool {
    true
}
fn default_sample_rate() -> u32 {
    48_000
}
fn default_channels() -> u16 {
    2
}
fn default_bitrate() -> u32 {
    4_000_000
}

impl From<StreamConfigSpec> for StreamConfig {
    fn from(spec: StreamConfigSpec) -> Self {
        StreamConfig {
            display_name: spec
                .display_name
                .unwrap_or_else(|| format!("Camera {}", spec.stream_id)),
            stream_id: spec.stream_id,
            listen_port: spec.listen_port,
            default_width: spec.default_width,
            default_height: spec.default_height,
            default_fps: spec.default_fps,
            default_audio_enabled: spec.default_audio_enabled,
            default_audio_sample_rate: spec.default_audio_sample_rate,
            default_audio_channels: spec.default_audio_channels,
            default_video_bitrate: spec.default_video_bitrate,
        }
    }
}

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Explicit bind IP. `None` triggers auto-detection (§4.6 step 1).
    /// Override: `CAMRELAY_BIND_IP`
    pub bind_ip: Option<Ipv4Addr>,

    /// Explicit per-camera configuration. When empty, `camera_count`
    /// default cameras are generated starting at `base_port`.
    pub streams: Vec<StreamConfigSpec>,

    /// Number of default cameras to generate when `streams` is empty.
    /// Override: `CAMRELAY_CAMERA_COUNT`
    pub camera_count: u32,

    /// First listen port used when generating default cameras.
    pub base_port: u16,

    /// `native` or `passthrough`.
    /// Override: `CAMRELAY_PUBLISHER`
    pub publisher_kind: PublisherKind,

    /// Required when `publisher_kind = native`.
    /// Override: `CAMRELAY_NATIVE_LIBRARY_PATH`
    pub native_library_path: Option<PathBuf>,

    /// `low`, `medium`, or `high`.
    /// Override: `CAMRELAY_QUALITY`
    pub initial_quality: QualitySpec,

    /// Override: `CAMRELAY_LOG_LEVEL`
    pub log_level: log::LevelFilter,
}

/// YAML-friendly mirror of [`Quality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualitySpec {
    Low,
    Medium,
    High,
}

impl From<QualitySpec> for Quality {
    fn from(spec: QualitySpec) -> Self {
        match spec {
            QualitySpec::Low => Quality::Low,
            QualitySpec::Medium => Quality::Medium,
            QualitySpec::High => Quality::High,
        }
    }
}

impl std::str::FromStr for QualitySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(QualitySpec::Low),
            "medium" => Ok(QualitySpec::Medium),
            "high" => Ok(QualitySpec::High),
            other => Err(format!("unknown quality level: {other}")),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: None,
            streams: Vec::new(),
            camera_count: 1,
            base_port: 5000,
            publisher_kind: PublisherKind::Passthrough,
            native_library_path: None,
            initial_quality: QualitySpec::Medium,
            log_level: log::LevelFilter::Info,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("CAMRELAY_BIND_IP") {
            self.bind_ip = Some(
                val.parse()
                    .with_context(|| format!("invalid CAMRELAY_BIND_IP: {val}"))?,
            );
        }

        if let Ok(val) = std::env::var("CAMRELAY_CAMERA_COUNT") {
            self.camera_count = val
                .parse()
                .with_context(|| format!("invalid CAMRELAY_CAMERA_COUNT: {val}"))?;
        }

        if let Ok(val) = std::env::var("CAMRELAY_PUBLISHER") {
            self.publisher_kind = match val.to_lowercase().as_str() {
                "native" => PublisherKind::Native,
                "passthrough" => PublisherKind::Passthrough,
                other => anyhow::bail!("invalid CAMRELAY_PUBLISHER: {other}"),
            };
        }

        if let Ok(val) = std::env::var("CAMRELAY_NATIVE_LIBRARY_PATH") {
            self.native_library_path = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("CAMRELAY_QUALITY") {
            self.initial_quality = val
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| "invalid CAMRELAY_QUALITY".to_string())?;
        }

        if let Ok(val) = std::env::var("CAMRELAY_LOG_LEVEL") {
            self.log_level = val
                .parse()
                .with_context(|| format!("invalid CAMRELAY_LOG_LEVEL: {val}"))?;
        }

        Ok(())
    }

    /// Builds the list of per-camera configs: the explicit `streams` list
    /// if non-empty, otherwise `camera_count` defaults starting at
    /// `base_port`.
    fn resolved_streams(&self) -> Vec<StreamConfig> {
        if !self.streams.is_empty() {
            self.streams.iter().cloned().map(StreamConfig::from).collect()
        } else {
            (1..=self.camera_count)
                .map(|id| StreamConfig::default_for_index(id, self.base_port))
                .collect()
        }
    }

    /// Converts to camrelay-core's construction-time configuration type.
    pub fn to_core_config(&self) -> CoreConfig {
        CoreConfig {
            bind_ip: self.bind_ip,
            streams: self.resolved_streams(),
            publisher_kind: self.publisher_kind,
            native_library_path: self.native_library_path.clone(),
            initial_quality: self.initial_quality.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_generates_one_camera() {
        let config = ServerConfig::default();
        let core = config.to_core_config();
        assert_eq!(core.streams.len(), 1);
        assert_eq!(core.streams[0].listen_port, 5000);
    }

    #[test]
    fn explicit_streams_take_precedence_over_camera_count() {
        let mut config = ServerConfig::default();
        config.camera_count = 4;
        config.streams = vec![StreamConfigSpec {
            stream_id: 7,
            listen_port: 9000,
            display_name: Some("Porch".into()),
            default_width: 1920,
            default_height: 1080,
            default_fps: 24,
            default_audio_enabled: false,
            default_audio_sample_rate: 44_100,
            default_audio_channels: 1,
            default_video_bitrate: 2_000_000,
        }];
        let core = config.to_core_config();
        assert_eq!(core.streams.len(), 1);
        assert_eq!(core.streams[0].listen_port, 9000);
        assert_eq!(core.streams[0].display_name, "Porch");
    }

    #[test]
    fn camera_count_range_is_validated_by_cli_not_config() {
        // camera_count itself is unchecked here; `main.rs` enforces 1..=8
        // on the CLI flag before it ever reaches `ServerConfig`.
        let config = ServerConfig {
            camera_count: 20,
            ..ServerConfig::default()
        };
        assert_eq!(config.to_core_config().streams.len(), 20);
    }
}
