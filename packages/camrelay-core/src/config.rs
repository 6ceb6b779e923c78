//! Core-level configuration types (C10's construction-time half).
//!
//! These are the types the supervisor is actually built from. Loading them
//! from YAML, environment variables, and CLI flags is the binary crate's
//! job (`ServerConfig::load` / `to_core_config` in `apps/server`); this
//! crate only knows how to consume the result.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::publisher::Quality;

/// Immutable, per-camera configuration. Created once when the supervisor
/// is built and never mutated afterward; live negotiated state lives on
/// `StreamRuntime` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub stream_id: u32,
    pub listen_port: u16,
    pub display_name: String,
    pub default_width: u32,
    pub default_height: u32,
    pub default_fps: u32,
    pub default_audio_enabled: bool,
    pub default_audio_sample_rate: u32,
    pub default_audio_channels: u16,
    pub default_video_bitrate: u32,
}

impl StreamConfig {
    /// Builds the Nth default camera config (1-indexed), used by
    /// `--camera-count` when no explicit stream list is configured.
    pub fn default_for_index(stream_id: u32, base_port: u16) -> Self {
        StreamConfig {
            stream_id,
            listen_port: base_port + (stream_id as u16 - 1),
            display_name: format!("Camera {stream_id}"),
            default_width: 1280,
            default_height: 720,
            default_fps: 30,
            default_audio_enabled: true,
            default_audio_sample_rate: 48_000,
            default_audio_channels: 2,
            default_video_bitrate: 4_000_000,
        }
    }
}

/// Which [`crate::publisher::Publisher`] implementation the supervisor
/// constructs for each stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    Native,
    Passthrough,
}

/// The fully-resolved configuration a [`crate::supervisor::Supervisor`] is
/// constructed from, after layering (file → env → CLI) has already
/// happened upstream.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Explicit bind IP, or `None` to auto-detect via the interface
    /// inspector (§4.6 step 1).
    pub bind_ip: Option<Ipv4Addr>,
    pub streams: Vec<StreamConfig>,
    pub publisher_kind: PublisherKind,
    /// Required when `publisher_kind == Native`.
    pub native_library_path: Option<PathBuf>,
    pub initial_quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_for_index_offsets_port_by_stream_id() {
        let cam1 = StreamConfig::default_for_index(1, 5000);
        let cam2 = StreamConfig::default_for_index(2, 5000);
        assert_eq!(cam1.listen_port, 5000);
        assert_eq!(cam2.listen_port, 5001);
    }
}
