//! Per-connection runtime state (§3 `StreamRuntime`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::protocol_constants::{LATENCY_WINDOW, PTS_CLOCK_RATE, TELEMETRY_UNKNOWN_FLOAT, TELEMETRY_UNKNOWN_INT};

/// Negotiated media parameters, populated from the handshake (or defaults)
/// and updated on mid-stream reconfiguration.
#[derive(Debug, Clone)]
pub struct NegotiatedMedia {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio_enabled: bool,
    pub sample_rate_index: Option<u8>,
    pub channel_config: Option<u8>,
}

impl NegotiatedMedia {
    pub fn from_defaults(config: &StreamConfig) -> Self {
        NegotiatedMedia {
            width: config.default_width,
            height: config.default_height,
            fps: config.default_fps,
            audio_enabled: config.default_audio_enabled,
            sample_rate_index: None,
            channel_config: None,
        }
    }

    /// The `pts` increment implied by the current frame rate (`90000 / fps`).
    pub fn pts_step(&self) -> i64 {
        (PTS_CLOCK_RATE / self.fps.max(1)) as i64
    }
}

/// Telemetry reported by the device in metadata frames.
#[derive(Debug, Clone)]
pub struct DeviceTelemetry {
    pub model: Option<String>,
    pub battery_percent: i32,
    pub cpu_temperature_c: f64,
}

impl Default for DeviceTelemetry {
    fn default() -> Self {
        DeviceTelemetry {
            model: None,
            battery_percent: TELEMETRY_UNKNOWN_INT,
            cpu_temperature_c: TELEMETRY_UNKNOWN_FLOAT,
        }
    }
}

/// Rolling average of `now - frame_receive_time` over the last
/// [`LATENCY_WINDOW`] samples.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    samples: Mutex<VecDeque<i64>>,
}

impl LatencyTracker {
    pub fn record(&self, latency_ms: i64) {
        let mut samples = self.samples.lock();
        samples.push_back(latency_ms);
        if samples.len() > LATENCY_WINDOW {
            samples.pop_front();
        }
    }

    pub fn average(&self) -> Option<f64> {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<i64>() as f64 / samples.len() as f64)
    }
}

/// Counters and liveness state mutated only by the owning handler task,
/// but read from the watchdog task concurrently, hence the atomics.
pub struct StreamRuntime {
    pub config: StreamConfig,
    pub peer_addr: std::net::SocketAddr,

    pub media: Mutex<NegotiatedMedia>,
    pub telemetry: Mutex<DeviceTelemetry>,
    pub latency: LatencyTracker,

    pub bytes_received: AtomicU64,
    pub video_frames_decoded: AtomicU64,
    pub audio_frames_decoded: AtomicU64,

    last_frame_at: Mutex<Instant>,
    pub force_stop: AtomicBool,
    pub running: AtomicBool,
    pts: AtomicI64,

    /// Set once the terminating `ConnectionChanged{false}` has been
    /// emitted, so it's never emitted twice (handler + supervisor races).
    pub disconnect_emitted: AtomicBool,

    /// Cancelled by `force_disconnect` to break a blocked `read_frame` at
    /// its next suspension point, independent of the header/body timeouts.
    pub cancel: CancellationToken,

    /// The connection's write half, taken and shut down exactly once by
    /// whichever of `force_disconnect` or the handler's own teardown runs
    /// first. `None` before the handler has split the accepted socket.
    pub writer: Mutex<Option<OwnedWriteHalf>>,
}

impl StreamRuntime {
    pub fn new(config: StreamConfig, peer_addr: std::net::SocketAddr) -> Arc<Self> {
        let media = NegotiatedMedia::from_defaults(&config);
        Arc::new(StreamRuntime {
            config,
            peer_addr,
            media: Mutex::new(media),
            telemetry: Mutex::new(DeviceTelemetry::default()),
            latency: LatencyTracker::default(),
            bytes_received: AtomicU64::new(0),
            video_frames_decoded: AtomicU64::new(0),
            audio_frames_decoded: AtomicU64::new(0),
            last_frame_at: Mutex::new(Instant::now()),
            force_stop: AtomicBool::new(false),
            running: AtomicBool::new(true),
            pts: AtomicI64::new(0),
            disconnect_emitted: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            writer: Mutex::new(None),
        })
    }

    pub fn touch(&self) {
        *self.last_frame_at.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_frame_at.lock().elapsed()
    }

    pub fn is_force_stopped(&self) -> bool {
        self.force_stop.load(Ordering::SeqCst)
    }

    pub fn request_force_stop(&self) {
        self.force_stop.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_running(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn next_pts(&self, step: i64) -> i64 {
        self.pts.fetch_add(step, Ordering::SeqCst)
    }

    /// Resets counters and `pts`, called on successful mid-stream
    /// reconfiguration (§9 open question: `pts` always resets to 0 here).
    pub fn reset_counters(&self) {
        self.video_frames_decoded.store(0, Ordering::SeqCst);
        self.audio_frames_decoded.store(0, Ordering::SeqCst);
        self.pts.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_runtime() -> Arc<StreamRuntime> {
        let config = StreamConfig::default_for_index(1, 5000);
        StreamRuntime::new(config, "127.0.0.1:1234".parse().unwrap())
    }

    #[test]
    fn pts_increments_by_step_and_returns_previous_value() {
        let runtime = test_runtime();
        assert_eq!(runtime.next_pts(3000), 0);
        assert_eq!(runtime.next_pts(3000), 3000);
        assert_eq!(runtime.next_pts(3000), 6000);
    }

    #[test]
    fn reset_counters_zeroes_pts_and_frame_counts() {
        let runtime = test_runtime();
        runtime.next_pts(3000);
        runtime.video_frames_decoded.store(42, Ordering::SeqCst);
        runtime.reset_counters();
        assert_eq!(runtime.next_pts(3000), 0);
        assert_eq!(runtime.video_frames_decoded.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn latency_tracker_caps_window_size() {
        let tracker = LatencyTracker::default();
        for i in 0..(LATENCY_WINDOW * 2) {
            tracker.record(i as i64);
        }
        assert_eq!(tracker.samples.lock().len(), LATENCY_WINDOW);
    }

    #[test]
    fn pts_step_derives_from_fps() {
        let media = NegotiatedMedia {
            width: 1280,
            height: 720,
            fps: 30,
            audio_enabled: false,
            sample_rate_index: None,
            channel_config: None,
        };
        assert_eq!(media.pts_step(), 3000);
    }
}
