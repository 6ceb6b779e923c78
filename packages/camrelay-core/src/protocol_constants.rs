//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the wire protocol and the native
//! republishing library's expectations; changing them breaks compatibility
//! with existing clients.

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Frame header
// ─────────────────────────────────────────────────────────────────────────────

/// Size of one frame header: 1 byte type + 4 bytes size + 4 bytes flags + 8 bytes timestamp.
pub const FRAME_HEADER_LEN: usize = 1 + 4 + 4 + 8;

/// A `size == 0` frame is rejected as a protocol violation.
pub const MIN_FRAME_PAYLOAD_LEN: u32 = 1;

/// A payload larger than this is rejected as a protocol violation.
pub const MAX_FRAME_PAYLOAD_LEN: u32 = 10_000_000;

/// `flags` bit meaning "this is decoder initialization data, not a picture/sample".
pub const FLAG_CODEC_CONFIG: u32 = 0x2;

// ─────────────────────────────────────────────────────────────────────────────
// Timeouts
// ─────────────────────────────────────────────────────────────────────────────

pub const DATA_HEADER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DATA_BODY_TIMEOUT: Duration = Duration::from_secs(5);
pub const CONFIG_HEADER_TIMEOUT: Duration = Duration::from_secs(5);
pub const CONFIG_BODY_TIMEOUT: Duration = Duration::from_secs(2);
pub const WATCHDOG_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const WATCHDOG_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
pub const FORCE_DISCONNECT_BATCH_TIMEOUT: Duration = Duration::from_secs(3);
pub const LISTENER_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
pub const PORT_RELEASE_WAIT: Duration = Duration::from_secs(1);
pub const NETWORK_MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Consecutive missed checks before the bind IP is declared down.
pub const NETWORK_MONITOR_FAILURE_THRESHOLD: u32 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Media defaults
// ─────────────────────────────────────────────────────────────────────────────

/// MPEG timestamp clock rate used to derive the `pts` increment (`90000 / fps`).
pub const PTS_CLOCK_RATE: u32 = 90_000;

/// Rolling window size for the latency sample average.
pub const LATENCY_WINDOW: usize = 30;

/// Sentinel for "unknown" integer telemetry fields (battery percent).
pub const TELEMETRY_UNKNOWN_INT: i32 = -1;

/// Sentinel for "unknown" float telemetry fields (CPU temperature).
pub const TELEMETRY_UNKNOWN_FLOAT: f64 = -1.0;

// ─────────────────────────────────────────────────────────────────────────────
// TCP socket options
// ─────────────────────────────────────────────────────────────────────────────

pub const RECV_BUFFER_SIZE: usize = 256 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Server rejection
// ─────────────────────────────────────────────────────────────────────────────

pub const PORT_IN_USE_MESSAGE: &[u8] = b"ERROR: Port already in use\n";

// ─────────────────────────────────────────────────────────────────────────────
// Application identity
// ─────────────────────────────────────────────────────────────────────────────

pub const APP_NAME: &str = "camrelay";
