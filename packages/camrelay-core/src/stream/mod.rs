//! Per-connection pipeline: state, handshake, streaming loop, teardown (C2).

pub mod handler;
pub mod types;

pub use handler::{force_disconnect, handle_connection};
pub use types::{DeviceTelemetry, LatencyTracker, NegotiatedMedia, StreamRuntime};
