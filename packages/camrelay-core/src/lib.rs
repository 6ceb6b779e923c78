//! camrelay-core - shared library for the camera ingest/decode/republish server.
//!
//! This crate accepts raw H.264/AAC streams from multiple camera devices over
//! TCP, decodes them, and republishes the result to local previews and to a
//! native media-sender library. It is designed to be driven by the
//! standalone server binary in `apps/server`, or embedded directly by a host
//! application via [`supervisor::Supervisor`] and the [`events`] callback
//! surface.
//!
//! # Architecture
//!
//! - [`framing`]: the wire protocol's length-prefixed frame codec (C1)
//! - [`stream`]: per-connection state machine, handshake, and streaming loop (C2)
//! - [`pixel`]: YUV420p/NV12/RGB conversion helpers (C4)
//! - [`publisher`]: the republish adapter trait and its two implementations (C5)
//! - [`supervisor`]: the composition root owning every listener (C6)
//! - [`interfaces`]: network interface enumeration and bind-IP resolution (C7)
//! - [`events`]: the host callback surface (C8)
//! - [`config`]: construction-time configuration types (C10)
//! - [`error`]: centralized error types (C11)
//!
//! Decoding itself (C3) lives in the sibling `camrelay-decode` crate.

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod events;
pub mod framing;
pub mod interfaces;
pub mod pixel;
pub mod protocol_constants;
pub mod publisher;
pub mod runtime;
pub mod stream;
pub mod supervisor;
pub mod utils;

pub use config::{CoreConfig, PublisherKind, StreamConfig};
pub use error::{CoreError, CoreResult};
pub use events::{HostCallback, HostCallbacks, HostEvent, Hooks, NetworkCallback};
pub use framing::{Frame, FrameType};
pub use interfaces::{classify, list_interfaces, resolve_bind_ip, InterfaceInfo, NetworkKind};
pub use publisher::{NativePublisher, PassthroughPublisher, Publisher, Quality};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use stream::{force_disconnect, handle_connection, DeviceTelemetry, LatencyTracker, NegotiatedMedia, StreamRuntime};
pub use supervisor::Supervisor;
pub use utils::now_millis;
