//! Host-callback surface (C8).
//!
//! The supervisor exposes two optional callback slots to the embedding
//! host: one for [`HostEvent`] (everything except network status), one for
//! network status alone. Both are `Option<Arc<dyn Fn(...) + Send + Sync>>`
//! fields set once when the supervisor is constructed and read without any
//! lock thereafter — there is no runtime rebinding, so a `RwLock<Option<_>>`
//! would only add contention for no benefit.

use std::net::Ipv4Addr;
use std::sync::Arc;

/// Events delivered to the embedding host.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A stream's connection state changed. `info` carries a short
    /// human-readable description (peer address, codec) when connecting.
    ConnectionChanged {
        stream_id: String,
        connected: bool,
        info: Option<String>,
    },
    /// A decoded video frame converted to RGB for local preview.
    FrameDecoded {
        stream_id: String,
        rgb_buffer: Arc<Vec<u8>>,
        width: u32,
        height: u32,
    },
    /// A non-fatal error worth surfacing to the host's UI or logs.
    Error { message: String },
    /// The bind IP's reachability changed.
    NetworkStatusChanged {
        available: bool,
        ip: Option<Ipv4Addr>,
    },
    /// The supervisor finished its shutdown sequence; no further events follow.
    ServerStopped,
}

/// Callback invoked for every [`HostEvent`] other than `NetworkStatusChanged`.
pub type HostCallback = Arc<dyn Fn(HostEvent) + Send + Sync>;

/// Callback invoked only for `NetworkStatusChanged`, kept separate so a host
/// that only cares about connectivity doesn't have to filter the general
/// event stream.
pub type NetworkCallback = Arc<dyn Fn(bool, Option<Ipv4Addr>) + Send + Sync>;

/// The supervisor's two callback slots. Fields are public so the owning
/// supervisor can set them once at construction; nothing outside
/// construction ever assigns to them again.
#[derive(Clone, Default)]
pub struct HostCallbacks {
    pub on_event: Option<HostCallback>,
    pub on_network_status: Option<NetworkCallback>,
}

impl HostCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes `on_event` if set, logging and continuing if the host panics
    /// inside its callback rather than letting it take down the task.
    pub fn emit(&self, event: HostEvent) {
        if let Some(callback) = &self.on_event {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
            if result.is_err() {
                log::error!("host event callback panicked");
            }
        }
    }

    pub fn emit_network_status(&self, available: bool, ip: Option<Ipv4Addr>) {
        if let Some(callback) = &self.on_network_status {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(available, ip);
            }));
            if result.is_err() {
                log::error!("network status callback panicked");
            }
        }
    }
}

/// Per-handler dependency-injection hooks, standing in for what the
/// original implementation achieved by monkey-patching instance methods at
/// runtime to observe a live connection. A [`StreamRuntime`](crate::stream::StreamRuntime)
/// is given one `Hooks` value at construction and calls these instead of
/// reaching for a global event bus.
#[derive(Clone, Default)]
pub struct Hooks {
    pub on_config_received: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_frame_decoded: Option<Arc<dyn Fn(Arc<Vec<u8>>, u32, u32) + Send + Sync>>,
    pub on_disconnect: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_received(&self, description: &str) {
        if let Some(hook) = &self.on_config_received {
            hook(description);
        }
    }

    pub fn frame_decoded(&self, rgb: Arc<Vec<u8>>, width: u32, height: u32) {
        if let Some(hook) = &self.on_frame_decoded {
            hook(rgb, width, height);
        }
    }

    pub fn disconnected(&self) {
        if let Some(hook) = &self.on_disconnect {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_invokes_registered_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let callbacks = HostCallbacks {
            on_event: Some(Arc::new(move |_event| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })),
            on_network_status: None,
        };
        callbacks.emit(HostEvent::ServerStopped);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_with_no_callback_is_a_noop() {
        let callbacks = HostCallbacks::new();
        callbacks.emit(HostEvent::Error {
            message: "boom".into(),
        });
    }

    #[test]
    fn network_status_callback_receives_ip() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();
        let callbacks = HostCallbacks {
            on_event: None,
            on_network_status: Some(Arc::new(move |available, ip| {
                *seen_clone.lock().unwrap() = Some((available, ip));
            })),
        };
        let ip = Ipv4Addr::new(192, 168, 1, 5);
        callbacks.emit_network_status(true, Some(ip));
        assert_eq!(*seen.lock().unwrap(), Some((true, Some(ip))));
    }

    #[test]
    fn hooks_fire_only_when_registered() {
        let hooks = Hooks::new();
        hooks.config_received("1280x720");
        hooks.frame_decoded(Arc::new(vec![]), 0, 0);
        hooks.disconnected();
    }
}
