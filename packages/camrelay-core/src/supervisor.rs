//! Server supervisor (C6): the composition root for a running set of
//! camera ingest streams.
//!
//! Owns every listener, enforces port exclusivity, drives the network
//! monitor, and orchestrates graceful shutdown.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::{CoreConfig, PublisherKind, StreamConfig};
use crate::error::{CoreError, CoreResult};
use crate::events::{HostCallbacks, HostEvent, Hooks};
use crate::interfaces::{ip_is_present, list_interfaces, resolve_bind_ip};
use crate::protocol_constants::{
    FORCE_DISCONNECT_BATCH_TIMEOUT, LISTENER_CLOSE_TIMEOUT, NETWORK_MONITOR_FAILURE_THRESHOLD,
    NETWORK_MONITOR_POLL_INTERVAL, PORT_IN_USE_MESSAGE, PORT_RELEASE_WAIT,
};
use crate::publisher::{NativePublisher, PassthroughPublisher, Publisher, Quality};
use crate::stream::{handle_connection, force_disconnect, StreamRuntime};

/// One listener's active slot: `None` when idle, the running connection's
/// runtime when occupied.
type ActiveSlot = Arc<DashMap<u16, Arc<StreamRuntime>>>;

/// Owns and drives a set of camera ingest listeners for the lifetime of the
/// process (or until [`Supervisor::stop`] is called).
pub struct Supervisor {
    configs: Vec<StreamConfig>,
    bind_ip: Ipv4Addr,
    publisher_kind: PublisherKind,
    native_library_path: Option<std::path::PathBuf>,
    callbacks: HostCallbacks,
    hooks: Hooks,
    active: ActiveSlot,
    publishers: Arc<DashMap<u32, Arc<dyn Publisher>>>,
    current_quality: SyncMutex<Quality>,
    accept_tasks: SyncMutex<Vec<JoinHandle<()>>>,
    monitor_cancel: CancellationToken,
    monitor_task: SyncMutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Supervisor {
    /// Resolves the bind address (explicit or auto-detected) and binds one
    /// listener per `config.streams` entry.
    pub async fn start(
        config: CoreConfig,
        callbacks: HostCallbacks,
        hooks: Hooks,
    ) -> CoreResult<Arc<Self>> {
        let bind_ip = match config.bind_ip {
            Some(ip) => ip,
            None => {
                let interfaces = list_interfaces().map_err(|e| CoreError::Bind(e.to_string()))?;
                resolve_bind_ip(&interfaces)
            }
        };
        log::info!("supervisor binding to {bind_ip}");

        let supervisor = Arc::new(Supervisor {
            configs: config.streams,
            bind_ip,
            publisher_kind: config.publisher_kind,
            native_library_path: config.native_library_path,
            callbacks,
            hooks,
            active: Arc::new(DashMap::new()),
            publishers: Arc::new(DashMap::new()),
            current_quality: SyncMutex::new(config.initial_quality),
            accept_tasks: SyncMutex::new(Vec::new()),
            monitor_cancel: CancellationToken::new(),
            monitor_task: SyncMutex::new(None),
            stopped: AtomicBool::new(false),
        });

        for stream_config in supervisor.configs.clone() {
            supervisor.clone().spawn_listener(stream_config).await?;
        }

        supervisor.clone().spawn_network_monitor();

        Ok(supervisor)
    }

    async fn spawn_listener(self: Arc<Self>, stream_config: StreamConfig) -> CoreResult<()> {
        let addr = SocketAddr::new(self.bind_ip.into(), stream_config.listen_port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CoreError::Bind(format!("{addr}: {e}")))?;
        log::info!(
            "stream {} listening on {addr} ({})",
            stream_config.stream_id,
            stream_config.display_name
        );

        let accept_self = self.clone();
        let task = tokio::spawn(async move {
            accept_self.accept_loop(listener, stream_config).await;
        });
        self.accept_tasks.lock().push(task);
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, stream_config: StreamConfig) {
        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("accept failed on port {}: {e}", stream_config.listen_port);
                    continue;
                }
            };

            if self.active.contains_key(&stream_config.listen_port) {
                log::info!(
                    "rejecting connection from {peer_addr} on port {}: already in use",
                    stream_config.listen_port
                );
                let mut socket = socket;
                use tokio::io::AsyncWriteExt;
                let _ = socket.write_all(PORT_IN_USE_MESSAGE).await;
                let _ = socket.shutdown().await;
                continue;
            }

            let runtime = StreamRuntime::new(stream_config.clone(), peer_addr);
            self.active
                .insert(stream_config.listen_port, runtime.clone());

            let publisher = match self.make_publisher(&stream_config).await {
                Ok(publisher) => publisher,
                Err(e) => {
                    log::error!("failed to construct publisher for stream {}: {e}", stream_config.stream_id);
                    self.active.remove(&stream_config.listen_port);
                    self.callbacks.emit(HostEvent::Error {
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            self.publishers
                .insert(stream_config.stream_id, publisher.clone());

            let active = self.active.clone();
            let callbacks = self.callbacks.clone();
            let hooks = self.hooks.clone();
            let port = stream_config.listen_port;
            tokio::spawn(async move {
                handle_connection(socket, runtime, publisher, callbacks, hooks).await;
                active.remove(&port);
            });
        }
    }

    async fn make_publisher(&self, stream_config: &StreamConfig) -> CoreResult<Arc<dyn Publisher>> {
        match self.publisher_kind {
            PublisherKind::Passthrough => Ok(Arc::new(PassthroughPublisher)),
            PublisherKind::Native => {
                let path = self.native_library_path.as_ref().ok_or_else(|| {
                    CoreError::Config("publisher_kind=native requires native_library_path".into())
                })?;
                let quality = *self.current_quality.lock();
                let publisher = NativePublisher::new(path, &stream_config.display_name, quality)?;
                Ok(Arc::new(publisher))
            }
        }
    }

    fn spawn_network_monitor(self: Arc<Self>) {
        let cancel = self.monitor_cancel.clone();
        let monitor_self = self.clone();
        let task = tokio::spawn(async move {
            let self_ = monitor_self;
            let mut consecutive_misses = 0u32;
            let mut currently_down = false;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(NETWORK_MONITOR_POLL_INTERVAL) => {}
                }

                if self_.bind_ip.is_loopback() {
                    continue;
                }

                let present = match ip_is_present(self_.bind_ip) {
                    Ok(present) => present,
                    Err(e) => {
                        log::warn!("network monitor failed to enumerate interfaces: {e}");
                        continue;
                    }
                };

                if present {
                    consecutive_misses = 0;
                    if currently_down {
                        currently_down = false;
                        log::info!("bind ip {} is reachable again", self_.bind_ip);
                        self_.callbacks
                            .emit_network_status(true, Some(self_.bind_ip));
                    }
                } else {
                    consecutive_misses += 1;
                    if !currently_down && consecutive_misses >= NETWORK_MONITOR_FAILURE_THRESHOLD {
                        currently_down = true;
                        log::warn!("bind ip {} unreachable, disconnecting active streams", self_.bind_ip);
                        self_.callbacks
                            .emit_network_status(false, Some(self_.bind_ip));
                        self_.force_disconnect_all();
                    }
                }
            }
        });
        *self.monitor_task.lock() = Some(task);
    }

    /// Fires `force_disconnect` for every active connection concurrently,
    /// without waiting for the writer-close deadlines to elapse; callers
    /// that need to know when connections have actually drained should
    /// await `wait_for_active_drain` separately.
    fn force_disconnect_all(&self) {
        for entry in self.active.iter() {
            let runtime = entry.value().clone();
            tokio::spawn(async move { force_disconnect(&runtime).await });
        }
    }

    /// Applies a new quality preset to every active Native publisher
    /// without interrupting any connection, and remembers it for
    /// publishers created by connections accepted afterward.
    pub async fn update_quality(&self, level: Quality) {
        *self.current_quality.lock() = level;
        for entry in self.publishers.iter() {
            if let Err(e) = entry.value().update_quality(level).await {
                log::warn!("failed to update quality for stream {}: {e}", entry.key());
            }
        }
    }

    /// Runs the graceful shutdown sequence described in §4.6: cancel the
    /// monitor, notify the host before closing sockets, force-disconnect
    /// with a bound, close listeners, wait for port release, destroy
    /// publishers, then emit `ServerStopped`.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.monitor_cancel.cancel();
        if let Some(task) = self.monitor_task.lock().take() {
            let _ = task.await;
        }

        for entry in self.active.iter() {
            let runtime = entry.value();
            if !runtime.disconnect_emitted.swap(true, Ordering::SeqCst) {
                self.callbacks.emit(HostEvent::ConnectionChanged {
                    stream_id: runtime.config.stream_id.to_string(),
                    connected: false,
                    info: None,
                });
            }
        }

        let deadline = tokio::time::sleep(FORCE_DISCONNECT_BATCH_TIMEOUT);
        tokio::pin!(deadline);
        self.force_disconnect_all();
        tokio::select! {
            _ = self.wait_for_active_drain() => {}
            _ = &mut deadline => {
                log::warn!("force-disconnect deadline elapsed with handlers still running");
            }
        }

        for task in self.accept_tasks.lock().drain(..) {
            task.abort();
            let _ = timeout(LISTENER_CLOSE_TIMEOUT, task).await;
        }

        tokio::time::sleep(PORT_RELEASE_WAIT).await;

        for entry in self.publishers.iter() {
            entry.value().destroy().await;
        }
        self.publishers.clear();

        self.callbacks.emit(HostEvent::ServerStopped);
    }

    async fn wait_for_active_drain(&self) {
        while !self.active.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    pub fn bind_ip(&self) -> Ipv4Addr {
        self.bind_ip
    }

    pub fn active_stream_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_stream_count_starts_at_zero() {
        let supervisor = Supervisor {
            configs: vec![],
            bind_ip: Ipv4Addr::UNSPECIFIED,
            publisher_kind: PublisherKind::Passthrough,
            native_library_path: None,
            callbacks: HostCallbacks::new(),
            hooks: Hooks::new(),
            active: Arc::new(DashMap::new()),
            publishers: Arc::new(DashMap::new()),
            current_quality: SyncMutex::new(Quality::Medium),
            accept_tasks: SyncMutex::new(Vec::new()),
            monitor_cancel: CancellationToken::new(),
            monitor_task: SyncMutex::new(None),
            stopped: AtomicBool::new(false),
        };
        assert_eq!(supervisor.active_stream_count(), 0);
    }
}
