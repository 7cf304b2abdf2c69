//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Chat server implementation
//!
//! The ChatServer owns the TCP listener and the accept loop. Every
//! accepted connection gets its own [`ConnectionWorker`] task; the server
//! keeps a table of live workers for the connection limit, snapshots and
//! shutdown.

use crate::audit::{ConsentLog, FileConsentLog, NullConsentLog};
use crate::router::CommandRouter;
use crate::{
    ChatError, ConnectionWorker, HandshakeController, Registry, Result, ServerConfig,
    ServerMetrics, ServerSnapshot, Session, SessionId, SessionPhase,
};
use dashmap::DashMap;
use metrics::{counter, gauge};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

/// Poll interval while waiting for workers to drain at shutdown
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A live worker as seen by the server
struct WorkerEntry {
    peer_addr: SocketAddr,
    phase: Arc<AtomicU8>,
    closed: Arc<Notify>,
    abort: OnceLock<AbortHandle>,
}

/// State shared between the server handle and its accept loop
struct Shared {
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    metrics: Arc<ServerMetrics>,
    handshake: Arc<HandshakeController>,
    router: CommandRouter,
    workers: DashMap<SessionId, WorkerEntry>,
    next_id: AtomicU64,
}

impl Shared {
    fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Spawn a worker for an accepted connection
    fn spawn_session(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        if self.workers.len() >= self.config.max_connections {
            let reason = ChatError::MaxConnectionsReached(self.config.max_connections);
            warn!(peer_addr = %peer_addr, error = %reason, "Rejecting connection");
            self.metrics.connection_rejected();
            counter!("chatline.connections.rejected").increment(1);
            return;
        }

        let id = self.next_session_id();
        let session = match Session::from_tcp(stream, id, &self.config) {
            Ok(session) => session,
            Err(e) => {
                debug!(peer_addr = %peer_addr, error = %e, "Failed to set up session");
                self.metrics.connection_rejected();
                return;
            }
        };

        self.workers.insert(
            id,
            WorkerEntry {
                peer_addr,
                phase: session.phase_cell(),
                closed: session.closed_notifier(),
                abort: OnceLock::new(),
            },
        );
        self.metrics.connection_opened();
        counter!("chatline.connections.accepted").increment(1);
        gauge!("chatline.connections.active").set(self.workers.len() as f64);
        info!(session_id = %id, peer_addr = %peer_addr, "Connection accepted");

        let worker = ConnectionWorker::new(
            session,
            self.handshake.clone(),
            self.router.clone(),
            self.registry.clone(),
        );
        let shared = self.clone();
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let exit = worker.run().await;
            debug!(session_id = %id, exit = ?exit, "Worker finished");
            shared.workers.remove(&id);
            shared.metrics.connection_closed(start.elapsed());
            gauge!("chatline.connections.active").set(shared.workers.len() as f64);
        });

        // The worker may already be gone; then there is nothing to abort.
        if let Some(entry) = self.workers.get(&id) {
            let _ = entry.abort.set(handle.abort_handle());
        }
    }
}

/// Chat relay server
///
/// # Example
///
/// ```no_run
/// use chatline_service::{ChatServer, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = ChatServer::new(ServerConfig::default()).await?;
///     server.start().await?;
///
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct ChatServer {
    /// State shared with the accept loop
    shared: Arc<Shared>,
    /// Bound listener
    listener: Arc<TcpListener>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Server start time
    started_at: Instant,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Shutdown notification
    shutdown_notify: Arc<Notify>,
    /// Accept loop task handle
    accept_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChatServer {
    /// Bind a server. Consent records go to the configured log path, or
    /// nowhere if none is set.
    ///
    /// This binds to the configured address but does not start accepting
    /// connections. Call `start()` to begin accepting connections.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let consent_log: Arc<dyn ConsentLog> = match &config.consent_log_path {
            Some(path) => Arc::new(FileConsentLog::new(path.clone())),
            None => Arc::new(NullConsentLog),
        };
        Self::with_consent_log(config, consent_log).await
    }

    /// Bind a server recording consent outcomes to `consent_log`
    pub async fn with_consent_log(
        config: ServerConfig,
        consent_log: Arc<dyn ConsentLog>,
    ) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address).await?;
        let bind_address = listener.local_addr()?;

        let config = Arc::new(config);
        let metrics = Arc::new(ServerMetrics::new());
        let registry = Arc::new(Registry::new(metrics.clone()));
        let handshake = Arc::new(HandshakeController::new(
            config.clone(),
            registry.clone(),
            consent_log,
            metrics.clone(),
        ));
        let router = CommandRouter::new(registry.clone(), metrics.clone());

        info!(
            bind_address = %bind_address,
            reserved = ?config.reserved_names,
            admin_key = config.admin_secret.is_some(),
            rules_version = config.ruleset.version(),
            rules = config.ruleset.lines().len(),
            "Chat server bound"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                registry,
                metrics,
                handshake,
                router,
                workers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
            listener: Arc::new(listener),
            bind_address,
            started_at: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            accept_handle: tokio::sync::Mutex::new(None),
        })
    }

    /// Start accepting connections
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ChatError::Other("Server already running".to_string()));
        }

        info!(bind_address = %self.bind_address, "Starting chat server");
        let handle = self.spawn_accept_loop();
        *self.accept_handle.lock().await = Some(handle);
        Ok(())
    }

    fn spawn_accept_loop(&self) -> JoinHandle<()> {
        let listener = self.listener.clone();
        let shared = self.shared.clone();
        let running = self.running.clone();
        let shutdown_notify = self.shutdown_notify.clone();

        tokio::spawn(async move {
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let accept_result = tokio::select! {
                    result = listener.accept() => result,
                    _ = shutdown_notify.notified() => break,
                };

                match accept_result {
                    Ok((stream, peer_addr)) => shared.spawn_session(stream, peer_addr),
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        shared.metrics.connection_rejected();

                        // Back off on errors to avoid tight loop
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }

            info!("Accept loop terminated");
        })
    }

    /// Shutdown the server gracefully
    ///
    /// Stops accepting, asks every session to close and waits up to the
    /// configured shutdown timeout before aborting the stragglers.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ChatError::ServerNotRunning);
        }

        info!("Shutting down chat server");
        self.shutdown_notify.notify_waiters();

        if let Some(handle) = self.accept_handle.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        for entry in self.shared.workers.iter() {
            entry.closed.notify_one();
        }

        let deadline = Instant::now() + self.shared.config.shutdown_timeout;
        while !self.shared.workers.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        let stragglers = self.shared.workers.len();
        if stragglers > 0 {
            warn!(stragglers, "Aborting sessions that did not close in time");
            for entry in self.shared.workers.iter() {
                if let Some(abort) = entry.abort.get() {
                    abort.abort();
                }
            }
            self.shared.workers.clear();
        }

        info!("Chat server shutdown complete");
        Ok(())
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Number of open connections, handshaking or established
    pub fn connection_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Handshake phase of a live session
    pub fn session_phase(&self, id: SessionId) -> Option<SessionPhase> {
        self.shared
            .workers
            .get(&id)
            .map(|entry| SessionPhase::from_u8(entry.phase.load(Ordering::Acquire)))
    }

    /// Live sessions with their peer address and phase
    pub fn sessions(&self) -> Vec<(SessionId, SocketAddr, SessionPhase)> {
        let mut sessions: Vec<_> = self
            .shared
            .workers
            .iter()
            .map(|entry| {
                (
                    *entry.key(),
                    entry.peer_addr,
                    SessionPhase::from_u8(entry.phase.load(Ordering::Acquire)),
                )
            })
            .collect();
        sessions.sort_by_key(|(id, _, _)| *id);
        sessions
    }

    /// Get a snapshot of the server state
    pub async fn snapshot(&self) -> ServerSnapshot {
        let handshaking = self
            .shared
            .workers
            .iter()
            .filter(|entry| {
                SessionPhase::from_u8(entry.phase.load(Ordering::Acquire)).is_handshake()
            })
            .count();
        ServerSnapshot {
            open_connections: self.connection_count(),
            handshaking,
            members: self.shared.registry.len().await,
            total_connections: self.shared.metrics.total_connections(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
        }
    }

    /// Get the member registry
    pub fn registry(&self) -> Arc<Registry> {
        self.shared.registry.clone()
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.shared.metrics.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for ChatServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatServer")
            .field("bind_address", &self.bind_address)
            .field("running", &self.is_running())
            .field("connection_count", &self.connection_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("ChatServer dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            self.shutdown_notify.notify_waiters();
            for entry in self.shared.workers.iter() {
                entry.closed.notify_one();
            }
        }
    }
}
