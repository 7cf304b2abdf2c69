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

//! Connection worker implementation
//!
//! The ConnectionWorker owns a single session for its whole lifetime:
//! - Handshake
//! - Chat loop
//! - Teardown, run exactly once

use crate::protocol::left_line;
use crate::router::{CommandRouter, RouterExit};
use crate::{HandshakeController, HandshakeOutcome, Registry, Session, SessionId};
use std::sync::Arc;
use tracing::{debug, info};

/// How a worker finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The handshake did not complete; the session was never registered
    Unregistered(HandshakeOutcome),
    /// The registered session ended
    Left(RouterExit),
    /// The handshake failed internally
    Failed,
    /// The session was closed before the handshake finished
    Interrupted,
}

/// Connection worker that manages a single session's lifecycle
pub struct ConnectionWorker {
    session: Session,
    handshake: Arc<HandshakeController>,
    router: CommandRouter,
    registry: Arc<Registry>,
}

impl ConnectionWorker {
    /// Create a new connection worker
    pub fn new(
        session: Session,
        handshake: Arc<HandshakeController>,
        router: CommandRouter,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            session,
            handshake,
            router,
            registry,
        }
    }

    /// Session driven by this worker
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    /// Run the worker until the session is closed
    pub async fn run(self) -> WorkerExit {
        let Self {
            mut session,
            handshake,
            router,
            registry,
        } = self;
        let closed = session.closed_notifier();

        let outcome = tokio::select! {
            outcome = handshake.run(&mut session) => Some(outcome),
            _ = closed.notified() => None,
        };
        let Some(outcome) = outcome else {
            debug!(session_id = %session.id(), "Closed during handshake");
            session.close().await;
            return WorkerExit::Interrupted;
        };

        match outcome {
            Ok(HandshakeOutcome::Established) => {
                let exit = router.run(&mut session).await;
                Self::teardown(&registry, session, exit).await;
                WorkerExit::Left(exit)
            }
            Ok(outcome) => {
                debug!(
                    session_id = %session.id(),
                    outcome = ?outcome,
                    connected_for = ?session.age(),
                    "Handshake ended without registration"
                );
                session.close().await;
                WorkerExit::Unregistered(outcome)
            }
            Err(e) => {
                debug!(session_id = %session.id(), error = %e, "Handshake failed");
                session.close().await;
                WorkerExit::Failed
            }
        }
    }

    /// Deregister, announce the departure and close the connection.
    /// Consumes the session, so it cannot run twice.
    async fn teardown(registry: &Registry, session: Session, exit: RouterExit) {
        let id = session.id();
        let name = session.name().unwrap_or_default().to_string();
        let was_member = registry.leave(id).await;
        info!(
            session_id = %id,
            name = %name,
            reason = ?exit,
            was_member,
            connected_for = ?session.age(),
            "Session ended"
        );
        registry.announce(&left_line(&name).to_string()).await;
        session.close().await;
    }
}

impl std::fmt::Debug for ConnectionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullConsentLog;
    use crate::{ServerConfig, ServerMetrics};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    fn worker_for(
        stream: tokio::io::DuplexStream,
        id: u64,
        registry: Arc<Registry>,
        metrics: Arc<ServerMetrics>,
    ) -> ConnectionWorker {
        let config = Arc::new(ServerConfig::default());
        let session = Session::from_stream(
            stream,
            SessionId::new(id),
            "127.0.0.1:6000".parse().unwrap(),
            &config,
        );
        let handshake = Arc::new(HandshakeController::new(
            config,
            registry.clone(),
            Arc::new(NullConsentLog),
            metrics.clone(),
        ));
        ConnectionWorker::new(
            session,
            handshake,
            CommandRouter::new(registry.clone(), metrics),
            registry,
        )
    }

    #[tokio::test]
    async fn test_quit_tears_down_once() {
        let metrics = Arc::new(ServerMetrics::new());
        let registry = Arc::new(Registry::new(metrics.clone()));
        let (server, client) = duplex(4096);
        let worker = worker_for(server, 1, registry.clone(), metrics);

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"Ada\nhello\n/quit\n").await.unwrap();

        let exit = worker.run().await;
        assert_eq!(exit, WorkerExit::Left(RouterExit::Quit));
        assert!(registry.is_empty().await);

        let mut lines = BufReader::new(client_read).lines();
        let mut seen = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            seen.push(line);
        }
        assert_eq!(seen[0], "USERNAME?");
        assert_eq!(seen[1], "WELCOME Ada");
        assert!(seen.iter().any(|l| l.ends_with("] Ada: hello")));
        assert!(!seen.iter().any(|l| l == "* Ada left the chat"));
    }

    #[tokio::test]
    async fn test_abandoned_handshake_never_registers() {
        let metrics = Arc::new(ServerMetrics::new());
        let registry = Arc::new(Registry::new(metrics.clone()));
        let (server, client) = duplex(4096);
        let worker = worker_for(server, 2, registry.clone(), metrics.clone());
        drop(client);

        let exit = worker.run().await;
        assert_eq!(exit, WorkerExit::Unregistered(HandshakeOutcome::Abandoned));
        assert!(registry.is_empty().await);
        assert_eq!(metrics.snapshot().handshakes_abandoned, 1);
    }
}
