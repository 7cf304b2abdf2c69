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

//! A single client connection, from accept until close

use crate::channel::{LineReader, LineSender, ReadOutcome, spawn_writer};
use crate::{LineCodec, Result, ServerConfig, SessionId, SessionPhase};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace};

/// One connected client.
///
/// Owned by its worker for the whole lifetime of the connection. The
/// display name and privileged flag are assigned once, when the session
/// joins the registry.
pub struct Session {
    id: SessionId,
    peer_addr: SocketAddr,
    name: Option<String>,
    privileged: bool,
    phase: Arc<AtomicU8>,
    reader: LineReader,
    sender: LineSender,
    closed: Arc<Notify>,
    writer: JoinHandle<()>,
    write_timeout: Duration,
    created_at: Instant,
}

impl Session {
    /// Build a session over separate read and write halves
    pub fn new<R, W>(
        reader: R,
        writer: W,
        id: SessionId,
        peer_addr: SocketAddr,
        config: &ServerConfig,
    ) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let closed = Arc::new(Notify::new());
        let codec = LineCodec::with_max_length(config.max_line_length);
        let reader = LineReader::new(reader, codec.clone(), id);
        let (sender, writer) =
            spawn_writer(writer, codec, id, &config.writer_config(), closed.clone());

        Self {
            id,
            peer_addr,
            name: None,
            privileged: false,
            phase: Arc::new(AtomicU8::new(SessionPhase::AwaitName.as_u8())),
            reader,
            sender,
            closed,
            writer,
            write_timeout: config.write_timeout,
            created_at: Instant::now(),
        }
    }

    /// Build a session over a single bidirectional stream
    pub fn from_stream<S>(
        stream: S,
        id: SessionId,
        peer_addr: SocketAddr,
        config: &ServerConfig,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer, id, peer_addr, config)
    }

    /// Build a session over an accepted TCP stream
    pub fn from_tcp(stream: TcpStream, id: SessionId, config: &ServerConfig) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer, id, peer_addr, config))
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Registered display name, `None` until the session joins
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the session holds the privileged role
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Time since the connection was accepted
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Current handshake phase
    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move to another phase
    pub fn set_phase(&self, phase: SessionPhase) {
        trace!(session_id = %self.id, phase = %phase, "Phase change");
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    /// Shared phase cell, read by the server's worker table
    pub(crate) fn phase_cell(&self) -> Arc<AtomicU8> {
        self.phase.clone()
    }

    /// Read one line, see [`LineReader::read_line`]
    pub async fn read_line(&mut self, deadline: Option<Duration>) -> Result<ReadOutcome> {
        self.reader.read_line(deadline).await
    }

    /// Queue a line to this client. Returns false once the writer is gone.
    pub async fn send_line(&mut self, line: impl Into<String>) -> bool {
        self.sender.send_line(line).await
    }

    /// A sender feeding this session's outbound queue
    pub fn sender(&self) -> LineSender {
        self.sender.clone()
    }

    /// Notifier fired when the session must shut down
    pub fn closed_notifier(&self) -> Arc<Notify> {
        self.closed.clone()
    }

    /// Record the identity granted at registration
    pub(crate) fn assign_identity(&mut self, name: String, privileged: bool) {
        debug_assert!(self.name.is_none(), "identity assigned twice");
        self.name = Some(name);
        self.privileged = privileged;
    }

    /// Close the connection.
    ///
    /// Queued lines are flushed first, unless the writer is stuck past its
    /// write timeout. Any registry clone of the sender must already be gone.
    pub async fn close(self) {
        let Self {
            id,
            reader,
            sender,
            writer,
            write_timeout,
            phase,
            ..
        } = self;
        phase.store(SessionPhase::Closed.as_u8(), Ordering::Release);
        drop(reader);
        drop(sender);

        let abort = writer.abort_handle();
        if timeout(write_timeout, writer).await.is_err() {
            debug!(session_id = %id, "Writer did not drain in time, aborting");
            abort.abort();
        }
        trace!(session_id = %id, "Session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("name", &self.name)
            .field("privileged", &self.privileged)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (server, client) = duplex(1024);
        let mut session =
            Session::from_stream(server, SessionId::new(7), peer(), &ServerConfig::default());
        assert_eq!(session.phase(), SessionPhase::AwaitName);
        assert!(session.name().is_none());

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();

        assert!(session.send_line("USERNAME?").await);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "USERNAME?");

        client_write.write_all(b"Ada\r\n").await.unwrap();
        assert_eq!(
            session.read_line(None).await.unwrap(),
            ReadOutcome::Line("Ada".to_string())
        );

        session.close().await;
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_flushes_queued_lines() {
        let (server, client) = duplex(1024);
        let session =
            Session::from_stream(server, SessionId::new(8), peer(), &ServerConfig::default());
        let sender = session.sender();
        assert!(sender.deliver("first").is_ok());
        assert!(sender.deliver("second").is_ok());
        drop(sender);
        session.close().await;

        let mut lines = BufReader::new(client).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "first");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "second");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_assignment() {
        let (server, _client) = duplex(64);
        let mut session =
            Session::from_stream(server, SessionId::new(9), peer(), &ServerConfig::default());
        session.assign_identity("Admin".to_string(), true);
        assert_eq!(session.name(), Some("Admin"));
        assert!(session.is_privileged());
        session.close().await;
    }
}
