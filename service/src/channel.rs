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

//! Line channel: deadline-aware line reads and a queued line writer
//!
//! Reads happen on the owning session's task through [`LineReader`].
//! Writes are funnelled through a bounded queue drained by a dedicated
//! writer task, so a slow or dead peer only ever stalls its own writer.

use crate::{ChatError, LineCodec, Result, SessionId};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, instrument, trace};

type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Result of a single line read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, terminator and trailing `\r` removed
    Line(String),
    /// The peer closed the connection
    Eof,
    /// The deadline elapsed; the connection is still open
    TimedOut,
}

/// Reading half of a line channel
pub struct LineReader {
    inner: FramedRead<BoxedReader, LineCodec>,
    session_id: SessionId,
}

impl LineReader {
    /// Wrap a byte stream
    pub fn new<R>(reader: R, codec: LineCodec, session_id: SessionId) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            inner: FramedRead::new(Box::pin(reader), codec),
            session_id,
        }
    }

    /// Read the next line, waiting at most `deadline` when one is given.
    ///
    /// A timed-out read leaves buffered bytes in place, so the next call
    /// resumes the same line.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn read_line(&mut self, deadline: Option<Duration>) -> Result<ReadOutcome> {
        let next = match deadline {
            Some(deadline) => match timeout(deadline, self.inner.next()).await {
                Ok(next) => next,
                Err(_) => {
                    trace!("Read deadline elapsed");
                    return Ok(ReadOutcome::TimedOut);
                }
            },
            None => self.inner.next().await,
        };

        match next {
            Some(Ok(line)) => {
                counter!("chatline.lines.received").increment(1);
                trace!(length = line.len(), "Line received");
                Ok(ReadOutcome::Line(line))
            }
            Some(Err(e)) => {
                counter!("chatline.errors.receive").increment(1);
                Err(e)
            }
            None => {
                debug!("Peer closed connection");
                Ok(ReadOutcome::Eof)
            }
        }
    }
}

impl std::fmt::Debug for LineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Why a non-blocking delivery was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Undeliverable {
    /// The recipient's queue is full (peer not keeping up)
    #[error("recipient queue full")]
    Full,
    /// The recipient's writer has stopped
    #[error("recipient writer closed")]
    Closed,
}

/// Writer configuration
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Outbound queue capacity in lines
    pub queue_capacity: usize,
    /// Max time for a single line write
    pub write_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Writing half of a line channel.
///
/// Cloned into the registry on join. Every clone feeds the same queue and
/// shares the session's close notifier; the writer task ends once all
/// clones are dropped.
#[derive(Debug, Clone)]
pub struct LineSender {
    tx: mpsc::Sender<String>,
    closed: Arc<Notify>,
}

impl LineSender {
    /// Queue a line, waiting for queue space. Returns false once the
    /// writer has stopped; the failure is otherwise silent.
    pub async fn send_line(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).await.is_ok()
    }

    /// Queue a line without waiting.
    ///
    /// On failure the session's close notifier fires, so the owner tears
    /// the session down.
    pub fn deliver(&self, line: &str) -> std::result::Result<(), Undeliverable> {
        self.tx.try_send(line.to_string()).map_err(|e| {
            self.closed.notify_one();
            match e {
                mpsc::error::TrySendError::Full(_) => Undeliverable::Full,
                mpsc::error::TrySendError::Closed(_) => Undeliverable::Closed,
            }
        })
    }

    /// Ask the owning session to shut down
    pub fn close(&self) {
        self.closed.notify_one();
    }

    /// Whether the writer task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// The close notifier shared with the owning session
    pub fn closed_notifier(&self) -> Arc<Notify> {
        self.closed.clone()
    }
}

/// Spawn the writer task for one session
pub fn spawn_writer<W>(
    writer: W,
    codec: LineCodec,
    session_id: SessionId,
    config: &WriterConfig,
    closed: Arc<Notify>,
) -> (LineSender, JoinHandle<()>)
where
    W: AsyncWrite + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let writer: Pin<Box<dyn AsyncWrite + Send>> = Box::pin(writer);
    let sink = FramedWrite::new(writer, codec);
    let handle = tokio::spawn(write_loop(
        sink,
        rx,
        closed.clone(),
        config.write_timeout,
        session_id,
    ));
    (LineSender { tx, closed }, handle)
}

async fn write_loop(
    mut sink: FramedWrite<Pin<Box<dyn AsyncWrite + Send>>, LineCodec>,
    mut rx: mpsc::Receiver<String>,
    closed: Arc<Notify>,
    write_timeout: Duration,
    session_id: SessionId,
) {
    while let Some(line) = rx.recv().await {
        match timeout(write_timeout, SinkExt::<String>::send(&mut sink, line)).await {
            Ok(Ok(())) => {
                counter!("chatline.lines.sent").increment(1);
            }
            Ok(Err(e)) => {
                counter!("chatline.errors.send").increment(1);
                debug!(session_id = %session_id, error = %e, "Write failed, closing session");
                closed.notify_one();
                return;
            }
            Err(_) => {
                counter!("chatline.errors.send").increment(1);
                debug!(session_id = %session_id, "Write timed out, closing session");
                closed.notify_one();
                return;
            }
        }
    }

    // Every sender is gone: flush and half-close.
    if let Err(e) = timeout(write_timeout, SinkExt::<String>::close(&mut sink))
        .await
        .map_err(|_| ChatError::Timeout)
        .and_then(|r| r)
    {
        trace!(session_id = %session_id, error = %e, "Shutdown of write half failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    fn reader_pair() -> (LineReader, tokio::io::DuplexStream) {
        let (server, client) = duplex(1024);
        (
            LineReader::new(server, LineCodec::new(), SessionId::new(1)),
            client,
        )
    }

    #[tokio::test]
    async fn test_read_line_and_eof() {
        let (mut reader, mut client) = reader_pair();
        client.write_all(b"hello\r\nworld\n").await.unwrap();
        drop(client);

        assert_eq!(
            reader.read_line(None).await.unwrap(),
            ReadOutcome::Line("hello".into())
        );
        assert_eq!(
            reader.read_line(None).await.unwrap(),
            ReadOutcome::Line("world".into())
        );
        assert_eq!(reader.read_line(None).await.unwrap(), ReadOutcome::Eof);
    }

    #[tokio::test]
    async fn test_read_line_deadline_keeps_connection() {
        let (mut reader, mut client) = reader_pair();
        client.write_all(b"par").await.unwrap();

        let outcome = reader
            .read_line(Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::TimedOut);

        client.write_all(b"tial\n").await.unwrap();
        assert_eq!(
            reader.read_line(None).await.unwrap(),
            ReadOutcome::Line("partial".into())
        );
    }

    #[tokio::test]
    async fn test_read_line_too_long() {
        let (server, mut client) = duplex(1024);
        let mut reader = LineReader::new(server, LineCodec::with_max_length(4), SessionId::new(1));
        client.write_all(b"toolong\n").await.unwrap();
        assert!(matches!(
            reader.read_line(None).await,
            Err(ChatError::LineTooLong(4))
        ));
    }

    #[tokio::test]
    async fn test_writer_delivers_in_order_and_closes() {
        let (server, mut client) = duplex(1024);
        let closed = Arc::new(Notify::new());
        let (sender, handle) = spawn_writer(
            server,
            LineCodec::new(),
            SessionId::new(1),
            &WriterConfig::default(),
            closed,
        );

        assert!(sender.send_line("one").await);
        sender.deliver("two").unwrap();
        assert!(sender.send_line(String::from("three")).await);
        drop(sender);
        handle.await.unwrap();

        let mut received = String::new();
        client.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn test_deliver_to_full_queue_fires_close() {
        // The duplex buffer is tiny and nobody reads, so the writer blocks
        // on its first line and the single-slot queue fills up.
        let (server, _client) = duplex(4);
        let closed = Arc::new(Notify::new());
        let config = WriterConfig {
            queue_capacity: 1,
            write_timeout: Duration::from_secs(30),
        };
        let (sender, _handle) =
            spawn_writer(server, LineCodec::new(), SessionId::new(1), &config, closed.clone());

        sender.deliver("a line longer than four bytes").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        sender.deliver("fills the queue").unwrap();
        assert_eq!(sender.deliver("overflow"), Err(Undeliverable::Full));

        timeout(Duration::from_secs(1), closed.notified())
            .await
            .expect("close notifier should have fired");
    }

    #[tokio::test]
    async fn test_write_failure_fires_close() {
        let (server, client) = duplex(64);
        drop(client);
        let closed = Arc::new(Notify::new());
        let (sender, handle) = spawn_writer(
            server,
            LineCodec::new(),
            SessionId::new(1),
            &WriterConfig::default(),
            closed.clone(),
        );

        sender.deliver("nobody is listening").unwrap();
        timeout(Duration::from_secs(1), closed.notified())
            .await
            .expect("close notifier should have fired");
        handle.await.unwrap();
        assert!(sender.is_closed());
        assert_eq!(sender.deliver("late"), Err(Undeliverable::Closed));
    }
}
