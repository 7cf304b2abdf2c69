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

//! Shared helpers for the chatline-service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chatline_service::{ChatServer, ConsentEntry, ConsentLog, ServerConfig};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// Upper bound for any single expected line
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration bound to an ephemeral loopback port
pub fn local_config() -> ServerConfig {
    ServerConfig::new("127.0.0.1:0".parse().unwrap())
}

/// Consent log keeping entries in memory
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<ConsentEntry>>,
}

impl RecordingLog {
    pub fn entries(&self) -> Vec<ConsentEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsentLog for RecordingLog {
    async fn record(&self, entry: &ConsentEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Start a server with a recording consent log
pub async fn start_server(config: ServerConfig) -> (ChatServer, Arc<RecordingLog>) {
    let log = Arc::new(RecordingLog::default());
    let server = ChatServer::with_consent_log(config, log.clone())
        .await
        .unwrap();
    server.start().await.unwrap();
    (server, log)
}

/// A line-oriented TCP client
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Connect and complete the handshake on a server without rules
    pub async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.expect("USERNAME?").await;
        client.send(name).await;
        client.expect(&format!("WELCOME {name}")).await;
        client.expect(&format!("* {name} joined the chat")).await;
        client.skip_until(|l| l.starts_with("USERLIST:")).await;
        client
    }

    /// Connect as a reserved name using the admin key
    pub async fn join_admin(addr: SocketAddr, name: &str, key: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.expect("USERNAME?").await;
        client.send(name).await;
        client.expect("ADMINKEY?").await;
        client.send(key).await;
        client.expect(&format!("WELCOME {name}")).await;
        client.expect(&format!("* {name} joined the chat")).await;
        client.skip_until(|l| l.starts_with("USERLIST:")).await;
        client
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Next line, `None` once the server closed the connection
    pub async fn recv(&mut self) -> Option<String> {
        match timeout(RECV_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(line)) => line,
            Ok(Err(_)) => None,
            Err(_) => panic!("timed out waiting for a line"),
        }
    }

    pub async fn expect(&mut self, want: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(want));
    }

    /// Skip lines until one matches, returning it
    pub async fn skip_until<F>(&mut self, pred: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        loop {
            match self.recv().await {
                Some(line) if pred(&line) => return line,
                Some(_) => continue,
                None => panic!("connection closed before expected line"),
            }
        }
    }

    /// Read until the server closes the connection
    pub async fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.recv().await {
            lines.push(line);
        }
        lines
    }
}
