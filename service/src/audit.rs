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

//! Append-only consent audit log
//!
//! Every handshake that reaches the consent step leaves exactly one
//! entry. Writing is best-effort: a failure is logged as a warning and
//! never affects the handshake.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Outcome of the consent step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsentOutcome {
    /// Client accepted the ruleset
    Accept,
    /// Client refused, or ran out of attempts
    Deny,
    /// Client did not answer in time
    Timeout,
    /// No ruleset configured; consent not asked
    Skip,
}

impl ConsentOutcome {
    /// Whether the handshake may proceed
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Accept | Self::Skip)
    }

    /// Log token
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Deny => "DENY",
            Self::Timeout => "TIMEOUT",
            Self::Skip => "SKIP",
        }
    }
}

impl fmt::Display for ConsentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentEntry {
    /// When the outcome was decided
    pub timestamp: DateTime<Local>,
    /// Display name the client chose
    pub name: String,
    /// Client IP
    pub peer_ip: IpAddr,
    /// Version of the ruleset shown
    pub rules_version: String,
    /// Outcome
    pub outcome: ConsentOutcome,
}

impl ConsentEntry {
    /// Create an entry stamped with the current local time
    pub fn new(
        name: impl Into<String>,
        peer_ip: IpAddr,
        rules_version: impl Into<String>,
        outcome: ConsentOutcome,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            name: name.into(),
            peer_ip,
            rules_version: rules_version.into(),
            outcome,
        }
    }
}

impl fmt::Display for ConsentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} user={} ip={} rules_v={} result={}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.name,
            self.peer_ip,
            self.rules_version,
            self.outcome
        )
    }
}

/// Destination for consent records
#[async_trait]
pub trait ConsentLog: Send + Sync + 'static {
    /// Record an entry. Implementations swallow their own failures.
    async fn record(&self, entry: &ConsentEntry);
}

/// Consent log that discards entries
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsentLog;

#[async_trait]
impl ConsentLog for NullConsentLog {
    async fn record(&self, entry: &ConsentEntry) {
        debug!(entry = %entry, "Consent outcome (not persisted)");
    }
}

/// Consent log appending one line per entry to a file
#[derive(Debug)]
pub struct FileConsentLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConsentLog {
    /// Log to `path`, creating it on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl ConsentLog for FileConsentLog {
    async fn record(&self, entry: &ConsentEntry) {
        let line = format!("{entry}\n");
        if let Err(e) = self.append(&line).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to write consent log entry"
            );
        }
    }
}
