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

//! Server configuration
//!
//! # Example
//!
//! ```
//! use chatline_service::{AdminSecret, Ruleset, ServerConfig};
//! use std::time::Duration;
//!
//! let config = ServerConfig::default()
//!     .with_max_connections(200)
//!     .with_reserved_names(["Admin", "Root"])
//!     .with_admin_secret(AdminSecret::new("1234"))
//!     .with_ruleset(Ruleset::parse("Be kind."))
//!     .with_consent_timeout(Duration::from_secs(30));
//! assert!(config.validate().is_ok());
//! ```

use crate::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::{AdminSecret, ChatError, Result, Ruleset, WriterConfig};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address: loopback, port 1161
pub const DEFAULT_BIND_ADDRESS: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    1161,
);

/// Server configuration
///
/// All handshake inputs (reserved names, secret, ruleset) are fixed for
/// the lifetime of the server once it is constructed.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections, handshaking or not
    pub max_connections: usize,

    /// Read deadline while waiting for a display name
    pub name_timeout: Duration,

    /// Read deadline while waiting for the admin key
    pub admin_key_timeout: Duration,

    /// Read deadline for each consent answer
    pub consent_timeout: Duration,

    /// Consent answers allowed before the handshake is denied
    pub consent_attempts: usize,

    /// Timeout for a single line write to a client
    pub write_timeout: Duration,

    /// Outbound queue capacity per session, in lines
    ///
    /// A recipient whose queue is full is considered too slow and is
    /// dropped from the chat.
    pub outbound_queue: usize,

    /// Longest accepted input line in bytes
    pub max_line_length: usize,

    /// How long shutdown waits for sessions to close before aborting them
    pub shutdown_timeout: Duration,

    /// Names that require the admin key
    pub reserved_names: BTreeSet<String>,

    /// Admin key; reserved names are unusable without one
    pub admin_secret: Option<AdminSecret>,

    /// Acceptable-use ruleset; empty skips the consent step
    pub ruleset: Ruleset,

    /// Consent audit log path; `None` disables the file log
    pub consent_log_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS,
            max_connections: 1000,
            name_timeout: Duration::from_secs(120),
            admin_key_timeout: Duration::from_secs(60),
            consent_timeout: Duration::from_secs(60),
            consent_attempts: 3,
            write_timeout: Duration::from_secs(10),
            outbound_queue: 256,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            shutdown_timeout: Duration::from_secs(5),
            reserved_names: BTreeSet::from(["Admin".to_string()]),
            admin_secret: None,
            ruleset: Ruleset::empty(),
            consent_log_path: None,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the display-name read deadline
    pub fn with_name_timeout(mut self, timeout: Duration) -> Self {
        self.name_timeout = timeout;
        self
    }

    /// Set the admin-key read deadline
    pub fn with_admin_key_timeout(mut self, timeout: Duration) -> Self {
        self.admin_key_timeout = timeout;
        self
    }

    /// Set the per-answer consent deadline
    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    /// Set the number of consent answers allowed
    pub fn with_consent_attempts(mut self, attempts: usize) -> Self {
        self.consent_attempts = attempts;
        self
    }

    /// Set the write timeout duration
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the per-session outbound queue capacity
    pub fn with_outbound_queue(mut self, lines: usize) -> Self {
        self.outbound_queue = lines;
        self
    }

    /// Set the maximum input line length
    pub fn with_max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    /// Set the shutdown timeout duration
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Replace the reserved name set
    pub fn with_reserved_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set or clear the admin key
    pub fn with_admin_secret(mut self, secret: Option<AdminSecret>) -> Self {
        self.admin_secret = secret;
        self
    }

    /// Set the ruleset
    pub fn with_ruleset(mut self, ruleset: Ruleset) -> Self {
        self.ruleset = ruleset;
        self
    }

    /// Set the consent audit log path
    pub fn with_consent_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.consent_log_path = Some(path.into());
        self
    }

    /// Whether `name` requires the admin key
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved_names.contains(name)
    }

    /// Writer settings derived from this configuration
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            queue_capacity: self.outbound_queue,
            write_timeout: self.write_timeout,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(ChatError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        for (name, timeout) in [
            ("name_timeout", self.name_timeout),
            ("admin_key_timeout", self.admin_key_timeout),
            ("consent_timeout", self.consent_timeout),
            ("write_timeout", self.write_timeout),
            ("shutdown_timeout", self.shutdown_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ChatError::Config(format!("{name} must be greater than 0")));
            }
        }

        if self.consent_attempts == 0 {
            return Err(ChatError::Config(
                "consent_attempts must be greater than 0".to_string(),
            ));
        }

        if self.outbound_queue == 0 {
            return Err(ChatError::Config(
                "outbound_queue must be greater than 0".to_string(),
            ));
        }

        if self.max_line_length == 0 {
            return Err(ChatError::Config(
                "max_line_length must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
