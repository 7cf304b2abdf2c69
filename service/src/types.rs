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

//! Core types for the chat relay

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unique identifier for a session (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

/// Handshake phase of a session (stored as atomic u8 for lock-free snapshots)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    /// Waiting for the client to submit a display name
    AwaitName = 0,
    /// Waiting for the admin key of a reserved name
    AwaitAdminKey = 1,
    /// Waiting for the client to accept the ruleset
    AwaitConsent = 2,
    /// Registered and chatting
    Established = 3,
    /// Handshake refused; connection is being closed
    Denied = 4,
    /// Session torn down
    Closed = 5,
}

impl SessionPhase {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::AwaitName,
            1 => Self::AwaitAdminKey,
            2 => Self::AwaitConsent,
            3 => Self::Established,
            4 => Self::Denied,
            _ => Self::Closed,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the session is still in its handshake
    pub fn is_handshake(self) -> bool {
        matches!(
            self,
            Self::AwaitName | Self::AwaitAdminKey | Self::AwaitConsent
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitName => write!(f, "await-name"),
            Self::AwaitAdminKey => write!(f, "await-admin-key"),
            Self::AwaitConsent => write!(f, "await-consent"),
            Self::Established => write!(f, "established"),
            Self::Denied => write!(f, "denied"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Registered member snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct MemberInfo {
    /// Session ID
    pub id: SessionId,
    /// Display name
    pub name: String,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// Whether the member holds the privileged role
    pub privileged: bool,
    /// When the member was registered
    pub joined_at: Instant,
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Number of open connections (handshaking and established)
    pub open_connections: usize,
    /// Open connections still in their handshake
    pub handshaking: usize,
    /// Number of registered members
    pub members: usize,
    /// Total connections since server start
    pub total_connections: u64,
    /// Server bind address
    pub bind_address: SocketAddr,
    /// Server uptime
    pub uptime: Duration,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChatServer {{ open: {}, handshaking: {}, members: {}, total: {}, addr: {}, uptime: {:?} }}",
            self.open_connections,
            self.handshaking,
            self.members,
            self.total_connections,
            self.bind_address,
            self.uptime
        )
    }
}
