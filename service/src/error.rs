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

//! Error types for the chat relay service

use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat relay error types
#[derive(Debug, Error)]
pub enum ChatError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A received line exceeded the configured maximum length
    #[error("Line exceeds maximum length of {0} bytes")]
    LineTooLong(usize),

    /// The display name is already held by a registered session
    #[error("Name '{0}' is already taken")]
    NameConflict(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// Maximum number of connections reached
    #[error("Maximum connections ({0}) reached")]
    MaxConnectionsReached(usize),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error with a message
    #[error("{0}")]
    Other(String),
}

impl ChatError {
    /// Check if the error came from the transport rather than the peer's
    /// behaviour.
    ///
    /// A broken socket is routine churn; an overlong line is the peer
    /// breaking the protocol.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ChatError::Io(_) | ChatError::Timeout)
    }
}
