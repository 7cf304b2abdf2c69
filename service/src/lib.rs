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

//! Chatline relay service
//!
//! A line-oriented TCP chat relay. Clients negotiate a display name, an
//! optional admin key for reserved names, and consent to the server's
//! acceptable-use rules; then every line they send is relayed to all
//! participants.
//!
//! # Architecture
//!
//! ```text
//! ChatServer (accept loop, worker table)
//!     ↓
//! ConnectionWorker (one task per connection)
//!     ↓
//! HandshakeController → CommandRouter → teardown
//!     ↓                      ↓
//! Session (LineReader + writer task)   Registry (members, broadcast)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use chatline_service::{AdminSecret, ChatServer, Ruleset, ServerConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default()
//!         .with_admin_secret(AdminSecret::load(Some(Path::new("admin_secret.txt"))))
//!         .with_ruleset(Ruleset::load("rules.txt"))
//!         .with_consent_log_path("rules_accept.log");
//!
//!     let server = ChatServer::new(config).await?;
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod audit;
mod channel;
mod codec;
mod config;
mod error;
mod handshake;
mod metrics;
pub mod protocol;
mod registry;
mod router;
mod ruleset;
mod secret;
mod server;
mod session;
mod types;
mod worker;

pub use audit::{ConsentEntry, ConsentLog, ConsentOutcome, FileConsentLog, NullConsentLog};
pub use channel::{LineReader, LineSender, ReadOutcome, Undeliverable, WriterConfig, spawn_writer};
pub use codec::{DEFAULT_MAX_LINE_LENGTH, LineCodec};
pub use config::{DEFAULT_BIND_ADDRESS, ServerConfig};
pub use error::{ChatError, Result};
pub use handshake::{HandshakeController, HandshakeOutcome};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use registry::{BroadcastResult, Member, Registry};
pub use router::{CommandRouter, RouterExit};
pub use ruleset::{DEFAULT_RULES_VERSION, Ruleset};
pub use secret::{ADMIN_SECRET_ENV, AdminSecret};
pub use server::ChatServer;
pub use session::Session;
pub use types::{MemberInfo, ServerSnapshot, SessionId, SessionPhase};
pub use worker::{ConnectionWorker, WorkerExit};
