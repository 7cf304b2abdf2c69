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

//! Command router: the chat loop of an established session

use crate::channel::ReadOutcome;
use crate::protocol::{Directive, ServerLine, chat_line};
use crate::{Registry, ServerMetrics, Session};
use chrono::Local;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Why the chat loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterExit {
    /// The peer closed the connection or the transport failed
    Disconnected,
    /// The client sent `/quit`
    Quit,
    /// The session was told to close (kick, dead writer, shutdown)
    Closed,
}

/// Relays chat lines and executes directives for established sessions
#[derive(Debug, Clone)]
pub struct CommandRouter {
    registry: Arc<Registry>,
    metrics: Arc<ServerMetrics>,
}

impl CommandRouter {
    /// Create a router over the shared registry
    pub fn new(registry: Arc<Registry>, metrics: Arc<ServerMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Run until the peer leaves, quits, or the session is closed
    #[instrument(skip_all, fields(session_id = %session.id(), name = session.name().unwrap_or_default()))]
    pub async fn run(&self, session: &mut Session) -> RouterExit {
        let Some(name) = session.name().map(str::to_string) else {
            return RouterExit::Closed;
        };
        let privileged = session.is_privileged();
        let closed = session.closed_notifier();

        loop {
            let read = tokio::select! {
                _ = closed.notified() => {
                    debug!("Session close requested");
                    return RouterExit::Closed;
                }
                read = session.read_line(None) => read,
            };

            let line = match read {
                Ok(ReadOutcome::Line(line)) => line,
                Ok(ReadOutcome::Eof) | Ok(ReadOutcome::TimedOut) => {
                    return RouterExit::Disconnected;
                }
                Err(e) if e.is_connection_error() => {
                    debug!(error = %e, "Read failed");
                    return RouterExit::Disconnected;
                }
                Err(e) => {
                    warn!(error = %e, "Protocol violation, dropping session");
                    return RouterExit::Disconnected;
                }
            };

            let Some(directive) = Directive::parse(&line, privileged) else {
                continue;
            };
            self.metrics.line_received();

            match directive {
                Directive::Chat(text) => {
                    self.registry
                        .broadcast(&chat_line(Local::now(), &name, &text).to_string())
                        .await;
                }
                Directive::Clear => {
                    info!("Admin cleared all screens");
                    self.registry.broadcast(&ServerLine::Clear.to_string()).await;
                }
                Directive::Kick(target) => self.kick(session, &target).await,
                Directive::Quit => {
                    debug!("Client quit");
                    return RouterExit::Quit;
                }
            }
        }
    }

    async fn kick(&self, session: &mut Session, target: &str) {
        match self.registry.kick(target).await {
            Some(id) => {
                info!(target_session = %id, target_name = %target, "Admin removed member");
                let notice = ServerLine::Notice(format!("{target} was removed by an admin"));
                self.registry.announce(&notice.to_string()).await;
            }
            None => {
                session
                    .send_line(ServerLine::Error(format!("no such user {target}")))
                    .await;
            }
        }
    }
}
