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

//! Handshake controller
//!
//! Drives a fresh [`Session`] from `AwaitName` to `Established` or a
//! refusal:
//!
//! ```text
//! AwaitName ──(reserved)──> AwaitAdminKey ──> AwaitConsent ──> Established
//!     │                                            ^
//!     └────────────(not reserved)──────────────────┘
//! any phase ──> Denied / abandoned
//! ```
//!
//! A rejected admin key or a name lost to a concurrent registration goes
//! back to `AwaitName`. Consent, once given, is not asked again in the
//! same session.

use crate::audit::{ConsentEntry, ConsentLog, ConsentOutcome};
use crate::channel::ReadOutcome;
use crate::protocol::{
    ACCEPT_PROMPT, ADMIN_KEY_PROMPT, ConsentReply, RULES_BEGIN, RULES_END, ServerLine,
    USERNAME_PROMPT, is_valid_name,
};
use crate::registry::Member;
use crate::{ChatError, Registry, Result, ServerConfig, ServerMetrics, Session, SessionPhase};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const INVALID_NAME: &str = "name must be 3-20 characters, try again";
const NAME_TAKEN: &str = "name already taken, choose another";
const NO_ADMIN_KEY: &str = "name is reserved and no admin key is configured";
const KEY_REJECTED: &str = "admin key rejected, name is reserved";
const BAD_ANSWER: &str = "please answer OK or EXIT";
const RULES_REFUSED: &str = "rules were not accepted, closing connection";

/// How a handshake ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The session joined the registry
    Established,
    /// Consent was refused, exhausted or timed out
    Denied(ConsentOutcome),
    /// The peer left or went silent before consent was asked
    Abandoned,
}

enum KeyCheck {
    Granted,
    Rejected,
    Disconnected,
}

/// Runs the handshake state machine for one session at a time
pub struct HandshakeController {
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    consent_log: Arc<dyn ConsentLog>,
    metrics: Arc<ServerMetrics>,
}

impl HandshakeController {
    /// Create a controller sharing the server's registry and consent log
    pub fn new(
        config: Arc<ServerConfig>,
        registry: Arc<Registry>,
        consent_log: Arc<dyn ConsentLog>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            config,
            registry,
            consent_log,
            metrics,
        }
    }

    /// Negotiate name, admin key and consent, then register the session.
    ///
    /// On [`HandshakeOutcome::Established`] the session carries its name
    /// and privileged flag and is a registry member. Any other outcome
    /// leaves it unregistered.
    #[instrument(skip_all, fields(session_id = %session.id(), peer_addr = %session.peer_addr()))]
    pub async fn run(&self, session: &mut Session) -> Result<HandshakeOutcome> {
        let mut consented = false;

        loop {
            session.set_phase(SessionPhase::AwaitName);
            let Some(name) = self.await_name(session).await else {
                return Ok(self.abandon(session));
            };

            let mut privileged = false;
            if self.config.is_reserved(&name) {
                session.set_phase(SessionPhase::AwaitAdminKey);
                match self.await_admin_key(session).await {
                    KeyCheck::Granted => privileged = true,
                    KeyCheck::Rejected => continue,
                    KeyCheck::Disconnected => return Ok(self.abandon(session)),
                }
            }

            if !consented {
                session.set_phase(SessionPhase::AwaitConsent);
                let outcome = self.await_consent(session).await;
                self.consent_log
                    .record(&ConsentEntry::new(
                        name.as_str(),
                        session.peer_addr().ip(),
                        self.config.ruleset.version(),
                        outcome,
                    ))
                    .await;
                if !outcome.is_granted() {
                    return Ok(self.deny(session, outcome).await);
                }
                consented = true;
            }

            let member = Member::new(
                session.id(),
                name.as_str(),
                session.peer_addr(),
                privileged,
                session.sender(),
            );
            match self.registry.join(member).await {
                Ok(()) => {
                    info!(name = %name, privileged, "Handshake complete");
                    session.assign_identity(name, privileged);
                    session.set_phase(SessionPhase::Established);
                    self.metrics.handshake_established();
                    return Ok(HandshakeOutcome::Established);
                }
                Err(ChatError::NameConflict(_)) => {
                    debug!(name = %name, "Lost registration race");
                    session.send_line(ServerLine::Error(NAME_TAKEN.into())).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Prompt until a valid, currently unused name arrives.
    /// `None` means the peer disconnected or timed out.
    async fn await_name(&self, session: &mut Session) -> Option<String> {
        session.send_line(USERNAME_PROMPT).await;
        loop {
            let line = match read(session, self.config.name_timeout).await {
                ReadOutcome::Line(line) => line,
                ReadOutcome::TimedOut => {
                    debug!("Name prompt timed out");
                    return None;
                }
                ReadOutcome::Eof => return None,
            };

            let name = line.trim();
            let problem = if !is_valid_name(name) {
                INVALID_NAME
            } else if self.registry.contains_name(name).await {
                NAME_TAKEN
            } else {
                return Some(name.to_string());
            };
            session.send_line(ServerLine::Error(problem.into())).await;
            session.send_line(USERNAME_PROMPT).await;
        }
    }

    async fn await_admin_key(&self, session: &mut Session) -> KeyCheck {
        let Some(secret) = &self.config.admin_secret else {
            session.send_line(ServerLine::Error(NO_ADMIN_KEY.into())).await;
            return KeyCheck::Rejected;
        };

        session.send_line(ADMIN_KEY_PROMPT).await;
        let granted = match read(session, self.config.admin_key_timeout).await {
            ReadOutcome::Line(key) => secret.matches(&key),
            ReadOutcome::TimedOut => false,
            ReadOutcome::Eof => return KeyCheck::Disconnected,
        };

        if granted {
            KeyCheck::Granted
        } else {
            info!("Admin key rejected");
            session.send_line(ServerLine::Error(KEY_REJECTED.into())).await;
            KeyCheck::Rejected
        }
    }

    async fn await_consent(&self, session: &mut Session) -> ConsentOutcome {
        let ruleset = &self.config.ruleset;
        if ruleset.is_empty() {
            return ConsentOutcome::Skip;
        }

        session.send_line(RULES_BEGIN).await;
        for line in ruleset.lines() {
            session.send_line(line.as_str()).await;
        }
        session.send_line(RULES_END).await;
        session.send_line(ACCEPT_PROMPT).await;

        let attempts = self.config.consent_attempts;
        for attempt in 1..=attempts {
            let answer = match read(session, self.config.consent_timeout).await {
                ReadOutcome::Line(answer) => answer,
                // A peer that hung up never answered.
                ReadOutcome::TimedOut | ReadOutcome::Eof => return ConsentOutcome::Timeout,
            };
            match ConsentReply::parse(&answer) {
                ConsentReply::Accept => return ConsentOutcome::Accept,
                ConsentReply::Refuse => return ConsentOutcome::Deny,
                ConsentReply::Unrecognized if attempt < attempts => {
                    session.send_line(ServerLine::Error(BAD_ANSWER.into())).await;
                    session.send_line(ACCEPT_PROMPT).await;
                }
                ConsentReply::Unrecognized => {}
            }
        }
        ConsentOutcome::Deny
    }

    async fn deny(&self, session: &mut Session, outcome: ConsentOutcome) -> HandshakeOutcome {
        info!(outcome = %outcome, "Consent not given, closing");
        session.set_phase(SessionPhase::Denied);
        session.send_line(ServerLine::Denied(RULES_REFUSED.into())).await;
        self.metrics.handshake_denied();
        HandshakeOutcome::Denied(outcome)
    }

    fn abandon(&self, session: &Session) -> HandshakeOutcome {
        debug!("Handshake abandoned");
        session.set_phase(SessionPhase::Denied);
        self.metrics.handshake_abandoned();
        HandshakeOutcome::Abandoned
    }
}

impl std::fmt::Debug for HandshakeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeController")
            .field("reserved_names", &self.config.reserved_names)
            .field("rules_version", &self.config.ruleset.version())
            .finish()
    }
}

/// Read with a deadline; transport errors count as a disconnect
async fn read(session: &mut Session, deadline: Duration) -> ReadOutcome {
    match session.read_line(Some(deadline)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!(error = %e, "Read failed during handshake");
            ReadOutcome::Eof
        }
    }
}
