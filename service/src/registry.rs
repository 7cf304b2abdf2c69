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

//! Registry of established sessions and the broadcaster
//!
//! Every membership change and every enumeration happens under one async
//! mutex, so display names stay unique and a broadcast always sees a
//! consistent member set. Delivery is a non-blocking enqueue onto each
//! member's outbound queue; the lock is never held across a socket write.

use crate::channel::{LineSender, Undeliverable};
use crate::protocol::{ServerLine, joined_line};
use crate::{ChatError, MemberInfo, Result, ServerMetrics, SessionId};
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a broadcast operation
#[derive(Debug, Clone, Default)]
pub struct BroadcastResult {
    /// Number of members the line was offered to
    pub total: usize,
    /// Number of members the line was queued for
    pub succeeded: usize,
    /// Number of members dropped as undeliverable
    pub failed: usize,
    /// Members removed, with the reason
    pub errors: Vec<(SessionId, Undeliverable)>,
}

impl BroadcastResult {
    /// Check if every member received the line
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }

    fn merge(&mut self, other: BroadcastResult) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// An established session as seen by the registry
#[derive(Debug, Clone)]
pub struct Member {
    id: SessionId,
    name: String,
    peer_addr: SocketAddr,
    privileged: bool,
    joined_at: Instant,
    sender: LineSender,
}

impl Member {
    /// Create a member entry
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        peer_addr: SocketAddr,
        privileged: bool,
        sender: LineSender,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            peer_addr,
            privileged,
            joined_at: Instant::now(),
            sender,
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot for reporting
    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            id: self.id,
            name: self.name.clone(),
            peer_addr: self.peer_addr,
            privileged: self.privileged,
            joined_at: self.joined_at,
        }
    }
}

/// The set of established sessions
#[derive(Debug)]
pub struct Registry {
    members: Mutex<HashMap<SessionId, Member>>,
    metrics: Arc<ServerMetrics>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(ServerMetrics::new()))
    }
}

impl Registry {
    /// Create an empty registry
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Register a member.
    ///
    /// The name check and the insert are one step. On success the member
    /// is sent `WELCOME <name>` before anything else, then everyone,
    /// including the new member, sees the join announcement and the
    /// updated user list.
    pub async fn join(&self, member: Member) -> Result<()> {
        let mut members = self.members.lock().await;
        if members.values().any(|m| m.name == member.name) {
            debug!(session_id = %member.id, name = %member.name, "Name taken at registration");
            return Err(ChatError::NameConflict(member.name));
        }

        let welcome = ServerLine::Welcome(member.name.clone()).to_string();
        if let Err(e) = member.sender.deliver(&welcome) {
            debug!(session_id = %member.id, error = %e, "Welcome could not be queued");
        }

        let name = member.name.clone();
        info!(session_id = %member.id, name = %name, peer_addr = %member.peer_addr, "Member joined");
        members.insert(member.id, member);
        gauge!("chatline.members").set(members.len() as f64);

        Self::announce_locked(&mut *members, &self.metrics, &joined_line(&name).to_string());
        Ok(())
    }

    /// Remove a member. Returns true if the member was present.
    pub async fn leave(&self, id: SessionId) -> bool {
        let mut members = self.members.lock().await;
        let removed = members.remove(&id);
        gauge!("chatline.members").set(members.len() as f64);
        match removed {
            Some(member) => {
                info!(session_id = %id, name = %member.name, "Member left");
                true
            }
            None => false,
        }
    }

    /// Queue a line for every member.
    ///
    /// Members whose queue is full or closed are removed in the same
    /// critical section; the rest still receive the line.
    pub async fn broadcast(&self, text: &str) -> BroadcastResult {
        let mut members = self.members.lock().await;
        Self::broadcast_locked(&mut *members, &self.metrics, text)
    }

    /// Broadcast a line followed by the current user list
    pub async fn announce(&self, text: &str) -> BroadcastResult {
        let mut members = self.members.lock().await;
        Self::announce_locked(&mut *members, &self.metrics, text)
    }

    /// Remove the member holding `name`, tell it so and ask its session
    /// to close.
    pub async fn kick(&self, name: &str) -> Option<SessionId> {
        let mut members = self.members.lock().await;
        let id = members.values().find(|m| m.name == name).map(|m| m.id)?;
        let member = members.remove(&id)?;
        gauge!("chatline.members").set(members.len() as f64);

        if let Err(e) = member.sender.deliver(&ServerLine::Kicked.to_string()) {
            debug!(session_id = %id, error = %e, "Kick notice could not be queued");
        }
        member.sender.close();
        info!(session_id = %id, name = %name, "Member kicked");
        Some(id)
    }

    /// Whether a member holds `name`
    pub async fn contains_name(&self, name: &str) -> bool {
        self.members.lock().await.values().any(|m| m.name == name)
    }

    /// Member names in sorted order
    pub async fn names(&self) -> Vec<String> {
        let members = self.members.lock().await;
        Self::sorted_names(&*members)
    }

    /// Snapshots of all members, ordered by name
    pub async fn members(&self) -> Vec<MemberInfo> {
        let members = self.members.lock().await;
        let mut infos: Vec<MemberInfo> = members.values().map(Member::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of members
    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Whether there are no members
    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    fn sorted_names(members: &HashMap<SessionId, Member>) -> Vec<String> {
        let mut names: Vec<String> = members.values().map(|m| m.name.clone()).collect();
        names.sort();
        names
    }

    fn announce_locked(
        members: &mut HashMap<SessionId, Member>,
        metrics: &ServerMetrics,
        text: &str,
    ) -> BroadcastResult {
        let mut result = Self::broadcast_locked(members, metrics, text);
        let roster = ServerLine::UserList(Self::sorted_names(members)).to_string();
        result.merge(Self::broadcast_locked(members, metrics, &roster));
        result
    }

    fn broadcast_locked(
        members: &mut HashMap<SessionId, Member>,
        metrics: &ServerMetrics,
        text: &str,
    ) -> BroadcastResult {
        info!(target: "chatline::broadcast", recipients = members.len(), "{text}");

        let mut result = BroadcastResult {
            total: members.len(),
            ..Default::default()
        };
        for member in members.values() {
            match member.sender.deliver(text) {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    result.failed += 1;
                    result.errors.push((member.id, e));
                }
            }
        }

        for (id, reason) in &result.errors {
            if let Some(member) = members.remove(id) {
                debug!(session_id = %id, name = %member.name, reason = %reason, "Dropping undeliverable member");
            }
        }
        if !result.all_succeeded() {
            warn!(
                failed = result.failed,
                success_rate = result.success_rate(),
                "Broadcast dropped undeliverable members"
            );
            counter!("chatline.broadcast.failures").increment(result.failed as u64);
            gauge!("chatline.members").set(members.len() as f64);
        }

        metrics.line_broadcast(result.failed);
        result
    }
}
