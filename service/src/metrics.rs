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

//! Lock-free metrics for the chat relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Use the `snapshot()` method to get a view of all
/// metrics at a point in time.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    total_connections: AtomicU64,
    open_connections: AtomicU64,
    rejected_connections: AtomicU64,

    // Handshake outcomes
    handshakes_established: AtomicU64,
    handshakes_denied: AtomicU64,
    handshakes_abandoned: AtomicU64,

    // Relay traffic
    lines_received: AtomicU64,
    lines_broadcast: AtomicU64,
    delivery_failures: AtomicU64,

    // Timing (stored as nanoseconds)
    total_connection_duration_ns: AtomicU64,
    closed_connections: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            open_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            handshakes_established: AtomicU64::new(0),
            handshakes_denied: AtomicU64::new(0),
            handshakes_abandoned: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            lines_broadcast: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            closed_connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record a new connection being accepted
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.open_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection being closed
    pub fn connection_closed(&self, duration: Duration) {
        self.open_connections.fetch_sub(1, Ordering::Relaxed);
        self.closed_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a connection refused at accept time
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current number of open connections
    pub fn open_connections(&self) -> u64 {
        self.open_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    // Handshake tracking

    /// Record a session reaching ESTABLISHED
    pub fn handshake_established(&self) {
        self.handshakes_established.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handshake ending in an explicit denial
    pub fn handshake_denied(&self) {
        self.handshakes_denied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handshake abandoned by disconnect or name timeout
    pub fn handshake_abandoned(&self) {
        self.handshakes_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    // Relay traffic

    /// Record a line read from an established session
    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broadcast fan-out and the number of recipients that failed
    pub fn line_broadcast(&self, failed: usize) {
        self.lines_broadcast.fetch_add(1, Ordering::Relaxed);
        self.delivery_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Values are read individually, so a snapshot taken under load may
    /// mix counts from slightly different instants.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            open_connections: self.open_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            handshakes_established: self.handshakes_established.load(Ordering::Relaxed),
            handshakes_denied: self.handshakes_denied.load(Ordering::Relaxed),
            handshakes_abandoned: self.handshakes_abandoned.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_broadcast: self.lines_broadcast.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed_connections.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since server start
    pub total_connections: u64,
    /// Currently open connections
    pub open_connections: u64,
    /// Connections refused because of the connection limit
    pub rejected_connections: u64,
    /// Sessions that completed the handshake
    pub handshakes_established: u64,
    /// Handshakes ending in DENIED
    pub handshakes_denied: u64,
    /// Handshakes abandoned by the client
    pub handshakes_abandoned: u64,
    /// Lines read from established sessions
    pub lines_received: u64,
    /// Lines fanned out by the broadcaster
    pub lines_broadcast: u64,
    /// Per-recipient delivery failures
    pub delivery_failures: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average duration of closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Broadcast lines per second since start
    pub fn broadcasts_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.lines_broadcast as f64 / self.uptime.as_secs_f64()
    }

    /// Fraction of finished handshakes that reached ESTABLISHED
    pub fn acceptance_rate(&self) -> f64 {
        let finished =
            self.handshakes_established + self.handshakes_denied + self.handshakes_abandoned;
        if finished == 0 {
            return 0.0;
        }
        self.handshakes_established as f64 / finished as f64
    }
}
