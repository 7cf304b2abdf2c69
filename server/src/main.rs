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

//! Chatline relay server

mod cli;

use chatline_service::ChatServer;
use clap::Parser;
use cli::Args;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config();
    let server = ChatServer::new(config).await?;
    server.start().await?;
    info!(bind_address = %server.bind_address(), "Chat relay listening, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");

    let snapshot = server.snapshot().await;
    let metrics = server.metrics().snapshot();
    server.shutdown().await?;
    info!(
        %snapshot,
        handshakes = metrics.handshakes_established,
        acceptance_rate = metrics.acceptance_rate(),
        broadcasts_per_sec = metrics.broadcasts_per_sec(),
        delivery_failures = metrics.delivery_failures,
        "Server stopped"
    );

    Ok(())
}
