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

//! Command line interface

use chatline_service::{AdminSecret, DEFAULT_BIND_ADDRESS, Ruleset, ServerConfig};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Line-oriented TCP chat relay
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Address to listen on
    #[arg(short, long, default_value_t = DEFAULT_BIND_ADDRESS)]
    pub bind: SocketAddr,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = 1000)]
    pub max_connections: usize,

    /// Admin key; overrides the secret file
    #[arg(long, env = "CHATLINE_ADMIN_SECRET", hide_env_values = true)]
    pub admin_secret: Option<String>,

    /// File holding the admin key
    #[arg(long, default_value = "admin_secret.txt")]
    pub secret_file: PathBuf,

    /// Acceptable-use ruleset file
    #[arg(long, default_value = "rules.txt")]
    pub rules: PathBuf,

    /// Consent audit log
    #[arg(long, default_value = "rules_accept.log")]
    pub consent_log: PathBuf,

    /// Names that require the admin key (repeatable)
    #[arg(long = "reserved", default_value = "Admin")]
    pub reserved: Vec<String>,
}

impl Args {
    /// Load the secret and ruleset files and build the server configuration
    pub fn into_config(self) -> ServerConfig {
        let admin_secret =
            AdminSecret::resolve(self.admin_secret, Some(self.secret_file.as_path()));
        ServerConfig::new(self.bind)
            .with_max_connections(self.max_connections)
            .with_reserved_names(self.reserved)
            .with_admin_secret(admin_secret)
            .with_ruleset(Ruleset::load(&self.rules))
            .with_consent_log_path(self.consent_log)
    }
}
