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

//! Server-held secret unlocking reserved display names

use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Environment variable that overrides the secret file
pub const ADMIN_SECRET_ENV: &str = "CHATLINE_ADMIN_SECRET";

/// The admin key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminSecret(String);

impl AdminSecret {
    /// Wrap a secret value. Empty values are treated as absent.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    /// Load from [`ADMIN_SECRET_ENV`], else from `file`.
    pub fn load(file: Option<&Path>) -> Option<Self> {
        Self::resolve(std::env::var(ADMIN_SECRET_ENV).ok(), file)
    }

    /// Pick the secret from an environment value or a secret file.
    ///
    /// The environment value wins when non-empty. File contents are
    /// whitespace-trimmed; an empty or unreadable file means no secret.
    pub fn resolve(env_value: Option<String>, file: Option<&Path>) -> Option<Self> {
        if let Some(secret) = env_value.and_then(Self::new) {
            debug!("Admin secret taken from environment");
            return Some(secret);
        }

        let path = file?;
        match std::fs::read(path) {
            Ok(bytes) => {
                let secret = Self::new(String::from_utf8_lossy(&bytes).trim());
                if secret.is_none() {
                    warn!(path = %path.display(), "Admin secret file is empty; reserved names disabled");
                }
                secret
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "No admin secret configured; reserved names disabled");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Admin secret file unreadable; reserved names disabled");
                None
            }
        }
    }

    /// Exact byte-for-byte comparison with a client-supplied key
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes() == candidate.as_bytes()
    }
}

impl fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminSecret(<redacted>)")
    }
}
