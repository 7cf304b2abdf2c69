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

//! Acceptable-use ruleset shown during the consent step

use std::path::Path;
use tracing::{info, warn};

/// Version reported when the ruleset file does not declare one
pub const DEFAULT_RULES_VERSION: &str = "1";

const VERSION_MARKER: &str = "RULES_VERSION=";

/// Ordered ruleset lines plus a version tag.
///
/// An empty ruleset disables the consent step: handshakes proceed
/// without asking and are logged as `SKIP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruleset {
    version: String,
    lines: Vec<String>,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::empty()
    }
}

impl Ruleset {
    /// A ruleset with no lines
    pub fn empty() -> Self {
        Self {
            version: DEFAULT_RULES_VERSION.to_string(),
            lines: Vec::new(),
        }
    }

    /// Build a ruleset from explicit parts
    pub fn new(version: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            version: version.into(),
            lines,
        }
    }

    /// Parse ruleset text.
    ///
    /// A first line such as `# RULES_VERSION=3` sets the version and is
    /// not shown to clients.
    pub fn parse(text: &str) -> Self {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let mut version = DEFAULT_RULES_VERSION.to_string();

        if let Some(first) = lines.first() {
            if first.trim_start().starts_with('#') {
                if let Some((_, declared)) = first.split_once(VERSION_MARKER) {
                    let declared = declared.trim();
                    if !declared.is_empty() {
                        version = declared.to_string();
                    }
                    lines.remove(0);
                }
            }
        }

        Self { version, lines }
    }

    /// Load the ruleset file. A missing or unreadable file yields an
    /// empty ruleset and a warning.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(bytes) => {
                let ruleset = Self::parse(&String::from_utf8_lossy(&bytes));
                info!(
                    path = %path.display(),
                    version = %ruleset.version,
                    lines = ruleset.lines.len(),
                    "Loaded ruleset"
                );
                ruleset
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Ruleset file not found; consent step will be skipped");
                Self::empty()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ruleset file unreadable; consent step will be skipped");
                Self::empty()
            }
        }
    }

    /// Version tag recorded in the consent log
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rule lines in display order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether the consent step is skipped
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_with_version_header() {
        let ruleset = Ruleset::parse("# RULES_VERSION=3\nBe kind.\n\nNo spam.\n");
        assert_eq!(ruleset.version(), "3");
        assert_eq!(ruleset.lines(), ["Be kind.", "", "No spam."]);
    }

    #[test]
    fn test_parse_without_header() {
        let ruleset = Ruleset::parse("# a plain comment\nBe kind.");
        assert_eq!(ruleset.version(), DEFAULT_RULES_VERSION);
        assert_eq!(ruleset.lines(), ["# a plain comment", "Be kind."]);
    }

    #[test]
    fn test_parse_blank_version_keeps_default() {
        let ruleset = Ruleset::parse("#RULES_VERSION=   \r\nRule one\r\n");
        assert_eq!(ruleset.version(), DEFAULT_RULES_VERSION);
        assert_eq!(ruleset.lines(), ["Rule one"]);
    }

    #[test]
    fn test_header_only_is_empty() {
        assert!(Ruleset::parse("# RULES_VERSION=9\n").is_empty());
        assert!(Ruleset::parse("").is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ruleset = Ruleset::load(dir.path().join("rules.txt"));
        assert!(ruleset.is_empty());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# RULES_VERSION=2").unwrap();
        writeln!(file, "Be kind.").unwrap();
        let ruleset = Ruleset::load(file.path());
        assert_eq!(ruleset.version(), "2");
        assert_eq!(ruleset.lines(), ["Be kind."]);
    }
}
