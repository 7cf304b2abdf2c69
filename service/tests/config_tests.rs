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

//! File-backed configuration and audit log tests

mod common;

use chatline_service::{AdminSecret, ChatServer, Ruleset, ServerConfig};
use common::{TestClient, local_config};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_secret_file_trimmed() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "  hunter2  ").unwrap();

    let secret = AdminSecret::resolve(None, Some(file.path())).unwrap();
    assert!(secret.matches("hunter2"));
    assert!(!secret.matches("  hunter2  "));
}

#[test]
fn test_secret_env_wins_over_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "from-file").unwrap();

    let secret = AdminSecret::resolve(Some("from-env".to_string()), Some(file.path())).unwrap();
    assert!(secret.matches("from-env"));

    let secret = AdminSecret::resolve(Some(String::new()), Some(file.path())).unwrap();
    assert!(secret.matches("from-file"));
}

#[test]
fn test_missing_files_degrade() {
    let dir = TempDir::new().unwrap();
    assert!(AdminSecret::resolve(None, Some(&dir.path().join("absent.txt"))).is_none());
    assert!(Ruleset::load(dir.path().join("absent.txt")).is_empty());

    let config = ServerConfig::default()
        .with_admin_secret(AdminSecret::resolve(None, Some(&dir.path().join("absent.txt"))))
        .with_ruleset(Ruleset::load(dir.path().join("absent.txt")));
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn test_consent_written_to_audit_file() {
    let dir = TempDir::new().unwrap();
    let rules_path = dir.path().join("rules.txt");
    let log_path = dir.path().join("rules_accept.log");
    std::fs::write(&rules_path, "# RULES_VERSION=7\nBe kind.\n").unwrap();

    let config = local_config()
        .with_ruleset(Ruleset::load(&rules_path))
        .with_consent_log_path(&log_path);
    let server = ChatServer::new(config).await.unwrap();
    server.start().await.unwrap();

    let mut client = TestClient::connect(server.bind_address()).await;
    client.expect("USERNAME?").await;
    client.send("Ada").await;
    client.skip_until(|l| l == "ACCEPT? (OK/EXIT)").await;
    client.send("OK").await;
    client.expect("WELCOME Ada").await;

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let line = contents.lines().next().unwrap();
    assert!(
        line.ends_with(" user=Ada ip=127.0.0.1 rules_v=7 result=ACCEPT"),
        "unexpected audit line: {line}"
    );

    server.shutdown().await.unwrap();
}
