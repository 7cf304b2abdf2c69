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

//! Wire vocabulary of the chat protocol
//!
//! Every line the server emits is a [`ServerLine`]. Control lines use a
//! fixed set of prefixes; chat and announcement lines always start with
//! `[` or `* ` so user text can never be mistaken for a control line.
//! Lines received after the handshake are parsed into a [`Directive`],
//! and consent answers into a [`ConsentReply`].

use chrono::{DateTime, Local};
use std::fmt;

/// Shortest accepted display name, in characters
pub const MIN_NAME_LENGTH: usize = 3;
/// Longest accepted display name, in characters
pub const MAX_NAME_LENGTH: usize = 20;

pub const USERNAME_PROMPT: &str = "USERNAME?";
pub const ADMIN_KEY_PROMPT: &str = "ADMINKEY?";
pub const ACCEPT_PROMPT: &str = "ACCEPT? (OK/EXIT)";
pub const RULES_BEGIN: &str = "========== RULES ==========";
pub const RULES_END: &str = "===========================";
pub const CTRL_CLEAR: &str = "CTRL:CLEAR";
pub const CTRL_KICKED: &str = "CTRL:KICKED";

const WELCOME_PREFIX: &str = "WELCOME ";
const ERROR_PREFIX: &str = "ERROR: ";
const DENIED_PREFIX: &str = "DENIED: ";
const USERLIST_PREFIX: &str = "USERLIST:";
const NOTICE_PREFIX: &str = "NOTICE:";

/// Line prefixes consumed by richer clients for extensions this server
/// does not implement. The server never starts a line with one of them.
pub const RESERVED_EXTENSION_PREFIXES: &[&str] = &["FILE ", "FILEURL ", "[FILE] ", "TKM:"];

/// Client directive that clears the screen of every participant
pub const CLEAR_DIRECTIVE: &str = "/clear";
/// Client directive that removes a participant
pub const KICK_DIRECTIVE: &str = "/kick";
/// Client directive that ends the session
pub const QUIT_DIRECTIVE: &str = "/quit";

/// A line sent from server to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Ask for a display name
    UsernamePrompt,
    /// Ask for the admin key of a reserved name
    AdminKeyPrompt,
    /// Opening delimiter of the ruleset
    RulesBegin,
    /// Closing delimiter of the ruleset
    RulesEnd,
    /// Ask for consent to the ruleset
    AcceptPrompt,
    /// Handshake completed under the given name
    Welcome(String),
    /// Recoverable problem, the server re-prompts
    Error(String),
    /// Terminal refusal, the server closes the connection
    Denied(String),
    /// Admin asked every client to clear its screen
    Clear,
    /// The receiving client was removed by an admin
    Kicked,
    /// Current member names
    UserList(Vec<String>),
    /// Server notice
    Notice(String),
    /// Anything else: chat, announcements, rule text
    Text(String),
}

impl ServerLine {
    /// Classify a received line. Unrecognised lines become [`ServerLine::Text`].
    pub fn parse(line: &str) -> ServerLine {
        match line {
            USERNAME_PROMPT => return ServerLine::UsernamePrompt,
            ADMIN_KEY_PROMPT => return ServerLine::AdminKeyPrompt,
            RULES_BEGIN => return ServerLine::RulesBegin,
            RULES_END => return ServerLine::RulesEnd,
            ACCEPT_PROMPT => return ServerLine::AcceptPrompt,
            CTRL_CLEAR => return ServerLine::Clear,
            CTRL_KICKED => return ServerLine::Kicked,
            _ => {}
        }
        if let Some(name) = line.strip_prefix(WELCOME_PREFIX) {
            ServerLine::Welcome(name.to_string())
        } else if let Some(text) = line.strip_prefix(ERROR_PREFIX) {
            ServerLine::Error(text.to_string())
        } else if let Some(text) = line.strip_prefix(DENIED_PREFIX) {
            ServerLine::Denied(text.to_string())
        } else if let Some(list) = line.strip_prefix(USERLIST_PREFIX) {
            ServerLine::UserList(
                list.split(',')
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        } else if let Some(text) = line.strip_prefix(NOTICE_PREFIX) {
            ServerLine::Notice(text.to_string())
        } else {
            ServerLine::Text(line.to_string())
        }
    }

    /// Whether this is a control line rather than displayable text
    pub fn is_control(&self) -> bool {
        !matches!(self, ServerLine::Text(_))
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerLine::UsernamePrompt => f.write_str(USERNAME_PROMPT),
            ServerLine::AdminKeyPrompt => f.write_str(ADMIN_KEY_PROMPT),
            ServerLine::RulesBegin => f.write_str(RULES_BEGIN),
            ServerLine::RulesEnd => f.write_str(RULES_END),
            ServerLine::AcceptPrompt => f.write_str(ACCEPT_PROMPT),
            ServerLine::Welcome(name) => write!(f, "{WELCOME_PREFIX}{name}"),
            ServerLine::Error(text) => write!(f, "{ERROR_PREFIX}{text}"),
            ServerLine::Denied(text) => write!(f, "{DENIED_PREFIX}{text}"),
            ServerLine::Clear => f.write_str(CTRL_CLEAR),
            ServerLine::Kicked => f.write_str(CTRL_KICKED),
            ServerLine::UserList(names) => write!(f, "{USERLIST_PREFIX}{}", names.join(",")),
            ServerLine::Notice(text) => write!(f, "{NOTICE_PREFIX}{text}"),
            ServerLine::Text(text) => f.write_str(text),
        }
    }
}

impl From<ServerLine> for String {
    fn from(line: ServerLine) -> Self {
        line.to_string()
    }
}

/// Format a chat line: `[HH:MM:SS] name: text`
pub fn chat_line(at: DateTime<Local>, name: &str, text: &str) -> ServerLine {
    ServerLine::Text(format!("[{}] {}: {}", at.format("%H:%M:%S"), name, text))
}

/// Announcement broadcast when a member joins
pub fn joined_line(name: &str) -> ServerLine {
    ServerLine::Text(format!("* {name} joined the chat"))
}

/// Announcement broadcast when a member leaves
pub fn left_line(name: &str) -> ServerLine {
    ServerLine::Text(format!("* {name} left the chat"))
}

/// Check a submitted display name: 3 to 20 characters, no line breaks.
pub fn is_valid_name(name: &str) -> bool {
    let length = name.chars().count();
    (MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&length) && !name.contains(['\r', '\n'])
}

/// A line received from an established session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Ordinary chat text
    Chat(String),
    /// Clear every participant's screen (privileged)
    Clear,
    /// Remove the named participant (privileged)
    Kick(String),
    /// End this session
    Quit,
}

impl Directive {
    /// Parse an input line. Only an empty line yields `None`.
    ///
    /// Directives are matched on the trimmed line; chat keeps the line as
    /// sent, whitespace included. Privileged directives sent by an
    /// unprivileged session, and any unknown `/word`, are chat text.
    pub fn parse(line: &str, privileged: bool) -> Option<Directive> {
        if line.is_empty() {
            return None;
        }
        let text = line.trim();
        if text == QUIT_DIRECTIVE {
            return Some(Directive::Quit);
        }
        if privileged {
            if text == CLEAR_DIRECTIVE {
                return Some(Directive::Clear);
            }
            if let Some(rest) = text.strip_prefix(KICK_DIRECTIVE) {
                let target = rest.trim();
                if rest.starts_with(char::is_whitespace) && !target.is_empty() {
                    return Some(Directive::Kick(target.to_string()));
                }
            }
        }
        Some(Directive::Chat(line.to_string()))
    }
}

/// A reply to the consent prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentReply {
    /// `OK`, `KABUL` or `EVET`
    Accept,
    /// `EXIT`, `HAYIR` or `NO`
    Refuse,
    /// Anything else
    Unrecognized,
}

impl ConsentReply {
    /// Classify a consent answer, ignoring case and surrounding whitespace
    pub fn parse(answer: &str) -> ConsentReply {
        match answer.trim().to_uppercase().as_str() {
            "OK" | "KABUL" | "EVET" => ConsentReply::Accept,
            "EXIT" | "HAYIR" | "NO" => ConsentReply::Refuse,
            _ => ConsentReply::Unrecognized,
        }
    }
}
