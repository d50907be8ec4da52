//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a default so an empty file yields an anonymous,
//! read-only session against the public Twitch endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::nickname::generate_nickname;

pub const DEFAULT_ADDRESS: &str = "irc.chat.twitch.tv";
pub const DEFAULT_PORT: u16 = 6667;

/// Settings for one chat session.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Channel or channels joined after the server greets us.
    #[serde(default)]
    pub channels: Channels,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// OAuth token, with or without the `oauth:` prefix. `None` logs in
    /// anonymously.
    #[serde(default)]
    pub oauth: Option<String>,
    /// Request `twitch.tv/commands` and surface CLEARCHAT, NOTICE, etc.
    #[serde(default)]
    pub capture_commands: bool,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Maximum silence before the connection is considered dead. Twitch
    /// pings roughly every five minutes.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
}

impl ChatConfig {
    pub fn new(channels: impl Into<Channels>, nickname: impl Into<String>, oauth: impl Into<String>) -> Self {
        Self {
            channels: channels.into(),
            nickname: nickname.into(),
            oauth: Some(oauth.into()),
            ..Self::default()
        }
    }

    /// A read-only session that needs no credential.
    pub fn anonymous(channels: impl Into<Channels>) -> Self {
        Self {
            channels: channels.into(),
            ..Self::default()
        }
    }

    pub fn capture_commands(mut self, capture: bool) -> Self {
        self.capture_commands = capture;
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    /// The credential as sent on the wire: `oauth:` exactly once.
    pub fn password(&self) -> Option<String> {
        self.oauth.as_deref().map(|token| {
            let token = token.strip_prefix("oauth:").unwrap_or(token);
            format!("oauth:{}", token)
        })
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            channels: Channels::default(),
            nickname: default_nickname(),
            oauth: None,
            capture_commands: false,
            address: default_address(),
            port: default_port(),
            connect_timeout_secs: None,
            read_timeout_secs: None,
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("channels", &self.channels)
            .field("nickname", &self.nickname)
            .field("oauth", &self.oauth.as_ref().map(|_| "<redacted>"))
            .field("capture_commands", &self.capture_commands)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}

/// A single channel name or an ordered list of them. Leading `#` is
/// optional in either form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Channels {
    One(String),
    Many(Vec<String>),
}

impl Channels {
    /// Channel names in configured order, `#` stripped, duplicates removed.
    pub fn to_vec(&self) -> Vec<String> {
        let names: Vec<&str> = match self {
            Channels::One(name) => vec![name.as_str()],
            Channels::Many(names) => names.iter().map(String::as_str).collect(),
        };
        let mut out: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = crate::irc::commands::normalize_channel(name);
            if !name.is_empty() && !out.iter().any(|c| c == name) {
                out.push(name.to_string());
            }
        }
        out
    }
}

impl Default for Channels {
    fn default() -> Self {
        Channels::Many(Vec::new())
    }
}

impl From<&str> for Channels {
    fn from(name: &str) -> Self {
        Channels::One(name.to_string())
    }
}

impl From<String> for Channels {
    fn from(name: String) -> Self {
        Channels::One(name)
    }
}

impl From<Vec<String>> for Channels {
    fn from(names: Vec<String>) -> Self {
        Channels::Many(names)
    }
}

impl From<&[&str]> for Channels {
    fn from(names: &[&str]) -> Self {
        Channels::Many(names.iter().map(|n| n.to_string()).collect())
    }
}

fn default_nickname() -> String {
    generate_nickname()
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
