//! Parsed chat events.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::helix::{User, UserLookup};

/// IRCv3 tags of one line, values kept exactly as sent.
pub type Tags = HashMap<String, String>;

/// One parsed line.
#[derive(Debug, Clone)]
pub enum Message {
    Chat(ChatMessage),
    Command(CommandMessage),
}

impl Message {
    pub fn channel(&self) -> Option<&str> {
        match self {
            Message::Chat(chat) => Some(chat.channel.as_str()),
            Message::Command(cmd) => cmd.channel.as_deref(),
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Message::Chat(chat) => &chat.tags,
            Message::Command(cmd) => &cmd.tags,
        }
    }

    /// The line this message was parsed from.
    pub fn raw(&self) -> &str {
        match self {
            Message::Chat(chat) => &chat.raw,
            Message::Command(cmd) => &cmd.raw,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatMessage> {
        match self {
            Message::Chat(chat) => Some(chat),
            Message::Command(_) => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandMessage> {
        match self {
            Message::Command(cmd) => Some(cmd),
            Message::Chat(_) => None,
        }
    }
}

/// A `PRIVMSG` sent to a channel.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Channel name without `#`.
    pub channel: String,
    /// Login of the sender, taken from the line's prefix.
    pub sender: String,
    pub text: String,
    pub tags: Tags,
    pub raw: String,
    pub(crate) lookup: Option<LookupHandle>,
}

impl ChatMessage {
    /// Resolve the sender's profile through the session's lookup, if any.
    ///
    /// Lookup failures are logged and reported as `None`.
    pub fn user(&self) -> Option<User> {
        let lookup = self.lookup.as_ref()?;
        match lookup.0.lookup_user(&self.sender) {
            Ok(user) => user,
            Err(e) => {
                warn!("User lookup for {} failed: {:#}", self.sender, e);
                None
            }
        }
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// `display-name`, falling back to the login when unset or empty.
    pub fn display_name(&self) -> &str {
        match self.tag("display-name") {
            Some(name) if !name.is_empty() => name,
            _ => self.sender.as_str(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.tag("user-id")
    }

    pub fn room_id(&self) -> Option<&str> {
        self.tag("room-id")
    }

    pub fn message_id(&self) -> Option<&str> {
        self.tag("id")
    }

    /// Parsed `badges` tag, e.g. `broadcaster/1,subscriber/12`.
    pub fn badges(&self) -> Vec<(&str, &str)> {
        self.tag("badges")
            .unwrap_or_default()
            .split(',')
            .filter(|b| !b.is_empty())
            .map(|b| b.split_once('/').unwrap_or((b, "")))
            .collect()
    }

    pub fn bits(&self) -> Option<u64> {
        self.tag("bits")?.parse().ok()
    }

    /// Body of a `/me` message.
    pub fn action_text(&self) -> Option<&str> {
        self.text
            .strip_prefix("\x01ACTION ")
            .map(|rest| rest.strip_suffix('\x01').unwrap_or(rest))
    }
}

/// A Twitch protocol command surfaced when commands are captured.
#[derive(Debug, Clone)]
pub struct CommandMessage {
    pub kind: CommandKind,
    /// Channel name without `#`. `None` for commands that carry no
    /// channel, such as `RECONNECT`.
    pub channel: Option<String>,
    pub payload: Option<String>,
    pub tags: Tags,
    pub raw: String,
}

/// How a command's payload is taken from its arguments after the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    None,
    /// The first argument only.
    Token,
    /// All remaining arguments joined by single spaces.
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ClearChat,
    ClearMsg,
    HostTarget,
    Notice,
    Reconnect,
    RoomState,
    UserNotice,
    UserState,
}

impl CommandKind {
    pub const ALL: [CommandKind; 8] = [
        CommandKind::ClearChat,
        CommandKind::ClearMsg,
        CommandKind::HostTarget,
        CommandKind::Notice,
        CommandKind::Reconnect,
        CommandKind::RoomState,
        CommandKind::UserNotice,
        CommandKind::UserState,
    ];

    /// Exact, case-sensitive keyword match. Unknown keywords yield `None`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "CLEARCHAT" => Some(CommandKind::ClearChat),
            "CLEARMSG" => Some(CommandKind::ClearMsg),
            "HOSTTARGET" => Some(CommandKind::HostTarget),
            "NOTICE" => Some(CommandKind::Notice),
            "RECONNECT" => Some(CommandKind::Reconnect),
            "ROOMSTATE" => Some(CommandKind::RoomState),
            "USERNOTICE" => Some(CommandKind::UserNotice),
            "USERSTATE" => Some(CommandKind::UserState),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::ClearChat => "CLEARCHAT",
            CommandKind::ClearMsg => "CLEARMSG",
            CommandKind::HostTarget => "HOSTTARGET",
            CommandKind::Notice => "NOTICE",
            CommandKind::Reconnect => "RECONNECT",
            CommandKind::RoomState => "ROOMSTATE",
            CommandKind::UserNotice => "USERNOTICE",
            CommandKind::UserState => "USERSTATE",
        }
    }

    pub fn payload(self) -> Payload {
        match self {
            CommandKind::ClearChat | CommandKind::ClearMsg | CommandKind::HostTarget => Payload::Token,
            CommandKind::Notice | CommandKind::UserNotice => Payload::Rest,
            CommandKind::Reconnect | CommandKind::RoomState | CommandKind::UserState => Payload::None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared handle to the session's user lookup.
#[derive(Clone)]
pub(crate) struct LookupHandle(pub(crate) Arc<dyn UserLookup>);

impl fmt::Debug for LookupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LookupHandle")
    }
}
