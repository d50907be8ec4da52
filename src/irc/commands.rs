//! Outgoing IRC commands.
//!
//! Builds the handful of [`Command`]s a Twitch chat client sends. Channel
//! names are stored without `#`; every channel-scoped command adds it back.

use irc::proto::{CapSubCommand, Command, Message};

/// Optional Twitch protocol extension requested with `CAP REQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Tags,
    Commands,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Tags => "twitch.tv/tags",
            Capability::Commands => "twitch.tv/commands",
        }
    }
}

pub fn pass(password: &str) -> Command {
    Command::PASS(password.to_string())
}

pub fn nick(nickname: &str) -> Command {
    Command::NICK(nickname.to_string())
}

pub fn cap_req(cap: Capability) -> Command {
    Command::CAP(None, CapSubCommand::REQ, Some(cap.as_str().to_string()), None)
}

pub fn join(channel: &str) -> Command {
    Command::JOIN(format!("#{}", normalize_channel(channel)), None, None)
}

pub fn part(channel: &str) -> Command {
    Command::PART(format!("#{}", normalize_channel(channel)), None)
}

/// `PRIVMSG` with CR/LF in `text` replaced by spaces, so the body can
/// never end the line early.
pub fn privmsg(channel: &str, text: &str) -> Command {
    let clean: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    Command::PRIVMSG(format!("#{}", normalize_channel(channel)), clean)
}

/// The reply to `line` if it is a `PING`, echoing its token.
///
/// Only the command word counts: chat text that mentions PING is not a
/// keep-alive.
pub fn pong_for(line: &str) -> Option<Command> {
    if !line.contains("PING") {
        return None;
    }
    let message = line.parse::<Message>().ok()?;
    match message.command {
        Command::PING(server, server2) => Some(Command::PONG(server, server2)),
        Command::Raw(ref cmd, ref args) if cmd == "PING" => Some(Command::Raw("PONG".into(), args.clone())),
        _ => None,
    }
}

/// Serialize `command` as one line, without terminator.
pub fn to_line(command: &Command) -> String {
    String::from(command)
}

/// Strip leading `#` from a channel name.
pub fn normalize_channel(name: &str) -> &str {
    name.trim().trim_start_matches('#')
}
