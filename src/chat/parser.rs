//! Raw line to [`Message`].
//!
//! Parsing is deliberately permissive: anything that is not a `PRIVMSG` or
//! one of the known Twitch commands yields `None` rather than an error, so
//! new protocol extensions never break the read loop.

use crate::chat::message::{ChatMessage, CommandKind, CommandMessage, Message, Payload, Tags};
use crate::irc::commands::normalize_channel;

const PRIVMSG: &str = " PRIVMSG ";
const SERVER_PREFIX: &str = ":tmi.twitch.tv";

/// Parse one line. Command lines are only considered when
/// `capture_commands` is set.
pub fn parse(line: &str, capture_commands: bool) -> Option<Message> {
    if line.contains(PRIVMSG) {
        parse_privmsg(line).map(Message::Chat)
    } else if capture_commands && line.contains(SERVER_PREFIX) {
        parse_command(line).map(Message::Command)
    } else {
        None
    }
}

/// `@tags :nick!user@host PRIVMSG #channel :text`
fn parse_privmsg(line: &str) -> Option<ChatMessage> {
    let (tags, body) = split_tags(line);

    let (prefix, after) = body.split_once(PRIVMSG)?;
    let channel = normalize_channel(after.split_whitespace().next()?);
    let (_, text) = after.split_once(':')?;

    let prefix = prefix.trim().trim_start_matches(':');
    let sender = prefix.split_once('!').map_or(prefix, |(nick, _)| nick);

    Some(ChatMessage {
        channel: channel.to_string(),
        sender: sender.to_string(),
        text: text.to_string(),
        tags: parse_tags(tags),
        raw: line.to_string(),
        lookup: None,
    })
}

/// `@tags :tmi.twitch.tv COMMAND #channel [args...]`
fn parse_command(line: &str) -> Option<CommandMessage> {
    let (tags, command) = line.split_once(SERVER_PREFIX)?;
    let tags = tags.trim().strip_prefix('@').unwrap_or_default();

    let mut args = command.split_whitespace();
    let kind = CommandKind::from_keyword(args.next()?)?;
    let channel = args.next().map(|c| normalize_channel(c).to_string());

    let payload = match kind.payload() {
        Payload::None => None,
        Payload::Token => args.next().map(strip_colon),
        Payload::Rest => {
            let rest: Vec<&str> = args.collect();
            if rest.is_empty() {
                None
            } else {
                Some(strip_colon(&rest.join(" ")))
            }
        }
    };

    Some(CommandMessage {
        kind,
        channel,
        payload,
        tags: parse_tags(tags),
        raw: line.to_string(),
    })
}

/// Split a line into its tag segment (without `@`) and the rest.
fn split_tags(line: &str) -> (&str, &str) {
    match line.strip_prefix('@') {
        Some(rest) => rest.split_once(' ').unwrap_or((rest, "")),
        None => ("", line),
    }
}

/// `a=1;b=;c=x=y` becomes `{a: 1, b: "", c: "x=y"}`. Split on the first
/// `=` only; a key without `=` maps to an empty value.
pub fn parse_tags(segment: &str) -> Tags {
    segment
        .split(';')
        .filter(|tag| !tag.is_empty())
        .map(|tag| {
            let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
            (key.to_string(), value.to_string())
        })
        .collect()
}

fn strip_colon(s: &str) -> String {
    s.strip_prefix(':').unwrap_or(s).to_string()
}
