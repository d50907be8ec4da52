//! Twitch chat client core.
//!
//! Owns a single IRC connection to Twitch, performs the PASS/NICK/CAP
//! handshake, keeps channel membership, and turns the incoming line stream
//! into [`Event`]s delivered to subscribers. See [`Chat`] for the entry point.

pub mod chat;
pub mod config;
pub mod error;
pub mod helix;
pub mod irc;

pub use chat::bus::{EventBus, SubscriptionId};
pub use chat::event::{CloseReason, Event};
pub use chat::message::{ChatMessage, CommandKind, CommandMessage, Message, Tags};
pub use chat::session::Chat;
pub use config::{ChatConfig, Channels};
pub use error::{Error, Result};
pub use helix::{User, UserLookup};
