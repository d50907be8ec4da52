//! Seam to the Helix REST API.
//!
//! The chat core never talks HTTP itself. A session may be given a
//! [`UserLookup`] that resolves a sender's login to a profile on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Twitch user profile as returned by `GET /helix/users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    /// `admin`, `global_mod`, `staff`, or empty.
    #[serde(rename = "type", default)]
    pub user_type: String,
    /// `affiliate`, `partner`, or empty.
    #[serde(default)]
    pub broadcaster_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub offline_image_url: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Resolves a login name to a profile.
///
/// Called synchronously from [`ChatMessage::user`](crate::ChatMessage::user).
/// `Ok(None)` means no such user; `Err` means the lookup itself failed.
pub trait UserLookup: Send + Sync {
    fn lookup_user(&self, login: &str) -> anyhow::Result<Option<User>>;
}

impl<F> UserLookup for F
where
    F: Fn(&str) -> anyhow::Result<Option<User>> + Send + Sync,
{
    fn lookup_user(&self, login: &str) -> anyhow::Result<Option<User>> {
        self(login)
    }
}
