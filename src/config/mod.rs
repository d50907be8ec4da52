pub mod model;
pub mod nickname;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use model::{Channels, ChatConfig};

/// `<config_dir>/twitch-chat/config.toml`, e.g.
/// `~/.config/twitch-chat/config.toml` on Linux. Falls back to the working
/// directory when the platform has no config dir.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("twitch-chat")
        .join("config.toml")
}

/// Load the config from the user's config directory, falling back to
/// defaults when no file exists.
pub fn load_config() -> Result<ChatConfig> {
    let path = config_path();
    if !path.exists() {
        return Ok(ChatConfig::default());
    }
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<ChatConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: ChatConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
