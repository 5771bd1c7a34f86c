//! Per-owner conversation log.
//!
//! Each owner's exchanges live in a single `history.json` under their
//! upload directory: a flat array of `{role, text}` entries in arrival
//! order. Appends are read-modify-write of the whole file, which is
//! fine at chat-history sizes and keeps the file human-readable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Config;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub role: String,
    pub text: String,
}

/// Append one entry to the owner's log, creating it if needed.
pub fn append_message(config: &Config, owner: &str, role: &str, text: &str) -> Result<()> {
    let path = config.history_path(owner);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut history = read_history_file(&path)?;
    history.push(LogEntry {
        role: role.to_string(),
        text: text.to_string(),
    });

    let json = serde_json::to_string_pretty(&history)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write history file: {}", path.display()))?;
    Ok(())
}

/// The owner's full log, oldest first. Empty when they have none.
pub fn history(config: &Config, owner: &str) -> Result<Vec<LogEntry>> {
    read_history_file(&config.history_path(owner))
}

fn read_history_file(path: &Path) -> Result<Vec<LogEntry>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Malformed history file: {}", path.display()))
}

/// Owners with any session state on disk, sorted by name.
pub fn sessions(config: &Config) -> Result<Vec<String>> {
    let root = config.uploads_root();
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut owners = Vec::new();
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            owners.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    owners.sort();
    Ok(owners)
}
