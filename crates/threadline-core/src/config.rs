use std::path::Path;

use serde::Deserialize;

use crate::constants::{MARKER_DEBOUNCE_MS, THREAD_DEBOUNCE_MS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// The local user; drives mention, participation and unread attribution
    pub user_id: String,
    pub marker_debounce_ms: u64,
    pub thread_debounce_ms: u64,
}

impl CoreConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            marker_debounce_ms: MARKER_DEBOUNCE_MS,
            thread_debounce_ms: THREAD_DEBOUNCE_MS,
        }
    }
}
