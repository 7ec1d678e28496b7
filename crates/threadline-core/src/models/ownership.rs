use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Which channels belong to which space, and what the user muted.
/// Supplied by the membership collaborator; the store never derives it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipMetadata {
    #[serde(default)]
    pub space_channels: HashMap<String, HashSet<String>>,
    /// Muted channel or space ids
    #[serde(default)]
    pub muted_ids: HashSet<String>,
}

impl OwnershipMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_space<I, S>(mut self, space_id: impl Into<String>, channel_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.space_channels
            .entry(space_id.into())
            .or_default()
            .extend(channel_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_muted(mut self, id: impl Into<String>) -> Self {
        self.muted_ids.insert(id.into());
        self
    }

    pub fn is_muted(&self, id: &str) -> bool {
        self.muted_ids.contains(id)
    }

    /// The space owning `channel_id`. A channel listed under several spaces
    /// resolves to the smallest space id.
    pub fn space_for_channel(&self, channel_id: &str) -> Option<&str> {
        self.space_channels
            .iter()
            .filter(|(_, channels)| channels.contains(channel_id))
            .map(|(space_id, _)| space_id.as_str())
            .min()
    }
}
