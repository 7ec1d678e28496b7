use std::collections::BTreeSet;

use serde::Serialize;

use super::timeline_event::{EventNum, TimelineEvent};

/// Aggregate of a thread, keyed by its root event id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadStats {
    pub parent_id: String,
    /// (event number, reply id), so iteration follows stream order and
    /// replies sharing a number are both kept
    pub reply_event_ids: BTreeSet<(EventNum, String)>,
    pub participant_user_ids: BTreeSet<String>,
    /// Newest `created_at_ms` among the replies
    pub latest_timestamp: u64,
    /// The root message, once it is loaded
    pub parent_event: Option<TimelineEvent>,
    /// The local user wrote the root, replied, or was mentioned in a reply
    pub is_participating: bool,
}

impl ThreadStats {
    pub fn new(
        parent_id: impl Into<String>,
        parent_event: Option<TimelineEvent>,
        latest_timestamp: u64,
    ) -> Self {
        Self {
            parent_id: parent_id.into(),
            reply_event_ids: BTreeSet::new(),
            participant_user_ids: BTreeSet::new(),
            latest_timestamp,
            parent_event,
            is_participating: false,
        }
    }

    pub fn reply_count(&self) -> usize {
        self.reply_event_ids.len()
    }

    /// Reply ids in stream order
    pub fn reply_ids(&self) -> impl Iterator<Item = &str> {
        self.reply_event_ids.iter().map(|(_, id)| id.as_str())
    }

    pub fn has_reply(&self, event: &TimelineEvent) -> bool {
        self.reply_event_ids
            .contains(&(event.event_num, event.event_id.clone()))
    }

    /// Check if the local user started this thread
    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.parent_event
            .as_ref()
            .is_some_and(|parent| parent.sender.id == user_id)
    }
}
