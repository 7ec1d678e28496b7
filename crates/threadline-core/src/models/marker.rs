use serde::{Deserialize, Serialize};

use super::timeline_event::EventNum;

/// Per-channel or per-thread cursor: the oldest unread event, the window of
/// event numbers already accounted for, and the pending mention count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullyReadMarker {
    pub channel_id: String,
    pub thread_parent_id: Option<String>,
    /// First unread event, or the newest seen event when nothing is unread
    pub event_id: String,
    pub event_num: EventNum,
    pub begin_unread_window: EventNum,
    pub end_unread_window: EventNum,
    pub is_unread: bool,
    pub mentions: u32,
    /// Epoch millis of the last mark-read, 0 if never read
    pub marked_read_at_ts: u64,
}

impl FullyReadMarker {
    /// Key under which this marker is stored
    pub fn key(&self) -> &str {
        self.thread_parent_id.as_deref().unwrap_or(&self.channel_id)
    }

    pub fn is_thread(&self) -> bool {
        self.thread_parent_id.is_some()
    }

    pub fn window_contains(&self, event_num: EventNum) -> bool {
        self.begin_unread_window <= event_num && event_num <= self.end_unread_window
    }
}
