//! Fully-read marker engine.
//!
//! Markers are keyed by channel id, or by thread root id for thread scoped
//! markers. They are only ever updated from a [`TimelineDiff`]: a replaced
//! pass fixes up mentions and the first-unread pointer for edits and
//! redactions inside an existing window, then an added pass extends windows
//! with newly streamed events without rescanning history.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace, warn};

use super::timeline_store::TimelineDiff;
use crate::models::{EventNum, FullyReadMarker, TimelineEvent};

/// Sub-store for fully-read markers.
#[derive(Debug, Clone, Default)]
pub struct MarkerStore {
    markers: HashMap<String, FullyReadMarker>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    // ===== Getters =====

    pub fn markers(&self) -> &HashMap<String, FullyReadMarker> {
        &self.markers
    }

    pub fn get_marker(
        &self,
        channel_id: &str,
        thread_parent_id: Option<&str>,
    ) -> Option<&FullyReadMarker> {
        self.markers.get(thread_parent_id.unwrap_or(channel_id))
    }

    // ===== Mutations =====

    /// Marking read keeps the window bounds so later diffs still line up
    /// with the last seen position.
    pub fn mark_read(
        &mut self,
        channel_id: &str,
        thread_parent_id: Option<&str>,
        now_ms: u64,
    ) -> bool {
        let Some(marker) = self.markers.get_mut(thread_parent_id.unwrap_or(channel_id)) else {
            return false;
        };
        let changed = marker.is_unread || marker.mentions > 0;
        marker.is_unread = false;
        marker.mentions = 0;
        marker.marked_read_at_ts = now_ms;
        changed
    }

    /// Merge markers from another device. A remote marker wins when there is
    /// no local one or its window starts later.
    pub fn apply_remote_markers(&mut self, remote: Vec<FullyReadMarker>) -> usize {
        let mut updated = 0;
        for marker in remote {
            let key = marker.key().to_string();
            let wins = self
                .markers
                .get(&key)
                .map_or(true, |local| local.begin_unread_window < marker.begin_unread_window);
            if wins {
                self.markers.insert(key, marker);
                updated += 1;
            }
        }
        if updated > 0 {
            debug!(updated, "Applied remote fully-read markers");
        }
        updated
    }

    pub fn reset(&mut self, channel_ids: &[String]) {
        self.markers
            .retain(|_, marker| !channel_ids.contains(&marker.channel_id));
    }

    /// Apply one timeline mutation batch. `timeline` is the stream's state
    /// after the batch. Returns true if any marker changed.
    pub fn diff_and_update(
        &mut self,
        user_id: &str,
        timeline: &[TimelineEvent],
        diff: &TimelineDiff,
    ) -> bool {
        let channel_id = diff.stream_id.as_str();
        let replaced = self.diff_replaced(user_id, channel_id, timeline, &diff.replaced);
        let removed = self.diff_removed(user_id, channel_id, timeline, &diff.removed);
        let added = self.diff_added(user_id, channel_id, timeline, &diff.added);
        replaced || removed || added
    }

    // ===== Diff passes =====

    fn diff_replaced(
        &mut self,
        user_id: &str,
        channel_id: &str,
        timeline: &[TimelineEvent],
        replaced: &[(TimelineEvent, TimelineEvent)],
    ) -> bool {
        let mut did_update = false;
        for (old, new) in replaced {
            let key = new.marker_key(channel_id).to_string();
            let old_key = old.marker_key(channel_id);
            if old_key != key {
                did_update |= self.forget_moved_event(user_id, channel_id, timeline, old_key, old);
            }

            let Some(marker) = self.markers.get_mut(&key) else {
                did_update |= self.create_late_thread_marker(user_id, channel_id, &key, new);
                continue;
            };
            // Outside the window the event is either read or not accounted
            // for yet
            if !marker.is_unread || !marker.window_contains(new.event_num) {
                continue;
            }
            did_update = true;

            match (old.is_mentioned, new.is_mentioned) {
                (false, true) => marker.mentions += 1,
                (true, false) => marker.mentions = marker.mentions.saturating_sub(1),
                _ => {}
            }

            let redacted_pointer =
                new.is_redacted && !old.is_redacted && new.event_num == marker.event_num;
            if redacted_pointer {
                rescan(marker, user_id, channel_id, timeline);
            } else if new.is_counted_as_unread(user_id) && new.event_num <= marker.event_num {
                marker.event_id = new.event_id.clone();
                marker.event_num = new.event_num;
            }
        }
        did_update
    }

    /// A replaced event revealed a thread (e.g. after decryption) that has no
    /// marker yet. The new marker inherits the channel window.
    fn create_late_thread_marker(
        &mut self,
        user_id: &str,
        channel_id: &str,
        key: &str,
        new: &TimelineEvent,
    ) -> bool {
        if key == channel_id {
            return false;
        }
        let Some((begin, end)) = self
            .markers
            .get(channel_id)
            .map(|m| (m.begin_unread_window, m.end_unread_window))
        else {
            return false;
        };
        if new.event_num > end {
            return false;
        }
        trace!(thread_id = %key, "Creating thread marker from channel window");
        self.markers.insert(
            key.to_string(),
            FullyReadMarker {
                channel_id: channel_id.to_string(),
                thread_parent_id: Some(key.to_string()),
                event_id: new.event_id.clone(),
                event_num: new.event_num,
                begin_unread_window: begin,
                end_unread_window: end,
                is_unread: new.is_counted_as_unread(user_id),
                mentions: u32::from(new.is_mentioned),
                marked_read_at_ts: 0,
            },
        );
        true
    }

    /// An event left `key`'s scope (e.g. decryption moved it into a thread)
    fn forget_moved_event(
        &mut self,
        user_id: &str,
        channel_id: &str,
        timeline: &[TimelineEvent],
        key: &str,
        old: &TimelineEvent,
    ) -> bool {
        let Some(marker) = self.markers.get_mut(key) else {
            return false;
        };
        if !marker.is_unread || !marker.window_contains(old.event_num) {
            return false;
        }
        if old.is_mentioned {
            marker.mentions = marker.mentions.saturating_sub(1);
        }
        if marker.event_num == old.event_num {
            rescan(marker, user_id, channel_id, timeline);
        }
        true
    }

    fn diff_removed(
        &mut self,
        user_id: &str,
        channel_id: &str,
        timeline: &[TimelineEvent],
        removed: &[TimelineEvent],
    ) -> bool {
        let mut did_update = false;
        for old in removed {
            let key = old.marker_key(channel_id).to_string();
            did_update |= self.forget_moved_event(user_id, channel_id, timeline, &key, old);
        }
        did_update
    }

    fn diff_added(
        &mut self,
        user_id: &str,
        channel_id: &str,
        timeline: &[TimelineEvent],
        added: &[TimelineEvent],
    ) -> bool {
        let channel_end = self.markers.get(channel_id).map(|m| m.end_unread_window);

        // BTreeMap keeps partition processing deterministic
        let mut partitions: BTreeMap<&str, Vec<&TimelineEvent>> = BTreeMap::new();
        for event in added {
            if channel_end.is_some_and(|end| event.event_num <= end) {
                continue;
            }
            partitions
                .entry(event.marker_key(channel_id))
                .or_default()
                .push(event);
        }

        let mut did_update = false;
        for (key, mut segment) in partitions {
            let prev = self.markers.get(key);
            if let Some(prev) = prev {
                segment.retain(|e| e.event_num > prev.end_unread_window);
            }
            segment.sort_by_key(|e| e.event_num);
            let (Some(first), Some(last)) = (segment.first(), segment.last()) else {
                continue;
            };

            let mentions = prev.map_or(0, |m| m.mentions)
                + segment.iter().filter(|e| e.is_mentioned).count() as u32;
            // A read marker restarts its window so read messages stay read
            let begin_unread_window = match prev {
                Some(prev) if prev.is_unread => prev.begin_unread_window,
                _ => first.event_num,
            };
            let end_unread_window = prev
                .map_or(last.event_num, |m| m.end_unread_window.max(last.event_num));
            if begin_unread_window > end_unread_window {
                warn!(
                    marker = key,
                    begin_unread_window,
                    end_unread_window,
                    "Unread window inverted, skipping update"
                );
                continue;
            }

            let first_unread = first_unread_event(
                timeline,
                user_id,
                channel_id,
                key,
                begin_unread_window,
                end_unread_window,
            );
            let pointer = first_unread.unwrap_or(last);
            let marker = FullyReadMarker {
                channel_id: channel_id.to_string(),
                thread_parent_id: (key != channel_id).then(|| key.to_string()),
                event_id: pointer.event_id.clone(),
                event_num: pointer.event_num,
                begin_unread_window,
                end_unread_window,
                is_unread: first_unread.is_some(),
                mentions,
                marked_read_at_ts: prev.map_or(0, |m| m.marked_read_at_ts),
            };
            self.markers.insert(key.to_string(), marker);
            did_update = true;
        }
        did_update
    }
}

/// Re-derive the first unread pointer of `marker` from its window.
fn rescan(marker: &mut FullyReadMarker, user_id: &str, channel_id: &str, timeline: &[TimelineEvent]) {
    let key = marker.key().to_string();
    let first_unread = first_unread_event(
        timeline,
        user_id,
        channel_id,
        &key,
        marker.begin_unread_window,
        marker.end_unread_window,
    );
    if let Some(pointer) = first_unread.or_else(|| timeline.last()) {
        marker.event_id = pointer.event_id.clone();
        marker.event_num = pointer.event_num;
    }
    marker.is_unread = first_unread.is_some();
}

/// First event in `[begin, end]` scoped to `marker_key` that counts as
/// unread. `timeline` must be sorted by event_num.
pub fn first_unread_event<'a>(
    timeline: &'a [TimelineEvent],
    user_id: &str,
    channel_id: &str,
    marker_key: &str,
    begin: EventNum,
    end: EventNum,
) -> Option<&'a TimelineEvent> {
    let start = timeline.partition_point(|e| e.event_num < begin);
    timeline[start..]
        .iter()
        .take_while(|e| e.event_num <= end)
        .find(|e| e.marker_key(channel_id) == marker_key && e.is_counted_as_unread(user_id))
}
