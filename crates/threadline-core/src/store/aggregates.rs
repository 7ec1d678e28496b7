//! Derived per-stream indices: thread sub-timelines with their stats, and
//! reaction tallies. Both are updated incrementally by the timeline store;
//! every mutation there subtracts the old event's contribution before adding
//! the new one.

use std::collections::{BTreeMap, HashMap};

use crate::models::{ThreadStats, TimelineContent, TimelineEvent};

/// label -> sender id -> reacting event id
pub type MessageReactions = BTreeMap<String, BTreeMap<String, String>>;

/// Sub-store for threads of one stream.
#[derive(Debug, Clone, Default)]
pub struct ThreadIndex {
    /// Replies per thread root, sorted by event_num
    timelines: HashMap<String, Vec<TimelineEvent>>,
    stats: HashMap<String, ThreadStats>,
}

impl ThreadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.timelines.clear();
        self.stats.clear();
    }

    // ===== Getters =====

    pub fn stats(&self) -> &HashMap<String, ThreadStats> {
        &self.stats
    }

    pub fn get_stats(&self, parent_id: &str) -> Option<&ThreadStats> {
        self.stats.get(parent_id)
    }

    pub fn has_stats(&self, parent_id: &str) -> bool {
        self.stats.contains_key(parent_id)
    }

    pub fn get_thread(&self, parent_id: &str) -> &[TimelineEvent] {
        self.timelines
            .get(parent_id)
            .map(|events| events.as_slice())
            .unwrap_or(&[])
    }

    // ===== Sub-timelines =====

    /// Replies decrypt in unpredictable order, so they are insertion-sorted.
    pub fn insert_reply(&mut self, event: &TimelineEvent) {
        let Some(parent_id) = event.thread_parent_id.as_deref() else {
            return;
        };
        let thread = self.timelines.entry(parent_id.to_string()).or_default();
        if let Some(slot) = thread.iter_mut().find(|e| e.event_id == event.event_id) {
            *slot = event.clone();
            return;
        }
        let pos = thread.partition_point(|e| e.event_num <= event.event_num);
        thread.insert(pos, event.clone());
    }

    pub fn replace_reply(&mut self, old: &TimelineEvent, new: &TimelineEvent) {
        if old.thread_parent_id != new.thread_parent_id {
            self.remove_reply(old);
        }
        let Some(parent_id) = new.thread_parent_id.as_deref() else {
            return;
        };
        let slot = self
            .timelines
            .get_mut(parent_id)
            .and_then(|thread| thread.iter_mut().find(|e| e.event_id == old.event_id));
        match slot {
            Some(slot) => *slot = new.clone(),
            None => self.insert_reply(new),
        }
    }

    pub fn remove_reply(&mut self, event: &TimelineEvent) {
        let Some(parent_id) = event.thread_parent_id.as_deref() else {
            return;
        };
        if let Some(thread) = self.timelines.get_mut(parent_id) {
            thread.retain(|e| e.event_id != event.event_id);
            if thread.is_empty() {
                self.timelines.remove(parent_id);
            }
        }
    }

    // ===== Stats =====

    /// Add an event's contribution. Replies extend their thread; a root
    /// refreshes the parent pointer. `parent` is only consulted when the
    /// thread is new. Returns true if the local user started participating.
    pub fn add_stat(
        &mut self,
        event: &TimelineEvent,
        parent: Option<TimelineEvent>,
        user_id: &str,
    ) -> bool {
        if let Some(parent_id) = event.thread_parent_id.as_deref() {
            if event.is_redacted {
                return false;
            }
            let stats = self
                .stats
                .entry(parent_id.to_string())
                .or_insert_with(|| ThreadStats::new(parent_id, parent, event.created_at_ms));
            let was_participating = stats.is_participating;
            stats
                .reply_event_ids
                .insert((event.event_num, event.event_id.clone()));
            stats.latest_timestamp = stats.latest_timestamp.max(event.created_at_ms);
            if let Some(sender_id) = event.message_sender_id() {
                stats.participant_user_ids.insert(sender_id.to_string());
            }
            stats.is_participating = was_participating
                || stats.participant_user_ids.contains(user_id)
                || stats.is_authored_by(user_id)
                || event.is_mentioned;
            return !was_participating && stats.is_participating;
        }

        if let Some(stats) = self.stats.get_mut(&event.event_id) {
            let was_participating = stats.is_participating;
            stats.is_participating = was_participating
                || (!event.is_redacted
                    && !stats.reply_event_ids.is_empty()
                    && (event.sender.id == user_id || event.is_mentioned));
            stats.parent_event = Some(event.clone());
            return !was_participating && stats.is_participating;
        }
        false
    }

    /// Subtract a reply's contribution. A thread is dropped once its last
    /// reply goes. Returns true if a thread the user participated in was
    /// dropped.
    pub fn remove_stat(&mut self, event: &TimelineEvent) -> bool {
        let Some(parent_id) = event.thread_parent_id.as_deref() else {
            return false;
        };
        let Some(stats) = self.stats.get_mut(parent_id) else {
            return false;
        };
        stats
            .reply_event_ids
            .remove(&(event.event_num, event.event_id.clone()));
        if stats.reply_event_ids.is_empty() {
            return self
                .stats
                .remove(parent_id)
                .is_some_and(|dropped| dropped.is_participating);
        }

        // A sender may have other replies left, so rebuild from what remains
        let participants = self
            .timelines
            .get(parent_id)
            .map(|thread| {
                thread
                    .iter()
                    .filter(|e| stats.has_reply(e))
                    .filter_map(|e| e.message_sender_id().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        stats.participant_user_ids = participants;
        false
    }
}

/// Sub-store for reactions of one stream.
#[derive(Debug, Clone, Default)]
pub struct ReactionIndex {
    by_target: HashMap<String, MessageReactions>,
}

impl ReactionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.by_target.clear();
    }

    // ===== Getters =====

    pub fn all(&self) -> &HashMap<String, MessageReactions> {
        &self.by_target
    }

    pub fn get(&self, target_event_id: &str) -> Option<&MessageReactions> {
        self.by_target.get(target_event_id)
    }

    // ===== Mutations =====

    pub fn add(&mut self, event: &TimelineEvent) {
        let (Some(target), TimelineContent::Reaction { reaction, .. }) =
            (event.reaction_parent_id.as_deref(), &event.content)
        else {
            return;
        };
        self.by_target
            .entry(target.to_string())
            .or_default()
            .entry(reaction.clone())
            .or_default()
            .insert(event.sender.id.clone(), event.event_id.clone());
    }

    pub fn remove(&mut self, event: &TimelineEvent) {
        let (Some(target), TimelineContent::Reaction { reaction, .. }) =
            (event.reaction_parent_id.as_deref(), &event.content)
        else {
            return;
        };
        let Some(entry) = self.by_target.get_mut(target) else {
            return;
        };
        if let Some(senders) = entry.get_mut(reaction) {
            senders.remove(&event.sender.id);
            if senders.is_empty() {
                entry.remove(reaction);
            }
        }
        if entry.is_empty() {
            self.by_target.remove(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_helpers::*;

    #[test]
    fn test_replies_sorted_out_of_order() {
        let mut index = ThreadIndex::new();
        let first = reply("r1", 2, "alice", "one", "root");
        let third = reply("r3", 6, "alice", "three", "root");
        let second = reply("r2", 4, "carol", "two", "root");

        for event in [&first, &third, &second] {
            index.insert_reply(event);
            index.add_stat(event, None, LOCAL_USER);
        }

        let ids: Vec<_> = index.get_thread("root").iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
        let stats = index.get_stats("root").unwrap();
        assert_eq!(stats.reply_ids().collect::<Vec<_>>(), vec!["r1", "r2", "r3"]);
        assert_eq!(stats.latest_timestamp, third.created_at_ms);
        assert!(!stats.is_participating);
    }

    #[test]
    fn test_participation_from_root_author() {
        let mut index = ThreadIndex::new();
        let root = message("root", 1, LOCAL_USER, "start");
        let answer = reply("r1", 2, "alice", "answer", "root");

        assert!(index.add_stat(&answer, Some(root), LOCAL_USER));
        assert!(index.get_stats("root").unwrap().is_participating);
    }

    #[test]
    fn test_root_arriving_late_sets_parent() {
        let mut index = ThreadIndex::new();
        let answer = reply("r1", 2, "alice", "answer", "root");
        index.add_stat(&answer, None, LOCAL_USER);
        assert!(index.get_stats("root").unwrap().parent_event.is_none());

        let root = message("root", 1, LOCAL_USER, "start");
        assert!(index.add_stat(&root, None, LOCAL_USER));
        let stats = index.get_stats("root").unwrap();
        assert_eq!(stats.parent_event.as_ref().map(|e| e.event_id.as_str()), Some("root"));
    }

    #[test]
    fn test_remove_keeps_thread_until_empty() {
        let mut index = ThreadIndex::new();
        let a = reply("r1", 2, "alice", "one", "root");
        let b = reply("r2", 3, "alice", "two", "root");
        let c = reply("r3", 4, "carol", "three", "root");
        for event in [&a, &b, &c] {
            index.insert_reply(event);
            index.add_stat(event, None, LOCAL_USER);
        }

        index.remove_stat(&a);
        let stats = index.get_stats("root").unwrap();
        assert_eq!(stats.reply_count(), 2);
        // alice still has r2 in the thread
        assert!(stats.participant_user_ids.contains("alice"));

        index.remove_stat(&c);
        assert!(!index.get_stats("root").unwrap().participant_user_ids.contains("carol"));

        index.remove_stat(&b);
        assert!(index.get_stats("root").is_none());
    }

    #[test]
    fn test_replies_sharing_event_num() {
        let mut index = ThreadIndex::new();
        let a = reply("r1", 2, "carol", "one", "root");
        let b = reply("r2", 2, "dave", "two", "root");
        for event in [&a, &b] {
            index.insert_reply(event);
            index.add_stat(event, None, LOCAL_USER);
        }
        assert_eq!(index.get_stats("root").unwrap().reply_count(), 2);

        index.remove_stat(&b);
        index.remove_reply(&b);
        let stats = index.get_stats("root").unwrap();
        assert_eq!(stats.reply_ids().collect::<Vec<_>>(), vec!["r1"]);
        assert_eq!(
            stats.participant_user_ids.iter().collect::<Vec<_>>(),
            vec!["carol"]
        );
    }

    #[test]
    fn test_reaction_cells() {
        let mut reactions = ReactionIndex::new();
        let up = reaction("x1", 2, "alice", "m1", "+1");
        let up2 = reaction("x2", 3, "carol", "m1", "+1");
        reactions.add(&up);
        reactions.add(&up2);

        let tally = reactions.get("m1").unwrap();
        assert_eq!(tally["+1"].len(), 2);
        assert_eq!(tally["+1"]["alice"], "x1");

        reactions.remove(&up);
        assert_eq!(reactions.get("m1").unwrap()["+1"].len(), 1);
        reactions.remove(&up2);
        assert!(reactions.get("m1").is_none());
    }
}
