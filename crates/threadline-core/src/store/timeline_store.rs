//! Per-stream ordered event log.
//!
//! Every incoming event is routed through one reconciliation path: redactions
//! tombstone their target, edits merge into the slot they supersede, and
//! anything else is inserted by `event_num`. Targets that are not loaded yet
//! park the replacement in a pending table until they arrive.
//!
//! Each mutation batch returns a [`TimelineDiff`] that the marker engine
//! consumes.

use std::collections::HashMap;

use tracing::{debug, info, trace, warn};

use super::aggregates::{MessageReactions, ReactionIndex, ThreadIndex};
use crate::constants::REDACTED_FALLBACK;
use crate::models::{
    is_local_event_id, EventNum, ThreadStats, TimelineContent, TimelineEvent,
    TimelineEventConfirmation,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Stream {0} is not initialized")]
    StreamNotInitialized(String),
}

/// What one mutation batch did to a stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineDiff {
    pub stream_id: String,
    /// Newly inserted events in their final state. An event inserted and then
    /// replaced within the same batch only shows up here.
    pub added: Vec<TimelineEvent>,
    /// (old, new) for events that existed before the batch
    pub replaced: Vec<(TimelineEvent, TimelineEvent)>,
    pub removed: Vec<TimelineEvent>,
    pub confirmed_event_ids: Vec<String>,
    /// Some thread's participation flag flipped
    pub participation_changed: bool,
    pub stale_dropped: usize,
    pub pending_stashed: usize,
}

impl TimelineDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.replaced.is_empty()
            && self.removed.is_empty()
            && self.confirmed_event_ids.is_empty()
            && !self.participation_changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertEnd {
    Append,
    Prepend,
}

/// Accumulates the effects of one batch before it becomes a [`TimelineDiff`].
#[derive(Debug, Default)]
struct Batch {
    added: Vec<String>,
    replaced: Vec<(TimelineEvent, TimelineEvent)>,
    removed: Vec<TimelineEvent>,
    confirmed: Vec<String>,
    participation_changed: bool,
    stale_dropped: usize,
    pending_stashed: usize,
}

impl Batch {
    fn record_replaced(&mut self, old: TimelineEvent, new: TimelineEvent) {
        match self.added.iter_mut().find(|id| **id == old.event_id) {
            Some(id) => *id = new.event_id,
            None => self.replaced.push((old, new)),
        }
    }

    fn record_removed(&mut self, old: TimelineEvent) {
        match self.added.iter().position(|id| *id == old.event_id) {
            Some(index) => {
                self.added.remove(index);
            }
            None => self.removed.push(old),
        }
    }

    fn into_diff(self, stream_id: &str, timeline: &StreamTimeline) -> TimelineDiff {
        TimelineDiff {
            stream_id: stream_id.to_string(),
            added: self
                .added
                .iter()
                .filter_map(|id| timeline.get_event(id).cloned())
                .collect(),
            replaced: self.replaced,
            removed: self.removed,
            confirmed_event_ids: self.confirmed,
            participation_changed: self.participation_changed,
            stale_dropped: self.stale_dropped,
            pending_stashed: self.pending_stashed,
        }
    }
}

/// State of one stream: the ordered log plus its derived indices.
#[derive(Debug, Clone, Default)]
pub struct StreamTimeline {
    events: Vec<TimelineEvent>,
    num_by_id: HashMap<String, EventNum>,
    threads: ThreadIndex,
    reactions: ReactionIndex,
    /// Replacements whose target is not loaded yet, keyed by target id
    pending_replacements: HashMap<String, TimelineEvent>,
}

impl StreamTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Getters =====

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get_event(&self, event_id: &str) -> Option<&TimelineEvent> {
        self.position_of(event_id).map(|pos| &self.events[pos])
    }

    pub fn threads(&self) -> &ThreadIndex {
        &self.threads
    }

    pub fn reactions(&self) -> &ReactionIndex {
        &self.reactions
    }

    pub fn pending_replacement(&self, target_id: &str) -> Option<&TimelineEvent> {
        self.pending_replacements.get(target_id)
    }

    fn position_of(&self, event_id: &str) -> Option<usize> {
        let num = *self.num_by_id.get(event_id)?;
        let start = self.events.partition_point(|e| e.event_num < num);
        self.events[start..]
            .iter()
            .take_while(|e| e.event_num == num)
            .position(|e| e.event_id == event_id)
            .map(|offset| start + offset)
    }

    fn find_slot(&self, target_id: &str, local_event_id: Option<&str>) -> Option<usize> {
        self.position_of(target_id).or_else(|| {
            let local_event_id = local_event_id?;
            self.events
                .iter()
                .rposition(|e| e.matches_slot(target_id, Some(local_event_id)))
        })
    }

    // ===== Reconciliation =====

    fn process_append(
        &mut self,
        event: TimelineEvent,
        updating_event_id: Option<&str>,
        user_id: &str,
        batch: &mut Batch,
    ) {
        if let Some(target) = event.content.redacts_event_id().map(str::to_string) {
            self.replace(&target, make_tombstone(&event), user_id, batch);
            match updating_event_id {
                Some(placeholder) => self.replace(placeholder, event, user_id, batch),
                None => self.insert(event, InsertEnd::Append, user_id, batch),
            }
        } else if let Some(target) = event.content.edits_event_id().map(str::to_string) {
            if let Some(placeholder) = updating_event_id {
                // The encrypted slot turned out to be an edit of another event
                self.remove(placeholder, batch);
            }
            self.replace(&target, event, user_id, batch);
        } else {
            match updating_event_id {
                Some(placeholder) => self.replace(placeholder, event, user_id, batch),
                None => self.insert(event, InsertEnd::Append, user_id, batch),
            }
        }
    }

    fn process_prepend(&mut self, event: TimelineEvent, user_id: &str, batch: &mut Batch) {
        if let Some(target) = event.content.redacts_event_id().map(str::to_string) {
            let tombstone = make_tombstone(&event);
            self.insert(event, InsertEnd::Prepend, user_id, batch);
            self.replace(&target, tombstone, user_id, batch);
        } else if let Some(target) = event.content.edits_event_id().map(str::to_string) {
            self.replace(&target, event, user_id, batch);
        } else {
            self.insert(event, InsertEnd::Prepend, user_id, batch);
        }
    }

    fn insert(&mut self, event: TimelineEvent, end: InsertEnd, user_id: &str, batch: &mut Batch) {
        if let Some(pos) = self.find_slot(&event.event_id, event.local_event_id.as_deref()) {
            let existing = &self.events[pos];
            if existing.event_id == event.event_id
                && event.latest_event_num <= existing.latest_event_num
            {
                debug!(event_id = %event.event_id, "Dropping duplicate delivery");
                return;
            }
            let target = existing.event_id.clone();
            self.replace(&target, event, user_id, batch);
            return;
        }

        let pos = match end {
            InsertEnd::Append => self.events.partition_point(|e| e.event_num <= event.event_num),
            InsertEnd::Prepend => self.events.partition_point(|e| e.event_num < event.event_num),
        };
        if self.events.get(pos).is_some_and(|e| e.event_num == event.event_num)
            || (pos > 0 && self.events[pos - 1].event_num == event.event_num)
        {
            warn!(
                event_id = %event.event_id,
                event_num = event.event_num,
                "Two events share an event_num"
            );
        }
        trace!(event_id = %event.event_id, pos, "Inserting event");

        self.num_by_id.insert(event.event_id.clone(), event.event_num);
        self.threads.insert_reply(&event);
        let parent = self.thread_parent_for(&event);
        batch.participation_changed |= self.threads.add_stat(&event, parent, user_id);
        self.reactions.add(&event);
        batch.added.push(event.event_id.clone());

        let event_id = event.event_id.clone();
        self.events.insert(pos, event);
        self.resolve_pending(&event_id, user_id, batch);
    }

    fn replace(
        &mut self,
        target_id: &str,
        incoming: TimelineEvent,
        user_id: &str,
        batch: &mut Batch,
    ) {
        let Some(pos) = self.find_slot(target_id, incoming.local_event_id.as_deref()) else {
            self.stash_pending(target_id, incoming, batch);
            return;
        };

        let old = self.events[pos].clone();
        if incoming.latest_event_num < old.latest_event_num {
            debug!(
                target_id,
                incoming = incoming.latest_event_num,
                held = old.latest_event_num,
                "Dropping stale replacement"
            );
            batch.stale_dropped += 1;
            return;
        }
        let Some(new) = merge_replacement(&old, incoming) else {
            return;
        };

        if old.event_id != new.event_id {
            self.num_by_id.remove(&old.event_id);
            self.num_by_id.insert(new.event_id.clone(), new.event_num);
        }
        self.events[pos] = new.clone();

        batch.participation_changed |= self.threads.remove_stat(&old);
        self.threads.replace_reply(&old, &new);
        let parent = self.thread_parent_for(&new);
        batch.participation_changed |= self.threads.add_stat(&new, parent, user_id);
        self.reactions.remove(&old);
        self.reactions.add(&new);

        let id_changed = old.event_id != new.event_id;
        let new_id = new.event_id.clone();
        batch.record_replaced(old, new);
        if id_changed {
            self.resolve_pending(&new_id, user_id, batch);
        }
    }

    fn stash_pending(&mut self, target_id: &str, incoming: TimelineEvent, batch: &mut Batch) {
        match self.pending_replacements.get(target_id) {
            Some(held) if held.latest_event_num >= incoming.latest_event_num => {
                debug!(
                    target_id,
                    incoming = incoming.latest_event_num,
                    held = held.latest_event_num,
                    "Keeping earlier pending replacement"
                );
            }
            _ => {
                trace!(target_id, "Target not loaded, stashing replacement");
                self.pending_replacements
                    .insert(target_id.to_string(), incoming);
                batch.pending_stashed += 1;
            }
        }
    }

    fn resolve_pending(&mut self, event_id: &str, user_id: &str, batch: &mut Batch) {
        if let Some(pending) = self.pending_replacements.remove(event_id) {
            trace!(event_id, "Applying pending replacement");
            self.replace(event_id, pending, user_id, batch);
        }
    }

    fn remove(&mut self, event_id: &str, batch: &mut Batch) {
        let Some(pos) = self.position_of(event_id) else {
            return;
        };
        let old = self.events.remove(pos);
        self.num_by_id.remove(&old.event_id);
        batch.participation_changed |= self.threads.remove_stat(&old);
        self.threads.remove_reply(&old);
        self.reactions.remove(&old);
        batch.record_removed(old);
    }

    fn confirm(&mut self, confirmation: &TimelineEventConfirmation, batch: &mut Batch) {
        let Some(pos) = self.position_of(&confirmation.event_id) else {
            trace!(event_id = %confirmation.event_id, "Confirmation for unknown event");
            return;
        };
        let old = self.events[pos].clone();
        let slot = &mut self.events[pos];
        slot.confirmed_event_num = Some(confirmation.confirmed_event_num);
        slot.confirmed_in_block_num = Some(confirmation.confirmed_in_block_num);
        let new = slot.clone();
        self.threads.replace_reply(&old, &new);
        batch.confirmed.push(new.event_id);
    }

    /// Root event for a thread that has no stats yet
    fn thread_parent_for(&self, event: &TimelineEvent) -> Option<TimelineEvent> {
        let parent_id = event.thread_parent_id.as_deref()?;
        if self.threads.has_stats(parent_id) {
            return None;
        }
        self.get_event(parent_id).cloned()
    }
}

/// Tombstone derived from a redaction action, applied to the action's target.
fn make_tombstone(action: &TimelineEvent) -> TimelineEvent {
    let is_admin_redaction = matches!(
        action.content,
        TimelineContent::RedactionAction {
            admin_redaction: true,
            ..
        }
    );
    TimelineEvent {
        content: TimelineContent::Redacted { is_admin_redaction },
        fallback_content: REDACTED_FALLBACK.to_string(),
        is_redacted: true,
        ..action.clone()
    }
}

fn can_replace(prev: &TimelineEvent, next: &TimelineEvent) -> bool {
    if matches!(
        next.content,
        TimelineContent::Redacted {
            is_admin_redaction: true
        }
    ) {
        return true;
    }
    if next.sender.id == prev.sender.id {
        return true;
    }
    info!(
        event_id = %prev.event_id,
        sender = %prev.sender.id,
        replacer = %next.sender.id,
        "Ignoring replacement from a different sender"
    );
    false
}

/// Merge a replacement into the slot it supersedes. Identity, position and
/// aggregation links stay with the slot; content comes from the replacement.
/// Returns `None` when the replacement is not allowed.
fn merge_replacement(prev: &TimelineEvent, next: TimelineEvent) -> Option<TimelineEvent> {
    if !can_replace(prev, &next) {
        return None;
    }
    let confirmed_event_num = prev.confirmed_event_num.or(next.confirmed_event_num);
    let confirmed_in_block_num = prev.confirmed_in_block_num.or(next.confirmed_in_block_num);
    let event_id = if is_local_event_id(&prev.event_id) {
        next.event_id.clone()
    } else {
        prev.event_id.clone()
    };

    let merged = if let (Some(prev_message), true) =
        (prev.content.as_message(), next.content.as_message().is_some())
    {
        let thread_id = prev_message.thread_id.clone();
        let mut next = next;
        if let TimelineContent::ChannelMessage(message) = &mut next.content {
            message.thread_id = thread_id;
        }
        TimelineEvent {
            event_id,
            local_event_id: next.local_event_id.clone().or(prev.local_event_id.clone()),
            event_num: prev.event_num,
            latest_event_id: next.event_id.clone(),
            latest_event_num: next.event_num,
            confirmed_event_num,
            confirmed_in_block_num,
            created_at_ms: prev.created_at_ms,
            updated_at_ms: Some(next.created_at_ms),
            thread_parent_id: prev.thread_parent_id.clone(),
            reaction_parent_id: prev.reaction_parent_id.clone(),
            sender: prev.sender.clone(),
            ..next
        }
    } else if next.is_redacted {
        // Redaction keeps the links so aggregates can subtract the old entry
        TimelineEvent {
            event_id: prev.event_id.clone(),
            local_event_id: prev.local_event_id.clone(),
            event_num: prev.event_num,
            latest_event_id: next.event_id.clone(),
            latest_event_num: next.event_num,
            confirmed_event_num,
            confirmed_in_block_num,
            created_at_ms: prev.created_at_ms,
            updated_at_ms: Some(next.created_at_ms),
            thread_parent_id: prev.thread_parent_id.clone(),
            reaction_parent_id: prev.reaction_parent_id.clone(),
            ..next
        }
    } else if prev.is_redacted {
        TimelineEvent {
            latest_event_id: next.event_id,
            latest_event_num: next.event_num,
            confirmed_event_num,
            confirmed_in_block_num,
            ..prev.clone()
        }
    } else {
        TimelineEvent {
            event_id,
            local_event_id: next.local_event_id.clone().or(prev.local_event_id.clone()),
            event_num: prev.event_num,
            latest_event_id: next.event_id.clone(),
            latest_event_num: next.event_num,
            confirmed_event_num,
            confirmed_in_block_num,
            created_at_ms: prev.created_at_ms,
            updated_at_ms: Some(next.created_at_ms),
            ..next
        }
    };
    Some(merged)
}

/// Sub-store holding every stream's timeline.
#[derive(Debug, Default)]
pub struct TimelineStore {
    streams: HashMap<String, StreamTimeline>,
    /// Newest event per sender across all streams
    latest_event_by_user: HashMap<String, TimelineEvent>,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
        self.latest_event_by_user.clear();
    }

    // ===== Getters =====

    pub fn has_stream(&self, stream_id: &str) -> bool {
        self.streams.contains_key(stream_id)
    }

    pub fn stream_ids(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn stream(&self, stream_id: &str) -> Option<&StreamTimeline> {
        self.streams.get(stream_id)
    }

    pub fn get_timeline(&self, stream_id: &str) -> &[TimelineEvent] {
        self.streams
            .get(stream_id)
            .map(|s| s.events())
            .unwrap_or(&[])
    }

    pub fn get_event(&self, stream_id: &str, event_id: &str) -> Option<&TimelineEvent> {
        self.streams.get(stream_id)?.get_event(event_id)
    }

    pub fn get_thread_stats(&self, stream_id: &str) -> Option<&HashMap<String, ThreadStats>> {
        self.streams.get(stream_id).map(|s| s.threads().stats())
    }

    pub fn get_thread(&self, stream_id: &str, parent_id: &str) -> &[TimelineEvent] {
        self.streams
            .get(stream_id)
            .map(|s| s.threads().get_thread(parent_id))
            .unwrap_or(&[])
    }

    pub fn get_reactions(&self, stream_id: &str) -> Option<&HashMap<String, MessageReactions>> {
        self.streams.get(stream_id).map(|s| s.reactions().all())
    }

    pub fn get_latest_event_by_user(&self, user_id: &str) -> Option<&TimelineEvent> {
        self.latest_event_by_user.get(user_id)
    }

    fn stream_mut(&mut self, stream_id: &str) -> Result<&mut StreamTimeline, StoreError> {
        self.streams
            .get_mut(stream_id)
            .ok_or_else(|| StoreError::StreamNotInitialized(stream_id.to_string()))
    }

    // ===== Mutations =====

    pub fn initialize_stream(&mut self, stream_id: &str) {
        if !self.streams.contains_key(stream_id) {
            info!(stream_id, "Initializing stream timeline");
            self.streams
                .insert(stream_id.to_string(), StreamTimeline::new());
        }
    }

    pub fn reset(&mut self, stream_ids: &[String]) {
        for stream_id in stream_ids {
            if self.streams.remove(stream_id).is_some() {
                info!(stream_id = %stream_id, "Reset stream timeline");
            }
        }
    }

    /// Events newer than everything held, applied in input order.
    pub fn append_events(
        &mut self,
        user_id: &str,
        stream_id: &str,
        events: Vec<TimelineEvent>,
    ) -> Result<TimelineDiff, StoreError> {
        let mut batch = Batch::default();
        let stream = self.stream_mut(stream_id)?;
        let mut seen = Vec::with_capacity(events.len());
        for event in events {
            seen.push(event.clone());
            stream.process_append(event, None, user_id, &mut batch);
        }
        let diff = batch.into_diff(stream_id, stream);
        self.track_latest(seen);
        Ok(diff)
    }

    /// Older events from backfill, given oldest first.
    pub fn prepend_events(
        &mut self,
        user_id: &str,
        stream_id: &str,
        events: Vec<TimelineEvent>,
    ) -> Result<TimelineDiff, StoreError> {
        let mut batch = Batch::default();
        let stream = self.stream_mut(stream_id)?;
        let mut seen = Vec::with_capacity(events.len());
        for event in events.into_iter().rev() {
            seen.push(event.clone());
            stream.process_prepend(event, user_id, &mut batch);
        }
        let diff = batch.into_diff(stream_id, stream);
        self.track_latest(seen);
        Ok(diff)
    }

    /// Events whose content changed in place, such as after decryption.
    pub fn update_events(
        &mut self,
        user_id: &str,
        stream_id: &str,
        events: Vec<TimelineEvent>,
    ) -> Result<TimelineDiff, StoreError> {
        let mut batch = Batch::default();
        let stream = self.stream_mut(stream_id)?;
        let mut seen = Vec::with_capacity(events.len());
        for event in events {
            seen.push(event.clone());
            let placeholder = event.event_id.clone();
            stream.process_append(event, Some(&placeholder), user_id, &mut batch);
        }
        let diff = batch.into_diff(stream_id, stream);
        self.track_latest(seen);
        Ok(diff)
    }

    /// Replace the slot held by `placeholder_id` with `event`.
    pub fn update_event(
        &mut self,
        user_id: &str,
        stream_id: &str,
        event: TimelineEvent,
        placeholder_id: &str,
    ) -> Result<TimelineDiff, StoreError> {
        let mut batch = Batch::default();
        let stream = self.stream_mut(stream_id)?;
        let seen = event.clone();
        stream.process_append(event, Some(placeholder_id), user_id, &mut batch);
        let diff = batch.into_diff(stream_id, stream);
        self.track_latest(vec![seen]);
        Ok(diff)
    }

    pub fn confirm_events(
        &mut self,
        stream_id: &str,
        confirmations: &[TimelineEventConfirmation],
    ) -> Result<TimelineDiff, StoreError> {
        let mut batch = Batch::default();
        let stream = self.stream_mut(stream_id)?;
        for confirmation in confirmations {
            stream.confirm(confirmation, &mut batch);
        }
        Ok(batch.into_diff(stream_id, stream))
    }

    fn track_latest(&mut self, events: Vec<TimelineEvent>) {
        for event in events {
            let newer = self
                .latest_event_by_user
                .get(&event.sender.id)
                .map_or(true, |prev| prev.created_at_ms < event.created_at_ms);
            if newer {
                self.latest_event_by_user
                    .insert(event.sender.id.clone(), event);
            }
        }
    }
}
