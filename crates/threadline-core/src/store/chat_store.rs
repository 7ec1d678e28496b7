use std::time::Instant;

use tracing::{debug, trace, warn};

use super::debounce::Debouncer;
use super::marker_store::MarkerStore;
use super::timeline_store::{StoreError, TimelineDiff, TimelineStore};
use super::unread_views::{compute_rollups, UnreadRollups};
use crate::config::CoreConfig;
use crate::events::StreamChange;
use crate::models::{
    FullyReadMarker, OwnershipMetadata, RawEvent, StreamKind, TimelineEvent,
    TimelineEventConfirmation,
};
use crate::normalizer::normalize;
use crate::stats::SharedIngestStats;

/// What one ingest call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub timeline_changed: bool,
    pub markers_changed: bool,
    pub rejected: usize,
}

impl IngestOutcome {
    fn merge(&mut self, other: IngestOutcome) {
        self.timeline_changed |= other.timeline_changed;
        self.markers_changed |= other.markers_changed;
        self.rejected += other.rejected;
    }
}

/// Single source of truth for chat state: timelines, fully-read markers and
/// the unread rollups derived from them.
///
/// Raw events go through the normalizer, then the timeline store; every
/// resulting diff feeds the marker engine. Rollups are only recomputed when a
/// debounce tier fires, see [`ChatStore::poll_views`].
pub struct ChatStore {
    config: CoreConfig,
    timelines: TimelineStore,
    markers: MarkerStore,
    ownership: OwnershipMetadata,
    rollups: UnreadRollups,
    marker_debounce: Debouncer,
    thread_debounce: Debouncer,
    stats: SharedIngestStats,
}

impl ChatStore {
    pub fn new(config: CoreConfig) -> Self {
        Self::with_stats(config, SharedIngestStats::new())
    }

    pub fn with_stats(config: CoreConfig, stats: SharedIngestStats) -> Self {
        Self {
            marker_debounce: Debouncer::from_millis(config.marker_debounce_ms),
            thread_debounce: Debouncer::from_millis(config.thread_debounce_ms),
            config,
            timelines: TimelineStore::new(),
            markers: MarkerStore::new(),
            ownership: OwnershipMetadata::new(),
            rollups: UnreadRollups::new(),
            stats,
        }
    }

    pub fn clear(&mut self) {
        self.timelines.clear();
        self.markers.clear();
        self.rollups = UnreadRollups::new();
        self.marker_debounce.cancel();
        self.thread_debounce.cancel();
    }

    // ===== Getters =====

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn timelines(&self) -> &TimelineStore {
        &self.timelines
    }

    pub fn get_timeline(&self, stream_id: &str) -> &[TimelineEvent] {
        self.timelines.get_timeline(stream_id)
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub fn get_marker(
        &self,
        channel_id: &str,
        thread_parent_id: Option<&str>,
    ) -> Option<&FullyReadMarker> {
        self.markers.get_marker(channel_id, thread_parent_id)
    }

    pub fn ownership(&self) -> &OwnershipMetadata {
        &self.ownership
    }

    /// Rollups as of the last recompute
    pub fn rollups(&self) -> &UnreadRollups {
        &self.rollups
    }

    pub fn stats(&self) -> &SharedIngestStats {
        &self.stats
    }

    // ===== Ingest =====

    pub fn initialize_stream(
        &mut self,
        stream_id: &str,
        events: &[RawEvent],
    ) -> Result<IngestOutcome, StoreError> {
        self.timelines.initialize_stream(stream_id);
        self.append_events(stream_id, events)
    }

    pub fn append_events(
        &mut self,
        stream_id: &str,
        events: &[RawEvent],
    ) -> Result<IngestOutcome, StoreError> {
        let (events, rejected) = self.normalize_batch(stream_id, events);
        let diff = self
            .timelines
            .append_events(&self.config.user_id, stream_id, events)?;
        Ok(self.apply_diff(diff, rejected))
    }

    /// Older history, oldest first
    pub fn prepend_events(
        &mut self,
        stream_id: &str,
        events: &[RawEvent],
    ) -> Result<IngestOutcome, StoreError> {
        let (events, rejected) = self.normalize_batch(stream_id, events);
        let diff = self
            .timelines
            .prepend_events(&self.config.user_id, stream_id, events)?;
        Ok(self.apply_diff(diff, rejected))
    }

    pub fn update_events(
        &mut self,
        stream_id: &str,
        events: &[RawEvent],
    ) -> Result<IngestOutcome, StoreError> {
        let (events, rejected) = self.normalize_batch(stream_id, events);
        let diff = self
            .timelines
            .update_events(&self.config.user_id, stream_id, events)?;
        Ok(self.apply_diff(diff, rejected))
    }

    /// A local event changed state; `placeholder_id` is the id the store
    /// knows it by.
    pub fn update_local_event(
        &mut self,
        stream_id: &str,
        placeholder_id: &str,
        event: &RawEvent,
    ) -> Result<IngestOutcome, StoreError> {
        let (mut events, rejected) = self.normalize_batch(stream_id, std::slice::from_ref(event));
        let Some(event) = events.pop() else {
            // still fail fast on an unknown stream
            if !self.timelines.has_stream(stream_id) {
                return Err(StoreError::StreamNotInitialized(stream_id.to_string()));
            }
            return Ok(IngestOutcome {
                rejected,
                ..Default::default()
            });
        };
        let diff =
            self.timelines
                .update_event(&self.config.user_id, stream_id, event, placeholder_id)?;
        Ok(self.apply_diff(diff, rejected))
    }

    pub fn confirm_events(
        &mut self,
        stream_id: &str,
        confirmations: &[TimelineEventConfirmation],
    ) -> Result<IngestOutcome, StoreError> {
        let diff = self.timelines.confirm_events(stream_id, confirmations)?;
        Ok(self.apply_diff(diff, 0))
    }

    /// Apply one change notification: backfill, then new events, then
    /// updates, then confirmations.
    pub fn apply_stream_change(
        &mut self,
        stream_id: &str,
        change: &StreamChange,
    ) -> Result<IngestOutcome, StoreError> {
        let mut outcome = IngestOutcome::default();
        if !change.prepended.is_empty() {
            outcome.merge(self.prepend_events(stream_id, &change.prepended)?);
        }
        if !change.appended.is_empty() {
            outcome.merge(self.append_events(stream_id, &change.appended)?);
        }
        if !change.updated.is_empty() {
            outcome.merge(self.update_events(stream_id, &change.updated)?);
        }
        if !change.confirmed.is_empty() {
            outcome.merge(self.confirm_events(stream_id, &change.confirmed)?);
        }
        Ok(outcome)
    }

    /// Drop streams and their markers. Pending recomputes are cancelled since
    /// they were scheduled against the old state.
    pub fn reset(&mut self, stream_ids: &[String]) {
        self.timelines.reset(stream_ids);
        self.markers.reset(stream_ids);
        self.marker_debounce.cancel();
        self.thread_debounce.cancel();
    }

    fn normalize_batch(&self, stream_id: &str, raw: &[RawEvent]) -> (Vec<TimelineEvent>, usize) {
        let mut events = Vec::with_capacity(raw.len());
        let mut rejected = 0;
        for raw_event in raw {
            match normalize(raw_event, &self.config.user_id) {
                Ok(event) => {
                    trace!(stream_id, event_id = %event.event_id, kind = event.content.kind(), "Normalized event");
                    events.push(event);
                }
                Err(e) => {
                    warn!(stream_id, error = %e, "Rejected raw event");
                    self.stats.record_rejected(stream_id);
                    rejected += 1;
                }
            }
        }
        self.stats.record_normalized(stream_id, events.len() as u64);
        (events, rejected)
    }

    fn apply_diff(&mut self, diff: TimelineDiff, rejected: usize) -> IngestOutcome {
        self.stats.record_diff(&diff);
        let mut outcome = IngestOutcome {
            timeline_changed: !diff.is_empty(),
            markers_changed: false,
            rejected,
        };
        if diff.is_empty() {
            return outcome;
        }

        if StreamKind::from_stream_id(&diff.stream_id).has_unread_markers() {
            let timeline = self.timelines.get_timeline(&diff.stream_id);
            outcome.markers_changed =
                self.markers
                    .diff_and_update(&self.config.user_id, timeline, &diff);
        }
        let now = Instant::now();
        if outcome.markers_changed {
            self.marker_debounce.trigger(now);
        }
        if diff.participation_changed {
            self.thread_debounce.trigger(now);
        }
        outcome
    }

    // ===== Markers =====

    pub fn mark_read(
        &mut self,
        channel_id: &str,
        thread_parent_id: Option<&str>,
        now_ms: u64,
    ) -> bool {
        let changed = self.markers.mark_read(channel_id, thread_parent_id, now_ms);
        if changed {
            self.marker_debounce.trigger(Instant::now());
        }
        changed
    }

    pub fn apply_remote_markers(&mut self, markers: Vec<FullyReadMarker>) -> usize {
        let updated = self.markers.apply_remote_markers(markers);
        if updated > 0 {
            self.marker_debounce.trigger(Instant::now());
        }
        updated
    }

    pub fn set_ownership(&mut self, ownership: OwnershipMetadata) {
        self.ownership = ownership;
        self.marker_debounce.trigger(Instant::now());
    }

    // ===== Views =====

    /// Fire whichever debounce tiers are due. Returns true if the rollups
    /// were recomputed and changed.
    pub fn poll_views(&mut self, now: Instant) -> bool {
        let marker_due = self.marker_debounce.fire_if_due(now);
        let thread_due = self.thread_debounce.fire_if_due(now);
        if !marker_due && !thread_due {
            return false;
        }
        trace!(marker_due, thread_due, "Debounced rollup recompute");
        self.recompute_rollups()
    }

    /// Earliest pending recompute, for the host loop's wake-up
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.marker_debounce.deadline(), self.thread_debounce.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn has_pending_views(&self) -> bool {
        self.marker_debounce.is_pending() || self.thread_debounce.is_pending()
    }

    /// Recompute now, cancelling both tiers.
    pub fn flush(&mut self) -> bool {
        self.marker_debounce.cancel();
        self.thread_debounce.cancel();
        self.recompute_rollups()
    }

    fn recompute_rollups(&mut self) -> bool {
        let rollups = compute_rollups(self.markers.markers(), &self.timelines, &self.ownership);
        if rollups == self.rollups {
            return false;
        }
        debug!(
            dm_unread = rollups.dm_unread_channel_ids.len(),
            spaces = rollups.space_has_unread.len(),
            "Unread rollups changed"
        );
        self.rollups = rollups;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{RawPayload, RawPost};
    use crate::store::test_helpers::LOCAL_USER;

    const SPACE: &str = "10space";
    const CHANNEL: &str = "20general";

    fn chat_store() -> ChatStore {
        let mut store = ChatStore::new(CoreConfig::new(LOCAL_USER));
        store.initialize_stream(CHANNEL, &[]).unwrap();
        store.set_ownership(OwnershipMetadata::new().with_space(SPACE, [CHANNEL]));
        store.flush();
        store
    }

    fn post(id: &str, num: u64, sender: &str, body: &str) -> RawEvent {
        RawEvent::remote(id, num, sender, RawPayload::Post(RawPost::text(body)))
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_ingest_rejects_malformed() {
        let mut store = chat_store();
        let broken = RawEvent {
            event_id: "bad".to_string(),
            event_num: 2,
            ..Default::default()
        };
        let outcome = store
            .append_events(CHANNEL, &[post("m1", 1, "alice", "hi"), broken])
            .unwrap();

        assert_eq!(outcome.rejected, 1);
        assert!(outcome.timeline_changed);
        assert_eq!(store.get_timeline(CHANNEL).len(), 1);
        let stats = store.stats().snapshot();
        assert_eq!(stats.get(CHANNEL).rejected, 1);
        assert_eq!(stats.get(CHANNEL).normalized, 1);
    }

    #[test]
    fn test_unknown_stream_fails_fast() {
        let mut store = chat_store();
        let err = store
            .append_events("20nowhere", &[post("m1", 1, "alice", "hi")])
            .unwrap_err();
        assert_eq!(err, StoreError::StreamNotInitialized("20nowhere".to_string()));
    }

    #[test]
    fn test_rollups_wait_for_debounce() {
        let mut store = chat_store();
        let outcome = store
            .append_events(CHANNEL, &[post("m1", 1, "alice", "hi")])
            .unwrap();
        assert!(outcome.markers_changed);

        assert!(!store.rollups().space_has_unread(SPACE));
        assert!(!store.poll_views(Instant::now()));
        assert!(store.next_deadline().is_some());

        assert!(store.poll_views(later()));
        assert!(store.rollups().space_has_unread(SPACE));
        assert!(store.next_deadline().is_none());
    }

    #[test]
    fn test_mark_read_clears_rollup() {
        let mut store = chat_store();
        store
            .append_events(CHANNEL, &[post("m1", 1, "alice", "hi")])
            .unwrap();
        store.flush();
        assert!(store.rollups().space_has_unread(SPACE));

        assert!(store.mark_read(CHANNEL, None, 1_000));
        assert!(store.poll_views(later()));
        assert!(!store.rollups().space_has_unread(SPACE));
    }

    #[test]
    fn test_reset_cancels_pending_recompute() {
        let mut store = chat_store();
        store
            .append_events(CHANNEL, &[post("m1", 1, "alice", "hi")])
            .unwrap();
        assert!(store.has_pending_views());

        store.reset(&[CHANNEL.to_string()]);
        assert!(!store.has_pending_views());
        assert!(!store.poll_views(later()));
        assert!(store.get_marker(CHANNEL, None).is_none());
        assert!(store.get_timeline(CHANNEL).is_empty());
    }

    #[test]
    fn test_participation_uses_slow_tier() {
        let mut store = chat_store();
        store
            .append_events(CHANNEL, &[post("root", 1, LOCAL_USER, "start")])
            .unwrap();
        store.flush();

        let reply = RawEvent::remote(
            "r1",
            2,
            "alice",
            RawPayload::Post(RawPost::text("re").in_thread("root")),
        );
        store.append_events(CHANNEL, &[reply]).unwrap();
        let deadline = store.next_deadline().unwrap();
        // the marker tier is the earlier of the two
        assert!(deadline <= Instant::now() + Duration::from_millis(250));
        assert!(store.poll_views(later()));
        assert!(store.rollups().space_has_unread(SPACE));
    }

    #[test]
    fn test_apply_stream_change() {
        let mut store = chat_store();
        let change = StreamChange {
            prepended: vec![post("m1", 1, "alice", "old")],
            appended: vec![post("m3", 3, "alice", "new")],
            updated: vec![],
            confirmed: vec![TimelineEventConfirmation {
                event_id: "m3".to_string(),
                confirmed_event_num: 3,
                confirmed_in_block_num: 9,
            }],
        };
        let outcome = store.apply_stream_change(CHANNEL, &change).unwrap();
        assert!(outcome.timeline_changed);

        let ids: Vec<_> = store
            .get_timeline(CHANNEL)
            .iter()
            .map(|e| e.event_id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m3"]);
        assert_eq!(
            store.timelines().get_event(CHANNEL, "m3").unwrap().confirmed_in_block_num,
            Some(9)
        );
    }
}
