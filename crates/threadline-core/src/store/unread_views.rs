//! Space and DM level unread rollups, recomputed from the full marker map.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::timeline_store::TimelineStore;
use crate::models::{FullyReadMarker, OwnershipMetadata, StreamKind};

/// Pre-aggregated unread state for the space list and the DM list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnreadRollups {
    /// Every known space has an entry, muted ones stay false
    pub space_has_unread: BTreeMap<String, bool>,
    pub space_mention_count: BTreeMap<String, u32>,
    pub space_unread_channel_ids: BTreeMap<String, BTreeSet<String>>,
    pub dm_unread_channel_ids: BTreeSet<String>,
}

impl UnreadRollups {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Getters =====

    pub fn space_has_unread(&self, space_id: &str) -> bool {
        self.space_has_unread.get(space_id).copied().unwrap_or(false)
    }

    pub fn space_mentions(&self, space_id: &str) -> u32 {
        self.space_mention_count.get(space_id).copied().unwrap_or(0)
    }

    pub fn space_unread_channels(&self, space_id: &str) -> Option<&BTreeSet<String>> {
        self.space_unread_channel_ids.get(space_id)
    }

    pub fn has_unread_dms(&self) -> bool {
        !self.dm_unread_channel_ids.is_empty()
    }

    fn mark_space(&mut self, space_id: &str, mentions: u32) {
        self.space_has_unread.insert(space_id.to_string(), true);
        *self
            .space_mention_count
            .entry(space_id.to_string())
            .or_insert(0) += mentions;
    }
}

/// Scan every marker and fold it into its space or the DM set.
///
/// Muted channels and channels of muted spaces contribute nothing. Thread
/// markers only count when the local user participates in the thread.
pub fn compute_rollups(
    markers: &HashMap<String, FullyReadMarker>,
    timelines: &TimelineStore,
    ownership: &OwnershipMetadata,
) -> UnreadRollups {
    let mut rollups = UnreadRollups::new();
    for space_id in ownership.space_channels.keys() {
        rollups.space_has_unread.insert(space_id.clone(), false);
        rollups.space_mention_count.insert(space_id.clone(), 0);
        rollups
            .space_unread_channel_ids
            .insert(space_id.clone(), BTreeSet::new());
    }

    for marker in markers.values() {
        if !marker.is_unread {
            continue;
        }
        let channel_id = marker.channel_id.as_str();
        if ownership.is_muted(channel_id) {
            continue;
        }
        if let Some(parent_id) = marker.thread_parent_id.as_deref() {
            let participating = timelines
                .get_thread_stats(channel_id)
                .and_then(|stats| stats.get(parent_id))
                .is_some_and(|stats| stats.is_participating);
            if !participating {
                continue;
            }
        }

        if StreamKind::from_stream_id(channel_id).is_direct_message() {
            rollups.dm_unread_channel_ids.insert(channel_id.to_string());
            continue;
        }
        let Some(space_id) = ownership.space_for_channel(channel_id) else {
            continue;
        };
        if ownership.is_muted(space_id) {
            continue;
        }
        rollups.mark_space(space_id, marker.mentions);
        // thread markers light up the space but not the channel row
        if !marker.is_thread() {
            rollups
                .space_unread_channel_ids
                .entry(space_id.to_string())
                .or_default()
                .insert(channel_id.to_string());
        }
    }
    rollups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::marker_store::MarkerStore;
    use crate::store::test_helpers::*;

    const SPACE: &str = "10space";
    const GENERAL: &str = "20general";
    const RANDOM: &str = "20random";
    const DM: &str = "88dm";

    struct Fixture {
        timelines: TimelineStore,
        markers: MarkerStore,
    }

    impl Fixture {
        fn new() -> Self {
            let mut timelines = TimelineStore::new();
            for stream_id in [GENERAL, RANDOM, DM] {
                timelines.initialize_stream(stream_id);
            }
            Self {
                timelines,
                markers: MarkerStore::new(),
            }
        }

        fn append(&mut self, stream_id: &str, events: Vec<crate::models::TimelineEvent>) {
            let diff = self
                .timelines
                .append_events(LOCAL_USER, stream_id, events)
                .unwrap();
            self.markers
                .diff_and_update(LOCAL_USER, self.timelines.get_timeline(stream_id), &diff);
        }

        fn rollups(&self, ownership: &OwnershipMetadata) -> UnreadRollups {
            compute_rollups(self.markers.markers(), &self.timelines, ownership)
        }
    }

    fn ownership() -> OwnershipMetadata {
        OwnershipMetadata::new().with_space(SPACE, [GENERAL, RANDOM])
    }

    #[test]
    fn test_space_rollup() {
        let mut f = Fixture::new();
        f.append(GENERAL, vec![mentioning("m1", 1, "alice", "hi bob", LOCAL_USER)]);
        f.append(RANDOM, vec![message("m2", 1, "carol", "lunch?")]);

        let rollups = f.rollups(&ownership());
        assert!(rollups.space_has_unread(SPACE));
        assert_eq!(rollups.space_mentions(SPACE), 1);
        let channels: Vec<_> = rollups.space_unread_channels(SPACE).unwrap().iter().collect();
        assert_eq!(channels, vec![GENERAL, RANDOM]);
        assert!(!rollups.has_unread_dms());
    }

    #[test]
    fn test_read_space_has_entry() {
        let mut f = Fixture::new();
        f.append(GENERAL, vec![message("m1", 1, LOCAL_USER, "hello")]);
        let rollups = f.rollups(&ownership());
        assert_eq!(rollups.space_has_unread.get(SPACE), Some(&false));
        assert_eq!(rollups.space_mentions(SPACE), 0);
    }

    #[test]
    fn test_muted_channel_and_space() {
        let mut f = Fixture::new();
        f.append(GENERAL, vec![mentioning("m1", 1, "alice", "hi bob", LOCAL_USER)]);
        f.append(RANDOM, vec![message("m2", 1, "carol", "lunch?")]);

        let rollups = f.rollups(&ownership().with_muted(GENERAL));
        assert_eq!(rollups.space_mentions(SPACE), 0);
        assert_eq!(rollups.space_unread_channels(SPACE).unwrap().len(), 1);

        let rollups = f.rollups(&ownership().with_muted(SPACE));
        assert!(!rollups.space_has_unread(SPACE));
        assert!(rollups.space_unread_channels(SPACE).unwrap().is_empty());
    }

    #[test]
    fn test_thread_counts_only_when_participating() {
        let mut f = Fixture::new();
        f.append(GENERAL, vec![message("root", 1, "alice", "start")]);
        f.markers.mark_read(GENERAL, None, 1);
        f.append(GENERAL, vec![reply("r1", 2, "carol", "re", "root")]);

        let rollups = f.rollups(&ownership());
        assert!(!rollups.space_has_unread(SPACE));

        f.append(GENERAL, vec![reply("r2", 3, LOCAL_USER, "me too", "root")]);
        f.append(GENERAL, vec![mentioning_reply("r3", 4, "carol", "bob?", "root", LOCAL_USER)]);
        let rollups = f.rollups(&ownership());
        assert!(rollups.space_has_unread(SPACE));
        assert_eq!(rollups.space_mentions(SPACE), 1);
        // the channel row itself is read
        assert!(rollups.space_unread_channels(SPACE).unwrap().is_empty());
    }

    #[test]
    fn test_dm_rollup() {
        let mut f = Fixture::new();
        f.append(DM, vec![message("d1", 1, "alice", "psst")]);
        let rollups = f.rollups(&ownership());
        assert!(rollups.dm_unread_channel_ids.contains(DM));

        f.markers.mark_read(DM, None, 5);
        assert!(!f.rollups(&ownership()).has_unread_dms());
    }
}
