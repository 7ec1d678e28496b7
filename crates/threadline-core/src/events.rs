use serde::{Deserialize, Serialize};

use crate::models::{FullyReadMarker, RawEvent, TimelineEventConfirmation};

/// Events in one stream change notification from the sync transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChange {
    /// Older history, oldest first
    #[serde(default)]
    pub prepended: Vec<RawEvent>,
    #[serde(default)]
    pub appended: Vec<RawEvent>,
    /// New versions of events already delivered (decryption, local status)
    #[serde(default)]
    pub updated: Vec<RawEvent>,
    #[serde(default)]
    pub confirmed: Vec<TimelineEventConfirmation>,
}

/// Inbound notifications, in the order the transport produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    StreamInitialized {
        stream_id: String,
        #[serde(default)]
        events: Vec<RawEvent>,
    },
    StreamUpdated {
        stream_id: String,
        change: StreamChange,
    },
    /// A local event changed; `placeholder_id` is the id it had before
    LocalEventUpdated {
        stream_id: String,
        placeholder_id: String,
        event: RawEvent,
    },
    StreamsRemoved {
        stream_ids: Vec<String>,
    },
    RemoteMarkers {
        markers: Vec<FullyReadMarker>,
    },
}

/// Outbound notifications for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    TimelineChanged { stream_id: String },
    /// Markers of these channels changed
    MarkersChanged { channel_ids: Vec<String> },
    /// Space or DM rollups were recomputed and differ from the last ones
    RollupsChanged,
}
