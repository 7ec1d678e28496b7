pub mod marker;
pub mod ownership;
pub mod raw_event;
pub mod stream_id;
pub mod thread;
pub mod timeline_event;

pub use marker::FullyReadMarker;
pub use ownership::OwnershipMetadata;
pub use raw_event::{LocalStatus, RawEvent, RawPayload, RawPost, RawPostContent};
pub use stream_id::StreamKind;
pub use thread::ThreadStats;
pub use timeline_event::{
    is_local_event_id, new_local_event_id, ChannelMessage, EventNum, EventStatus, Membership,
    Mention, MessageType, Sender, TimelineContent, TimelineEvent, TimelineEventConfirmation,
};
