//! Raw protocol events as delivered by the sync transport.
//!
//! Every payload field is optional on the wire; the normalizer decides which
//! ones are required and rejects events that lack them.

use serde::{Deserialize, Serialize};

use super::timeline_event::{new_local_event_id, EventNum, Mention, Membership};

/// Send state of an event that only exists locally so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalStatus {
    Queued,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Remote hash, or a local placeholder id for unsent events
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub local_event_id: Option<String>,
    pub event_num: EventNum,
    #[serde(default)]
    pub created_at_ms: u64,
    #[serde(default)]
    pub creator_user_id: String,
    #[serde(default)]
    pub sender_display_name: Option<String>,
    #[serde(default)]
    pub sender_avatar_url: Option<String>,
    /// True once the event came back from the server
    #[serde(default)]
    pub is_remote: bool,
    /// Present only for events that have not been echoed back yet
    #[serde(default)]
    pub local_status: Option<LocalStatus>,
    #[serde(default)]
    pub confirmed_event_num: Option<EventNum>,
    #[serde(default)]
    pub miniblock_num: Option<u64>,
    #[serde(default)]
    pub payload: Option<RawPayload>,
    #[serde(default)]
    pub decryption_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub thread_preview: Option<String>,
    #[serde(default)]
    pub reply_id: Option<String>,
    #[serde(default)]
    pub reply_preview: Option<String>,
    #[serde(default)]
    pub content: Option<RawPostContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawPostContent {
    Text {
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        mentions: Vec<Mention>,
    },
    Image {
        #[serde(default)]
        title: Option<String>,
    },
    Gm {
        #[serde(default)]
        type_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "case", rename_all = "snake_case")]
pub enum RawPayload {
    Post(RawPost),
    Edit {
        #[serde(default)]
        ref_event_id: Option<String>,
        #[serde(default)]
        post: Option<RawPost>,
    },
    Reaction {
        #[serde(default)]
        ref_event_id: Option<String>,
        #[serde(default)]
        reaction: Option<String>,
    },
    Redaction {
        #[serde(default)]
        ref_event_id: Option<String>,
        #[serde(default)]
        admin: bool,
    },
    /// Ciphertext the decryption collaborator has not opened yet
    Encrypted {
        #[serde(default)]
        ref_event_id: Option<String>,
    },
    EncryptedChannelProperties,
    ChannelProperties {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        topic: Option<String>,
    },
    Membership {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        initiator_id: Option<String>,
        #[serde(default)]
        op: Option<Membership>,
        #[serde(default)]
        reason: Option<String>,
    },
    Inception {
        #[serde(default)]
        space_id: Option<String>,
    },
    ChannelCreate {
        #[serde(default)]
        channel_id: Option<String>,
    },
    Username {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
    },
    DisplayName {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        display_name: Option<String>,
    },
    SpaceImage,
    Pin {
        #[serde(default)]
        event_id: Option<String>,
    },
    Unpin {
        #[serde(default)]
        event_id: Option<String>,
    },
    KeySolicitation {
        #[serde(default)]
        device_key: Option<String>,
        #[serde(default)]
        session_ids: Vec<String>,
        #[serde(default)]
        is_new_device: bool,
    },
    KeyFulfillment {
        #[serde(default)]
        device_key: Option<String>,
        #[serde(default)]
        session_ids: Vec<String>,
        #[serde(default)]
        to: Option<String>,
    },
    MiniblockHeader {
        #[serde(default)]
        miniblock_num: u64,
        #[serde(default)]
        has_snapshot: bool,
    },
}

impl RawPost {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            thread_id: None,
            thread_preview: None,
            reply_id: None,
            reply_preview: None,
            content: Some(RawPostContent::Text {
                body: Some(body.into()),
                mentions: Vec::new(),
            }),
        }
    }

    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn mentioning(mut self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        if let Some(RawPostContent::Text { mentions, .. }) = self.content.as_mut() {
            mentions.push(Mention {
                display_name: user_id.clone(),
                user_id: Some(user_id),
                at_channel: false,
            });
        }
        self
    }
}

impl RawEvent {
    /// A remote event with the given id, position and author
    pub fn remote(
        event_id: impl Into<String>,
        event_num: EventNum,
        creator: impl Into<String>,
        payload: RawPayload,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_num,
            created_at_ms: event_num.saturating_mul(1_000),
            creator_user_id: creator.into(),
            is_remote: true,
            payload: Some(payload),
            ..Default::default()
        }
    }

    /// An outgoing event that has not been echoed back yet. The placeholder
    /// id doubles as the local id the server echo carries.
    pub fn local(event_num: EventNum, creator: impl Into<String>, payload: RawPayload) -> Self {
        let local_id = new_local_event_id();
        Self {
            event_id: local_id.clone(),
            local_event_id: Some(local_id),
            event_num,
            created_at_ms: event_num.saturating_mul(1_000),
            creator_user_id: creator.into(),
            is_remote: false,
            local_status: Some(LocalStatus::Sending),
            payload: Some(payload),
            ..Default::default()
        }
    }

    /// The server echo of a local event, carrying its local id
    pub fn echo_of(&self, event_id: impl Into<String>, event_num: EventNum) -> Self {
        Self {
            event_id: event_id.into(),
            event_num,
            created_at_ms: event_num.saturating_mul(1_000),
            is_remote: true,
            local_status: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::is_local_event_id;

    #[test]
    fn test_remote_timestamp_saturates() {
        let event = RawEvent::remote("e", u64::MAX, "alice", RawPayload::Post(RawPost::text("x")));
        assert_eq!(event.created_at_ms, u64::MAX);
        assert_eq!(event.event_num, u64::MAX);
    }

    #[test]
    fn test_local_event_carries_placeholder_id() {
        let event = RawEvent::local(7, "bob", RawPayload::Post(RawPost::text("hi")));
        assert!(is_local_event_id(&event.event_id));
        assert_eq!(event.local_event_id.as_deref(), Some(event.event_id.as_str()));
        assert_eq!(event.local_status, Some(LocalStatus::Sending));
        assert!(!event.is_remote);

        let echo = event.echo_of("hash7", 9);
        assert_eq!(echo.event_id, "hash7");
        assert_eq!(echo.local_event_id, event.local_event_id);
        assert!(echo.is_remote);
        assert_eq!(echo.local_status, None);
    }
}
