use serde::{Deserialize, Serialize};

use crate::constants::LOCAL_EVENT_ID_PREFIX;

/// Position of an event in its stream. Monotonic per stream, never reused.
pub type EventNum = u64;

/// Delivery state of an event the local user authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The event was not sent and will no longer be retried
    NotSent,
    /// The message is being encrypted
    Encrypting,
    /// The event is in the process of being sent
    Sending,
    /// The event is waiting in a queue to be sent
    Queued,
    /// The event reached the server
    Sent,
    /// The event was cancelled before it was sent
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Sender {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Gm,
}

/// A mention as it arrived over the wire. The user id is optional because
/// older clients sent display-name-only mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub user_id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub at_channel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub body: String,
    pub msg_type: MessageType,
    pub thread_id: Option<String>,
    pub thread_preview: Option<String>,
    pub reply_id: Option<String>,
    pub reply_preview: Option<String>,
    pub mentions: Vec<Mention>,
    /// Set when this message replaces the content of an earlier one
    pub edits_event_id: Option<String>,
}

impl ChannelMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            msg_type: MessageType::Text,
            thread_id: None,
            thread_preview: None,
            reply_id: None,
            reply_preview: None,
            mentions: Vec::new(),
            edits_event_id: None,
        }
    }

    /// Mention matching ignores ASCII case, ids arrive with mixed casing.
    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions.iter().any(|m| {
            m.user_id
                .as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(user_id))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Join,
    Invite,
    Leave,
    None,
}

impl Membership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Membership::Join => "join",
            Membership::Invite => "invite",
            Membership::Leave => "leave",
            Membership::None => "",
        }
    }
}

/// Content of a timeline event. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineContent {
    ChannelMessage(ChannelMessage),
    /// Message content that has not been decrypted yet
    Encrypted { error: Option<String> },
    /// Encrypted edit or redaction whose target is known before decryption
    EncryptedWithRef { ref_event_id: String },
    MessageMissing { event_id: String },
    Reaction { target_event_id: String, reaction: String },
    /// The action that removes another event's content
    RedactionAction { ref_event_id: String, admin_redaction: bool },
    /// Tombstone left in place of a redacted event
    Redacted { is_admin_redaction: bool },
    StreamMembership {
        user_id: String,
        initiator_id: String,
        membership: Membership,
        reason: Option<String>,
    },
    Inception { creator_id: String, space_id: Option<String> },
    ChannelCreate { creator_id: String, channel_id: String },
    ChannelProperties { name: Option<String>, topic: Option<String> },
    EncryptedChannelProperties { error: Option<String> },
    SpaceUsername { user_id: String, username: String },
    SpaceDisplayName { user_id: String, display_name: String },
    SpaceImage,
    Pin { user_id: String, pinned_event_id: String },
    Unpin { user_id: String, unpinned_event_id: String },
    KeySolicitation {
        device_key: String,
        session_ids: Vec<String>,
        is_new_device: bool,
    },
    Fulfillment {
        device_key: String,
        session_ids: Vec<String>,
        from: String,
        to: String,
    },
    MiniblockHeader { miniblock_num: u64, has_snapshot: bool },
}

impl TimelineContent {
    pub fn kind(&self) -> &'static str {
        match self {
            TimelineContent::ChannelMessage(_) => "channel_message",
            TimelineContent::Encrypted { .. } => "encrypted",
            TimelineContent::EncryptedWithRef { .. } => "encrypted_with_ref",
            TimelineContent::MessageMissing { .. } => "message_missing",
            TimelineContent::Reaction { .. } => "reaction",
            TimelineContent::RedactionAction { .. } => "redaction_action",
            TimelineContent::Redacted { .. } => "redacted",
            TimelineContent::StreamMembership { .. } => "stream_membership",
            TimelineContent::Inception { .. } => "inception",
            TimelineContent::ChannelCreate { .. } => "channel_create",
            TimelineContent::ChannelProperties { .. } => "channel_properties",
            TimelineContent::EncryptedChannelProperties { .. } => "encrypted_channel_properties",
            TimelineContent::SpaceUsername { .. } => "space_username",
            TimelineContent::SpaceDisplayName { .. } => "space_display_name",
            TimelineContent::SpaceImage => "space_image",
            TimelineContent::Pin { .. } => "pin",
            TimelineContent::Unpin { .. } => "unpin",
            TimelineContent::KeySolicitation { .. } => "key_solicitation",
            TimelineContent::Fulfillment { .. } => "fulfillment",
            TimelineContent::MiniblockHeader { .. } => "miniblock_header",
        }
    }

    pub fn as_message(&self) -> Option<&ChannelMessage> {
        match self {
            TimelineContent::ChannelMessage(message) => Some(message),
            _ => None,
        }
    }

    /// Id of the event this content edits, if it is an edit
    pub fn edits_event_id(&self) -> Option<&str> {
        self.as_message()?.edits_event_id.as_deref()
    }

    /// Id of the event this content redacts, if it is a redaction action
    pub fn redacts_event_id(&self) -> Option<&str> {
        match self {
            TimelineContent::RedactionAction { ref_event_id, .. } => Some(ref_event_id),
            _ => None,
        }
    }

    pub fn thread_parent_id(&self) -> Option<&str> {
        self.as_message()?.thread_id.as_deref()
    }

    pub fn reply_parent_id(&self) -> Option<&str> {
        self.as_message()?.reply_id.as_deref()
    }

    pub fn reaction_parent_id(&self) -> Option<&str> {
        match self {
            TimelineContent::Reaction { target_event_id, .. } => Some(target_event_id),
            _ => None,
        }
    }

    pub fn is_mentioned(&self, user_id: &str) -> bool {
        self.as_message()
            .is_some_and(|message| message.mentions_user(user_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_id: String,
    /// Correlates a locally created event with its remote echo
    pub local_event_id: Option<String>,
    pub event_num: EventNum,
    /// Most recent version of this logical event after edits or redaction
    pub latest_event_id: String,
    pub latest_event_num: EventNum,
    /// Only set for events the local user authored
    pub status: Option<EventStatus>,
    pub created_at_ms: u64,
    pub updated_at_ms: Option<u64>,
    pub content: TimelineContent,
    pub fallback_content: String,
    pub is_local_pending: bool,
    pub is_send_failed: bool,
    pub confirmed_event_num: Option<EventNum>,
    pub confirmed_in_block_num: Option<u64>,
    pub thread_parent_id: Option<String>,
    pub reply_parent_id: Option<String>,
    pub reaction_parent_id: Option<String>,
    pub is_mentioned: bool,
    pub is_redacted: bool,
    pub sender: Sender,
}

impl TimelineEvent {
    /// Placeholder ids are minted locally before the remote id is known.
    pub fn is_local_placeholder(&self) -> bool {
        is_local_event_id(&self.event_id)
    }

    /// Events that make a channel or thread unread: messages (decrypted or
    /// still encrypted) written by somebody else.
    pub fn is_counted_as_unread(&self, user_id: &str) -> bool {
        match self.content {
            TimelineContent::ChannelMessage(_) | TimelineContent::Encrypted { .. } => {
                self.sender.id != user_id
            }
            _ => false,
        }
    }

    /// Key of the fully-read marker this event belongs to.
    pub fn marker_key<'a>(&'a self, channel_id: &'a str) -> &'a str {
        self.thread_parent_id.as_deref().unwrap_or(channel_id)
    }

    /// Sender counted as a thread participant: message authors only.
    pub fn message_sender_id(&self) -> Option<&str> {
        match self.content {
            TimelineContent::ChannelMessage(_) => Some(&self.sender.id),
            _ => None,
        }
    }

    pub fn matches_slot(&self, target_id: &str, local_event_id: Option<&str>) -> bool {
        self.event_id == target_id
            || matches!(
                (self.local_event_id.as_deref(), local_event_id),
                (Some(ours), Some(theirs)) if ours == theirs
            )
    }
}

pub fn is_local_event_id(event_id: &str) -> bool {
    event_id.starts_with(LOCAL_EVENT_ID_PREFIX)
}

/// Mint a new local placeholder id for an event the user is about to send.
pub fn new_local_event_id() -> String {
    format!("{}{}", LOCAL_EVENT_ID_PREFIX, uuid::Uuid::new_v4().simple())
}

/// Durability confirmation for an event already in the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEventConfirmation {
    pub event_id: String,
    pub confirmed_event_num: EventNum,
    pub confirmed_in_block_num: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_event(sender: &str, content: TimelineContent) -> TimelineEvent {
        TimelineEvent {
            event_id: "e1".to_string(),
            local_event_id: None,
            event_num: 1,
            latest_event_id: "e1".to_string(),
            latest_event_num: 1,
            status: None,
            created_at_ms: 0,
            updated_at_ms: None,
            content,
            fallback_content: String::new(),
            is_local_pending: false,
            is_send_failed: false,
            confirmed_event_num: None,
            confirmed_in_block_num: None,
            thread_parent_id: None,
            reply_parent_id: None,
            reaction_parent_id: None,
            is_mentioned: false,
            is_redacted: false,
            sender: Sender::new(sender),
        }
    }

    #[test]
    fn test_mentions_ignore_ascii_case() {
        let mut message = ChannelMessage::text("hi");
        message.mentions.push(Mention {
            user_id: Some("0xBob".to_string()),
            display_name: "bob".to_string(),
            at_channel: false,
        });
        message.mentions.push(Mention {
            user_id: None,
            display_name: "carol".to_string(),
            at_channel: false,
        });

        assert!(message.mentions_user("0xbob"));
        assert!(!message.mentions_user("carol"));
    }

    #[test]
    fn test_counted_as_unread() {
        let msg = message_event("alice", TimelineContent::ChannelMessage(ChannelMessage::text("hi")));
        assert!(msg.is_counted_as_unread("bob"));
        assert!(!msg.is_counted_as_unread("alice"));

        let encrypted = message_event("alice", TimelineContent::Encrypted { error: None });
        assert!(encrypted.is_counted_as_unread("bob"));

        let reaction = message_event(
            "alice",
            TimelineContent::Reaction {
                target_event_id: "e0".to_string(),
                reaction: "👍".to_string(),
            },
        );
        assert!(!reaction.is_counted_as_unread("bob"));

        let tombstone = message_event("alice", TimelineContent::Redacted { is_admin_redaction: false });
        assert!(!tombstone.is_counted_as_unread("bob"));
    }

    #[test]
    fn test_local_event_ids() {
        let id = new_local_event_id();
        assert!(is_local_event_id(&id));
        assert!(!is_local_event_id("abc123"));
        assert_ne!(id, new_local_event_id());
    }

    #[test]
    fn test_matches_slot_by_local_id() {
        let mut event = message_event("alice", TimelineContent::SpaceImage);
        event.local_event_id = Some("local-1".to_string());

        assert!(event.matches_slot("e1", None));
        assert!(event.matches_slot("other", Some("local-1")));
        assert!(!event.matches_slot("other", Some("local-2")));
        assert!(!event.matches_slot("other", None));
    }
}
