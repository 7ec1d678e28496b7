//! Converts raw sync payloads into canonical [`TimelineEvent`]s.
//!
//! Pure functions only. Malformed payloads are rejected here with a
//! [`NormalizeError`] and never reach the store.

use crate::constants::{DECRYPTING_FALLBACK, DECRYPTING_PROPERTIES_FALLBACK, REDACTED_FALLBACK};
use crate::models::{
    is_local_event_id, ChannelMessage, EventStatus, LocalStatus, Membership, MessageType,
    RawEvent, RawPayload, RawPost, RawPostContent, Sender, TimelineContent, TimelineEvent,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Raw event has no event id")]
    MissingEventId,
    #[error("Event {event_id} has no payload")]
    MissingPayload { event_id: String },
    #[error("Event {event_id} is missing required field `{field}`")]
    MissingField { event_id: String, field: &'static str },
    #[error("Edit {event_id} carries no replacement post")]
    EmptyEdit { event_id: String },
}

/// Normalize one raw event as seen by `user_id`.
pub fn normalize(raw: &RawEvent, user_id: &str) -> Result<TimelineEvent, NormalizeError> {
    if raw.event_id.is_empty() {
        return Err(NormalizeError::MissingEventId);
    }
    let event_id = raw.event_id.as_str();
    let payload = raw
        .payload
        .as_ref()
        .ok_or_else(|| NormalizeError::MissingPayload {
            event_id: event_id.to_string(),
        })?;

    let content = to_content(raw, payload)?;

    let sender = Sender {
        id: raw.creator_user_id.clone(),
        display_name: raw
            .sender_display_name
            .clone()
            .unwrap_or_else(|| raw.creator_user_id.clone()),
        avatar_url: raw.sender_avatar_url.clone(),
    };

    let status = (sender.id == user_id).then(|| event_status(raw));
    let fallback_content = fallback_content(&sender.display_name, &content);

    Ok(TimelineEvent {
        event_id: event_id.to_string(),
        local_event_id: raw.local_event_id.clone(),
        event_num: raw.event_num,
        latest_event_id: event_id.to_string(),
        latest_event_num: raw.event_num,
        status,
        created_at_ms: raw.created_at_ms,
        updated_at_ms: None,
        fallback_content,
        is_local_pending: !raw.is_remote,
        is_send_failed: raw.local_status == Some(LocalStatus::Failed),
        confirmed_event_num: raw.confirmed_event_num,
        confirmed_in_block_num: raw.miniblock_num,
        thread_parent_id: content.thread_parent_id().map(str::to_string),
        reply_parent_id: content.reply_parent_id().map(str::to_string),
        reaction_parent_id: content.reaction_parent_id().map(str::to_string),
        is_mentioned: content.is_mentioned(user_id),
        // Redaction is applied by the store once the redaction action arrives
        is_redacted: false,
        sender,
        content,
    })
}

fn event_status(raw: &RawEvent) -> EventStatus {
    if raw.is_remote {
        return EventStatus::Sent;
    }
    match raw.local_status {
        Some(LocalStatus::Failed) => EventStatus::NotSent,
        Some(LocalStatus::Sending) => EventStatus::Sending,
        Some(LocalStatus::Sent) => EventStatus::Sent,
        Some(LocalStatus::Queued) => EventStatus::Queued,
        Some(LocalStatus::Cancelled) => EventStatus::Cancelled,
        None if is_local_event_id(&raw.event_id) => EventStatus::Encrypting,
        None => EventStatus::NotSent,
    }
}

fn required<T: Clone>(
    value: &Option<T>,
    event_id: &str,
    field: &'static str,
) -> Result<T, NormalizeError> {
    value.clone().ok_or_else(|| NormalizeError::MissingField {
        event_id: event_id.to_string(),
        field,
    })
}

fn to_content(raw: &RawEvent, payload: &RawPayload) -> Result<TimelineContent, NormalizeError> {
    let event_id = raw.event_id.as_str();
    let creator = raw.creator_user_id.clone();

    let content = match payload {
        RawPayload::Post(post) => {
            TimelineContent::ChannelMessage(to_channel_message(event_id, post, None)?)
        }
        RawPayload::Edit { ref_event_id, post } => {
            let target = required(ref_event_id, event_id, "ref_event_id")?;
            let post = post.as_ref().ok_or_else(|| NormalizeError::EmptyEdit {
                event_id: event_id.to_string(),
            })?;
            TimelineContent::ChannelMessage(to_channel_message(event_id, post, Some(target))?)
        }
        RawPayload::Reaction {
            ref_event_id,
            reaction,
        } => TimelineContent::Reaction {
            target_event_id: required(ref_event_id, event_id, "ref_event_id")?,
            reaction: required(reaction, event_id, "reaction")?,
        },
        RawPayload::Redaction {
            ref_event_id,
            admin,
        } => TimelineContent::RedactionAction {
            ref_event_id: required(ref_event_id, event_id, "ref_event_id")?,
            admin_redaction: *admin,
        },
        RawPayload::Encrypted { ref_event_id } => match ref_event_id {
            Some(ref_event_id) => TimelineContent::EncryptedWithRef {
                ref_event_id: ref_event_id.clone(),
            },
            None => TimelineContent::Encrypted {
                error: raw.decryption_error.clone(),
            },
        },
        RawPayload::EncryptedChannelProperties => TimelineContent::EncryptedChannelProperties {
            error: raw.decryption_error.clone(),
        },
        RawPayload::ChannelProperties { name, topic } => TimelineContent::ChannelProperties {
            name: name.clone(),
            topic: topic.clone(),
        },
        RawPayload::Membership {
            user_id,
            initiator_id,
            op,
            reason,
        } => TimelineContent::StreamMembership {
            user_id: required(user_id, event_id, "user_id")?,
            initiator_id: initiator_id.clone().unwrap_or(creator),
            membership: op.unwrap_or(Membership::None),
            reason: reason.clone(),
        },
        RawPayload::Inception { space_id } => TimelineContent::Inception {
            creator_id: creator,
            space_id: space_id.clone(),
        },
        RawPayload::ChannelCreate { channel_id } => TimelineContent::ChannelCreate {
            creator_id: creator,
            channel_id: required(channel_id, event_id, "channel_id")?,
        },
        RawPayload::Username { user_id, username } => TimelineContent::SpaceUsername {
            user_id: user_id.clone().unwrap_or(creator),
            username: required(username, event_id, "username")?,
        },
        RawPayload::DisplayName {
            user_id,
            display_name,
        } => TimelineContent::SpaceDisplayName {
            user_id: user_id.clone().unwrap_or(creator),
            display_name: required(display_name, event_id, "display_name")?,
        },
        RawPayload::SpaceImage => TimelineContent::SpaceImage,
        RawPayload::Pin { event_id: pinned } => TimelineContent::Pin {
            user_id: creator,
            pinned_event_id: required(pinned, event_id, "event_id")?,
        },
        RawPayload::Unpin { event_id: unpinned } => TimelineContent::Unpin {
            user_id: creator,
            unpinned_event_id: required(unpinned, event_id, "event_id")?,
        },
        RawPayload::KeySolicitation {
            device_key,
            session_ids,
            is_new_device,
        } => TimelineContent::KeySolicitation {
            device_key: required(device_key, event_id, "device_key")?,
            session_ids: session_ids.clone(),
            is_new_device: *is_new_device,
        },
        RawPayload::KeyFulfillment {
            device_key,
            session_ids,
            to,
        } => TimelineContent::Fulfillment {
            device_key: required(device_key, event_id, "device_key")?,
            session_ids: session_ids.clone(),
            from: creator,
            to: to.clone().unwrap_or_default(),
        },
        RawPayload::MiniblockHeader {
            miniblock_num,
            has_snapshot,
        } => TimelineContent::MiniblockHeader {
            miniblock_num: *miniblock_num,
            has_snapshot: *has_snapshot,
        },
    };
    Ok(content)
}

fn to_channel_message(
    event_id: &str,
    post: &RawPost,
    edits_event_id: Option<String>,
) -> Result<ChannelMessage, NormalizeError> {
    let content = required(&post.content, event_id, "content")?;
    let (body, msg_type, mentions) = match content {
        RawPostContent::Text { body, mentions } => {
            (required(&body, event_id, "body")?, MessageType::Text, mentions)
        }
        RawPostContent::Image { title } => {
            (title.unwrap_or_default(), MessageType::Image, Vec::new())
        }
        RawPostContent::Gm { type_url } => {
            (type_url.unwrap_or_default(), MessageType::Gm, Vec::new())
        }
    };

    Ok(ChannelMessage {
        body,
        msg_type,
        thread_id: post.thread_id.clone(),
        thread_preview: post.thread_preview.clone(),
        reply_id: post.reply_id.clone(),
        reply_preview: post.reply_preview.clone(),
        mentions,
        edits_event_id,
    })
}

/// Human readable one-liner for an event, used where rich rendering is not
/// available (notifications, logs, search previews).
pub fn fallback_content(sender_display_name: &str, content: &TimelineContent) -> String {
    match content {
        TimelineContent::ChannelMessage(message) => {
            format!("{}: {}", sender_display_name, message.body)
        }
        TimelineContent::Encrypted { error: Some(error) } => error.clone(),
        TimelineContent::Encrypted { error: None } => DECRYPTING_FALLBACK.to_string(),
        TimelineContent::EncryptedWithRef { ref_event_id } => {
            format!("refEventId: {}", ref_event_id)
        }
        TimelineContent::MessageMissing { event_id } => format!("eventId: {}", event_id),
        TimelineContent::Reaction {
            target_event_id,
            reaction,
        } => format!(
            "{} reacted with {} to {}",
            sender_display_name, reaction, target_event_id
        ),
        TimelineContent::RedactionAction {
            ref_event_id,
            admin_redaction,
        } => format!(
            "Redacts {} adminRedaction: {}",
            ref_event_id, admin_redaction
        ),
        TimelineContent::Redacted { .. } => REDACTED_FALLBACK.to_string(),
        TimelineContent::StreamMembership {
            user_id,
            initiator_id,
            membership,
            reason,
        } => {
            let mut text = format!(
                "[{}] userId: {} initiatorId: {}",
                membership.as_str(),
                user_id,
                initiator_id
            );
            if let Some(reason) = reason {
                text.push_str(&format!(" reason: {}", reason));
            }
            text
        }
        TimelineContent::Inception { space_id, .. } => match space_id {
            Some(space_id) => format!("spaceId: {}", space_id),
            None => String::new(),
        },
        TimelineContent::ChannelCreate { channel_id, .. } => format!("channelId: {}", channel_id),
        TimelineContent::ChannelProperties { name, topic } => format!(
            "properties: {} {}",
            name.as_deref().unwrap_or(""),
            topic.as_deref().unwrap_or("")
        ),
        TimelineContent::EncryptedChannelProperties { .. } => {
            DECRYPTING_PROPERTIES_FALLBACK.to_string()
        }
        TimelineContent::SpaceUsername { username, .. } => format!("username: {}", username),
        TimelineContent::SpaceDisplayName { display_name, .. } => {
            format!("displayName: {}", display_name)
        }
        TimelineContent::SpaceImage => "SpaceImage".to_string(),
        TimelineContent::Pin {
            user_id,
            pinned_event_id,
        } => format!("pinnedEventId: {} by: {}", pinned_event_id, user_id),
        TimelineContent::Unpin {
            user_id,
            unpinned_event_id,
        } => format!("unpinnedEventId: {} by: {}", unpinned_event_id, user_id),
        TimelineContent::KeySolicitation {
            device_key,
            session_ids,
            is_new_device,
        } => format!(
            "KeySolicitation deviceKey: {} sessionIds: {} isNewDevice: {}",
            device_key,
            session_ids.len(),
            is_new_device
        ),
        TimelineContent::Fulfillment {
            device_key,
            session_ids,
            from,
            ..
        } => {
            let ids = if session_ids.is_empty() {
                "forNewDevice: true".to_string()
            } else {
                session_ids.join(",")
            };
            format!(
                "Fulfillment from: {} to: {} count: {} sessionIds: {}",
                from,
                device_key,
                session_ids.len(),
                ids
            )
        }
        TimelineContent::MiniblockHeader {
            miniblock_num,
            has_snapshot,
        } => format!(
            "Miniblock miniblockNum:{}, hasSnapshot:{}",
            miniblock_num, has_snapshot
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message() {
        let raw = RawEvent {
            sender_display_name: Some("alice".to_string()),
            ..RawEvent::remote("event0", 1, "0xalice", RawPayload::Post(RawPost::text("hi bob!")))
        };
        let event = normalize(&raw, "0xbob").unwrap();

        assert_eq!(event.event_id, "event0");
        assert_eq!(event.latest_event_id, "event0");
        assert_eq!(event.latest_event_num, 1);
        assert_eq!(event.fallback_content, "alice: hi bob!");
        assert_eq!(event.status, None);
        assert!(!event.is_local_pending);
        assert!(!event.is_mentioned);
    }

    #[test]
    fn test_own_event_gets_status() {
        let raw = RawEvent::remote("e1", 1, "0xbob", RawPayload::Post(RawPost::text("hey")));
        assert_eq!(normalize(&raw, "0xbob").unwrap().status, Some(EventStatus::Sent));

        let local = RawEvent {
            event_id: "~abc".to_string(),
            local_event_id: Some("~abc".to_string()),
            is_remote: false,
            local_status: Some(LocalStatus::Failed),
            ..raw
        };
        let event = normalize(&local, "0xbob").unwrap();
        assert_eq!(event.status, Some(EventStatus::NotSent));
        assert!(event.is_local_pending);
        assert!(event.is_send_failed);
        assert!(event.is_local_placeholder());
    }

    #[test]
    fn test_thread_reply_mentions() {
        let post = RawPost::text("hey @bob").in_thread("root").mentioning("0xBOB");
        let raw = RawEvent::remote("e2", 2, "0xalice", RawPayload::Post(post));
        let event = normalize(&raw, "0xbob").unwrap();

        assert_eq!(event.thread_parent_id.as_deref(), Some("root"));
        assert!(event.is_mentioned);
    }

    #[test]
    fn test_edit_and_redaction() {
        let edit = RawEvent::remote(
            "e3",
            3,
            "0xalice",
            RawPayload::Edit {
                ref_event_id: Some("e1".to_string()),
                post: Some(RawPost::text("fixed")),
            },
        );
        let event = normalize(&edit, "0xbob").unwrap();
        assert_eq!(event.content.edits_event_id(), Some("e1"));

        let redaction = RawEvent::remote(
            "e4",
            4,
            "0xalice",
            RawPayload::Redaction {
                ref_event_id: Some("e1".to_string()),
                admin: false,
            },
        );
        let event = normalize(&redaction, "0xbob").unwrap();
        assert_eq!(event.content.redacts_event_id(), Some("e1"));
        assert_eq!(event.fallback_content, "Redacts e1 adminRedaction: false");
    }

    #[test]
    fn test_rejects_malformed() {
        let mut raw = RawEvent::remote("", 1, "0xalice", RawPayload::SpaceImage);
        assert_eq!(normalize(&raw, "0xbob"), Err(NormalizeError::MissingEventId));

        raw.event_id = "e1".to_string();
        raw.payload = None;
        assert!(matches!(
            normalize(&raw, "0xbob"),
            Err(NormalizeError::MissingPayload { .. })
        ));

        raw.payload = Some(RawPayload::Edit {
            ref_event_id: Some("e0".to_string()),
            post: None,
        });
        assert!(matches!(
            normalize(&raw, "0xbob"),
            Err(NormalizeError::EmptyEdit { .. })
        ));

        raw.payload = Some(RawPayload::Reaction {
            ref_event_id: None,
            reaction: Some("+1".to_string()),
        });
        assert_eq!(
            normalize(&raw, "0xbob"),
            Err(NormalizeError::MissingField {
                event_id: "e1".to_string(),
                field: "ref_event_id",
            })
        );
    }

    #[test]
    fn test_encrypted_placeholder() {
        let mut raw = RawEvent::remote("e5", 5, "0xalice", RawPayload::Encrypted { ref_event_id: None });
        let event = normalize(&raw, "0xbob").unwrap();
        assert_eq!(event.content, TimelineContent::Encrypted { error: None });
        assert_eq!(event.fallback_content, DECRYPTING_FALLBACK);
        assert!(event.is_counted_as_unread("0xbob"));

        raw.payload = Some(RawPayload::Encrypted {
            ref_event_id: Some("e1".to_string()),
        });
        let event = normalize(&raw, "0xbob").unwrap();
        assert!(matches!(event.content, TimelineContent::EncryptedWithRef { .. }));
    }
}
