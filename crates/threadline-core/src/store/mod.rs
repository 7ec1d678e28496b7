pub mod aggregates;
pub mod chat_store;
pub mod debounce;
pub mod marker_store;
pub mod timeline_store;
pub mod unread_views;

pub use aggregates::{MessageReactions, ReactionIndex, ThreadIndex};
pub use chat_store::{ChatStore, IngestOutcome};
pub use debounce::Debouncer;
pub use marker_store::{first_unread_event, MarkerStore};
pub use timeline_store::{StoreError, StreamTimeline, TimelineDiff, TimelineStore};
pub use unread_views::{compute_rollups, UnreadRollups};

/// Event builders shared by the store tests. Everything goes through the
/// normalizer so the tests see the same shapes production does.
#[cfg(test)]
pub(crate) mod test_helpers {
    use crate::models::{EventNum, RawEvent, RawPayload, RawPost, TimelineEvent};
    use crate::normalizer::normalize;

    pub const LOCAL_USER: &str = "bob";

    pub fn build(raw: RawEvent) -> TimelineEvent {
        normalize(&raw, LOCAL_USER).unwrap()
    }

    pub fn message(id: &str, num: EventNum, sender: &str, body: &str) -> TimelineEvent {
        build(RawEvent::remote(id, num, sender, RawPayload::Post(RawPost::text(body))))
    }

    pub fn mentioning(
        id: &str,
        num: EventNum,
        sender: &str,
        body: &str,
        user_id: &str,
    ) -> TimelineEvent {
        let post = RawPost::text(body).mentioning(user_id);
        build(RawEvent::remote(id, num, sender, RawPayload::Post(post)))
    }

    pub fn reply(id: &str, num: EventNum, sender: &str, body: &str, thread: &str) -> TimelineEvent {
        let post = RawPost::text(body).in_thread(thread);
        build(RawEvent::remote(id, num, sender, RawPayload::Post(post)))
    }

    pub fn mentioning_reply(
        id: &str,
        num: EventNum,
        sender: &str,
        body: &str,
        thread: &str,
        user_id: &str,
    ) -> TimelineEvent {
        let post = RawPost::text(body).in_thread(thread).mentioning(user_id);
        build(RawEvent::remote(id, num, sender, RawPayload::Post(post)))
    }

    pub fn edit(id: &str, num: EventNum, sender: &str, target: &str, body: &str) -> TimelineEvent {
        let payload = RawPayload::Edit {
            ref_event_id: Some(target.to_string()),
            post: Some(RawPost::text(body)),
        };
        build(RawEvent::remote(id, num, sender, payload))
    }

    pub fn redaction(id: &str, num: EventNum, sender: &str, target: &str) -> TimelineEvent {
        let payload = RawPayload::Redaction {
            ref_event_id: Some(target.to_string()),
            admin: false,
        };
        build(RawEvent::remote(id, num, sender, payload))
    }

    pub fn reaction(
        id: &str,
        num: EventNum,
        sender: &str,
        target: &str,
        label: &str,
    ) -> TimelineEvent {
        let payload = RawPayload::Reaction {
            ref_event_id: Some(target.to_string()),
            reaction: Some(label.to_string()),
        };
        build(RawEvent::remote(id, num, sender, payload))
    }

    pub fn encrypted(id: &str, num: EventNum, sender: &str) -> TimelineEvent {
        build(RawEvent::remote(
            id,
            num,
            sender,
            RawPayload::Encrypted { ref_event_id: None },
        ))
    }
}
