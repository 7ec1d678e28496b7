use crate::constants::stream_prefix;

/// Kind of a stream, derived from the prefix of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Space,
    Channel,
    Dm,
    Gdm,
    User,
    Unknown,
}

impl StreamKind {
    pub fn from_stream_id(stream_id: &str) -> Self {
        if stream_id.starts_with(stream_prefix::SPACE) {
            StreamKind::Space
        } else if stream_id.starts_with(stream_prefix::CHANNEL) {
            StreamKind::Channel
        } else if stream_id.starts_with(stream_prefix::DM) {
            StreamKind::Dm
        } else if stream_id.starts_with(stream_prefix::GDM) {
            StreamKind::Gdm
        } else if stream_id.starts_with(stream_prefix::USER) {
            StreamKind::User
        } else {
            StreamKind::Unknown
        }
    }

    /// Streams whose timelines feed fully-read markers
    pub fn has_unread_markers(&self) -> bool {
        matches!(self, StreamKind::Channel | StreamKind::Dm | StreamKind::Gdm)
    }

    pub fn is_direct_message(&self) -> bool {
        matches!(self, StreamKind::Dm | StreamKind::Gdm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_kind_from_prefix() {
        assert_eq!(StreamKind::from_stream_id("10abcdef"), StreamKind::Space);
        assert_eq!(StreamKind::from_stream_id("20abcdef"), StreamKind::Channel);
        assert_eq!(StreamKind::from_stream_id("88abcdef"), StreamKind::Dm);
        assert_eq!(StreamKind::from_stream_id("77abcdef"), StreamKind::Gdm);
        assert_eq!(StreamKind::from_stream_id("a8abcdef"), StreamKind::User);
        assert_eq!(StreamKind::from_stream_id("ffabcdef"), StreamKind::Unknown);
    }

    #[test]
    fn test_marker_streams() {
        assert!(StreamKind::Channel.has_unread_markers());
        assert!(StreamKind::Gdm.has_unread_markers());
        assert!(!StreamKind::Space.has_unread_markers());
        assert!(StreamKind::Dm.is_direct_message());
        assert!(!StreamKind::Channel.is_direct_message());
    }
}
