//! Application-wide constants
//!
//! Centralized location for id prefixes, timing defaults and display strings
//! that are used across multiple modules.

/// Prefix carried by locally generated placeholder event ids
pub const LOCAL_EVENT_ID_PREFIX: &str = "~";

// Aggregation debounce defaults
/// Fast tier: recompute rollups after marker churn settles
pub const MARKER_DEBOUNCE_MS: u64 = 250;
/// Slow tier: recompute rollups after thread participation changes settle
pub const THREAD_DEBOUNCE_MS: u64 = 3_000;

// Fallback content strings
pub const REDACTED_FALLBACK: &str = "~Redacted~";
pub const DECRYPTING_FALLBACK: &str = "Decrypting...";
pub const DECRYPTING_PROPERTIES_FALLBACK: &str = "Decrypting Channel Properties...";

// Stream id prefixes used by the sync protocol
pub mod stream_prefix {
    /// Space (a group of channels)
    pub const SPACE: &str = "10";
    /// Channel inside a space
    pub const CHANNEL: &str = "20";
    /// One-to-one direct message
    pub const DM: &str = "88";
    /// Group direct message
    pub const GDM: &str = "77";
    /// Per-user stream
    pub const USER: &str = "a8";
}
