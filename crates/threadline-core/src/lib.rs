//! Local timeline event store for a chat client: normalizes raw sync events,
//! reconciles edits, redactions and local placeholders into per-stream
//! timelines, tracks fully-read markers and rolls unread state up per space.

pub mod config;
pub mod constants;
pub mod events;
pub mod models;
pub mod normalizer;
pub mod runtime;
pub mod stats;
pub mod store;
pub mod tracing_setup;

pub use config::{ConfigError, CoreConfig};
pub use events::{CoreEvent, StreamChange, SyncEvent};
pub use normalizer::{normalize, NormalizeError};
pub use runtime::{CoreHandle, CoreRuntime};
pub use store::{ChatStore, StoreError, TimelineDiff, UnreadRollups};
