use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::store::TimelineDiff;

/// Counts for one stream
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamIngestStats {
    pub normalized: u64,
    pub rejected: u64,
    pub stale_dropped: u64,
    pub pending_stashed: u64,
}

/// Stats for raw events fed through the normalizer and the timeline store
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub by_stream: HashMap<String, StreamIngestStats>,
    /// Totals across all streams
    pub total: StreamIngestStats,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_normalized(&mut self, stream_id: &str, count: u64) {
        self.total.normalized += count;
        self.stream_mut(stream_id).normalized += count;
    }

    pub fn record_rejected(&mut self, stream_id: &str) {
        self.total.rejected += 1;
        self.stream_mut(stream_id).rejected += 1;
    }

    pub fn record_diff(&mut self, diff: &TimelineDiff) {
        let stale = diff.stale_dropped as u64;
        let stashed = diff.pending_stashed as u64;
        self.total.stale_dropped += stale;
        self.total.pending_stashed += stashed;
        let stream = self.stream_mut(&diff.stream_id);
        stream.stale_dropped += stale;
        stream.pending_stashed += stashed;
    }

    pub fn get(&self, stream_id: &str) -> StreamIngestStats {
        self.by_stream.get(stream_id).copied().unwrap_or_default()
    }

    /// Streams sorted by rejected count (descending)
    pub fn streams_by_rejected(&self) -> Vec<(&str, u64)> {
        let mut streams: Vec<_> = self
            .by_stream
            .iter()
            .filter(|(_, s)| s.rejected > 0)
            .map(|(id, s)| (id.as_str(), s.rejected))
            .collect();
        streams.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        streams
    }

    fn stream_mut(&mut self, stream_id: &str) -> &mut StreamIngestStats {
        self.by_stream.entry(stream_id.to_string()).or_default()
    }
}

/// Thread-safe wrapper for ingest stats
#[derive(Debug, Clone, Default)]
pub struct SharedIngestStats {
    inner: Arc<RwLock<IngestStats>>,
}

impl SharedIngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_normalized(&self, stream_id: &str, count: u64) {
        self.inner.write().record_normalized(stream_id, count);
    }

    pub fn record_rejected(&self, stream_id: &str) {
        self.inner.write().record_rejected(stream_id);
    }

    pub fn record_diff(&self, diff: &TimelineDiff) {
        self.inner.write().record_diff(diff);
    }

    pub fn snapshot(&self) -> IngestStats {
        self.inner.read().clone()
    }
}
