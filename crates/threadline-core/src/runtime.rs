use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::CoreConfig;
use crate::events::{CoreEvent, SyncEvent};
use crate::stats::SharedIngestStats;
use crate::store::{ChatStore, IngestOutcome};

/// Cloneable sender handed to the sync transport
#[derive(Clone)]
pub struct CoreHandle {
    sync_tx: Sender<SyncEvent>,
}

impl CoreHandle {
    pub(crate) fn new(sync_tx: Sender<SyncEvent>) -> Self {
        Self { sync_tx }
    }

    pub fn send(&self, event: SyncEvent) -> Result<(), mpsc::SendError<SyncEvent>> {
        self.sync_tx.send(event)
    }
}

pub struct CoreRuntime {
    chat_store: Rc<RefCell<ChatStore>>,
    sync_rx: Receiver<SyncEvent>,
    handle: CoreHandle,
    ingest_stats: SharedIngestStats,
    /// Notifications for events applied before a failed drain
    undelivered: RefCell<Vec<CoreEvent>>,
}

fn push_outcome(events: &mut Vec<CoreEvent>, stream_id: &str, outcome: IngestOutcome) {
    if outcome.timeline_changed {
        events.push(CoreEvent::TimelineChanged {
            stream_id: stream_id.to_string(),
        });
    }
    if outcome.markers_changed {
        events.push(CoreEvent::MarkersChanged {
            channel_ids: vec![stream_id.to_string()],
        });
    }
}

/// Apply one transport notification to the store.
pub(crate) fn process_sync_event(store: &mut ChatStore, event: SyncEvent) -> Result<Vec<CoreEvent>> {
    let mut events = Vec::new();
    match event {
        SyncEvent::StreamInitialized {
            stream_id,
            events: initial,
        } => {
            let outcome = store
                .initialize_stream(&stream_id, &initial)
                .with_context(|| format!("initializing {stream_id}"))?;
            push_outcome(&mut events, &stream_id, outcome);
        }
        SyncEvent::StreamUpdated { stream_id, change } => {
            let outcome = store
                .apply_stream_change(&stream_id, &change)
                .with_context(|| format!("updating {stream_id}"))?;
            push_outcome(&mut events, &stream_id, outcome);
        }
        SyncEvent::LocalEventUpdated {
            stream_id,
            placeholder_id,
            event,
        } => {
            let outcome = store
                .update_local_event(&stream_id, &placeholder_id, &event)
                .with_context(|| format!("updating local event {placeholder_id}"))?;
            push_outcome(&mut events, &stream_id, outcome);
        }
        SyncEvent::StreamsRemoved { stream_ids } => {
            info!(count = stream_ids.len(), "Removing streams");
            store.reset(&stream_ids);
            for stream_id in stream_ids {
                events.push(CoreEvent::TimelineChanged { stream_id });
            }
        }
        SyncEvent::RemoteMarkers { markers } => {
            let mut channel_ids: Vec<String> =
                markers.iter().map(|m| m.channel_id.clone()).collect();
            channel_ids.sort();
            channel_ids.dedup();
            if store.apply_remote_markers(markers) > 0 {
                events.push(CoreEvent::MarkersChanged { channel_ids });
            }
        }
    }
    Ok(events)
}

impl CoreRuntime {
    pub fn new(config: CoreConfig) -> Self {
        let ingest_stats = SharedIngestStats::new();
        let chat_store = ChatStore::with_stats(config, ingest_stats.clone());
        let (sync_tx, sync_rx) = mpsc::channel::<SyncEvent>();

        Self {
            chat_store: Rc::new(RefCell::new(chat_store)),
            sync_rx,
            handle: CoreHandle::new(sync_tx),
            ingest_stats,
            undelivered: RefCell::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> CoreHandle {
        self.handle.clone()
    }

    pub fn chat_store(&self) -> Rc<RefCell<ChatStore>> {
        self.chat_store.clone()
    }

    pub fn ingest_stats(&self) -> SharedIngestStats {
        self.ingest_stats.clone()
    }

    /// Drain queued sync events in arrival order. Stops at the first event
    /// the store refuses; later events stay queued. Notifications for the
    /// events applied before the failure are returned by the next call.
    pub fn process_pending(&self) -> Result<Vec<CoreEvent>> {
        let mut store = self.chat_store.borrow_mut();
        let mut events = std::mem::take(&mut *self.undelivered.borrow_mut());
        loop {
            match self.sync_rx.try_recv() {
                Ok(sync_event) => match process_sync_event(&mut store, sync_event) {
                    Ok(applied) => events.extend(applied),
                    Err(e) => {
                        *self.undelivered.borrow_mut() = events;
                        return Err(e);
                    }
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if !events.is_empty() {
            debug!(count = events.len(), "Processed sync events");
        }
        Ok(events)
    }

    /// Fire due debounce tiers
    pub fn poll_views(&self, now: Instant) -> Vec<CoreEvent> {
        if self.chat_store.borrow_mut().poll_views(now) {
            vec![CoreEvent::RollupsChanged]
        } else {
            Vec::new()
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.chat_store.borrow().next_deadline()
    }

    pub fn flush_views(&self) -> Vec<CoreEvent> {
        if self.chat_store.borrow_mut().flush() {
            vec![CoreEvent::RollupsChanged]
        } else {
            Vec::new()
        }
    }
}
