//! Replay a recorded sync session through the runtime and dump the resulting
//! state as JSON.
//!
//! Usage: replay_events <events.json> [config.json] [ownership.json]

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use threadline_core::models::OwnershipMetadata;
use threadline_core::tracing_setup::init_tracing;
use threadline_core::{CoreConfig, CoreRuntime, SyncEvent};
use tracing::info;

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))
}

fn main() -> Result<()> {
    init_tracing("threadline_core=info,warn")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(events_path) = args.first() else {
        bail!("usage: replay_events <events.json> [config.json] [ownership.json]");
    };
    let config = match args.get(1) {
        Some(path) => CoreConfig::from_file(path)?,
        None => CoreConfig::default(),
    };
    let ownership: OwnershipMetadata = match args.get(2) {
        Some(path) => read_json(path)?,
        None => OwnershipMetadata::default(),
    };
    let sync_events: Vec<SyncEvent> = read_json(events_path)?;

    let runtime = CoreRuntime::new(config);
    runtime.chat_store().borrow_mut().set_ownership(ownership);

    let started = Instant::now();
    let handle = runtime.handle();
    let total = sync_events.len();
    for event in sync_events {
        handle.send(event)?;
    }
    let core_events = runtime.process_pending()?;
    runtime.flush_views();
    info!(
        sync_events = total,
        core_events = core_events.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Replay finished"
    );

    let store = runtime.chat_store();
    let store = store.borrow();
    let timelines: BTreeMap<&str, _> = store
        .timelines()
        .stream_ids()
        .map(|id| (id, store.get_timeline(id)))
        .collect();
    let markers: BTreeMap<_, _> = store.markers().markers().iter().collect();
    let stats = runtime.ingest_stats().snapshot();

    let output = serde_json::json!({
        "timelines": timelines,
        "markers": markers,
        "rollups": store.rollups(),
        "ingest": {
            "normalized": stats.total.normalized,
            "rejected": stats.total.rejected,
            "stale_dropped": stats.total.stale_dropped,
            "pending_stashed": stats.total.pending_stashed,
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
