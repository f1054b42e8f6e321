//! Shared runtime state for mdk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The lifecycle service
//! owns the store; this module only adds the SSE bus and build metadata.

use std::sync::Arc;
use std::time::Duration;

use mdk_db::MemoryMemoStore;
use mdk_lifecycle::LifecycleService;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BusMsg: SSE side-channel payload
// ---------------------------------------------------------------------------

/// Daemon-wide messages interleaved into every SSE stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE heartbeats and log lines.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub service: Arc<LifecycleService>,
    /// "memory" | "postgres"
    pub store_backend: &'static str,
}

impl AppState {
    pub fn new(service: Arc<LifecycleService>, store_backend: &'static str) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "mdk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            service,
            store_backend,
        }
    }

    /// Fresh in-memory store, no audit trail.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryMemoStore::new());
        Self::new(Arc::new(LifecycleService::from_store(store)), "memory")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Spawn a background task that emits a heartbeat on the bus every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
