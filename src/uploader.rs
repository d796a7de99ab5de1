//! ==============================================================================
//! uploader.rs - periodic batch upload task
//! ==============================================================================
//!
//! purpose:
//!     every upload interval: if the collector is reachable, drain the shared
//!     buffer and POST the batch as one json array.
//!
//! loss policy:
//!     the drained batch is never put back. an unreachable collector defers
//!     the drain (the buffer keeps growing), but once a batch is drained a
//!     failed or rejected request discards it for good.
//!
//! relationships:
//!     - drains: buffer.rs
//!     - uses: transport.rs (reachability probe + POST)
//!     - spawned by: node.rs
//!
//! ==============================================================================

use crate::buffer::SharedBuffer;
use crate::transport::Transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// what one upload cycle did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// collector unreachable, nothing drained
    Offline,
    /// reachable but nothing to send
    Empty,
    Delivered { records: usize, status: u16 },
    /// collector answered with a non-success status, batch discarded
    Rejected { records: usize, status: u16 },
    /// request never completed, batch discarded
    Failed { records: usize, error: String },
}

pub struct UploaderTask<T> {
    transport: T,
    buffer: SharedBuffer,
    endpoint: String,
    content_type: String,
    interval: Duration,
    reported_drops: AtomicU64,
}

impl<T: Transport> UploaderTask<T> {
    pub fn new(transport: T, buffer: SharedBuffer, endpoint: impl Into<String>, interval: Duration) -> Self {
        Self {
            transport,
            buffer,
            endpoint: endpoint.into(),
            content_type: "application/json".to_string(),
            interval,
            reported_drops: AtomicU64::new(0),
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// logs batches the byte cap threw away since the last call, returns how many
    fn report_dropped(&self) -> u64 {
        let total = self.buffer.dropped_batches();
        let new = total.saturating_sub(self.reported_drops.swap(total, Ordering::Relaxed));
        if new > 0 {
            tracing::warn!(batches = new, total, "pending records were dropped by the batch cap");
        }
        new
    }

    /// runs one upload cycle
    pub async fn upload_once(&self) -> UploadOutcome {
        self.report_dropped();
        if !self.transport.is_connected().await {
            tracing::debug!(pending = self.buffer.pending(), "collector unreachable, deferring upload");
            return UploadOutcome::Offline;
        }

        // the lock is released here, before any network i/o
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return UploadOutcome::Empty;
        }
        let records = batch.len();

        match self
            .transport
            .post(&self.endpoint, &self.content_type, batch.to_payload())
            .await
        {
            Ok(response) if response.is_success() => {
                tracing::info!(records, status = response.status, "batch delivered: {}", response.body.trim());
                UploadOutcome::Delivered { records, status: response.status }
            }
            Ok(response) => {
                tracing::error!(records, status = response.status, "collector rejected batch, discarding: {}", response.body.trim());
                UploadOutcome::Rejected { records, status: response.status }
            }
            Err(e) => {
                tracing::error!(records, "error on sending POST, discarding batch: {}", e);
                UploadOutcome::Failed { records, error: e.to_string() }
            }
        }
    }

    /// uploads forever; the first attempt comes one interval after start
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, endpoint = %self.endpoint, "uploader started");

        // interval fires immediately; skip that one so there is something to send
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.upload_once().await;
        }
    }
}
