//! ==============================================================================
//! collector.rs - receiving end of the upload pipeline
//! ==============================================================================
//!
//! purpose:
//!     the http service nodes post their batches to. it validates the json
//!     array, logs every entry with its arrival time and keeps a bounded
//!     history for inspection.
//!
//! endpoints:
//!     POST /data  - body is `[{"sensor": "...", <metric>: <number>, ...}, ...]`
//!     GET  /api   - the most recent entries as json
//!
//! ==============================================================================

use crate::config::CollectorConfig;
use crate::domain::timestamp_ms;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// one element of an uploaded batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorEntry {
    pub sensor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lux: Option<f64>,
    /// older firmware reported raw luminosity instead of lux
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub luminosity: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReceivedEntry {
    #[serde(flatten)]
    pub entry: SensorEntry,
    /// unix timestamp (ms) the batch arrived
    pub received_ms: u64,
}

/// what GET /api returns
#[derive(Clone, Debug, Default, Serialize)]
pub struct CollectorSnapshot {
    pub total_received: u64,
    pub recent: Vec<ReceivedEntry>,
}

#[derive(Debug)]
pub struct CollectorState {
    recent: VecDeque<ReceivedEntry>,
    capacity: usize,
    total_received: u64,
}

impl CollectorState {
    pub fn new(capacity: usize) -> Self {
        Self { recent: VecDeque::with_capacity(capacity), capacity, total_received: 0 }
    }

    pub fn record(&mut self, entries: Vec<SensorEntry>) {
        let received_ms = timestamp_ms();
        for entry in entries {
            self.total_received += 1;
            if self.capacity == 0 {
                continue;
            }
            if self.recent.len() == self.capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(ReceivedEntry { entry, received_ms });
        }
    }

    pub fn snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot {
            total_received: self.total_received,
            recent: self.recent.iter().cloned().collect(),
        }
    }
}

pub type SharedState = Arc<RwLock<CollectorState>>;

pub fn parse_batch(body: &str) -> Result<Vec<SensorEntry>, serde_json::Error> {
    serde_json::from_str(body)
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/data", post(data_handler))
        .route("/api", get(api_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /data
pub async fn data_handler(State(state): State<SharedState>, body: String) -> (StatusCode, String) {
    let entries = match parse_batch(&body) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("rejected batch: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    for entry in &entries {
        tracing::info!("Received data from {}: {:?}", entry.sensor, entry);
    }
    state.write().await.record(entries);

    (StatusCode::OK, "Data received successfully".to_string())
}

/// GET /api
async fn api_handler(State(state): State<SharedState>) -> Json<CollectorSnapshot> {
    Json(state.read().await.snapshot())
}

/// serve on an already bound listener
pub async fn serve_on(listener: tokio::net::TcpListener, state: SharedState) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn serve(config: &CollectorConfig) -> Result<()> {
    let state = Arc::new(RwLock::new(CollectorState::new(config.history)));
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!("Starting collector on {}", listener.local_addr()?);
    serve_on(listener, state).await
}
