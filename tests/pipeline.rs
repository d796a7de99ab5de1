//! Sampler -> buffer -> uploader, driven one cycle at a time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use telemetry_node::autorange::SensitivityLevel;
use telemetry_node::buffer::SharedBuffer;
use telemetry_node::collector::{self, CollectorState};
use telemetry_node::config::NodeConfig;
use telemetry_node::domain::{Reading, SensorKind};
use telemetry_node::hal::SimulatedBus;
use telemetry_node::node::Node;
use telemetry_node::sampler::SamplerTask;
use telemetry_node::sensor::{Sensor, SensorError};
use telemetry_node::transport::{HttpTransport, Response, Transport, TransportError};
use telemetry_node::tsl2591::Tsl2591;
use telemetry_node::uploader::{UploadOutcome, UploaderTask};

// ==============================================================================
// fakes
// ==============================================================================

struct Canned {
    kind: SensorKind,
    readings: VecDeque<Reading>,
    configured: Arc<Mutex<Vec<u8>>>,
}

impl Canned {
    fn new(kind: SensorKind, readings: Vec<Reading>) -> Self {
        Self { kind, readings: readings.into(), configured: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl Sensor for Canned {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn begin(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn configure(&mut self, level: SensitivityLevel) -> Result<(), SensorError> {
        self.configured.lock().unwrap().push(level.get());
        Ok(())
    }

    fn poll(&mut self) -> Result<Reading, SensorError> {
        self.readings.pop_front().ok_or(SensorError::NoData)
    }
}

/// records every body; fails requests while `failing` is set
#[derive(Clone, Default)]
struct Recorder {
    offline: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl Transport for Recorder {
    async fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn post(&self, _url: &str, content_type: &str, body: String) -> Result<Response, TransportError> {
        assert_eq!(content_type, "application/json");
        self.bodies.lock().unwrap().push(body);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidEndpoint("connection reset".to_string()));
        }
        Ok(Response { status: 200, body: "Data received successfully".to_string() })
    }
}

fn uploader(buffer: &SharedBuffer, transport: Recorder) -> UploaderTask<Recorder> {
    UploaderTask::new(transport, buffer.clone(), "http://collector.test/data", Duration::from_secs(5))
}

// ==============================================================================
// scenarios
// ==============================================================================

#[tokio::test]
async fn test_one_cycle_end_to_end() {
    let buffer = SharedBuffer::new();
    let climate = Canned::new(SensorKind::Sht4x, vec![Reading::climate(SensorKind::Sht4x, 21.5, 40.2)]);
    // visible = 108 - 100 = 8
    let light = Canned::new(SensorKind::Tsl2591, vec![Reading::light(SensorKind::Tsl2591, 108, 100, Some(55.0))]);
    let configured = light.configured.clone();

    let mut sampler = SamplerTask::new(vec![Box::new(climate), Box::new(light)], buffer.clone(), Duration::from_secs(1));
    assert_eq!(sampler.sample_once(), 2);

    assert_eq!(
        buffer.drain().to_payload(),
        r#"[{"sensor":"SHT4x","temperature":21.5,"humidity":40.2},{"sensor":"TSL2591","lux":55.0}]"#
    );
    assert_eq!(sampler.sensitivity(), vec![(SensorKind::Tsl2591, SensitivityLevel::new(3).unwrap())]);
    assert_eq!(*configured.lock().unwrap(), vec![3]);
}

#[tokio::test]
async fn test_failed_upload_loses_batch_for_good() {
    let buffer = SharedBuffer::new();
    buffer.append(r#"{"sensor":"TSL2591","lux":1.0}"#);
    buffer.append(r#"{"sensor":"TSL2591","lux":2.0}"#);

    let transport = Recorder::default();
    transport.failing.store(true, Ordering::SeqCst);
    let task = uploader(&buffer, transport.clone());

    let outcome = task.upload_once().await;
    assert!(matches!(outcome, UploadOutcome::Failed { records: 2, .. }), "{:?}", outcome);
    assert_eq!(buffer.pending(), 0);

    // the network recovers; the lost records never come back
    transport.failing.store(false, Ordering::SeqCst);
    for _ in 0..3 {
        assert_eq!(task.upload_once().await, UploadOutcome::Empty);
    }
    assert_eq!(transport.bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_offline_cycles_accumulate_into_one_batch() {
    let buffer = SharedBuffer::new();
    let transport = Recorder::default();
    transport.offline.store(true, Ordering::SeqCst);
    let task = uploader(&buffer, transport.clone());

    buffer.append("{\"n\":1}");
    assert_eq!(task.upload_once().await, UploadOutcome::Offline);
    buffer.append("{\"n\":2}");
    assert_eq!(task.upload_once().await, UploadOutcome::Offline);

    transport.offline.store(false, Ordering::SeqCst);
    assert_eq!(task.upload_once().await, UploadOutcome::Delivered { records: 2, status: 200 });
    assert_eq!(*transport.bodies.lock().unwrap(), vec!["[{\"n\":1},{\"n\":2}]".to_string()]);
}

#[tokio::test]
async fn test_auto_range_walks_simulated_light_sensor() {
    let mut light = Tsl2591::new(SimulatedBus::new());
    light.begin().unwrap();

    let buffer = SharedBuffer::new();
    let mut sampler = SamplerTask::new(vec![Box::new(light)], buffer.clone(), Duration::from_secs(1));
    let mut levels = Vec::new();
    for _ in 0..6 {
        sampler.sample_once();
        levels.push(sampler.sensitivity()[0].1.get());
    }

    for pair in levels.windows(2) {
        assert!(pair[0].abs_diff(pair[1]) <= 1);
    }
    assert_eq!(buffer.pending(), 6);
}

#[tokio::test]
async fn test_http_upload_reaches_collector() {
    let state = Arc::new(tokio::sync::RwLock::new(CollectorState::new(16)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/data", listener.local_addr().unwrap());
    tokio::spawn(collector::serve_on(listener, state.clone()));

    let transport = HttpTransport::new(&endpoint, Duration::from_secs(5), Duration::from_secs(1)).unwrap();
    let buffer = SharedBuffer::new();
    buffer.append(&Reading::climate(SensorKind::Sht4x, 21.5, 40.2).to_record().unwrap());
    buffer.append(&Reading::light(SensorKind::Tsl2591, 108, 100, Some(55.0)).to_record().unwrap());

    let task = UploaderTask::new(transport, buffer.clone(), endpoint, Duration::from_secs(5));
    assert_eq!(task.upload_once().await, UploadOutcome::Delivered { records: 2, status: 200 });

    let snapshot = state.read().await.snapshot();
    assert_eq!(snapshot.total_received, 2);
    assert_eq!(snapshot.recent[0].entry.temperature, Some(21.5));
    assert_eq!(snapshot.recent[1].entry.lux, Some(55.0));
}

#[tokio::test]
async fn test_http_collector_rejects_malformed_body() {
    let state = Arc::new(tokio::sync::RwLock::new(CollectorState::new(16)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/data", listener.local_addr().unwrap());
    tokio::spawn(collector::serve_on(listener, state.clone()));

    let transport = HttpTransport::new(&endpoint, Duration::from_secs(5), Duration::from_secs(1)).unwrap();
    let buffer = SharedBuffer::new();
    buffer.append("{\"sensor\":");

    let task = UploaderTask::new(transport, buffer.clone(), endpoint, Duration::from_secs(5));
    assert_eq!(task.upload_once().await, UploadOutcome::Rejected { records: 1, status: 400 });
    assert_eq!(buffer.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_node_runs_both_tasks() {
    let mut config = NodeConfig::default();
    config.sampling.interval_ms = 10;
    config.upload.interval_ms = 40;

    let readings = (0..1000).map(|i| Reading::climate(SensorKind::Sht4x, i as f64, 50.0)).collect();
    let transport = Recorder::default();
    let node = Node::new(&config, vec![Box::new(Canned::new(SensorKind::Sht4x, readings))], transport.clone());

    let running = tokio::spawn(node.run());
    tokio::time::sleep(Duration::from_millis(300)).await;
    running.abort();

    let bodies = transport.bodies.lock().unwrap().clone();
    assert!(!bodies.is_empty());

    // every uploaded batch is a complete array and records arrive in sampling order
    let mut temperatures = Vec::new();
    for body in &bodies {
        let batch: Vec<serde_json::Value> = serde_json::from_str(body).unwrap();
        temperatures.extend(batch.iter().map(|v| v["temperature"].as_f64().unwrap()));
    }
    assert!(temperatures.windows(2).all(|w| w[0] < w[1]));
}
