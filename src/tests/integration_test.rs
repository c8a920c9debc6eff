use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::message::ChannelKey;
use crate::broker::{Broker, SharedBroker};
use crate::client::runtime::{run_consumers, run_producers};
use crate::client::{CapabilityRegistry, Consumer, Producer};
use crate::config::{ChannelBinding, RoleSettings, Settings};
use crate::persistence::{DurableStore, PersistenceHandle, spawn_writer};
use crate::transport::serve;

#[derive(Default)]
struct Counting {
    next: AtomicI64,
}

impl Producer for Counting {
    fn produce(&self) -> Value {
        Value::from(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Default)]
struct Recording {
    seen: Mutex<Vec<i64>>,
}

impl Consumer for Recording {
    fn consume(&self, payload: &Value) {
        if let Some(value) = payload.as_i64() {
            self.seen.lock().unwrap().push(value);
        }
    }
}

impl Recording {
    fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

struct RunningBroker {
    broker: SharedBroker,
    persistence: PersistenceHandle,
    cancel: CancellationToken,
    server: JoinHandle<()>,
    addr: SocketAddr,
}

impl RunningBroker {
    async fn start(dir: &Path, addr: &str) -> Self {
        let store = DurableStore::open(dir).unwrap();
        let (persistence, _writer) = spawn_writer(store.clone());
        let broker = Broker::recover(&store, persistence.clone()).into_shared();
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, broker.clone(), cancel.clone()));
        Self {
            broker,
            persistence,
            cancel,
            server,
            addr,
        }
    }

    fn pending(&self, key: &ChannelKey) -> usize {
        self.broker.lock().unwrap().pending(key).len()
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.server.await.unwrap();
        // Let open connections finish their last request.
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.persistence.flush().await.unwrap();
    }
}

fn settings(addr: SocketAddr) -> Settings {
    let mut settings = Settings::default();
    settings.client.broker_url = format!("ws://{addr}");
    settings.client.request_timeout_ms = 1000;
    settings.client.retry_backoff_ms = 20;
    settings.client.wait_probe_interval_ms = 50;
    settings.client.producer_interval_ms = 10;
    settings.client.consumer_interval_ms = 5;
    settings.channels = vec![ChannelBinding {
        producer_id: "CountProducer1".to_string(),
        consumer_id: "RecordConsumer1".to_string(),
        producer: RoleSettings {
            capability: "count".to_string(),
            rate_limit: 1,
            retry_number: 3,
        },
        consumer: RoleSettings {
            capability: "record".to_string(),
            rate_limit: 1,
            retry_number: 3,
        },
    }];
    settings
}

fn registry(recording: &Arc<Recording>) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register_producer("count", |_| Arc::new(Counting::default()));
    let recording = recording.clone();
    registry.register_consumer("record", move |_| recording.clone());
    registry
}

fn spawn_producers(
    settings: &Settings,
    registry: &CapabilityRegistry,
    cancel: &CancellationToken,
) -> JoinHandle<()> {
    let (settings, registry, cancel) = (settings.clone(), registry.clone(), cancel.clone());
    tokio::spawn(async move { run_producers(&settings, &registry, cancel).await.unwrap() })
}

fn spawn_consumers(
    settings: &Settings,
    registry: &CapabilityRegistry,
    cancel: &CancellationToken,
) -> JoinHandle<()> {
    let (settings, registry, cancel) = (settings.clone(), registry.clone(), cancel.clone());
    tokio::spawn(async move { run_consumers(&settings, &registry, cancel).await.unwrap() })
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn assert_consecutive(seen: &[i64]) {
    for (index, value) in seen.iter().enumerate() {
        assert_eq!(*value, index as i64, "delivery order broken: {seen:?}");
    }
}

#[tokio::test]
async fn integration_producer_to_consumer_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let broker = RunningBroker::start(dir.path(), "127.0.0.1:0").await;
    let settings = settings(broker.addr);
    let recording = Arc::new(Recording::default());
    let registry = registry(&recording);
    let clients = CancellationToken::new();

    let producers = spawn_producers(&settings, &registry, &clients);
    let consumers = spawn_consumers(&settings, &registry, &clients);

    wait_until(|| recording.len() >= 20).await;
    clients.cancel();
    producers.await.unwrap();
    consumers.await.unwrap();
    broker.stop().await;

    assert_consecutive(&recording.seen.lock().unwrap());
}

#[tokio::test]
async fn integration_broker_restart_loses_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let key = ChannelKey::new("CountProducer1", "RecordConsumer1");
    let first = RunningBroker::start(dir.path(), "127.0.0.1:0").await;
    let addr = first.addr;
    let settings = settings(addr);
    let recording = Arc::new(Recording::default());
    let registry = registry(&recording);
    let clients = CancellationToken::new();

    let producers = spawn_producers(&settings, &registry, &clients);
    wait_until(|| first.pending(&key) >= 5).await;
    first.stop().await;

    // Producers fall back to retrying and wait mode while the broker is away.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let second = RunningBroker::start(dir.path(), &addr.to_string()).await;
    assert!(second.pending(&key) >= 5);

    let consumers = spawn_consumers(&settings, &registry, &clients);
    wait_until(|| recording.len() >= 15).await;
    clients.cancel();
    producers.await.unwrap();
    consumers.await.unwrap();
    second.stop().await;

    assert_consecutive(&recording.seen.lock().unwrap());
}
