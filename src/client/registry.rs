//! Capability registry
//!
//! Binds the capability names used in configuration to producer and consumer
//! implementations. The built-ins are registered by `with_builtins`;
//! embedding applications can add their own before starting the runtime.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::client::consumer::Consumer;
use crate::client::producer::Producer;
use crate::utils::error::{Result, SeqMqError};

pub type ProducerFactory = Arc<dyn Fn(&str) -> Arc<dyn Producer> + Send + Sync>;
pub type ConsumerFactory = Arc<dyn Fn(&str) -> Arc<dyn Consumer> + Send + Sync>;

#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    producers: HashMap<String, ProducerFactory>,
    consumers: HashMap<String, ConsumerFactory>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_producer("random-int", |id| Arc::new(RandomIntProducer::new(id)));
        registry.register_producer("uuid", |id| Arc::new(UuidProducer::new(id)));
        registry.register_consumer("log", |id| Arc::new(LogConsumer::new(id)));
        registry.register_consumer("int", |id| Arc::new(IntConsumer::new(id)));
        registry
    }

    pub fn register_producer<F, P>(&mut self, name: &str, factory: F)
    where
        F: Fn(&str) -> Arc<P> + Send + Sync + 'static,
        P: Producer + 'static,
    {
        self.producers.insert(
            name.to_string(),
            Arc::new(move |id: &str| -> Arc<dyn Producer> { factory(id) }),
        );
    }

    pub fn register_consumer<F, C>(&mut self, name: &str, factory: F)
    where
        F: Fn(&str) -> Arc<C> + Send + Sync + 'static,
        C: Consumer + 'static,
    {
        self.consumers.insert(
            name.to_string(),
            Arc::new(move |id: &str| -> Arc<dyn Consumer> { factory(id) }),
        );
    }

    /// Instantiate the producer capability `name` for identity `id`.
    pub fn producer(&self, name: &str, id: &str) -> Result<Arc<dyn Producer>> {
        self.producers
            .get(name)
            .map(|factory| factory(id))
            .ok_or_else(|| SeqMqError::UnknownProducer(name.to_string()))
    }

    pub fn consumer(&self, name: &str, id: &str) -> Result<Arc<dyn Consumer>> {
        self.consumers
            .get(name)
            .map(|factory| factory(id))
            .ok_or_else(|| SeqMqError::UnknownConsumer(name.to_string()))
    }
}

/// Random 32-bit integers.
pub struct RandomIntProducer {
    identity: String,
}

impl RandomIntProducer {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Producer for RandomIntProducer {
    fn produce(&self) -> serde_json::Value {
        let sample: i32 = rand::thread_rng().r#gen();
        info!("{} data {sample} is produced.", self.identity);
        serde_json::Value::from(sample)
    }
}

pub struct UuidProducer {
    identity: String,
}

impl UuidProducer {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Producer for UuidProducer {
    fn produce(&self) -> serde_json::Value {
        let sample = uuid::Uuid::new_v4().to_string();
        info!("{} data {sample} is produced.", self.identity);
        serde_json::Value::from(sample)
    }
}

/// Logs whatever arrives.
pub struct LogConsumer {
    identity: String,
}

impl LogConsumer {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Consumer for LogConsumer {
    fn consume(&self, payload: &serde_json::Value) {
        info!("{} data {payload} is consumed.", self.identity);
    }
}

/// Expects integer payloads.
pub struct IntConsumer {
    identity: String,
}

impl IntConsumer {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Consumer for IntConsumer {
    fn consume(&self, payload: &serde_json::Value) {
        match payload.as_i64() {
            Some(value) => info!("{} data {value} is consumed.", self.identity),
            None => warn!("{} expected an integer, got {payload}", self.identity),
        }
    }
}
