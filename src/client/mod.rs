//! The `client` module holds everything a producer or consumer process runs.
//!
//! Workers talk to the broker through the `BrokerApi` contract, implemented
//! over WebSocket by `WsBrokerClient`. Every call goes through the
//! `Resilience` engine, which retries, falls into wait mode and probes the
//! broker until it comes back. The `runtime` wires configured channel
//! bindings to capabilities from the `CapabilityRegistry`.

pub mod api;
pub mod consumer;
pub mod producer;
pub mod registry;
pub mod resilience;
pub mod runtime;
pub mod ws_client;

pub use api::BrokerApi;
pub use consumer::{Consumer, ConsumerWorker};
pub use producer::{Producer, ProducerWorker, SequenceCounters};
pub use registry::CapabilityRegistry;
pub use resilience::{Resilience, RetryCounters, RetryPolicy, WorkerState};
pub use ws_client::WsBrokerClient;
