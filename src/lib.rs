//! # SeqMQ
//!
//! `seqmq` is a small message broker that delivers sequence-numbered messages
//! in order, at least once, on each producer → consumer channel. Producers
//! may submit out of order and retry freely; the broker orders, deduplicates
//! and holds each message until the consumer acknowledges it. A message whose
//! acknowledgement is lost across a broker restart is delivered again. Broker state survives restarts through backup-swap JSON
//! documents.
//!
//! ## Core Modules
//!
//! - `broker`: Per-channel queues, the delivery sequencer and the broker engine.
//! - `client`: Producer and consumer workers, the retry/wait-mode engine and the WebSocket client.
//! - `config`: Loads layered settings with the `config` crate.
//! - `persistence`: Durable JSON documents and the background persistence worker.
//! - `transport`: The request/response protocol and the WebSocket server.
//! - `utils`: Error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
