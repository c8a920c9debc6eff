//! Process runtime for the producer and consumer roles
//!
//! Every configured channel binding contributes `rate_limit` workers for the
//! role being run. Each worker owns its own broker connection. Workers of the
//! same identity share one retry counter, and producers share the per-channel
//! sequence counters. Capabilities are resolved before anything is spawned,
//! so a misconfigured binding fails the process at startup.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::api::BrokerApi;
use crate::client::consumer::ConsumerWorker;
use crate::client::producer::{ProducerWorker, SequenceCounters};
use crate::client::registry::CapabilityRegistry;
use crate::client::resilience::{Resilience, RetryCounters};
use crate::client::ws_client::WsBrokerClient;
use crate::config::Settings;
use crate::persistence::JsonDocument;
use crate::utils::error::Result;

/// Build the producer workers for every binding in `settings`.
pub fn producer_workers(
    settings: &Settings,
    registry: &CapabilityRegistry,
    cancel: &CancellationToken,
) -> Result<Vec<ProducerWorker>> {
    let client = &settings.client;
    let counters = RetryCounters::new();
    let sequences = match &client.sequence_file {
        Some(path) => {
            info!("Producer sequence numbers kept in {path}");
            SequenceCounters::with_store(JsonDocument::beside(path))
        }
        None => SequenceCounters::new(),
    };

    let mut workers = Vec::new();
    for binding in &settings.channels {
        let role = &binding.producer;
        let producer = registry.producer(&role.capability, &binding.producer_id)?;
        let policy = client.retry_policy(role);

        for _ in 0..role.rate_limit {
            let api: Arc<dyn BrokerApi> = Arc::new(WsBrokerClient::new(
                client.broker_url.clone(),
                client.request_timeout(),
            ));
            let resilience =
                Resilience::new(api.clone(), policy.clone(), counters.clone(), cancel.clone());
            workers.push(ProducerWorker::new(
                binding.channel(),
                producer.clone(),
                api,
                sequences.clone(),
                resilience,
                client.producer_interval(),
            ));
        }
        info!(
            "Producer {} ({}) -> {} with {} workers",
            binding.producer_id, role.capability, binding.consumer_id, role.rate_limit
        );
    }
    Ok(workers)
}

/// Build the consumer workers for every binding in `settings`.
pub fn consumer_workers(
    settings: &Settings,
    registry: &CapabilityRegistry,
    cancel: &CancellationToken,
) -> Result<Vec<ConsumerWorker>> {
    let client = &settings.client;
    let counters = RetryCounters::new();

    let mut workers = Vec::new();
    for binding in &settings.channels {
        let role = &binding.consumer;
        let consumer = registry.consumer(&role.capability, &binding.consumer_id)?;
        let policy = client.retry_policy(role);

        for _ in 0..role.rate_limit {
            let api: Arc<dyn BrokerApi> = Arc::new(WsBrokerClient::new(
                client.broker_url.clone(),
                client.request_timeout(),
            ));
            let resilience =
                Resilience::new(api.clone(), policy.clone(), counters.clone(), cancel.clone());
            workers.push(ConsumerWorker::new(
                binding.channel(),
                consumer.clone(),
                api,
                resilience,
                client.consumer_interval(),
            ));
        }
        info!(
            "Consumer {} ({}) <- {} with {} workers",
            binding.consumer_id, role.capability, binding.producer_id, role.rate_limit
        );
    }
    Ok(workers)
}

/// Run every producer worker until `cancel` fires.
pub async fn run_producers(
    settings: &Settings,
    registry: &CapabilityRegistry,
    cancel: CancellationToken,
) -> Result<()> {
    let workers = producer_workers(settings, registry, &cancel)?;
    let mut set = JoinSet::new();
    for worker in workers {
        set.spawn(worker.run());
    }
    join_all("producer", set).await;
    Ok(())
}

/// Run every consumer worker until `cancel` fires.
pub async fn run_consumers(
    settings: &Settings,
    registry: &CapabilityRegistry,
    cancel: CancellationToken,
) -> Result<()> {
    let workers = consumer_workers(settings, registry, &cancel)?;
    let mut set = JoinSet::new();
    for worker in workers {
        set.spawn(worker.run());
    }
    join_all("consumer", set).await;
    Ok(())
}

async fn join_all(role: &str, mut set: JoinSet<()>) {
    if set.is_empty() {
        warn!("No {role} workers configured");
        return;
    }
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            error!("A {role} worker panicked: {e}");
        }
    }
    info!("All {role} workers stopped");
}
