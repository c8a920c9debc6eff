//! Client resilience engine
//!
//! Every producer and consumer worker wraps its broker calls in
//! `Resilience::call`. The state machine per identity:
//!
//! - `Active`: last call succeeded, counter at 0.
//! - `Retrying(n)`: `n` consecutive failures; the same call is attempted
//!   again after a fixed backoff.
//! - `WaitMode`: the counter reached the retry number. The worker stops
//!   issuing its call and probes the broker on a longer interval. A successful
//!   probe resets the counter and the pending call is issued again.
//!
//! Counters are keyed by identity and shared by all workers of that identity
//! in the process, behind one mutex.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::api::BrokerApi;
use crate::utils::error::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Active,
    Retrying(u32),
    WaitMode,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Consecutive failures that switch the identity into wait mode.
    pub retry_number: u32,
    pub backoff: Duration,
    pub probe_interval: Duration,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counter {
    failures: u32,
    waiting: bool,
}

/// Consecutive-failure counters, one per client identity.
#[derive(Debug, Default, Clone)]
pub struct RetryCounters {
    inner: Arc<Mutex<HashMap<String, Counter>>>,
}

impl RetryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self, identity: &str) -> u32 {
        self.with(identity, |c| c.failures)
    }

    pub fn state(&self, identity: &str) -> WorkerState {
        self.with(identity, |c| match *c {
            Counter { waiting: true, .. } => WorkerState::WaitMode,
            Counter { failures: 0, .. } => WorkerState::Active,
            Counter { failures, .. } => WorkerState::Retrying(failures),
        })
    }

    fn record_failure(&self, identity: &str) -> u32 {
        self.with(identity, |c| {
            c.failures += 1;
            c.failures
        })
    }

    fn enter_wait_mode(&self, identity: &str) {
        self.with(identity, |c| c.waiting = true);
    }

    fn reset(&self, identity: &str) {
        self.with(identity, |c| *c = Counter::default());
    }

    fn with<R>(&self, identity: &str, f: impl FnOnce(&mut Counter) -> R) -> R {
        let mut counters = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(counters.entry(identity.to_string()).or_default())
    }
}

/// The worker was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker cancelled")]
pub struct Cancelled;

#[derive(Clone)]
pub struct Resilience {
    api: Arc<dyn BrokerApi>,
    policy: RetryPolicy,
    counters: RetryCounters,
    cancel: CancellationToken,
}

impl Resilience {
    pub fn new(
        api: Arc<dyn BrokerApi>,
        policy: RetryPolicy,
        counters: RetryCounters,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            policy,
            counters,
            cancel,
        }
    }

    /// Run `op` until it succeeds, retrying and falling into wait mode as
    /// needed. Only cancellation ends the loop without a result.
    pub async fn call<T, F, Fut>(&self, identity: &str, what: &str, mut op: F) -> Result<T, Cancelled>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        loop {
            let result = tokio::select! {
                result = op() => result,
                _ = self.cancel.cancelled() => return Err(Cancelled),
            };

            let err = match result {
                Ok(value) => {
                    self.counters.reset(identity);
                    return Ok(value);
                }
                Err(err) => err,
            };

            let failures = self.counters.record_failure(identity);
            if failures >= self.policy.retry_number {
                error!(
                    "{identity} -> {what} failed ({err}). Maximum retries ({}) reached. Entering wait mode.",
                    self.policy.retry_number
                );
                self.wait_for_broker(identity).await?;
                info!("{identity} -> Broker available again. Resuming {what}.");
            } else {
                warn!(
                    "{identity} -> {what} failed ({err}). Retrying {failures}/{}...",
                    self.policy.retry_number
                );
                self.pause(self.policy.backoff).await?;
            }
        }
    }

    /// Probe until the broker answers, then reset the identity's counter.
    pub async fn wait_for_broker(&self, identity: &str) -> Result<(), Cancelled> {
        self.counters.enter_wait_mode(identity);
        loop {
            let probe = tokio::select! {
                probe = self.api.probe() => probe,
                _ = self.cancel.cancelled() => return Err(Cancelled),
            };
            match probe {
                Ok(()) => {
                    self.counters.reset(identity);
                    return Ok(());
                }
                Err(e) => error!("{identity} -> Broker unreachable: {e}"),
            }
            self.pause(self.policy.probe_interval).await?;
        }
    }

    /// Sleep unless cancelled first.
    pub async fn pause(&self, duration: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(Cancelled),
        }
    }
}
