use std::time::Duration;

use serde::Deserialize;

use crate::broker::message::ChannelKey;
use crate::client::resilience::RetryPolicy;

/// Top-level configuration settings for the application.
///
/// Includes the broker server, its storage, the client roles and the channel
/// bindings those roles run.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub client: ClientSettings,
    pub channels: Vec<ChannelBinding>,
}

/// Where the broker listens.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Broker storage settings.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    /// Directory holding the message and sequence documents.
    pub data_dir: String,
}

/// Settings shared by producer and consumer processes.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub broker_url: String,
    pub request_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub wait_probe_interval_ms: u64,
    pub producer_interval_ms: u64,
    pub consumer_interval_ms: u64,
    /// Keeps producer sequence numbers across restarts when set.
    pub sequence_file: Option<String>,
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn producer_interval(&self) -> Duration {
        Duration::from_millis(self.producer_interval_ms)
    }

    pub fn consumer_interval(&self) -> Duration {
        Duration::from_millis(self.consumer_interval_ms)
    }

    pub fn retry_policy(&self, role: &RoleSettings) -> RetryPolicy {
        RetryPolicy {
            retry_number: role.retry_number,
            backoff: Duration::from_millis(self.retry_backoff_ms),
            probe_interval: Duration::from_millis(self.wait_probe_interval_ms),
        }
    }
}

/// One producer → consumer channel and how each side runs.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChannelBinding {
    pub producer_id: String,
    pub consumer_id: String,
    pub producer: RoleSettings,
    pub consumer: RoleSettings,
}

impl ChannelBinding {
    pub fn channel(&self) -> ChannelKey {
        ChannelKey::new(self.producer_id.clone(), self.consumer_id.clone())
    }
}

/// Capability plus the two integers of a client role.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RoleSettings {
    /// Registry name of the implementation.
    pub capability: String,
    /// Number of independent workers.
    pub rate_limit: u32,
    /// Consecutive failures before wait mode.
    pub retry_number: u32,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
    pub channels: Option<Vec<ChannelBinding>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub data_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialClientSettings {
    pub broker_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
    pub wait_probe_interval_ms: Option<u64>,
    pub producer_interval_ms: Option<u64>,
    pub consumer_interval_ms: Option<u64>,
    pub sequence_file: Option<String>,
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let client = self.client.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                data_dir: broker.data_dir.unwrap_or(default.broker.data_dir),
            },
            client: ClientSettings {
                broker_url: client.broker_url.unwrap_or(default.client.broker_url),
                request_timeout_ms: client
                    .request_timeout_ms
                    .unwrap_or(default.client.request_timeout_ms),
                retry_backoff_ms: client
                    .retry_backoff_ms
                    .unwrap_or(default.client.retry_backoff_ms),
                wait_probe_interval_ms: client
                    .wait_probe_interval_ms
                    .unwrap_or(default.client.wait_probe_interval_ms),
                producer_interval_ms: client
                    .producer_interval_ms
                    .unwrap_or(default.client.producer_interval_ms),
                consumer_interval_ms: client
                    .consumer_interval_ms
                    .unwrap_or(default.client.consumer_interval_ms),
                sequence_file: client.sequence_file.or(default.client.sequence_file),
            },
            channels: self.channels.unwrap_or(default.channels),
        }
    }
}

/// Provides default values for `Settings`.
///
/// One sample channel, IntProducer1 → IntConsumer1, so a fresh checkout runs
/// end to end without a configuration file.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 5157,
            },
            broker: BrokerSettings {
                data_dir: "seqmq_data".to_string(),
            },
            client: ClientSettings {
                broker_url: "ws://127.0.0.1:5157".to_string(),
                request_timeout_ms: 5000,
                retry_backoff_ms: 2000,
                wait_probe_interval_ms: 5000,
                producer_interval_ms: 2000,
                consumer_interval_ms: 1000,
                sequence_file: None,
            },
            channels: vec![ChannelBinding {
                producer_id: "IntProducer1".to_string(),
                consumer_id: "IntConsumer1".to_string(),
                producer: RoleSettings {
                    capability: "random-int".to_string(),
                    rate_limit: 5,
                    retry_number: 3,
                },
                consumer: RoleSettings {
                    capability: "int".to_string(),
                    rate_limit: 2,
                    retry_number: 3,
                },
            }],
        }
    }
}
