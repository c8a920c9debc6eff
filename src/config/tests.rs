use std::fs;

use serial_test::serial;

use super::settings::Settings;
use super::{RoleSettings, load_config, load_config_from};

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 5157);
    assert_eq!(settings.client.retry_backoff_ms, 2000);
    assert_eq!(settings.client.wait_probe_interval_ms, 5000);
    assert_eq!(settings.client.producer_interval_ms, 2000);
    assert_eq!(settings.client.consumer_interval_ms, 1000);
    assert_eq!(settings.client.sequence_file, None);

    let binding = &settings.channels[0];
    assert_eq!(binding.producer_id, "IntProducer1");
    assert_eq!(binding.consumer_id, "IntConsumer1");
    assert_eq!(binding.producer.rate_limit, 5);
    assert_eq!(binding.producer.retry_number, 3);
    assert_eq!(binding.consumer.rate_limit, 2);
    assert_eq!(binding.consumer.retry_number, 3);
}

#[test]
fn test_retry_policy_from_role() {
    let settings = Settings::default();
    let role = RoleSettings {
        capability: "log".to_string(),
        rate_limit: 1,
        retry_number: 7,
    };

    let policy = settings.client.retry_policy(&role);
    assert_eq!(policy.retry_number, 7);
    assert_eq!(policy.backoff.as_millis(), 2000);
    assert_eq!(policy.probe_interval.as_millis(), 5000);
}

#[test]
#[serial]
fn test_shipped_config_matches_defaults() {
    let loaded = load_config().unwrap();
    let defaults = Settings::default();

    assert_eq!(loaded.server.port, defaults.server.port);
    assert_eq!(loaded.client.broker_url, defaults.client.broker_url);
    assert_eq!(loaded.channels, defaults.channels);
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        r#"
[server]
port = 6000

[client]
sequence_file = "producer_sequence.json"

[[channels]]
producer_id = "UuidProducer1"
consumer_id = "LogConsumer1"
producer = { capability = "uuid", rate_limit = 1, retry_number = 2 }
consumer = { capability = "log", rate_limit = 1, retry_number = 4 }
"#,
    )
    .unwrap();

    let settings = load_config_from(path.to_str()).unwrap();

    assert_eq!(settings.server.port, 6000);
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(
        settings.client.sequence_file.as_deref(),
        Some("producer_sequence.json")
    );
    assert_eq!(settings.client.retry_backoff_ms, 2000);
    assert_eq!(settings.channels.len(), 1);
    assert_eq!(settings.channels[0].producer.capability, "uuid");
    assert_eq!(settings.channels[0].consumer.retry_number, 4);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    assert!(load_config_from(path.to_str()).is_err());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    temp_env::with_vars(
        [
            ("SEQMQ__SERVER__PORT", Some("9000")),
            ("SEQMQ__CLIENT__RETRY_BACKOFF_MS", Some("50")),
        ],
        || {
            let settings = load_config().unwrap();
            assert_eq!(settings.server.port, 9000);
            assert_eq!(settings.client.retry_backoff_ms, 50);
            assert_eq!(settings.client.wait_probe_interval_ms, 5000);
        },
    );
}
