mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, ChannelBinding, ClientSettings, RoleSettings, ServerSettings, Settings,
};

/// Loads the configuration from `config/default` and `SEQMQ__*` environment
/// variables, merged over `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Like `load_config`, reading `path` instead of `config/default` when given.
/// An explicit path must exist.
pub fn load_config_from(path: Option<&str>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::with_name(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let config = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix("SEQMQ").separator("__"))
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
