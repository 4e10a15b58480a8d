mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, LogSettings, ServerSettings, Settings};
use settings::PartialSettings;

/// Prefix for environment overrides, e.g. `POPMQ_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "POPMQ";

/// Loads the configuration from `config/default` and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Loads the configuration, reading `path` instead of `config/default` when given.
///
/// Sources are layered as defaults, then the file, then `.env`, then the
/// process environment. An explicit `path` must exist.
pub fn load_config_from(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    Ok(Settings::merged(partial))
}

#[cfg(test)]
mod tests;
