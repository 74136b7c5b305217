use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use logging::init_tracing;
pub use settings::{
    AccountSettings, BrokerSettings, FilterSettings, LoggingSettings, ObservationSettings,
    OrderSettings, QuoteSeriesSettings, ScheduledOrderSettings, Settings,
};

/// Prefix of environment variables overriding file values,
/// e.g. `LEDGERLINE__BROKER__DEFAULT_NUMERAIRE=USD`.
pub const ENV_PREFIX: &str = "LEDGERLINE";

/// Loads the run configuration from a TOML file, applying environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Settings` struct
    let settings = builder.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}

/// Parses a configuration held in memory. Environment overrides are not applied.
pub fn load_config_from_str(toml: &str) -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}
