/// Tracing subscriber construction from the `[logging]` config section
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::error::{RatesError, Result};
use crate::types::LoggingConfig;

/// Build (but do not install) the process subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn build_subscriber(config: &LoggingConfig) -> Result<Box<dyn Subscriber + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            RatesError::Config(format!("bad log level {}: {}", config.level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json {
        Ok(Box::new(builder.json().finish()))
    } else {
        Ok(Box::new(builder.finish()))
    }
}

/// Install the subscriber globally; fails if one is already set
pub fn init(config: &LoggingConfig) -> Result<()> {
    let subscriber = build_subscriber(config)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| RatesError::Config(format!("logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_plain_and_json_subscribers() {
        let plain = LoggingConfig {
            level: "debug".to_string(),
            json: false,
        };
        assert!(build_subscriber(&plain).is_ok());

        let json = LoggingConfig {
            level: "coinrates=info,warn".to_string(),
            json: true,
        };
        let subscriber = build_subscriber(&json).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("scoped subscriber accepts events");
        });
    }
}
