/// Configuration loading from TOML file
use std::path::Path;
use crate::error::{Result, RatesError};
use crate::types::Config;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RatesError::Config(format!("Failed to read config file: {}", e)))?;
    
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| RatesError::Config(format!("Failed to parse config: {}", e)))?;
    
    // Validate config
    validate_config(&config)?;
    
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    // Upstream client
    if config.client.url.is_empty() {
        return Err(RatesError::InvalidParam("client.url is empty".to_string()));
    }
    
    if config.client.exchange_rates.is_empty() {
        return Err(RatesError::InvalidParam("client.exchange_rates is empty".to_string()));
    }
    
    // Storage
    if config.database.path.is_empty() {
        return Err(RatesError::InvalidParam("database.path is empty".to_string()));
    }
    
    if config.database.pool_size == 0 {
        return Err(RatesError::InvalidParam("database.pool_size must be >= 1".to_string()));
    }
    
    // Scheduling
    if config.service.refresh_interval_sec == 0 {
        return Err(RatesError::InvalidParam(
            "service.refresh_interval_sec must be >= 1".to_string()
        ));
    }
    
    if config.service.actual_titles.iter().any(|t| t.is_empty()) {
        return Err(RatesError::InvalidParam(
            "service.actual_titles contains an empty title".to_string()
        ));
    }
    
    Ok(())
}
