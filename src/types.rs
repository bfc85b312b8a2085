/// Core type definitions for the rate service
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RatesError, Result};

/// Price of a single asset title at query time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coin {
    title: String,
    cost: f64,
    rate_percent_delta: f64,
}

impl Coin {
    /// Build a coin; the title must be non-empty and the cost strictly positive
    pub fn new(title: impl Into<String>, cost: f64) -> Result<Self> {
        let title = title.into();
        if title.is_empty() {
            return Err(RatesError::InvalidParam("coin name is empty".to_string()));
        }

        // NaN fails this check as well
        if !(cost > 0.0) {
            return Err(RatesError::InvalidParam(format!(
                "non-positive coin rate for {}: {}",
                title, cost
            )));
        }

        Ok(Coin {
            title,
            cost,
            rate_percent_delta: 0.0,
        })
    }

    pub fn with_percent_delta(mut self, delta: f64) -> Self {
        self.rate_percent_delta = delta;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Only populated by the percent-change query
    pub fn rate_percent_delta(&self) -> f64 {
        self.rate_percent_delta
    }
}

/// Aggregate views over a title's most recent day of samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateMode {
    Max,
    Min,
    Average,
    Percent,
}

impl AggregateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateMode::Max => "max",
            AggregateMode::Min => "min",
            AggregateMode::Average => "average",
            AggregateMode::Percent => "percent",
        }
    }
}

impl FromStr for AggregateMode {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max" => Ok(AggregateMode::Max),
            "min" => Ok(AggregateMode::Min),
            "average" | "avg" => Ok(AggregateMode::Average),
            "percent" => Ok(AggregateMode::Percent),
            other => Err(RatesError::InvalidAggregateParam(format!(
                "unknown aggregate mode: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AggregateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking requested titles against the known set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleCheck {
    Complete,
    Partial { missing: Vec<String> },
}

impl TitleCheck {
    pub fn exists(&self) -> bool {
        matches!(self, TitleCheck::Complete)
    }

    pub fn missing(&self) -> &[String] {
        match self {
            TitleCheck::Complete => &[],
            TitleCheck::Partial { missing } => missing,
        }
    }
}

/// Synchronization run kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Scheduled refresh of the configured (or fully known) title universe
    FullRefresh,
    /// On-demand fetch of exactly the given missing titles
    GapFill(Vec<String>),
}

impl SyncMode {
    pub fn name(&self) -> &'static str {
        match self {
            SyncMode::FullRefresh => "full-refresh",
            SyncMode::GapFill(_) => "gap-fill",
        }
    }
}

/// Sync mode name as given on the command line, before titles are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    FullRefresh,
    GapFill,
}

impl FromStr for SyncKind {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full-refresh" | "cronupdate" => Ok(SyncKind::FullRefresh),
            "gap-fill" | "lastupdate" => Ok(SyncKind::GapFill),
            other => Err(RatesError::InvalidScript(format!(
                "parameter script update rates is incorrect: {}",
                other
            ))),
        }
    }
}

/// Summary of one synchronize call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    pub mode: String,
    pub timestamp: DateTime<Utc>,
    pub titles: Vec<String>,
    pub written: usize,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    pub client: ClientConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Fixed refresh universe; empty means every known title
    #[serde(default)]
    pub actual_titles: Vec<String>,
    #[serde(default = "default_refresh_interval_sec")]
    pub refresh_interval_sec: u64,
    #[serde(default = "default_cache_ttl_min")]
    pub cache_ttl_min: u64,
    #[serde(default)]
    pub query_timeout_sec: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            actual_titles: Vec::new(),
            refresh_interval_sec: default_refresh_interval_sec(),
            cache_ttl_min: default_cache_ttl_min(),
            query_timeout_sec: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    #[serde(default)]
    pub key: String,
    pub exchange_rates: String,
    #[serde(default = "default_client_timeout_sec")]
    pub timeout_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_refresh_interval_sec() -> u64 {
    60
}

fn default_cache_ttl_min() -> u64 {
    1
}

fn default_client_timeout_sec() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_coin_rejects_invalid_input() {
        let err = Coin::new("", 1.1).unwrap_err();
        assert!(matches!(err, RatesError::InvalidParam(_)));
        assert!(err.to_string().contains("coin name is empty"));

        let err = Coin::new("BTC", -12.3).unwrap_err();
        assert!(matches!(err, RatesError::InvalidParam(_)));

        assert!(Coin::new("BTC", 0.0).is_err());
        assert!(Coin::new("BTC", f64::NAN).is_err());
    }

    #[test]
    fn test_new_coin_accepts_valid_input() {
        let coin = Coin::new("ETH", 250.467).unwrap();
        assert_eq!(coin.title(), "ETH");
        assert_eq!(coin.cost(), 250.467);
        assert_eq!(coin.rate_percent_delta(), 0.0);

        let coin = Coin::new("BTC", 0.127).unwrap().with_percent_delta(-4.77);
        assert_eq!(coin.cost(), 0.127);
        assert_eq!(coin.rate_percent_delta(), -4.77);
    }

    #[test]
    fn test_aggregate_mode_parsing() {
        assert_eq!("max".parse::<AggregateMode>().unwrap(), AggregateMode::Max);
        assert_eq!("avg".parse::<AggregateMode>().unwrap(), AggregateMode::Average);
        assert_eq!("percent".parse::<AggregateMode>().unwrap(), AggregateMode::Percent);

        let err = "median".parse::<AggregateMode>().unwrap_err();
        assert!(matches!(err, RatesError::InvalidAggregateParam(_)));
    }

    #[test]
    fn test_sync_kind_parsing() {
        assert_eq!("full-refresh".parse::<SyncKind>().unwrap(), SyncKind::FullRefresh);
        assert_eq!("gap-fill".parse::<SyncKind>().unwrap(), SyncKind::GapFill);
        assert!(matches!(
            "hourly".parse::<SyncKind>().unwrap_err(),
            RatesError::InvalidScript(_)
        ));
    }

    #[test]
    fn test_title_check_accessors() {
        assert!(TitleCheck::Complete.exists());
        assert!(TitleCheck::Complete.missing().is_empty());

        let partial = TitleCheck::Partial {
            missing: vec!["ETH".to_string()],
        };
        assert!(!partial.exists());
        assert_eq!(partial.missing(), ["ETH".to_string()]);
    }

    #[test]
    fn test_coin_serializes_with_snake_case_fields() {
        let coin = Coin::new("ADA", 81.2).unwrap();
        let json = serde_json::to_value(&coin).unwrap();
        assert_eq!(json["title"], "ADA");
        assert_eq!(json["cost"], 81.2);
        assert_eq!(json["rate_percent_delta"], 0.0);
    }
}
