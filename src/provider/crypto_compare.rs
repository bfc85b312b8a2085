/// CryptoCompare REST client (pricemultifull endpoint)
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::PriceSource;
use crate::error::{RatesError, Result};
use crate::types::{ClientConfig, Coin};

const PARAM_FROM_SYMBOLS: &str = "fsyms";
const PARAM_TO_SYMBOLS: &str = "tsyms";
const PARAM_API_KEY: &str = "api_key";

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(rename = "RAW", default)]
    raw: HashMap<String, HashMap<String, RawQuote>>,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(rename = "PRICE")]
    price: f64,
}

pub struct CryptoCompareClient {
    client: Client,
    url: String,
    key: String,
    exchange_rates: String,
}

impl CryptoCompareClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(RatesError::InvalidParam("url is empty".to_string()));
        }

        reqwest::Url::parse(&config.url)
            .map_err(|e| RatesError::InvalidParam(format!("bad client url {}: {}", config.url, e)))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_sec))
            .build()?;

        Ok(CryptoCompareClient {
            client,
            url: config.url.clone(),
            key: config.key.clone(),
            exchange_rates: config.exchange_rates.clone(),
        })
    }
}

#[async_trait]
impl PriceSource for CryptoCompareClient {
    async fn fetch_prices(&self, titles: &[String]) -> Result<Vec<Coin>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }

        info!("Requesting {} prices from CryptoCompare", titles.len());

        let mut query = vec![
            (PARAM_FROM_SYMBOLS, titles.join(",")),
            (PARAM_TO_SYMBOLS, self.exchange_rates.clone()),
        ];
        if !self.key.is_empty() {
            query.push((PARAM_API_KEY, self.key.clone()));
        }

        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(RatesError::Internal(format!(
                "CryptoCompare returned status {}",
                status
            )));
        }

        let coins = parse_prices(&body, titles, &self.exchange_rates)?;
        debug!("CryptoCompare returned {:?}", coins);

        Ok(coins)
    }
}

/// Decode a pricemultifull body into coins, in request order
fn parse_prices(body: &str, titles: &[String], exchange_rates: &str) -> Result<Vec<Coin>> {
    let response: PriceResponse = serde_json::from_str(body)?;

    let missing: Vec<&str> = titles
        .iter()
        .filter(|t| !response.raw.contains_key(t.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(RatesError::NotFound(format!(
            "titles unknown upstream: {}",
            missing.join(",")
        )));
    }

    titles
        .iter()
        .map(|title| {
            let quote = response.raw[title.as_str()].get(exchange_rates).ok_or_else(|| {
                RatesError::Internal(format!("no {} quote for {}", exchange_rates, title))
            })?;
            Coin::new(title.as_str(), quote.price)
        })
        .collect()
}
