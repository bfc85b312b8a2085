/// Test doubles shared by the sync and query tests.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::error::{RatesError, Result};
use crate::provider::PriceSource;
use crate::storage::SqliteRateStore;
use crate::types::Coin;
use crate::utils::ManualClock;

/// In-memory upstream that records every request it receives
#[derive(Default)]
pub struct FakePriceSource {
    prices: Mutex<HashMap<String, f64>>,
    calls: Mutex<Vec<Vec<String>>>,
    failure: Mutex<Option<String>>,
}

impl FakePriceSource {
    pub fn with_prices(prices: &[(&str, f64)]) -> Self {
        let source = FakePriceSource::default();
        source.set_prices(prices);
        source
    }

    pub fn set_prices(&self, prices: &[(&str, f64)]) {
        let mut map = self.prices.lock().unwrap();
        for (title, cost) in prices {
            map.insert(title.to_string(), *cost);
        }
    }

    /// Make every following fetch fail with an internal error
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceSource for FakePriceSource {
    async fn fetch_prices(&self, titles: &[String]) -> Result<Vec<Coin>> {
        self.calls.lock().unwrap().push(titles.to_vec());

        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(RatesError::Internal(message));
        }

        let prices = self.prices.lock().unwrap();
        titles
            .iter()
            .map(|title| match prices.get(title) {
                Some(cost) => Coin::new(title.as_str(), *cost),
                None => Err(RatesError::NotFound(format!("titles unknown upstream: {}", title))),
            })
            .collect()
    }
}

pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn titles(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

pub fn coin(title: &str, cost: f64) -> Coin {
    Coin::new(title, cost).unwrap()
}

/// Store on a fresh temporary database; keep the `TempDir` alive for the test
pub fn temp_store(start: NaiveDateTime) -> (TempDir, Arc<SqliteRateStore>, Arc<ManualClock>) {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let store = SqliteRateStore::open(dir.path().join("rates.db"), 4)
        .unwrap()
        .with_clock(clock.clone());
    (dir, Arc::new(store), clock)
}
