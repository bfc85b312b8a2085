pub mod crypto_compare;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Coin;

pub use crypto_compare::CryptoCompareClient;

/// Upstream source of current prices
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price for every requested title.
    ///
    /// Fails with `NotFound` if any requested title is unknown upstream and with
    /// an internal error on transport or decode failures.
    async fn fetch_prices(&self, titles: &[String]) -> Result<Vec<Coin>>;
}
