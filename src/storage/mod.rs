/// Durable time-series persistence for rate samples.

pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AggregateMode, Coin};

pub use sqlite::SqliteRateStore;

/// Read/write surface of the rate store.
///
/// Samples are append-only: "latest" is always derived by ordering on
/// (day, time-of-day), never by overwrite. Titles with no samples are left out
/// of read results rather than reported as errors.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Append one sample per coin at the current time, all-or-nothing.
    async fn store(&self, coins: &[Coin]) -> Result<()>;

    /// Every title that has ever been stored, in first-stored order.
    async fn list_known_titles(&self) -> Result<Vec<String>>;

    /// Most recent sample per requested title.
    async fn latest(&self, titles: &[String]) -> Result<Vec<Coin>>;

    /// Aggregate over each title's most recent day having data.
    async fn aggregate(&self, titles: &[String], mode: AggregateMode) -> Result<Vec<Coin>>;
}
