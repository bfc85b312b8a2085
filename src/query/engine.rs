/// Caller-facing query surface: last, max, min, average and percent views
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::ResultCache;
use crate::error::{RatesError, Result};
use crate::storage::RateStore;
use crate::sync::RateSynchronizer;
use crate::types::{AggregateMode, Coin, SyncMode, TitleCheck};
use crate::utils::CallGuard;

/// One of the five read shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Last,
    Aggregate(AggregateMode),
}

impl QueryOp {
    pub fn name(&self) -> &'static str {
        match self {
            QueryOp::Last => "last",
            QueryOp::Aggregate(mode) => mode.as_str(),
        }
    }

    /// An empty percent result means "no hour-old sample yet", not missing data
    fn empty_is_not_found(&self) -> bool {
        !matches!(self, QueryOp::Aggregate(AggregateMode::Percent))
    }
}

impl std::str::FromStr for QueryOp {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last" => Ok(QueryOp::Last),
            other => other.parse().map(QueryOp::Aggregate),
        }
    }
}

pub struct RateQueryService {
    store: Arc<dyn RateStore>,
    synchronizer: Arc<RateSynchronizer>,
    cache: Option<Arc<ResultCache>>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl RateQueryService {
    pub fn new(store: Arc<dyn RateStore>, synchronizer: Arc<RateSynchronizer>) -> Self {
        RateQueryService {
            store,
            synchronizer,
            cache: None,
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Abort in-flight queries when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Per-call deadline covering resolution, gap-fill and read
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn get_last(&self, titles: &[String]) -> Result<Vec<Coin>> {
        self.query(QueryOp::Last, titles).await
    }

    pub async fn get_max(&self, titles: &[String]) -> Result<Vec<Coin>> {
        self.query(QueryOp::Aggregate(AggregateMode::Max), titles).await
    }

    pub async fn get_min(&self, titles: &[String]) -> Result<Vec<Coin>> {
        self.query(QueryOp::Aggregate(AggregateMode::Min), titles).await
    }

    pub async fn get_average(&self, titles: &[String]) -> Result<Vec<Coin>> {
        self.query(QueryOp::Aggregate(AggregateMode::Average), titles).await
    }

    pub async fn get_percent(&self, titles: &[String]) -> Result<Vec<Coin>> {
        self.query(QueryOp::Aggregate(AggregateMode::Percent), titles).await
    }

    /// Resolve titles, gap-fill once if some are unknown, then read
    pub async fn query(&self, op: QueryOp, titles: &[String]) -> Result<Vec<Coin>> {
        validate_titles(titles)?;

        if let Some(cache) = &self.cache {
            if let Some(coins) = cache.get(op.name(), titles).await {
                return Ok(coins);
            }
        }

        let guard = CallGuard::new(self.cancel.clone(), self.timeout);

        let check = self.synchronizer.resolve_guarded(titles, &guard).await?;
        if let TitleCheck::Partial { missing } = check {
            info!("Gap-filling {:?} before {} query", missing, op.name());
            self.synchronizer
                .synchronize_guarded(SyncMode::GapFill(missing), &guard)
                .await?;
        }

        let coins = match op {
            QueryOp::Last => guard.run("read latest", self.store.latest(titles)).await?,
            QueryOp::Aggregate(mode) => {
                guard
                    .run("read aggregate", self.store.aggregate(titles, mode))
                    .await?
            }
        };

        if coins.is_empty() && op.empty_is_not_found() {
            return Err(RatesError::NotFound(format!(
                "no {} rates for {}",
                op.name(),
                titles.join(",")
            )));
        }

        debug!("{} query over {:?} returned {} coins", op.name(), titles, coins.len());

        if let Some(cache) = &self.cache {
            cache.put(op.name(), titles, coins.clone()).await;
        }

        Ok(coins)
    }
}

fn validate_titles(titles: &[String]) -> Result<()> {
    if titles.is_empty() {
        return Err(RatesError::InvalidParam("titles are empty".to_string()));
    }

    if titles.iter().any(|t| t.is_empty()) {
        return Err(RatesError::InvalidParam("coin name is empty".to_string()));
    }

    Ok(())
}
