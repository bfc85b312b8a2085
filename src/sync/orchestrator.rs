/// Rate synchronization: known/missing title resolution, upstream fetch, persist
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{RatesError, Result};
use crate::provider::PriceSource;
use crate::storage::RateStore;
use crate::types::{SyncMode, SyncReport, TitleCheck};
use crate::utils::CallGuard;

pub struct RateSynchronizer {
    store: Arc<dyn RateStore>,
    source: Arc<dyn PriceSource>,
    /// Configured refresh universe, extended by successful gap-fills
    actual_titles: RwLock<Vec<String>>,
}

impl RateSynchronizer {
    pub fn new(
        store: Arc<dyn RateStore>,
        source: Arc<dyn PriceSource>,
        actual_titles: Vec<String>,
    ) -> Self {
        Self {
            store,
            source,
            actual_titles: RwLock::new(actual_titles),
        }
    }

    /// Split requested titles into known and missing against the store.
    ///
    /// The missing set is returned to the caller, not retained, so concurrent
    /// callers resolving different title sets never see each other's gaps.
    pub async fn resolve(&self, requested: &[String]) -> Result<TitleCheck> {
        self.resolve_guarded(requested, &CallGuard::none()).await
    }

    pub async fn resolve_guarded(&self, requested: &[String], guard: &CallGuard) -> Result<TitleCheck> {
        let known = guard
            .run("list known titles", self.store.list_known_titles())
            .await?;
        let known: HashSet<String> = known.into_iter().collect();

        let mut seen = HashSet::with_capacity(requested.len());
        let missing: Vec<String> = requested
            .iter()
            .filter(|t| !known.contains(t.as_str()) && seen.insert(t.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(TitleCheck::Complete)
        } else {
            debug!("Missing titles: {:?}", missing);
            Ok(TitleCheck::Partial { missing })
        }
    }

    pub async fn synchronize(&self, mode: SyncMode) -> Result<SyncReport> {
        self.synchronize_guarded(mode, &CallGuard::none()).await
    }

    /// Fetch and persist prices for the mode's title universe
    pub async fn synchronize_guarded(&self, mode: SyncMode, guard: &CallGuard) -> Result<SyncReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Synchronize {} ({})", mode.name(), run_id);

        let titles = match &mode {
            SyncMode::FullRefresh => self.refresh_universe(guard).await?,
            SyncMode::GapFill(missing) => missing.clone(),
        };

        let mut report = SyncReport {
            run_id,
            mode: mode.name().to_string(),
            timestamp: Utc::now(),
            titles: titles.clone(),
            written: 0,
        };

        if titles.is_empty() {
            info!("Nothing to synchronize for {}", report.mode);
            return Ok(report);
        }

        let coins = match guard
            .run("fetch upstream prices", self.source.fetch_prices(&titles))
            .await
        {
            Ok(coins) => coins,
            Err(RatesError::NotFound(msg)) => {
                return Err(RatesError::NotFound(format!(
                    "upstream has no rates for {:?}: {}",
                    titles, msg
                )));
            }
            Err(e) => {
                warn!("Upstream fetch failed for {} ({}): {}", report.mode, e.error_code(), e);
                return Err(e);
            }
        };

        guard.run("persist rates", self.store.store(&coins)).await?;
        report.written = coins.len();

        if let SyncMode::GapFill(missing) = &mode {
            self.track_titles(missing).await;
        }

        info!(
            "Synchronized {} rates ({}, run {})",
            report.written, report.mode, report.run_id
        );
        Ok(report)
    }

    /// Titles refreshed by the scheduled full refresh
    pub async fn tracked_titles(&self) -> Vec<String> {
        let titles = self.actual_titles.read().await;
        titles.clone()
    }

    async fn refresh_universe(&self, guard: &CallGuard) -> Result<Vec<String>> {
        {
            let configured = self.actual_titles.read().await;
            if !configured.is_empty() {
                return Ok(configured.clone());
            }
        }

        guard
            .run("list known titles", self.store.list_known_titles())
            .await
    }

    /// Keep freshly filled titles warm on the next scheduled refresh.
    /// With no configured universe the store's title list already covers them.
    async fn track_titles(&self, filled: &[String]) {
        let mut configured = self.actual_titles.write().await;
        if configured.is_empty() {
            return;
        }

        for title in filled {
            if !configured.contains(title) {
                configured.push(title.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{at, coin, temp_store, titles, FakePriceSource};

    #[tokio::test]
    async fn test_resolve_reports_missing_titles() {
        let (_dir, store, _) = temp_store(at(10, 9, 0));
        store.store(&[coin("BTC", 50.4)]).await.unwrap();
        let sync = RateSynchronizer::new(store, Arc::new(FakePriceSource::default()), vec![]);

        let check = sync.resolve(&titles(&["BTC", "ETH", "ETH"])).await.unwrap();
        assert!(!check.exists());
        assert_eq!(check.missing(), titles(&["ETH"]).as_slice());

        assert_eq!(sync.resolve(&titles(&["BTC"])).await.unwrap(), TitleCheck::Complete);
    }

    #[tokio::test]
    async fn test_gap_fill_fetches_exactly_missing_titles() {
        let (_dir, store, _) = temp_store(at(10, 9, 0));
        store.store(&[coin("BTC", 50.4)]).await.unwrap();
        let source = Arc::new(FakePriceSource::with_prices(&[("BTC", 51.0), ("ETH", 46.6)]));
        let sync = RateSynchronizer::new(store.clone(), source.clone(), vec![]);

        let check = sync.resolve(&titles(&["BTC", "ETH"])).await.unwrap();
        let report = sync
            .synchronize(SyncMode::GapFill(check.missing().to_vec()))
            .await
            .unwrap();

        assert_eq!(report.mode, "gap-fill");
        assert_eq!(report.written, 1);
        assert_eq!(source.calls(), vec![titles(&["ETH"])]);
        assert_eq!(
            store.latest(&titles(&["BTC", "ETH"])).await.unwrap(),
            vec![coin("BTC", 50.4), coin("ETH", 46.6)]
        );
    }

    #[tokio::test]
    async fn test_full_refresh_prefers_configured_titles() {
        let (_dir, store, _) = temp_store(at(10, 9, 0));
        store.store(&[coin("DOT", 5.0)]).await.unwrap();
        let source = Arc::new(FakePriceSource::with_prices(&[("BTC", 1.0), ("ETH", 2.0)]));
        let sync = RateSynchronizer::new(store, source.clone(), titles(&["BTC", "ETH"]));

        let report = sync.synchronize(SyncMode::FullRefresh).await.unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(source.calls(), vec![titles(&["BTC", "ETH"])]);
    }

    #[tokio::test]
    async fn test_full_refresh_falls_back_to_known_titles() {
        let (_dir, store, clock) = temp_store(at(10, 9, 0));
        store.store(&[coin("DOT", 5.0), coin("ADA", 0.4)]).await.unwrap();
        let source = Arc::new(FakePriceSource::with_prices(&[("DOT", 5.5), ("ADA", 0.45)]));
        let sync = RateSynchronizer::new(store.clone(), source.clone(), vec![]);

        clock.advance(chrono::Duration::minutes(1));
        sync.synchronize(SyncMode::FullRefresh).await.unwrap();

        assert_eq!(source.calls(), vec![titles(&["DOT", "ADA"])]);
        assert_eq!(
            store.latest(&titles(&["DOT", "ADA"])).await.unwrap(),
            vec![coin("DOT", 5.5), coin("ADA", 0.45)]
        );
    }

    #[tokio::test]
    async fn test_full_refresh_with_empty_universe_is_noop() {
        let (_dir, store, _) = temp_store(at(10, 9, 0));
        let source = Arc::new(FakePriceSource::default());
        let sync = RateSynchronizer::new(store, source.clone(), vec![]);

        let report = sync.synchronize(SyncMode::FullRefresh).await.unwrap();
        assert_eq!(report.written, 0);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gap_fill_unknown_upstream_is_not_found() {
        let (_dir, store, _) = temp_store(at(10, 9, 0));
        let sync = RateSynchronizer::new(store.clone(), Arc::new(FakePriceSource::default()), vec![]);

        let err = sync
            .synchronize(SyncMode::GapFill(titles(&["ADA"])))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(store.list_known_titles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_reported_and_nothing_written() {
        let (_dir, store, _) = temp_store(at(10, 9, 0));
        let source = Arc::new(FakePriceSource::with_prices(&[("BTC", 1.0)]));
        source.fail_with("connection reset");
        let sync = RateSynchronizer::new(store.clone(), source, titles(&["BTC"]));

        let err = sync.synchronize(SyncMode::FullRefresh).await.unwrap_err();
        assert!(matches!(err, RatesError::Internal(_)));
        assert!(store.list_known_titles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gap_fill_extends_configured_universe() {
        let (_dir, store, _) = temp_store(at(10, 9, 0));
        let source = Arc::new(FakePriceSource::with_prices(&[("BTC", 1.0), ("SOL", 20.0)]));
        let sync = RateSynchronizer::new(store, source, titles(&["BTC"]));

        sync.synchronize(SyncMode::GapFill(titles(&["SOL"]))).await.unwrap();
        assert_eq!(sync.tracked_titles().await, titles(&["BTC", "SOL"]));
    }

    #[tokio::test]
    async fn test_cancelled_guard_stops_before_fetch() {
        let (_dir, store, _) = temp_store(at(10, 9, 0));
        let source = Arc::new(FakePriceSource::with_prices(&[("BTC", 1.0)]));
        let sync = RateSynchronizer::new(store, source.clone(), titles(&["BTC"]));

        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let guard = CallGuard::new(token, None);

        let err = sync
            .synchronize_guarded(SyncMode::FullRefresh, &guard)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(source.calls().is_empty());
    }
}
