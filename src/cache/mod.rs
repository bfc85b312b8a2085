/// Short-lived memoization of query results keyed by (operation, title set)
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::Coin;
use crate::utils::generate_cache_key;

struct CacheEntry {
    coins: Vec<Coin>,
    expires: Instant,
}

/// TTL cache for query results.
///
/// Purely an optimization: entries expire by wall clock and are dropped when
/// an expired key is read. There is no background sweeper.
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl ResultCache {
    pub fn new(default_ttl: Duration) -> Self {
        ResultCache {
            entries: Mutex::new(HashMap::with_capacity(50)),
            default_ttl,
        }
    }
    
    pub fn from_minutes(ttl_minutes: u64) -> Self {
        Self::new(Duration::from_secs(ttl_minutes * 60))
    }
    
    /// Cached coins for the operation, if present and not yet expired
    pub async fn get(&self, operation: &str, titles: &[String]) -> Option<Vec<Coin>> {
        let key = generate_cache_key(operation, titles);
        let mut entries = self.entries.lock().await;
        
        let expired = match entries.get(&key) {
            Some(entry) if Instant::now() < entry.expires => {
                debug!("Cache hit for {} {:?}", operation, titles);
                return Some(in_request_order(&entry.coins, titles));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(&key);
        }
        None
    }
    
    pub async fn put(&self, operation: &str, titles: &[String], coins: Vec<Coin>) {
        self.put_with_ttl(operation, titles, coins, self.default_ttl).await;
    }
    
    pub async fn put_with_ttl(&self, operation: &str, titles: &[String], coins: Vec<Coin>, ttl: Duration) {
        let key = generate_cache_key(operation, titles);
        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            CacheEntry {
                coins,
                expires: Instant::now() + ttl,
            },
        );
    }
    
    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.len()
    }
    
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// The key ignores title order, so hits are re-sorted to match the caller's request
fn in_request_order(coins: &[Coin], titles: &[String]) -> Vec<Coin> {
    let mut ordered: Vec<Coin> = Vec::with_capacity(coins.len());
    for title in titles {
        if ordered.iter().any(|c| c.title() == title.as_str()) {
            continue;
        }
        if let Some(coin) = coins.iter().find(|c| c.title() == title.as_str()) {
            ordered.push(coin.clone());
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn titles(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }
    
    #[tokio::test]
    async fn test_hit_regardless_of_title_order() {
        let cache = ResultCache::from_minutes(5);
        let coins = vec![Coin::new("BTC", 50.4).unwrap(), Coin::new("ETH", 46.6).unwrap()];
        
        cache.put("last", &titles(&["BTC", "ETH"]), coins.clone()).await;
        
        let hit = cache.get("last", &titles(&["ETH", "BTC"])).await.unwrap();
        assert_eq!(hit, vec![coins[1].clone(), coins[0].clone()]);
        assert_eq!(cache.get("last", &titles(&["BTC", "ETH", "BTC"])).await, Some(coins));
        assert_eq!(cache.get("max", &titles(&["BTC", "ETH"])).await, None);
    }
    
    #[tokio::test]
    async fn test_expired_entry_is_dropped_on_read() {
        let cache = ResultCache::from_minutes(5);
        let coins = vec![Coin::new("ADA", 81.2).unwrap()];
        
        cache.put_with_ttl("avg", &titles(&["ADA"]), coins, Duration::ZERO).await;
        assert_eq!(cache.len().await, 1);
        
        assert_eq!(cache.get("avg", &titles(&["ADA"])).await, None);
        assert!(cache.is_empty().await);
    }
}
