/// Stable cache key generation
use sha2::{Digest, Sha256};

/// Key for an (operation, title set) pair; title order and duplicates do not matter
pub fn generate_cache_key(operation: &str, titles: &[String]) -> String {
    let mut canonical: Vec<&str> = titles.iter().map(String::as_str).collect();
    canonical.sort_unstable();
    canonical.dedup();
    
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.join(",").as_bytes());
    format!("{:x}", hasher.finalize())
}
