//! Short-lived response cache for generated insights.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::insights::{InsightKind, InsightResult};

struct Entry {
    stored_at: Instant,
    result: InsightResult,
}

pub struct InsightCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, Entry>>,
}

impl InsightCache {
    /// Returns `None` when `ttl` is zero (caching disabled).
    pub fn new(ttl: Duration, capacity: usize) -> Option<Self> {
        if ttl.is_zero() {
            return None;
        }
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn key(kind: InsightKind, input: &str, translation: &str) -> String {
        format!(
            "{}|{}|{}",
            kind.as_str(),
            input.trim().to_lowercase(),
            translation.trim().to_uppercase()
        )
    }

    pub async fn get(&self, key: &str) -> Option<InsightResult> {
        let mut entries = self.entries.lock().await;
        let fresh = entries.get(key).map(|e| e.stored_at.elapsed() < self.ttl)?;
        if fresh {
            entries.get(key).map(|e| e.result.clone())
        } else {
            entries.pop(key);
            None
        }
    }

    pub async fn put(&self, key: String, result: InsightResult) {
        self.entries.lock().await.put(
            key,
            Entry {
                stored_at: Instant::now(),
                result,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(summary: &str) -> InsightResult {
        InsightResult {
            summary: summary.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn disabled_when_ttl_zero() {
        assert!(InsightCache::new(Duration::ZERO, 10).is_none());
        assert!(InsightCache::new(Duration::from_secs(1), 0).is_none());
    }

    #[test]
    fn key_ignores_case() {
        assert_eq!(
            InsightCache::key(InsightKind::Topic, " Grace ", "kjv"),
            InsightCache::key(InsightKind::Topic, "grace", "KJV")
        );
        assert_ne!(
            InsightCache::key(InsightKind::Topic, "grace", "KJV"),
            InsightCache::key(InsightKind::TextSnippet, "grace", "KJV")
        );
    }

    #[tokio::test]
    async fn hit_then_expire() {
        let cache = InsightCache::new(Duration::from_millis(50), 4).unwrap();
        cache.put("k".into(), result("cached")).await;
        assert_eq!(cache.get("k").await.unwrap().summary, "cached");

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn evicts_least_recent() {
        let cache = InsightCache::new(Duration::from_secs(60), 2).unwrap();
        cache.put("a".into(), result("a")).await;
        cache.put("b".into(), result("b")).await;
        cache.get("a").await;
        cache.put("c".into(), result("c")).await;
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
    }
}
