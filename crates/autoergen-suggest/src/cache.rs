use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// A generation result as it was first produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedGeneration {
    pub text: String,
    pub elapsed: Duration,
}

struct Entry {
    stored_at: Instant,
    value: CachedGeneration,
}

/// Time-boxed memo of generation results keyed by the exact prompt text.
///
/// Keys are compared byte for byte; prompts differing only in case or
/// whitespace are separate entries. An entry expires once `ttl` has elapsed.
pub struct PromptCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl PromptCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, prompt: &str) -> Option<CachedGeneration> {
        let mut entries = self.lock();
        let fresh = entries
            .get(prompt)
            .map(|e| e.stored_at.elapsed() < self.ttl)?;
        if fresh {
            entries.get(prompt).map(|e| e.value.clone())
        } else {
            entries.remove(prompt);
            None
        }
    }

    /// Store `value` and drop whatever has expired meanwhile.
    pub fn insert(&self, prompt: impl Into<String>, value: CachedGeneration) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.lock();
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        entries.insert(
            prompt.into(),
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(text: &str) -> CachedGeneration {
        CachedGeneration {
            text: text.to_string(),
            elapsed: Duration::from_millis(1500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = PromptCache::new(Duration::from_secs(3600));
        cache.insert("Customers place Orders", generation("digraph {}"));

        tokio::time::advance(Duration::from_secs(3599)).await;
        let hit = cache.get("Customers place Orders").unwrap();
        assert_eq!(hit.text, "digraph {}");
        assert_eq!(hit.elapsed, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_ttl() {
        let cache = PromptCache::new(Duration::from_secs(3600));
        cache.insert("p", generation("x"));

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(cache.get("p").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_is_exact_text() {
        let cache = PromptCache::new(Duration::from_secs(60));
        cache.insert("Customers place Orders", generation("x"));
        assert!(cache.get("customers place orders").is_none());
        assert!(cache.get("Customers place Orders ").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_stores() {
        let cache = PromptCache::new(Duration::ZERO);
        cache.insert("p", generation("x"));
        assert!(cache.get("p").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = PromptCache::new(Duration::from_secs(10));
        cache.insert("old", generation("a"));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("new", generation("b"));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get("new").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_expired_prompts_do_not_accumulate() {
        let cache = PromptCache::new(Duration::from_secs(10));
        for i in 0..1000 {
            cache.insert(format!("prompt {i}"), generation("x"));
            tokio::time::advance(Duration::from_secs(11)).await;
        }
        assert_eq!(cache.len(), 1);

        cache.insert("fresh", generation("y"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh").is_some());
    }
}
