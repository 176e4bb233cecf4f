//! API Key Rotation
//!
//! Hosted oracles throttle per key. A throttled key is reported here and the
//! pool moves on to the next one.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// An API key together with its slot in the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub index: usize,
    pub value: String,
}

/// Key rotation tracker shared by every oracle call
pub trait KeyRotation: Send + Sync {
    /// Key to use for the next call, `None` if no keys are configured
    fn current(&self) -> Option<ApiKey>;

    /// Report that the key at `index` was rate limited
    fn report_rate_limited(&self, index: usize);
}

/// Round-robin pool of API keys
#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<String>,
    current: AtomicUsize,
    rate_limited: AtomicU64,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keys,
            current: AtomicUsize::new(0),
            rate_limited: AtomicU64::new(0),
        }
    }

    /// Parse a comma-separated key list
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(',').map(str::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Total rate-limit reports that caused a rotation
    pub fn rotations(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }
}

impl KeyRotation for KeyPool {
    fn current(&self) -> Option<ApiKey> {
        if self.keys.is_empty() {
            return None;
        }
        let index = self.current.load(Ordering::Acquire) % self.keys.len();
        Some(ApiKey {
            index,
            value: self.keys[index].clone(),
        })
    }

    fn report_rate_limited(&self, index: usize) {
        if self.keys.is_empty() {
            return;
        }
        let next = (index + 1) % self.keys.len();

        // Only the first report for a given key advances the pool; later
        // reports from calls that were already in flight are stale.
        match self
            .current
            .compare_exchange(index, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "API key #{} rate limited, rotating to key #{} of {}",
                    index,
                    next,
                    self.keys.len()
                );
            }
            Err(actual) => {
                tracing::debug!(
                    "Stale rate-limit report for key #{} (current is #{})",
                    index,
                    actual
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_pool() {
        let pool = KeyPool::from_csv(" , ");
        assert!(pool.is_empty());
        assert!(pool.current().is_none());
        pool.report_rate_limited(0);
        assert_eq!(pool.rotations(), 0);
    }

    #[test]
    fn test_rotation_wraps() {
        let pool = KeyPool::from_csv("a, b ,c");
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.current().unwrap().value, "a");

        pool.report_rate_limited(0);
        assert_eq!(pool.current().unwrap(), ApiKey { index: 1, value: "b".to_string() });

        pool.report_rate_limited(1);
        pool.report_rate_limited(2);
        assert_eq!(pool.current().unwrap().value, "a");
        assert_eq!(pool.rotations(), 3);
    }

    #[test]
    fn test_stale_report_is_ignored() {
        let pool = KeyPool::from_csv("a,b,c");
        pool.report_rate_limited(0);
        pool.report_rate_limited(0);
        assert_eq!(pool.current().unwrap().index, 1);
        assert_eq!(pool.rotations(), 1);
    }

    #[test]
    fn test_concurrent_reports_rotate_once() {
        let pool = Arc::new(KeyPool::from_csv("a,b,c,d"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.report_rate_limited(0))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.current().unwrap().index, 1);
        assert_eq!(pool.rotations(), 1);
    }
}
