//! Background catalog refresh and staging cleanup, at most one job per book.

mod fetch;
mod gc;
mod store;

pub use fetch::FetchCoordinator;
pub use gc::GcCoordinator;
pub use store::{BookStore, MemoryStore, SpineEntry, StagedBook, StoredBook};

use crate::scraper::ScraperError;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("book not found: {id}")]
    BookNotFound { id: String },

    #[error("no site rule named {name}")]
    RuleNotFound { name: String },

    #[error("book {book_id} is not staged by user {user_id}")]
    NotStaged { user_id: String, book_id: String },

    #[error(transparent)]
    Scraper(#[from] ScraperError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Process-local set of keys with a job running.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

/// Holds a key in its [InFlight] set until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

fn lock(keys: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    keys.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or None if a job already holds it.
    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
        if !lock(&self.keys).insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.keys).contains(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.keys).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `job` under `key`. Returns None without polling `job` when the key
    /// is already held. The key is released however the job ends.
    pub async fn run<F, T>(&self, key: &str, job: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let _guard = self.try_acquire(key)?;
        Some(job.await)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.keys).remove(&self.key);
    }
}

/// When a stored catalog is due for a refresh and when a staged book may be
/// collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub fetch_interval: Duration,
    pub staging_lifetime: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(10 * 60),
            staging_lifetime: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RefreshPolicy {
    pub fn should_refresh(&self, fetched_at: SystemTime, now: SystemTime) -> bool {
        now.duration_since(fetched_at)
            .map(|age| age > self.fetch_interval)
            .unwrap_or(false)
    }

    pub fn should_collect(&self, staged_at: SystemTime, now: SystemTime) -> bool {
        now.duration_since(staged_at)
            .map(|age| age > self.staging_lifetime)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn concurrent_run_executes_once() -> Result<(), Box<dyn std::error::Error>> {
        let inflight = InFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release, released) = oneshot::channel::<()>();

        let first = {
            let inflight = inflight.clone();
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                inflight
                    .run("b1", async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        let _ = released.await;
                    })
                    .await
            })
        };
        while !inflight.contains("b1") {
            tokio::task::yield_now().await;
        }

        let second_runs = Arc::clone(&runs);
        let second = inflight
            .run("b1", async move {
                second_runs.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(second.is_none());

        let _ = release.send(());
        assert_eq!(first.await?, Some(()));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!inflight.contains("b1"));
        assert_eq!(inflight.run("b1", async { 7 }).await, Some(7));
        Ok(())
    }

    #[tokio::test]
    async fn key_is_released_after_failure_and_panic() {
        let inflight = InFlight::new();
        let failed = inflight.run("k", async { Err::<(), &str>("boom") }).await;
        assert_eq!(failed, Some(Err("boom")));
        assert!(inflight.is_empty());

        let panicking = inflight.clone();
        let joined = tokio::spawn(async move {
            panicking
                .run("k", async {
                    panic!("job panicked");
                })
                .await
        })
        .await;
        assert!(joined.is_err());
        assert!(!inflight.contains("k"));
    }

    #[test]
    fn guards_are_per_key() {
        let inflight = InFlight::new();
        let a = inflight.try_acquire("a");
        assert!(a.is_some());
        assert!(inflight.try_acquire("a").is_none());
        assert!(inflight.try_acquire("b").is_some());
        assert_eq!(inflight.len(), 1);
        drop(a);
        assert!(inflight.is_empty());
    }

    #[test]
    fn policy_thresholds() {
        let policy = RefreshPolicy::default();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert!(!policy.should_refresh(t0, t0 + Duration::from_secs(60)));
        assert!(policy.should_refresh(t0, t0 + Duration::from_secs(11 * 60)));
        assert!(!policy.should_refresh(t0 + Duration::from_secs(5), t0));
        assert!(!policy.should_collect(t0, t0 + Duration::from_secs(23 * 60 * 60)));
        assert!(policy.should_collect(t0, t0 + Duration::from_secs(25 * 60 * 60)));
    }
}
