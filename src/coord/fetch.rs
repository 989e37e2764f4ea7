//! Background catalog refresh for stored books.

use super::{BookStore, CoordinatorError, InFlight, RefreshPolicy};
use crate::rule::RuleRegistry;
use crate::scraper::Scraper;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinHandle;

/// Refreshes stored catalogs in the background, one job per book id.
#[derive(Clone)]
pub struct FetchCoordinator {
    inflight: InFlight,
    store: Arc<dyn BookStore>,
    rules: Arc<RuleRegistry>,
    scraper: Arc<Scraper>,
    policy: RefreshPolicy,
}

impl FetchCoordinator {
    pub fn new(store: Arc<dyn BookStore>, rules: Arc<RuleRegistry>, scraper: Arc<Scraper>) -> Self {
        Self {
            inflight: InFlight::new(),
            store,
            rules,
            scraper,
            policy: RefreshPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_fetching(&self, book_id: &str) -> bool {
        self.inflight.contains(book_id)
    }

    /// Start a catalog refresh for `book_id` unless one is already running.
    /// Failures are logged; the book id is released either way.
    pub fn add(&self, book_id: &str) -> Option<JoinHandle<()>> {
        let Some(guard) = self.inflight.try_acquire(book_id) else {
            tracing::debug!(book_id, "catalog refresh already running");
            return None;
        };
        let this = self.clone();
        let book_id = book_id.to_string();
        Some(tokio::spawn(async move {
            let _guard = guard;
            match this.refresh(&book_id).await {
                Ok(appended) => {
                    tracing::info!(book_id = book_id.as_str(), appended, "catalog refreshed")
                }
                Err(e) => {
                    tracing::warn!(book_id = book_id.as_str(), error = %e, "catalog refresh failed")
                }
            }
        }))
    }

    /// [add](Self::add) when the policy says the stored catalog is stale.
    pub fn refresh_if_stale(&self, book_id: &str, fetched_at: SystemTime, now: SystemTime) -> Option<JoinHandle<()>> {
        if !self.policy.should_refresh(fetched_at, now) {
            return None;
        }
        self.add(book_id)
    }

    /// Re-read the book's catalog and append chapters past the current spine.
    /// Returns how many were appended.
    async fn refresh(&self, book_id: &str) -> Result<usize, CoordinatorError> {
        let book = self
            .store
            .load_book(book_id)
            .await?
            .ok_or_else(|| CoordinatorError::BookNotFound {
                id: book_id.to_string(),
            })?;
        let rule = self
            .rules
            .by_name(&book.rule_name)
            .ok_or_else(|| CoordinatorError::RuleNotFound {
                name: book.rule_name.clone(),
            })?;

        let mut entries = self.scraper.catalog(&rule, &book.catalog_url).await?;
        entries.retain(|e| !e.is_heading());
        let fresh = entries.get(book.spine.len()..).unwrap_or_default();
        self.store
            .record_fetch(book_id, fresh, SystemTime::now())
            .await?;
        Ok(fresh.len())
    }
}
