//! Cleanup of staged books that were never added to a shelf.

use super::{BookStore, CoordinatorError, InFlight, RefreshPolicy, StagedBook};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinHandle;

/// Deletes books a user staged but never kept, with their chapters and cover.
#[derive(Clone)]
pub struct GcCoordinator {
    inflight: InFlight,
    store: Arc<dyn BookStore>,
    policy: RefreshPolicy,
}

impl GcCoordinator {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self {
            inflight: InFlight::new(),
            store,
            policy: RefreshPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_collecting(&self, book_id: &str) -> bool {
        self.inflight.contains(book_id)
    }

    /// Start collecting `book_id` from `user_id`'s staging set unless a
    /// collection for that book is already running.
    pub fn add(&self, user_id: &str, book_id: &str) -> Option<JoinHandle<()>> {
        let Some(guard) = self.inflight.try_acquire(book_id) else {
            tracing::debug!(book_id, "book collection already running");
            return None;
        };
        let this = self.clone();
        let user_id = user_id.to_string();
        let book_id = book_id.to_string();
        Some(tokio::spawn(async move {
            let _guard = guard;
            match this.collect(&user_id, &book_id).await {
                Ok(()) => tracing::info!(
                    user_id = user_id.as_str(),
                    book_id = book_id.as_str(),
                    "staged book collected"
                ),
                Err(e) => tracing::warn!(
                    user_id = user_id.as_str(),
                    book_id = book_id.as_str(),
                    error = %e,
                    "staged book collection failed"
                ),
            }
        }))
    }

    /// [add](Self::add) once the staged book has outlived the staging lifetime.
    pub fn collect_if_expired(&self, user_id: &str, staged: &StagedBook, now: SystemTime) -> Option<JoinHandle<()>> {
        if !self.policy.should_collect(staged.staged_at, now) {
            return None;
        }
        self.add(user_id, &staged.book_id)
    }

    async fn collect(&self, user_id: &str, book_id: &str) -> Result<(), CoordinatorError> {
        let staged = self.store.staged_books(user_id).await?;
        if !staged.iter().any(|s| s.book_id == book_id) {
            return Err(CoordinatorError::NotStaged {
                user_id: user_id.to_string(),
                book_id: book_id.to_string(),
            });
        }
        let book = self
            .store
            .load_book(book_id)
            .await?
            .ok_or_else(|| CoordinatorError::BookNotFound {
                id: book_id.to_string(),
            })?;

        let chapter_ids: Vec<String> = book.spine.iter().map(|c| c.id.clone()).collect();
        self.store.delete_chapters(&chapter_ids).await?;
        if let Some(cover) = &book.cover {
            self.store.delete_resource(cover).await?;
        }
        self.store.unstage_book(user_id, book_id).await?;
        self.store.delete_book(book_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::store::tests::stored_book;
    use crate::coord::MemoryStore;
    use std::error::Error;
    use std::time::Duration;

    fn staged_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_book(stored_book("b1", "https://x.com/b/1/", &["一", "二"]));
        store.stage("u1", "b1", SystemTime::UNIX_EPOCH);
        store
    }

    #[tokio::test]
    async fn collects_book_chapters_and_cover() -> Result<(), Box<dyn Error>> {
        let store = staged_store();
        let gc = GcCoordinator::new(Arc::clone(&store) as Arc<dyn BookStore>);
        let job = gc.add("u1", "b1").ok_or("job")?;
        assert!(gc.add("u1", "b1").is_none());
        job.await?;

        assert!(store.book("b1").is_none());
        assert!(!store.has_chapter("b1:0") && !store.has_chapter("b1:1"));
        assert!(!store.has_resource("b1:cover"));
        assert!(store.staged_books("u1").await?.is_empty());
        assert!(!gc.is_collecting("b1"));
        Ok(())
    }

    #[tokio::test]
    async fn book_staged_by_someone_else_is_kept() -> Result<(), Box<dyn Error>> {
        let store = staged_store();
        let gc = GcCoordinator::new(Arc::clone(&store) as Arc<dyn BookStore>);
        assert!(matches!(
            gc.collect("u2", "b1").await,
            Err(CoordinatorError::NotStaged { .. })
        ));
        gc.add("u2", "b1").ok_or("job")?.await?;
        assert!(store.book("b1").is_some());
        assert!(store.has_chapter("b1:0"));
        assert!(!gc.is_collecting("b1"));
        Ok(())
    }

    #[tokio::test]
    async fn only_expired_books_are_collected() -> Result<(), Box<dyn Error>> {
        let store = staged_store();
        let gc = GcCoordinator::new(Arc::clone(&store) as Arc<dyn BookStore>);
        let staged = StagedBook {
            book_id: "b1".into(),
            staged_at: SystemTime::UNIX_EPOCH,
        };
        let early = SystemTime::UNIX_EPOCH + Duration::from_secs(60 * 60);
        assert!(gc.collect_if_expired("u1", &staged, early).is_none());
        assert!(store.book("b1").is_some());

        let late = SystemTime::UNIX_EPOCH + Duration::from_secs(2 * 24 * 60 * 60);
        gc.collect_if_expired("u1", &staged, late).ok_or("job")?.await?;
        assert!(store.book("b1").is_none());
        Ok(())
    }
}
