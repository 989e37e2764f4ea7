//! Persistence collaborator used by the coordinators.
//!
//! Backends live outside this crate; errors cross the seam as `anyhow::Error`.
//! [MemoryStore] is a process-local backend.

use crate::model::CatalogEntry;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// One chapter record in a stored book's reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// What the coordinators need to know about a persisted book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBook {
    pub id: String,
    /// Name of the site rule the book was scraped with.
    pub rule_name: String,
    pub catalog_url: String,
    pub spine: Vec<SpineEntry>,
    /// Id of the stored cover resource.
    pub cover: Option<String>,
    pub fetched_at: SystemTime,
    /// Set once chapters were appended after the book was first stored.
    pub content_changed: bool,
}

/// A book a user opened without adding it to their shelf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBook {
    pub book_id: String,
    pub staged_at: SystemTime,
}

#[async_trait]
pub trait BookStore: Send + Sync {
    async fn load_book(&self, book_id: &str) -> Result<Option<StoredBook>>;

    /// Append chapters to the end of the spine and set the book's fetch time.
    /// Called with an empty slice when nothing new was found; a non-empty
    /// slice marks the book's content as changed.
    async fn record_fetch(&self, book_id: &str, new_chapters: &[CatalogEntry], fetched_at: SystemTime) -> Result<()>;

    async fn staged_books(&self, user_id: &str) -> Result<Vec<StagedBook>>;

    async fn delete_chapters(&self, chapter_ids: &[String]) -> Result<()>;

    async fn delete_resource(&self, resource_id: &str) -> Result<()>;

    async fn unstage_book(&self, user_id: &str, book_id: &str) -> Result<()>;

    async fn delete_book(&self, book_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    books: HashMap<String, StoredBook>,
    staged: HashMap<String, Vec<StagedBook>>,
    chapters: HashSet<String>,
    resources: HashSet<String>,
}

/// In-memory [BookStore].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a book together with its chapter and cover records.
    pub fn insert_book(&self, book: StoredBook) {
        let mut state = self.state();
        state.chapters.extend(book.spine.iter().map(|c| c.id.clone()));
        if let Some(cover) = &book.cover {
            state.resources.insert(cover.clone());
        }
        state.books.insert(book.id.clone(), book);
    }

    pub fn stage(&self, user_id: &str, book_id: &str, staged_at: SystemTime) {
        self.state()
            .staged
            .entry(user_id.to_string())
            .or_default()
            .push(StagedBook {
                book_id: book_id.to_string(),
                staged_at,
            });
    }

    pub fn book(&self, book_id: &str) -> Option<StoredBook> {
        self.state().books.get(book_id).cloned()
    }

    pub fn has_chapter(&self, chapter_id: &str) -> bool {
        self.state().chapters.contains(chapter_id)
    }

    pub fn has_resource(&self, resource_id: &str) -> bool {
        self.state().resources.contains(resource_id)
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn load_book(&self, book_id: &str) -> Result<Option<StoredBook>> {
        Ok(self.book(book_id))
    }

    async fn record_fetch(&self, book_id: &str, new_chapters: &[CatalogEntry], fetched_at: SystemTime) -> Result<()> {
        let mut state = self.state();
        let MemoryState { books, chapters, .. } = &mut *state;
        let book = books
            .get_mut(book_id)
            .ok_or_else(|| anyhow!("no stored book {}", book_id))?;
        for entry in new_chapters {
            let id = format!("{}:{}", book_id, book.spine.len());
            chapters.insert(id.clone());
            book.spine.push(SpineEntry {
                id,
                name: entry.name.clone(),
                url: entry.url.clone(),
            });
        }
        if !new_chapters.is_empty() {
            book.content_changed = true;
        }
        book.fetched_at = fetched_at;
        Ok(())
    }

    async fn staged_books(&self, user_id: &str) -> Result<Vec<StagedBook>> {
        Ok(self.state().staged.get(user_id).cloned().unwrap_or_default())
    }

    async fn delete_chapters(&self, chapter_ids: &[String]) -> Result<()> {
        let mut state = self.state();
        for id in chapter_ids {
            state.chapters.remove(id);
        }
        Ok(())
    }

    async fn delete_resource(&self, resource_id: &str) -> Result<()> {
        self.state().resources.remove(resource_id);
        Ok(())
    }

    async fn unstage_book(&self, user_id: &str, book_id: &str) -> Result<()> {
        if let Some(staged) = self.state().staged.get_mut(user_id) {
            staged.retain(|s| s.book_id != book_id);
        }
        Ok(())
    }

    async fn delete_book(&self, book_id: &str) -> Result<()> {
        self.state()
            .books
            .remove(book_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no stored book {}", book_id))
    }
}
