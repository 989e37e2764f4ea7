//! yireader: rule-driven aggregator for serialized fiction sites.
//!
//! Each supported site is described by a JSON site rule; the pipelines in
//! [scraper] turn a rule plus a search key or URL into search rows, book
//! details, catalogs and chapter text.

pub mod block;
pub mod cli;
pub mod config;
pub mod coord;
pub mod expr;
pub mod model;
pub mod rule;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use block::{Body, ContentBlock, Page, ValueKind};
pub use coord::{
    BookStore, CoordinatorError, FetchCoordinator, GcCoordinator, InFlight, MemoryStore,
    RefreshPolicy,
};
pub use expr::Expression;
pub use model::{BookResult, CatalogEntry, ChapterResult, DetailResult, DetailSeed, SearchResult};
pub use rule::{download_rule, RuleRegistry, SiteRule};
pub use scraper::{
    ChapterStyle, PoliteClient, PoliteClientBuilder, RuleRequest, ScrapeOptions, Scraper,
    ScraperError,
};
