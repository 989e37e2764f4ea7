//! Shared error type for the request layer and the extraction pipelines.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    // Rule / URL resolution
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("No site rule matches host '{host}'. Use --rule NAME to pick one.")]
    UnrecognizedHost { host: String },

    #[error("No site rule named '{name}'.")]
    UnknownRule { name: String },

    #[error("Invalid site rule: {reason}")]
    InvalidRule { reason: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    #[error("Could not build HTTP client: {source}")]
    Client { source: reqwest::Error },

    // Extraction
    #[error("Empty or unparseable document at {url}")]
    EmptyDocument { url: String },

    #[error("No detail URL supplied.")]
    MissingDetailUrl,

    #[error("Chapter content container not found at {url}.")]
    MissingContent { url: String },
}
