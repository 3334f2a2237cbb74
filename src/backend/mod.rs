//! Feed reader backends.
//!
//! The deduplicator talks to the reader service only through the [`Backend`]
//! trait. Two implementations ship with the crate:
//!
//! - [`TtRss`] - Tiny Tiny RSS JSON API
//! - [`Miniflux`] - Miniflux REST API
//!
//! The implementation is picked from the configuration at startup and the
//! scheduler is generic over it.

mod http;
pub mod miniflux;
pub mod ttrss;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use thiserror::Error;

pub use miniflux::Miniflux;
pub use ttrss::TtRss;

/// Errors from a backend call.
///
/// Callers only distinguish success from failure; the variants exist for
/// logging.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response body was not the JSON we expected
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    /// The service answered with an error of its own
    #[error("API error: {0}")]
    Api(String),
    /// Login was rejected
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// The session is gone and a new login is needed
    #[error("Not logged in")]
    NotLoggedIn,
    /// Configured hostname could not be turned into a request URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl BackendError {
    /// Short, stable name of the error kind for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Network(_) => "network",
            BackendError::Timeout => "timeout",
            BackendError::HttpStatus(_) => "http_status",
            BackendError::ResponseTooLarge => "response_too_large",
            BackendError::Decode(_) => "decode",
            BackendError::Api(_) => "api",
            BackendError::Auth(_) => "auth",
            BackendError::NotLoggedIn => "not_logged_in",
            BackendError::InvalidUrl(_) => "invalid_url",
        }
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// A subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub title: String,
}

/// An article as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Backend-assigned id, increasing over time
    pub id: i64,
    pub title: String,
    /// Article link, empty when the feed gave none
    pub link: String,
    pub feed_id: i64,
    pub feed_title: String,
    pub unread: bool,
    /// Content was edited after first publication
    pub is_updated: bool,
}

/// Which articles a headline query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Unread,
    All,
    Starred,
}

/// Ordering of a headline query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Parameters of [`Backend::headlines`].
///
/// Built with the chained setters:
///
/// ```
/// use newsdedup::backend::{HeadlineQuery, SortOrder, ViewMode};
///
/// let query = HeadlineQuery::unread().since(500).limit(200).order(SortOrder::OldestFirst);
/// assert_eq!(query.view_mode, ViewMode::Unread);
/// assert_eq!(query.since_id, Some(500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadlineQuery {
    /// Restrict to one feed; `None` means every feed
    pub feed_id: Option<i64>,
    pub view_mode: ViewMode,
    /// Only articles with an id strictly greater than this
    pub since_id: Option<i64>,
    pub limit: Option<usize>,
    /// Number of matching articles to skip, for paging
    pub offset: Option<usize>,
    pub order: SortOrder,
}

impl HeadlineQuery {
    pub fn unread() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            view_mode: ViewMode::All,
            ..Self::default()
        }
    }

    pub fn starred() -> Self {
        Self {
            view_mode: ViewMode::Starred,
            ..Self::default()
        }
    }

    pub fn feed(mut self, feed_id: i64) -> Self {
        self.feed_id = Some(feed_id);
        self
    }

    pub fn since(mut self, id: i64) -> Self {
        self.since_id = Some(id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

/// A remote feed reader service.
///
/// Every call may fail with a [`BackendError`]. Calls are awaited one at a
/// time by the scheduler.
pub trait Backend {
    /// Authenticate with the service.
    fn login(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// All subscribed feeds.
    fn feeds(&self) -> impl Future<Output = Result<Vec<Feed>, BackendError>> + Send;

    /// Articles matching `query`.
    fn headlines(
        &self,
        query: &HeadlineQuery,
    ) -> impl Future<Output = Result<Vec<Article>, BackendError>> + Send;

    /// Total number of unread articles.
    fn unread_count(&self) -> impl Future<Output = Result<i64, BackendError>> + Send;

    fn mark_read(&self, article_id: i64) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn mark_starred(
        &self,
        article_id: i64,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn toggle_starred(
        &self,
        article_id: i64,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}
