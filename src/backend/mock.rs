//! In-memory backend for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{Article, Backend, BackendError, Feed, HeadlineQuery, SortOrder, ViewMode};

/// A state-changing call the code under test made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkCall {
    Read(i64),
    Starred(i64),
    Toggled(i64),
}

#[derive(Default)]
pub(crate) struct MockBackend {
    pub feeds: Vec<Feed>,
    pub(crate) articles: Mutex<Vec<Article>>,
    pub(crate) starred: Mutex<HashSet<i64>>,
    pub(crate) calls: Mutex<Vec<MarkCall>>,
    pub(crate) queries: Mutex<Vec<HeadlineQuery>>,
    /// Feeds whose headline queries fail
    pub failing_feeds: HashSet<i64>,
    /// Makes every headline query fail while set
    pub headlines_down: AtomicBool,
    pub feeds_down: bool,
    /// Articles whose star calls fail
    pub failing_stars: HashSet<i64>,
    /// Articles whose read calls fail
    pub failing_reads: HashSet<i64>,
    /// `mark_read` never completes
    pub stalled_reads: bool,
}

impl MockBackend {
    pub fn new(feeds: Vec<Feed>, articles: Vec<Article>) -> Self {
        Self {
            feeds,
            articles: Mutex::new(articles),
            ..Self::default()
        }
    }

    pub fn with_starred(self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.starred.lock().unwrap().extend(ids);
        self
    }

    pub fn push_article(&self, article: Article) {
        self.articles.lock().unwrap().push(article);
    }

    pub fn set_headlines_down(&self, down: bool) {
        self.headlines_down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MarkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<HeadlineQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn starred(&self) -> HashSet<i64> {
        self.starred.lock().unwrap().clone()
    }
}

pub(crate) fn article(id: i64, feed_id: i64, title: &str, unread: bool) -> Article {
    Article {
        id,
        title: title.to_string(),
        link: format!("https://example.com/{feed_id}/{id}"),
        feed_id,
        feed_title: format!("Feed {feed_id}"),
        unread,
        is_updated: false,
    }
}

pub(crate) fn feed(id: i64) -> Feed {
    Feed {
        id,
        title: format!("Feed {id}"),
    }
}

impl Backend for MockBackend {
    async fn login(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn feeds(&self) -> Result<Vec<Feed>, BackendError> {
        if self.feeds_down {
            return Err(BackendError::HttpStatus(503));
        }
        Ok(self.feeds.clone())
    }

    async fn headlines(&self, query: &HeadlineQuery) -> Result<Vec<Article>, BackendError> {
        self.queries.lock().unwrap().push(*query);
        if self.headlines_down.load(Ordering::SeqCst) {
            return Err(BackendError::Timeout);
        }
        if let Some(feed_id) = query.feed_id {
            if self.failing_feeds.contains(&feed_id) {
                return Err(BackendError::HttpStatus(500));
            }
        }

        let starred = self.starred.lock().unwrap().clone();
        let mut matching: Vec<Article> = self
            .articles
            .lock()
            .unwrap()
            .iter()
            .filter(|a| query.feed_id.map_or(true, |id| a.feed_id == id))
            .filter(|a| match query.view_mode {
                ViewMode::Unread => a.unread,
                ViewMode::All => true,
                ViewMode::Starred => starred.contains(&a.id),
            })
            .filter(|a| query.since_id.map_or(true, |since| a.id > since))
            .cloned()
            .collect();

        match query.order {
            SortOrder::NewestFirst => matching.sort_by(|a, b| b.id.cmp(&a.id)),
            SortOrder::OldestFirst => matching.sort_by_key(|a| a.id),
        }

        Ok(matching
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn unread_count(&self) -> Result<i64, BackendError> {
        Ok(self.articles.lock().unwrap().iter().filter(|a| a.unread).count() as i64)
    }

    async fn mark_read(&self, article_id: i64) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(MarkCall::Read(article_id));
        if self.stalled_reads {
            std::future::pending::<()>().await;
        }
        if self.failing_reads.contains(&article_id) {
            return Err(BackendError::HttpStatus(500));
        }
        for article in self.articles.lock().unwrap().iter_mut() {
            if article.id == article_id {
                article.unread = false;
            }
        }
        Ok(())
    }

    async fn mark_starred(&self, article_id: i64) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(MarkCall::Starred(article_id));
        if self.failing_stars.contains(&article_id) {
            return Err(BackendError::Timeout);
        }
        self.starred.lock().unwrap().insert(article_id);
        Ok(())
    }

    async fn toggle_starred(&self, article_id: i64) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(MarkCall::Toggled(article_id));
        let mut starred = self.starred.lock().unwrap();
        if !starred.remove(&article_id) {
            starred.insert(article_id);
        }
        Ok(())
    }
}
