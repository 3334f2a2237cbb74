use std::collections::HashSet;
use std::fmt;

use super::cache::{LearnedRecord, RecencyCache};
use super::canonical::canonicalize;
use super::similarity::{score, SimilarityMethod};
use crate::backend::Article;
use crate::config::DedupConfig;

/// Why an article was taken to be a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    /// Same canonical link as a cached record.
    Url,
    /// Title scored above the configured ratio.
    Title { score: u8 },
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url => f.write_str("url"),
            Self::Title { .. } => f.write_str("title"),
        }
    }
}

/// Why an article was left out of duplicate checks entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExemptReason {
    /// The backend reports the article was edited after publishing.
    Updated,
    /// The article's feed is on the ignore list.
    IgnoredFeed,
}

/// Outcome of classifying one article against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'c> {
    Unique,
    Exempt(ExemptReason),
    Duplicate {
        reason: DuplicateReason,
        matched: &'c LearnedRecord,
    },
}

impl Verdict<'_> {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Verdict::Duplicate { .. })
    }
}

/// Decides whether a new article repeats something already in the cache.
///
/// Classification never mutates anything. Callers append the article to the
/// cache afterwards whatever the verdict.
#[derive(Debug, Clone)]
pub struct Classifier {
    ratio: u8,
    method: SimilarityMethod,
    check_urls: bool,
    ignore: HashSet<i64>,
    internal_only: HashSet<i64>,
}

impl Classifier {
    /// A classifier with URL checks on and no per-feed rules.
    pub fn new(ratio: u8, method: SimilarityMethod) -> Self {
        Self {
            ratio,
            method,
            check_urls: true,
            ignore: HashSet::new(),
            internal_only: HashSet::new(),
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.ratio, config.similarity_method())
            .with_url_checks(config.check_urls)
            .ignore_feeds(config.ignore.iter().copied())
            .internal_only_feeds(config.internal_only.iter().copied())
    }

    pub fn with_url_checks(mut self, enabled: bool) -> Self {
        self.check_urls = enabled;
        self
    }

    pub fn ignore_feeds(mut self, feeds: impl IntoIterator<Item = i64>) -> Self {
        self.ignore.extend(feeds);
        self
    }

    pub fn internal_only_feeds(mut self, feeds: impl IntoIterator<Item = i64>) -> Self {
        self.internal_only.extend(feeds);
        self
    }

    pub fn method(&self) -> SimilarityMethod {
        self.method
    }

    pub fn ratio(&self) -> u8 {
        self.ratio
    }

    /// Classify `article` against `cache`.
    ///
    /// URL matches are checked before titles. Both passes walk the cache
    /// oldest to newest and stop at the first qualifying record, so the
    /// reported match is the earliest evidence, not the closest one.
    pub fn classify<'c>(&self, article: &Article, cache: &'c RecencyCache) -> Verdict<'c> {
        if article.is_updated {
            return Verdict::Exempt(ExemptReason::Updated);
        }
        if self.ignore.contains(&article.feed_id) {
            return Verdict::Exempt(ExemptReason::IgnoredFeed);
        }

        let same_feed_only = self.internal_only.contains(&article.feed_id);
        let in_scope =
            |record: &&LearnedRecord| !same_feed_only || record.feed_id() == article.feed_id;

        if self.check_urls && !article.link.is_empty() {
            let url = canonicalize(&article.link);
            if !url.is_empty() {
                if let Some(matched) = cache
                    .iter()
                    .filter(in_scope)
                    .find(|record| record.canonical_url() == url)
                {
                    return Verdict::Duplicate {
                        reason: DuplicateReason::Url,
                        matched,
                    };
                }
            }
        }

        for record in cache.iter().filter(in_scope) {
            let closeness = score(record.title(), &article.title, self.method);
            if closeness > self.ratio {
                return Verdict::Duplicate {
                    reason: DuplicateReason::Title { score: closeness },
                    matched: record,
                };
            }
        }

        Verdict::Unique
    }
}
