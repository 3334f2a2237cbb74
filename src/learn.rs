//! Seeding the recency cache from each feed's read history.

use crate::backend::{Backend, BackendError, HeadlineQuery};
use crate::dedup::{LearnedRecord, RecencyCache};

/// Largest headline page requested from a backend.
pub const PAGE_SIZE: usize = 200;

/// Outcome of one warm-up pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmUpReport {
    /// Records appended to the cache
    pub learned: usize,
    /// Feeds at least one record was learned from
    pub feeds: usize,
    /// Feeds whose history could not be fetched
    pub failed_feeds: usize,
    /// Nothing was done because the cache was already populated
    pub skipped: bool,
}

/// Fill `cache` with up to `per_feed_limit` read articles from every feed.
///
/// A non-empty cache is left alone unless `force` is set, in which case it
/// is cleared and rebuilt. Only a failure to list the feeds is returned as
/// an error; a failing feed is logged and the pass moves on.
pub async fn warm_up<B: Backend>(
    backend: &B,
    cache: &mut RecencyCache,
    per_feed_limit: usize,
    force: bool,
) -> Result<WarmUpReport, BackendError> {
    if !cache.is_empty() && !force {
        tracing::debug!(cached = cache.len(), "Cache already populated, skipping warm-up");
        return Ok(WarmUpReport {
            skipped: true,
            ..WarmUpReport::default()
        });
    }

    let feeds = backend.feeds().await?;
    if force {
        cache.clear();
    }

    let mut report = WarmUpReport::default();
    let page_size = per_feed_limit.min(PAGE_SIZE);

    for feed in &feeds {
        if per_feed_limit == 0 {
            break;
        }

        let mut learned = 0;
        let mut offset = 0;
        loop {
            let query = HeadlineQuery::all()
                .feed(feed.id)
                .limit(page_size)
                .offset(offset);
            let page = match backend.headlines(&query).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        feed_id = feed.id,
                        feed = %feed.title,
                        error = %e,
                        kind = e.kind(),
                        "Failed to fetch feed history, skipping feed"
                    );
                    report.failed_feeds += 1;
                    break;
                }
            };

            let fetched = page.len();
            for article in page.iter().filter(|a| !a.unread) {
                if learned == per_feed_limit {
                    break;
                }
                cache.append(LearnedRecord::from_article(article));
                learned += 1;
            }

            if learned >= per_feed_limit || fetched < page_size {
                break;
            }
            offset += fetched;
        }

        if learned > 0 {
            report.feeds += 1;
            report.learned += learned;
        }
        tracing::debug!(feed_id = feed.id, feed = %feed.title, learned, "Learned feed history");
    }

    tracing::info!(
        learned = report.learned,
        feeds = report.feeds,
        failed_feeds = report.failed_feeds,
        cached = cache.len(),
        "Warm-up finished"
    );
    Ok(report)
}
