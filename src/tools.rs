//! One-shot maintenance commands.
use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use crate::backend::{Article, Backend, HeadlineQuery};
use crate::learn::PAGE_SIZE;

/// Print `id title` for every subscribed feed.
pub async fn list_feeds<B: Backend>(backend: &B, out: &mut impl Write) -> Result<()> {
    let mut feeds = backend.feeds().await.context("Failed to list feeds")?;
    feeds.sort_by_key(|f| f.id);
    for feed in &feeds {
        writeln!(out, "{} {}", feed.id, feed.title)?;
    }
    Ok(())
}

/// Every starred article, paged in fetch order.
async fn starred_articles<B: Backend>(backend: &B) -> Result<Vec<Article>> {
    let mut articles = Vec::new();
    loop {
        let query = HeadlineQuery::starred()
            .limit(PAGE_SIZE)
            .offset(articles.len());
        let page = backend
            .headlines(&query)
            .await
            .context("Failed to fetch starred articles")?;
        let fetched = page.len();
        articles.extend(page);
        if fetched < PAGE_SIZE {
            return Ok(articles);
        }
    }
}

/// Walk through starred articles `page_size` at a time, asking whether to
/// unstar each page. Returns how many stars were removed.
///
/// Articles are grouped by feed id. End of input ends the walk.
pub async fn unstar<B: Backend>(
    backend: &B,
    page_size: usize,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<usize> {
    let mut articles = starred_articles(backend).await?;
    // Stable, so the fetch order survives within a feed
    articles.sort_by_key(|a| a.feed_id);

    let mut unstarred = 0;
    for page in articles.chunks(page_size.max(1)) {
        for article in page {
            writeln!(
                out,
                "{}: {}: {}: {}",
                article.feed_id, article.feed_title, article.title, article.link
            )?;
        }
        writeln!(out, "{}", "#".repeat(80))?;
        write!(out, "Unstar messages? (y/n): ")?;
        out.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            writeln!(out)?;
            break;
        }
        if answer.trim() != "y" {
            continue;
        }

        for article in page {
            match backend.toggle_starred(article.id).await {
                Ok(()) => unstarred += 1,
                Err(e) => {
                    tracing::warn!(id = article.id, error = %e, kind = e.kind(), "Failed to unstar article");
                }
            }
        }
    }

    tracing::info!(unstarred, "Unstar finished");
    Ok(unstarred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{article, feed, MarkCall, MockBackend};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn starred_backend() -> MockBackend {
        MockBackend::new(
            vec![feed(2), feed(1)],
            vec![
                article(10, 2, "Later feed", false),
                article(11, 1, "First feed a", false),
                article(12, 1, "First feed b", true),
                article(13, 3, "Not starred", false),
            ],
        )
        .with_starred([10, 11, 12])
    }

    #[tokio::test]
    async fn test_list_feeds_sorted_by_id() {
        let backend = starred_backend();
        let mut out = Vec::new();

        list_feeds(&backend, &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "1 Feed 1\n2 Feed 2\n");
    }

    #[tokio::test]
    async fn test_list_feeds_failure() {
        let backend = MockBackend {
            feeds_down: true,
            ..MockBackend::default()
        };
        let mut out = Vec::new();
        assert!(list_feeds(&backend, &mut out).await.is_err());
    }

    #[tokio::test]
    async fn test_unstar_pages_and_prompts() {
        let backend = starred_backend();
        let mut input = Cursor::new("n\ny\n");
        let mut out = Vec::new();

        let unstarred = unstar(&backend, 2, &mut input, &mut out).await.unwrap();

        assert_eq!(unstarred, 1);
        assert_eq!(backend.calls(), vec![MarkCall::Toggled(10)]);
        assert_eq!(backend.starred().len(), 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "1: Feed 1: First feed b: https://example.com/1/12");
        assert_eq!(lines[1], "1: Feed 1: First feed a: https://example.com/1/11");
        assert_eq!(lines[2], "#".repeat(80));
        assert_eq!(text.matches("Unstar messages? (y/n): ").count(), 2);
    }

    #[tokio::test]
    async fn test_unstar_stops_at_end_of_input() {
        let backend = starred_backend();
        let mut input = Cursor::new("");
        let mut out = Vec::new();

        let unstarred = unstar(&backend, 1, &mut input, &mut out).await.unwrap();

        assert_eq!(unstarred, 0);
        assert!(backend.calls().is_empty());
        assert_eq!(
            String::from_utf8(out)
                .unwrap()
                .matches("Unstar messages?")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unstar_nothing_starred() {
        let backend = MockBackend::new(vec![feed(1)], vec![article(1, 1, "A", false)]);
        let mut input = Cursor::new("y\n");
        let mut out = Vec::new();

        assert_eq!(unstar(&backend, 20, &mut input, &mut out).await.unwrap(), 0);
        assert!(out.is_empty());
    }
}
