//! The poll loop.
//!
//! A [`Scheduler`] owns the recency cache and the checkpoint. Each cycle it
//! collects every unread article newer than the checkpoint, classifies them
//! in order, marks duplicates and then sleeps. Every backend await and the
//! sleep are raced against the shutdown flag, so an interrupt drops the
//! in-flight cycle without persisting it.

use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use crate::backend::{Article, Backend, BackendError, HeadlineQuery, SortOrder};
use crate::config::DedupConfig;
use crate::dedup::{Classifier, DuplicateReason, LearnedRecord, RecencyCache, Verdict};
use crate::learn::{self, PAGE_SIZE};
use crate::shutdown::Shutdown;
use crate::state::{StateError, StateFile};

/// Upper bound on pages fetched in one cycle. Whatever is left over is
/// picked up by the next cycle since the checkpoint only covers what was
/// processed.
const MAX_PAGES_PER_CYCLE: usize = 50;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    State(#[from] StateError),
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::State(_) => "state",
        }
    }
}

/// Loop timing and marking policy.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interval: Duration,
    pub learn_count: usize,
    /// Cycles between forced re-learns, 0 disables
    pub relearn_interval: u64,
    /// Feeds whose duplicates are marked read without a star
    pub nostar: HashSet<i64>,
}

impl LoopSettings {
    pub fn from_config(config: &DedupConfig) -> Self {
        Self {
            interval: config.sleep_interval(),
            learn_count: config.learn_count,
            relearn_interval: config.relearn_interval,
            nostar: config.nostar.iter().copied().collect(),
        }
    }
}

/// What one cycle saw and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Articles newer than the checkpoint that were classified
    pub seen: usize,
    pub exempt: usize,
    pub url_duplicates: usize,
    pub title_duplicates: usize,
    /// Duplicates successfully marked read
    pub marked: usize,
    /// Mark calls that failed
    pub mark_failures: usize,
}

impl CycleReport {
    pub fn duplicates(&self) -> usize {
        self.url_duplicates + self.title_duplicates
    }
}

pub struct Scheduler<B> {
    backend: B,
    classifier: Classifier,
    cache: RecencyCache,
    state: StateFile,
    settings: LoopSettings,
    checkpoint: i64,
    /// Last value written to the state file
    persisted: Option<i64>,
    /// Completed poll cycles
    cycles: u64,
}

impl<B: Backend> Scheduler<B> {
    pub fn new(backend: B, config: &DedupConfig, state: StateFile) -> Self {
        Self {
            backend,
            classifier: Classifier::from_config(config),
            cache: RecencyCache::new(config.max_count),
            state,
            settings: LoopSettings::from_config(config),
            checkpoint: 0,
            persisted: None,
            cycles: 0,
        }
    }

    /// Load or compute the checkpoint, then warm the cache.
    pub async fn start(&mut self) {
        let stored = self.state.load();
        if stored > 0 {
            self.checkpoint = stored;
            self.persisted = Some(stored);
        } else {
            self.checkpoint = self.live_checkpoint().await;
        }
        tracing::info!(checkpoint = self.checkpoint, "Starting from checkpoint");

        self.learn(false).await;
    }

    /// Newest article id minus the unread count: everything above it is
    /// assumed to be still unread.
    async fn live_checkpoint(&self) -> i64 {
        let newest = HeadlineQuery::all().limit(1).order(SortOrder::NewestFirst);
        let computed: Result<i64, BackendError> = async {
            let latest = self
                .backend
                .headlines(&newest)
                .await?
                .first()
                .map_or(0, |a| a.id);
            let unread = self.backend.unread_count().await?;
            Ok((latest - unread).max(0))
        }
        .await;

        computed.unwrap_or_else(|e| {
            tracing::warn!(error = %e, kind = e.kind(), "Failed to compute checkpoint, using 0");
            0
        })
    }

    async fn learn(&mut self, force: bool) {
        if let Err(e) =
            learn::warm_up(&self.backend, &mut self.cache, self.settings.learn_count, force).await
        {
            tracing::warn!(error = %e, kind = e.kind(), force, "Warm-up failed");
        }
    }

    /// Poll until `shutdown` fires.
    pub async fn run(&mut self, shutdown: &mut Shutdown) {
        loop {
            let stopped = tokio::select! {
                biased;
                _ = shutdown.wait() => true,
                _ = self.tick() => false,
            };
            if stopped {
                break;
            }

            let stopped = tokio::select! {
                biased;
                _ = shutdown.wait() => true,
                _ = tokio::time::sleep(self.settings.interval) => false,
            };
            if stopped {
                break;
            }
        }
        tracing::info!(cycles = self.cycles, "Stopping poll loop");
    }

    /// One loop iteration: re-learn when due, then a live cycle.
    async fn tick(&mut self) {
        let relearn = self.settings.relearn_interval;
        if relearn > 0 && self.cycles > 0 && self.cycles % relearn == 0 {
            tracing::info!(cycles = self.cycles, "Re-learning feed history");
            self.learn(true).await;
        }

        match self.run_cycle().await {
            Ok(report) if report.duplicates() > 0 => {
                tracing::info!(
                    seen = report.seen,
                    duplicates = report.duplicates(),
                    marked = report.marked,
                    checkpoint = self.checkpoint,
                    "Cycle finished"
                );
            }
            Ok(report) => {
                tracing::debug!(seen = report.seen, checkpoint = self.checkpoint, "Cycle finished");
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "Cycle failed");
            }
        }
        self.cycles += 1;
    }

    /// One live pass: duplicates are marked and the checkpoint is persisted.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.cycle(true).await
    }

    /// One dry pass: nothing is marked and the checkpoint stays on disk as is.
    pub async fn evaluate(&mut self) -> Result<CycleReport, CycleError> {
        self.cycle(false).await
    }

    async fn cycle(&mut self, live: bool) -> Result<CycleReport, CycleError> {
        let start = self.checkpoint;
        let articles = match self.fetch_unread(start).await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!(error = %e, kind = e.kind(), since = start, "Failed to fetch unread articles");
                Vec::new()
            }
        };

        let mut report = CycleReport::default();
        for article in &articles {
            if article.id <= start {
                continue;
            }
            report.seen += 1;
            tracing::debug!(id = article.id, feed = %article.feed_title, title = %article.title, "Checking article");

            match self.classifier.classify(article, &self.cache) {
                Verdict::Unique => {}
                Verdict::Exempt(reason) => {
                    report.exempt += 1;
                    tracing::debug!(id = article.id, ?reason, "Article exempt");
                }
                Verdict::Duplicate { reason, matched } => {
                    let score = match reason {
                        DuplicateReason::Url => {
                            report.url_duplicates += 1;
                            100
                        }
                        DuplicateReason::Title { score } => {
                            report.title_duplicates += 1;
                            score
                        }
                    };
                    tracing::info!(
                        id = article.id,
                        feed = %article.feed_title,
                        title = %article.title,
                        %reason,
                        matched = %matched.title(),
                        score,
                        "Duplicate"
                    );
                    if live {
                        self.mark_duplicate(article, &mut report).await;
                    }
                }
            }

            self.cache.append(LearnedRecord::from_article(article));
            self.checkpoint = self.checkpoint.max(article.id);
        }

        if live && self.persisted != Some(self.checkpoint) {
            self.state.save(self.checkpoint)?;
            self.persisted = Some(self.checkpoint);
        }
        Ok(report)
    }

    /// Collect every unread article above `since`, oldest first, before
    /// anything gets marked so paging offsets stay stable.
    async fn fetch_unread(&self, since: i64) -> Result<Vec<Article>, BackendError> {
        let mut articles = Vec::new();
        for page_number in 0..MAX_PAGES_PER_CYCLE {
            let query = HeadlineQuery::unread()
                .since(since)
                .limit(PAGE_SIZE)
                .offset(page_number * PAGE_SIZE)
                .order(SortOrder::OldestFirst);
            let page = self.backend.headlines(&query).await?;
            let fetched = page.len();
            articles.extend(page);
            if fetched < PAGE_SIZE {
                return Ok(articles);
            }
        }
        tracing::warn!(
            fetched = articles.len(),
            "Unread backlog exceeds one cycle, continuing next cycle"
        );
        Ok(articles)
    }

    /// Star unless the feed is on the no-star list, then mark read.
    async fn mark_duplicate(&self, article: &Article, report: &mut CycleReport) {
        if !self.settings.nostar.contains(&article.feed_id) {
            if let Err(e) = self.backend.mark_starred(article.id).await {
                report.mark_failures += 1;
                tracing::warn!(id = article.id, error = %e, kind = e.kind(), "Failed to star duplicate");
            }
        }
        match self.backend.mark_read(article.id).await {
            Ok(()) => report.marked += 1,
            Err(e) => {
                report.mark_failures += 1;
                tracing::warn!(id = article.id, error = %e, kind = e.kind(), "Failed to mark duplicate read");
            }
        }
    }

    pub fn checkpoint(&self) -> i64 {
        self.checkpoint
    }

    pub fn cache(&self) -> &RecencyCache {
        &self.cache
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
