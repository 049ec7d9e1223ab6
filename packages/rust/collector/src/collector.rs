//! Concurrent collection of every page of a paginated API collection.
//!
//! Page 1 is fetched first to learn the pagination shape. Count-based
//! collections fan out the remaining pages over a bounded pool; cursor-based
//! collections follow `next` links one at a time. A failed page is logged and
//! its records are dropped; the rest of the collection still completes.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use gregory_shared::{ApiSettings, GregoryError, Keyed, Page, Result};

use crate::fetcher::{PageFetcher, page_url};

/// Upper bound on pages derived from an API `count`.
pub const MAX_PAGES: u64 = 50_000;

// ---------------------------------------------------------------------------
// CollectResult
// ---------------------------------------------------------------------------

/// A page that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    /// 1-based page number.
    pub page: u64,
    pub url: String,
    pub error: String,
}

/// Outcome of collecting one collection.
#[derive(Debug, Clone)]
pub struct CollectResult<T> {
    /// Decoded records from every page that succeeded, one per id, sorted by id.
    pub records: Vec<T>,
    /// Number of pages fetched successfully, page 1 included.
    pub pages_fetched: usize,
    /// Pages whose fetch failed; their records are absent from `records`.
    pub failed_pages: Vec<PageFailure>,
    /// Records dropped because they did not match the declared schema.
    pub rejected_records: usize,
    /// Records dropped because their id was already collected.
    pub duplicate_records: usize,
    pub duration: Duration,
}

impl<T> CollectResult<T> {
    fn empty(started: Instant) -> Self {
        Self {
            records: Vec::new(),
            pages_fetched: 1,
            failed_pages: Vec::new(),
            rejected_records: 0,
            duplicate_records: 0,
            duration: started.elapsed(),
        }
    }
}

/// Decoded records of one collection, keeping the first copy of each id.
struct Accumulator<T> {
    records: Vec<T>,
    ids: HashSet<i64>,
    rejected: usize,
    duplicates: usize,
}

impl<T: DeserializeOwned + Keyed> Accumulator<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            ids: HashSet::new(),
            rejected: 0,
            duplicates: 0,
        }
    }

    fn extend(&mut self, values: Vec<Value>, url: &str) {
        for value in values {
            match serde_json::from_value::<T>(value) {
                Ok(record) => {
                    let id = record.key();
                    if self.ids.insert(id) {
                        self.records.push(record);
                    } else {
                        self.duplicates += 1;
                        debug!(url, id, "duplicate record, keeping first copy");
                    }
                }
                Err(e) => {
                    self.rejected += 1;
                    warn!(url, error = %e, "record does not match schema, skipping");
                }
            }
        }
    }

    fn finish(mut self, pages_fetched: usize, failed_pages: Vec<PageFailure>) -> CollectResult<T> {
        self.records.sort_by_key(Keyed::key);
        CollectResult {
            records: self.records,
            pages_fetched,
            failed_pages,
            rejected_records: self.rejected,
            duplicate_records: self.duplicates,
            duration: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// ConcurrentCollector
// ---------------------------------------------------------------------------

/// Drives a [`PageFetcher`] across all pages of a collection.
#[derive(Debug, Clone)]
pub struct ConcurrentCollector {
    fetcher: PageFetcher,
    concurrency: usize,
}

impl ConcurrentCollector {
    /// Create a collector fetching at most `concurrency` pages at once.
    pub fn new(fetcher: PageFetcher, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Build a collector from resolved API settings.
    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        let fetcher = PageFetcher::new(Duration::from_secs(settings.timeout_secs))?;
        Ok(Self::new(fetcher, settings.page_concurrency))
    }

    /// Collect and decode every record of the collection at `base_url`.
    ///
    /// Fails only when page 1 cannot be fetched.
    pub async fn collect_all<T: DeserializeOwned + Keyed>(
        &self,
        base_url: &Url,
    ) -> Result<CollectResult<T>> {
        self.collect_all_observed(base_url, &|_, _| {}).await
    }

    /// Like [`collect_all`](Self::collect_all), calling `on_page(done, total)`
    /// after each completed page.
    #[instrument(skip_all, fields(url = %base_url))]
    pub async fn collect_all_observed<T: DeserializeOwned + Keyed>(
        &self,
        base_url: &Url,
        on_page: &(dyn Fn(usize, usize) + Sync),
    ) -> Result<CollectResult<T>> {
        let started = Instant::now();
        let first = self.fetcher.fetch(base_url).await?;

        if first.results.is_empty() || first.count == Some(0) {
            info!(count = ?first.count, "collection is empty");
            on_page(1, 1);
            return Ok(CollectResult::empty(started));
        }

        let mut result = match first.count {
            Some(count) => self.collect_counted(base_url, first, count, on_page).await,
            None => self.collect_cursor(base_url, first, on_page).await,
        };
        result.duration = started.elapsed();

        info!(
            records = result.records.len(),
            pages_fetched = result.pages_fetched,
            failed_pages = result.failed_pages.len(),
            rejected_records = result.rejected_records,
            duplicate_records = result.duplicate_records,
            duration_ms = result.duration.as_millis(),
            "collection complete"
        );

        Ok(result)
    }

    /// Fan out pages `2..=ceil(count / page_size)` over the bounded pool.
    ///
    /// A count implying more than [`MAX_PAGES`] pages is not trusted: the
    /// `next` cursor is followed instead, or only page 1 is kept.
    async fn collect_counted<T: DeserializeOwned + Keyed>(
        &self,
        base_url: &Url,
        first: Page,
        count: u64,
        on_page: &(dyn Fn(usize, usize) + Sync),
    ) -> CollectResult<T> {
        let page_size = first.results.len() as u64;
        let num_pages = count.div_ceil(page_size);

        if num_pages > MAX_PAGES {
            warn!(count, page_size, num_pages, max = MAX_PAGES, "implausible count");
            if first.next.is_some() {
                return self.collect_cursor(base_url, first, on_page).await;
            }
            let error = GregoryError::fetch(
                base_url.as_str(),
                None,
                format!("implausible count {count}: {num_pages} pages exceeds {MAX_PAGES}"),
            );
            let mut acc = Accumulator::new();
            acc.extend(first.results, base_url.as_str());
            on_page(1, 1);
            let failure = PageFailure {
                page: 2,
                url: page_url(base_url, 2).to_string(),
                error: error.to_string(),
            };
            return acc.finish(1, vec![failure]);
        }

        let total = num_pages as usize;
        debug!(count, page_size, num_pages, "count-based pagination");

        let mut acc = Accumulator::new();
        acc.extend(first.results, base_url.as_str());
        let mut pages_fetched = 1;
        let mut failed_pages = Vec::new();
        on_page(1, total);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut outstanding: BTreeSet<u64> = (2..=num_pages).collect();
        let mut tasks = JoinSet::new();

        for page in 2..=num_pages {
            let fetcher = self.fetcher.clone();
            let sem = semaphore.clone();
            let url = page_url(base_url, page);

            tasks.spawn(async move {
                let outcome = match sem.acquire_owned().await {
                    Ok(_permit) => fetcher.fetch(&url).await,
                    Err(e) => Err(GregoryError::fetch(
                        url.as_str(),
                        None,
                        format!("worker pool closed: {e}"),
                    )),
                };
                (page, url, outcome)
            });
        }

        // Completion handling is serialized here; workers only return pages.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((page, url, Ok(body))) => {
                    outstanding.remove(&page);
                    pages_fetched += 1;
                    acc.extend(body.results, url.as_str());
                }
                Ok((page, url, Err(e))) => {
                    outstanding.remove(&page);
                    warn!(page, %url, error = %e, "page fetch failed, dropping its records");
                    failed_pages.push(PageFailure {
                        page,
                        url: url.to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "page task aborted");
                }
            }
            on_page(pages_fetched + failed_pages.len(), total);
        }

        // Pages whose task panicked never reported back.
        for page in outstanding {
            failed_pages.push(PageFailure {
                page,
                url: page_url(base_url, page).to_string(),
                error: "page task aborted".into(),
            });
        }
        failed_pages.sort_by_key(|f| f.page);

        acc.finish(pages_fetched, failed_pages)
    }

    /// Follow `next` links sequentially until they run out.
    async fn collect_cursor<T: DeserializeOwned + Keyed>(
        &self,
        base_url: &Url,
        first: Page,
        on_page: &(dyn Fn(usize, usize) + Sync),
    ) -> CollectResult<T> {
        debug!("cursor-based pagination");

        let mut acc = Accumulator::new();
        acc.extend(first.results, base_url.as_str());
        let mut pages_fetched = 1;
        let mut failed_pages = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([base_url.to_string()]);
        let mut next = first.next;
        on_page(1, 1);

        while let Some(raw_next) = next.take() {
            let page = (pages_fetched + failed_pages.len() + 1) as u64;
            let url = match base_url.join(&raw_next) {
                Ok(url) => url,
                Err(e) => {
                    warn!(next = %raw_next, error = %e, "unparseable next link, stopping");
                    failed_pages.push(PageFailure {
                        page,
                        url: raw_next,
                        error: e.to_string(),
                    });
                    break;
                }
            };

            if !visited.insert(url.to_string()) {
                warn!(%url, "next link revisits a fetched page, stopping");
                break;
            }

            match self.fetcher.fetch(&url).await {
                Ok(body) => {
                    pages_fetched += 1;
                    acc.extend(body.results, url.as_str());
                    next = body.next;
                }
                Err(e) => {
                    // Without the body there is no cursor to continue from.
                    warn!(page, %url, error = %e, "page fetch failed, stopping cursor walk");
                    failed_pages.push(PageFailure {
                        page,
                        url: url.to_string(),
                        error: e.to_string(),
                    });
                }
            }
            on_page(pages_fetched + failed_pages.len(), pages_fetched + failed_pages.len());
        }

        acc.finish(pages_fetched, failed_pages)
    }
}
