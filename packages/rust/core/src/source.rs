//! Data acquisition: the paginated HTTP API or a libSQL snapshot.
//!
//! Both sources yield the same raw record types, so everything downstream
//! of this module is source-agnostic.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, instrument};
use url::Url;

use gregory_collector::{CollectResult, ConcurrentCollector, PageFailure};
use gregory_shared::{
    ApiSettings, BuildConfig, DataSource, Entity, GregoryError, RawArticle, RawCategory,
    RawTrial, Result,
};
use gregory_storage::Storage;

use crate::pipeline::ProgressReporter;

/// Per-entity acquisition counters.
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub entity: Entity,
    pub records: usize,
    /// Zero for the store source.
    pub pages_fetched: usize,
    pub failed_pages: Vec<PageFailure>,
    pub rejected_records: usize,
    pub duration: Duration,
}

impl CollectionStats {
    fn from_collect<T>(entity: Entity, result: &CollectResult<T>) -> Self {
        Self {
            entity,
            records: result.records.len(),
            pages_fetched: result.pages_fetched,
            failed_pages: result.failed_pages.clone(),
            rejected_records: result.rejected_records,
            duration: result.duration,
        }
    }
}

/// Everything one build reads before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub articles: Vec<RawArticle>,
    pub trials: Vec<RawTrial>,
    pub categories: Vec<RawCategory>,
    pub stats: Vec<CollectionStats>,
}

/// `{base}/{entity}/?format=json`.
pub fn endpoint(base: &Url, entity: Entity) -> Result<Url> {
    let raw = format!("{}/{entity}/", base.as_str().trim_end_matches('/'));
    let mut url = Url::parse(&raw)
        .map_err(|e| GregoryError::config(format!("invalid endpoint '{raw}': {e}")))?;
    url.query_pairs_mut().append_pair("format", "json");
    Ok(url)
}

/// Read articles, trials and categories from the configured source.
pub async fn acquire(config: &BuildConfig, progress: &dyn ProgressReporter) -> Result<RawDataset> {
    match &config.source {
        DataSource::Api => acquire_api(&config.api, progress).await,
        DataSource::Store(path) => acquire_store(path).await,
    }
}

/// Fetch the three collections concurrently, each over its own page pool.
#[instrument(skip_all, fields(base_url = %settings.base_url))]
pub async fn acquire_api(settings: &ApiSettings, progress: &dyn ProgressReporter) -> Result<RawDataset> {
    let collector = ConcurrentCollector::from_settings(settings)?;

    let articles_url = endpoint(&settings.base_url, Entity::Articles)?;
    let trials_url = endpoint(&settings.base_url, Entity::Trials)?;
    let categories_url = endpoint(&settings.base_url, Entity::Categories)?;

    let on_articles = |done, total| progress.page_fetched(Entity::Articles, done, total);
    let on_trials = |done, total| progress.page_fetched(Entity::Trials, done, total);
    let on_categories = |done, total| progress.page_fetched(Entity::Categories, done, total);

    let (articles, trials, categories) = tokio::join!(
        collector.collect_all_observed::<RawArticle>(&articles_url, &on_articles),
        collector.collect_all_observed::<RawTrial>(&trials_url, &on_trials),
        collector.collect_all_observed::<RawCategory>(&categories_url, &on_categories),
    );
    let (articles, trials, categories) = (articles?, trials?, categories?);

    let stats = vec![
        CollectionStats::from_collect(Entity::Articles, &articles),
        CollectionStats::from_collect(Entity::Trials, &trials),
        CollectionStats::from_collect(Entity::Categories, &categories),
    ];

    Ok(RawDataset {
        articles: articles.records,
        trials: trials.records,
        categories: categories.records,
        stats,
    })
}

#[instrument(skip_all, fields(path = %path.display()))]
pub async fn acquire_store(path: &Path) -> Result<RawDataset> {
    let started = Instant::now();
    let store = Storage::open_readonly(path).await?;

    let articles = store.load_articles().await?;
    let trials = store.load_trials().await?;
    let categories = store.load_categories().await?;

    let stats_for = |entity, records| CollectionStats {
        entity,
        records,
        pages_fetched: 0,
        failed_pages: Vec::new(),
        rejected_records: 0,
        duration: started.elapsed(),
    };
    let stats = vec![
        stats_for(Entity::Articles, articles.len()),
        stats_for(Entity::Trials, trials.len()),
        stats_for(Entity::Categories, categories.len()),
    ];

    info!(
        articles = articles.len(),
        trials = trials.len(),
        categories = categories.len(),
        "store read complete"
    );

    Ok(RawDataset {
        articles,
        trials,
        categories,
        stats,
    })
}
