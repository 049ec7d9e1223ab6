//! End-to-end build: sync → acquire → normalize → artifacts → presskit →
//! embeds → cleanup → site generator.
//!
//! Fast mode skips everything between sync and the site generator and only
//! rebuilds from content already on disk.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument, warn};

use gregory_artifacts::{
    CategoryMaterializer, ExportedFile, MaterializeReport, SitemapBuilder, TabularExporter,
};
use gregory_normalize::{NormalizeStats, normalize};
use gregory_shared::{BuildConfig, Entity, GregoryError, Result};

use crate::cleanup::remove_exports;
use crate::embeds::generate_embeds;
use crate::external::{Toolchain, git_pull, run_presskit, run_site_generator};
use crate::source::{self, CollectionStats, RawDataset};

// ---------------------------------------------------------------------------
// Progress & report
// ---------------------------------------------------------------------------

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each API page of `entity` completes.
    fn page_fetched(&self, entity: Entity, done: usize, total: usize);
    /// Called when the build completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_fetched(&self, _entity: Entity, _done: usize, _total: usize) {}
    fn done(&self, _report: &BuildReport) {}
}

/// Outcome of a step that may be skipped or fail without aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Skipped(String),
    Failed(String),
}

impl Default for StepOutcome {
    fn default() -> Self {
        Self::Skipped("not run".into())
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Skipped(why) => write!(f, "skipped ({why})"),
            Self::Failed(why) => write!(f, "failed ({why})"),
        }
    }
}

/// Result of one build run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub fast: bool,
    pub sync: StepOutcome,
    pub collections: Vec<CollectionStats>,
    pub normalization: Vec<(Entity, NormalizeStats)>,
    pub categories: Option<MaterializeReport>,
    pub sitemap_urls: Option<usize>,
    /// Export files written this run; removed again during cleanup.
    pub exported: Vec<ExportedFile>,
    pub cleaned_up: usize,
    pub presskit: StepOutcome,
    pub embeds: StepOutcome,
    pub site: StepOutcome,
    pub elapsed: Duration,
}

impl BuildReport {
    /// Total pages that failed across all collections.
    pub fn failed_pages(&self) -> usize {
        self.collections.iter().map(|c| c.failed_pages.len()).sum()
    }

    pub fn records(&self, entity: Entity) -> usize {
        self.collections
            .iter()
            .find(|c| c.entity == entity)
            .map_or(0, |c| c.records)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences one build over an immutable [`BuildConfig`].
pub struct BuildOrchestrator<'a> {
    config: &'a BuildConfig,
    toolchain: Toolchain,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(config: &'a BuildConfig, toolchain: Toolchain) -> Self {
        Self { config, toolchain }
    }

    /// Run the build. Step-level failures of the source sync (full mode),
    /// data acquisition, artifact writing and the site generator abort the
    /// run; presskit and embed failures are recorded in the report.
    #[instrument(skip_all, fields(run_tag = %self.config.run_tag, fast = self.config.fast))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<BuildReport> {
        let start = Instant::now();
        let mut report = BuildReport {
            fast: self.config.fast,
            ..Default::default()
        };

        info!(gregory_dir = %self.config.gregory_dir.display(), "starting build");

        // --- Phase 1: Source sync ---
        progress.phase("Syncing source checkout");
        report.sync = self.sync_sources().await?;

        if self.config.fast {
            info!("fast mode: skipping data refresh");
        } else {
            // --- Phase 2: Data & artifacts ---
            self.refresh_content(&mut report, progress).await?;

            // --- Phase 3: Press kit ---
            progress.phase("Running press kit");
            report.presskit = self.presskit().await;

            // --- Phase 4: Embeds ---
            progress.phase("Signing dashboard embeds");
            report.embeds = self.embeds();

            // --- Phase 5: Cleanup ---
            progress.phase("Removing temporary exports");
            let paths: Vec<PathBuf> = report.exported.iter().map(|f| f.path.clone()).collect();
            report.cleaned_up = remove_exports(&paths);
        }

        // --- Phase 6: Site generator ---
        progress.phase("Building site");
        report.site = self.build_site().await?;

        report.elapsed = start.elapsed();
        progress.done(&report);

        info!(
            failed_pages = report.failed_pages(),
            sitemap_urls = ?report.sitemap_urls,
            exported = report.exported.len(),
            site = %report.site,
            elapsed_ms = report.elapsed.as_millis(),
            "build complete"
        );

        Ok(report)
    }

    async fn sync_sources(&self) -> Result<StepOutcome> {
        if !self.config.sync_enabled {
            return Ok(StepOutcome::Skipped("disabled".into()));
        }

        let Some(git) = &self.toolchain.git else {
            if self.config.tolerate_missing_tools || self.config.fast {
                warn!("git not found, skipping source sync");
                return Ok(StepOutcome::Skipped("git not found".into()));
            }
            return Err(GregoryError::external("git", "not found on PATH"));
        };

        match git_pull(git, &self.config.gregory_dir).await {
            Ok(()) => Ok(StepOutcome::Done),
            Err(e) if self.config.fast => {
                warn!(error = %e, "source sync failed, continuing with local content");
                Ok(StepOutcome::Failed(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_content(&self, report: &mut BuildReport, progress: &dyn ProgressReporter) -> Result<()> {
        progress.phase("Fetching data");
        let RawDataset {
            articles,
            trials,
            categories,
            stats,
        } = source::acquire(self.config, progress).await?;
        report.collections = stats;

        progress.phase("Normalizing records");
        let articles = normalize(articles);
        let trials = normalize(trials);
        let categories = normalize(categories);
        report.normalization = vec![
            (Entity::Articles, articles.stats),
            (Entity::Trials, trials.stats),
            (Entity::Categories, categories.stats),
        ];

        progress.phase("Materializing categories");
        let materializer = CategoryMaterializer::new(&self.config.categories_dir);
        report.categories = Some(materializer.materialize(&categories.rows)?);

        progress.phase("Writing sitemap");
        let sitemap = SitemapBuilder::new(self.config.site_base_url.as_str())
            .build(&articles.rows, &trials.rows)?;
        sitemap.write_to(&self.config.sitemap_path)?;
        report.sitemap_urls = Some(sitemap.url_count);

        progress.phase("Exporting tables");
        let exporter = TabularExporter::new(&self.config.output_dir, self.config.run_tag.as_str());
        report
            .exported
            .extend(exporter.export(&articles.rows, Entity::Articles)?);
        report
            .exported
            .extend(exporter.export(&trials.rows, Entity::Trials)?);

        Ok(())
    }

    async fn presskit(&self) -> StepOutcome {
        if self.config.presskit_command.is_empty() {
            return StepOutcome::Skipped("not configured".into());
        }
        match run_presskit(&self.config.presskit_command, &self.config.gregory_dir).await {
            Ok(()) => StepOutcome::Done,
            Err(e) => {
                warn!(error = %e, "press kit failed, continuing");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    fn embeds(&self) -> StepOutcome {
        let embeds = &self.config.embeds;
        if embeds.site_url.is_none() || embeds.secret.is_none() {
            warn!("METABASE_SITE_URL or METABASE_SECRET_KEY not set, skipping embeds");
            return StepOutcome::Skipped("Metabase not configured".into());
        }
        match generate_embeds(embeds, Utc::now()) {
            Ok(_) => StepOutcome::Done,
            Err(e) => {
                warn!(error = %e, "embed generation failed, continuing");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn build_site(&self) -> Result<StepOutcome> {
        let Some(generator) = &self.toolchain.generator else {
            if self.config.tolerate_missing_tools {
                warn!(generator = %self.config.generator, "site generator not found, skipping");
                return Ok(StepOutcome::Skipped(format!("{} not found", self.config.generator)));
            }
            return Err(GregoryError::external(
                self.config.generator.as_str(),
                "not found on PATH",
            ));
        };

        run_site_generator(
            generator,
            self.config.site_mode,
            &self.config.website_path,
            &self.config.gregory_dir,
        )
        .await?;
        Ok(StepOutcome::Done)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
