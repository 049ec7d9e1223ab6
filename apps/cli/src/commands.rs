//! CLI flag surface, tracing setup, and build dispatch.

use std::path::PathBuf;

use chrono::Local;
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use gregory_core::{BuildOrchestrator, BuildReport, ProgressReporter, Toolchain};
use gregory_shared::{
    BuildConfig, BuildOverrides, Entity, Secret, SiteMode, SourceKind, load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Gregory MS site build: refresh data, write artifacts, run the site generator.
#[derive(Parser)]
#[command(
    name = "gregory-build",
    version,
    about = "Fetch Gregory MS data, write site artifacts, and build the website.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Run the full pipeline and a one-shot site build (default).
    #[arg(long)]
    pub build: bool,

    /// Run the full pipeline, then start the site generator's dev server.
    /// Takes precedence over `--build`.
    #[arg(long)]
    pub server: bool,

    /// Skip data refresh; only sync the checkout and rebuild the site.
    #[arg(long)]
    pub fast: bool,

    /// Skip steps whose external tool is missing instead of failing.
    #[arg(long)]
    pub auto_install: bool,

    /// Directory for the temporary tabular exports.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to ./gregory.toml, then the user config dir).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data source override.
    #[arg(long, value_enum)]
    pub source: Option<SourceArg>,

    /// libSQL snapshot for `--source store`.
    #[arg(long, env = "GREGORY_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Gregory site checkout.
    #[arg(long, env = "GREGORY_DIR")]
    pub gregory_dir: Option<PathBuf>,

    /// Site generator output directory.
    #[arg(long, env = "WEBSITE_PATH")]
    pub website_path: Option<PathBuf>,

    /// Backend API root.
    #[arg(long, env = "GREGORY_API_URL")]
    pub api_url: Option<String>,

    /// Metabase site URL for dashboard embeds.
    #[arg(long, env = "METABASE_SITE_URL")]
    pub metabase_site_url: Option<String>,

    /// Metabase embedding secret.
    #[arg(long, env = "METABASE_SECRET_KEY", hide_env_values = true)]
    pub metabase_secret_key: Option<String>,

    /// Print the resolved file configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum SourceArg {
    Api,
    Store,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Api => SourceKind::Api,
            SourceArg::Store => SourceKind::Store,
        }
    }
}

impl Cli {
    /// `--build` is also the default; `--server` wins when both are given.
    fn site_mode(&self) -> SiteMode {
        match (self.build, self.server) {
            (_, true) => SiteMode::Server,
            (true, false) | (false, false) => SiteMode::Build,
        }
    }

    fn overrides(&self) -> BuildOverrides {
        BuildOverrides {
            gregory_dir: self.gregory_dir.clone(),
            website_path: self.website_path.clone(),
            output_dir: self.output.clone(),
            api_url: self.api_url.clone(),
            source: self.source.map(SourceKind::from),
            store_path: self.store_path.clone(),
            metabase_site_url: self.metabase_site_url.clone(),
            metabase_secret: self.metabase_secret_key.clone().map(Secret::new),
            site_mode: self.site_mode(),
            fast: self.fast,
            tolerate_missing_tools: self.auto_install,
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gregory=info",
        1 => "gregory=debug",
        _ => "gregory=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Resolve configuration and run one build.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let app = load_config(cli.config.as_deref())?;

    if cli.print_config {
        let rendered = toml::to_string_pretty(&app).wrap_err("failed to render config")?;
        print!("{rendered}");
        return Ok(());
    }

    let config = BuildConfig::resolve(&app, cli.overrides(), Local::now().naive_local())?;
    info!(
        gregory_dir = %config.gregory_dir.display(),
        run_tag = %config.run_tag,
        fast = config.fast,
        mode = ?config.site_mode,
        "configuration resolved"
    );

    let toolchain = Toolchain::probe(&config.generator).await;
    let reporter = CliProgress::new();

    let report = match BuildOrchestrator::new(&config, toolchain).run(&reporter).await {
        Ok(report) => report,
        Err(e) => {
            reporter.spinner.abandon_with_message("Build failed");
            return Err(e.into());
        }
    };

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &BuildReport) {
    println!();
    println!("  Build complete!");
    println!("  Mode:       {}", if report.fast { "fast" } else { "full" });
    println!("  Sync:       {}", report.sync);

    if !report.fast {
        for stats in &report.collections {
            let label = match stats.entity {
                Entity::Articles => "Articles:",
                Entity::Trials => "Trials:",
                Entity::Categories => "Categories:",
            };
            println!(
                "  {label:<11} {} records ({} failed pages, {} rejected)",
                stats.records,
                stats.failed_pages.len(),
                stats.rejected_records
            );
        }
        if let Some(categories) = &report.categories {
            println!(
                "  Taxonomy:   {} created, {} skipped",
                categories.created.len(),
                categories.skipped.len()
            );
        }
        if let Some(urls) = report.sitemap_urls {
            println!("  Sitemap:    {urls} URLs");
        }
        println!(
            "  Exports:    {} written, {} removed",
            report.exported.len(),
            report.cleaned_up
        );
        println!("  Press kit:  {}", report.presskit);
        println!("  Embeds:     {}", report.embeds);
    }

    println!("  Site:       {}", report.site);
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_fetched(&self, entity: Entity, done: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching {entity} [{done}/{total}]"));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}
