//! Build configuration for the Gregory MS site.
//!
//! An optional `gregory.toml` supplies defaults. The CLI layers environment
//! variables and flags on top and resolves everything into one immutable
//! [`BuildConfig`] that is handed to every pipeline component.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GregoryError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "gregory.toml";

/// Config directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "gregory";

/// `strftime` layout of the run tag (e.g. `05-03-2024_14h07m09s`).
pub const RUN_TAG_FORMAT: &str = "%d-%m-%Y_%Hh%Mm%Ss";

// ---------------------------------------------------------------------------
// Config structs (matching gregory.toml schema)
// ---------------------------------------------------------------------------

/// Top-level file config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory layout.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Backend API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Where records come from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Published site settings.
    #[serde(default)]
    pub site: SiteConfig,

    /// Dashboard embed signing.
    #[serde(default)]
    pub embeds: EmbedsConfig,

    /// External press-kit step.
    #[serde(default)]
    pub presskit: PresskitConfig,

    /// Source checkout synchronisation.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// `[paths]` section. Relative paths resolve against `gregory_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the website checkout.
    #[serde(default = "default_gregory_dir")]
    pub gregory_dir: String,

    /// Site content root.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    /// Directory receiving the temporary tabular exports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Site generator destination directory.
    #[serde(default = "default_website_path")]
    pub website_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            gregory_dir: default_gregory_dir(),
            content_dir: default_content_dir(),
            output_dir: default_output_dir(),
            website_path: default_website_path(),
        }
    }
}

fn default_gregory_dir() -> String {
    ".".into()
}
fn default_content_dir() -> String {
    "content".into()
}
fn default_output_dir() -> String {
    "content/developers".into()
}
fn default_website_path() -> String {
    "public".into()
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root; entity collections live at `{base_url}/{entity}/`.
    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Maximum concurrent page fetches per collection.
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            page_concurrency: default_page_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.gregory-ms.com".into()
}
fn default_page_concurrency() -> usize {
    8
}
fn default_timeout_secs() -> u64 {
    30
}

/// Which backend the records are read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Paginated HTTP JSON API.
    #[default]
    Api,
    /// Direct query against a structured-store snapshot.
    Store,
}

/// `[source]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Snapshot database path, required when `kind = "store"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public base URL used for sitemap `<loc>` entries.
    #[serde(default = "default_site_url")]
    pub base_url: String,

    /// Static-site generator executable.
    #[serde(default = "default_generator")]
    pub generator: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_site_url(),
            generator: default_generator(),
        }
    }
}

fn default_site_url() -> String {
    "https://gregory-ms.com".into()
}
fn default_generator() -> String {
    "hugo".into()
}

/// `[embeds]` section. The signing secret is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedsConfig {
    /// Metabase site URL (overridden by `METABASE_SITE_URL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    /// JSON array of dashboard ids, relative to `gregory_dir`.
    #[serde(default = "default_dashboards_file")]
    pub dashboards_file: String,

    /// Output mapping file, relative to `gregory_dir`.
    #[serde(default = "default_embeds_file")]
    pub output_file: String,

    /// Token lifetime in days.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,
}

impl Default for EmbedsConfig {
    fn default() -> Self {
        Self {
            site_url: None,
            dashboards_file: default_dashboards_file(),
            output_file: default_embeds_file(),
            expiry_days: default_expiry_days(),
        }
    }
}

fn default_dashboards_file() -> String {
    "data/dashboards.json".into()
}
fn default_embeds_file() -> String {
    "data/embeds.json".into()
}
fn default_expiry_days() -> i64 {
    30
}

/// `[presskit]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresskitConfig {
    /// Command argv; empty disables the step.
    #[serde(default)]
    pub command: Vec<String>,
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run `git pull` before building.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Skip steps whose tool is missing instead of failing.
    #[serde(default)]
    pub tolerate_missing_tools: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerate_missing_tools: false,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config file + env + CLI flags)
// ---------------------------------------------------------------------------

/// How the site generator is invoked at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SiteMode {
    /// One-shot build into `website_path`.
    #[default]
    Build,
    /// Long-running development server.
    Server,
}

/// Resolved data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Api,
    Store(PathBuf),
}

/// A secret string whose `Debug` output is redacted.
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Settings for the paginated API collector.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub page_concurrency: usize,
    pub timeout_secs: u64,
}

/// Settings for dashboard embed signing.
#[derive(Debug, Clone)]
pub struct EmbedSettings {
    pub site_url: Option<String>,
    pub secret: Option<Secret>,
    pub dashboards_file: PathBuf,
    pub output_file: PathBuf,
    pub expiry_days: i64,
}

/// Values that override the file config, collected by the CLI from
/// environment variables and flags.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub gregory_dir: Option<PathBuf>,
    pub website_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub source: Option<SourceKind>,
    pub store_path: Option<PathBuf>,
    pub metabase_site_url: Option<String>,
    pub metabase_secret: Option<Secret>,
    pub site_mode: SiteMode,
    pub fast: bool,
    pub tolerate_missing_tools: bool,
}

/// Immutable configuration for one build invocation.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub gregory_dir: PathBuf,
    pub content_dir: PathBuf,
    pub output_dir: PathBuf,
    pub website_path: PathBuf,
    pub sitemap_path: PathBuf,
    pub categories_dir: PathBuf,
    pub api: ApiSettings,
    pub source: DataSource,
    pub site_base_url: String,
    pub generator: String,
    pub site_mode: SiteMode,
    pub fast: bool,
    pub sync_enabled: bool,
    pub tolerate_missing_tools: bool,
    pub presskit_command: Vec<String>,
    pub embeds: EmbedSettings,
    /// Timestamp tag suffixed to this run's export files.
    pub run_tag: String,
}

impl BuildConfig {
    /// Merge the file config with CLI/env overrides. `started_at` fixes the run tag.
    pub fn resolve(
        app: &AppConfig,
        overrides: BuildOverrides,
        started_at: NaiveDateTime,
    ) -> Result<Self> {
        let gregory_dir = overrides
            .gregory_dir
            .unwrap_or_else(|| PathBuf::from(&app.paths.gregory_dir));

        let content_dir = resolve_path(&gregory_dir, Path::new(&app.paths.content_dir));
        let output_dir = match overrides.output_dir {
            Some(p) => resolve_path(&gregory_dir, &p),
            None => resolve_path(&gregory_dir, Path::new(&app.paths.output_dir)),
        };
        let website_path = match overrides.website_path {
            Some(p) => resolve_path(&gregory_dir, &p),
            None => resolve_path(&gregory_dir, Path::new(&app.paths.website_path)),
        };

        let api_url = overrides.api_url.as_deref().unwrap_or(&app.api.base_url);
        let base_url = Url::parse(api_url)
            .map_err(|e| GregoryError::config(format!("invalid API URL '{api_url}': {e}")))?;

        if app.api.page_concurrency == 0 {
            return Err(GregoryError::config("api.page_concurrency must be at least 1"));
        }

        let source = match overrides.source.unwrap_or(app.source.kind) {
            SourceKind::Api => DataSource::Api,
            SourceKind::Store => {
                let path = overrides
                    .store_path
                    .or_else(|| app.source.store_path.as_ref().map(PathBuf::from))
                    .ok_or_else(|| {
                        GregoryError::config(
                            "source.kind = \"store\" requires a store path (GREGORY_STORE_PATH)",
                        )
                    })?;
                DataSource::Store(resolve_path(&gregory_dir, &path))
            }
        };

        let embeds = EmbedSettings {
            site_url: overrides
                .metabase_site_url
                .or_else(|| app.embeds.site_url.clone()),
            secret: overrides.metabase_secret,
            dashboards_file: resolve_path(&gregory_dir, Path::new(&app.embeds.dashboards_file)),
            output_file: resolve_path(&gregory_dir, Path::new(&app.embeds.output_file)),
            expiry_days: app.embeds.expiry_days,
        };

        Ok(Self {
            sitemap_path: content_dir.join("articles_trials.xml"),
            categories_dir: content_dir.join("categories"),
            content_dir,
            output_dir,
            website_path,
            api: ApiSettings {
                base_url,
                page_concurrency: app.api.page_concurrency,
                timeout_secs: app.api.timeout_secs,
            },
            source,
            site_base_url: app.site.base_url.trim_end_matches('/').to_string(),
            generator: app.site.generator.clone(),
            site_mode: overrides.site_mode,
            fast: overrides.fast,
            sync_enabled: app.sync.enabled,
            tolerate_missing_tools: overrides.tolerate_missing_tools
                || app.sync.tolerate_missing_tools,
            presskit_command: app.presskit.command.clone(),
            embeds,
            run_tag: started_at.format(RUN_TAG_FORMAT).to_string(),
            gregory_dir,
        })
    }
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Locate the config file: `./gregory.toml`, then `<config_dir>/gregory/gregory.toml`.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    let global = dirs::config_dir()?.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
    global.exists().then_some(global)
}

/// Load the file config, returning defaults when no file is found.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match explicit.map(Path::to_path_buf).or_else(find_config_file) {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Load the file config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GregoryError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| GregoryError::config(format!("failed to parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn started_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap()
    }

    #[test]
    fn default_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.api.page_concurrency, 8);
        assert_eq!(parsed.api.timeout_secs, 30);
        assert_eq!(parsed.paths.output_dir, "content/developers");
        assert_eq!(parsed.source.kind, SourceKind::Api);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[api]
base_url = "https://api.example.org"

[presskit]
command = ["python3", "-m", "presskit"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.api.base_url, "https://api.example.org");
        assert_eq!(config.api.page_concurrency, 8);
        assert_eq!(config.presskit.command.len(), 3);
        assert!(config.sync.enabled);
    }

    #[test]
    fn run_tag_uses_day_first_layout() {
        let cfg = BuildConfig::resolve(&AppConfig::default(), BuildOverrides::default(), started_at())
            .expect("resolve");
        assert_eq!(cfg.run_tag, "05-03-2024_14h07m09s");
    }

    #[test]
    fn paths_resolve_against_gregory_dir() {
        let overrides = BuildOverrides {
            gregory_dir: Some(PathBuf::from("/srv/gregory")),
            output_dir: Some(PathBuf::from("/tmp/exports")),
            ..Default::default()
        };
        let cfg = BuildConfig::resolve(&AppConfig::default(), overrides, started_at()).unwrap();
        assert_eq!(cfg.content_dir, PathBuf::from("/srv/gregory/content"));
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/exports"));
        assert_eq!(cfg.sitemap_path, PathBuf::from("/srv/gregory/content/articles_trials.xml"));
        assert_eq!(cfg.categories_dir, PathBuf::from("/srv/gregory/content/categories"));
        assert_eq!(cfg.website_path, PathBuf::from("/srv/gregory/public"));
    }

    #[test]
    fn store_source_requires_path() {
        let overrides = BuildOverrides {
            source: Some(SourceKind::Store),
            ..Default::default()
        };
        let err = BuildConfig::resolve(&AppConfig::default(), overrides, started_at()).unwrap_err();
        assert!(err.to_string().contains("store path"));
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let overrides = BuildOverrides {
            api_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(BuildConfig::resolve(&AppConfig::default(), overrides, started_at()).is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.expose(), "hunter2");
    }
}
