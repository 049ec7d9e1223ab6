//! Category content tree: one `{slug}/_index.md` per category.
//!
//! Existing index documents are never touched, so re-running a build over
//! the same content directory is a no-op for categories already present.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use gregory_shared::{CategoryRow, GregoryError, Result};

use crate::slug::slugify;

/// Index document name inside each category directory.
pub const INDEX_FILE: &str = "_index.md";

const FRONT_MATTER_DELIMITER: &str = "+++";

/// Why a category produced no new index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// `_index.md` was already present.
    Exists,
    /// An earlier category in this run resolved to the same slug.
    Collision { first: String },
    /// The name has no ASCII alphanumerics to build a slug from.
    EmptySlug,
    /// Creating the directory or document failed.
    Failed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exists => f.write_str("exists"),
            Self::Collision { first } => write!(f, "collision with {first:?}"),
            Self::EmptySlug => f.write_str("empty slug"),
            Self::Failed(cause) => write!(f, "failed: {cause}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCategory {
    pub name: String,
    pub slug: String,
    pub reason: SkipReason,
}

/// Outcome of one materialization pass.
#[derive(Debug, Clone, Default)]
pub struct MaterializeReport {
    /// Index documents written in this pass.
    pub created: Vec<PathBuf>,
    pub skipped: Vec<SkippedCategory>,
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    slug: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Materializes category directories under a base directory.
#[derive(Debug, Clone)]
pub struct CategoryMaterializer {
    base_dir: PathBuf,
}

impl CategoryMaterializer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Ensure each category has a directory and index document.
    ///
    /// Only a failure to create the base directory is an error; per-category
    /// problems are logged and reported as skipped.
    #[instrument(skip_all, fields(base_dir = %self.base_dir.display(), categories = categories.len()))]
    pub fn materialize(&self, categories: &[CategoryRow]) -> Result<MaterializeReport> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| GregoryError::materialize(&self.base_dir, e))?;

        let mut report = MaterializeReport::default();
        let mut claimed: HashMap<String, String> = HashMap::new();

        for category in categories {
            let name = category.category_name.as_str();
            let slug = slugify(name);

            let skip = |reason: SkipReason| SkippedCategory {
                name: name.to_string(),
                slug: slug.clone(),
                reason,
            };

            if slug.is_empty() {
                warn!(id = category.category_id, category = name, "category name yields an empty slug, skipping");
                report.skipped.push(skip(SkipReason::EmptySlug));
                continue;
            }

            if let Some(first) = claimed.get(&slug) {
                warn!(category = name, slug = %slug, first = %first, "category slug collision, skipping later entry");
                report.skipped.push(skip(SkipReason::Collision {
                    first: first.clone(),
                }));
                continue;
            }
            claimed.insert(slug.clone(), name.to_string());

            match self.write_index(category, &slug) {
                Ok(Some(path)) => {
                    debug!(path = %path.display(), "created category");
                    report.created.push(path);
                }
                Ok(None) => {
                    warn!(slug = %slug, "category index already exists, leaving it untouched");
                    report.skipped.push(skip(SkipReason::Exists));
                }
                Err(e) => {
                    warn!(slug = %slug, error = %e, "could not materialize category");
                    report.skipped.push(skip(SkipReason::Failed(e.to_string())));
                }
            }
        }

        info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            "category materialization complete"
        );
        Ok(report)
    }

    /// Returns `Ok(None)` when the index document already exists.
    fn write_index(&self, category: &CategoryRow, slug: &str) -> Result<Option<PathBuf>> {
        let dir = self.base_dir.join(slug);
        let index = dir.join(INDEX_FILE);
        if index.exists() {
            return Ok(None);
        }

        std::fs::create_dir_all(&dir).map_err(|e| GregoryError::materialize(&dir, e))?;

        let document = render_index(category, slug)?;

        // `create_new` keeps a concurrently created file intact.
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&index)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(GregoryError::materialize(&index, e)),
        };
        std::io::Write::write_all(&mut file, document.as_bytes())
            .map_err(|e| GregoryError::materialize(&index, e))?;

        Ok(Some(index))
    }
}

/// `+++`-delimited TOML front matter with `title`, `slug` and an optional
/// `description`.
pub fn render_index(category: &CategoryRow, slug: &str) -> Result<String> {
    let front = FrontMatter {
        title: &category.category_name,
        slug,
        description: category.category_description.as_deref(),
    };
    let body = toml::to_string(&front)
        .map_err(|e| GregoryError::parse(format!("front matter for {slug}: {e}")))?;

    Ok(format!(
        "{FRONT_MATTER_DELIMITER}\n{body}{FRONT_MATTER_DELIMITER}\n"
    ))
}
