//! Shared types, error model, and configuration for the Gregory MS build.
//!
//! This crate is the foundation depended on by all other Gregory crates.
//! It provides:
//! - [`GregoryError`]: the unified error type
//! - Entity types ([`RawArticle`], [`ArticleRow`], [`Tabular`], [`Page`], …)
//! - Configuration ([`AppConfig`], [`BuildConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiSettings, AppConfig, BuildConfig, BuildOverrides, CONFIG_FILE_NAME, DataSource,
    EmbedSettings, RUN_TAG_FORMAT, Secret, SiteMode, SourceKind, find_config_file, load_config,
    load_config_from,
};
pub use error::{GregoryError, Result};
pub use types::{
    ArticleRow, Cell, CategoryRow, Entity, Keyed, Page, RawArticle, RawAuthor, RawCategory,
    RawCategoryRef, RawSource, RawTrial, SourceRef, Tabular, Terms, TrialRow,
};
