//! Build artifacts derived from normalized tables.
//!
//! - [`TabularExporter`]: spreadsheet / JSON / CSV sinks per entity
//! - [`CategoryMaterializer`]: idempotent category content tree
//! - [`SitemapBuilder`]: sitemap XML for article and trial pages

pub mod categories;
pub mod export;
pub mod sitemap;
pub mod slug;

pub use categories::{CategoryMaterializer, MaterializeReport, SkipReason, SkippedCategory};
pub use export::{ExportFormat, ExportedFile, TabularExporter};
pub use sitemap::{Sitemap, SitemapBuilder};
pub use slug::slugify;
