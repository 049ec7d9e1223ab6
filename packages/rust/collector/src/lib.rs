//! Paginated API acquisition.
//!
//! This crate provides:
//! - [`PageFetcher`]: fetches one page of a paginated JSON collection
//! - [`ConcurrentCollector`]: drives the fetcher over every page, tolerating
//!   individual page failures

pub mod collector;
pub mod fetcher;

pub use collector::{CollectResult, ConcurrentCollector, PageFailure};
pub use fetcher::{PageFetcher, page_url};
