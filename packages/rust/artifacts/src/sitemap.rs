//! Sitemap-protocol XML for article and trial pages.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, info, instrument};

use gregory_shared::{ArticleRow, GregoryError, Result, TrialRow};

use crate::export::write_atomic;

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
pub const CHANGE_FREQ: &str = "monthly";

/// A rendered sitemap document.
#[derive(Debug, Clone)]
pub struct Sitemap {
    pub xml: String,
    pub url_count: usize,
}

impl Sitemap {
    /// Write the document atomically, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GregoryError::io(parent, e))?;
        }
        write_atomic(path, self.xml.as_bytes()).map_err(|e| GregoryError::io(path, e))?;
        info!(path = %path.display(), urls = self.url_count, "sitemap written");
        Ok(path.to_path_buf())
    }
}

#[derive(Debug, Clone)]
pub struct SitemapBuilder {
    base_url: String,
}

impl SitemapBuilder {
    /// `base_url` is the public site root; a trailing `/` is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// One `url` entry per record with a discovery date; records without one
    /// are left out.
    #[instrument(skip_all, fields(articles = articles.len(), trials = trials.len()))]
    pub fn build(&self, articles: &[ArticleRow], trials: &[TrialRow]) -> Result<Sitemap> {
        let entries = articles
            .iter()
            .filter_map(|a| a.discovery_date.map(|d| ("articles", a.article_id, d)))
            .chain(
                trials
                    .iter()
                    .filter_map(|t| t.discovery_date.map(|d| ("trials", t.trial_id, d))),
            );

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        emit(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;

        let mut urlset = BytesStart::new("urlset");
        urlset.push_attribute(("xmlns", SITEMAP_NS));
        emit(&mut writer, Event::Start(urlset))?;

        let mut url_count = 0;
        for (section, id, discovered) in entries {
            self.write_url(&mut writer, section, id, discovered)?;
            url_count += 1;
        }

        emit(&mut writer, Event::End(BytesEnd::new("urlset")))?;

        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| GregoryError::parse(format!("sitemap is not UTF-8: {e}")))?;
        xml.push('\n');

        debug!(urls = url_count, skipped = articles.len() + trials.len() - url_count, "sitemap built");
        Ok(Sitemap { xml, url_count })
    }

    fn write_url(
        &self,
        writer: &mut Writer<Vec<u8>>,
        section: &str,
        id: i64,
        discovered: NaiveDateTime,
    ) -> Result<()> {
        let loc = format!("{}/{section}/{id}/", self.base_url);
        let lastmod = discovered.format("%Y-%m-%d").to_string();

        emit(writer, Event::Start(BytesStart::new("url")))?;
        for (tag, value) in [("loc", loc.as_str()), ("changefreq", CHANGE_FREQ), ("lastmod", lastmod.as_str())] {
            emit(writer, Event::Start(BytesStart::new(tag)))?;
            emit(writer, Event::Text(BytesText::new(value)))?;
            emit(writer, Event::End(BytesEnd::new(tag)))?;
        }
        emit(writer, Event::End(BytesEnd::new("url")))
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| GregoryError::parse(format!("sitemap write failed: {e}")))
}
