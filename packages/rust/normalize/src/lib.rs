//! Record normalization: raw API/store records → typed table rows.
//!
//! Every raw entity implements [`Normalize`], which declares how each of its
//! fields is coerced:
//! - date fields go through [`dates::parse_date`] (unparsable → `None`)
//! - escaped fields (links) are HTML-entity-unescaped
//! - rich-text fields (summaries) are sanitized with [`text::clean_text`]
//!
//! Field-level problems never fail a record; they are counted in
//! [`NormalizeStats`] and logged at debug level.

pub mod dates;
pub mod text;

use serde_json::Value;
use tracing::{debug, info, instrument};

use gregory_shared::{
    ArticleRow, CategoryRow, RawArticle, RawAuthor, RawCategory, RawCategoryRef, RawTrial,
    SourceRef, TrialRow,
};

pub use dates::{parse_date, parse_date_str};
pub use text::{clean_text, non_blank, unescape_html};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Field-level coercion counters for one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Records normalized.
    pub records: usize,
    /// Date values that were present but could not be parsed.
    pub unparsable_dates: usize,
    /// Records without a usable discovery date.
    pub missing_discovery_dates: usize,
}

/// Normalized rows plus the counters gathered while producing them.
#[derive(Debug, Clone)]
pub struct Normalized<R> {
    pub rows: Vec<R>,
    pub stats: NormalizeStats,
}

/// A raw record with a declared normalization schema.
pub trait Normalize {
    type Row;

    fn normalize(self, stats: &mut NormalizeStats) -> Self::Row;
}

/// Normalize a whole collection.
#[instrument(skip_all, fields(records = raw.len(), row = std::any::type_name::<R::Row>()))]
pub fn normalize<R: Normalize>(raw: Vec<R>) -> Normalized<R::Row> {
    let mut stats = NormalizeStats::default();
    let rows: Vec<R::Row> = raw.into_iter().map(|r| r.normalize(&mut stats)).collect();
    stats.records = rows.len();

    info!(
        records = stats.records,
        unparsable_dates = stats.unparsable_dates,
        missing_discovery_dates = stats.missing_discovery_dates,
        "normalization complete"
    );

    Normalized { rows, stats }
}

// ---------------------------------------------------------------------------
// Entity schemas
// ---------------------------------------------------------------------------

impl Normalize for RawArticle {
    type Row = ArticleRow;

    fn normalize(self, stats: &mut NormalizeStats) -> ArticleRow {
        let published_date = date_field(self.published_date.as_ref(), stats);
        let discovery_date = date_field(self.discovery_date.as_ref(), stats);
        if discovery_date.is_none() {
            stats.missing_discovery_dates += 1;
        }

        ArticleRow {
            article_id: self.article_id,
            title: self.title.as_deref().map(str::trim).unwrap_or_default().to_string(),
            summary: clean_text(self.summary.as_deref()),
            link: escaped_field(self.link.as_deref()),
            published_date,
            discovery_date,
            source_id: self.source.as_ref().and_then(SourceRef::id),
            source: self.source.as_ref().and_then(SourceRef::name).map(String::from),
            publisher: non_blank(self.publisher.as_deref()),
            container_title: non_blank(self.container_title.as_deref()),
            authors: join_authors(&self.authors),
            categories: join_categories(&self.categories),
            relevant: self.relevant,
            doi: non_blank(self.doi.as_deref()),
            access: non_blank(self.access.as_deref()),
            takeaways: non_blank(self.takeaways.as_deref()),
        }
    }
}

impl Normalize for RawTrial {
    type Row = TrialRow;

    fn normalize(self, stats: &mut NormalizeStats) -> TrialRow {
        let discovery_date = date_field(self.discovery_date.as_ref(), stats);
        if discovery_date.is_none() {
            stats.missing_discovery_dates += 1;
        }

        TrialRow {
            trial_id: self.trial_id,
            discovery_date,
            title: self.title.as_deref().map(str::trim).unwrap_or_default().to_string(),
            summary: clean_text(self.summary.as_deref()),
            link: escaped_field(self.link.as_deref()),
            published_date: date_field(self.published_date.as_ref(), stats),
            source_id: self.source.as_ref().and_then(SourceRef::id),
            source: self.source.as_ref().and_then(SourceRef::name).map(String::from),
            relevant: self.relevant,
        }
    }
}

impl Normalize for RawCategory {
    type Row = CategoryRow;

    fn normalize(self, _stats: &mut NormalizeStats) -> CategoryRow {
        CategoryRow {
            category_id: self.category_id,
            category_name: self
                .category_name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            category_description: non_blank(self.category_description.as_deref()),
            category_terms: self
                .category_terms
                .as_ref()
                .map(|t| t.to_vec())
                .unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn date_field(value: Option<&Value>, stats: &mut NormalizeStats) -> Option<chrono::NaiveDateTime> {
    let value = value?;
    let parsed = parse_date(value);
    if parsed.is_none() && !is_blank(value) {
        stats.unparsable_dates += 1;
        debug!(%value, "unparsable date, treating as null");
    }
    parsed
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn escaped_field(value: Option<&str>) -> Option<String> {
    non_blank(value).map(|v| unescape_html(&v))
}

/// `"given family"` names, de-duplicated in first-seen order, joined by `", "`.
fn join_authors(authors: &[RawAuthor]) -> String {
    let names = authors.iter().filter_map(|a| {
        let full = [a.given_name.as_deref(), a.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!full.is_empty()).then_some(full)
    });
    join_unique(names)
}

fn join_categories(categories: &[RawCategoryRef]) -> String {
    join_unique(
        categories
            .iter()
            .filter_map(|c| non_blank(c.category_name.as_deref())),
    )
}

fn join_unique(items: impl Iterator<Item = String>) -> String {
    let mut seen = std::collections::HashSet::new();
    items
        .filter(|item| seen.insert(item.clone()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gregory_shared::{RawSource, Terms};
    use serde_json::json;

    fn article(id: i64, discovery: Option<Value>) -> RawArticle {
        RawArticle {
            article_id: id,
            title: Some(format!(" Article {id} ")),
            discovery_date: discovery,
            ..Default::default()
        }
    }

    #[test]
    fn article_fields_are_coerced() {
        let raw: RawArticle = serde_json::from_value(json!({
            "article_id": 7,
            "title": "Vitamin D and relapse rate",
            "summary": "<p>Hello&nbsp;World</p>\n\n",
            "link": "https://doi.org/x?a=1&amp;b=2",
            "published_date": "2023-11-01",
            "discovery_date": 1_700_000_000_000_i64,
            "sources": [{"source_id": 2, "name": "PubMed"}],
            "publisher": "  ",
            "authors": [
                {"given_name": "Ada", "family_name": "Lovelace"},
                {"given_name": "Ada", "family_name": "Lovelace"},
                {"given_name": null, "family_name": "Curie"}
            ],
            "team_categories": [{"category_name": "Ocrelizumab"}, {"category_name": "Diet"}],
            "relevant": true
        }))
        .unwrap();

        let mut stats = NormalizeStats::default();
        let row = raw.normalize(&mut stats);

        assert_eq!(row.summary, "Hello World");
        assert_eq!(row.link.as_deref(), Some("https://doi.org/x?a=1&b=2"));
        assert_eq!(row.source.as_deref(), Some("PubMed"));
        assert_eq!(row.source_id, Some(2));
        assert_eq!(row.publisher, None);
        assert_eq!(row.authors, "Ada Lovelace, Curie");
        assert_eq!(row.categories, "Ocrelizumab, Diet");
        assert_eq!(
            row.discovery_date.map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2023-11-14".to_string())
        );
        assert_eq!(stats.unparsable_dates, 0);
    }

    #[test]
    fn epoch_and_iso_discovery_dates_normalize_equally() {
        let rows = normalize(vec![
            article(1, Some(json!(1_700_000_000_000_i64))),
            article(2, Some(json!("2023-11-14T22:13:20Z"))),
        ])
        .rows;
        assert_eq!(rows[0].discovery_date, rows[1].discovery_date);
        assert!(rows[0].discovery_date.is_some());
    }

    #[test]
    fn bad_dates_are_nulled_and_counted() {
        let out = normalize(vec![
            article(1, Some(json!("yesterday"))),
            article(2, None),
            article(3, Some(json!("2024-01-01"))),
        ]);
        assert_eq!(out.rows.len(), 3);
        assert_eq!(out.rows[0].discovery_date, None);
        assert_eq!(out.stats.unparsable_dates, 1);
        assert_eq!(out.stats.missing_discovery_dates, 2);
        assert_eq!(out.rows[0].title, "Article 1");
    }

    #[test]
    fn trial_with_source_id_only() {
        let raw = RawTrial {
            trial_id: 9,
            summary: None,
            source: Some(SourceRef::Id(4)),
            discovery_date: Some(json!("2022-02-02T10:00:00")),
            ..Default::default()
        };
        let row = raw.normalize(&mut NormalizeStats::default());
        assert_eq!(row.summary, "");
        assert_eq!(row.source_id, Some(4));
        assert_eq!(row.source, None);
        assert!(row.discovery_date.is_some());
    }

    #[test]
    fn category_terms_and_name() {
        let raw = RawCategory {
            category_id: 3,
            category_name: Some(" Multiple Sclerosis & MS ".into()),
            category_description: Some(String::new()),
            category_terms: Some(Terms::Joined("ms, multiple sclerosis".into())),
        };
        let row = raw.normalize(&mut NormalizeStats::default());
        assert_eq!(row.category_name, "Multiple Sclerosis & MS");
        assert_eq!(row.category_description, None);
        assert_eq!(row.category_terms, vec!["ms", "multiple sclerosis"]);
    }

    #[test]
    fn embedded_source_detail() {
        let raw = RawTrial {
            trial_id: 1,
            source: Some(SourceRef::Detail(RawSource {
                source_id: Some(8),
                name: Some("ClinicalTrials.gov".into()),
                ..Default::default()
            })),
            ..Default::default()
        };
        let row = raw.normalize(&mut NormalizeStats::default());
        assert_eq!(row.source.as_deref(), Some("ClinicalTrials.gov"));
    }
}
