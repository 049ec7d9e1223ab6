//! Entity types for the Gregory MS build.
//!
//! `Raw*` structs are the schema-driven decode of API/store records: every
//! field is optional and unknown fields are ignored. `*Row` structs are the
//! normalized, typed form consumed by exporters and site artifact builders.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// The fixed set of source collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Articles,
    Trials,
    Categories,
}

impl Entity {
    /// Collection name used in API paths and export file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Articles => "articles",
            Self::Trials => "trials",
            Self::Categories => "categories",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pagination envelope
// ---------------------------------------------------------------------------

/// One page of a paginated collection.
///
/// Results stay as loose JSON so a single malformed record can be dropped
/// without losing the rest of the page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    /// Total number of records across all pages (count-based pagination).
    #[serde(default)]
    pub count: Option<u64>,
    /// URL of the following page (cursor-based pagination).
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Raw records
// ---------------------------------------------------------------------------

/// Publication source as delivered by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSource {
    #[serde(default, alias = "id")]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub source_for: Option<String>,
    #[serde(default)]
    pub subject_id: Option<i64>,
}

/// A record's owning source: a bare id, an embedded object, or a list of
/// embedded objects of which the first is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    Id(i64),
    Many(Vec<RawSource>),
    Detail(RawSource),
}

impl SourceRef {
    /// The owning source's id, if known.
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Detail(src) => src.source_id,
            Self::Many(list) => list.first().and_then(|s| s.source_id),
        }
    }

    /// The owning source's display name, if embedded.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Detail(src) => src.name.as_deref(),
            Self::Many(list) => list.first().and_then(|s| s.name.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAuthor {
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

/// Category reference embedded in an article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCategoryRef {
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawArticle {
    pub article_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub published_date: Option<Value>,
    #[serde(default)]
    pub discovery_date: Option<Value>,
    #[serde(default, alias = "sources")]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub container_title: Option<String>,
    #[serde(default)]
    pub authors: Vec<RawAuthor>,
    #[serde(default, alias = "team_categories")]
    pub categories: Vec<RawCategoryRef>,
    #[serde(default)]
    pub relevant: Option<bool>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub takeaways: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTrial {
    pub trial_id: i64,
    #[serde(default)]
    pub discovery_date: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub published_date: Option<Value>,
    #[serde(default, alias = "sources")]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub relevant: Option<bool>,
}

/// Category terms arrive either as a list or as one comma-separated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Terms {
    List(Vec<String>),
    Joined(String),
}

impl Terms {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            Self::Joined(s) => s
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCategory {
    pub category_id: i64,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub category_description: Option<String>,
    #[serde(default)]
    pub category_terms: Option<Terms>,
}

/// A raw record carrying its backend identifier.
pub trait Keyed {
    fn key(&self) -> i64;
}

impl Keyed for RawArticle {
    fn key(&self) -> i64 {
        self.article_id
    }
}

impl Keyed for RawTrial {
    fn key(&self) -> i64 {
        self.trial_id
    }
}

impl Keyed for RawCategory {
    fn key(&self) -> i64 {
        self.category_id
    }
}

// ---------------------------------------------------------------------------
// Normalized rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRow {
    pub article_id: i64,
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub published_date: Option<NaiveDateTime>,
    pub discovery_date: Option<NaiveDateTime>,
    pub source_id: Option<i64>,
    pub source: Option<String>,
    pub publisher: Option<String>,
    pub container_title: Option<String>,
    pub authors: String,
    pub categories: String,
    pub relevant: Option<bool>,
    pub doi: Option<String>,
    pub access: Option<String>,
    pub takeaways: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRow {
    pub trial_id: i64,
    pub discovery_date: Option<NaiveDateTime>,
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub published_date: Option<NaiveDateTime>,
    pub source_id: Option<i64>,
    pub source: Option<String>,
    pub relevant: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub category_id: i64,
    pub category_name: String,
    pub category_description: Option<String>,
    pub category_terms: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tabular view
// ---------------------------------------------------------------------------

/// A single exported value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Text(String),
    Bool(bool),
    Date(NaiveDateTime),
    Null,
}

impl Cell {
    /// Display form used by delimited and spreadsheet sinks (`YYYY-MM-DD` for dates).
    pub fn display(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Null => String::new(),
        }
    }

    /// JSON form used by the records-oriented JSON sink.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
            Self::Bool(b) => Value::from(*b),
            Self::Date(_) => Value::from(self.display()),
            Self::Null => Value::Null,
        }
    }
}

impl From<Option<String>> for Cell {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

impl From<Option<NaiveDateTime>> for Cell {
    fn from(value: Option<NaiveDateTime>) -> Self {
        value.map_or(Self::Null, Self::Date)
    }
}

impl From<Option<bool>> for Cell {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Null, Self::Bool)
    }
}

impl From<Option<i64>> for Cell {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }
}

/// A row type that can be written to the tabular sinks.
pub trait Tabular {
    /// Column headers, in output order.
    fn columns() -> &'static [&'static str];
    /// Primary identifier, used for deterministic ordering.
    fn id(&self) -> i64;
    /// Cell values, aligned with [`Tabular::columns`].
    fn cells(&self) -> Vec<Cell>;
}

impl Tabular for ArticleRow {
    fn columns() -> &'static [&'static str] {
        &[
            "article_id",
            "title",
            "summary",
            "link",
            "published_date",
            "discovery_date",
            "source_id",
            "source",
            "publisher",
            "container_title",
            "authors",
            "categories",
            "relevant",
            "doi",
            "access",
            "takeaways",
        ]
    }

    fn id(&self) -> i64 {
        self.article_id
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.article_id),
            Cell::Text(self.title.clone()),
            Cell::Text(self.summary.clone()),
            self.link.clone().into(),
            self.published_date.into(),
            self.discovery_date.into(),
            self.source_id.into(),
            self.source.clone().into(),
            self.publisher.clone().into(),
            self.container_title.clone().into(),
            Cell::Text(self.authors.clone()),
            Cell::Text(self.categories.clone()),
            self.relevant.into(),
            self.doi.clone().into(),
            self.access.clone().into(),
            self.takeaways.clone().into(),
        ]
    }
}

impl Tabular for TrialRow {
    fn columns() -> &'static [&'static str] {
        &[
            "trial_id",
            "discovery_date",
            "title",
            "summary",
            "link",
            "published_date",
            "source_id",
            "source",
            "relevant",
        ]
    }

    fn id(&self) -> i64 {
        self.trial_id
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.trial_id),
            self.discovery_date.into(),
            Cell::Text(self.title.clone()),
            Cell::Text(self.summary.clone()),
            self.link.clone().into(),
            self.published_date.into(),
            self.source_id.into(),
            self.source.clone().into(),
            self.relevant.into(),
        ]
    }
}

impl Tabular for CategoryRow {
    fn columns() -> &'static [&'static str] {
        &[
            "category_id",
            "category_name",
            "category_description",
            "category_terms",
        ]
    }

    fn id(&self) -> i64 {
        self.category_id
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.category_id),
            Cell::Text(self.category_name.clone()),
            self.category_description.clone().into(),
            Cell::Text(self.category_terms.join(", ")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn page_decodes_both_pagination_shapes() {
        let counted: Page =
            serde_json::from_str(r#"{"count": 12, "next": null, "results": [{}, {}]}"#).unwrap();
        assert_eq!(counted.count, Some(12));
        assert!(counted.next.is_none());
        assert_eq!(counted.results.len(), 2);

        let cursor: Page =
            serde_json::from_str(r#"{"next": "https://api.example.com/x/?page=2", "results": []}"#)
                .unwrap();
        assert!(cursor.count.is_none());
        assert!(cursor.next.is_some());
    }

    #[test]
    fn source_ref_accepts_id_object_or_list() {
        let id: SourceRef = serde_json::from_str("7").unwrap();
        assert_eq!(id.id(), Some(7));
        assert_eq!(id.name(), None);

        let obj: SourceRef =
            serde_json::from_str(r#"{"source_id": 3, "name": "PubMed"}"#).unwrap();
        assert_eq!(obj.id(), Some(3));
        assert_eq!(obj.name(), Some("PubMed"));

        let list: SourceRef =
            serde_json::from_str(r#"[{"source_id": 4, "name": "Nature"}, {"source_id": 5}]"#)
                .unwrap();
        assert_eq!(list.id(), Some(4));
        assert_eq!(list.name(), Some("Nature"));
    }

    #[test]
    fn raw_article_ignores_unknown_fields() {
        let json = r#"{
            "article_id": 42,
            "title": "Remyelination",
            "noun_phrases": ["myelin"],
            "ml_predictions": [],
            "sources": [{"source_id": 1, "name": "PubMed"}],
            "discovery_date": 1700000000000
        }"#;
        let article: RawArticle = serde_json::from_str(json).unwrap();
        assert_eq!(article.article_id, 42);
        assert!(article.authors.is_empty());
        assert_eq!(article.source.as_ref().and_then(SourceRef::name), Some("PubMed"));
    }

    #[test]
    fn terms_split_joined_string() {
        let terms = Terms::Joined("ocrelizumab, ocrevus,,".into());
        assert_eq!(terms.to_vec(), vec!["ocrelizumab", "ocrevus"]);
    }

    #[test]
    fn cell_display_formats_dates() {
        let dt = NaiveDate::from_ymd_opt(2023, 11, 14)
            .unwrap()
            .and_hms_opt(22, 13, 20)
            .unwrap();
        assert_eq!(Cell::Date(dt).display(), "2023-11-14");
        assert_eq!(Cell::Date(dt).to_json(), Value::from("2023-11-14"));
        assert_eq!(Cell::Null.to_json(), Value::Null);
        assert_eq!(Cell::Null.display(), "");
    }

    #[test]
    fn cells_align_with_columns() {
        let trial = TrialRow {
            trial_id: 1,
            discovery_date: None,
            title: "t".into(),
            summary: String::new(),
            link: None,
            published_date: None,
            source_id: None,
            source: None,
            relevant: Some(true),
        };
        assert_eq!(trial.cells().len(), TrialRow::columns().len());
    }
}
