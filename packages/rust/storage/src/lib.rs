//! libSQL snapshot of the Gregory relational schema.
//!
//! The [`Storage`] struct is the direct-store data source: it reads articles,
//! trials and categories from a local snapshot and maps them into the same
//! raw record types the HTTP API yields, so normalization does not care
//! where records came from.
//!
//! **Access rules:**
//! - builds read via [`Storage::open_readonly`]
//! - snapshot creation and tests use [`Storage::open`], which migrates

mod migrations;

use std::collections::HashMap;
use std::path::Path;

use gregory_shared::{
    GregoryError, RawArticle, RawAuthor, RawCategory, RawCategoryRef, RawSource, RawTrial,
    Result, SourceRef, Terms,
};
use libsql::{Connection, Database, Row, Value, params};
use tracing::{debug, info, instrument};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a snapshot at `path` in read-write mode and apply
    /// pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GregoryError::io(parent, e))?;
        }

        let storage = Self::connect(path).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing snapshot for reading. Fails if the file is missing or
    /// carries no schema.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(GregoryError::Storage(format!(
                "store not found: {}",
                path.display()
            )));
        }

        let storage = Self::connect(path).await?;
        let version = storage.get_schema_version().await;
        if version == 0 {
            return Err(GregoryError::Storage(format!(
                "{} is not a Gregory snapshot (no schema_migrations)",
                path.display()
            )));
        }
        debug!(path = %path.display(), version, "opened store");
        Ok(storage)
    }

    async fn connect(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| GregoryError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| GregoryError::Storage(e.to_string()))?;

        Ok(Self { db, conn })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        GregoryError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    pub async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Entity reads
    // -----------------------------------------------------------------------

    /// All articles with their source, authors and team categories.
    #[instrument(skip_all)]
    pub async fn load_articles(&self) -> Result<Vec<RawArticle>> {
        let mut authors = self.load_article_authors().await?;
        let mut categories = self.load_article_categories().await?;

        let mut rows = self
            .conn
            .query(
                "SELECT a.article_id, a.title, a.summary, a.link, a.published_date,
                        a.discovery_date, a.publisher, a.container_title, a.relevant,
                        a.doi, a.access, a.takeaways,
                        s.source_id, s.name, s.link, s.language, s.source_for, s.subject_id
                 FROM articles a
                 LEFT JOIN sources s ON s.source_id = a.source_id
                 ORDER BY a.article_id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut articles = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let article_id = int(&row, 0)?;
            articles.push(RawArticle {
                article_id,
                title: text(&row, 1)?,
                summary: text(&row, 2)?,
                link: text(&row, 3)?,
                published_date: date(&row, 4)?,
                discovery_date: date(&row, 5)?,
                publisher: text(&row, 6)?,
                container_title: text(&row, 7)?,
                relevant: flag(&row, 8)?,
                doi: text(&row, 9)?,
                access: text(&row, 10)?,
                takeaways: text(&row, 11)?,
                source: source(&row, 12)?,
                authors: authors.remove(&article_id).unwrap_or_default(),
                categories: categories.remove(&article_id).unwrap_or_default(),
            });
        }

        info!(count = articles.len(), "loaded articles from store");
        Ok(articles)
    }

    #[instrument(skip_all)]
    pub async fn load_trials(&self) -> Result<Vec<RawTrial>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.trial_id, t.discovery_date, t.title, t.summary, t.link,
                        t.published_date, t.relevant,
                        s.source_id, s.name, s.link, s.language, s.source_for, s.subject_id
                 FROM trials t
                 LEFT JOIN sources s ON s.source_id = t.source_id
                 ORDER BY t.trial_id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut trials = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            trials.push(RawTrial {
                trial_id: int(&row, 0)?,
                discovery_date: date(&row, 1)?,
                title: text(&row, 2)?,
                summary: text(&row, 3)?,
                link: text(&row, 4)?,
                published_date: date(&row, 5)?,
                relevant: flag(&row, 6)?,
                source: source(&row, 7)?,
            });
        }

        info!(count = trials.len(), "loaded trials from store");
        Ok(trials)
    }

    #[instrument(skip_all)]
    pub async fn load_categories(&self) -> Result<Vec<RawCategory>> {
        let mut rows = self
            .conn
            .query(
                "SELECT category_id, category_name, category_description, category_terms
                 FROM team_categories
                 ORDER BY category_id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut categories = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            categories.push(RawCategory {
                category_id: int(&row, 0)?,
                category_name: text(&row, 1)?,
                category_description: text(&row, 2)?,
                category_terms: text(&row, 3)?.map(Terms::Joined),
            });
        }

        info!(count = categories.len(), "loaded categories from store");
        Ok(categories)
    }

    async fn load_article_authors(&self) -> Result<HashMap<i64, Vec<RawAuthor>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT aa.article_id, au.author_id, au.given_name, au.family_name
                 FROM articles_authors aa
                 JOIN authors au ON au.author_id = aa.author_id
                 ORDER BY aa.article_id, au.author_id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut by_article: HashMap<i64, Vec<RawAuthor>> = HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            by_article.entry(int(&row, 0)?).or_default().push(RawAuthor {
                author_id: Some(int(&row, 1)?),
                given_name: text(&row, 2)?,
                family_name: text(&row, 3)?,
            });
        }
        Ok(by_article)
    }

    async fn load_article_categories(&self) -> Result<HashMap<i64, Vec<RawCategoryRef>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT atc.article_id, tc.category_id, tc.category_name
                 FROM articles_team_categories atc
                 JOIN team_categories tc ON tc.category_id = atc.category_id
                 ORDER BY atc.article_id, tc.category_id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut by_article: HashMap<i64, Vec<RawCategoryRef>> = HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            by_article
                .entry(int(&row, 0)?)
                .or_default()
                .push(RawCategoryRef {
                    category_id: Some(int(&row, 1)?),
                    category_name: text(&row, 2)?,
                });
        }
        Ok(by_article)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn storage_err(e: libsql::Error) -> GregoryError {
    GregoryError::Storage(e.to_string())
}

fn value(row: &Row, idx: i32) -> Result<Value> {
    row.get_value(idx).map_err(storage_err)
}

fn int(row: &Row, idx: i32) -> Result<i64> {
    match value(row, idx)? {
        Value::Integer(n) => Ok(n),
        other => Err(GregoryError::Storage(format!(
            "column {idx}: expected integer, got {other:?}"
        ))),
    }
}

fn opt_int(row: &Row, idx: i32) -> Result<Option<i64>> {
    Ok(match value(row, idx)? {
        Value::Integer(n) => Some(n),
        _ => None,
    })
}

fn text(row: &Row, idx: i32) -> Result<Option<String>> {
    Ok(match value(row, idx)? {
        Value::Text(s) => Some(s),
        Value::Integer(n) => Some(n.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    })
}

fn flag(row: &Row, idx: i32) -> Result<Option<bool>> {
    Ok(match value(row, idx)? {
        Value::Integer(n) => Some(n != 0),
        Value::Text(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Dates keep their stored representation; normalization parses them.
fn date(row: &Row, idx: i32) -> Result<Option<serde_json::Value>> {
    Ok(match value(row, idx)? {
        Value::Text(s) => Some(serde_json::Value::String(s)),
        Value::Integer(n) => Some(serde_json::Value::from(n)),
        Value::Real(f) => Some(serde_json::Value::from(f)),
        Value::Null | Value::Blob(_) => None,
    })
}

/// Source columns start at `idx`: id, name, link, language, source_for, subject_id.
fn source(row: &Row, idx: i32) -> Result<Option<SourceRef>> {
    let Some(source_id) = opt_int(row, idx)? else {
        return Ok(None);
    };
    Ok(Some(SourceRef::Detail(RawSource {
        source_id: Some(source_id),
        name: text(row, idx + 1)?,
        link: text(row, idx + 2)?,
        language: text(row, idx + 3)?,
        source_for: text(row, idx + 4)?,
        subject_id: opt_int(row, idx + 5)?,
    })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("gregory_store_{}.db", Uuid::now_v7()))
    }

    async fn seeded() -> std::path::PathBuf {
        let path = temp_db();
        let storage = Storage::open(&path).await.expect("open");
        storage
            .conn
            .execute_batch(
                r#"
INSERT INTO sources (source_id, name, link, source_for) VALUES
    (1, 'PubMed', 'https://pubmed.ncbi.nlm.nih.gov', 'science paper'),
    (2, 'ClinicalTrials.gov', 'https://clinicaltrials.gov', 'trials');
INSERT INTO articles (article_id, title, summary, link, published_date, discovery_date, source_id, relevant) VALUES
    (10, 'Vitamin D', '<p>Summary</p>', 'https://x.org/?a=1&amp;b=2', '2023-11-01', '2023-11-14 22:13:20+00', 1, 1),
    (11, 'Orphan', NULL, NULL, NULL, 1700000000000, NULL, NULL);
INSERT INTO authors (author_id, given_name, family_name) VALUES (1, 'Ada', 'Lovelace'), (2, 'Marie', 'Curie');
INSERT INTO articles_authors (article_id, author_id) VALUES (10, 2), (10, 1);
INSERT INTO team_categories (category_id, category_name, category_description, category_terms) VALUES
    (5, 'Ocrelizumab', 'Anti-CD20', 'ocrelizumab, ocrevus'),
    (6, 'Diet', NULL, NULL);
INSERT INTO articles_team_categories (article_id, category_id) VALUES (10, 6);
INSERT INTO trials (trial_id, discovery_date, title, source_id, relevant) VALUES
    (20, '2022-05-01T09:30:00Z', 'Phase 2 study', 2, 0);
"#,
            )
            .await
            .expect("seed");
        path
    }

    #[tokio::test]
    async fn open_creates_and_migrates() {
        let path = temp_db();
        let storage = Storage::open(&path).await.expect("open");
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let path = temp_db();
        let first = Storage::open(&path).await.expect("first open");
        drop(first);
        let second = Storage::open(&path).await.expect("second open");
        assert_eq!(second.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn readonly_requires_existing_snapshot() {
        let missing = temp_db();
        let err = Storage::open_readonly(&missing).await.err().expect("missing store");
        assert!(err.to_string().contains("store not found"));
    }

    #[tokio::test]
    async fn readonly_rejects_foreign_database() {
        let path = temp_db();
        let db = libsql::Builder::new_local(&path).build().await.unwrap();
        let conn = db.connect().unwrap();
        conn.execute_batch("CREATE TABLE unrelated (id INTEGER);").await.unwrap();
        drop(conn);
        drop(db);

        let err = Storage::open_readonly(&path).await.err().expect("foreign db");
        assert!(err.to_string().contains("not a Gregory snapshot"));
    }

    #[tokio::test]
    async fn loads_articles_with_relations() {
        let path = seeded().await;
        let store = Storage::open_readonly(&path).await.expect("open ro");

        let articles = store.load_articles().await.expect("articles");
        assert_eq!(articles.len(), 2);

        let a = &articles[0];
        assert_eq!(a.article_id, 10);
        assert_eq!(a.title.as_deref(), Some("Vitamin D"));
        assert_eq!(
            a.discovery_date,
            Some(serde_json::Value::String("2023-11-14 22:13:20+00".into()))
        );
        assert_eq!(a.relevant, Some(true));
        assert_eq!(a.source.as_ref().and_then(SourceRef::name), Some("PubMed"));
        let names: Vec<_> = a.authors.iter().filter_map(|x| x.family_name.as_deref()).collect();
        assert_eq!(names, vec!["Lovelace", "Curie"]);
        assert_eq!(a.categories.len(), 1);
        assert_eq!(a.categories[0].category_name.as_deref(), Some("Diet"));

        let orphan = &articles[1];
        assert!(orphan.source.is_none());
        assert!(orphan.authors.is_empty());
        assert_eq!(orphan.discovery_date, Some(serde_json::Value::from(1_700_000_000_000_i64)));
    }

    #[tokio::test]
    async fn loads_trials_and_categories() {
        let path = seeded().await;
        let store = Storage::open_readonly(&path).await.expect("open ro");

        let trials = store.load_trials().await.expect("trials");
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].relevant, Some(false));
        assert_eq!(trials[0].source.as_ref().and_then(SourceRef::id), Some(2));

        let categories = store.load_categories().await.expect("categories");
        assert_eq!(categories.len(), 2);
        assert_eq!(
            categories[0].category_terms.as_ref().map(Terms::to_vec),
            Some(vec!["ocrelizumab".to_string(), "ocrevus".to_string()])
        );
        assert_eq!(categories[1].category_description, None);
    }
}
