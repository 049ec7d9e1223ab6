//! Schema for Gregory snapshot databases.
//!
//! Migrations are applied in order when a snapshot is opened for writing.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: sources, articles, trials, authors, team categories",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sources (
    source_id  INTEGER PRIMARY KEY,
    name       TEXT,
    link       TEXT,
    language   TEXT,
    source_for TEXT,
    subject_id INTEGER
);

-- Dates are stored as text (ISO-8601) or integer epoch milliseconds.
CREATE TABLE IF NOT EXISTS articles (
    article_id      INTEGER PRIMARY KEY,
    title           TEXT,
    summary         TEXT,
    link            TEXT,
    published_date,
    discovery_date,
    source_id       INTEGER REFERENCES sources(source_id),
    publisher       TEXT,
    container_title TEXT,
    relevant        INTEGER,
    doi             TEXT,
    access          TEXT,
    takeaways       TEXT
);

CREATE TABLE IF NOT EXISTS trials (
    trial_id       INTEGER PRIMARY KEY,
    discovery_date,
    title          TEXT,
    summary        TEXT,
    link           TEXT,
    published_date,
    source_id      INTEGER REFERENCES sources(source_id),
    relevant       INTEGER
);

CREATE TABLE IF NOT EXISTS authors (
    author_id   INTEGER PRIMARY KEY,
    given_name  TEXT,
    family_name TEXT
);

CREATE TABLE IF NOT EXISTS articles_authors (
    article_id INTEGER NOT NULL REFERENCES articles(article_id) ON DELETE CASCADE,
    author_id  INTEGER NOT NULL REFERENCES authors(author_id) ON DELETE CASCADE,
    PRIMARY KEY (article_id, author_id)
);

CREATE TABLE IF NOT EXISTS team_categories (
    category_id          INTEGER PRIMARY KEY,
    category_name        TEXT,
    category_description TEXT,
    category_terms       TEXT
);

CREATE TABLE IF NOT EXISTS articles_team_categories (
    article_id  INTEGER NOT NULL REFERENCES articles(article_id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES team_categories(category_id) ON DELETE CASCADE,
    PRIMARY KEY (article_id, category_id)
);

CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source_id);
CREATE INDEX IF NOT EXISTS idx_trials_source ON trials(source_id);
CREATE INDEX IF NOT EXISTS idx_articles_authors_author ON articles_authors(author_id);
CREATE INDEX IF NOT EXISTS idx_articles_categories_category ON articles_team_categories(category_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
