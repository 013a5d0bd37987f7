//! SQLite persistence for news, glossary terms and their links.
//!
//! Deduplication is enforced by the schema, not by the application:
//!
//! - `news.url` is unique; [`Store::upsert_news`] updates the existing row
//! - `terms.name` is unique; [`Store::upsert_term`] is last-write-wins
//! - `news_terms (news_id, term_id)` is unique; [`Store::link_idempotent`]
//!   treats a duplicate as a no-op
//!
//! Each write is a single statement, so a manual run overlapping the daily
//! schedule cannot create duplicates. Nothing here deletes rows.

use chrono::Utc;
use futures::future::try_join_all;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::error::{Error, Result};
use crate::models::{News, NewsDraft, NewsPage, NewsWithTerms, Term, TermRef};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS news (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        url TEXT NOT NULL UNIQUE,
        date TEXT NOT NULL,
        summary TEXT NOT NULL,
        key_metrics TEXT NOT NULL DEFAULT '',
        source_url TEXT NOT NULL,
        image_path TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_news_date ON news (date)",
    "CREATE INDEX IF NOT EXISTS idx_news_created_at ON news (created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS terms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        definition TEXT NOT NULL,
        explanation TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS news_terms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        news_id INTEGER NOT NULL REFERENCES news (id) ON DELETE CASCADE,
        term_id INTEGER NOT NULL REFERENCES terms (id) ON DELETE CASCADE,
        UNIQUE (news_id, term_id)
    )
    "#,
];

const NEWS_COLUMNS: &str =
    "id, title, url, date, summary, key_metrics, source_url, image_path, created_at";

/// Pooled handle to the database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect (creating the file if missing) and bring the schema up to date.
    #[instrument(level = "info", skip_all, fields(%database_url))]
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration).execute(&pool).await.inspect_err(|e| {
                error!(migration = i, error = %e, "Migration failed");
            })?;
        }
        info!(migrations = MIGRATIONS.len(), "Database ready");

        Ok(Self { pool })
    }

    /// Close every pooled connection, waiting for in-flight queries.
    ///
    /// Called once by the entry point after the command finishes.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database closed");
    }

    /// Insert or update by `url`.
    ///
    /// An existing image path is kept when the draft carries none; `source_url`
    /// and `created_at` keep their first values.
    ///
    /// # Arguments
    ///
    /// * `draft` - The row to write; a blank `image_path` counts as none
    ///
    /// # Returns
    ///
    /// The stored row as it is after the statement, including its id.
    #[instrument(level = "info", skip_all, fields(url = %draft.url))]
    pub async fn upsert_news(&self, draft: &NewsDraft) -> Result<News> {
        let image_path = draft.image_path.as_deref().filter(|p| !p.is_empty());
        let sql = format!(
            r#"
            INSERT INTO news (title, url, date, summary, key_metrics, source_url, image_path, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                summary = excluded.summary,
                key_metrics = excluded.key_metrics,
                date = excluded.date,
                image_path = COALESCE(excluded.image_path, news.image_path)
            RETURNING {NEWS_COLUMNS}
            "#
        );

        let news = sqlx::query_as::<_, News>(&sql)
            .bind(&draft.title)
            .bind(&draft.url)
            .bind(draft.date)
            .bind(&draft.summary)
            .bind(&draft.key_metrics)
            .bind(&draft.source_url)
            .bind(image_path)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        info!(id = news.id, has_image = news.image_path.is_some(), "News upserted");
        Ok(news)
    }

    /// Insert or update by name; the latest definition and explanation win.
    #[instrument(level = "debug", skip_all, fields(name = %term.term))]
    pub async fn upsert_term(&self, term: &TermRef) -> Result<Term> {
        let term = sqlx::query_as::<_, Term>(
            r#"
            INSERT INTO terms (name, definition, explanation)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                definition = excluded.definition,
                explanation = excluded.explanation
            RETURNING id, name, definition, explanation
            "#,
        )
        .bind(&term.term)
        .bind(&term.definition)
        .bind(&term.explanation)
        .fetch_one(&self.pool)
        .await?;
        debug!(id = term.id, "Term upserted");
        Ok(term)
    }

    /// Link a news row to a term.
    ///
    /// # Arguments
    ///
    /// * `news_id` - Id of an existing news row
    /// * `term_id` - Id of an existing term row
    ///
    /// # Returns
    ///
    /// `true` if a link was inserted, `false` if it already existed. Any other
    /// database failure (a missing row, for instance) is logged and returned.
    #[instrument(level = "debug", skip(self))]
    pub async fn link_idempotent(&self, news_id: i64, term_id: i64) -> Result<bool> {
        let result = sqlx::query("INSERT INTO news_terms (news_id, term_id) VALUES (?1, ?2)")
            .bind(news_id)
            .bind(term_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!("Link already present");
                Ok(false)
            }
            Err(e) => {
                error!(error = %e, "Failed to link news and term");
                Err(e.into())
            }
        }
    }

    /// Titles of the most recently created rows, newest first.
    pub async fn recent_titles(&self, limit: i64) -> Result<Vec<String>> {
        let titles = sqlx::query_scalar::<_, String>(
            "SELECT title FROM news ORDER BY created_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(titles)
    }

    /// The row stored for `url`, if any.
    pub async fn find_news_by_url(&self, url: &str) -> Result<Option<News>> {
        let sql = format!("SELECT {NEWS_COLUMNS} FROM news WHERE url = ?1");
        Ok(sqlx::query_as::<_, News>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Rows without a usable image, newest article date first.
    pub async fn news_missing_images(&self) -> Result<Vec<News>> {
        let sql = format!(
            "SELECT {NEWS_COLUMNS} FROM news \
             WHERE image_path IS NULL OR image_path = '' \
             ORDER BY date DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, News>(&sql).fetch_all(&self.pool).await?)
    }

    /// Returns `false` when no row has that id.
    pub async fn set_image_path(&self, id: i64, image_path: &str) -> Result<bool> {
        let done = sqlx::query("UPDATE news SET image_path = ?1 WHERE id = ?2")
            .bind(image_path)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Terms linked to a news row, in link order.
    pub async fn terms_for_news(&self, news_id: i64) -> Result<Vec<Term>> {
        Ok(sqlx::query_as::<_, Term>(
            r#"
            SELECT t.id, t.name, t.definition, t.explanation
            FROM news_terms nt
            JOIN terms t ON t.id = nt.term_id
            WHERE nt.news_id = ?1
            ORDER BY nt.id
            "#,
        )
        .bind(news_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Total number of news rows.
    pub async fn count_news(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news")
            .fetch_one(&self.pool)
            .await?)
    }

    /// One page of news, newest article date first, with terms attached.
    ///
    /// # Arguments
    ///
    /// * `page` - 1-based page number; `0` is read as `1`
    /// * `per_page` - Page size; `0` is read as `1`
    ///
    /// # Returns
    ///
    /// The page rows together with the total item and page counts. A page past
    /// the end has no rows but still reports the totals.
    #[instrument(level = "info", skip(self))]
    pub async fn list_news(&self, page: u32, per_page: u32) -> Result<NewsPage> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total_items = self.count_news().await?;

        let sql = format!(
            "SELECT {NEWS_COLUMNS} FROM news ORDER BY date DESC, id DESC LIMIT ?1 OFFSET ?2"
        );
        let rows = sqlx::query_as::<_, News>(&sql)
            .bind(i64::from(per_page))
            .bind(i64::from(page - 1) * i64::from(per_page))
            .fetch_all(&self.pool)
            .await?;

        let data = try_join_all(rows.into_iter().map(|news| async move {
            let terms = self.terms_for_news(news.id).await?;
            Ok::<_, Error>(NewsWithTerms { news, terms })
        }))
        .await?;

        let total_pages = u32::try_from((total_items + i64::from(per_page) - 1) / i64::from(per_page))
            .unwrap_or(u32::MAX);
        info!(page, items = data.len(), total_items, "Listed news");

        Ok(NewsPage {
            data,
            current_page: page,
            total_pages,
            total_items,
            items_per_page: per_page,
        })
    }
}
