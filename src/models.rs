//! Data models for candidate articles, model output and stored rows.
//!
//! This module defines the data structures that flow through one pipeline run:
//! - [`SearchHit`]: one article as returned by the news-search backend
//! - [`CandidateArticle`]: the selected hit together with its scraped body
//! - [`AnalyzedRecord`] / [`TermRef`]: structured LLM output
//! - [`News`], [`Term`], [`NewsWithTerms`]: rows owned by the store
//!
//! The model-facing types use snake_case keys that match the JSON schema in the
//! analysis prompt.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One article from the news-search backend.
///
/// Every field may be null upstream; NewsAPI reports removed articles with a
/// `"[Removed]"` title and null text fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl SearchHit {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

/// The article chosen for this run, with the text handed to the analyst.
#[derive(Debug, Clone)]
pub struct CandidateArticle {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_content: String,
}

/// A glossary term extracted by the model.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TermRef {
    pub term: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub explanation: String,
}

/// The structured summary the analysis and critique passes produce.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AnalyzedRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Headline numbers; models answer with either a string or a list.
    #[serde(default, deserialize_with = "metrics_from_string_or_list")]
    pub key_metrics: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub terms: Vec<TermRef>,
}

impl AnalyzedRecord {
    /// Parse the model-supplied date, accepting `YYYY-MM-DD` or RFC 3339.
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        let raw = self.date.trim();
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn metrics_from_string_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Metrics {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match Metrics::deserialize(deserializer)? {
        Metrics::One(s) => s,
        Metrics::Many(v) => v.join(", "),
        Metrics::Nothing(()) => String::new(),
    })
}

/// A stored news row, serialized with the dashboard's camelCase keys.
#[derive(Debug, Clone, Serialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct News {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub date: DateTime<Utc>,
    pub summary: String,
    pub key_metrics: String,
    pub source_url: String,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields written by [`crate::store::Store::upsert_news`].
#[derive(Debug, Clone)]
pub struct NewsDraft {
    pub title: String,
    pub url: String,
    pub date: DateTime<Utc>,
    pub summary: String,
    pub key_metrics: String,
    pub source_url: String,
    pub image_path: Option<String>,
}

/// A stored glossary term, shared by every article that mentions it.
#[derive(Debug, Clone, Serialize, PartialEq, sqlx::FromRow)]
pub struct Term {
    pub id: i64,
    pub name: String,
    pub definition: String,
    pub explanation: String,
}

/// A news row with its linked terms flattened in, as the dashboard reads it.
#[derive(Debug, Clone, Serialize)]
pub struct NewsWithTerms {
    #[serde(flatten)]
    pub news: News,
    pub terms: Vec<Term>,
}

/// One page of [`NewsWithTerms`] plus totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPage {
    pub data: Vec<NewsWithTerms>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: i64,
    pub items_per_page: u32,
}
