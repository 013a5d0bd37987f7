//! NewsAPI search and candidate selection.
//!
//! The daily query asks for the newest articles matching a fixed keyword and
//! language, over-fetching a batch so that removed and already-covered
//! stories can be filtered out locally.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::NewsApiSettings;
use crate::error::{Error, Result};
use crate::models::SearchHit;
use crate::retry::Backoff;

/// Title NewsAPI substitutes for articles withdrawn by the publisher.
pub const REMOVED_TITLE: &str = "[Removed]";

/// A news-search backend returning the newest matching articles first.
pub trait NewsSearch {
    async fn search(&self) -> Result<Vec<SearchHit>>;
}

impl<T: NewsSearch> NewsSearch for &T {
    async fn search(&self) -> Result<Vec<SearchHit>> {
        (**self).search().await
    }
}

#[derive(Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<SearchHit>,
}

/// Client for NewsAPI's `/v2/everything` search.
#[derive(Debug)]
pub struct NewsApiClient {
    client: Client,
    api_key: Option<String>,
    settings: NewsApiSettings,
    backoff: Backoff,
}

impl NewsApiClient {
    /// Build the HTTP client with the configured timeout.
    ///
    /// A blank `api_key` is treated as missing; searching then fails with
    /// [`Error::Config`] instead of sending an unauthenticated request.
    pub fn new(settings: &NewsApiSettings, api_key: Option<String>, backoff: Backoff) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            settings: settings.clone(),
            backoff,
        })
    }

    async fn search_once(&self, api_key: &str) -> Result<Vec<SearchHit>> {
        let url = format!("{}/v2/everything", self.settings.base_url.trim_end_matches('/'));
        let page_size = self.settings.page_size.to_string();
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", api_key)
            .query(&[
                ("q", self.settings.query.as_str()),
                ("language", self.settings.language.as_str()),
                ("sortBy", self.settings.sort_by.as_str()),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<EverythingResponse>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Err(Error::upstream("NewsAPI", Some(status.as_u16()), message));
        }

        let body: EverythingResponse = response.json().await?;
        if body.status != "ok" {
            return Err(Error::upstream(
                "NewsAPI",
                Some(status.as_u16()),
                body.message.unwrap_or_else(|| format!("status={}", body.status)),
            ));
        }
        Ok(body.articles)
    }
}

impl NewsSearch for NewsApiClient {
    #[instrument(level = "info", skip_all, fields(q = %self.settings.query))]
    async fn search(&self) -> Result<Vec<SearchHit>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("NEWS_API_KEY is missing".into()))?;

        let hits = self
            .backoff
            .run("newsapi.search", || self.search_once(api_key))
            .await?;
        info!(count = hits.len(), "NewsAPI returned articles");
        Ok(hits)
    }
}

/// Whether `title` overlaps any excluded title by substring, in either direction.
///
/// Blank excluded entries are ignored; they would otherwise match everything.
pub fn is_excluded(title: &str, excluded: &[String]) -> bool {
    excluded
        .iter()
        .filter(|t| !t.trim().is_empty())
        .any(|t| title.contains(t.as_str()) || t.contains(title))
}

/// Pick the first hit that has a real title and a link, and does not overlap an
/// excluded title.
pub fn select_candidate(hits: Vec<SearchHit>, excluded: &[String]) -> Option<SearchHit> {
    hits.into_iter().find(|hit| {
        let title = hit.title().trim();
        if title.is_empty() || title == REMOVED_TITLE {
            debug!(url = %hit.url(), "Skipping untitled or removed article");
            return false;
        }
        if hit.url().trim().is_empty() {
            debug!(title = %title, "Skipping article without a link");
            return false;
        }
        if is_excluded(hit.title(), excluded) {
            debug!(title = %hit.title(), "Skipping already covered article");
            return false;
        }
        true
    })
}

/// Search and select today's candidate; `None` means nothing new to process.
#[instrument(level = "info", skip_all, fields(excluded = excluded_titles.len()))]
pub async fn fetch_candidate<S: NewsSearch>(
    search: &S,
    excluded_titles: &[String],
) -> Result<Option<SearchHit>> {
    let hits = search.search().await?;
    match select_candidate(hits, excluded_titles) {
        Some(hit) => {
            info!(title = %hit.title(), url = %hit.url(), "Selected candidate");
            Ok(Some(hit))
        }
        None => {
            warn!("No new article left after filtering");
            Ok(None)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FixedSearch, hit};
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_is_excluded_both_directions() {
        let excluded = vec!["한국은행 기준금리 동결".to_string()];
        assert!(is_excluded("한국은행 기준금리 동결", &excluded));
        assert!(is_excluded("[속보] 한국은행 기준금리 동결 결정", &excluded));
        assert!(is_excluded("기준금리", &excluded));
        assert!(!is_excluded("원달러 환율 급등", &excluded));
    }

    #[test]
    fn test_blank_excluded_titles_are_ignored() {
        let excluded = vec!["".to_string(), "   ".to_string()];
        assert!(!is_excluded("원달러 환율 급등", &excluded));
    }

    #[test]
    fn test_removed_excluded_and_valid() {
        let hits = vec![
            hit(REMOVED_TITLE, "https://example.com/removed"),
            hit("코스피 2600 돌파", "https://example.com/kospi"),
            hit("수출 11개월 연속 증가", "https://example.com/export"),
        ];
        let excluded = vec!["코스피 2600 돌파".to_string()];
        let chosen = select_candidate(hits, &excluded).unwrap();
        assert_eq!(chosen.url(), "https://example.com/export");
    }

    #[test]
    fn test_untitled_hits_are_skipped_and_order_is_kept() {
        let mut untitled = hit("", "https://example.com/none");
        untitled.title = None;
        let hits = vec![
            untitled,
            hit("   ", "https://example.com/blank"),
            hit("첫 번째", "https://example.com/1"),
            hit("두 번째", "https://example.com/2"),
        ];
        assert_eq!(select_candidate(hits, &[]).unwrap().url(), "https://example.com/1");
    }

    #[test]
    fn test_never_returns_an_excluded_title() {
        let titles = ["금리", "환율 급등", "부동산 시장 냉각", "금리 인하 기대", "무역수지 흑자"];
        let excluded_sets: Vec<Vec<String>> = vec![
            vec![],
            vec!["금리".into()],
            vec!["환율 급등 지속".into(), "무역수지".into()],
            titles.iter().map(|t| t.to_string()).collect(),
        ];
        for excluded in &excluded_sets {
            let hits = titles
                .iter()
                .enumerate()
                .map(|(i, t)| hit(t, &format!("https://example.com/{i}")))
                .collect();
            if let Some(chosen) = select_candidate(hits, excluded) {
                assert!(!is_excluded(chosen.title(), excluded));
            }
        }
    }

    #[test]
    fn test_hits_without_link_are_skipped() {
        let mut unlinked = hit("환율 급등", "");
        unlinked.url = None;
        let hits = vec![
            unlinked,
            hit("물가 둔화", "  "),
            hit("수출 증가", "https://example.com/export"),
        ];
        assert_eq!(select_candidate(hits, &[]).unwrap().url(), "https://example.com/export");
    }

    #[tokio::test]
    async fn test_fetch_candidate_none_is_not_an_error() {
        let search = FixedSearch::new(vec![hit(REMOVED_TITLE, "https://example.com/r")]);
        assert!(fetch_candidate(&search, &[]).await.unwrap().is_none());
    }

    fn settings(base_url: &str) -> NewsApiSettings {
        NewsApiSettings {
            base_url: base_url.to_string(),
            ..NewsApiSettings::default()
        }
    }

    fn no_retry() -> Backoff {
        Backoff::none()
    }

    #[tokio::test]
    async fn test_newsapi_query_and_parse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(header("X-Api-Key", "secret"))
            .and(query_param("q", "경제"))
            .and(query_param("language", "ko"))
            .and(query_param("sortBy", "publishedAt"))
            .and(query_param("pageSize", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "totalResults": 2,
                "articles": [
                    {"title": "[Removed]", "url": null, "publishedAt": null},
                    {"title": "물가 상승률 둔화", "url": "https://example.com/cpi",
                     "publishedAt": "2025-12-08T00:00:00Z", "description": "설명", "content": "본문"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = NewsApiClient::new(&settings(&server.uri()), Some("secret".into()), no_retry()).unwrap();
        let hits = client.search().await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].url.is_none());
        assert_eq!(hits[1].title(), "물가 상승률 둔화");
        assert_eq!(hits[1].description(), "설명");
    }

    #[tokio::test]
    async fn test_newsapi_missing_key_is_config_error() {
        let client = NewsApiClient::new(&settings("http://127.0.0.1:9"), Some("  ".into()), no_retry()).unwrap();
        assert!(matches!(client.search().await.unwrap_err(), Error::Config(_)));
    }

    #[tokio::test]
    async fn test_newsapi_error_status_propagates_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status": "error",
                "code": "apiKeyInvalid",
                "message": "Your API key is invalid"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = NewsApiClient::new(&settings(&server.uri()), Some("bad".into()), Backoff::default()).unwrap();
        let err = client.search().await.unwrap_err();
        match err {
            Error::Upstream { service, status, message } => {
                assert_eq!(service, "NewsAPI");
                assert_eq!(status, Some(401));
                assert_eq!(message, "Your API key is invalid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_newsapi_error_body_with_ok_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "code": "rateLimited",
                "message": "You have made too many requests"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backoff = Backoff {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 1,
        };
        let client = NewsApiClient::new(&settings(&server.uri()), Some("k".into()), backoff).unwrap();
        let err = client.search().await.unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(err, Error::Upstream { status: Some(200), .. }));
    }

    #[tokio::test]
    async fn test_newsapi_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "articles": []})))
            .mount(&server)
            .await;

        let backoff = Backoff {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 1,
        };
        let client = NewsApiClient::new(&settings(&server.uri()), Some("k".into()), backoff).unwrap();
        assert!(client.search().await.unwrap().is_empty());
    }
}
