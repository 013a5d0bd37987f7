//! The daily news run and the image backfill.
//!
//! # Run stages
//!
//! 1. **Select**: exclude recently stored titles and pick one search hit
//! 2. **Scrape**: fetch the page body, or fall back to the search snippet
//! 3. **Analyze**: structured records from the analyst (fatal on failure)
//! 4. **Critique**: corrected records, or the analyst's on any failure
//! 5. **Illustrate**: optional image per record (failures leave it empty)
//! 6. **Persist**: upsert the news row, then its terms and links
//!
//! Steps run strictly one after another. Nothing is rolled back: rows written
//! before a failure stay written.

use chrono::Utc;
use itertools::Itertools;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::agents::{Analyst, Critic, Illustrator};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::imagegen::ImageRenderer;
use crate::llm::Generate;
use crate::models::{AnalyzedRecord, CandidateArticle, News, NewsDraft, SearchHit, TermRef};
use crate::outputs::ImageStore;
use crate::scrapers::{NewsSearch, PageScraper, fetch_candidate};
use crate::store::Store;

/// The knobs the orchestrator reads from [`Settings`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// How many recently stored titles are excluded from selection.
    pub recent_titles: i64,
    /// Width of the date window given to the analyst, in days.
    pub lookback_days: i64,
    /// Scraped bodies shorter than this fall back to the search snippet.
    pub min_body_chars: usize,
    pub images_enabled: bool,
    /// Pause between rows during image backfill.
    pub backfill_delay: Duration,
}

impl From<&Settings> for PipelineOptions {
    fn from(s: &Settings) -> Self {
        Self {
            recent_titles: s.analysis.recent_titles,
            lookback_days: s.analysis.lookback_days,
            min_body_chars: s.scraper.min_chars,
            images_enabled: s.images.enabled,
            backfill_delay: Duration::from_millis(s.images.backfill_delay_ms),
        }
    }
}

/// Outcome counts of [`Pipeline::backfill_images`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub total: usize,
    pub filled: usize,
    pub failed: usize,
}

/// One article from search to storage.
///
/// Generic over its collaborators: `S` searches, `P` scrapes pages, `L` is the
/// LLM shared by every agent and `R` renders images. The store and uploads
/// directory are handed in by the caller.
pub struct Pipeline<S, P, L, R> {
    search: S,
    scraper: P,
    llm: L,
    renderer: R,
    store: Store,
    images: ImageStore,
    options: PipelineOptions,
}

impl<S, P, L, R> Pipeline<S, P, L, R>
where
    S: NewsSearch,
    P: PageScraper,
    L: Generate,
    R: ImageRenderer,
{
    pub fn new(
        search: S,
        scraper: P,
        llm: L,
        renderer: R,
        store: Store,
        images: ImageStore,
        options: PipelineOptions,
    ) -> Self {
        Self {
            search,
            scraper,
            llm,
            renderer,
            store,
            images,
            options,
        }
    }

    /// Process today's article and return the stored rows.
    ///
    /// No new candidate is a successful, empty run.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> Result<Vec<News>> {
        let t0 = Instant::now();
        info!("Daily news run starting");

        match self.run_stages().await {
            Ok(saved) => {
                info!(saved = saved.len(), elapsed_ms = t0.elapsed().as_millis(), "Daily news run finished");
                Ok(saved)
            }
            Err(e) => {
                error!(error = %e, elapsed_ms = t0.elapsed().as_millis(), "Daily news run failed");
                Err(e)
            }
        }
    }

    async fn run_stages(&self) -> Result<Vec<News>> {
        let excluded = self.store.recent_titles(self.options.recent_titles).await?;

        let Some(hit) = fetch_candidate(&self.search, &excluded).await? else {
            info!("No new article; nothing to do");
            return Ok(Vec::new());
        };
        let candidate = self.scrape_candidate(hit).await;

        let analyzed = Analyst::new(&self.llm, self.options.lookback_days)
            .analyze(&candidate.raw_content)
            .await?;
        let records = Critic::new(&self.llm).refine(&analyzed).await;

        let with_images = self.options.images_enabled && self.images_ready().await;

        let mut saved = Vec::with_capacity(records.len());
        for record in &records {
            saved.push(self.persist(&candidate, record, with_images).await?);
        }
        Ok(saved)
    }

    /// Scrape the hit's page; short bodies are replaced by title and description.
    async fn scrape_candidate(&self, hit: SearchHit) -> CandidateArticle {
        let body = self.scraper.scrape(hit.url()).await;
        let chars = body.chars().count();

        let raw_content = if chars < self.options.min_body_chars {
            warn!(chars, min = self.options.min_body_chars, "Article body too short; using search snippet");
            fallback_body(&hit)
        } else {
            body
        };

        CandidateArticle {
            title: hit.title().to_string(),
            url: hit.url().to_string(),
            published_at: hit.published_at,
            raw_content,
        }
    }

    async fn images_ready(&self) -> bool {
        match self.images.prepare().await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    path = %self.images.dir().display(),
                    error = %e,
                    "Uploads directory is not writable; storing news without images"
                );
                false
            }
        }
    }

    #[instrument(level = "info", skip_all, fields(url = %candidate.url))]
    async fn persist(
        &self,
        candidate: &CandidateArticle,
        record: &AnalyzedRecord,
        with_images: bool,
    ) -> Result<News> {
        let image_path = if with_images {
            self.illustrate_or_skip(&record.summary, "news").await
        } else {
            None
        };

        let news = self.store.upsert_news(&news_draft(candidate, record, image_path)).await?;

        let mut linked = 0usize;
        for term in unique_terms(&record.terms) {
            let stored = self.store.upsert_term(&term).await?;
            if self.store.link_idempotent(news.id, stored.id).await? {
                linked += 1;
            }
        }
        info!(id = news.id, terms = record.terms.len(), linked, "Stored record");
        Ok(news)
    }

    async fn illustrate_or_skip(&self, summary: &str, name: &str) -> Option<String> {
        match self.illustrate(summary, name).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!(error = %e, "Image generation failed; continuing without image");
                None
            }
        }
    }

    async fn illustrate(&self, summary: &str, name: &str) -> Result<String> {
        let prompt = Illustrator::new(&self.llm).prompt_for(summary).await;
        let bytes = self.renderer.render(&prompt).await?;
        self.images.store(&bytes, name).await
    }

    /// Generate images for stored rows that have none, one row at a time.
    ///
    /// Per-row failures are logged and counted; only failing to read the rows
    /// or to prepare the uploads directory is an error.
    #[instrument(level = "info", skip_all)]
    pub async fn backfill_images(&self) -> Result<BackfillReport> {
        self.images.prepare().await?;
        let rows = self.store.news_missing_images().await?;
        let mut report = BackfillReport {
            total: rows.len(),
            ..BackfillReport::default()
        };
        info!(count = report.total, "Rows missing images");

        for (i, news) in rows.iter().enumerate() {
            if i > 0 && !self.options.backfill_delay.is_zero() {
                sleep(self.options.backfill_delay).await;
            }
            match self.backfill_one(news).await {
                Ok(path) => {
                    report.filled += 1;
                    info!(id = news.id, %path, "Image backfilled");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(id = news.id, error = %e, "Image backfill failed for row");
                }
            }
        }

        info!(filled = report.filled, failed = report.failed, "Image backfill complete");
        Ok(report)
    }

    async fn backfill_one(&self, news: &News) -> Result<String> {
        let path = self
            .illustrate(&news.summary, &format!("news_backfill_{}", news.id))
            .await?;
        if !self.store.set_image_path(news.id, &path).await? {
            return Err(Error::Database(sqlx::Error::RowNotFound));
        }
        Ok(path)
    }
}

/// `title + "\n\n" + description`, the body used when scraping yields too little.
pub fn fallback_body(hit: &SearchHit) -> String {
    format!("{}\n\n{}", hit.title(), hit.description())
}

/// Search-hit metadata wins over the model's; summary, metrics and terms come from the model.
fn news_draft(candidate: &CandidateArticle, record: &AnalyzedRecord, image_path: Option<String>) -> NewsDraft {
    let title = if candidate.title.trim().is_empty() {
        record.title.clone()
    } else {
        candidate.title.clone()
    };
    let url = if candidate.url.trim().is_empty() {
        record.source_url.clone()
    } else {
        candidate.url.clone()
    };
    let date = candidate
        .published_at
        .or_else(|| record.parsed_date())
        .unwrap_or_else(Utc::now);

    NewsDraft {
        title,
        source_url: url.clone(),
        url,
        date,
        summary: record.summary.clone(),
        key_metrics: record.key_metrics.clone(),
        image_path,
    }
}

/// Trimmed, non-blank terms with duplicate names removed (first one wins).
fn unique_terms(terms: &[TermRef]) -> Vec<TermRef> {
    terms
        .iter()
        .filter(|t| !t.term.trim().is_empty())
        .map(|t| TermRef {
            term: t.term.trim().to_string(),
            ..t.clone()
        })
        .unique_by(|t| t.term.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagegen::testing::FakeRenderer;
    use crate::llm::testing::ScriptedLlm;
    use crate::scrapers::article::testing::CannedPages;
    use crate::scrapers::newsapi::REMOVED_TITLE;
    use crate::scrapers::newsapi::testing::{FixedSearch, hit};
    use crate::store::testing::temp_store;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const URL: &str = "https://news.example.kr/economy/1";

    fn analysis(summary: &str) -> String {
        format!(
            r#"```json
[{{"title": "모델이 붙인 제목", "summary": "{summary}", "key_metrics": "기준금리 3.50%",
   "source_url": "https://hallucinated.example/x", "date": "2025-12-01",
   "terms": [
     {{"term": "기준금리", "definition": "d1", "explanation": "e1"}},
     {{"term": " 기준금리 ", "definition": "dup", "explanation": "dup"}},
     {{"term": "  ", "definition": "blank", "explanation": "blank"}},
     {{"term": "금융통화위원회", "definition": "d2", "explanation": "e2"}}
   ]}}]
```"#
        )
    }

    fn long_body() -> String {
        "한국은행 금융통화위원회가 기준금리를 연 3.50%로 동결했다. ".repeat(10)
    }

    fn options(images_enabled: bool) -> PipelineOptions {
        PipelineOptions {
            recent_titles: 15,
            lookback_days: 100,
            min_body_chars: 200,
            images_enabled,
            backfill_delay: Duration::ZERO,
        }
    }

    struct Fixture {
        store: Store,
        uploads: TempDir,
        _db: TempDir,
    }

    async fn fixture() -> Fixture {
        let (store, db) = temp_store().await;
        Fixture {
            store,
            uploads: tempfile::tempdir().unwrap(),
            _db: db,
        }
    }

    impl Fixture {
        fn pipeline<'a>(
            &self,
            search: &'a FixedSearch,
            pages: &'a CannedPages,
            llm: &'a ScriptedLlm,
            renderer: &'a FakeRenderer,
            images_enabled: bool,
        ) -> Pipeline<&'a FixedSearch, &'a CannedPages, &'a ScriptedLlm, &'a FakeRenderer> {
            Pipeline::new(
                search,
                pages,
                llm,
                renderer,
                self.store.clone(),
                ImageStore::new(self.uploads.path().join("uploads")),
                options(images_enabled),
            )
        }
    }

    #[tokio::test]
    async fn test_run_persists_with_search_metadata_and_unique_terms() {
        let fx = fixture().await;
        let mut h = hit("한은, 기준금리 3.50% 동결", URL);
        h.published_at = Some(Utc.with_ymd_and_hms(2025, 12, 8, 1, 0, 0).unwrap());
        let search = FixedSearch::new(vec![h]);
        let pages = CannedPages::default().with(URL, &long_body());
        let llm = ScriptedLlm::new().answer(analysis("동결 요약")).fail(Error::upstream("Gemini", Some(500), "x"));
        let renderer = FakeRenderer::ok();

        let saved = fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap();

        assert_eq!(saved.len(), 1);
        let news = &saved[0];
        assert_eq!(news.title, "한은, 기준금리 3.50% 동결");
        assert_eq!(news.url, URL);
        assert_eq!(news.source_url, URL);
        assert_eq!(news.date, Utc.with_ymd_and_hms(2025, 12, 8, 1, 0, 0).unwrap());
        assert_eq!(news.summary, "동결 요약");
        assert!(news.image_path.is_none());

        let names: Vec<String> = fx
            .store
            .terms_for_news(news.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["기준금리", "금융통화위원회"]);
        assert!(renderer.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_scrape_falls_back_to_title_and_description() {
        let fx = fixture().await;
        let search = FixedSearch::new(vec![hit("수출 11개월 연속 증가", URL)]);
        let pages = CannedPages::default().with(URL, "short");
        let llm = ScriptedLlm::new().answer(analysis("s"));
        let renderer = FakeRenderer::ok();

        fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap();

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0][1].ends_with("수출 11개월 연속 증가\n\n수출 11개월 연속 증가 요약"));
    }

    #[tokio::test]
    async fn test_two_runs_on_one_url_keep_one_row_with_second_summary() {
        let fx = fixture().await;
        let pages = CannedPages::default().with(URL, &long_body());
        let renderer = FakeRenderer::ok();

        let first_search = FixedSearch::new(vec![hit("금리 동결", URL)]);
        let llm = ScriptedLlm::new().answer(analysis("첫 번째 요약"));
        fx.pipeline(&first_search, &pages, &llm, &renderer, false).run().await.unwrap();

        let second_search = FixedSearch::new(vec![hit("[속보] 한은 결정 발표", URL)]);
        let llm = ScriptedLlm::new().answer(analysis("두 번째 요약"));
        let saved = fx.pipeline(&second_search, &pages, &llm, &renderer, false).run().await.unwrap();

        assert_eq!(fx.store.count_news().await.unwrap(), 1);
        let row = fx.store.find_news_by_url(URL).await.unwrap().unwrap();
        assert_eq!(row.id, saved[0].id);
        assert_eq!(row.summary, "두 번째 요약");
        assert_eq!(fx.store.terms_for_news(row.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_image_failure_persists_null_image_path() {
        let fx = fixture().await;
        let search = FixedSearch::new(vec![hit("환율 급등", URL)]);
        let pages = CannedPages::default().with(URL, &long_body());
        let llm = ScriptedLlm::new().answer(analysis("환율 요약"));
        let renderer = FakeRenderer::failing();

        let saved = fx.pipeline(&search, &pages, &llm, &renderer, true).run().await.unwrap();

        assert_eq!(saved.len(), 1);
        assert!(saved[0].image_path.is_none());
        // The critic and illustrator calls found an empty script and fell back.
        assert_eq!(renderer.prompts.lock().unwrap().as_slice(), [crate::prompts::FALLBACK_IMAGE_PROMPT]);
    }

    #[tokio::test]
    async fn test_image_success_is_stored_under_uploads() {
        let fx = fixture().await;
        let search = FixedSearch::new(vec![hit("반도체 수출 회복", URL)]);
        let pages = CannedPages::default().with(URL, &long_body());
        let llm = ScriptedLlm::new()
            .answer(analysis("반도체 요약"))
            .answer(analysis("반도체 요약 (검수)"))
            .answer("A glowing semiconductor wafer");
        let renderer = FakeRenderer::ok();

        let saved = fx.pipeline(&search, &pages, &llm, &renderer, true).run().await.unwrap();

        let path = saved[0].image_path.as_deref().unwrap();
        assert!(path.starts_with("uploads/news_"));
        assert!(path.ends_with(".jpg"));
        assert_eq!(saved[0].summary, "반도체 요약 (검수)");
        assert_eq!(renderer.prompts.lock().unwrap()[0], "A glowing semiconductor wafer");
        let file = fx.uploads.path().join(path);
        assert!(file.is_file());
    }

    #[tokio::test]
    async fn test_critique_failure_keeps_analysis() {
        let fx = fixture().await;
        let search = FixedSearch::new(vec![hit("물가 둔화", URL)]);
        let pages = CannedPages::default().with(URL, &long_body());
        let llm = ScriptedLlm::new()
            .answer(analysis("분석 요약"))
            .answer("검수할 수 없습니다");
        let renderer = FakeRenderer::ok();

        let saved = fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap();
        assert_eq!(saved[0].summary, "분석 요약");
        assert_eq!(saved[0].key_metrics, "기준금리 3.50%");
    }

    #[tokio::test]
    async fn test_critique_without_records_keeps_stored_summary() {
        let fx = fixture().await;
        let search = FixedSearch::new(vec![hit("물가 둔화", URL)]);
        let pages = CannedPages::default().with(URL, &long_body());
        let llm = ScriptedLlm::new()
            .answer(analysis("좋은 요약"))
            .answer(r#"검수 결과입니다: [{"term": "물가", "definition": "d", "explanation": "e"}] 이상입니다."#);
        let renderer = FakeRenderer::ok();

        let saved = fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap();
        assert_eq!(saved[0].summary, "좋은 요약");
        assert_eq!(saved[0].key_metrics, "기준금리 3.50%");
        assert_eq!(fx.store.terms_for_news(saved[0].id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analysis_without_summary_aborts_without_writes() {
        let fx = fixture().await;
        let search = FixedSearch::new(vec![hit("부동산 시장 냉각", URL)]);
        let pages = CannedPages::default().with(URL, &long_body());
        let llm = ScriptedLlm::new().answer(r#"[{"note": "기사 없음"}]"#);
        let renderer = FakeRenderer::ok();

        let err = fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
        assert_eq!(fx.store.count_news().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_candidate_is_empty_success() {
        let fx = fixture().await;
        let search = FixedSearch::new(vec![hit(REMOVED_TITLE, URL)]);
        let pages = CannedPages::default();
        let llm = ScriptedLlm::new();
        let renderer = FakeRenderer::ok();

        let saved = fx.pipeline(&search, &pages, &llm, &renderer, true).run().await.unwrap();
        assert!(saved.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_recent_titles_are_excluded_on_next_run() {
        let fx = fixture().await;
        let pages = CannedPages::default().with(URL, &long_body());
        let renderer = FakeRenderer::ok();
        let search = FixedSearch::new(vec![hit("코스피 2600 돌파", URL)]);

        let llm = ScriptedLlm::new().answer(analysis("s"));
        fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap();

        let llm = ScriptedLlm::new();
        let saved = fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap();
        assert!(saved.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_analysis_aborts_without_writes() {
        let fx = fixture().await;
        let search = FixedSearch::new(vec![hit("부동산 시장 냉각", URL)]);
        let pages = CannedPages::default().with(URL, &long_body());
        let llm = ScriptedLlm::new().answer("오늘은 분석할 뉴스가 없습니다.");
        let renderer = FakeRenderer::ok();

        let err = fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
        assert_eq!(fx.store.count_news().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_failure_aborts() {
        let fx = fixture().await;
        let search = FixedSearch::failing(Error::Config("NEWS_API_KEY is missing".into()));
        let pages = CannedPages::default();
        let llm = ScriptedLlm::new();
        let renderer = FakeRenderer::ok();

        let err = fx.pipeline(&search, &pages, &llm, &renderer, false).run().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    fn stored(url: &str, day: u32, image_path: Option<&str>) -> NewsDraft {
        NewsDraft {
            title: format!("제목 {day}"),
            url: url.to_string(),
            date: Utc.with_ymd_and_hms(2025, 12, day, 0, 0, 0).unwrap(),
            summary: format!("요약 {day}"),
            key_metrics: String::new(),
            source_url: url.to_string(),
            image_path: image_path.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_backfill_fills_missing_rows_newest_first() {
        let fx = fixture().await;
        fx.store.upsert_news(&stored("https://a.kr/1", 1, None)).await.unwrap();
        fx.store.upsert_news(&stored("https://a.kr/2", 2, Some("uploads/kept.jpg"))).await.unwrap();
        fx.store.upsert_news(&stored("https://a.kr/3", 3, None)).await.unwrap();

        let search = FixedSearch::new(vec![]);
        let pages = CannedPages::default();
        let llm = ScriptedLlm::new().answer("prompt for 3").answer("prompt for 1");
        let renderer = FakeRenderer::ok();

        let report = fx
            .pipeline(&search, &pages, &llm, &renderer, false)
            .backfill_images()
            .await
            .unwrap();

        assert_eq!(report, BackfillReport { total: 2, filled: 2, failed: 0 });
        assert_eq!(*renderer.prompts.lock().unwrap(), vec!["prompt for 3", "prompt for 1"]);
        assert!(fx.store.news_missing_images().await.unwrap().is_empty());

        let kept = fx.store.find_news_by_url("https://a.kr/2").await.unwrap().unwrap();
        assert_eq!(kept.image_path.as_deref(), Some("uploads/kept.jpg"));
        let third = fx.store.find_news_by_url("https://a.kr/3").await.unwrap().unwrap();
        assert!(third.image_path.unwrap().starts_with("uploads/news_backfill_"));
    }

    #[tokio::test]
    async fn test_backfill_row_failures_are_counted_not_raised() {
        let fx = fixture().await;
        fx.store.upsert_news(&stored("https://a.kr/1", 1, None)).await.unwrap();
        fx.store.upsert_news(&stored("https://a.kr/2", 2, None)).await.unwrap();

        let search = FixedSearch::new(vec![]);
        let pages = CannedPages::default();
        let llm = ScriptedLlm::new();
        let renderer = FakeRenderer::failing();

        let report = fx
            .pipeline(&search, &pages, &llm, &renderer, false)
            .backfill_images()
            .await
            .unwrap();

        assert_eq!(report, BackfillReport { total: 2, filled: 0, failed: 2 });
        assert_eq!(fx.store.news_missing_images().await.unwrap().len(), 2);
    }

    #[test]
    fn test_model_metadata_used_when_hit_lacks_it() {
        let candidate = CandidateArticle {
            title: " ".into(),
            url: String::new(),
            published_at: None,
            raw_content: String::new(),
        };
        let record: AnalyzedRecord = serde_json::from_str(
            r#"{"title": "모델 제목", "source_url": "https://m.kr/1", "date": "2025-11-30"}"#,
        )
        .unwrap();

        let draft = news_draft(&candidate, &record, None);
        assert_eq!(draft.title, "모델 제목");
        assert_eq!(draft.url, "https://m.kr/1");
        assert_eq!(draft.date, Utc.with_ymd_and_hms(2025, 11, 30, 0, 0, 0).unwrap());
    }
}
