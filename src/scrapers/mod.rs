//! Article discovery and page scraping.
//!
//! A run touches the web in two places:
//!
//! 1. **Searching**: [`newsapi`] asks the news-search backend for recent
//!    articles and picks the single candidate worth processing
//! 2. **Scraping**: [`article`] downloads the candidate's page and extracts a
//!    plain-text body for the analyst
//!
//! | Module | Backend | Failure policy |
//! |--------|---------|----------------|
//! | [`newsapi`] | NewsAPI `/v2/everything` | errors abort the run (transient ones are retried) |
//! | [`article`] | the publisher's page | every failure becomes an empty body |

pub mod article;
pub mod newsapi;

pub use article::{HtmlScraper, PageScraper};
pub use newsapi::{NewsApiClient, NewsSearch, fetch_candidate};
