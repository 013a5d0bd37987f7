//! First pass: article text to structured records.

use tracing::{info, instrument};

use super::records_from_value;
use crate::error::Result;
use crate::llm::{Generate, parse_json_with};
use crate::models::AnalyzedRecord;
use crate::prompts::{ANALYZE_SYSTEM, ANALYZE_USER, render};
use crate::utils::date_bounds;

#[derive(Debug)]
pub struct Analyst<L> {
    llm: L,
    lookback_days: i64,
}

impl<L: Generate> Analyst<L> {
    pub fn new(llm: L, lookback_days: i64) -> Self {
        Self { llm, lookback_days }
    }

    /// One model call; an answer that is not a record list is fatal and not re-asked.
    #[instrument(level = "info", skip_all, fields(chars = raw_text.chars().count()))]
    pub async fn analyze(&self, raw_text: &str) -> Result<Vec<AnalyzedRecord>> {
        let (today, past) = date_bounds(self.lookback_days);
        let user = render(
            ANALYZE_USER,
            &[
                ("today_date", &today),
                ("past_date", &past),
                ("input_text", raw_text),
            ],
        );

        info!("Analyst pass started");
        let answer = self.llm.generate(&[ANALYZE_SYSTEM.to_string(), user]).await?;
        let records = parse_json_with(&answer, records_from_value)?;
        info!(records = records.len(), "Analyst pass finished");
        Ok(records)
    }
}
