//! Second pass: the model reviews and corrects its own records.
//!
//! The critic can only improve a run, never break it. Any failure, including an
//! answer with no records, hands back the analyst's output untouched.

use tracing::{error, info, instrument, warn};

use super::records_from_value;
use crate::error::Result;
use crate::llm::{Generate, parse_json_with};
use crate::models::AnalyzedRecord;
use crate::prompts::{CRITIC_SYSTEM, CRITIC_USER, render};

#[derive(Debug)]
pub struct Critic<L> {
    llm: L,
}

impl<L: Generate> Critic<L> {
    pub fn new(llm: L) -> Self {
        Self { llm }
    }

    #[instrument(level = "info", skip_all, fields(records = records.len()))]
    pub async fn refine(&self, records: &[AnalyzedRecord]) -> Vec<AnalyzedRecord> {
        match self.review(records).await {
            Ok(refined) if !refined.is_empty() => {
                info!(records = refined.len(), "Critic pass finished");
                refined
            }
            Ok(_) => {
                warn!("Critic returned no records; keeping analyst output");
                records.to_vec()
            }
            Err(e) => {
                error!(error = %e, "Critic pass failed; keeping analyst output");
                records.to_vec()
            }
        }
    }

    async fn review(&self, records: &[AnalyzedRecord]) -> Result<Vec<AnalyzedRecord>> {
        let input_json = serde_json::to_string_pretty(records)?;
        let user = render(CRITIC_USER, &[("input_json", &input_json)]);
        let answer = self.llm.generate(&[CRITIC_SYSTEM.to_string(), user]).await?;
        parse_json_with(&answer, records_from_value)
    }
}
