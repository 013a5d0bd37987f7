//! LLM passes over one article.
//!
//! | Agent | Input | Output | On failure |
//! |-------|-------|--------|------------|
//! | [`Analyst`] | article text | [`AnalyzedRecord`]s | error, the run aborts |
//! | [`Critic`] | records | corrected records | the input, unchanged |
//! | [`Illustrator`] | summary | English image prompt | a fixed prompt |
//!
//! Every agent borrows or owns any [`crate::llm::Generate`]; the pipeline
//! shares one retrying client between all three.

pub mod analyst;
pub mod critic;
pub mod illustrator;

pub use analyst::Analyst;
pub use critic::Critic;
pub use illustrator::Illustrator;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::AnalyzedRecord;

/// Turn a parsed model answer into records.
///
/// A bare object is read as a one-element list. Any element that does not fit
/// the record schema, or that has a blank `summary`, makes the whole answer
/// malformed. Every record field has a default, so the summary check is what
/// keeps an arbitrary object (a stray glossary term, `{}`) from passing as a
/// record.
pub fn records_from_value(value: Value) -> Result<Vec<AnalyzedRecord>> {
    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(Error::MalformedOutput(format!(
                "expected a JSON array of records, got {other}"
            )));
        }
    };

    items
        .into_iter()
        .map(|item| {
            let record: AnalyzedRecord = serde_json::from_value(item)
                .map_err(|e| Error::MalformedOutput(format!("record does not match schema: {e}")))?;
            if record.summary.trim().is_empty() {
                return Err(Error::MalformedOutput("record has no summary".into()));
            }
            Ok(record)
        })
        .collect()
}
