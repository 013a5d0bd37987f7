//! Art-director pass: a news summary becomes an English image prompt.

use tracing::{error, info, instrument};

use crate::llm::Generate;
use crate::prompts::{FALLBACK_IMAGE_PROMPT, IMAGE_PROMPT, render};
use crate::utils::truncate_for_log;

#[derive(Debug)]
pub struct Illustrator<L> {
    llm: L,
}

impl<L: Generate> Illustrator<L> {
    pub fn new(llm: L) -> Self {
        Self { llm }
    }

    /// Never fails; falls back to [`FALLBACK_IMAGE_PROMPT`].
    #[instrument(level = "info", skip_all)]
    pub async fn prompt_for(&self, summary: &str) -> String {
        let request = render(IMAGE_PROMPT, &[("summary", summary)]);
        match self.llm.generate(&[request]).await {
            Ok(text) if !text.trim().is_empty() => {
                let prompt = text.trim().to_string();
                info!(prompt = %truncate_for_log(&prompt, 200), "Generated image prompt");
                prompt
            }
            Ok(_) => {
                error!("Image prompt came back empty; using fallback");
                FALLBACK_IMAGE_PROMPT.to_string()
            }
            Err(e) => {
                error!(error = %e, "Image prompt generation failed; using fallback");
                FALLBACK_IMAGE_PROMPT.to_string()
            }
        }
    }
}
