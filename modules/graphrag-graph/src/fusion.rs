use std::sync::Arc;

use tracing::{debug, warn};

use ai_client::Message;
use graphrag_common::{FactSet, GeneratedQueryResult, TextGenerator, I_DONT_KNOW};

use crate::evidence::{
    clip, facts_fallback, facts_for_prompt, preview_rows, rows_fallback, strip_citations,
    CitationWhitelist,
};
use crate::prompts::{FusionPrompt, FUSE_SYSTEM};

const FUSION_TEMPERATURE: f32 = 0.2;
const MAX_RESULT_CHARS: usize = 2000;
const MAX_ROWS_CHARS: usize = 6000;
const MAX_FACTS_CHARS: usize = 6000;

/// Merges expansion facts and generated-query evidence into one answer.
pub struct EvidenceFuser {
    generator: Arc<dyn TextGenerator>,
}

impl EvidenceFuser {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Answer from the evidence only. Never fails: with no evidence the
    /// answer is `I don't know.` without a generation call, and a failed or
    /// empty generation falls back to the query summary, then the facts,
    /// then the returned rows.
    /// Citations outside `whitelist` are stripped from whatever is returned.
    pub async fn fuse(
        &self,
        question: &str,
        facts: &FactSet,
        generated: &GeneratedQueryResult,
        whitelist: &CitationWhitelist,
        low_confidence: bool,
    ) -> String {
        if facts.is_empty() && !generated.has_summary() && generated.context_rows.is_empty() {
            debug!("No evidence on either branch");
            return I_DONT_KNOW.to_string();
        }

        let result = if generated.has_summary() {
            generated.result_summary.as_str()
        } else {
            ""
        };
        let prompt = FusionPrompt {
            question,
            result: &clip(result, MAX_RESULT_CHARS),
            rows: &clip(&preview_rows(&generated.context_rows), MAX_ROWS_CHARS),
            facts: &clip(&facts_for_prompt(facts), MAX_FACTS_CHARS),
            citations: &whitelist.prompt_block(),
            low_confidence,
        }
        .render();

        match self
            .generator
            .complete(FUSE_SYSTEM, &[Message::user(prompt)], FUSION_TEMPERATURE)
            .await
        {
            Ok(text) => {
                let answer = strip_citations(&text, whitelist);
                if has_text(&answer) {
                    return answer;
                }
                warn!("Fusion returned no usable text, falling back");
            }
            Err(e) => warn!(error = %e, "Fusion generation failed, falling back"),
        }

        self.fallback(facts, generated, whitelist)
    }

    fn fallback(
        &self,
        facts: &FactSet,
        generated: &GeneratedQueryResult,
        whitelist: &CitationWhitelist,
    ) -> String {
        if generated.has_summary() {
            let summary = strip_citations(&generated.result_summary, whitelist);
            if has_text(&summary) {
                return summary;
            }
        }
        if !facts.is_empty() {
            return facts_fallback(facts);
        }
        if !generated.context_rows.is_empty() {
            return rows_fallback(&generated.context_rows);
        }
        I_DONT_KNOW.to_string()
    }
}

fn has_text(text: &str) -> bool {
    let t = text.trim();
    !t.is_empty() && !t.eq_ignore_ascii_case("(none)")
}
