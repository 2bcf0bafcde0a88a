//! Schema-grounded query synthesis with one repair round.

use std::sync::Arc;

use tracing::{debug, info, warn};

use ai_client::{extract_fenced_block, Message};
use graphrag_common::{
    validate_read_only, GeneratedQueryResult, GraphReadError, GraphReader, QueryOutcome,
    RagError, Row, TextGenerator,
};

use crate::evidence::{preview_rows, MAX_PREVIEW_ROWS};
use crate::prompts;
use crate::schema::{schema_text, value_hints, SchemaCache};

const QUERY_TEMPERATURE: f32 = 0.0;
const MAX_GENERATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Draft,
    Validated,
    Executed,
    Repairing,
    Success,
    Failed,
}

/// Generates, validates, and executes a read-only query for a question.
///
/// At most two generation calls and two executions per run; only an
/// execution error from the database triggers the single repair round.
pub struct QueryGenerator {
    reader: Arc<dyn GraphReader>,
    generator: Arc<dyn TextGenerator>,
    schema: Arc<SchemaCache>,
}

impl QueryGenerator {
    pub fn new(
        reader: Arc<dyn GraphReader>,
        generator: Arc<dyn TextGenerator>,
        schema: Arc<SchemaCache>,
    ) -> Self {
        Self {
            reader,
            generator,
            schema,
        }
    }

    /// Never fails: every failure ends in a `(blocked)` result whose outcome
    /// records why.
    pub async fn run(&self, question: &str) -> GeneratedQueryResult {
        let snapshot = match self.schema.snapshot().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Schema unavailable, skipping query generation");
                return failed(QueryOutcome::Unavailable(e.to_string()), false);
            }
        };

        let mut messages = vec![Message::user(prompts::cypher_prompt(
            &schema_text(&snapshot),
            &value_hints(&snapshot),
            question,
        ))];
        let mut repaired = false;

        for attempt in 1..=MAX_GENERATIONS {
            transition(State::Draft, attempt);
            let raw = match self
                .generator
                .complete(prompts::CYPHER_SYSTEM, &messages, QUERY_TEMPERATURE)
                .await
            {
                Ok(raw) => raw,
                Err(e) => return failed(outcome_for(e), repaired),
            };

            let candidate = extract_query(&raw);
            let validated = match validate_read_only(&candidate, &snapshot) {
                Ok(v) => v,
                Err(e) => {
                    info!(attempt, query = %candidate, reason = %e, "Generated query rejected");
                    return failed(outcome_for(e), repaired);
                }
            };
            transition(State::Validated, attempt);

            match self.reader.read(validated.as_str(), Row::new()).await {
                Ok(mut rows) => {
                    transition(State::Executed, attempt);
                    rows.truncate(MAX_PREVIEW_ROWS);
                    let query_text = validated.into_string();
                    let result_summary = self.summarize(question, &query_text, &rows).await;
                    transition(State::Success, attempt);
                    info!(rows = rows.len(), repaired, "Generated query succeeded");
                    return GeneratedQueryResult {
                        query_text,
                        result_summary,
                        context_rows: rows,
                        repaired,
                        outcome: QueryOutcome::Success,
                    };
                }
                Err(GraphReadError::Query(error)) if attempt < MAX_GENERATIONS => {
                    transition(State::Repairing, attempt);
                    info!(attempt, error = %error, "Generated query failed, repairing");
                    messages.push(Message::assistant(raw));
                    messages.push(Message::user(prompts::repair_prompt(&error)));
                    repaired = true;
                }
                Err(GraphReadError::Query(error)) => {
                    return failed(QueryOutcome::ExecutionFailed(error), repaired);
                }
                Err(e) => return failed(QueryOutcome::Unavailable(e.to_string()), repaired),
            }
        }

        failed(
            QueryOutcome::ExecutionFailed("repair budget exhausted".to_string()),
            repaired,
        )
    }

    /// One low-temperature call phrasing the rows as an answer. Empty rows
    /// summarize to nothing; a failed call falls back to the row preview.
    async fn summarize(&self, question: &str, query: &str, rows: &[Row]) -> String {
        if rows.is_empty() {
            return String::new();
        }
        let preview = preview_rows(rows);
        let messages = [Message::user(prompts::qa_prompt(question, query, &preview))];
        match self
            .generator
            .complete(prompts::QA_SYSTEM, &messages, QUERY_TEMPERATURE)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => preview,
            Err(e) => {
                warn!(error = %e, "Result summary failed, using row preview");
                preview
            }
        }
    }
}

fn transition(state: State, attempt: usize) {
    debug!(?state, attempt, "Query generator");
}

fn failed(outcome: QueryOutcome, repaired: bool) -> GeneratedQueryResult {
    transition(State::Failed, 0);
    GeneratedQueryResult::failed(outcome, repaired)
}

fn outcome_for(e: RagError) -> QueryOutcome {
    match e {
        RagError::ValidationRejected(reason) => QueryOutcome::Rejected(reason),
        RagError::ExecutionFailed(reason) => QueryOutcome::ExecutionFailed(reason),
        RagError::UpstreamUnavailable(reason) | RagError::Config(reason) => {
            QueryOutcome::Unavailable(reason)
        }
    }
}

/// Query text from a model response: the first fenced block if any, minus
/// comment-only lines.
pub fn extract_query(response: &str) -> String {
    let body = extract_fenced_block(response).unwrap_or(response);
    body.lines()
        .filter(|line| {
            let t = line.trim_start();
            !t.starts_with("--") && !t.starts_with("//")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
