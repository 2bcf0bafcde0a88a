//! Evidence rendering and the citation whitelist.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use ai_client::truncate_to_char_boundary;
use graphrag_common::{FactSet, Row, SchemaSnapshot};

pub const MAX_PREVIEW_ROWS: usize = 40;
pub const MAX_PREVIEW_COLUMNS: usize = 8;
pub const MAX_FACT_LINES: usize = 120;
pub const MAX_PROMPT_CITATIONS: usize = 40;
pub const FALLBACK_FACTS_CHARS: usize = 1200;
pub const FALLBACK_FACTS_PREFIX: &str = "Here's what I can confirm from the graph facts:";
pub const FALLBACK_ROWS_PREFIX: &str = "Here's what the graph query returned:";

const TRUNCATED_MARKER: &str = "\n...[truncated]...";

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*):(\S.*)$").unwrap());
static BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\[([^\[\]\n]+)\]").unwrap());

// =============================================================================
// Text clipping
// =============================================================================

/// Trimmed `text`, cut to `max_chars` with a truncation marker. Empty input
/// renders as `(none)`.
pub fn clip(text: &str, max_chars: usize) -> String {
    let t = text.trim();
    if t.is_empty() {
        return "(none)".to_string();
    }
    if t.len() <= max_chars {
        return t.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATED_MARKER.len());
    format!("{}{TRUNCATED_MARKER}", truncate_to_char_boundary(t, keep))
}

// =============================================================================
// Facts
// =============================================================================

/// Fact text for the fusion prompt, capped at [`MAX_FACT_LINES`] triples.
pub fn facts_for_prompt(facts: &FactSet) -> String {
    let rendered = facts.render();
    let mut lines = rendered.lines();
    let header = lines.next().unwrap_or("FACTS");
    let body: Vec<&str> = lines.collect();
    if body.len() <= MAX_FACT_LINES {
        return rendered;
    }
    let mut out = vec![header];
    out.extend(&body[..MAX_FACT_LINES]);
    let more = format!("... (+{} more lines)", body.len() - MAX_FACT_LINES);
    out.push(&more);
    out.join("\n")
}

/// Deterministic answer from facts alone, used when fusion yields nothing.
pub fn facts_fallback(facts: &FactSet) -> String {
    format!(
        "{FALLBACK_FACTS_PREFIX}\n{}",
        clip(&facts_for_prompt(facts), FALLBACK_FACTS_CHARS)
    )
}

// =============================================================================
// Rows
// =============================================================================

pub fn rows_fallback(rows: &[Row]) -> String {
    format!(
        "{FALLBACK_ROWS_PREFIX}\n{}",
        clip(&preview_rows(rows), FALLBACK_FACTS_CHARS)
    )
}

/// `N. k=v; k=v` per row (at most 40 rows and 8 columns), or `(none)`.
pub fn preview_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "(none)".to_string();
    }
    let mut lines: Vec<String> = rows
        .iter()
        .take(MAX_PREVIEW_ROWS)
        .enumerate()
        .map(|(i, row)| {
            let kv: Vec<String> = row
                .iter()
                .take(MAX_PREVIEW_COLUMNS)
                .map(|(k, v)| format!("{k}={}", render_value(v)))
                .collect();
            format!("{}. {}", i + 1, kv.join("; "))
        })
        .collect();
    if rows.len() > MAX_PREVIEW_ROWS {
        lines.push(format!("... (+{} more)", rows.len() - MAX_PREVIEW_ROWS));
    }
    lines.join("\n")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `Label:Value` strings in the previewed cells whose label the snapshot
/// knows, in first-seen order.
pub fn row_identifiers(rows: &[Row], snapshot: &SchemaSnapshot) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows.iter().take(MAX_PREVIEW_ROWS) {
        for value in row.values().take(MAX_PREVIEW_COLUMNS) {
            collect_identifiers(value, snapshot, &mut seen, &mut out);
        }
    }
    out
}

fn collect_identifiers(
    value: &Value,
    snapshot: &SchemaSnapshot,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Some(caps) = IDENTIFIER_RE.captures(s) {
                if snapshot.has_label(&caps[1]) && seen.insert(s.to_string()) {
                    out.push(s.to_string());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_identifiers(item, snapshot, seen, out);
            }
        }
        _ => {}
    }
}

// =============================================================================
// Citation whitelist
// =============================================================================

/// Identifiers an answer may cite: fact citations (sorted) then row
/// identifiers (first-seen), deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationWhitelist {
    ids: Vec<String>,
    index: HashSet<String>,
}

impl CitationWhitelist {
    pub fn build(facts: &FactSet, row_ids: impl IntoIterator<Item = String>) -> Self {
        let mut whitelist = Self::default();
        for id in facts.citations().into_iter().chain(row_ids) {
            if !id.is_empty() && whitelist.index.insert(id.clone()) {
                whitelist.ids.push(id);
            }
        }
        whitelist
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ids
    }

    /// Block listing the identifiers the model may cite.
    pub fn prompt_block(&self) -> String {
        if self.ids.is_empty() {
            return "CITATIONS (allowed NodeIDs):\n(none)".to_string();
        }
        let lines: Vec<String> = self
            .ids
            .iter()
            .take(MAX_PROMPT_CITATIONS)
            .map(|id| format!("- {id}"))
            .collect();
        format!("CITATIONS (allowed NodeIDs):\n{}", lines.join("\n"))
    }
}

/// Remove bracketed citations that are not whitelisted. `[A, B]` keeps only
/// its allowed members; a bracket with none left is dropped entirely.
pub fn strip_citations(answer: &str, whitelist: &CitationWhitelist) -> String {
    let stripped = BRACKET_RE.replace_all(answer, |caps: &regex::Captures| {
        let whole = &caps[0];
        let leading = &whole[..whole.len() - whole.trim_start().len()];
        let kept: Vec<&str> = caps[1]
            .split(',')
            .map(str::trim)
            .filter(|id| whitelist.contains(id))
            .collect();
        if kept.is_empty() {
            String::new()
        } else {
            format!("{leading}[{}]", kept.join(", "))
        }
    });
    stripped.trim().to_string()
}
