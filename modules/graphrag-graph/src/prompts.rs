//! System prompts and prompt builders for every generation call.

use std::sync::LazyLock;

use regex::Regex;

use ai_client::Message;

// --- Query generation ---

pub const CYPHER_SYSTEM: &str = r#"You are a careful Cypher generator.

You MUST ONLY use labels, relationship types, and property names that appear in the SCHEMA.
Do not invent labels, relationships, or properties.

HARD RULES:
1. Never write data. No CREATE, MERGE, DELETE, DETACH, SET, REMOVE, DROP, LOAD CSV, FOREACH or CALL.
2. Write exactly ONE read-only query: MATCH / OPTIONAL MATCH / WHERE / WITH / RETURN / ORDER BY / LIMIT.
3. Always include LIMIT (at most 50; prefer 25).
4. Match user-supplied strings case-insensitively, e.g.
   toLower(coalesce(n.code, n.name, n.canonical)) CONTAINS toLower('foo')
5. Use literal values, never $parameters.
6. For alternate relationships use the bracket form [:REL_A|REL_B].
7. Return small, tidy columns with clear aliases. When nodes can be cited, return a stable identifier:
   coalesce(n.NodeID, labels(n)[0] + ':' + coalesce(n.code, n.name)) AS nodeId

Respond with a single fenced code block and no explanation:
```cypher
MATCH ...
```"#;

const GENERIC_PATTERNS: &str = r#"GENERIC PATTERNS (schema-agnostic examples):
- Filter nodes of a label by text:
  MATCH (n:SomeLabel)
  WHERE toLower(coalesce(n.name, n.code, n.canonical)) CONTAINS toLower('term')
  RETURN coalesce(n.NodeID, labels(n)[0] + ':' + coalesce(n.code, n.name)) AS nodeId LIMIT 25

- Count per related node:
  MATCH (a:LabelA)-[:REL_TYPE]->(b:LabelB)
  WITH b, COUNT(DISTINCT a) AS cnt
  RETURN coalesce(b.NodeID, labels(b)[0] + ':' + coalesce(b.code, b.name)) AS nodeId, cnt
  ORDER BY cnt DESC
  LIMIT 25

- Join with two constraints (different labels):
  MATCH (a:LabelA)-[:REL1]->(b:LabelB)
  MATCH (a)-[:REL2]->(c:LabelC)
  WHERE toLower(coalesce(b.name, b.code, b.canonical)) CONTAINS toLower('x')
    AND toLower(coalesce(c.name, c.code, c.canonical)) CONTAINS toLower('y')
  RETURN coalesce(a.NodeID, labels(a)[0] + ':' + coalesce(a.code, a.name)) AS nodeId
  LIMIT 25"#;

static AGGREGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(which|most|top|how many|count|largest|fewest|highest|lowest|rank|popular)\b")
        .unwrap()
});

const AGGREGATION_HINT: &str =
    "(If applicable, use COUNT(DISTINCT ...) with GROUP BY and ORDER BY.)";

/// The question, with an aggregation nudge appended when it asks for a
/// ranking or count.
pub fn with_aggregation_hint(question: &str) -> String {
    let q = question.trim();
    if AGGREGATION_RE.is_match(q) {
        format!("{q}\n\n{AGGREGATION_HINT}")
    } else {
        q.to_string()
    }
}

pub fn cypher_prompt(schema_text: &str, value_hints: &str, question: &str) -> String {
    format!(
        "SCHEMA (labels, properties, relationship types):\n{schema_text}\n\n\
         EXAMPLE VALUES (to choose correct properties; not exhaustive):\n{value_hints}\n\n\
         {GENERIC_PATTERNS}\n\n\
         USER QUESTION:\n{}",
        with_aggregation_hint(question)
    )
}

/// Follow-up turn asking for a corrected query after an execution error.
pub fn repair_prompt(error: &str) -> String {
    format!(
        "The query above failed with this database error:\n{}\n\n\
         Write ONE corrected read-only query that answers the same question. \
         Use only names from the SCHEMA. Respond with a single fenced code block.",
        error.trim()
    )
}

// --- Result summary ---

pub const QA_SYSTEM: &str = r#"You turn database query results into a short factual answer.

Use ONLY the rows provided. Do not add facts that are not in the rows.
If the rows do not answer the question, say "I don't know."
When a row carries an identifier such as Org:Acme, cite it in square brackets.
Keep it to 1-4 sentences."#;

pub fn qa_prompt(question: &str, query: &str, rows_preview: &str) -> String {
    format!("QUESTION:\n{}\n\nQUERY:\n{query}\n\nROWS:\n{rows_preview}", question.trim())
}

// --- Fusion ---

pub const FUSE_SYSTEM: &str = r#"You are a Graph-RAG answerer. You receive two evidence blocks:
1) CYRESULT / CYCONTEXT from a generated graph query over the live schema.
2) FACTS from a vector-seeded one-hop graph expansion.

HARD RULES:
1. Answer ONLY from these sources.
2. Prefer CYRESULT / CYCONTEXT when they directly satisfy the question's explicit constraints; use FACTS to corroborate or supplement.
3. Do not infer missing constraints. If a match is partial, say which constraint is unconfirmed in one short clause.
4. Cite identifiers in square brackets, e.g. [Org:Acme]. Cite ONLY identifiers listed under CITATIONS.
5. Keep the answer to 1-6 sentences.
6. If the evidence does not answer the question, reply exactly: I don't know."#;

const LOW_CONFIDENCE_NOTE: &str = "NOTE: the generated query returned few or no rows. \
     Frame the answer as tentative where it rests on FACTS alone.";

pub struct FusionPrompt<'a> {
    pub question: &'a str,
    pub result: &'a str,
    pub rows: &'a str,
    pub facts: &'a str,
    pub citations: &'a str,
    pub low_confidence: bool,
}

impl FusionPrompt<'_> {
    pub fn render(&self) -> String {
        let mut out = format!(
            "QUESTION:\n{}\n\nCYRESULT:\n{}\n\nCYCONTEXT (rows):\n{}\n\n{}\n\n{}",
            self.question.trim(),
            self.result,
            self.rows,
            self.facts,
            self.citations,
        );
        if self.low_confidence {
            out.push_str("\n\n");
            out.push_str(LOW_CONFIDENCE_NOTE);
        }
        out
    }
}

// --- Routing ---

pub const ROUTER_SYSTEM: &str = r#"You are a router for a Graph-RAG API.
Return ONLY compact JSON with keys: strategy, k, per_seed, result_limit.
strategy must be one of "generatedQuery", "expansion", "fused".

Routing guidance:
- Precise graph constraints or joins (several filters such as state + product + certification): "generatedQuery".
- Fuzzy, exploratory, or similarity-driven questions: "expansion".
- Mixed or unclear: "fused".
No prose, no comments; JSON only."#;

/// Worked routing examples sent ahead of the question.
pub fn router_few_shots() -> Vec<Message> {
    vec![
        Message::user("Show orgs in Washington storing beans with non-GMO certification"),
        Message::assistant(
            r#"{"strategy":"generatedQuery","k":8,"per_seed":20,"result_limit":25}"#,
        ),
        Message::user("Who handles pulses in the Pacific Northwest?"),
        Message::assistant(r#"{"strategy":"expansion","k":8,"per_seed":20,"result_limit":25}"#),
        Message::user("Find grain blenders in Oregon and summarize the top orgs"),
        Message::assistant(r#"{"strategy":"fused","k":8,"per_seed":20,"result_limit":25}"#),
    ]
}
