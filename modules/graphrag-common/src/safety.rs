//! Read-only grammar for generated graph queries.
//!
//! Only a [`ValidatedQuery`] may be handed to the executor, and the only way
//! to obtain one is [`validate_read_only`].

use std::sync::LazyLock;

use regex::Regex;

use crate::error::RagError;
use crate::types::SchemaSnapshot;

/// Row cap enforced on every generated query.
pub const MAX_QUERY_LIMIT: u64 = 50;

const FORBIDDEN_KEYWORDS: [&str; 19] = [
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "LOAD", "FOREACH", "CALL",
    "USE", "GRANT", "REVOKE", "ALTER", "RENAME", "START", "STOP", "TERMINATE", "SHOW",
];

/// Clause keywords that may directly precede an opening parenthesis.
const PAREN_KEYWORDS: [&str; 24] = [
    "MATCH", "OPTIONAL", "WHERE", "WITH", "RETURN", "UNWIND", "AND", "OR", "XOR", "NOT", "IN",
    "AS", "DISTINCT", "CASE", "WHEN", "THEN", "ELSE", "BY", "SKIP", "LIMIT", "UNION", "IS",
    "CONTAINS", "EXISTS",
];

/// Built-in functions a generated query may call. Anything else, and any
/// namespaced call outside this list, is rejected.
const ALLOWED_FUNCTIONS: [&str; 66] = [
    "count", "collect", "sum", "avg", "min", "max", "stdev", "stdevp", "percentilecont",
    "percentiledisc", "size", "length", "coalesce", "tostring", "tostringornull", "tointeger",
    "tointegerornull", "tofloat", "tofloatornull", "toboolean", "tolower", "toupper", "trim",
    "ltrim", "rtrim", "replace", "substring", "left", "right", "split", "reverse", "head",
    "last", "tail", "range", "keys", "labels", "type", "id", "elementid", "properties", "nodes",
    "relationships", "startnode", "endnode", "exists", "isempty", "all", "any", "none",
    "single", "abs", "ceil", "floor", "round", "sign", "sqrt", "date", "datetime", "duration",
    "shortestpath", "allshortestpaths", "reduce", "point", "point.distance", "date.truncate",
];

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());
static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_]\w*(?:\s*\.\s*[A-Za-z_]\w*)*)\s*\(").unwrap()
});
static NODE_LABELS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*(?:[A-Za-z_]\w*)?\s*((?:[:|&]\s*(?:`[^`]+`|[A-Za-z_]\w*)\s*)+)").unwrap()
});
static REL_TYPES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*(?:[A-Za-z_]\w*)?\s*:\s*((?:`[^`]+`|[A-Za-z_]\w*)(?:\s*\|\s*:?\s*(?:`[^`]+`|[A-Za-z_]\w*))*)")
        .unwrap()
});
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`|([A-Za-z_]\w*)").unwrap());
static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+)").unwrap());
static RETURN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bRETURN\b").unwrap());
static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[A-Za-z_]\w*").unwrap());

/// A query that passed [`validate_read_only`]. Cannot be built any other way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    text: String,
}

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl std::fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for ValidatedQuery {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Check a generated query against the read-only grammar.
///
/// Rejects write/admin clauses, procedure calls, multiple statements, queries
/// without `RETURN`, parameters, and any label or relationship type not in
/// `schema`. Appends `LIMIT 50` when the final projection has no limit and
/// clamps larger literal limits.
pub fn validate_read_only(query: &str, schema: &SchemaSnapshot) -> Result<ValidatedQuery, RagError> {
    let reject = |reason: String| Err(RagError::ValidationRejected(reason));

    let mut text = query.trim().to_string();
    while text.ends_with(';') {
        text.pop();
        text = text.trim_end().to_string();
    }
    if text.is_empty() {
        return reject("empty query".to_string());
    }

    let masked = mask(&text, false);
    let keyword_view = mask(&text, true);

    if masked.contains(';') {
        return reject("multiple statements".to_string());
    }

    if let Some(keyword) = forbidden_keyword(&keyword_view) {
        return reject(format!("forbidden clause {keyword}"));
    }
    if let Some(reason) = disallowed_call(&masked) {
        return reject(reason);
    }
    if PARAM_RE.is_match(&keyword_view) {
        return reject("query parameters are not supported".to_string());
    }

    let last_return = match RETURN_RE.find_iter(&keyword_view).last() {
        Some(m) => m.start(),
        None => return reject("missing RETURN".to_string()),
    };

    for caps in NODE_LABELS_RE.captures_iter(&masked) {
        for label in names(&caps[1]) {
            if !schema.has_label(&label) {
                return reject(format!("unknown label {label}"));
            }
        }
    }
    for caps in REL_TYPES_RE.captures_iter(&masked) {
        for rel in names(&caps[1]) {
            if !schema.has_relationship_type(&rel) {
                return reject(format!("unknown relationship type {rel}"));
            }
        }
    }

    Ok(ValidatedQuery {
        text: enforce_limit(&text, &keyword_view, last_return),
    })
}

fn forbidden_keyword(view: &str) -> Option<String> {
    let bytes = view.as_bytes();
    WORD_RE.find_iter(view).find_map(|m| {
        let word = m.as_str().to_ascii_uppercase();
        if !FORBIDDEN_KEYWORDS.contains(&word.as_str()) {
            return None;
        }
        // Property access, parameter names, and label names are not clauses.
        let prev = view[..m.start()].trim_end().bytes().last();
        if matches!(prev, Some(b'.') | Some(b'$') | Some(b':')) {
            return None;
        }
        if m.start() > 0 && matches!(bytes[m.start() - 1], b'.' | b'$') {
            return None;
        }
        Some(word)
    })
}

/// Every `name(` or `ns.name(` must be a clause keyword or an allowed
/// function. Backtick quoting does not hide a namespace.
fn disallowed_call(masked: &str) -> Option<String> {
    let view = masked.replace('`', " ");
    CALL_RE.captures_iter(&view).find_map(|caps| {
        let name: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
        let dotted = name.contains('.');
        if !dotted && PAREN_KEYWORDS.contains(&name.to_ascii_uppercase().as_str()) {
            return None;
        }
        if ALLOWED_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str()) {
            return None;
        }
        Some(if dotted {
            format!("procedure call {name}")
        } else {
            format!("function {name} is not allowed")
        })
    })
}

fn names(segment: &str) -> Vec<String> {
    NAME_RE
        .captures_iter(segment)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn enforce_limit(text: &str, view: &str, last_return: usize) -> String {
    let mut out = String::with_capacity(text.len() + 10);
    let mut cursor = 0;
    let mut final_has_limit = false;

    for caps in LIMIT_RE.captures_iter(view) {
        let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last_return {
            final_has_limit = true;
        }
        let value: u64 = num.as_str().parse().unwrap_or(u64::MAX);
        if value > MAX_QUERY_LIMIT {
            out.push_str(&text[cursor..num.start()]);
            out.push_str(&MAX_QUERY_LIMIT.to_string());
            cursor = num.end();
        }
    }
    out.push_str(&text[cursor..]);

    if !final_has_limit {
        out.push_str(&format!("\nLIMIT {MAX_QUERY_LIMIT}"));
    }
    out
}

/// Blank out string literals and comments byte-for-byte so offsets line up
/// with the original text. With `mask_identifiers`, backtick-quoted names are
/// blanked too.
fn mask(text: &str, mask_identifiers: bool) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        Quote(u8),
        LineComment,
        BlockComment,
    }

    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut state = State::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match b {
                b'\'' | b'"' => state = State::Quote(b),
                b'`' if mask_identifiers => state = State::Quote(b),
                b'/' if next == Some(b'/') => {
                    state = State::LineComment;
                    out[i] = b' ';
                }
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                }
                _ => {}
            },
            State::Quote(q) => {
                if b == b'\\' && q != b'`' {
                    out[i] = b' ';
                    if i + 1 < bytes.len() {
                        out[i + 1] = b' ';
                    }
                    i += 1;
                } else if b == q {
                    state = State::Code;
                } else {
                    out[i] = b' ';
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                } else {
                    out[i] = b' ';
                }
            }
            State::BlockComment => {
                out[i] = b' ';
                if b == b'*' && next == Some(b'/') {
                    out[i + 1] = b' ';
                    state = State::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
