use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One result row: column name → scalar or list.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Returned whenever the evidence cannot support an answer.
pub const I_DONT_KNOW: &str = "I don't know.";

/// Query text reported for a generated query that never produced rows.
pub const BLOCKED_QUERY: &str = "(blocked)";

/// Display-property preference: canonical identifiers first, then generic
/// name-like fields.
pub const DISPLAY_PROPERTY_PREFERENCE: [&str; 7] =
    ["NodeID", "nodeId", "id", "code", "name", "title", "canonical"];

/// Cap on distinct sample values collected per label.
pub const MAX_SAMPLE_VALUES: usize = 18;

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSchema {
    /// Sorted, distinct property keys seen on sampled nodes.
    pub properties: Vec<String>,
    pub display_property: Option<String>,
    /// At most [`MAX_SAMPLE_VALUES`] distinct stringified display values.
    pub sample_values: Vec<String>,
}

impl LabelSchema {
    pub fn new(mut properties: Vec<String>, mut sample_values: Vec<String>) -> Self {
        properties.sort();
        properties.dedup();
        let display_property = choose_display_property(&properties);
        if display_property.is_none() {
            sample_values.clear();
        }
        sample_values.truncate(MAX_SAMPLE_VALUES);
        Self {
            properties,
            display_property,
            sample_values,
        }
    }
}

/// Cached summary of the graph's labels, relationship types and properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub label_properties: BTreeMap<String, LabelSchema>,
    pub loaded_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn has_relationship_type(&self, rel: &str) -> bool {
        self.relationship_types.iter().any(|r| r == rel)
    }

    pub fn label(&self, label: &str) -> Option<&LabelSchema> {
        self.label_properties.get(label)
    }
}

/// Pick the property used to display and cite nodes of a label.
///
/// The first member of [`DISPLAY_PROPERTY_PREFERENCE`] present wins; otherwise
/// the alphabetically first property. Independent of input order.
pub fn choose_display_property(properties: &[String]) -> Option<String> {
    DISPLAY_PROPERTY_PREFERENCE
        .iter()
        .find(|pref| properties.iter().any(|p| p == *pref))
        .map(|p| p.to_string())
        .or_else(|| properties.iter().min().cloned())
}

// =============================================================================
// Seeds and triples
// =============================================================================

/// A node found by vector similarity, used as a traversal starting point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedNode {
    /// Opaque graph handle (element id).
    pub id: String,
    pub labels: Vec<String>,
    pub display_id: String,
    pub score: f64,
}

/// Citable identifier for a node.
///
/// An explicit `NodeID` is used verbatim; otherwise `label[0]:code`, then
/// `label[0]:name`, then `label[0]:<element id>`. Never empty.
pub fn display_id(
    labels: &[String],
    explicit_id: Option<&str>,
    code: Option<&str>,
    name: Option<&str>,
    element_id: &str,
) -> String {
    if let Some(id) = non_empty(explicit_id) {
        return id.to_string();
    }
    let key = non_empty(code)
        .or_else(|| non_empty(name))
        .unwrap_or(element_id);
    match labels.first() {
        Some(label) => format!("{label}:{key}"),
        None => key.to_string(),
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

/// Deduplicated triples from one retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSet {
    triples: Vec<Triple>,
}

impl FactSet {
    /// Keeps the first occurrence of each (subject, relation, object) and
    /// drops triples with an empty component.
    pub fn from_triples(triples: impl IntoIterator<Item = Triple>) -> Self {
        let mut seen = HashSet::new();
        let triples = triples
            .into_iter()
            .filter(|t| !t.subject.is_empty() && !t.relation.is_empty() && !t.object.is_empty())
            .filter(|t| seen.insert(t.clone()))
            .collect();
        Self { triples }
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Every subject and object, sorted and distinct.
    pub fn citations(&self) -> Vec<String> {
        self.triples
            .iter()
            .flat_map(|t| [t.subject.clone(), t.object.clone()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// `FACTS` header followed by one `- (s) REL (o)` line per triple.
    pub fn render(&self) -> String {
        let mut lines = vec!["FACTS".to_string()];
        if self.triples.is_empty() {
            lines.push("- (none)".to_string());
        }
        for t in &self.triples {
            lines.push(format!("- ({}) {} ({})", t.subject, t.relation, t.object));
        }
        lines.join("\n")
    }
}

// =============================================================================
// Generated query
// =============================================================================

/// Terminal state of the query generator for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "reason")]
pub enum QueryOutcome {
    Success,
    /// The safety grammar refused the generated text.
    Rejected(String),
    /// Execution failed, including after the single repair round.
    ExecutionFailed(String),
    /// Schema, generation, or graph endpoint unreachable.
    Unavailable(String),
    /// Branch not run for this request's strategy.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQueryResult {
    pub query_text: String,
    pub result_summary: String,
    pub context_rows: Vec<Row>,
    pub repaired: bool,
    pub outcome: QueryOutcome,
}

impl GeneratedQueryResult {
    pub fn failed(outcome: QueryOutcome, repaired: bool) -> Self {
        Self {
            query_text: BLOCKED_QUERY.to_string(),
            result_summary: I_DONT_KNOW.to_string(),
            context_rows: Vec::new(),
            repaired,
            outcome,
        }
    }

    pub fn skipped() -> Self {
        Self {
            query_text: String::new(),
            result_summary: String::new(),
            context_rows: Vec::new(),
            repaired: false,
            outcome: QueryOutcome::Skipped,
        }
    }

    /// Whether the summary text carries anything worth fusing.
    pub fn has_summary(&self) -> bool {
        let s = self.result_summary.trim();
        !s.is_empty() && s != I_DONT_KNOW && !s.eq_ignore_ascii_case("(none)")
    }

    /// Query text to report, `None` when no query was attempted.
    pub fn reported_query(&self) -> Option<String> {
        match self.outcome {
            QueryOutcome::Skipped => None,
            _ => Some(self.query_text.clone()),
        }
    }
}

// =============================================================================
// Routing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Raw seeds only, no fusion.
    Semantic,
    /// Seeds + one-hop expansion, fused.
    Expansion,
    /// Generated query only, fused.
    GeneratedQuery,
    /// Expansion and generated query concurrently, fused.
    Fused,
}

impl Strategy {
    pub fn runs_expansion(self) -> bool {
        matches!(self, Strategy::Expansion | Strategy::Fused)
    }

    pub fn runs_generated_query(self) -> bool {
        matches!(self, Strategy::GeneratedQuery | Strategy::Fused)
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "semantic" => Ok(Strategy::Semantic),
            "expansion" | "hybrid" => Ok(Strategy::Expansion),
            "generatedquery" | "cypher" => Ok(Strategy::GeneratedQuery),
            "fused" => Ok(Strategy::Fused),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParams {
    pub k: usize,
    pub per_seed_limit: usize,
    pub result_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    pub strategy: Strategy,
    pub parameters: RouteParams,
}

// =============================================================================
// Request / response surface
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default, alias = "per_seed")]
    pub per_seed: Option<usize>,
    #[serde(default, alias = "result_limit", alias = "orgLimit", alias = "org_limit")]
    pub result_limit: Option<usize>,
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub auto: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub triples: Vec<Triple>,
    pub generated_query: Option<String>,
    pub context_rows_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub answer: String,
    pub citations: Vec<String>,
    pub evidence: Evidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_decision: Option<RouteDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds: Option<Vec<SeedNode>>,
}
