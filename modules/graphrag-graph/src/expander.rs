use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use graphrag_common::{display_id, GraphReader, RagError, Row, SchemaSnapshot, Triple};

use crate::client::{row_str, row_strings};

/// Relationship priority of the legacy multi-field pattern retriever.
pub const LEGACY_RELATIONSHIP_PRIORITY: [&str; 5] = [
    "HAS_STATE",
    "HAS_BUSINESSTYPE",
    "HANDLES_PRODUCT",
    "STORES_PRODUCT",
    "HAS_CERTIFICATION",
];

const EXPAND_QUERY: &str = "UNWIND $ids AS id \
     MATCH (seed) WHERE elementId(seed) = id \
     CALL apoc.path.expandConfig(seed, { \
       minLevel: 1, maxLevel: 1, bfs: true, limit: $perSeed, \
       relationshipFilter: $relFilter, labelFilter: $labFilter \
     }) YIELD path \
     WITH seed, last(nodes(path)) AS nbr, head(relationships(path)) AS r \
     RETURN DISTINCT \
       elementId(seed) AS aId, labels(seed) AS aLabels, toString(seed.NodeID) AS aNodeId, \
       toString(seed.code) AS aCode, toString(seed.name) AS aName, \
       type(r) AS rel, \
       elementId(nbr) AS bId, labels(nbr) AS bLabels, toString(nbr.NodeID) AS bNodeId, \
       toString(nbr.code) AS bCode, toString(nbr.name) AS bName \
     LIMIT $limit";

/// Which relationship types a traversal may follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RelationshipFilter {
    /// Every relationship type in the snapshot.
    #[default]
    All,
    /// A fixed priority list, narrowed to types the snapshot knows.
    Priority(Vec<String>),
}

impl RelationshipFilter {
    pub fn legacy() -> Self {
        RelationshipFilter::Priority(
            LEGACY_RELATIONSHIP_PRIORITY
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

/// Traversal whitelists in APOC path-expander syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionFilters {
    /// `A|B|C`, no direction markers.
    pub relationship_filter: String,
    /// `+L1|+L2`.
    pub label_filter: String,
}

impl ExpansionFilters {
    /// Build the whitelists from the snapshot. `None` when either would be
    /// empty, since an empty APOC filter means "no restriction".
    pub fn from_snapshot(snapshot: &SchemaSnapshot, filter: &RelationshipFilter) -> Option<Self> {
        let mut rels: Vec<&str> = match filter {
            RelationshipFilter::All => snapshot.relationship_types.iter().map(String::as_str).collect(),
            RelationshipFilter::Priority(priority) => priority
                .iter()
                .map(String::as_str)
                .filter(|r| snapshot.has_relationship_type(r))
                .collect(),
        };
        rels.sort_unstable();
        rels.dedup();

        let mut labels: Vec<&str> = snapshot.labels.iter().map(String::as_str).collect();
        labels.sort_unstable();
        labels.dedup();

        if rels.is_empty() || labels.is_empty() {
            return None;
        }
        Some(Self {
            relationship_filter: rels.join("|"),
            label_filter: labels
                .iter()
                .map(|l| format!("+{l}"))
                .collect::<Vec<_>>()
                .join("|"),
        })
    }
}

/// One-hop neighborhood traversal from seed nodes.
pub struct GraphExpander {
    reader: Arc<dyn GraphReader>,
}

impl GraphExpander {
    pub fn new(reader: Arc<dyn GraphReader>) -> Self {
        Self { reader }
    }

    /// Triples for every seed's immediate neighborhood, deduplicated and
    /// capped at `result_limit`. No seeds means no traversal.
    pub async fn expand(
        &self,
        seed_ids: &[String],
        filters: &ExpansionFilters,
        per_seed_limit: usize,
        result_limit: usize,
    ) -> Result<Vec<Triple>, RagError> {
        let mut seen_ids = HashSet::new();
        let ids: Vec<Value> = seed_ids
            .iter()
            .filter(|id| seen_ids.insert(id.as_str()))
            .map(|id| Value::from(id.as_str()))
            .collect();
        if ids.is_empty() || per_seed_limit == 0 || result_limit == 0 {
            return Ok(Vec::new());
        }

        let mut params = Row::new();
        params.insert("ids".into(), Value::Array(ids));
        params.insert("perSeed".into(), Value::from(per_seed_limit as u64));
        params.insert("limit".into(), Value::from(result_limit as u64));
        params.insert("relFilter".into(), Value::from(filters.relationship_filter.as_str()));
        params.insert("labFilter".into(), Value::from(filters.label_filter.as_str()));

        let rows = self.reader.read(EXPAND_QUERY, params).await?;

        let mut seen = HashSet::new();
        let triples: Vec<Triple> = rows
            .iter()
            .filter_map(row_to_triple)
            .filter(|t| seen.insert(t.clone()))
            .take(result_limit)
            .collect();

        debug!(
            seeds = seed_ids.len(),
            rows = rows.len(),
            triples = triples.len(),
            "Neighborhood expansion"
        );
        Ok(triples)
    }
}

fn row_to_triple(row: &Row) -> Option<Triple> {
    let end = |prefix: &str| -> Option<String> {
        let element_id = row_str(row, &format!("{prefix}Id"))?;
        Some(display_id(
            &row_strings(row, &format!("{prefix}Labels")),
            row_str(row, &format!("{prefix}NodeId")),
            row_str(row, &format!("{prefix}Code")),
            row_str(row, &format!("{prefix}Name")),
            element_id,
        ))
    };
    let relation = row_str(row, "rel").filter(|r| !r.is_empty())?;
    Some(Triple::new(end("a")?, relation, end("b")?))
}
