//! Process-wide schema snapshot with coalesced loading.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use futures::future::try_join_all;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use graphrag_common::{
    GraphReader, LabelSchema, RagError, Row, SchemaSnapshot, MAX_SAMPLE_VALUES,
};

use crate::client::row_str;

pub const DEFAULT_MAX_NODES_PER_LABEL: usize = 200;

/// Lazily computed [`SchemaSnapshot`] shared by every request.
///
/// The current generation lives in a `OnceCell`; concurrent first callers
/// all await the same introspection. `invalidate()` swaps in an empty cell
/// so the next caller starts a new generation.
pub struct SchemaCache {
    reader: Arc<dyn GraphReader>,
    max_nodes_per_label: usize,
    current: ArcSwap<OnceCell<Arc<SchemaSnapshot>>>,
}

impl SchemaCache {
    pub fn new(reader: Arc<dyn GraphReader>, max_nodes_per_label: usize) -> Self {
        Self {
            reader,
            max_nodes_per_label,
            current: ArcSwap::from_pointee(OnceCell::new()),
        }
    }

    /// Current snapshot, loading it on first access. A failed load leaves
    /// the cache empty so the next call retries.
    pub async fn snapshot(&self) -> Result<Arc<SchemaSnapshot>, RagError> {
        let cell = self.current.load_full();
        cell.get_or_try_init(|| self.load()).await.cloned()
    }

    pub fn invalidate(&self) {
        self.current.store(Arc::new(OnceCell::new()));
        info!("Schema cache invalidated");
    }

    /// Invalidate, then load a fresh snapshot.
    pub async fn refresh(&self) -> Result<Arc<SchemaSnapshot>, RagError> {
        self.invalidate();
        self.snapshot().await
    }

    async fn load(&self) -> Result<Arc<SchemaSnapshot>, RagError> {
        let start = std::time::Instant::now();

        let (labels, relationship_types) = tokio::try_join!(
            self.column("CALL db.labels() YIELD label RETURN label", "label"),
            self.column(
                "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType",
                "relationshipType",
            ),
        )?;

        let label_schemas = try_join_all(labels.iter().map(|l| self.load_label(l))).await?;
        let label_properties: BTreeMap<String, LabelSchema> =
            labels.iter().cloned().zip(label_schemas).collect();

        info!(
            labels = labels.len(),
            relationship_types = relationship_types.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Schema snapshot loaded"
        );

        Ok(Arc::new(SchemaSnapshot {
            labels,
            relationship_types,
            label_properties,
            loaded_at: Utc::now(),
        }))
    }

    /// Sorted, distinct, non-empty string values of one column.
    async fn column(&self, cypher: &str, column: &str) -> Result<Vec<String>, RagError> {
        let rows = self.reader.read(cypher, Row::new()).await?;
        Ok(rows
            .iter()
            .filter_map(|r| row_str(r, column))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    async fn load_label(&self, label: &str) -> Result<LabelSchema, RagError> {
        let mut params = Row::new();
        params.insert("max".into(), Value::from(self.max_nodes_per_label as u64));
        let props_cypher = format!(
            "MATCH (n:{}) WITH n LIMIT $max \
             UNWIND keys(n) AS k RETURN DISTINCT k AS prop ORDER BY prop",
            quote_identifier(label)
        );
        let rows = self.reader.read(&props_cypher, params).await?;
        let properties: Vec<String> = rows
            .iter()
            .filter_map(|r| row_str(r, "prop"))
            .map(str::to_string)
            .collect();

        let mut schema = LabelSchema::new(properties, Vec::new());
        if let Some(display) = schema.display_property.clone() {
            let samples_cypher = format!(
                "MATCH (n:{label}) WHERE n.{prop} IS NOT NULL \
                 RETURN DISTINCT toString(n.{prop}) AS v LIMIT {MAX_SAMPLE_VALUES}",
                label = quote_identifier(label),
                prop = quote_identifier(&display),
            );
            match self.reader.read(&samples_cypher, Row::new()).await {
                Ok(rows) => {
                    schema.sample_values = rows
                        .iter()
                        .filter_map(|r| row_str(r, "v"))
                        .map(str::to_string)
                        .take(MAX_SAMPLE_VALUES)
                        .collect();
                }
                Err(e) => warn!(label, error = %e, "Failed to sample display values"),
            }
        }
        Ok(schema)
    }
}

/// Backtick-quote a label, relationship type, or property name.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

// =============================================================================
// Prompt renderings
// =============================================================================

const SCHEMA_TEXT_MAX_LABELS: usize = 12;
const SCHEMA_TEXT_MAX_PROPERTIES: usize = 16;
const SCHEMA_TEXT_MAX_EXAMPLES: usize = 10;

/// Labels, relationship types, and per-label properties and examples as
/// plain text for the query generation prompt.
pub fn schema_text(snapshot: &SchemaSnapshot) -> String {
    let labels: Vec<&str> = snapshot
        .labels
        .iter()
        .take(SCHEMA_TEXT_MAX_LABELS)
        .map(String::as_str)
        .collect();

    let mut parts = vec![
        format!("Labels: {}", labels.join(", ")),
        format!("Relationships: {}", snapshot.relationship_types.join(", ")),
    ];
    for label in labels {
        let (props, samples) = match snapshot.label(label) {
            Some(meta) => (
                join_capped(&meta.properties, SCHEMA_TEXT_MAX_PROPERTIES),
                join_capped(&meta.sample_values, SCHEMA_TEXT_MAX_EXAMPLES),
            ),
            None => (String::new(), String::new()),
        };
        parts.push(format!("{label} props: {}", or_placeholder(props, "(none)")));
        parts.push(format!("{label} examples: {}", or_placeholder(samples, "(no examples)")));
    }
    parts.join("\n")
}

const VALUE_HINT_MAX_LABELS: usize = 10;
const VALUE_HINT_MAX_EXAMPLES: usize = 10;

/// Sample display values for up to ten labels that have any.
pub fn value_hints(snapshot: &SchemaSnapshot) -> String {
    let lines: Vec<String> = snapshot
        .label_properties
        .iter()
        .filter(|(_, meta)| !meta.sample_values.is_empty())
        .take(VALUE_HINT_MAX_LABELS)
        .map(|(label, meta)| {
            format!(
                "- {label} examples: {}",
                join_capped(&meta.sample_values, VALUE_HINT_MAX_EXAMPLES)
            )
        })
        .collect();

    if lines.is_empty() {
        "(no example values available)".to_string()
    } else {
        lines.join("\n")
    }
}

fn join_capped(items: &[String], cap: usize) -> String {
    items.iter().take(cap).cloned().collect::<Vec<_>>().join(", ")
}

fn or_placeholder(text: String, placeholder: &str) -> String {
    if text.is_empty() {
        placeholder.to_string()
    } else {
        text
    }
}
