use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use graphrag_common::{display_id, GraphReader, RagError, Row, SeedNode, TextEmbedder};

use crate::client::{row_f64, row_str, row_strings};

const SEED_QUERY: &str = "CALL db.index.vector.queryNodes($index, $k, $embedding) \
     YIELD node, score \
     RETURN elementId(node) AS id, labels(node) AS labels, \
            toString(node.NodeID) AS nodeId, toString(node.code) AS code, \
            toString(node.name) AS name, score \
     ORDER BY score DESC";

const INDEX_OPTIONS_QUERY: &str =
    "SHOW INDEXES YIELD name, type, options WHERE name = $index RETURN type, options";

/// Vector similarity search over a named index.
pub struct SemanticSeeder {
    reader: Arc<dyn GraphReader>,
    embedder: Arc<dyn TextEmbedder>,
    index: String,
}

impl SemanticSeeder {
    pub fn new(
        reader: Arc<dyn GraphReader>,
        embedder: Arc<dyn TextEmbedder>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            embedder,
            index: index.into(),
        }
    }

    /// Up to `k` nearest nodes, highest score first. No hits is not an error.
    pub async fn seeds(&self, question: &str, k: usize) -> Result<Vec<SeedNode>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(question).await?;

        let mut params = Row::new();
        params.insert("index".into(), Value::from(self.index.as_str()));
        params.insert("k".into(), Value::from(k as u64));
        params.insert(
            "embedding".into(),
            Value::Array(embedding.iter().map(|x| Value::from(*x as f64)).collect()),
        );

        let rows = self.reader.read(SEED_QUERY, params).await?;
        let mut seeds: Vec<SeedNode> = rows.iter().filter_map(row_to_seed).collect();
        seeds.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        seeds.truncate(k);

        debug!(index = %self.index, k, seeds = seeds.len(), "Semantic seeds");
        Ok(seeds)
    }

    /// Compare the vector index's configured dimensionality with `expected`.
    ///
    /// A missing index or unreadable options only warn; a mismatch is a
    /// configuration error.
    pub async fn check_index_dimensions(&self, expected: usize) -> Result<(), RagError> {
        let mut params = Row::new();
        params.insert("index".into(), Value::from(self.index.as_str()));
        let rows = self.reader.read(INDEX_OPTIONS_QUERY, params).await?;

        let Some(row) = rows.first() else {
            warn!(index = %self.index, "Vector index not found; semantic seeding will fail");
            return Ok(());
        };

        match index_dimensions(row) {
            Some(actual) if actual == expected => {
                info!(index = %self.index, dimensions = actual, "Vector index dimensions match");
                Ok(())
            }
            Some(actual) => Err(RagError::Config(format!(
                "vector index {} has {actual} dimensions, embedding model produces {expected}",
                self.index
            ))),
            None => {
                warn!(index = %self.index, "Could not read vector index dimensions");
                Ok(())
            }
        }
    }
}

fn row_to_seed(row: &Row) -> Option<SeedNode> {
    let id = row_str(row, "id")?.to_string();
    let labels = row_strings(row, "labels");
    let display_id = display_id(
        &labels,
        row_str(row, "nodeId"),
        row_str(row, "code"),
        row_str(row, "name"),
        &id,
    );
    Some(SeedNode {
        id,
        labels,
        display_id,
        score: row_f64(row, "score").unwrap_or(0.0),
    })
}

fn index_dimensions(row: &Row) -> Option<usize> {
    let dims = row
        .get("options")?
        .get("indexConfig")?
        .get("vector.dimensions")?;
    dims.as_u64()
        .or_else(|| dims.as_str().and_then(|s| s.parse().ok()))
        .map(|d| d as usize)
}
