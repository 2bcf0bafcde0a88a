use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    ConfigBuilder, Graph, Query, Txn,
};
use serde_json::Value;

use graphrag_common::{GraphReadError, GraphReader, Row};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Thin wrapper around neo4rs::Graph providing connection setup and the
/// [`GraphReader`] binding used by the pipeline.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
    timeout: Duration,
}

impl GraphClient {
    /// Connect to Neo4j with the given credentials.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(10)
            .build()?;
        let graph = Graph::connect(config).await?;
        Ok(Self {
            graph,
            timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Per-read timeout. A read that exceeds it fails with
    /// [`GraphReadError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Runs inside an explicit transaction that is always rolled back, so
    /// nothing a read executes is ever committed.
    async fn fetch(&self, cypher: &str, params: Row) -> Result<Vec<Row>, GraphReadError> {
        let mut q = query(cypher);
        for (key, value) in params {
            q = q.param(key.as_str(), json_to_bolt(value));
        }

        let mut txn = self.graph.start_txn().await.map_err(classify)?;
        let rows = collect_rows(&mut txn, q).await;
        let rolled_back = txn.rollback().await;
        let rows = rows?;
        rolled_back.map_err(classify)?;
        Ok(rows)
    }
}

async fn collect_rows(txn: &mut Txn, q: Query) -> Result<Vec<Row>, GraphReadError> {
    let mut rows = Vec::new();
    let mut stream = txn.execute(q).await.map_err(classify)?;
    while let Some(row) = stream.next(&mut *txn).await.map_err(classify)? {
        let fields: HashMap<String, BoltType> = row
            .to()
            .map_err(|e| GraphReadError::Query(format!("row decode: {e}")))?;
        rows.push(
            fields
                .into_iter()
                .map(|(k, v)| (k, bolt_to_json(v)))
                .collect(),
        );
    }
    Ok(rows)
}

/// Server-side errors (syntax, unknown function, constraint) are query
/// errors; everything else means the database could not be reached.
fn classify(e: neo4rs::Error) -> GraphReadError {
    match e {
        neo4rs::Error::Neo4j(e) => GraphReadError::Query(format!("{}: {}", e.code(), e.message())),
        other => GraphReadError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl GraphReader for GraphClient {
    async fn read(&self, cypher: &str, params: Row) -> Result<Vec<Row>, GraphReadError> {
        tokio::time::timeout(self.timeout, self.fetch(cypher, params))
            .await
            .map_err(|_| GraphReadError::Timeout(self.timeout))?
    }
}

// --- Bolt <-> JSON ---

pub(crate) fn json_to_bolt(value: Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(0.0))),
        },
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => {
            BoltType::List(BoltList::from(items.into_iter().map(json_to_bolt).collect::<Vec<_>>()))
        }
        Value::Object(map) => BoltType::Map(BoltMap::from_iter(
            map.into_iter()
                .map(|(k, v)| (BoltString::from(k.as_str()), json_to_bolt(v))),
        )),
    }
}

/// Nodes become their property map plus `_labels`; relationships their
/// property map plus `_type`. Temporal and spatial values are rendered as
/// text.
pub(crate) fn bolt_to_json(value: BoltType) -> Value {
    match value {
        BoltType::Null(_) => Value::Null,
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::from(i.value),
        BoltType::Float(f) => serde_json::Number::from_f64(f.value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        BoltType::String(s) => Value::String(s.value),
        BoltType::List(list) => Value::Array(list.value.into_iter().map(bolt_to_json).collect()),
        BoltType::Map(map) => Value::Object(map_to_json(map)),
        BoltType::Node(node) => {
            let mut props = map_to_json(node.properties);
            let labels = node.labels.value.into_iter().map(bolt_to_json).collect();
            props.insert("_labels".to_string(), Value::Array(labels));
            Value::Object(props)
        }
        BoltType::Relation(rel) => {
            let mut props = map_to_json(rel.properties);
            props.insert("_type".to_string(), Value::String(rel.typ.value));
            Value::Object(props)
        }
        other => Value::String(format!("{other:?}")),
    }
}

fn map_to_json(map: BoltMap) -> Row {
    map.value
        .into_iter()
        .map(|(k, v)| (k.value, bolt_to_json(v)))
        .collect()
}

// --- Row accessors ---

pub(crate) fn row_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

pub(crate) fn row_strings(row: &Row, key: &str) -> Vec<String> {
    row.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn row_f64(row: &Row, key: &str) -> Option<f64> {
    row.get(key).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_params_convert_to_bolt() {
        assert!(matches!(json_to_bolt(json!(3)), BoltType::Integer(i) if i.value == 3));
        assert!(matches!(json_to_bolt(json!(0.5)), BoltType::Float(f) if f.value == 0.5));
        assert!(matches!(json_to_bolt(json!(null)), BoltType::Null(_)));
        match json_to_bolt(json!(["a", "b"])) {
            BoltType::List(list) => assert_eq!(list.value.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn bolt_values_convert_to_json() {
        let list = BoltType::List(BoltList::from(vec![
            BoltType::String(BoltString::from("Org")),
            BoltType::Integer(BoltInteger::new(7)),
        ]));
        assert_eq!(bolt_to_json(list), json!(["Org", 7]));
    }

    #[test]
    fn row_accessors() {
        let row: Row = serde_json::from_value(json!({
            "id": "4:abc:1",
            "labels": ["Org", "Buyer"],
            "score": 0.91
        }))
        .unwrap();
        assert_eq!(row_str(&row, "id"), Some("4:abc:1"));
        assert_eq!(row_strings(&row, "labels"), vec!["Org", "Buyer"]);
        assert_eq!(row_f64(&row, "score"), Some(0.91));
        assert_eq!(row_str(&row, "missing"), None);
    }
}
