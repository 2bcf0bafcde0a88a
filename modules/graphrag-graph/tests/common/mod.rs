//! In-process stand-ins for the graph, embedding, and generation services.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use ai_client::Message;
use graphrag_common::{GraphReadError, GraphReader, RagError, Row, TextEmbedder, TextGenerator};
use graphrag_graph::prompts::{CYPHER_SYSTEM, FUSE_SYSTEM, QA_SYSTEM, ROUTER_SYSTEM};
use graphrag_graph::{PipelineSettings, Router, SchemaCache};

pub fn row(value: Value) -> Row {
    serde_json::from_value(value).expect("row must be a JSON object")
}

// =============================================================================
// Graph
// =============================================================================

#[derive(Default)]
pub struct Calls {
    pub labels: AtomicUsize,
    pub relationship_types: AtomicUsize,
    pub properties: AtomicUsize,
    pub seeds: AtomicUsize,
    pub expansions: AtomicUsize,
    pub generated: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        [
            &self.labels,
            &self.relationship_types,
            &self.properties,
            &self.seeds,
            &self.expansions,
            &self.generated,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

/// Dispatches on the query text the pipeline sends.
#[derive(Default)]
pub struct StubGraph {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub properties: HashMap<String, Vec<String>>,
    pub samples: HashMap<String, Vec<String>>,
    pub seed_rows: Vec<Row>,
    pub expansion_rows: Vec<Row>,
    pub index_rows: Vec<Row>,
    pub generated_results: Mutex<VecDeque<Result<Vec<Row>, GraphReadError>>>,
    pub executed_queries: Mutex<Vec<String>>,
    pub delay: Option<Duration>,
    pub unavailable: bool,
    pub calls: Calls,
}

impl StubGraph {
    pub fn with_schema(mut self, labels: &[&str], relationship_types: &[&str]) -> Self {
        self.labels = labels.iter().map(|s| s.to_string()).collect();
        self.relationship_types = relationship_types.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_properties(mut self, label: &str, props: &[&str], samples: &[&str]) -> Self {
        self.properties
            .insert(label.to_string(), props.iter().map(|s| s.to_string()).collect());
        self.samples
            .insert(label.to_string(), samples.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_seeds(mut self, rows: Vec<Row>) -> Self {
        self.seed_rows = rows;
        self
    }

    pub fn with_expansion(mut self, rows: Vec<Row>) -> Self {
        self.expansion_rows = rows;
        self
    }

    /// Results returned, in order, to queries the pipeline generated.
    pub fn with_generated(self, results: Vec<Result<Vec<Row>, GraphReadError>>) -> Self {
        *self.generated_results.lock().unwrap() = results.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed_queries.lock().unwrap().clone()
    }
}

fn backticked(cypher: &str) -> String {
    cypher
        .split('`')
        .nth(1)
        .map(str::to_string)
        .unwrap_or_default()
}

#[async_trait]
impl GraphReader for StubGraph {
    async fn read(&self, cypher: &str, _params: Row) -> Result<Vec<Row>, GraphReadError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(GraphReadError::Unavailable("connection refused".into()));
        }

        if cypher.contains("db.labels()") {
            self.calls.labels.fetch_add(1, Ordering::SeqCst);
            return Ok(self.labels.iter().map(|l| row(json!({ "label": l }))).collect());
        }
        if cypher.contains("db.relationshipTypes()") {
            self.calls.relationship_types.fetch_add(1, Ordering::SeqCst);
            return Ok(self
                .relationship_types
                .iter()
                .map(|r| row(json!({ "relationshipType": r })))
                .collect());
        }
        if cypher.contains("UNWIND keys(n)") {
            self.calls.properties.fetch_add(1, Ordering::SeqCst);
            let props = self.properties.get(&backticked(cypher)).cloned().unwrap_or_default();
            return Ok(props.iter().map(|p| row(json!({ "prop": p }))).collect());
        }
        if cypher.contains("IS NOT NULL") && cypher.contains("toString(n.") {
            let samples = self.samples.get(&backticked(cypher)).cloned().unwrap_or_default();
            return Ok(samples.iter().map(|v| row(json!({ "v": v }))).collect());
        }
        if cypher.contains("db.index.vector.queryNodes") {
            self.calls.seeds.fetch_add(1, Ordering::SeqCst);
            return Ok(self.seed_rows.clone());
        }
        if cypher.contains("apoc.path.expandConfig") {
            self.calls.expansions.fetch_add(1, Ordering::SeqCst);
            return Ok(self.expansion_rows.clone());
        }
        if cypher.contains("SHOW INDEXES") {
            return Ok(self.index_rows.clone());
        }

        self.calls.generated.fetch_add(1, Ordering::SeqCst);
        self.executed_queries.lock().unwrap().push(cypher.to_string());
        self.generated_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

// =============================================================================
// Embedder
// =============================================================================

#[derive(Default)]
pub struct StubEmbedder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl TextEmbedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::UpstreamUnavailable("embedding endpoint down".into()));
        }
        let mut v = vec![0.0f32; 8];
        for (i, b) in text.bytes().take(8).enumerate() {
            v[i] = b as f32 / 255.0;
        }
        Ok(v)
    }
}

// =============================================================================
// Generator
// =============================================================================

pub type Reply = Result<String, RagError>;

/// Replies scripted per prompt kind, recognised by the system prompt.
#[derive(Default)]
pub struct StubGenerator {
    pub cypher: Mutex<VecDeque<Reply>>,
    pub qa: Mutex<Option<Reply>>,
    pub fuse: Mutex<Option<Reply>>,
    pub route: Mutex<Option<Reply>>,
    pub cypher_calls: AtomicUsize,
    pub qa_calls: AtomicUsize,
    pub fuse_calls: AtomicUsize,
    pub route_calls: AtomicUsize,
    pub fuse_prompts: Mutex<Vec<String>>,
    pub cypher_conversations: Mutex<Vec<Vec<Message>>>,
}

impl StubGenerator {
    pub fn with_cypher(self, replies: Vec<Reply>) -> Self {
        *self.cypher.lock().unwrap() = replies.into();
        self
    }

    pub fn with_qa(self, reply: Reply) -> Self {
        *self.qa.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_fuse(self, reply: Reply) -> Self {
        *self.fuse.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_route(self, reply: Reply) -> Self {
        *self.route.lock().unwrap() = Some(reply);
        self
    }

    pub fn total_calls(&self) -> usize {
        [&self.cypher_calls, &self.qa_calls, &self.fuse_calls, &self.route_calls]
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }
}

fn fenced(query: &str) -> String {
    format!("```cypher\n{query}\n```")
}

/// A cypher reply wrapped the way a model returns it.
pub fn cypher_reply(query: &str) -> Reply {
    Ok(fenced(query))
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        _temperature: f32,
    ) -> Result<String, RagError> {
        let missing = || Err(RagError::UpstreamUnavailable("no scripted reply".into()));
        match system {
            s if s == CYPHER_SYSTEM => {
                self.cypher_calls.fetch_add(1, Ordering::SeqCst);
                self.cypher_conversations.lock().unwrap().push(messages.to_vec());
                self.cypher.lock().unwrap().pop_front().unwrap_or_else(missing)
            }
            s if s == QA_SYSTEM => {
                self.qa_calls.fetch_add(1, Ordering::SeqCst);
                self.qa.lock().unwrap().clone().unwrap_or_else(missing)
            }
            s if s == FUSE_SYSTEM => {
                self.fuse_calls.fetch_add(1, Ordering::SeqCst);
                if let Some(m) = messages.last() {
                    self.fuse_prompts.lock().unwrap().push(m.content.clone());
                }
                self.fuse.lock().unwrap().clone().unwrap_or_else(missing)
            }
            s if s == ROUTER_SYSTEM => {
                self.route_calls.fetch_add(1, Ordering::SeqCst);
                self.route.lock().unwrap().clone().unwrap_or_else(missing)
            }
            other => panic!("unexpected system prompt: {other}"),
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Orgs, states, and crops with two relationship types.
pub fn acme_graph() -> StubGraph {
    StubGraph::default()
        .with_schema(&["Crop", "Org", "State"], &["HANDLES_PRODUCT", "HAS_STATE"])
        .with_properties("Org", &["NodeID", "code", "name"], &["Org:Acme", "Org:Globex"])
        .with_properties("State", &["code", "name"], &["WA", "OR"])
        .with_properties("Crop", &["name"], &["Beans", "Lentils"])
}

pub fn acme_seed() -> Row {
    row(json!({
        "id": "4:db:1", "labels": ["Org"], "nodeId": "Org:Acme",
        "code": null, "name": "Acme", "score": 0.93
    }))
}

pub fn acme_expansion() -> Vec<Row> {
    vec![
        row(json!({
            "aId": "4:db:1", "aLabels": ["Org"], "aNodeId": "Org:Acme", "aCode": null, "aName": "Acme",
            "rel": "HAS_STATE",
            "bId": "4:db:2", "bLabels": ["State"], "bNodeId": null, "bCode": "WA", "bName": "Washington"
        })),
        row(json!({
            "aId": "4:db:1", "aLabels": ["Org"], "aNodeId": "Org:Acme", "aCode": null, "aName": "Acme",
            "rel": "HANDLES_PRODUCT",
            "bId": "4:db:3", "bLabels": ["Crop"], "bNodeId": null, "bCode": null, "bName": "Beans"
        })),
    ]
}

pub struct Harness {
    pub graph: Arc<StubGraph>,
    pub embedder: Arc<StubEmbedder>,
    pub generator: Arc<StubGenerator>,
    pub schema: Arc<SchemaCache>,
    pub router: Router,
}

pub fn harness(graph: StubGraph, generator: StubGenerator) -> Harness {
    harness_with(graph, StubEmbedder::default(), generator, PipelineSettings::default())
}

pub fn harness_with(
    graph: StubGraph,
    embedder: StubEmbedder,
    generator: StubGenerator,
    settings: PipelineSettings,
) -> Harness {
    let graph = Arc::new(graph);
    let embedder = Arc::new(embedder);
    let generator = Arc::new(generator);
    let schema = Arc::new(SchemaCache::new(graph.clone(), 200));
    let router = Router::new(
        schema.clone(),
        graph.clone(),
        embedder.clone(),
        generator.clone(),
        "emb_card_idx",
        settings,
    );
    Harness {
        graph,
        embedder,
        generator,
        schema,
        router,
    }
}
