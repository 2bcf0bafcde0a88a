//! Per-request strategy selection and branch orchestration.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use ai_client::Message;
use graphrag_common::{
    AskRequest, AskResponse, Config, Evidence, FactSet, GeneratedQueryResult, GraphReader,
    QueryOutcome, RagError, RouteDecision, RouteParams, SeedNode, Strategy, TextEmbedder,
    TextGenerator, Triple, I_DONT_KNOW,
};

use crate::evidence::{preview_rows, row_identifiers, CitationWhitelist};
use crate::expander::{ExpansionFilters, GraphExpander, RelationshipFilter};
use crate::fusion::EvidenceFuser;
use crate::prompts::{router_few_shots, ROUTER_SYSTEM};
use crate::query_gen::QueryGenerator;
use crate::schema::SchemaCache;
use crate::seeder::SemanticSeeder;

const MAX_K: usize = 50;
const MAX_PER_SEED: usize = 100;
const MAX_RESULT_LIMIT: usize = 200;

static SEMANTIC_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(seed|seeds|candidates|top matches|similar only)\b").unwrap()
});

/// Defaults and policy knobs for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub defaults: RouteParams,
    /// Generated-query row count below which the fused answer is framed as
    /// tentative.
    pub fallback_min_rows: usize,
    pub auto_route: bool,
    pub relationship_filter: RelationshipFilter,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            defaults: RouteParams {
                k: 8,
                per_seed_limit: 20,
                result_limit: 25,
            },
            fallback_min_rows: 1,
            auto_route: false,
            relationship_filter: RelationshipFilter::All,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            defaults: RouteParams {
                k: config.default_k,
                per_seed_limit: config.default_per_seed,
                result_limit: config.default_result_limit,
            },
            fallback_min_rows: config.fallback_min_rows,
            auto_route: config.auto_route,
            relationship_filter: RelationshipFilter::All,
        }
    }
}

/// Caller-supplied adjustments to the routing decision.
#[derive(Debug, Clone, Default)]
pub struct RouteOverrides {
    pub strategy: Option<Strategy>,
    pub auto: Option<bool>,
    pub k: Option<usize>,
    pub per_seed: Option<usize>,
    pub result_limit: Option<usize>,
}

impl From<&AskRequest> for RouteOverrides {
    fn from(req: &AskRequest) -> Self {
        Self {
            strategy: req.strategy,
            auto: req.auto,
            k: req.k,
            per_seed: req.per_seed,
            result_limit: req.result_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouterReply {
    strategy: Option<String>,
    k: Option<usize>,
    per_seed: Option<usize>,
    #[serde(alias = "org_limit")]
    result_limit: Option<usize>,
}

/// Outcome of the expansion branch for one request.
enum Expansion {
    Skipped,
    Done(Vec<Triple>),
    Failed(RagError),
}

pub struct Router {
    schema: Arc<SchemaCache>,
    seeder: SemanticSeeder,
    expander: GraphExpander,
    query_gen: QueryGenerator,
    fuser: EvidenceFuser,
    generator: Arc<dyn TextGenerator>,
    settings: PipelineSettings,
}

impl Router {
    pub fn new(
        schema: Arc<SchemaCache>,
        reader: Arc<dyn GraphReader>,
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn TextGenerator>,
        vector_index: impl Into<String>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            seeder: SemanticSeeder::new(reader.clone(), embedder, vector_index),
            expander: GraphExpander::new(reader.clone()),
            query_gen: QueryGenerator::new(reader, generator.clone(), schema.clone()),
            fuser: EvidenceFuser::new(generator.clone()),
            schema,
            generator,
            settings,
        }
    }

    pub fn schema(&self) -> &SchemaCache {
        &self.schema
    }

    pub fn seeder(&self) -> &SemanticSeeder {
        &self.seeder
    }

    /// Pick the strategy and parameters for a question.
    ///
    /// An explicit strategy wins; otherwise `fused`, unless LLM routing is
    /// enabled for this request.
    pub async fn decide(&self, question: &str, overrides: &RouteOverrides) -> RouteDecision {
        let params = self.params(overrides.k, overrides.per_seed, overrides.result_limit);

        if let Some(strategy) = overrides.strategy {
            return RouteDecision {
                strategy,
                parameters: params,
            };
        }
        if overrides.auto.unwrap_or(self.settings.auto_route) {
            return self.llm_route(question, params).await;
        }
        RouteDecision {
            strategy: Strategy::Fused,
            parameters: params,
        }
    }

    /// Seed-style questions are forced to `semantic` whatever the model picks.
    async fn llm_route(&self, question: &str, params: RouteParams) -> RouteDecision {
        let mut decision = self.llm_decision(question, params).await;
        if SEMANTIC_ONLY_RE.is_match(question) {
            decision.strategy = Strategy::Semantic;
        }
        decision
    }

    async fn llm_decision(&self, question: &str, params: RouteParams) -> RouteDecision {
        let fallback = RouteDecision {
            strategy: Strategy::Fused,
            parameters: params,
        };

        let mut messages = router_few_shots();
        messages.push(Message::user(question));
        let text = match self.generator.complete_json(ROUTER_SYSTEM, &messages).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Routing call failed, using fused");
                return fallback;
            }
        };

        let Some(reply) = parse_router_reply(&text) else {
            warn!(reply = %text, "Unparseable routing reply, using fused");
            return fallback;
        };
        let strategy = reply
            .strategy
            .as_deref()
            .and_then(|s| s.parse::<Strategy>().ok())
            .unwrap_or(Strategy::Fused);
        RouteDecision {
            strategy,
            parameters: self.params(
                reply.k.or(Some(params.k)),
                reply.per_seed.or(Some(params.per_seed_limit)),
                reply.result_limit.or(Some(params.result_limit)),
            ),
        }
    }

    fn params(&self, k: Option<usize>, per_seed: Option<usize>, limit: Option<usize>) -> RouteParams {
        let d = self.settings.defaults;
        RouteParams {
            k: k.unwrap_or(d.k).clamp(1, MAX_K),
            per_seed_limit: per_seed.unwrap_or(d.per_seed_limit).clamp(1, MAX_PER_SEED),
            result_limit: limit.unwrap_or(d.result_limit).clamp(1, MAX_RESULT_LIMIT),
        }
    }

    /// Answer a question end to end.
    ///
    /// Branch failures degrade to "no evidence from that branch"; the call
    /// fails only when every branch that ran was unreachable.
    pub async fn ask(&self, request: &AskRequest) -> Result<AskResponse, RagError> {
        let request_id = Uuid::new_v4();
        let question = request.question.trim();
        let span = info_span!("ask", %request_id);

        async move {
            let decision = self.decide(question, &RouteOverrides::from(request)).await;
            info!(strategy = ?decision.strategy, k = decision.parameters.k, "Route decided");

            if decision.strategy == Strategy::Semantic {
                return self.ask_semantic(question, decision).await;
            }
            self.ask_fused(question, decision).await
        }
        .instrument(span)
        .await
    }

    async fn ask_semantic(
        &self,
        question: &str,
        decision: RouteDecision,
    ) -> Result<AskResponse, RagError> {
        let seeds = self.seeder.seeds(question, decision.parameters.k).await?;
        info!(seeds = seeds.len(), "Semantic seeds");

        let citations = seed_citations(&seeds);
        let answer = if citations.is_empty() {
            I_DONT_KNOW.to_string()
        } else {
            let listed: Vec<String> = citations.iter().map(|c| format!("[{c}]")).collect();
            format!("Closest matches: {}.", listed.join(", "))
        };

        Ok(AskResponse {
            answer,
            citations,
            evidence: Evidence {
                triples: Vec::new(),
                generated_query: None,
                context_rows_preview: preview_rows(&[]),
            },
            route_decision: Some(decision),
            seeds: Some(seeds),
        })
    }

    async fn ask_fused(
        &self,
        question: &str,
        decision: RouteDecision,
    ) -> Result<AskResponse, RagError> {
        let strategy = decision.strategy;
        let params = decision.parameters;

        let expansion = async {
            if !strategy.runs_expansion() {
                return Expansion::Skipped;
            }
            match self.expand(question, params).await {
                Ok(triples) => Expansion::Done(triples),
                Err(e) => {
                    warn!(error = %e, "Expansion branch failed");
                    Expansion::Failed(e)
                }
            }
        };
        let generated = async {
            if strategy.runs_generated_query() {
                self.query_gen.run(question).await
            } else {
                GeneratedQueryResult::skipped()
            }
        };
        let (expansion, generated) = tokio::join!(expansion, generated);

        if let Some(err) = all_branches_unavailable(&expansion, &generated) {
            warn!(error = %err, "Every branch unavailable");
            return Err(err);
        }

        let triples = match expansion {
            Expansion::Done(triples) => triples,
            Expansion::Skipped | Expansion::Failed(_) => Vec::new(),
        };
        let facts = FactSet::from_triples(triples);

        let mut row_ids = Vec::new();
        if !generated.context_rows.is_empty() {
            if let Ok(snapshot) = self.schema.snapshot().await {
                row_ids = row_identifiers(&generated.context_rows, &snapshot);
            }
        }
        let whitelist = CitationWhitelist::build(&facts, row_ids);
        let low_confidence = strategy.runs_generated_query()
            && generated.context_rows.len() < self.settings.fallback_min_rows;

        info!(
            triples = facts.len(),
            rows = generated.context_rows.len(),
            repaired = generated.repaired,
            citations = whitelist.as_slice().len(),
            low_confidence,
            "Evidence gathered"
        );

        let answer = self
            .fuser
            .fuse(question, &facts, &generated, &whitelist, low_confidence)
            .await;
        let citations = if answer.trim() == I_DONT_KNOW {
            Vec::new()
        } else {
            whitelist.into_vec()
        };

        Ok(AskResponse {
            answer,
            citations,
            evidence: Evidence {
                triples: facts.triples().to_vec(),
                generated_query: generated.reported_query(),
                context_rows_preview: preview_rows(&generated.context_rows),
            },
            route_decision: Some(decision),
            seeds: None,
        })
    }

    /// Seeds, then one-hop expansion under the snapshot's whitelists.
    async fn expand(&self, question: &str, params: RouteParams) -> Result<Vec<Triple>, RagError> {
        let (seeds, snapshot) =
            tokio::try_join!(self.seeder.seeds(question, params.k), self.schema.snapshot())?;
        let Some(filters) =
            ExpansionFilters::from_snapshot(&snapshot, &self.settings.relationship_filter)
        else {
            info!("No traversable relationship types");
            return Ok(Vec::new());
        };
        let ids: Vec<String> = seeds.into_iter().map(|s| s.id).collect();
        self.expander
            .expand(&ids, &filters, params.per_seed_limit, params.result_limit)
            .await
    }
}

fn all_branches_unavailable(
    expansion: &Expansion,
    generated: &GeneratedQueryResult,
) -> Option<RagError> {
    let expansion_err = match expansion {
        Expansion::Failed(e) if e.is_upstream_unavailable() => Some(e.clone()),
        Expansion::Skipped => None,
        _ => return None,
    };
    match (&generated.outcome, expansion_err) {
        (QueryOutcome::Unavailable(_), Some(e)) => Some(e),
        (QueryOutcome::Unavailable(reason), None) => {
            Some(RagError::UpstreamUnavailable(reason.clone()))
        }
        (QueryOutcome::Skipped, Some(e)) => Some(e),
        _ => None,
    }
}

fn seed_citations(seeds: &[SeedNode]) -> Vec<String> {
    let mut seen = HashSet::new();
    seeds
        .iter()
        .map(|s| s.display_id.clone())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn parse_router_reply(text: &str) -> Option<RouterReply> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
