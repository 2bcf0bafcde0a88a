mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use serde_json::json;

use common::{
    acme_expansion, acme_graph, acme_seed, cypher_reply, harness, harness_with, row, Calls,
    StubEmbedder, StubGenerator, StubGraph,
};
use graphrag_common::{AskRequest, RagError, Strategy, I_DONT_KNOW};
use graphrag_graph::{PipelineSettings, RouteOverrides};

fn ask(question: &str) -> AskRequest {
    AskRequest {
        question: question.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn no_matches_anywhere_is_i_dont_know() {
    let h = harness(
        acme_graph(),
        StubGenerator::default().with_cypher(vec![cypher_reply(
            "MATCH (o:Org)-[:HAS_STATE]->(s:State) WHERE s.code = 'ZZ' RETURN o.NodeID LIMIT 5",
        )]),
    );

    let response = h.router.ask(&ask("orgs in Atlantis")).await.unwrap();

    assert_eq!(response.answer, I_DONT_KNOW);
    assert!(response.citations.is_empty());
    assert!(response.evidence.triples.is_empty());
    assert_eq!(response.evidence.context_rows_preview, "(none)");
    assert_eq!(h.generator.fuse_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn acme_scenario_cites_only_fact_identifiers() {
    let graph = acme_graph()
        .with_seeds(vec![acme_seed()])
        .with_expansion(acme_expansion());
    let generator = StubGenerator::default()
        .with_cypher(vec![Ok("I cannot write that query.".into())])
        .with_fuse(Ok(
            "Acme [Org:Acme] is in Washington [State:WA] and handles beans [Crop:Beans]; \
             Globex [Org:Globex] may too."
                .into(),
        ));
    let h = harness(graph, generator);

    let response = h
        .router
        .ask(&ask("orgs in Washington storing beans"))
        .await
        .unwrap();

    let cited: HashSet<&str> = response.citations.iter().map(String::as_str).collect();
    assert_eq!(cited, HashSet::from(["Org:Acme", "State:WA", "Crop:Beans"]));
    assert_eq!(response.citations, vec!["Crop:Beans", "Org:Acme", "State:WA"]);
    assert!(!response.answer.contains("Org:Globex"));
    assert_eq!(response.evidence.triples.len(), 2);
    assert_eq!(response.evidence.generated_query.as_deref(), Some("(blocked)"));
    assert_eq!(
        response.route_decision.map(|d| d.strategy),
        Some(Strategy::Fused)
    );
}

#[tokio::test]
async fn generated_rows_extend_the_whitelist() {
    let graph = acme_graph()
        .with_seeds(vec![acme_seed()])
        .with_expansion(acme_expansion())
        .with_generated(vec![Ok(vec![
            row(json!({"nodeId": "Org:Acme", "state": "State:WA"})),
            row(json!({"nodeId": "Org:Globex", "state": "Planet:Mars"})),
        ])]);
    let generator = StubGenerator::default()
        .with_cypher(vec![cypher_reply(
            "MATCH (o:Org)-[:HAS_STATE]->(s:State) RETURN o.NodeID AS nodeId, s.code AS state LIMIT 10",
        )])
        .with_qa(Ok("Acme and Globex [Org:Globex].".into()))
        .with_fuse(Ok("Acme [Org:Acme] and Globex [Org:Globex] [Planet:Mars].".into()));
    let h = harness(graph, generator);

    let response = h.router.ask(&ask("orgs in Washington")).await.unwrap();

    assert_eq!(
        response.citations,
        vec!["Crop:Beans", "Org:Acme", "State:WA", "Org:Globex"]
    );
    assert_eq!(response.answer, "Acme [Org:Acme] and Globex [Org:Globex].");
    assert!(response
        .evidence
        .context_rows_preview
        .starts_with("1. nodeId=Org:Acme; state=State:WA"));
}

#[tokio::test]
async fn branches_run_concurrently_and_both_feed_fusion() {
    let graph = acme_graph()
        .with_seeds(vec![acme_seed()])
        .with_expansion(acme_expansion())
        .with_generated(vec![Ok(vec![row(json!({"nodeId": "Org:Acme"}))])]);
    let generator = StubGenerator::default()
        .with_cypher(vec![cypher_reply("MATCH (o:Org) RETURN o.NodeID AS nodeId LIMIT 5")])
        .with_qa(Ok("Acme [Org:Acme].".into()))
        .with_fuse(Ok("Acme [Org:Acme].".into()));
    let h = harness(graph, generator);

    h.router.ask(&ask("tell me about Acme")).await.unwrap();

    assert_eq!(Calls::get(&h.graph.calls.seeds), 1);
    assert_eq!(Calls::get(&h.graph.calls.expansions), 1);
    assert_eq!(Calls::get(&h.graph.calls.generated), 1);
    // Both branches read the schema; only one introspection happened.
    assert_eq!(Calls::get(&h.graph.calls.labels), 1);

    let prompts = h.generator.fuse_prompts.lock().unwrap();
    assert!(prompts[0].contains("CYRESULT:\nAcme [Org:Acme]."));
    assert!(prompts[0].contains("- (Org:Acme) HAS_STATE (State:WA)"));
}

#[tokio::test]
async fn missing_generated_rows_still_fuses_with_low_confidence() {
    let graph = acme_graph()
        .with_seeds(vec![acme_seed()])
        .with_expansion(acme_expansion());
    let generator = StubGenerator::default()
        .with_cypher(vec![cypher_reply("MATCH (o:Org) RETURN o.NodeID LIMIT 5")])
        .with_fuse(Ok("Possibly Acme [Org:Acme].".into()));
    let h = harness(graph, generator);

    let response = h.router.ask(&ask("orgs storing beans")).await.unwrap();

    assert_eq!(response.answer, "Possibly Acme [Org:Acme].");
    let prompts = h.generator.fuse_prompts.lock().unwrap();
    assert!(prompts[0].contains("NOTE:"));
}

#[tokio::test]
async fn rows_are_fused_when_the_summary_knows_nothing() {
    let graph = acme_graph().with_generated(vec![Ok(vec![row(json!({"nodeId": "Org:Acme"}))])]);
    let generator = StubGenerator::default()
        .with_cypher(vec![cypher_reply("MATCH (o:Org) RETURN o.NodeID AS nodeId LIMIT 5")])
        .with_qa(Ok(I_DONT_KNOW.into()))
        .with_fuse(Ok("Acme [Org:Acme] handles beans.".into()));
    let h = harness(graph, generator);

    let response = h
        .router
        .ask(&AskRequest {
            strategy: Some(Strategy::GeneratedQuery),
            ..ask("which orgs handle beans?")
        })
        .await
        .unwrap();

    assert_eq!(response.answer, "Acme [Org:Acme] handles beans.");
    assert_eq!(response.citations, vec!["Org:Acme"]);
    assert_eq!(h.generator.fuse_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn total_graph_outage_is_upstream_unavailable() {
    let h = harness(StubGraph::default().unavailable(), StubGenerator::default());

    let err = h.router.ask(&ask("orgs in Washington")).await.unwrap_err();

    assert!(matches!(err, RagError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn embedding_outage_alone_degrades_to_generated_query() {
    let graph = acme_graph().with_generated(vec![Ok(vec![row(json!({"nodeId": "Org:Acme"}))])]);
    let generator = StubGenerator::default()
        .with_cypher(vec![cypher_reply("MATCH (o:Org) RETURN o.NodeID AS nodeId LIMIT 5")])
        .with_qa(Ok("Acme [Org:Acme].".into()))
        .with_fuse(Ok("Acme [Org:Acme].".into()));
    let embedder = StubEmbedder {
        fail: true,
        ..Default::default()
    };
    let h = harness_with(graph, embedder, generator, PipelineSettings::default());

    let response = h.router.ask(&ask("orgs")).await.unwrap();

    assert_eq!(response.answer, "Acme [Org:Acme].");
    assert_eq!(response.citations, vec!["Org:Acme"]);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn semantic_strategy_returns_seeds_without_fusion() {
    let graph = acme_graph().with_seeds(vec![acme_seed()]);
    let h = harness(graph, StubGenerator::default());

    let response = h
        .router
        .ask(&AskRequest {
            question: "seeds for beans".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.citations, vec!["Org:Acme"]);
    assert_eq!(response.answer, "Closest matches: [Org:Acme].");
    assert_eq!(response.seeds.as_ref().map(Vec::len), Some(1));
    assert_eq!(h.generator.total_calls(), 0);
    assert_eq!(Calls::get(&h.graph.calls.expansions), 0);
}

#[tokio::test]
async fn expansion_only_skips_query_generation() {
    let graph = acme_graph()
        .with_seeds(vec![acme_seed()])
        .with_expansion(acme_expansion());
    let generator = StubGenerator::default().with_fuse(Ok("Acme [Org:Acme].".into()));
    let h = harness(graph, generator);

    let response = h
        .router
        .ask(&AskRequest {
            question: "orgs in Washington".into(),
            strategy: Some(Strategy::Expansion),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.evidence.generated_query, None);
    assert_eq!(h.generator.cypher_calls.load(Ordering::SeqCst), 0);
    let prompts = h.generator.fuse_prompts.lock().unwrap();
    assert!(!prompts[0].contains("NOTE:"));
}

#[tokio::test]
async fn explicit_strategy_beats_auto_routing() {
    let h = harness(
        acme_graph(),
        StubGenerator::default().with_route(Ok(r#"{"strategy":"expansion"}"#.into())),
    );
    let overrides = RouteOverrides {
        strategy: Some(Strategy::GeneratedQuery),
        auto: Some(true),
        ..Default::default()
    };

    let decision = h.router.decide("orgs in Washington", &overrides).await;

    assert_eq!(decision.strategy, Strategy::GeneratedQuery);
    assert_eq!(h.generator.route_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auto_routing_uses_model_reply_and_clamps() {
    let h = harness(
        acme_graph(),
        StubGenerator::default().with_route(Ok(
            r#"{"strategy":"cypher","k":500,"per_seed":3,"result_limit":10}"#.into(),
        )),
    );
    let overrides = RouteOverrides {
        auto: Some(true),
        ..Default::default()
    };

    let decision = h.router.decide("orgs in Washington", &overrides).await;

    assert_eq!(decision.strategy, Strategy::GeneratedQuery);
    assert_eq!(decision.parameters.k, 50);
    assert_eq!(decision.parameters.per_seed_limit, 3);
    assert_eq!(decision.parameters.result_limit, 10);
}

#[tokio::test]
async fn failed_auto_routing_falls_back_to_fused_defaults() {
    let h = harness(
        acme_graph(),
        StubGenerator::default().with_route(Ok("not json".into())),
    );
    let overrides = RouteOverrides {
        auto: Some(true),
        k: Some(4),
        ..Default::default()
    };

    let decision = h.router.decide("orgs in Washington", &overrides).await;

    assert_eq!(decision.strategy, Strategy::Fused);
    assert_eq!(decision.parameters.k, 4);
    assert_eq!(decision.parameters.per_seed_limit, 20);
}

#[tokio::test]
async fn seed_wording_keeps_the_default_fused_route() {
    let h = harness(acme_graph(), StubGenerator::default());

    let decision = h
        .router
        .decide("which candidates handle beans in Washington?", &RouteOverrides::default())
        .await;

    assert_eq!(decision.strategy, Strategy::Fused);
    assert_eq!(h.generator.route_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auto_routing_forces_seed_questions_to_semantic() {
    let h = harness(
        acme_graph(),
        StubGenerator::default().with_route(Ok(r#"{"strategy":"generatedQuery","k":5}"#.into())),
    );
    let overrides = RouteOverrides {
        auto: Some(true),
        ..Default::default()
    };

    let decision = h
        .router
        .decide("top matches for grain blenders in Oregon", &overrides)
        .await;

    assert_eq!(decision.strategy, Strategy::Semantic);
    assert_eq!(decision.parameters.k, 5);
    assert_eq!(h.generator.route_calls.load(Ordering::SeqCst), 1);
}
