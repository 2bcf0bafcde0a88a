use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use graphrag_api::{app, AppState};
use graphrag_common::{Config, GraphReader};
use graphrag_graph::{GraphClient, ModelGateway, PipelineSettings, Router, SchemaCache};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("graphrag=info".parse()?))
        .init();

    let config = Config::from_env()?;

    let client = GraphClient::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
        .await?
        .with_timeout(config.graph_timeout);
    info!(uri = %config.neo4j_uri, "Connected to graph");
    let reader: Arc<dyn GraphReader> = Arc::new(client);

    let models = Arc::new(ModelGateway::from_config(&config));
    info!(
        chat_model = models.chat_model(),
        embedding_model = models.embedding_model(),
        "Model gateway ready"
    );

    let schema = Arc::new(SchemaCache::new(
        reader.clone(),
        config.schema_max_nodes_per_label,
    ));
    let pipeline = Router::new(
        schema,
        reader,
        models.clone(),
        models,
        config.vector_index.clone(),
        PipelineSettings::from_config(&config),
    );

    if let Some(dimensions) = config.embedding_dimensions {
        pipeline.seeder().check_index_dimensions(dimensions).await?;
    }

    match pipeline.schema().snapshot().await {
        Ok(snapshot) => info!(
            labels = snapshot.labels.len(),
            relationship_types = snapshot.relationship_types.len(),
            "Schema loaded"
        ),
        Err(e) => warn!(error = %e, "Schema not loaded at startup, will retry on first request"),
    }

    let state = Arc::new(AppState { pipeline });
    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("GraphRAG API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
