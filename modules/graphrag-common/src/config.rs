use std::time::Duration;

use crate::error::RagError;

/// Application configuration loaded from environment variables.
/// Contains connection secrets plus the retrieval defaults applied when a
/// request leaves a parameter unset.
#[derive(Debug, Clone)]
pub struct Config {
    // Neo4j
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    // AI / LLM
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: Option<usize>,
    pub vector_index: String,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Timeouts
    pub graph_timeout: Duration,
    pub embed_timeout: Duration,
    pub generation_timeout: Duration,

    // Retrieval defaults
    pub schema_max_nodes_per_label: usize,
    pub default_k: usize,
    pub default_per_seed: usize,
    pub default_result_limit: usize,
    pub fallback_min_rows: usize,
    pub auto_route: bool,
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };
        let required = |keys: &[&str]| -> Result<String, RagError> {
            get(keys).ok_or_else(|| {
                RagError::Config(format!("{} environment variable is required", keys.join(" or ")))
            })
        };
        let number = |keys: &[&str], default: u64| -> Result<u64, RagError> {
            match get(keys) {
                Some(v) => v
                    .parse()
                    .map_err(|_| RagError::Config(format!("{} must be a number, got '{v}'", keys[0]))),
                None => Ok(default),
            }
        };

        let embedding_dimensions = match get(&["EMBEDDING_DIMENSIONS"]) {
            Some(_) => Some(number(&["EMBEDDING_DIMENSIONS"], 0)? as usize),
            None => None,
        };
        let api_port = number(&["API_PORT"], 8000)?;
        let api_port = u16::try_from(api_port)
            .map_err(|_| RagError::Config(format!("API_PORT out of range: {api_port}")))?;

        Ok(Self {
            neo4j_uri: required(&["NEO4J_URI", "NEO4J_URL"])?,
            neo4j_user: required(&["NEO4J_USER"])?,
            neo4j_password: required(&["NEO4J_PASSWORD", "NEO4J_PASS"])?,
            openai_api_key: required(&["OPENAI_API_KEY", "OPENAI_KEY"])?,
            openai_base_url: get(&["OPENAI_BASE_URL"]),
            chat_model: get(&["OPENAI_MODEL", "CHAT_MODEL"]).unwrap_or_else(|| "gpt-4.1".to_string()),
            embedding_model: get(&["EMB_MODEL", "EMBEDDING_MODEL"])
                .unwrap_or_else(|| "text-embedding-3-large".to_string()),
            embedding_dimensions,
            vector_index: get(&["VECTOR_INDEX"]).unwrap_or_else(|| "emb_card_idx".to_string()),
            api_host: get(&["API_HOST"]).unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port,
            graph_timeout: Duration::from_secs(number(&["GRAPH_TIMEOUT_SECS"], 15)?),
            embed_timeout: Duration::from_secs(number(&["EMBED_TIMEOUT_SECS"], 20)?),
            generation_timeout: Duration::from_secs(number(&["GENERATION_TIMEOUT_SECS"], 60)?),
            schema_max_nodes_per_label: number(&["SCHEMA_MAX_NODES_PER_LABEL"], 200)? as usize,
            default_k: number(&["DEFAULT_K"], 8)? as usize,
            default_per_seed: number(&["DEFAULT_PER_SEED"], 20)? as usize,
            default_result_limit: number(&["DEFAULT_RESULT_LIMIT"], 25)? as usize,
            fallback_min_rows: number(&["FALLBACK_MIN_ROWS"], 1)? as usize,
            auto_route: get(&["AUTO_ROUTE"])
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
        })
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  NEO4J_URI: {}", self.neo4j_uri);
        tracing::info!("  NEO4J_PASSWORD: {}", preview(&self.neo4j_password));
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  CHAT_MODEL: {}", self.chat_model);
        tracing::info!("  EMBEDDING_MODEL: {}", self.embedding_model);
        tracing::info!("  VECTOR_INDEX: {}", self.vector_index);
        tracing::info!("  AUTO_ROUTE: {}", self.auto_route);
    }
}
