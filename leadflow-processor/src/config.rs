//! Configuration resolution for the lead processor
//!
//! Every setting resolves with ENV → TOML → compiled-default priority.
//! Environment variables use the `LEADFLOW_` prefix; the TOML side is
//! defined in `leadflow_common::config`.

use crate::services::{AiClientConfig, EnrichmentConfig, VectorClientConfig};
use crate::workflow::{PipelineConfig, QueueConfig};
use leadflow_common::config::TomlConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const DEFAULT_BUS_URL: &str = "nats://127.0.0.1:4222";
const DEFAULT_DB_PATH: &str = "leadflow.db";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5740;
const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Fully-resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub bus_url: String,
    pub database_path: PathBuf,
    pub server_host: String,
    pub server_port: u16,
    /// Embedding dimension the vector collections are configured for
    pub embedding_dim: usize,
    pub knowledge_collection: String,
    pub ai: AiClientConfig,
    pub vector: VectorClientConfig,
    pub enrichment: EnrichmentConfig,
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
    pub routing_agents: Vec<String>,
}

impl Settings {
    /// Resolve settings from the environment and a loaded TOML config
    pub fn resolve(toml: &TomlConfig) -> Self {
        let ai_defaults = AiClientConfig::default();
        let api_key = resolve_string(
            "LEADFLOW_AI_API_KEY",
            toml.ai.api_key.as_deref(),
            &ai_defaults.api_key,
        );
        if api_key.trim().is_empty() {
            warn!("AI API key not configured; classification and embedding calls will fail");
        }

        let ai = AiClientConfig {
            base_url: resolve_string(
                "LEADFLOW_AI_BASE_URL",
                toml.ai.base_url.as_deref(),
                &ai_defaults.base_url,
            ),
            api_key,
            model: resolve_string(
                "LEADFLOW_AI_MODEL",
                toml.ai.model.as_deref(),
                &ai_defaults.model,
            ),
            embedding_model: resolve_string(
                "LEADFLOW_AI_EMBEDDING_MODEL",
                toml.ai.embedding_model.as_deref(),
                &ai_defaults.embedding_model,
            ),
            timeout: toml
                .ai
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(ai_defaults.timeout),
        };

        let vector_defaults = VectorClientConfig::default();
        let vector = VectorClientConfig {
            url: resolve_string(
                "LEADFLOW_VECTOR_URL",
                toml.vector.url.as_deref(),
                &vector_defaults.url,
            ),
            timeout: toml
                .vector
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(vector_defaults.timeout),
        };

        let enrichment = EnrichmentConfig {
            base_url: std::env::var("LEADFLOW_ENRICHMENT_URL")
                .ok()
                .or_else(|| toml.enrichment.base_url.clone()),
            api_key: std::env::var("LEADFLOW_ENRICHMENT_API_KEY")
                .ok()
                .or_else(|| toml.enrichment.api_key.clone()),
            timeout: toml.enrichment.timeout_secs.map(Duration::from_secs),
        };

        let queue_defaults = QueueConfig::default();
        let queue = QueueConfig {
            workers: resolve_parse("LEADFLOW_WORKERS", toml.queue.workers, queue_defaults.workers),
            max_attempts: resolve_parse(
                "LEADFLOW_MAX_ATTEMPTS",
                toml.queue.max_attempts,
                queue_defaults.max_attempts,
            ),
            backoff: toml
                .queue
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(queue_defaults.backoff),
            shutdown_grace: toml
                .queue
                .shutdown_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(queue_defaults.shutdown_grace),
        };

        let embedding_dim = resolve_parse(
            "LEADFLOW_EMBEDDING_DIM",
            toml.vector.embedding_dim,
            DEFAULT_EMBEDDING_DIM,
        );

        let pipeline_defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            lead_collection: resolve_string(
                "LEADFLOW_LEAD_COLLECTION",
                toml.vector.lead_collection.as_deref(),
                &pipeline_defaults.lead_collection,
            ),
            similar_limit: pipeline_defaults.similar_limit,
            min_similarity: pipeline_defaults.min_similarity,
            expected_dim: Some(embedding_dim),
        };

        let routing_agents = std::env::var("LEADFLOW_ROUTING_AGENTS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .or_else(|| toml.routing.agents.clone())
            .unwrap_or_default();
        if routing_agents.is_empty() {
            warn!("Agent roster is empty; all leads will be reported as unrouted");
        }

        Self {
            bus_url: resolve_string("LEADFLOW_BUS_URL", toml.bus.url.as_deref(), DEFAULT_BUS_URL),
            database_path: PathBuf::from(resolve_string(
                "LEADFLOW_DB_PATH",
                toml.database.path.as_deref().and_then(|p| p.to_str()),
                DEFAULT_DB_PATH,
            )),
            server_host: resolve_string(
                "LEADFLOW_HOST",
                toml.server.host.as_deref(),
                DEFAULT_HOST,
            ),
            server_port: resolve_parse("LEADFLOW_PORT", toml.server.port, DEFAULT_PORT),
            embedding_dim,
            knowledge_collection: resolve_string(
                "LEADFLOW_KNOWLEDGE_COLLECTION",
                toml.vector.knowledge_collection.as_deref(),
                "knowledge",
            ),
            ai,
            vector,
            enrichment,
            queue,
            pipeline,
            routing_agents,
        }
    }
}

/// Resolve a string setting: ENV → TOML → default
fn resolve_string(env_var: &str, toml_value: Option<&str>, default: &str) -> String {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    if let Some(value) = toml_value {
        if !value.trim().is_empty() {
            return value.to_string();
        }
    }
    default.to_string()
}

/// Resolve a parseable setting: ENV → TOML → default
fn resolve_parse<T: std::str::FromStr + Copy>(
    env_var: &str,
    toml_value: Option<T>,
    default: T,
) -> T {
    if let Ok(raw) = std::env::var(env_var) {
        match raw.parse() {
            Ok(value) => return value,
            Err(_) => warn!(var = %env_var, value = %raw, "Unparseable value, ignoring"),
        }
    }
    toml_value.unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================
