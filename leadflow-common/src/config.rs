//! Configuration loading for leadflow services
//!
//! Services resolve each setting with ENV → TOML → compiled-default
//! priority; this module owns the TOML side: the file schema, discovery
//! of the config file path, and loading.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level TOML configuration file schema
///
/// Every section and field is optional; services fall back to environment
/// variables and compiled defaults for anything left unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub bus: BusSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub vector: VectorSection,
    #[serde(default)]
    pub enrichment: EnrichmentSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// Message bus (NATS) settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusSection {
    /// Broker URL, e.g. "nats://127.0.0.1:4222"
    pub url: Option<String>,
    /// Subject for published routing outcomes
    pub routed_subject: Option<String>,
}

/// SQLite database settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Path to the SQLite database file
    pub path: Option<PathBuf>,
}

/// AI provider settings (OpenAI-compatible API)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Chat model used for classification and insight summaries
    pub model: Option<String>,
    /// Embedding model
    pub embedding_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Vector index settings (Qdrant-compatible HTTP API)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorSection {
    pub url: Option<String>,
    /// Collection holding lead embeddings
    pub lead_collection: Option<String>,
    /// Collection holding the knowledge corpus
    pub knowledge_collection: Option<String>,
    /// Embedding dimension; must match the provider's embedding model
    pub embedding_dim: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Enrichment provider settings; leaving `base_url` unset disables
/// enrichment lookups entirely (the resolver returns empty results).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Processing queue settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSection {
    /// Number of concurrent pipeline workers
    pub workers: Option<usize>,
    /// Attempts before a job is dead-lettered
    pub max_attempts: Option<u32>,
    /// Base retry backoff in milliseconds (doubles per attempt)
    pub backoff_ms: Option<u64>,
    /// Grace period for draining in-flight jobs on shutdown
    pub shutdown_grace_secs: Option<u64>,
}

/// Routing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingSection {
    /// Agent roster for assignment
    pub agents: Option<Vec<String>>,
}

/// HTTP server settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Resolve the config file path
///
/// Priority:
/// 1. Explicit path argument
/// 2. `LEADFLOW_CONFIG` environment variable
/// 3. `~/.config/leadflow/leadflow.toml` (platform config dir)
pub fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("LEADFLOW_CONFIG") {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|d| d.join("leadflow").join("leadflow.toml"))
}

/// Load TOML configuration
///
/// A missing file is not an error: services can run entirely from
/// environment variables and defaults. A file that exists but fails to
/// parse IS an error, so misconfiguration is caught at startup rather
/// than silently ignored.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = config_file_path(explicit) else {
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

// ============================================================================
// Tests
// ============================================================================
