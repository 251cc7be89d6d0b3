//! Vector index client
//!
//! HTTP client for a Qdrant-compatible vector store: overwrite-by-id
//! point upsert and nearest-neighbor search over named collections.

use crate::types::{ScoredPoint, VectorError, VectorIndex};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Vector index client configuration
#[derive(Debug, Clone)]
pub struct VectorClientConfig {
    /// Index base URL, e.g. "http://127.0.0.1:6333"
    pub url: String,
    pub timeout: Duration,
}

impl Default for VectorClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6333".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Qdrant-compatible vector index client
pub struct VectorIndexClient {
    http_client: reqwest::Client,
    config: VectorClientConfig,
}

// --- wire types -------------------------------------------------------------

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: Vec<UpsertPoint<'a>>,
}

#[derive(Serialize)]
struct UpsertPoint<'a> {
    id: &'a str,
    vector: &'a [f32],
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    score_threshold: f32,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: serde_json::Value,
}

impl VectorIndexClient {
    pub fn new(config: VectorClientConfig) -> Result<Self, VectorError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VectorError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Triage a non-success response into the error taxonomy
    async fn triage(
        response: reqwest::Response,
        collection: &str,
    ) -> Result<reqwest::Response, VectorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();

        if status.as_u16() == 404 {
            return Err(VectorError::CollectionNotFound(collection.to_string()));
        }
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(VectorError::Unavailable(format!(
                "{}: {}",
                status, error_text
            )));
        }
        Err(VectorError::Api(status.as_u16(), error_text))
    }
}

#[async_trait::async_trait]
impl VectorIndex for VectorIndexClient {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        payload: serde_json::Value,
    ) -> Result<(), VectorError> {
        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.config.url, collection
        );
        let request = UpsertRequest {
            points: vec![UpsertPoint {
                id,
                vector,
                payload,
            }],
        };

        let response = self
            .http_client
            .put(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VectorError::Unavailable(e.to_string()))?;

        Self::triage(response, collection).await?;

        tracing::debug!(collection = %collection, id = %id, "Vector upserted");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        let url = format!("{}/collections/{}/points/search", self.config.url, collection);
        let request = SearchRequest {
            vector,
            limit,
            score_threshold: min_similarity,
            with_payload: true,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VectorError::Unavailable(e.to_string()))?;

        let response = Self::triage(response, collection).await?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| VectorError::MalformedResponse(e.to_string()))?;

        // Point ids come back as either strings or integers
        let points = body
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: match hit.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                score: hit.score,
                payload: hit.payload,
            })
            .collect();

        Ok(points)
    }
}

// ============================================================================
// Tests
// ============================================================================
