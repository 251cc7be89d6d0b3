//! AI provider client
//!
//! Talks to an OpenAI-compatible HTTP API for the three operations the
//! pipeline needs: lead classification (chat completion constrained to
//! JSON output), embedding generation, and free-form completions for
//! insight summaries.

use crate::types::{AiError, AiService, Classification, InsuranceType, Lead};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// AI client configuration
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    /// API base URL, e.g. "https://api.openai.com/v1"
    pub base_url: String,
    pub api_key: String,
    /// Chat model for classification and summaries
    pub model: String,
    /// Embedding model
    pub embedding_model: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for AiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// OpenAI-compatible AI service client
pub struct AiServiceClient {
    http_client: reqwest::Client,
    config: AiClientConfig,
}

// --- wire types -------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Classification as the model emits it; `quality_score` arrives as a
/// float from some models and is clamped to the 0-100 integer contract.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassification {
    insurance_type: InsuranceType,
    quality_score: f64,
    intent: String,
    urgency: String,
}

impl AiServiceClient {
    pub fn new(config: AiClientConfig) -> Result<Self, AiError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    async fn chat(&self, system: &str, user: String) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::Api(status.as_u16(), error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AiError::MalformedResponse("no choices in response".to_string()))
    }
}

#[async_trait::async_trait]
impl AiService for AiServiceClient {
    async fn classify_lead(&self, lead: &Lead) -> Result<Classification, AiError> {
        let content = self
            .chat(CLASSIFY_SYSTEM_PROMPT, classification_prompt(lead))
            .await?;

        let classification = parse_classification(&content)?;

        tracing::debug!(
            lead_id = %lead.id,
            insurance_type = classification.insurance_type.as_str(),
            quality_score = classification.quality_score,
            "Lead classified"
        );

        Ok(classification)
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let url = format!("{}/embeddings", self.config.base_url);
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::Api(status.as_u16(), error_text));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AiError::MalformedResponse("no embedding in response".to_string()))
    }

    async fn complete_prompt(&self, prompt: &str) -> Result<String, AiError> {
        self.chat(
            "You are a helpful assistant for insurance lead analysis.",
            prompt.to_string(),
        )
        .await
    }
}

const CLASSIFY_SYSTEM_PROMPT: &str = "You classify insurance leads. Respond with a single JSON \
    object and nothing else: {\"insuranceType\": \"auto|home|life|health|commercial|other\", \
    \"qualityScore\": <integer 0-100>, \"intent\": \"<short label>\", \"urgency\": \"low|medium|high\"}";

/// Build the classification prompt from lead fields
fn classification_prompt(lead: &Lead) -> String {
    let mut parts = vec![format!("Email: {}", lead.email)];

    let name = lead.full_name();
    if !name.is_empty() {
        parts.push(format!("Name: {}", name));
    }
    parts.push(format!(
        "Requested insurance type: {}",
        lead.insurance_type.as_str()
    ));
    if let Some(source) = &lead.source {
        parts.push(format!("Source: {}", source));
    }
    if let Some(notes) = &lead.notes {
        parts.push(format!("Notes: {}", notes));
    }
    if let Some(city) = &lead.city {
        parts.push(format!("City: {}", city));
    }

    format!("Classify this insurance lead:\n{}", parts.join("\n"))
}

/// Parse the classifier's response content
///
/// Models occasionally wrap JSON in markdown fences; strip them before
/// parsing. Anything that still is not the expected JSON object is a
/// malformed response (fatal for the pipeline run).
fn parse_classification(content: &str) -> Result<Classification, AiError> {
    let stripped = strip_code_fences(content);

    let raw: RawClassification = serde_json::from_str(stripped)
        .map_err(|e| AiError::MalformedResponse(format!("classification JSON: {}", e)))?;

    Ok(Classification {
        insurance_type: raw.insurance_type,
        quality_score: raw.quality_score.clamp(0.0, 100.0).round() as u8,
        intent: raw.intent,
        urgency: raw.urgency,
    })
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

// ============================================================================
// Tests
// ============================================================================
