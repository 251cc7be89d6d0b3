//! Core types and trait definitions for the lead processor
//!
//! Defines the domain model flowing through the pipeline and the seam
//! traits for every external collaborator:
//! - `AiService`: classification, embeddings, completions
//! - `VectorIndex`: upsert-by-id and nearest-neighbor search
//! - `EnrichmentSource`: auxiliary company/person lookups
//! - `KnowledgeSearcher`: semantic knowledge-base lookup
//! - `LeadStore`: lead read-side and routing-decision records
//!
//! The concrete implementations live under `services/` and `db/`; tests
//! substitute fakes behind the same traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Domain Types
// ============================================================================

/// Insurance product line a lead is shopping for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsuranceType {
    Auto,
    Home,
    Life,
    Health,
    Commercial,
    /// Classifier returned something outside the known product lines
    #[default]
    #[serde(other)]
    Other,
}

impl InsuranceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsuranceType::Auto => "auto",
            InsuranceType::Home => "home",
            InsuranceType::Life => "life",
            InsuranceType::Health => "health",
            InsuranceType::Commercial => "commercial",
            InsuranceType::Other => "other",
        }
    }

    pub fn from_str_or_other(s: &str) -> Self {
        match s {
            "auto" => InsuranceType::Auto,
            "home" => InsuranceType::Home,
            "life" => InsuranceType::Life,
            "health" => InsuranceType::Health,
            "commercial" => InsuranceType::Commercial,
            _ => InsuranceType::Other,
        }
    }
}

/// Lead lifecycle status, owned by the CRUD layer
///
/// Unknown status strings from older producers decode as `New` rather
/// than failing the whole lead payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Contacted,
    Qualified,
    Unqualified,
    Converted,
    Lost,
    #[default]
    #[serde(other)]
    New,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Unqualified => "unqualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "new" => LeadStatus::New,
            "contacted" => LeadStatus::Contacted,
            "qualified" => LeadStatus::Qualified,
            "unqualified" => LeadStatus::Unqualified,
            "converted" => LeadStatus::Converted,
            "lost" => LeadStatus::Lost,
            _ => LeadStatus::New,
        }
    }
}

/// The lead record being processed
///
/// Owned by the CRUD layer; the pipeline treats it as read-mostly input
/// and produces a derived [`EnrichedLead`]. Most fields default so the
/// minimal inbound payloads (id + email) decode cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub insurance_type: InsuranceType,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
}

impl Lead {
    /// Full display name, empty when both parts are missing
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Output of the AI classifier for one lead
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub insurance_type: InsuranceType,
    /// Integer quality score, 0-100
    pub quality_score: u8,
    /// Free-form intent label from the classifier (e.g. "quote")
    pub intent: String,
    /// Free-form urgency label (e.g. "medium")
    pub urgency: String,
}

/// Auxiliary company data merged in from external lookups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Auxiliary person data merged in from external lookups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInfo {
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub seniority: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Enrichment result; absence of data is not an error
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    #[serde(default)]
    pub company: Option<CompanyInfo>,
    #[serde(default)]
    pub person: Option<PersonInfo>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.company.is_none() && self.person.is_none()
    }
}

/// A retrieved knowledge-base entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Similarity of this entry to the query (0.0-1.0)
    pub relevance: f32,
}

/// Knowledge lookup result: retrieved entries plus a generated summary
///
/// An empty result is a valid, non-error outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeInsight {
    #[serde(default)]
    pub relevant_knowledge: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub insights: String,
}

/// Terminal status of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Qualified,
    Failed,
}

/// The derived, enriched copy of a lead emitted by a successful pipeline run
///
/// Immutable after creation; reprocessing the same lead supersedes (never
/// mutates) an earlier emission. A `qualified` lead always carries an
/// embedding; enrichment and knowledge may be empty but are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedLead {
    #[serde(flatten)]
    pub lead: Lead,
    pub classification: Classification,
    pub enrichment: Enrichment,
    pub knowledge_insights: KnowledgeInsight,
    pub embedding: Vec<f32>,
    pub processing_status: ProcessingStatus,
    pub processed_at: DateTime<Utc>,
}

/// A ranked neighbor from the vector index, excluding the query lead
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarLeadResult {
    pub id: String,
    /// Cosine similarity to the query lead (0.0-1.0)
    pub similarity: f32,
    pub insurance_type: InsuranceType,
    pub quality_score: u8,
    pub status: LeadStatus,
}

/// Outcome of one routing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingOutcome {
    /// An agent was assigned
    Assigned,
    /// No eligible agent was available
    Unrouted,
    /// Lead was not in a routable state
    Skipped,
}

impl RoutingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingOutcome::Assigned => "assigned",
            RoutingOutcome::Unrouted => "unrouted",
            RoutingOutcome::Skipped => "skipped",
        }
    }

    pub fn from_str_or_skipped(s: &str) -> Self {
        match s {
            "assigned" => RoutingOutcome::Assigned,
            "unrouted" => RoutingOutcome::Unrouted,
            _ => RoutingOutcome::Skipped,
        }
    }
}

/// A recorded routing decision; published, never mutated
///
/// A newer decision for the same lead supersedes the older one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub lead_id: String,
    pub agent_id: Option<String>,
    pub outcome: RoutingOutcome,
    pub decided_at: DateTime<Utc>,
}

// ============================================================================
// AI Service Seam
// ============================================================================

/// AI provider errors
#[derive(Debug, Error)]
pub enum AiError {
    /// Network-level failure (includes timeouts)
    #[error("Network error: {0}")]
    Network(String),

    /// Provider returned a non-success status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Provider responded but the body was not usable (non-JSON
    /// classification, missing embedding, empty choices)
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// External AI provider seam: classification, embeddings, completions
///
/// Classification and embedding failures are fatal for a pipeline run;
/// completion failures are best-effort (callers degrade to no insight
/// text).
#[async_trait::async_trait]
pub trait AiService: Send + Sync {
    /// Classify a lead; fatal for the run on failure
    async fn classify_lead(&self, lead: &Lead) -> Result<Classification, AiError>;

    /// Generate a fixed-dimension embedding for a text; fatal on failure
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, AiError>;

    /// Complete a free-form prompt; best-effort
    async fn complete_prompt(&self, prompt: &str) -> Result<String, AiError>;
}

// ============================================================================
// Vector Index Seam
// ============================================================================

/// Vector index errors
#[derive(Debug, Error)]
pub enum VectorError {
    /// The collection does not exist yet; the pipeline treats this as
    /// "no results", not an error
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Transient index failure; surfaced and logged, not retried inline
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// A scored point returned by a vector search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    /// Similarity score (0.0-1.0), descending in result order
    pub score: f32,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// External vector index seam: upsert-by-id and nearest-neighbor search
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Overwrite-by-id upsert; idempotent per id
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        payload: serde_json::Value,
    ) -> Result<(), VectorError>;

    /// Nearest-neighbor search, descending similarity, stable ties.
    /// Does NOT exclude the querying id; that is the caller's job.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredPoint>, VectorError>;
}

// ============================================================================
// Enrichment Seam
// ============================================================================

/// Enrichment provider errors; "no data found" is NOT an error
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),
}

/// External enrichment seam
///
/// Returns an empty [`Enrichment`] for the normal "no data found" case;
/// only provider outages propagate as errors, and even those are
/// non-fatal to the pipeline.
#[async_trait::async_trait]
pub trait EnrichmentSource: Send + Sync {
    async fn resolve(&self, lead: &Lead) -> Result<Enrichment, EnrichmentError>;
}

// ============================================================================
// Knowledge Base Seam
// ============================================================================

/// Knowledge searcher errors
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] AiError),

    #[error("Knowledge search failed: {0}")]
    Search(#[from] VectorError),
}

/// Knowledge-base lookup seam
///
/// Empty results are a valid, non-error outcome; a failed summary
/// generation degrades to an empty insights string, not an error.
#[async_trait::async_trait]
pub trait KnowledgeSearcher: Send + Sync {
    async fn search(
        &self,
        lead: &Lead,
        classification: &Classification,
    ) -> Result<KnowledgeInsight, KnowledgeError>;
}

// ============================================================================
// Lead Store Seam
// ============================================================================

/// Lead read-side and routing-decision records
///
/// The CRUD layer owns lead persistence; this seam covers only what the
/// processor needs: reading current lead state, registering leads first
/// seen on the bus, and recording routing decisions (latest wins).
#[async_trait::async_trait]
pub trait LeadStore: Send + Sync {
    async fn get_lead(&self, lead_id: &str) -> leadflow_common::Result<Option<Lead>>;

    /// Insert a lead first seen on the bus; no-op if it already exists
    async fn insert_lead_if_absent(&self, lead: &Lead) -> leadflow_common::Result<()>;

    /// Record a routing decision; a newer decision supersedes older ones
    async fn record_decision(&self, decision: &RoutingDecision) -> leadflow_common::Result<()>;

    /// Latest recorded decision for a lead, if any
    async fn latest_decision(
        &self,
        lead_id: &str,
    ) -> leadflow_common::Result<Option<RoutingDecision>>;
}

// ============================================================================
// Tests
// ============================================================================
