//! Processing pipeline
//!
//! Drives one lead through the enrichment/classification/embedding
//! stages, strictly sequentially (parallelism lives across leads, in the
//! queue workers):
//!
//! 1. Classify (fatal on failure)
//! 2. Enrich (non-fatal; empty enrichment on failure)
//! 3. Knowledge lookup (non-fatal; empty insight on failure)
//! 4. Embed (fatal on failure)
//! 5. Vector upsert (non-fatal; similarity search is secondary)
//! 6. Emit the enriched lead
//!
//! A fatal stage aborts the run with no partial emission; the error
//! surfaces to the queue's retry policy.

use crate::types::{
    AiError, AiService, EnrichedLead, Enrichment, EnrichmentSource, InsuranceType,
    KnowledgeInsight, KnowledgeSearcher, Lead, LeadStatus, ProcessingStatus, SimilarLeadResult,
    VectorIndex,
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_SIMILAR_LIMIT: usize = 5;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Vector collection holding lead embeddings
    pub lead_collection: String,
    /// Default neighbor count for similarity lookups
    pub similar_limit: usize,
    /// Default similarity floor for similarity lookups
    pub min_similarity: f32,
    /// Dimension the vector collection is configured for; when set, a
    /// provider embedding of any other length is a fatal mismatch
    pub expected_dim: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lead_collection: "leads".to_string(),
            similar_limit: DEFAULT_SIMILAR_LIMIT,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            expected_dim: None,
        }
    }
}

/// Fatal pipeline failures; non-fatal stages degrade in place and never
/// surface here
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    Classification(#[source] AiError),

    #[error("Embedding failed: {0}")]
    Embedding(#[source] AiError),
}

/// Pipeline orchestrator for one-lead processing runs
pub struct ProcessingPipeline {
    ai: Arc<dyn AiService>,
    index: Arc<dyn VectorIndex>,
    enrichment: Arc<dyn EnrichmentSource>,
    knowledge: Arc<dyn KnowledgeSearcher>,
    config: PipelineConfig,
}

impl ProcessingPipeline {
    pub fn new(
        ai: Arc<dyn AiService>,
        index: Arc<dyn VectorIndex>,
        enrichment: Arc<dyn EnrichmentSource>,
        knowledge: Arc<dyn KnowledgeSearcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ai,
            index,
            enrichment,
            knowledge,
            config,
        }
    }

    /// Process one lead through all stages
    pub async fn process(&self, lead: &Lead) -> Result<EnrichedLead, PipelineError> {
        debug!(lead_id = %lead.id, "Pipeline started");

        // Stage 1: Classify (fatal)
        let classification = self
            .ai
            .classify_lead(lead)
            .await
            .map_err(PipelineError::Classification)?;

        // Stage 2: Enrich (non-fatal)
        let enrichment = match self.enrichment.resolve(lead).await {
            Ok(enrichment) => enrichment,
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "Enrichment failed, continuing without");
                Enrichment::default()
            }
        };

        // Stage 3: Knowledge lookup (non-fatal)
        let knowledge_insights = match self.knowledge.search(lead, &classification).await {
            Ok(insight) => insight,
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "Knowledge lookup failed, continuing without");
                KnowledgeInsight::default()
            }
        };

        // Stage 4: Embed (fatal). The projection is canonical: identical
        // lead + enrichment input always yields identical text, which a
        // fixed embedding model maps to the same vector.
        let text = projection_text(lead, &enrichment);
        let embedding = self
            .ai
            .generate_embedding(&text)
            .await
            .map_err(PipelineError::Embedding)?;

        if let Some(expected) = self.config.expected_dim {
            if embedding.len() != expected {
                return Err(PipelineError::Embedding(AiError::MalformedResponse(
                    format!(
                        "embedding dimension {} does not match configured {}",
                        embedding.len(),
                        expected
                    ),
                )));
            }
        }

        // Stage 5: Vector upsert (non-fatal; overwrite-by-id keeps
        // reprocessing idempotent)
        let payload = serde_json::json!({
            "insuranceType": classification.insurance_type.as_str(),
            "qualityScore": classification.quality_score,
            "status": lead.status.as_str(),
        });
        if let Err(e) = self
            .index
            .upsert(&self.config.lead_collection, &lead.id, &embedding, payload)
            .await
        {
            warn!(lead_id = %lead.id, error = %e, "Vector upsert failed, lead still processed");
        }

        info!(
            lead_id = %lead.id,
            quality_score = classification.quality_score,
            enriched = !enrichment.is_empty(),
            knowledge_entries = knowledge_insights.relevant_knowledge.len(),
            "Pipeline completed"
        );

        Ok(EnrichedLead {
            lead: lead.clone(),
            classification,
            enrichment,
            knowledge_insights,
            embedding,
            processing_status: ProcessingStatus::Qualified,
            processed_at: Utc::now(),
        })
    }

    /// Find leads similar to the given embedding
    ///
    /// Always best-effort: filters the query lead out of its own results
    /// and returns an empty list (never an error) when the collection is
    /// missing or the lookup fails.
    pub async fn find_similar_leads(
        &self,
        embedding: &[f32],
        lead_id: &str,
    ) -> Vec<SimilarLeadResult> {
        let limit = self.config.similar_limit;

        // Ask for one extra so self-exclusion still fills the limit
        let hits = match self
            .index
            .search(
                &self.config.lead_collection,
                embedding,
                limit + 1,
                self.config.min_similarity,
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                debug!(lead_id = %lead_id, error = %e, "Similarity lookup unavailable");
                return Vec::new();
            }
        };

        hits.into_iter()
            .filter(|hit| hit.id != lead_id)
            .take(limit)
            .map(|hit| {
                let payload = &hit.payload;
                SimilarLeadResult {
                    id: hit.id.clone(),
                    similarity: hit.score,
                    insurance_type: payload
                        .get("insuranceType")
                        .and_then(|v| v.as_str())
                        .map(InsuranceType::from_str_or_other)
                        .unwrap_or_default(),
                    quality_score: payload
                        .get("qualityScore")
                        .and_then(|v| v.as_u64())
                        .map(|v| v.min(100) as u8)
                        .unwrap_or(0),
                    status: payload
                        .get("status")
                        .and_then(|v| v.as_str())
                        .map(LeadStatus::from_str_or_default)
                        .unwrap_or_default(),
                }
            })
            .collect()
    }
}

/// Canonical textual projection of a lead + enrichment
///
/// Fixed field order, `|`-joined, empty and "none" values omitted, so
/// identical input always produces identical text.
pub fn projection_text(lead: &Lead, enrichment: &Enrichment) -> String {
    let mut parts: Vec<String> = Vec::new();

    push_field(&mut parts, "type", lead.insurance_type.as_str());
    push_field(&mut parts, "name", &lead.full_name());
    push_field(&mut parts, "email", &lead.email);
    push_field(&mut parts, "phone", lead.phone.as_deref().unwrap_or(""));
    push_field(&mut parts, "city", lead.city.as_deref().unwrap_or(""));
    push_field(&mut parts, "state", lead.state.as_deref().unwrap_or(""));
    push_field(&mut parts, "source", lead.source.as_deref().unwrap_or(""));
    push_field(&mut parts, "notes", lead.notes.as_deref().unwrap_or(""));

    if let Some(company) = &enrichment.company {
        push_field(&mut parts, "company", &company.name);
        push_field(
            &mut parts,
            "industry",
            company.industry.as_deref().unwrap_or(""),
        );
        push_field(&mut parts, "size", company.size.as_deref().unwrap_or(""));
    }
    if let Some(person) = &enrichment.person {
        push_field(
            &mut parts,
            "title",
            person.job_title.as_deref().unwrap_or(""),
        );
        push_field(
            &mut parts,
            "seniority",
            person.seniority.as_deref().unwrap_or(""),
        );
    }

    parts.join("|")
}

fn push_field(parts: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return;
    }
    parts.push(format!("{}:{}", label, value));
}

// ============================================================================
// Tests
// ============================================================================
