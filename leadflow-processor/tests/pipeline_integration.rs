//! Integration tests for the processing pipeline
//!
//! Exercises the pipeline end-to-end over fake collaborators: a scripted
//! AI service, an in-memory cosine vector index, and controllable
//! enrichment/knowledge sources.

use std::collections::HashMap;
use std::sync::Arc;

use leadflow_processor::types::{
    AiError, AiService, Classification, CompanyInfo, Enrichment, EnrichmentError,
    EnrichmentSource, InsuranceType, KnowledgeEntry, KnowledgeError, KnowledgeInsight,
    KnowledgeSearcher, Lead, ProcessingStatus, ScoredPoint, VectorError, VectorIndex,
};
use leadflow_processor::workflow::{PipelineConfig, PipelineError, ProcessingPipeline};
use tokio::sync::Mutex;

// ============================================================================
// Fakes
// ============================================================================

/// Scripted AI service
///
/// Embeddings are derived deterministically from the input text, so
/// identical projection text always yields an identical vector.
struct StubAi {
    classification: Option<Classification>,
    embedding_dim: usize,
    fail_embedding: bool,
}

impl StubAi {
    fn working(dim: usize) -> Self {
        Self {
            classification: Some(Classification {
                insurance_type: InsuranceType::Auto,
                quality_score: 72,
                intent: "quote".to_string(),
                urgency: "medium".to_string(),
            }),
            embedding_dim: dim,
            fail_embedding: false,
        }
    }
}

fn deterministic_embedding(text: &str, dim: usize) -> Vec<f32> {
    let seed: u32 = text.bytes().fold(7_u32, |acc, b| {
        acc.wrapping_mul(31).wrapping_add(b as u32)
    });
    (0..dim)
        .map(|i| ((seed.wrapping_add(i as u32) % 1000) as f32) / 1000.0 + 0.001)
        .collect()
}

#[async_trait::async_trait]
impl AiService for StubAi {
    async fn classify_lead(&self, _lead: &Lead) -> Result<Classification, AiError> {
        self.classification
            .clone()
            .ok_or_else(|| AiError::MalformedResponse("classifier returned prose".to_string()))
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, AiError> {
        if self.fail_embedding {
            return Err(AiError::Network("embedding provider down".to_string()));
        }
        Ok(deterministic_embedding(text, self.embedding_dim))
    }

    async fn complete_prompt(&self, _prompt: &str) -> Result<String, AiError> {
        Ok("summary".to_string())
    }
}

/// In-memory vector index with real cosine search
///
/// Collections are created on first upsert; searching a collection that
/// was never written fails with `CollectionNotFound`, matching the real
/// index's behavior before any lead has been processed. Points keep
/// insertion order, which makes equal-score ties stable.
#[derive(Default)]
struct MemoryIndex {
    collections: Mutex<HashMap<String, Vec<(String, Vec<f32>, serde_json::Value)>>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        payload: serde_json::Value,
    ) -> Result<(), VectorError> {
        let mut collections = self.collections.lock().await;
        let points = collections.entry(collection.to_string()).or_default();

        match points.iter_mut().find(|(pid, _, _)| pid == id) {
            Some(point) => {
                point.1 = vector.to_vec();
                point.2 = payload;
            }
            None => points.push((id.to_string(), vector.to_vec(), payload)),
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        let collections = self.collections.lock().await;
        let points = collections
            .get(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;

        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .map(|(id, v, payload)| ScoredPoint {
                id: id.clone(),
                score: cosine(vector, v),
                payload: payload.clone(),
            })
            .filter(|hit| hit.score >= min_similarity)
            .collect();

        // Stable sort keeps insertion order for equal scores
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(limit);
        Ok(hits)
    }
}

struct FailingEnrichment;

#[async_trait::async_trait]
impl EnrichmentSource for FailingEnrichment {
    async fn resolve(&self, _lead: &Lead) -> Result<Enrichment, EnrichmentError> {
        Err(EnrichmentError::Network("provider unreachable".to_string()))
    }
}

struct StaticEnrichment(Enrichment);

#[async_trait::async_trait]
impl EnrichmentSource for StaticEnrichment {
    async fn resolve(&self, _lead: &Lead) -> Result<Enrichment, EnrichmentError> {
        Ok(self.0.clone())
    }
}

struct FailingKnowledge;

#[async_trait::async_trait]
impl KnowledgeSearcher for FailingKnowledge {
    async fn search(
        &self,
        _lead: &Lead,
        _classification: &Classification,
    ) -> Result<KnowledgeInsight, KnowledgeError> {
        Err(KnowledgeError::Search(VectorError::Unavailable(
            "index down".to_string(),
        )))
    }
}

struct StaticKnowledge(Vec<KnowledgeEntry>);

#[async_trait::async_trait]
impl KnowledgeSearcher for StaticKnowledge {
    async fn search(
        &self,
        _lead: &Lead,
        _classification: &Classification,
    ) -> Result<KnowledgeInsight, KnowledgeError> {
        Ok(KnowledgeInsight {
            relevant_knowledge: self.0.clone(),
            insights: "auto leads with clean records convert well".to_string(),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn lead(id: &str) -> Lead {
    serde_json::from_str(&format!(
        r#"{{"id": "{}", "email": "a@b.com", "insuranceType": "auto"}}"#,
        id
    ))
    .unwrap()
}

fn knowledge_entry() -> KnowledgeEntry {
    KnowledgeEntry {
        id: "k1".to_string(),
        title: "Auto underwriting basics".to_string(),
        content: "Clean records qualify for preferred tiers.".to_string(),
        category: Some("underwriting".to_string()),
        relevance: 0.88,
    }
}

fn pipeline(
    ai: StubAi,
    index: Arc<MemoryIndex>,
    enrichment: Arc<dyn EnrichmentSource>,
    knowledge: Arc<dyn KnowledgeSearcher>,
) -> ProcessingPipeline {
    ProcessingPipeline::new(
        Arc::new(ai),
        index,
        enrichment,
        knowledge,
        PipelineConfig::default(),
    )
}

// ============================================================================
// Tests
// ============================================================================

/// The reference scenario: classification succeeds, enrichment fails,
/// one knowledge entry, 1536-dim embedding, upsert succeeds.
#[tokio::test]
async fn test_example_scenario() {
    let index = Arc::new(MemoryIndex::default());
    let p = pipeline(
        StubAi::working(1536),
        index.clone(),
        Arc::new(FailingEnrichment),
        Arc::new(StaticKnowledge(vec![knowledge_entry()])),
    );

    let enriched = p.process(&lead("L1")).await.unwrap();

    assert_eq!(enriched.processing_status, ProcessingStatus::Qualified);
    assert_eq!(enriched.classification.quality_score, 72);
    assert_eq!(enriched.classification.intent, "quote");
    assert!(enriched.enrichment.is_empty());
    assert_eq!(enriched.knowledge_insights.relevant_knowledge.len(), 1);
    assert_eq!(enriched.embedding.len(), 1536);

    // The vector made it into the index under the lead's id
    let collections = index.collections.lock().await;
    let points = collections.get("leads").unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].0, "L1");
}

/// Degraded enrichment and knowledge never block completion.
#[tokio::test]
async fn test_degraded_enrichment_still_qualifies() {
    let index = Arc::new(MemoryIndex::default());
    let p = pipeline(
        StubAi::working(8),
        index,
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
    );

    let enriched = p.process(&lead("L1")).await.unwrap();

    assert_eq!(enriched.processing_status, ProcessingStatus::Qualified);
    assert!(enriched.enrichment.is_empty());
    assert!(enriched.knowledge_insights.relevant_knowledge.is_empty());
    assert!(enriched.knowledge_insights.insights.is_empty());
    assert!(!enriched.embedding.is_empty());
}

/// A classification failure aborts the run with no partial emission.
#[tokio::test]
async fn test_classification_failure_aborts_without_partial_emission() {
    let index = Arc::new(MemoryIndex::default());
    let ai = StubAi {
        classification: None,
        embedding_dim: 8,
        fail_embedding: false,
    };
    let p = pipeline(
        ai,
        index.clone(),
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
    );

    let result = p.process(&lead("L1")).await;
    assert!(matches!(result, Err(PipelineError::Classification(_))));

    // Nothing reached the index
    assert!(index.collections.lock().await.is_empty());
}

/// An embedding failure aborts the run before the upsert stage.
#[tokio::test]
async fn test_embedding_failure_aborts_without_upsert() {
    let index = Arc::new(MemoryIndex::default());
    let ai = StubAi {
        classification: Some(Classification {
            insurance_type: InsuranceType::Auto,
            quality_score: 50,
            intent: "info".to_string(),
            urgency: "low".to_string(),
        }),
        embedding_dim: 8,
        fail_embedding: true,
    };
    let p = pipeline(
        ai,
        index.clone(),
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
    );

    let result = p.process(&lead("L1")).await;
    assert!(matches!(result, Err(PipelineError::Embedding(_))));
    assert!(index.collections.lock().await.is_empty());
}

/// An embedding whose dimension disagrees with the configured collection
/// dimension is fatal, same as any other embedding failure.
#[tokio::test]
async fn test_embedding_dimension_mismatch_is_fatal() {
    let index = Arc::new(MemoryIndex::default());
    let p = ProcessingPipeline::new(
        Arc::new(StubAi::working(8)),
        index.clone(),
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
        PipelineConfig {
            expected_dim: Some(1536),
            ..PipelineConfig::default()
        },
    );

    let result = p.process(&lead("L1")).await;
    assert!(matches!(result, Err(PipelineError::Embedding(_))));
    assert!(index.collections.lock().await.is_empty());
}

/// Processing the same lead twice overwrites its entry: no duplicates,
/// identical vector for identical input.
#[tokio::test]
async fn test_reprocessing_is_idempotent() {
    let index = Arc::new(MemoryIndex::default());
    let p = pipeline(
        StubAi::working(16),
        index.clone(),
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
    );

    let first = p.process(&lead("L1")).await.unwrap();
    let second = p.process(&lead("L1")).await.unwrap();

    assert_eq!(first.embedding, second.embedding);

    let collections = index.collections.lock().await;
    let points = collections.get("leads").unwrap();
    assert_eq!(points.len(), 1, "reprocessing must not duplicate entries");
    assert_eq!(points[0].1, second.embedding);
}

/// Different enrichment changes the projection, hence the vector.
#[tokio::test]
async fn test_enrichment_feeds_embedding_input() {
    let index = Arc::new(MemoryIndex::default());
    let enrichment = Enrichment {
        company: Some(CompanyInfo {
            name: "Acme Freight".to_string(),
            industry: Some("logistics".to_string()),
            ..Default::default()
        }),
        person: None,
    };

    let bare = pipeline(
        StubAi::working(16),
        index.clone(),
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
    )
    .process(&lead("L1"))
    .await
    .unwrap();

    let enriched = pipeline(
        StubAi::working(16),
        index,
        Arc::new(StaticEnrichment(enrichment)),
        Arc::new(FailingKnowledge),
    )
    .process(&lead("L1"))
    .await
    .unwrap();

    assert!(!enriched.enrichment.is_empty());
    assert_ne!(bare.embedding, enriched.embedding);
}

/// Similarity search never returns the query lead itself.
#[tokio::test]
async fn test_similar_leads_excludes_self() {
    let index = Arc::new(MemoryIndex::default());
    let p = pipeline(
        StubAi::working(16),
        index.clone(),
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
    );

    // Three near-identical leads land close together in vector space
    let own = p.process(&lead("L1")).await.unwrap();
    p.process(&lead("L2")).await.unwrap();
    p.process(&lead("L3")).await.unwrap();

    let similar = p.find_similar_leads(&own.embedding, "L1").await;

    assert!(!similar.is_empty());
    assert!(similar.iter().all(|s| s.id != "L1"));
    // Descending similarity order
    for pair in similar.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

/// A missing collection yields an empty result, not an error.
#[tokio::test]
async fn test_similar_leads_fails_soft_on_missing_collection() {
    let index = Arc::new(MemoryIndex::default());
    let p = pipeline(
        StubAi::working(16),
        index,
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
    );

    let similar = p.find_similar_leads(&[0.5; 16], "L1").await;
    assert!(similar.is_empty());
}

/// Similar-lead results carry the metadata written at upsert time.
#[tokio::test]
async fn test_similar_leads_carry_payload_metadata() {
    let index = Arc::new(MemoryIndex::default());
    let p = pipeline(
        StubAi::working(16),
        index.clone(),
        Arc::new(FailingEnrichment),
        Arc::new(FailingKnowledge),
    );

    let own = p.process(&lead("L1")).await.unwrap();
    p.process(&lead("L2")).await.unwrap();

    let similar = p.find_similar_leads(&own.embedding, "L1").await;
    let neighbor = similar.iter().find(|s| s.id == "L2").unwrap();

    assert_eq!(neighbor.insurance_type, InsuranceType::Auto);
    assert_eq!(neighbor.quality_score, 72);
}
