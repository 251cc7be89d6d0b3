//! Knowledge base searcher
//!
//! Semantic lookup into the curated knowledge corpus: embeds a query
//! built from the lead and its classification, searches the knowledge
//! collection in the vector index, and asks the AI provider for a short
//! summary of the hits. An empty result is a valid outcome; a failed
//! summary degrades to an empty insights string.

use crate::types::{
    AiService, Classification, KnowledgeEntry, KnowledgeError, KnowledgeInsight,
    KnowledgeSearcher, Lead, ScoredPoint, VectorError, VectorIndex,
};
use std::sync::Arc;
use tracing::warn;

const DEFAULT_LIMIT: usize = 3;
const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Knowledge base searcher over the AI and vector index seams
pub struct KnowledgeBaseSearcher {
    ai: Arc<dyn AiService>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    limit: usize,
    min_similarity: f32,
}

impl KnowledgeBaseSearcher {
    pub fn new(ai: Arc<dyn AiService>, index: Arc<dyn VectorIndex>, collection: String) -> Self {
        Self {
            ai,
            index,
            collection,
            limit: DEFAULT_LIMIT,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

#[async_trait::async_trait]
impl KnowledgeSearcher for KnowledgeBaseSearcher {
    async fn search(
        &self,
        lead: &Lead,
        classification: &Classification,
    ) -> Result<KnowledgeInsight, KnowledgeError> {
        let query = knowledge_query(lead, classification);
        let embedding = self.ai.generate_embedding(&query).await?;

        let hits = match self
            .index
            .search(&self.collection, &embedding, self.limit, self.min_similarity)
            .await
        {
            Ok(hits) => hits,
            // The knowledge corpus may not have been created yet
            Err(VectorError::CollectionNotFound(_)) => return Ok(KnowledgeInsight::default()),
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<KnowledgeEntry> = hits.into_iter().map(entry_from_point).collect();
        if entries.is_empty() {
            return Ok(KnowledgeInsight::default());
        }

        // Summary is best-effort; the retrieved entries stand on their own
        let insights = match self.ai.complete_prompt(&summary_prompt(lead, &entries)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "Insight summary failed, continuing without");
                String::new()
            }
        };

        Ok(KnowledgeInsight {
            relevant_knowledge: entries,
            insights,
        })
    }
}

/// Build the semantic query text for a lead
fn knowledge_query(lead: &Lead, classification: &Classification) -> String {
    let mut query = format!(
        "{} insurance lead, intent {}, urgency {}",
        classification.insurance_type.as_str(),
        classification.intent,
        classification.urgency
    );
    if let Some(notes) = &lead.notes {
        query.push_str(": ");
        query.push_str(notes);
    }
    query
}

/// Build a knowledge entry from a scored point's payload
fn entry_from_point(point: ScoredPoint) -> KnowledgeEntry {
    let field = |key: &str| {
        point
            .payload
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    KnowledgeEntry {
        id: point.id,
        title: field("title"),
        content: field("content"),
        category: point
            .payload
            .get("category")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        relevance: point.score,
    }
}

fn summary_prompt(lead: &Lead, entries: &[KnowledgeEntry]) -> String {
    let mut prompt = format!(
        "Summarize, in two sentences, how the following knowledge applies to a {} insurance lead.\n",
        lead.insurance_type.as_str()
    );
    for entry in entries {
        prompt.push_str(&format!("- {}: {}\n", entry.title, entry.content));
    }
    prompt
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InsuranceType;

    fn test_classification() -> Classification {
        Classification {
            insurance_type: InsuranceType::Auto,
            quality_score: 72,
            intent: "quote".to_string(),
            urgency: "medium".to_string(),
        }
    }

    #[test]
    fn test_knowledge_query_includes_classification() {
        let lead: Lead = serde_json::from_str(
            r#"{"id": "L1", "email": "a@b.com", "notes": "two cars, clean record"}"#,
        )
        .unwrap();

        let query = knowledge_query(&lead, &test_classification());
        assert!(query.contains("auto"));
        assert!(query.contains("quote"));
        assert!(query.contains("two cars"));
    }

    #[test]
    fn test_entry_from_point_reads_payload_fields() {
        let point = ScoredPoint {
            id: "k1".to_string(),
            score: 0.88,
            payload: serde_json::json!({
                "title": "Auto underwriting basics",
                "content": "Clean records qualify for preferred tiers.",
                "category": "underwriting"
            }),
        };

        let entry = entry_from_point(point);
        assert_eq!(entry.title, "Auto underwriting basics");
        assert_eq!(entry.category.as_deref(), Some("underwriting"));
        assert_eq!(entry.relevance, 0.88);
    }

    #[test]
    fn test_entry_from_point_tolerates_missing_payload() {
        let point = ScoredPoint {
            id: "k2".to_string(),
            score: 0.75,
            payload: serde_json::Value::Null,
        };

        let entry = entry_from_point(point);
        assert!(entry.title.is_empty());
        assert!(entry.category.is_none());
    }
}
