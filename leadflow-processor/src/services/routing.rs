//! Routing service
//!
//! Given a lead, decides an agent assignment via a pluggable strategy,
//! records the decision, and publishes the outcome on the bus.
//!
//! Re-routing policy: routing an already-routed lead produces a NEW
//! decision that supersedes the previous one (last write wins). Failure
//! to route is reported as an `unrouted`/`skipped` outcome, never as an
//! error that could kill a subscription loop.

use crate::types::{Lead, LeadStatus, LeadStore, RoutingDecision, RoutingOutcome};
use chrono::Utc;
use leadflow_common::events::{subjects, BusClient, LeadRoutedEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Routing errors
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The lead does not exist in the store
    #[error("Lead not found: {0}")]
    LeadNotFound(String),

    /// Store read/write failed
    #[error("Store error: {0}")]
    Store(#[from] leadflow_common::Error),
}

/// Pluggable agent assignment strategy
pub trait AssignmentStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Select an agent for the lead; None when no agent is eligible
    fn select_agent(&self, lead: &Lead) -> Option<String>;
}

/// Round-robin assignment over a fixed agent roster
pub struct RoundRobinStrategy {
    agents: Vec<String>,
    cursor: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new(agents: Vec<String>) -> Self {
        Self {
            agents,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl AssignmentStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select_agent(&self, _lead: &Lead) -> Option<String> {
        if self.agents.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        Some(self.agents[index].clone())
    }
}

/// Lead statuses eligible for routing
///
/// A lead that has already left the funnel (unqualified, converted,
/// lost) is skipped; everything still in play is routable.
pub fn is_routable(status: LeadStatus) -> bool {
    !matches!(
        status,
        LeadStatus::Unqualified | LeadStatus::Converted | LeadStatus::Lost
    )
}

/// Routing service
pub struct RoutingService {
    store: Arc<dyn LeadStore>,
    strategy: Arc<dyn AssignmentStrategy>,
    /// Bus connection for publishing outcomes; None disables publishing
    /// (tests, tooling)
    bus: Option<BusClient>,
}

impl RoutingService {
    pub fn new(
        store: Arc<dyn LeadStore>,
        strategy: Arc<dyn AssignmentStrategy>,
        bus: Option<BusClient>,
    ) -> Self {
        Self {
            store,
            strategy,
            bus,
        }
    }

    /// Decide and record an agent assignment for a lead
    ///
    /// Idempotent in the supersede sense: calling again records a fresh
    /// decision that replaces the previous one as the latest.
    pub async fn route_lead(&self, lead_id: &str) -> Result<RoutingDecision, RoutingError> {
        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| RoutingError::LeadNotFound(lead_id.to_string()))?;

        let decision = if !is_routable(lead.status) {
            RoutingDecision {
                lead_id: lead_id.to_string(),
                agent_id: None,
                outcome: RoutingOutcome::Skipped,
                decided_at: Utc::now(),
            }
        } else {
            match self.strategy.select_agent(&lead) {
                Some(agent_id) => RoutingDecision {
                    lead_id: lead_id.to_string(),
                    agent_id: Some(agent_id),
                    outcome: RoutingOutcome::Assigned,
                    decided_at: Utc::now(),
                },
                None => RoutingDecision {
                    lead_id: lead_id.to_string(),
                    agent_id: None,
                    outcome: RoutingOutcome::Unrouted,
                    decided_at: Utc::now(),
                },
            }
        };

        self.store.record_decision(&decision).await?;

        info!(
            lead_id = %decision.lead_id,
            outcome = decision.outcome.as_str(),
            agent_id = decision.agent_id.as_deref().unwrap_or("-"),
            strategy = self.strategy.name(),
            "Routing decision recorded"
        );

        self.publish_outcome(&decision).await;

        Ok(decision)
    }

    /// Publish the routed event; publish failure is logged, not fatal
    async fn publish_outcome(&self, decision: &RoutingDecision) {
        let Some(bus) = &self.bus else {
            return;
        };

        let event = LeadRoutedEvent {
            lead_id: decision.lead_id.clone(),
            agent_id: decision.agent_id.clone(),
            outcome: decision.outcome.as_str().to_string(),
            decided_at: decision.decided_at,
        };

        if let Err(e) = bus.publish(subjects::LEAD_ROUTED, &event).await {
            warn!(lead_id = %decision.lead_id, error = %e, "Failed to publish routed event");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory store for routing tests
    #[derive(Default)]
    struct MemoryStore {
        leads: Mutex<HashMap<String, Lead>>,
        decisions: Mutex<Vec<RoutingDecision>>,
    }

    #[async_trait::async_trait]
    impl LeadStore for MemoryStore {
        async fn get_lead(&self, lead_id: &str) -> leadflow_common::Result<Option<Lead>> {
            Ok(self.leads.lock().await.get(lead_id).cloned())
        }

        async fn insert_lead_if_absent(&self, lead: &Lead) -> leadflow_common::Result<()> {
            self.leads
                .lock()
                .await
                .entry(lead.id.clone())
                .or_insert_with(|| lead.clone());
            Ok(())
        }

        async fn record_decision(
            &self,
            decision: &RoutingDecision,
        ) -> leadflow_common::Result<()> {
            self.decisions.lock().await.push(decision.clone());
            Ok(())
        }

        async fn latest_decision(
            &self,
            lead_id: &str,
        ) -> leadflow_common::Result<Option<RoutingDecision>> {
            Ok(self
                .decisions
                .lock()
                .await
                .iter()
                .rev()
                .find(|d| d.lead_id == lead_id)
                .cloned())
        }
    }

    fn lead(id: &str, status: &str) -> Lead {
        serde_json::from_str(&format!(
            r#"{{"id": "{}", "email": "a@b.com", "status": "{}"}}"#,
            id, status
        ))
        .unwrap()
    }

    async fn service_with(
        leads: Vec<Lead>,
        agents: Vec<String>,
    ) -> (RoutingService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        for l in leads {
            store.insert_lead_if_absent(&l).await.unwrap();
        }
        let strategy = Arc::new(RoundRobinStrategy::new(agents));
        (
            RoutingService::new(store.clone(), strategy, None),
            store,
        )
    }

    #[tokio::test]
    async fn test_routes_qualified_lead_to_agent() {
        let (service, store) = service_with(
            vec![lead("L1", "qualified")],
            vec!["agent-1".to_string(), "agent-2".to_string()],
        )
        .await;

        let decision = service.route_lead("L1").await.unwrap();
        assert_eq!(decision.outcome, RoutingOutcome::Assigned);
        assert_eq!(decision.agent_id.as_deref(), Some("agent-1"));

        let latest = store.latest_decision("L1").await.unwrap().unwrap();
        assert_eq!(latest.agent_id.as_deref(), Some("agent-1"));
    }

    #[tokio::test]
    async fn test_round_robin_cycles_agents() {
        let (service, _) = service_with(
            vec![lead("L1", "qualified"), lead("L2", "qualified")],
            vec!["agent-1".to_string(), "agent-2".to_string()],
        )
        .await;

        let first = service.route_lead("L1").await.unwrap();
        let second = service.route_lead("L2").await.unwrap();
        assert_eq!(first.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(second.agent_id.as_deref(), Some("agent-2"));
    }

    #[tokio::test]
    async fn test_rerouting_supersedes_previous_decision() {
        // Policy under test: re-routing an already-routed lead produces a
        // NEW decision; the latest recorded decision wins.
        let (service, store) = service_with(
            vec![lead("L1", "qualified")],
            vec!["agent-1".to_string(), "agent-2".to_string()],
        )
        .await;

        let first = service.route_lead("L1").await.unwrap();
        let second = service.route_lead("L1").await.unwrap();

        assert_eq!(first.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(second.agent_id.as_deref(), Some("agent-2"));
        assert!(second.decided_at >= first.decided_at);

        let latest = store.latest_decision("L1").await.unwrap().unwrap();
        assert_eq!(latest.agent_id.as_deref(), Some("agent-2"));

        // Both decisions remain on record; the old one is superseded,
        // not mutated
        assert_eq!(store.decisions.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_roster_yields_unrouted_outcome() {
        let (service, _) = service_with(vec![lead("L1", "qualified")], vec![]).await;

        let decision = service.route_lead("L1").await.unwrap();
        assert_eq!(decision.outcome, RoutingOutcome::Unrouted);
        assert!(decision.agent_id.is_none());
    }

    #[tokio::test]
    async fn test_lost_lead_is_skipped() {
        let (service, _) =
            service_with(vec![lead("L1", "lost")], vec!["agent-1".to_string()]).await;

        let decision = service.route_lead("L1").await.unwrap();
        assert_eq!(decision.outcome, RoutingOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_unknown_lead_is_an_error() {
        let (service, _) = service_with(vec![], vec!["agent-1".to_string()]).await;

        let result = service.route_lead("ghost").await;
        assert!(matches!(result, Err(RoutingError::LeadNotFound(_))));
    }

    #[test]
    fn test_routable_statuses() {
        assert!(is_routable(LeadStatus::New));
        assert!(is_routable(LeadStatus::Contacted));
        assert!(is_routable(LeadStatus::Qualified));
        assert!(!is_routable(LeadStatus::Unqualified));
        assert!(!is_routable(LeadStatus::Converted));
        assert!(!is_routable(LeadStatus::Lost));
    }
}
