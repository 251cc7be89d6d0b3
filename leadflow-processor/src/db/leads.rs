//! Lead store database operations
//!
//! SQLite implementation of the [`LeadStore`] seam.

use crate::types::{
    InsuranceType, Lead, LeadStatus, LeadStore, RoutingDecision, RoutingOutcome,
};
use chrono::{DateTime, Utc};
use leadflow_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// SQLite-backed lead store
#[derive(Clone)]
pub struct SqliteLeadStore {
    pool: SqlitePool,
}

impl SqliteLeadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn lead_from_row(row: &sqlx::sqlite::SqliteRow) -> Lead {
    Lead {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        insurance_type: InsuranceType::from_str_or_other(row.get::<String, _>("insurance_type").as_str()),
        status: LeadStatus::from_str_or_default(row.get::<String, _>("status").as_str()),
        source: row.get("source"),
        notes: row.get("notes"),
        address: row.get("address"),
        city: row.get("city"),
        state: row.get("state"),
        zip_code: row.get("zip_code"),
    }
}

#[async_trait::async_trait]
impl LeadStore for SqliteLeadStore {
    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, email, phone, insurance_type, status,
                    source, notes, address, city, state, zip_code
             FROM leads WHERE id = ?",
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(lead_from_row))
    }

    async fn insert_lead_if_absent(&self, lead: &Lead) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO leads
                (id, first_name, last_name, email, phone, insurance_type, status,
                 source, notes, address, city, state, zip_code)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id)
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(lead.insurance_type.as_str())
        .bind(lead.status.as_str())
        .bind(&lead.source)
        .bind(&lead.notes)
        .bind(&lead.address)
        .bind(&lead.city)
        .bind(&lead.state)
        .bind(&lead.zip_code)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_decision(&self, decision: &RoutingDecision) -> Result<()> {
        sqlx::query(
            "INSERT INTO routing_decisions (lead_id, agent_id, outcome, decided_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&decision.lead_id)
        .bind(&decision.agent_id)
        .bind(decision.outcome.as_str())
        .bind(decision.decided_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_decision(&self, lead_id: &str) -> Result<Option<RoutingDecision>> {
        let row = sqlx::query(
            "SELECT lead_id, agent_id, outcome, decided_at
             FROM routing_decisions WHERE lead_id = ?
             ORDER BY id DESC LIMIT 1",
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let decided_at_raw: String = row.get("decided_at");
        let decided_at = DateTime::parse_from_rfc3339(&decided_at_raw)
            .map_err(|e| Error::Internal(format!("bad decided_at in store: {}", e)))?
            .with_timezone(&Utc);

        Ok(Some(RoutingDecision {
            lead_id: row.get("lead_id"),
            agent_id: row.get("agent_id"),
            outcome: RoutingOutcome::from_str_or_skipped(row.get::<String, _>("outcome").as_str()),
            decided_at,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (SqliteLeadStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::init_database_pool(&dir.path().join("test.db"))
            .await
            .unwrap();
        (SqliteLeadStore::new(pool), dir)
    }

    fn lead(id: &str) -> Lead {
        serde_json::from_str(&format!(
            r#"{{"id": "{}", "email": "a@b.com", "insuranceType": "auto", "status": "qualified"}}"#,
            id
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_lead() {
        let (store, _dir) = test_store().await;

        store.insert_lead_if_absent(&lead("L1")).await.unwrap();

        let fetched = store.get_lead("L1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "L1");
        assert_eq!(fetched.insurance_type, InsuranceType::Auto);
        assert_eq!(fetched.status, LeadStatus::Qualified);
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_existing() {
        let (store, _dir) = test_store().await;

        store.insert_lead_if_absent(&lead("L1")).await.unwrap();

        let mut changed = lead("L1");
        changed.email = "other@b.com".to_string();
        store.insert_lead_if_absent(&changed).await.unwrap();

        let fetched = store.get_lead("L1").await.unwrap().unwrap();
        assert_eq!(fetched.email, "a@b.com");
    }

    #[tokio::test]
    async fn test_missing_lead_is_none() {
        let (store, _dir) = test_store().await;
        assert!(store.get_lead("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_decision_wins() {
        let (store, _dir) = test_store().await;

        let first = RoutingDecision {
            lead_id: "L1".to_string(),
            agent_id: Some("agent-1".to_string()),
            outcome: RoutingOutcome::Assigned,
            decided_at: Utc::now(),
        };
        let second = RoutingDecision {
            lead_id: "L1".to_string(),
            agent_id: Some("agent-2".to_string()),
            outcome: RoutingOutcome::Assigned,
            decided_at: Utc::now(),
        };

        store.record_decision(&first).await.unwrap();
        store.record_decision(&second).await.unwrap();

        let latest = store.latest_decision("L1").await.unwrap().unwrap();
        assert_eq!(latest.agent_id.as_deref(), Some("agent-2"));
    }

    #[tokio::test]
    async fn test_no_decision_is_none() {
        let (store, _dir) = test_store().await;
        assert!(store.latest_decision("L1").await.unwrap().is_none());
    }
}
