//! Bus event types for the leadflow event system
//!
//! Subjects and payload shapes for the lead lifecycle. Upstream producers
//! (the CRUD services) emit several historical payload shapes per subject,
//! so every inbound subject gets a decoder with an explicit fallback order
//! instead of ad-hoc shape sniffing at call sites.

pub mod bus;

pub use bus::{BusClient, BusError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bus subject names for the lead lifecycle
pub mod subjects {
    /// A new raw lead has been captured (payload: lead record)
    pub const LEAD_RECEIVED: &str = "lead.received";
    /// A lead has been marked qualified (payload: lead reference)
    pub const LEAD_QUALIFIED: &str = "lead.qualified";
    /// The pipeline finished processing a lead (payload: lead reference + summary)
    pub const LEAD_PROCESSED: &str = "lead.processed";
    /// A routing decision has been made (payload: decision summary)
    pub const LEAD_ROUTED: &str = "lead.routed";
}

/// Reference to a lead carried by `lead.qualified` / `lead.processed` events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadRef {
    pub lead_id: String,
}

/// Event published after the pipeline successfully processes a lead
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadProcessedEvent {
    pub lead_id: String,
    pub processing_status: String,
    pub quality_score: u8,
    pub processed_at: DateTime<Utc>,
}

/// Event published after a routing decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRoutedEvent {
    pub lead_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub outcome: String,
    pub decided_at: DateTime<Utc>,
}

/// Decode a payload that carries a full lead record
///
/// Fallback order: `{data: {lead: ...}}` → `{lead: ...}` → bare lead object.
/// The first shape that is present wins; deserialization errors on the
/// selected candidate are reported, not papered over by trying the next.
pub fn decode_lead_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BusError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| BusError::Decode(format!("invalid JSON: {}", e)))?;

    let candidate = value
        .get("data")
        .and_then(|d| d.get("lead"))
        .or_else(|| value.get("lead"))
        .unwrap_or(&value);

    serde_json::from_value(candidate.clone())
        .map_err(|e| BusError::Decode(format!("lead payload: {}", e)))
}

/// Decode a payload that carries a lead reference
///
/// Fallback order: `leadId` → `id` → `data.leadId` → `data.id`.
pub fn decode_lead_ref(bytes: &[u8]) -> Result<LeadRef, BusError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| BusError::Decode(format!("invalid JSON: {}", e)))?;

    let id = extract_id(&value)
        .or_else(|| value.get("data").and_then(extract_id))
        .ok_or_else(|| BusError::Decode("no lead id in payload".to_string()))?;

    Ok(LeadRef { lead_id: id })
}

fn extract_id(value: &serde_json::Value) -> Option<String> {
    value
        .get("leadId")
        .or_else(|| value.get("id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

// ============================================================================
// Tests
// ============================================================================
