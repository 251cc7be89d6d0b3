//! leadflow-processor library interface
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod types;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::types::LeadStore;
use crate::workflow::QueueManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Lead read-side and routing-decision records
    pub store: Arc<dyn LeadStore>,
    /// Processing queue, exposed for dead-letter inspection
    pub queue: Arc<QueueManager>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn LeadStore>, queue: Arc<QueueManager>) -> Self {
        Self {
            store,
            queue,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::routing_routes())
        .with_state(state)
}
