//! External-provider clients and the routing service

pub mod ai_client;
pub mod enrichment;
pub mod knowledge;
pub mod routing;
pub mod vector_client;

pub use ai_client::{AiClientConfig, AiServiceClient};
pub use enrichment::{EnrichmentConfig, EnrichmentResolver};
pub use knowledge::KnowledgeBaseSearcher;
pub use routing::{AssignmentStrategy, RoundRobinStrategy, RoutingError, RoutingService};
pub use vector_client::{VectorClientConfig, VectorIndexClient};
