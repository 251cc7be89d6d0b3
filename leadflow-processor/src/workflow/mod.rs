//! Lead processing workflow
//!
//! The event-driven core: subscription loops translate bus messages into
//! queue jobs or routing calls, the queue bounds pipeline concurrency,
//! and the pipeline drives each lead through its stages.

pub mod pipeline;
pub mod queue;
pub mod subscriptions;

pub use pipeline::{PipelineConfig, PipelineError, ProcessingPipeline};
pub use queue::{DeadLetter, ProcessingJob, QueueConfig, QueueManager};
pub use subscriptions::{spawn_subscriptions, SubscriptionContext};
