//! # Leadflow Common Library
//!
//! Shared code for the leadflow services including:
//! - Common error types
//! - Bus event types and the NATS bus client
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
