//! NATS bus client wrapper
//!
//! Thin wrapper over `async_nats::Client` giving the services a single
//! connect/subscribe/publish/close surface with JSON payloads and one
//! error type. Delivery is at-least-once; consumers must be idempotent
//! per lead id.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Bus client errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Broker unreachable or handshake failed
    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Publish error: {0}")]
    Publish(String),

    /// Outbound payload could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Inbound payload was malformed; callers catch this per message and
    /// must not let it terminate a subscription loop
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Close error: {0}")]
    Close(String),
}

/// Shared bus connection
///
/// Cheap to clone; all clones share one underlying connection and are
/// safe to use from concurrent tasks.
#[derive(Clone)]
pub struct BusClient {
    client: async_nats::Client,
}

impl BusClient {
    /// Connect to the broker
    ///
    /// Fails with [`BusError::Connect`] if the broker is unreachable;
    /// startup treats that as fatal (process exit 1).
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        info!(url = %url, "Connected to message bus");
        Ok(Self { client })
    }

    /// Wrap an already-established connection (used by tests and tools)
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Subscribe to a subject
    ///
    /// The returned subscriber is a lazy, unbounded stream of messages;
    /// it ends only when the connection drains or drops. Restart by
    /// re-subscribing.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, BusError> {
        self.client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))
    }

    /// Publish a JSON-serialized payload to a subject
    pub async fn publish<T: Serialize>(&self, subject: &str, payload: &T) -> Result<(), BusError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| BusError::Encode(e.to_string()))?;

        self.client
            .publish(subject.to_string(), Bytes::from(bytes))
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    /// Decode a JSON message payload
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BusError> {
        serde_json::from_slice(bytes).map_err(|e| BusError::Decode(e.to_string()))
    }

    /// Flush buffered outbound messages to the broker
    pub async fn flush(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    /// Close the connection
    ///
    /// Drains all subscriptions (unblocking any in-flight iteration) and
    /// releases the connection.
    pub async fn close(&self) -> Result<(), BusError> {
        self.client
            .drain()
            .await
            .map_err(|e| BusError::Close(e.to_string()))?;

        info!("Message bus connection closed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
