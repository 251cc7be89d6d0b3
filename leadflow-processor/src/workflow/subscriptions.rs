//! Bus subscription loops
//!
//! One long-lived task per subject, each iterating its message stream
//! with cooperative shutdown via a watch channel. A malformed message is
//! logged and skipped; it never terminates the loop. A bus stream that
//! ends on its own is an error the caller treats as fatal to the
//! process (restart supervision takes over).

use crate::services::routing::RoutingError;
use crate::services::RoutingService;
use crate::types::{Lead, LeadStore};
use crate::workflow::queue::QueueManager;
use futures::StreamExt;
use leadflow_common::events::{decode_lead_payload, decode_lead_ref, subjects, BusClient, BusError};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared message-handling dependencies for the subscription loops
///
/// The bus connection itself stays outside: handlers only decode and
/// dispatch, which keeps them testable without a broker.
pub struct SubscriptionContext {
    pub queue: Arc<QueueManager>,
    pub routing: Arc<RoutingService>,
    pub store: Arc<dyn LeadStore>,
}

/// Spawn all subject loops
///
/// Each returned handle resolves with `Err` if its loop died on a bus
/// failure (as opposed to an orderly shutdown), which the caller treats
/// as fatal to the process.
pub fn spawn_subscriptions(
    bus: BusClient,
    ctx: Arc<SubscriptionContext>,
    shutdown_rx: watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<Result<(), BusError>>> {
    vec![
        tokio::spawn(run_lead_received_subscription(
            bus.clone(),
            ctx.clone(),
            shutdown_rx.clone(),
        )),
        tokio::spawn(run_routing_subscription(
            bus.clone(),
            ctx.clone(),
            shutdown_rx.clone(),
            subjects::LEAD_QUALIFIED,
        )),
        tokio::spawn(run_routing_subscription(
            bus,
            ctx,
            shutdown_rx,
            subjects::LEAD_PROCESSED,
        )),
    ]
}

/// `lead.received`: decode the lead, register it, enqueue processing
pub async fn run_lead_received_subscription(
    bus: BusClient,
    ctx: Arc<SubscriptionContext>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), BusError> {
    let subject = subjects::LEAD_RECEIVED;
    let mut subscriber = bus.subscribe(subject).await?;
    info!(subject = %subject, "Subscribed");

    loop {
        tokio::select! {
            msg = subscriber.next() => {
                match msg {
                    Some(msg) => {
                        handle_lead_received(&ctx, &msg.payload).await;
                    }
                    None => {
                        warn!(subject = %subject, "Subscription stream ended");
                        return Err(BusError::Subscribe(format!("{} stream ended", subject)));
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!(subject = %subject, "Shutdown signal, stopping subscription");
                break;
            }
        }
    }

    if let Err(e) = subscriber.unsubscribe().await {
        warn!(subject = %subject, error = %e, "Failed to unsubscribe");
    }
    Ok(())
}

/// Loop body for the routing-triggering subjects
/// (`lead.qualified` direct routing, `lead.processed` post-pipeline)
pub async fn run_routing_subscription(
    bus: BusClient,
    ctx: Arc<SubscriptionContext>,
    mut shutdown_rx: watch::Receiver<bool>,
    subject: &'static str,
) -> Result<(), BusError> {
    let mut subscriber = bus.subscribe(subject).await?;
    info!(subject = %subject, "Subscribed");

    loop {
        tokio::select! {
            msg = subscriber.next() => {
                match msg {
                    Some(msg) => {
                        handle_routing_trigger(&ctx, &msg.payload, subject).await;
                    }
                    None => {
                        warn!(subject = %subject, "Subscription stream ended");
                        return Err(BusError::Subscribe(format!("{} stream ended", subject)));
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!(subject = %subject, "Shutdown signal, stopping subscription");
                break;
            }
        }
    }

    if let Err(e) = subscriber.unsubscribe().await {
        warn!(subject = %subject, error = %e, "Failed to unsubscribe");
    }
    Ok(())
}

/// Handle one `lead.received` message
///
/// Returns whether the message was accepted; decode failures are logged
/// and skipped so one bad message cannot take down the loop.
pub async fn handle_lead_received(ctx: &SubscriptionContext, payload: &[u8]) -> bool {
    let lead: Lead = match decode_lead_payload(payload) {
        Ok(lead) => lead,
        Err(e) => {
            warn!(subject = subjects::LEAD_RECEIVED, error = %e, "Skipping malformed message");
            return false;
        }
    };

    // Register leads first seen on the bus so routing can read them later
    if let Err(e) = ctx.store.insert_lead_if_absent(&lead).await {
        warn!(lead_id = %lead.id, error = %e, "Failed to register lead");
    }

    ctx.queue.enqueue(lead).await
}

/// Handle one routing-trigger message (`lead.qualified` / `lead.processed`)
///
/// Returns whether a routing decision was made.
pub async fn handle_routing_trigger(
    ctx: &SubscriptionContext,
    payload: &[u8],
    subject: &str,
) -> bool {
    let lead_ref = match decode_lead_ref(payload) {
        Ok(lead_ref) => lead_ref,
        Err(e) => {
            warn!(subject = %subject, error = %e, "Skipping malformed message");
            return false;
        }
    };

    match ctx.routing.route_lead(&lead_ref.lead_id).await {
        Ok(_) => true,
        Err(RoutingError::LeadNotFound(id)) => {
            warn!(lead_id = %id, subject = %subject, "Routing skipped, lead unknown");
            false
        }
        Err(e) => {
            warn!(lead_id = %lead_ref.lead_id, subject = %subject, error = %e, "Routing failed");
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
