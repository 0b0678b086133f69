use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use echelon_core::domain::message::InboundEvent;
use echelon_core::errors::{ApplicationError, InterfaceError};

use crate::gateway::MessagingGateway;
use crate::locks::SenderGuard;
use crate::router::{HandlerResult, IntentRouter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into() }
    }

    /// Provider message id when present, otherwise a fresh one.
    pub fn for_event(event: &InboundEvent) -> Self {
        match &event.message_id {
            Some(message_id) => Self::new(message_id.clone()),
            None => Self::new(format!("local-{}", Uuid::new_v4().simple())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("event source read failed: {0}")]
    Receive(String),
}

/// Anything that yields inbound events; `Ok(None)` means the stream is closed.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn next_event(&self) -> Result<Option<InboundEvent>, SourceError>;
}

/// Feeds events pushed through an mpsc sender.
pub struct ChannelEventSource {
    receiver: Mutex<mpsc::Receiver<InboundEvent>>,
}

impl ChannelEventSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<InboundEvent>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self { receiver: Mutex::new(receiver) })
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_event(&self) -> Result<Option<InboundEvent>, SourceError> {
        Ok(self.receiver.lock().await.recv().await)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Ignored,
    /// Nothing was sent; the sender's state is as it was before the event.
    RouteFailed(InterfaceError),
    /// The event was handled and its state change kept, but the reply was lost.
    SendFailed(InterfaceError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub received: usize,
    pub sent: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl PumpStats {
    fn record(&mut self, delivery: &Delivery) {
        match delivery {
            Delivery::Sent => self.sent += 1,
            Delivery::Ignored => self.ignored += 1,
            Delivery::RouteFailed(_) | Delivery::SendFailed(_) => self.failed += 1,
        }
    }
}

/// Hands each inbound event to the router on its own task and sends the reply.
///
/// `run` takes each sender's lock in the receive loop, so a sender's events are handled and
/// answered in arrival order. Events from other senders keep running concurrently.
pub struct EventPump {
    router: Arc<IntentRouter>,
    gateway: Arc<dyn MessagingGateway>,
}

impl EventPump {
    pub fn new(router: Arc<IntentRouter>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { router, gateway }
    }

    /// Routes one event and sends its reply. Failures are logged and dropped.
    pub async fn process(&self, event: InboundEvent) -> Delivery {
        deliver(&self.router, self.gateway.as_ref(), event, None).await
    }

    /// Runs until the source closes, then waits for in-flight events.
    pub async fn run(&self, source: &dyn EventSource) -> Result<PumpStats, SourceError> {
        let mut stats = PumpStats::default();
        let mut tasks = JoinSet::new();

        loop {
            let next = match source.next_event().await {
                Ok(next) => next,
                Err(error) => {
                    warn!(
                        event_name = "ingress.source_failed",
                        error = %error,
                        in_flight = tasks.len(),
                        "event source failed; draining in-flight events"
                    );
                    drain(&mut tasks, &mut stats).await;
                    return Err(error);
                }
            };
            let Some(event) = next else {
                info!(event_name = "ingress.source_closed", "event source closed");
                break;
            };

            stats.received += 1;
            let guard = self.router.store().lock(&event.sender_id).await;
            let router = Arc::clone(&self.router);
            let gateway = Arc::clone(&self.gateway);
            tasks.spawn(async move {
                deliver(&router, gateway.as_ref(), event, Some(guard)).await
            });
            reap(&mut tasks, &mut stats);
        }

        drain(&mut tasks, &mut stats).await;
        info!(
            event_name = "ingress.pump_finished",
            received = stats.received,
            sent = stats.sent,
            ignored = stats.ignored,
            failed = stats.failed,
            "event pump finished"
        );
        Ok(stats)
    }
}

async fn drain(tasks: &mut JoinSet<Delivery>, stats: &mut PumpStats) {
    while let Some(joined) = tasks.join_next().await {
        record_joined(joined, stats);
    }
}

/// Collects finished tasks without waiting.
fn reap(tasks: &mut JoinSet<Delivery>, stats: &mut PumpStats) {
    while let Some(joined) = tasks.try_join_next() {
        record_joined(joined, stats);
    }
}

fn record_joined(joined: Result<Delivery, JoinError>, stats: &mut PumpStats) {
    match joined {
        Ok(delivery) => stats.record(&delivery),
        Err(error) => {
            warn!(event_name = "ingress.task_failed", error = %error, "event task aborted");
            stats.failed += 1;
        }
    }
}

/// With a `guard`, the sender's lock stays held until the reply has been sent.
async fn deliver(
    router: &IntentRouter,
    gateway: &dyn MessagingGateway,
    event: InboundEvent,
    guard: Option<SenderGuard>,
) -> Delivery {
    let ctx = EventContext::for_event(&event);
    debug!(
        event_name = "ingress.event_received",
        sender_id = %event.sender_id,
        correlation_id = %ctx.correlation_id,
        kind = ?event.kind,
        "received inbound event"
    );

    let handled = match &guard {
        Some(guard) => router.handle_locked(&event, &ctx, guard).await,
        None => router.handle(&event, &ctx).await,
    };
    let message = match handled {
        Ok(HandlerResult::Responded(message)) => message,
        Ok(HandlerResult::Ignored) => return Delivery::Ignored,
        Err(error) => {
            warn!(
                event_name = "router.event_dropped",
                sender_id = %event.sender_id,
                correlation_id = %ctx.correlation_id,
                error = %error,
                "event handling failed; no reply sent"
            );
            let failure = ApplicationError::from(error).into_interface(ctx.correlation_id);
            return Delivery::RouteFailed(failure);
        }
    };

    match gateway.send(message).await {
        Ok(receipt) => {
            debug!(
                event_name = "delivery.reply_sent",
                sender_id = %event.sender_id,
                correlation_id = %ctx.correlation_id,
                provider_message_id = %receipt.provider_message_id,
                "reply sent"
            );
            Delivery::Sent
        }
        Err(error) => {
            warn!(
                event_name = "delivery.reply_failed",
                sender_id = %event.sender_id,
                correlation_id = %ctx.correlation_id,
                error = %error,
                "reply could not be delivered"
            );
            Delivery::SendFailed(ApplicationError::from(error).into_interface(ctx.correlation_id))
        }
    }
}
