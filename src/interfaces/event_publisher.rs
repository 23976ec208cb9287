use async_trait::async_trait;

use crate::events::price::PriceEvent;

/// Fan-out of price events to the message broker.
///
/// Publication is opportunistic: a `false` return means the event was
/// dropped (broker unavailable, timeout) and callers carry on.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PriceEvent) -> bool;
}
