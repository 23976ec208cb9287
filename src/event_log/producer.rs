use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::warn;

use crate::error::{Error, Result};
use crate::events::price::PriceEvent;
use crate::interfaces::event_publisher::EventPublisher;

pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventPublisher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("compression.type", "lz4")
            .create()
            .map_err(|e| Error::Kafka(e.to_string()))?;

        Ok(KafkaEventPublisher {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &PriceEvent) -> bool {
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize price event: {}", e);
                return false;
            }
        };

        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(&event.symbol);

        match self.producer.send(record, Duration::from_secs(5)).await {
            Ok(_) => true,
            Err((e, _)) => {
                warn!("Failed to publish price event for {}: {}", event.symbol, e);
                false
            }
        }
    }
}

/// Publisher stand-in used when Kafka is disabled: events are dropped.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: &PriceEvent) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_publisher_drops_events() {
        let publisher = NoopPublisher;
        let event = PriceEvent::new("AAPL", 150.0, "test_source");
        assert!(!publisher.publish(&event).await);
    }
}
