use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tracing::{error, info, warn};

use crate::config::KafkaConfig;
use crate::error::{Error, Result};
use crate::events::price::PriceEvent;
use crate::store::observations::PriceStore;

/// Tails the price-event topic and recomputes the moving average for each
/// symbol that trades. Runs as a supervised background task; per-message
/// failures are logged and skipped, never fatal.
pub struct PriceEventConsumer {
    consumer: StreamConsumer,
    store: PriceStore,
    window: usize,
}

impl PriceEventConsumer {
    pub fn new(config: &KafkaConfig, store: PriceStore, window: usize) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| Error::Kafka(e.to_string()))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| Error::Kafka(e.to_string()))?;

        Ok(PriceEventConsumer {
            consumer,
            store,
            window,
        })
    }

    pub async fn run(self) {
        info!("Price event consumer started");

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    let Some(payload) = message.payload() else {
                        warn!("Skipping price event with empty payload");
                        continue;
                    };

                    match serde_json::from_slice::<PriceEvent>(payload) {
                        Ok(event) => self.handle_event(&event).await,
                        Err(e) => warn!("Failed to decode price event: {}", e),
                    }
                }
                Err(e) => {
                    error!("Kafka consumer error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_event(&self, event: &PriceEvent) {
        match self.store.moving_average(&event.symbol, self.window).await {
            Ok(Some(avg)) => {
                info!(
                    "Moving average for {} (window {}): {:.4}",
                    event.symbol, self.window, avg
                );
            }
            Ok(None) => {
                info!(
                    "Not enough observations for {} moving average yet",
                    event.symbol
                );
            }
            Err(e) => warn!("Moving average for {} failed: {}", event.symbol, e),
        }
    }
}
