pub mod consumer;
pub mod producer;

pub use consumer::PriceEventConsumer;
pub use producer::{KafkaEventPublisher, NoopPublisher};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::KafkaConfig;
use crate::interfaces::event_publisher::EventPublisher;

/// Select the publisher implementation at startup.
pub fn build_publisher(config: &KafkaConfig) -> Arc<dyn EventPublisher> {
    if !config.enabled {
        debug!("Event fan-out disabled by configuration");
        return Arc::new(NoopPublisher);
    }
    match KafkaEventPublisher::new(&config.brokers, &config.topic) {
        Ok(publisher) => Arc::new(publisher),
        Err(e) => {
            warn!("Falling back to no-op publisher: {}", e);
            Arc::new(NoopPublisher)
        }
    }
}
