use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price event published to the broker whenever an observation is written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceEvent {
    pub symbol: String,
    pub price: f64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl PriceEvent {
    pub fn new(symbol: impl Into<String>, price: f64, source: impl Into<String>) -> Self {
        PriceEvent {
            symbol: symbol.into(),
            price,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}
