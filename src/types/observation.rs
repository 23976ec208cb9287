use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One stored market price record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketObservation {
    pub id: i64,
    pub symbol: String,
    pub price: f64,
    pub volume: i64,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Payload for creating an observation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewObservation {
    pub symbol: String,
    pub price: f64,
    pub volume: i64,
    pub source: String,
    #[serde(default)]
    pub raw_data: Option<String>,
}

impl NewObservation {
    /// Boundary validation: rejected payloads never reach the store.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Validation("symbol must not be empty".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::Validation("price must be >= 0".to_string()));
        }
        if self.volume <= 0 {
            return Err(Error::Validation("volume must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Partial update: only supplied fields change.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObservationUpdate {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub raw_data: Option<String>,
}

impl ObservationUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(symbol) = &self.symbol {
            if symbol.trim().is_empty() {
                return Err(Error::Validation("symbol must not be empty".to_string()));
            }
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(Error::Validation("price must be >= 0".to_string()));
            }
        }
        if let Some(volume) = self.volume {
            if volume <= 0 {
                return Err(Error::Validation("volume must be > 0".to_string()));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.symbol.is_none()
            && self.price.is_none()
            && self.volume.is_none()
            && self.source.is_none()
            && self.raw_data.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NewObservation {
        NewObservation {
            symbol: "AAPL".to_string(),
            price: 150.0,
            volume: 1000,
            source: "test_source".to_string(),
            raw_data: None,
        }
    }

    #[test]
    fn accepts_valid_observation() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_negative_price() {
        let mut obs = valid();
        obs.price = -1.0;
        assert!(matches!(obs.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_nan_price() {
        let mut obs = valid();
        obs.price = f64::NAN;
        assert!(matches!(obs.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_zero_volume() {
        let mut obs = valid();
        obs.volume = 0;
        assert!(matches!(obs.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_blank_symbol() {
        let mut obs = valid();
        obs.symbol = "   ".to_string();
        assert!(matches!(obs.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn zero_price_is_allowed() {
        let mut obs = valid();
        obs.price = 0.0;
        assert!(obs.validate().is_ok());
    }

    #[test]
    fn update_validates_only_supplied_fields() {
        let update = ObservationUpdate {
            price: Some(-2.0),
            ..Default::default()
        };
        assert!(update.validate().is_err());

        let update = ObservationUpdate {
            source: Some("reuters".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
        assert!(!update.is_empty());
        assert!(ObservationUpdate::default().is_empty());
    }
}
