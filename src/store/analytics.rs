use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::observations::PriceStore;

impl PriceStore {
    /// Trailing moving average over the `window` most recent observations
    /// for a symbol. `None` when fewer than `window` observations exist;
    /// insufficient data is a not-found condition, not an error. Exactly
    /// `window` rows is sufficient.
    pub async fn moving_average(&self, symbol: &str, window: usize) -> Result<Option<f64>> {
        if window == 0 {
            return Ok(None);
        }

        let prices = self.recent_prices(symbol, window).await?;
        if prices.len() < window {
            return Ok(None);
        }
        Ok(Some(mean(&prices)))
    }

    /// Timestamp of the most recent observation for a symbol; response
    /// metadata only.
    pub async fn latest_timestamp(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        let client = self.pool().get().await?;
        let row = client
            .query_opt(
                "SELECT timestamp FROM market_data
                 WHERE symbol = $1
                 ORDER BY timestamp DESC
                 LIMIT 1",
                &[&symbol],
            )
            .await?;
        Ok(row.map(|r| r.get("timestamp")))
    }

    async fn recent_prices(&self, symbol: &str, window: usize) -> Result<Vec<f64>> {
        let client = self.pool().get().await?;
        let limit = window as i64;
        let rows = client
            .query(
                "SELECT price FROM market_data
                 WHERE symbol = $1
                 ORDER BY timestamp DESC
                 LIMIT $2",
                &[&symbol, &limit],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get("price")).collect())
    }
}

/// Arithmetic mean. Callers guarantee a non-empty slice.
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mean_of_consecutive_prices() {
        // Prices 150..=154, window 5.
        let prices = [154.0, 153.0, 152.0, 151.0, 150.0];
        assert_eq!(mean(&prices), 152.0);
    }

    #[test]
    fn mean_of_single_price() {
        assert_eq!(mean(&[42.5]), 42.5);
    }

    proptest! {
        #[test]
        fn mean_is_bounded_by_extremes(
            prices in proptest::collection::vec(0.0f64..1_000_000.0, 1..100)
        ) {
            let m = mean(&prices);
            let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(m >= min - 1e-9);
            prop_assert!(m <= max + 1e-9);
        }

        #[test]
        fn mean_matches_naive_sum(
            prices in proptest::collection::vec(0.0f64..10_000.0, 1..50)
        ) {
            let naive: f64 = prices.iter().sum::<f64>() / prices.len() as f64;
            prop_assert!((mean(&prices) - naive).abs() < 1e-9);
        }
    }
}
