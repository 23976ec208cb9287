use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn, Instrument};

use crate::error::{Error, Result};
use crate::observability::tracing::trace_poll_cycle;
use crate::polling::registry::PollingRegistry;

/// Perpetual polling loop for one job: fetch every symbol, then sleep the
/// full interval, forever. Stops when the registry entry disappears; an
/// abort from delete lands on whichever sleep is in flight.
pub(crate) async fn run(
    registry: Arc<PollingRegistry>,
    job_id: String,
    interval: Duration,
    fetch_delay: Duration,
) {
    loop {
        let Some(symbols) = registry.begin_cycle(&job_id) else {
            info!("Polling job {} is gone, stopping", job_id);
            break;
        };

        let cycle = run_cycle(&job_id, &symbols, fetch_delay).instrument(trace_poll_cycle(&job_id));
        match cycle.await {
            Ok(fetched) => {
                registry.complete_cycle(&job_id, fetched);
                debug!("Polling job {} completed a cycle ({} fetched)", job_id, fetched);
            }
            Err(e) => {
                warn!("Polling job {} cycle failed: {}", job_id, e);
                registry.fail_cycle(&job_id, e.to_string());
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// One cycle: a simulated fetch per symbol, each preceded by the
/// provider-latency delay.
async fn run_cycle(job_id: &str, symbols: &[String], fetch_delay: Duration) -> Result<usize> {
    for symbol in symbols {
        tokio::time::sleep(fetch_delay).await;
        let price = simulate_fetch(symbol)?;
        debug!("Job {}: fetched price for {}: {:.2}", job_id, symbol, price);
    }
    Ok(symbols.len())
}

/// Stand-in for the external provider call.
fn simulate_fetch(symbol: &str) -> Result<f64> {
    if symbol.trim().is_empty() {
        return Err(Error::Internal(format!(
            "cannot fetch blank symbol {:?}",
            symbol
        )));
    }
    let jitter: f64 = rand::thread_rng().gen_range(-10.0..10.0);
    Ok(100.0 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_price_stays_in_band() {
        for _ in 0..100 {
            let price = simulate_fetch("AAPL").unwrap();
            assert!((90.0..110.0).contains(&price));
        }
    }

    #[test]
    fn blank_symbol_fails_the_fetch() {
        assert!(simulate_fetch("").is_err());
        assert!(simulate_fetch("   ").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_counts_every_symbol() {
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string(), "GOOG".to_string()];
        let fetched = run_cycle("poll_t", &symbols, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(fetched, 3);
    }

    #[tokio::test]
    async fn empty_cycle_is_a_no_op() {
        let fetched = run_cycle("poll_t", &[], Duration::from_secs(1)).await.unwrap();
        assert_eq!(fetched, 0);
    }
}
