use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Data metrics
    pub static ref MARKET_DATA_POINTS: Counter = Counter::new(
        "market_data_points_total",
        "Total number of market data points"
    ).unwrap();

    pub static ref SYMBOLS_TRACKED: IntGauge = IntGauge::new(
        "symbols_tracked",
        "Number of symbols being tracked"
    ).unwrap();

    pub static ref POLLING_JOBS_ACTIVE: IntGauge = IntGauge::new(
        "polling_jobs_active",
        "Number of active polling jobs"
    ).unwrap();

    // HTTP metrics
    pub static ref HTTP_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint"]
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "Duration of HTTP requests"
        ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY.register(Box::new(MARKET_DATA_POINTS.clone())).unwrap();
    REGISTRY.register(Box::new(SYMBOLS_TRACKED.clone())).unwrap();
    REGISTRY.register(Box::new(POLLING_JOBS_ACTIVE.clone())).unwrap();
    REGISTRY.register(Box::new(HTTP_REQUESTS.clone())).unwrap();
    REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone())).unwrap();
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metrics() {
        // Registration is idempotent per process; ignore the duplicate
        // error when another test got there first.
        let _ = REGISTRY.register(Box::new(MARKET_DATA_POINTS.clone()));
        MARKET_DATA_POINTS.inc();
        let text = render();
        assert!(text.contains("market_data_points_total"));
    }
}
