use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use market_data_service::api::auth::AuthGate;
use market_data_service::api::rate_limit::RateLimiter;
use market_data_service::api::rest::{self, ApiState};
use market_data_service::cache;
use market_data_service::config::AppConfig;
use market_data_service::event_log::{self, PriceEventConsumer};
use market_data_service::observability::metrics;
use market_data_service::polling::PollingRegistry;
use market_data_service::store::{self, migrations, PriceStore};
use market_data_service::utils::retry::RetryPolicy;
use market_data_service::utils::task_supervisor::TaskSupervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let env = std::env::var("MDS_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    metrics::register_metrics();

    let pool = store::create_pool(&config.database).context("creating database pool")?;

    // Dependencies may still be coming up; bounded retries at startup only.
    let retry = RetryPolicy::new(3, Duration::from_secs(1));
    retry
        .run(|| migrations::init_schema(&pool))
        .await
        .context("initializing schema")?;

    let store = PriceStore::new(pool);

    let price_cache = cache::build(&config.redis);
    if config.redis.enabled {
        let probe = retry
            .run(|| {
                let cache = price_cache.clone();
                async move {
                    if cache.ping().await {
                        Ok(())
                    } else {
                        Err("cache ping failed".to_string())
                    }
                }
            })
            .await;
        match probe {
            Ok(()) => tracing::info!("Price cache connected"),
            Err(_) => tracing::warn!("Price cache unreachable, running degraded"),
        }
    }

    let publisher = event_log::build_publisher(&config.kafka);
    let registry = PollingRegistry::new(&config.polling);
    let rate_limiter = RateLimiter::new(&config.redis, &config.rate_limit);
    let auth = AuthGate::from_config(&config.auth).context("building auth table")?;

    let background = Arc::new(Mutex::new(TaskSupervisor::new()));
    if config.kafka.consumer_enabled {
        match PriceEventConsumer::new(&config.kafka, store.clone(), config.analytics.default_window)
        {
            Ok(consumer) => {
                background
                    .lock()
                    .unwrap()
                    .spawn("price_event_consumer", consumer.run());
            }
            Err(e) => tracing::warn!("Price event consumer not started: {}", e),
        }
    }
    spawn_supervisor_watchdog(Arc::clone(&background));

    let state = Arc::new(ApiState {
        store,
        cache: price_cache,
        publisher,
        registry,
        auth,
        rate_limiter,
        background: Arc::clone(&background),
        default_window: config.analytics.default_window,
        default_interval: config.polling.default_interval_secs,
    });

    let app = rest::create_router(state).layer(build_cors(&config.server.cors_origins));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("invalid bind address")?;

    tracing::info!(
        "{} v{} listening on http://{}",
        market_data_service::SERVICE_NAME,
        market_data_service::SERVICE_VERSION,
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    background.lock().unwrap().shutdown_all();
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping");
}

/// Periodically notice supervised background tasks that died on their own.
fn spawn_supervisor_watchdog(supervisor: Arc<Mutex<TaskSupervisor>>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            if let Err(e) = supervisor.lock().unwrap().check_health() {
                tracing::error!("Background task failure: {}", e);
            }
        }
    });
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}
