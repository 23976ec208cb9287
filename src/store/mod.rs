use deadpool_postgres::{Manager, ManagerConfig, RecyclingMethod};
use tokio_postgres::NoTls;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

pub mod analytics;
pub mod migrations;
pub mod observations;

pub use observations::PriceStore;

pub type DbPool = deadpool_postgres::Pool;

/// Create the connection pool for the observation table.
pub fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let pg_config: tokio_postgres::Config = config
        .url
        .parse()
        .map_err(|e: tokio_postgres::Error| Error::Config(e.to_string()))?;

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    deadpool_postgres::Pool::builder(manager)
        .max_size(config.pool_size)
        .build()
        .map_err(|e| Error::Pool(e.to_string()))
}
