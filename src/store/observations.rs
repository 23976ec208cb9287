use tokio_postgres::Row;

use crate::error::Result;
use crate::store::DbPool;
use crate::types::observation::{MarketObservation, NewObservation, ObservationUpdate};

/// PostgreSQL-backed store of market observations.
///
/// Storage failures propagate to the caller unrecovered; retries and
/// degradation are the caller's business, not the store's.
#[derive(Clone)]
pub struct PriceStore {
    pool: DbPool,
}

fn row_to_observation(row: &Row) -> MarketObservation {
    MarketObservation {
        id: row.get("id"),
        symbol: row.get("symbol"),
        price: row.get("price"),
        volume: row.get("volume"),
        source: row.get("source"),
        raw_data: row.get("raw_data"),
        timestamp: row.get("timestamp"),
    }
}

impl PriceStore {
    pub fn new(pool: DbPool) -> Self {
        PriceStore { pool }
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Connectivity probe for the readiness endpoint.
    pub async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Paginated listing, optionally filtered by symbol. Ordered by id so
    /// that skip/limit windows are stable.
    pub async fn list(
        &self,
        symbol: Option<&str>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<MarketObservation>> {
        let client = self.pool.get().await?;

        let rows = match symbol {
            Some(symbol) => {
                client
                    .query(
                        "SELECT id, symbol, price, volume, source, raw_data, timestamp
                         FROM market_data
                         WHERE symbol = $1
                         ORDER BY id
                         OFFSET $2 LIMIT $3",
                        &[&symbol, &skip, &limit],
                    )
                    .await?
            }
            None => {
                client
                    .query(
                        "SELECT id, symbol, price, volume, source, raw_data, timestamp
                         FROM market_data
                         ORDER BY id
                         OFFSET $1 LIMIT $2",
                        &[&skip, &limit],
                    )
                    .await?
            }
        };

        Ok(rows.iter().map(row_to_observation).collect())
    }

    pub async fn create(&self, new: &NewObservation) -> Result<MarketObservation> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO market_data (symbol, price, volume, source, raw_data)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id, symbol, price, volume, source, raw_data, timestamp",
                &[
                    &new.symbol,
                    &new.price,
                    &new.volume,
                    &new.source,
                    &new.raw_data,
                ],
            )
            .await?;
        Ok(row_to_observation(&row))
    }

    pub async fn get(&self, id: i64) -> Result<Option<MarketObservation>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, symbol, price, volume, source, raw_data, timestamp
                 FROM market_data WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_observation))
    }

    /// Partial update: unsupplied fields keep their stored values.
    pub async fn update(
        &self,
        id: i64,
        update: &ObservationUpdate,
    ) -> Result<Option<MarketObservation>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "UPDATE market_data SET
                     symbol   = COALESCE($2, symbol),
                     price    = COALESCE($3, price),
                     volume   = COALESCE($4, volume),
                     source   = COALESCE($5, source),
                     raw_data = COALESCE($6, raw_data)
                 WHERE id = $1
                 RETURNING id, symbol, price, volume, source, raw_data, timestamp",
                &[
                    &id,
                    &update.symbol,
                    &update.price,
                    &update.volume,
                    &update.source,
                    &update.raw_data,
                ],
            )
            .await?;
        Ok(row.as_ref().map(row_to_observation))
    }

    /// Returns whether a row was deleted.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute("DELETE FROM market_data WHERE id = $1", &[&id])
            .await?;
        Ok(affected > 0)
    }

    pub async fn latest(&self, symbol: &str) -> Result<Option<MarketObservation>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, symbol, price, volume, source, raw_data, timestamp
                 FROM market_data
                 WHERE symbol = $1
                 ORDER BY timestamp DESC
                 LIMIT 1",
                &[&symbol],
            )
            .await?;
        Ok(row.as_ref().map(row_to_observation))
    }

    pub async fn symbols(&self) -> Result<Vec<String>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT DISTINCT symbol FROM market_data ORDER BY symbol",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get("symbol")).collect())
    }
}
