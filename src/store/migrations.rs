use crate::error::Result;
use crate::store::DbPool;

/// Bootstrap the observation schema. Idempotent, runs at startup.
pub async fn init_schema(pool: &DbPool) -> Result<()> {
    let client = pool.get().await?;

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS market_data (
                id BIGSERIAL PRIMARY KEY,
                symbol TEXT NOT NULL,
                price DOUBLE PRECISION NOT NULL,
                volume BIGINT NOT NULL,
                source TEXT NOT NULL,
                raw_data TEXT,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT market_data_symbol_not_empty CHECK (symbol <> ''),
                CONSTRAINT market_data_price_non_negative CHECK (price >= 0),
                CONSTRAINT market_data_volume_positive CHECK (volume > 0)
            );
            CREATE INDEX IF NOT EXISTS idx_market_data_symbol
                ON market_data (symbol);
            CREATE INDEX IF NOT EXISTS idx_market_data_symbol_ts
                ON market_data (symbol, timestamp DESC);",
        )
        .await?;

    tracing::info!("Observation schema ready");
    Ok(())
}
