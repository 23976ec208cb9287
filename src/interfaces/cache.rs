use async_trait::async_trait;

/// Read-through cache for latest prices.
///
/// The contract is fail-open: implementations never surface transport
/// errors. An unreachable or slow backend looks like a plain miss to
/// callers (`None` / `false`), so the primary read/write path can never
/// be blocked by the cache.
#[async_trait]
pub trait PriceCache: Send + Sync {
    /// Cached latest price for a symbol, if present and reachable.
    async fn get_price(&self, symbol: &str) -> Option<f64>;

    /// Cache the latest price. Returns whether the write took effect.
    async fn set_price(&self, symbol: &str, price: f64) -> bool;

    /// Backend reachability, for startup probes.
    async fn ping(&self) -> bool;
}

#[cfg(test)]
mockall::mock! {
    pub Cache {}

    #[async_trait]
    impl PriceCache for Cache {
        async fn get_price(&self, symbol: &str) -> Option<f64>;
        async fn set_price(&self, symbol: &str, price: f64) -> bool;
        async fn ping(&self) -> bool;
    }
}
