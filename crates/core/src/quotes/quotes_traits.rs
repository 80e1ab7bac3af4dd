use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::Result;

/// Market-data collaborator. Returns `None` when the venue has no quote for
/// the ticker; transport retry and token handling live behind this trait.
#[async_trait]
pub trait QuoteProviderTrait: Send + Sync {
    async fn get_quote(&self, market: &str, ticker: &str) -> Result<Option<Decimal>>;
}
