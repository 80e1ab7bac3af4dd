use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::errors::Result;
use crate::holdings::holdings_model::Holding;

/// Storage abstraction for holdings.
#[async_trait]
pub trait HoldingRepositoryTrait: Send + Sync {
    fn list_by_portfolio(&self, portfolio_id: &str) -> Result<Vec<Holding>>;

    fn list_all(&self) -> Result<Vec<Holding>>;

    fn find_by_portfolio_and_isin(&self, portfolio_id: &str, isin: &str)
        -> Result<Option<Holding>>;

    async fn delete_by_portfolio(&self, portfolio_id: &str) -> Result<usize>;

    async fn save(&self, holding: Holding) -> Result<Holding>;

    async fn update_average_price(&self, id: &str, average_price: Option<Decimal>) -> Result<()>;

    /// Touches only the price fields; quantity and cost basis are untouched.
    async fn update_last_price(
        &self,
        id: &str,
        price: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<()>;
}
