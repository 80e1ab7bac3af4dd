use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::Result;
use crate::ingest::ingest_model::{CashMovement, StatementRecord, Transaction};

/// Storage abstraction for statement metadata.
#[async_trait]
pub trait StatementRepositoryTrait: Send + Sync {
    fn find_by_period(
        &self,
        portfolio_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<StatementRecord>>;

    /// Statements whose period shares at least one day with `[start, end]`.
    fn find_overlapping(
        &self,
        portfolio_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StatementRecord>>;

    fn max_period_end(&self, portfolio_id: &str) -> Result<Option<NaiveDate>>;

    /// Ingested statements of the portfolio, newest period first.
    fn list_by_portfolio(&self, portfolio_id: &str) -> Result<Vec<StatementRecord>>;

    async fn save(&self, record: StatementRecord) -> Result<StatementRecord>;
}

/// Storage abstraction for persisted trades.
#[async_trait]
pub trait TransactionRepositoryTrait: Send + Sync {
    /// All transactions of the portfolio, ordered by trade date ascending.
    fn list_by_portfolio(&self, portfolio_id: &str) -> Result<Vec<Transaction>>;

    fn trade_number_exists(&self, portfolio_id: &str, trade_number: &str) -> Result<bool>;

    async fn save(&self, transaction: Transaction) -> Result<Transaction>;
}

/// Storage abstraction for cash movements.
#[async_trait]
pub trait CashMovementRepositoryTrait: Send + Sync {
    fn list_by_portfolio(&self, portfolio_id: &str) -> Result<Vec<CashMovement>>;

    async fn save_all(&self, movements: Vec<CashMovement>) -> Result<usize>;

    /// Deletes all movements owned by a statement; returns how many went.
    async fn delete_by_statement(&self, statement_id: &str) -> Result<usize>;
}
