pub mod ingest_model;
pub mod ingest_service;
pub mod ingest_traits;

pub use ingest_model::{CashMovement, IngestionSummary, StatementRecord, Transaction};
pub use ingest_service::IngestionService;
pub use ingest_traits::{
    CashMovementRepositoryTrait, StatementRepositoryTrait, TransactionRepositoryTrait,
};
