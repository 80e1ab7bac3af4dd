//! Traits for the external reference catalogs and the market gateway.
//!
//! The catalogs (one per security kind) and the on-demand market refresh
//! are owned by collaborator crates; the core only consumes them.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One row of a reference catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub isin: String,
    /// Exchange ticker (secid) used for quote lookups.
    pub ticker: Option<String>,
    pub name: Option<String>,
    /// Face value; populated by the debt catalog.
    pub nominal: Option<Decimal>,
    /// Price display precision, when the market publishes one.
    pub decimals: Option<u32>,
}

/// Trait defining the contract for a local reference catalog. There is one
/// implementation per security kind (equity catalog, debt catalog).
#[async_trait]
pub trait SecurityCatalogTrait: Send + Sync {
    fn find_by_isin(&self, isin: &str) -> Result<Option<CatalogEntry>>;
    fn find_by_ticker(&self, ticker: &str) -> Result<Option<CatalogEntry>>;
}

/// Trait for the on-demand remote refresh of the debt catalog.
///
/// Implementations perform an idempotent upsert into the catalog and return
/// whether the instrument was found upstream. Transport concerns (tokens,
/// retry, rate limiting, timeouts) live entirely in the implementation.
#[async_trait]
pub trait MarketReferenceTrait: Send + Sync {
    async fn refresh_debt_by_isin(&self, isin: &str) -> Result<bool>;
}
