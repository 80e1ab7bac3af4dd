//! Security identity resolution.
//!
//! Resolves an ISIN (plus whatever hints the source statement carries) to a
//! canonical [`SecurityIdentity`]. Resolution order:
//!
//! 1. local debt catalog by ISIN
//! 2. local equity catalog by ISIN
//! 3. for domestic ISINs absent from both: on-demand remote refresh of the
//!    debt catalog for that one ISIN, then retry 1-2
//! 4. kind hint from the statement's own reference table
//! 5. foreign ISINs default to equity
//!
//! Anything past that is a hard `UnresolvedIdentity` failure - the caller
//! must not guess.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::constants::DOMESTIC_ISIN_PREFIX;
use crate::errors::ResolutionError;
use crate::securities::securities_model::{is_isin_shaped, SecurityIdentity, SecurityKind};
use crate::securities::securities_traits::{
    CatalogEntry, MarketReferenceTrait, SecurityCatalogTrait,
};
use crate::Result;

/// Defaulting policy for ISINs outside the domestic market: foreign
/// instruments reaching these statements (ETFs, depositary receipts) are
/// treated as equity. Returns `None` for domestic ISINs - those must be
/// resolved through the catalogs or the statement hints.
pub fn default_kind_for_foreign_isin(isin: &str) -> Option<SecurityKind> {
    if is_isin_shaped(isin) && !isin.starts_with(DOMESTIC_ISIN_PREFIX) {
        Some(SecurityKind::Equity)
    } else {
        None
    }
}

/// Resolves ISINs against the local reference catalogs, with an on-demand
/// remote refresh as fallback for domestic instruments.
pub struct IdentityResolver {
    debt_catalog: Arc<dyn SecurityCatalogTrait>,
    equity_catalog: Arc<dyn SecurityCatalogTrait>,
    market_reference: Arc<dyn MarketReferenceTrait>,
}

impl IdentityResolver {
    pub fn new(
        debt_catalog: Arc<dyn SecurityCatalogTrait>,
        equity_catalog: Arc<dyn SecurityCatalogTrait>,
        market_reference: Arc<dyn MarketReferenceTrait>,
    ) -> Self {
        Self {
            debt_catalog,
            equity_catalog,
            market_reference,
        }
    }

    /// Resolves `isin` to a canonical identity.
    ///
    /// `statement_hints` is the ISIN -> kind map parsed from the statement's
    /// own reference table; it is consulted only after the catalogs and the
    /// remote refresh, because a successful refresh yields the richer record
    /// (nominal, ticker). A refresh failure degrades to "not found" and
    /// never masks an available hint.
    pub async fn resolve(
        &self,
        isin: &str,
        name_hint: Option<&str>,
        statement_hints: &HashMap<String, SecurityKind>,
    ) -> Result<SecurityIdentity> {
        if let Some(identity) = self.lookup_catalogs(isin)? {
            return Ok(identity);
        }

        if isin.starts_with(DOMESTIC_ISIN_PREFIX) {
            debug!("ISIN {} not in local catalogs, trying market refresh", isin);
            match self.market_reference.refresh_debt_by_isin(isin).await {
                Ok(true) => {
                    if let Some(identity) = self.lookup_catalogs(isin)? {
                        info!("ISIN {} resolved after market refresh", isin);
                        return Ok(identity);
                    }
                    warn!(
                        "Market refresh reported success for ISIN {} but the catalog still misses it",
                        isin
                    );
                }
                Ok(false) => debug!("Market refresh found nothing for ISIN {}", isin),
                Err(e) => warn!("Market refresh failed for ISIN {}: {}", isin, e),
            }
        }

        if let Some(kind) = statement_hints.get(isin) {
            debug!("ISIN {} resolved as {} from statement hints", isin, kind);
            return Ok(self.identity_from_hint(isin, *kind, name_hint));
        }

        if let Some(kind) = default_kind_for_foreign_isin(isin) {
            debug!("Foreign ISIN {} defaulted to {}", isin, kind);
            return Ok(self.identity_from_hint(isin, kind, name_hint));
        }

        Err(ResolutionError::UnresolvedIdentity {
            isin: isin.to_string(),
            name: name_hint.unwrap_or_default().to_string(),
        }
        .into())
    }

    fn lookup_catalogs(&self, isin: &str) -> Result<Option<SecurityIdentity>> {
        if let Some(entry) = self.debt_catalog.find_by_isin(isin)? {
            return Ok(Some(identity_from_entry(isin, SecurityKind::Debt, entry)));
        }
        if let Some(entry) = self.equity_catalog.find_by_isin(isin)? {
            return Ok(Some(identity_from_entry(isin, SecurityKind::Equity, entry)));
        }
        Ok(None)
    }

    fn identity_from_hint(
        &self,
        isin: &str,
        kind: SecurityKind,
        name_hint: Option<&str>,
    ) -> SecurityIdentity {
        SecurityIdentity {
            isin: isin.to_string(),
            kind,
            name: name_hint
                .filter(|n| !n.is_empty())
                .unwrap_or(isin)
                .to_string(),
            nominal: None,
            decimals: None,
        }
    }
}

fn identity_from_entry(isin: &str, kind: SecurityKind, entry: CatalogEntry) -> SecurityIdentity {
    SecurityIdentity {
        isin: isin.to_string(),
        kind,
        name: entry.name.unwrap_or_else(|| isin.to_string()),
        nominal: entry.nominal,
        decimals: entry.decimals,
    }
}
