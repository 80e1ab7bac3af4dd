use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::securities::SecurityKind;

/// One security position in one portfolio. Unique per (portfolio, ISIN).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: String,
    pub portfolio_id: String,
    pub isin: String,
    pub kind: SecurityKind,
    pub name: String,
    pub currency: String,
    /// Net position size; never negative or zero in persisted state.
    pub quantity: Decimal,
    /// Weighted-average acquisition price. `None` until the first resolvable
    /// purchase; preserved across snapshot replacement.
    pub average_price: Option<Decimal>,
    pub last_known_price: Option<Decimal>,
    pub price_updated_at: Option<DateTime<Utc>>,
}

impl Holding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        portfolio_id: &str,
        isin: &str,
        kind: SecurityKind,
        name: &str,
        currency: &str,
        quantity: Decimal,
        average_price: Option<Decimal>,
        last_known_price: Option<Decimal>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            portfolio_id: portfolio_id.to_string(),
            isin: isin.to_string(),
            kind,
            name: name.to_string(),
            currency: currency.to_string(),
            quantity,
            average_price,
            last_known_price,
            price_updated_at: last_known_price.map(|_| Utc::now()),
        }
    }
}
