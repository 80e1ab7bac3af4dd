//! Security identity domain models and ISIN validation.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::constants::PRICE_SCALE;

/// Shape of a valid ISIN: two-letter country prefix, nine alphanumeric
/// characters, one check digit.
static ISIN_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").expect("static regex"));

/// Security kind - the only distinction the ledger cares about is whether
/// prices are quoted in currency units (equity) or in percent of nominal
/// (debt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityKind {
    Equity,
    Debt,
}

impl SecurityKind {
    /// Returns the database string representation.
    pub const fn as_db_str(&self) -> &'static str {
        match self {
            SecurityKind::Equity => "EQUITY",
            SecurityKind::Debt => "DEBT",
        }
    }

    /// Parses a security kind from its database string.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "EQUITY" => Some(SecurityKind::Equity),
            "DEBT" => Some(SecurityKind::Debt),
            _ => None,
        }
    }
}

impl std::fmt::Display for SecurityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Canonical identity of a security, resolved once per ISIN within a
/// reconciliation run. The reference catalog that backs it is owned by the
/// storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityIdentity {
    /// 12-character, checksum-valid instrument identifier.
    pub isin: String,
    pub kind: SecurityKind,
    /// Display name; falls back to the ISIN when no source provides one.
    pub name: String,
    /// Face value of a debt instrument, in currency units. `None` for
    /// equities and for debt instruments the catalogs do not know.
    pub nominal: Option<Decimal>,
    /// Decimal precision for price display, when the catalog provides one.
    pub decimals: Option<u32>,
}

/// Checks only the structural shape of an ISIN (length and character
/// classes), without the checksum. This is the row-acceptance gate used by
/// the statement parser: any market's ISIN qualifies.
pub fn is_isin_shaped(code: &str) -> bool {
    code.len() == 12 && ISIN_SHAPE.is_match(code)
}

/// Full ISIN validation: shape plus the Luhn check digit computed over the
/// base-36 expansion of the first eleven characters.
pub fn is_valid_isin(code: &str) -> bool {
    if !is_isin_shaped(code) {
        return false;
    }

    // Expand letters to their base-36 values (A=10 .. Z=35), then run the
    // Luhn algorithm over the resulting digit string, check digit included.
    let mut digits: Vec<u32> = Vec::with_capacity(22);
    for ch in code.chars() {
        let v = ch.to_digit(36).expect("shape already validated");
        if v >= 10 {
            digits.push(v / 10);
            digits.push(v % 10);
        } else {
            digits.push(v);
        }
    }

    let mut sum = 0u32;
    for (i, d) in digits.iter().rev().enumerate() {
        let mut d = *d;
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

/// Converts a percent-of-nominal debt quote to an absolute currency price:
/// `percent * nominal / 100`, rounded half-up to six fractional digits.
pub fn debt_percent_to_price(percent: Decimal, nominal: Decimal) -> Decimal {
    (percent * nominal / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}
