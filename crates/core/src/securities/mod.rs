//! Securities module - identity model, reference catalogs, and resolver.

pub mod resolver;
pub mod securities_model;
pub mod securities_traits;


pub use resolver::{default_kind_for_foreign_isin, IdentityResolver};
pub use securities_model::{
    debt_percent_to_price, is_isin_shaped, is_valid_isin, SecurityIdentity, SecurityKind,
};
pub use securities_traits::{CatalogEntry, MarketReferenceTrait, SecurityCatalogTrait};
