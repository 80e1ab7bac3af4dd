pub mod quotes_traits;
pub mod sync;

pub use quotes_traits::QuoteProviderTrait;
pub use sync::{PriceSyncService, PriceSyncSummary};
