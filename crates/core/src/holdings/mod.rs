pub mod holdings_model;
pub mod holdings_traits;
pub mod reconciler;

pub use holdings_model::Holding;
pub use holdings_traits::HoldingRepositoryTrait;
pub use reconciler::PositionReconciler;

#[cfg(test)]
mod reconciler_tests;
