pub mod aggregator;
pub mod backend;
pub mod orchestrator;
pub mod reconciler;

pub use aggregator::BalanceAggregator;
pub use backend::{ApprovalStore, HttpBackend, StoredApprovalStatus, WalletRegistry};
pub use orchestrator::ApprovalOrchestrator;
pub use reconciler::WalletLinkReconciler;
