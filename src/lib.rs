//! Cross-chain balance and delegation engine.
//!
//! One adapter per supported chain (Ethereum, BSC, Solana, Tron) behind a
//! common trait, with services layered on top: concurrent balance
//! aggregation, the token-approval state machine, and reconciliation of
//! connected wallets against the backend registry.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chains;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod normalize;
pub mod services;
pub mod session;

pub use chains::{AdapterRegistry, AllowanceState, ApprovalSigner, ChainAdapter};
pub use config::Config;
pub use error::{EngineError, Result};
pub use models::{Chain, Snapshot, TokenBalance, TokenSymbol};
pub use services::{ApprovalOrchestrator, BalanceAggregator, HttpBackend, WalletLinkReconciler};
pub use session::SessionContext;

/// Initialize tracing. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omnilink_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
