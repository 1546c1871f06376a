pub mod evm;
pub mod solana;
pub mod tron;

pub use evm::EvmAdapter;
pub use solana::SolanaAdapter;
pub use tron::TronAdapter;

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Bytes, U256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::constants::{RPC_RETRY_BASE_MS, RPC_RETRY_MAX_ATTEMPTS};
use crate::error::{EngineError, Result};
use crate::models::{Chain, TokenRef, TokenSymbol};

/// Allowance reads degrade to `Unsupported` on chains without a readable
/// allowance primitive; the orchestrator then defers to the submit path's
/// own success signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowanceState {
    Known(U256),
    Unsupported,
}

/// Chain-specific approval payload handed to the wallet provider for
/// signing. The Solana variant carries the delegation intent only; the
/// wallet adapter constructs and signs the SPL approve transaction itself.
#[derive(Debug, Clone)]
pub enum UnsignedApproval {
    Evm {
        chain: Chain,
        tx: TypedTransaction,
    },
    Solana {
        owner: String,
        delegate: String,
        mint: String,
        amount: u64,
    },
    Tron {
        transaction: serde_json::Value,
    },
}

#[derive(Debug, Clone)]
pub enum SignedApproval {
    Evm { raw_tx: Bytes },
    Solana { transaction_b64: String },
    Tron { transaction: serde_json::Value },
}

/// Broadcast reference used to await finality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationHandle {
    pub chain: Chain,
    pub tx_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    TimedOut,
    Reverted,
}

/// Wallet-provider seam. Signing may fail with `UserRejected`, which is
/// terminal for the attempt.
#[async_trait]
pub trait ApprovalSigner: Send + Sync {
    async fn sign(&self, request: &UnsignedApproval) -> Result<SignedApproval>;
}

/// Uniform capability set over one chain's RPC surface.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    /// Capability flag: chains without a readable allowance always proceed
    /// to signing on user request.
    fn supports_allowance_read(&self) -> bool;

    /// Empty accounts are a valid zero, never an error.
    async fn native_balance(&self, address: &str) -> Result<U256>;

    /// Returns `(raw, decimals)`. A token account that does not exist is a
    /// valid zero balance.
    async fn token_balance(&self, address: &str, token: &TokenRef) -> Result<(U256, u32)>;

    async fn allowance(
        &self,
        owner: &str,
        spender: &str,
        token: &TokenRef,
    ) -> Result<AllowanceState>;

    /// Builds the unlimited-delegation approval payload (maximum
    /// representable unsigned amount for the chain's native width).
    async fn build_approval(
        &self,
        owner: &str,
        spender: &str,
        token: &TokenRef,
    ) -> Result<UnsignedApproval>;

    async fn submit_approval(&self, signed: SignedApproval) -> Result<ConfirmationHandle>;

    async fn confirm(
        &self,
        handle: &ConfirmationHandle,
        timeout: Duration,
    ) -> Result<ConfirmationOutcome>;
}

/// Bounded exponential backoff, transport-class failures only. Application
/// failures (malformed address, unknown contract) fail on the first attempt.
pub(crate) async fn with_retry<T, F, Fut>(label: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < RPC_RETRY_MAX_ATTEMPTS => {
                let backoff = Duration::from_millis(RPC_RETRY_BASE_MS << (attempt - 1));
                tracing::debug!(
                    "{} transient failure (attempt {}/{}), backing off {}ms: {}",
                    label,
                    attempt,
                    RPC_RETRY_MAX_ATTEMPTS,
                    backoff.as_millis(),
                    err
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Maps a provider error string into the engine taxonomy by failure class.
pub(crate) fn classify_rpc_error(message: String) -> EngineError {
    if crate::error::looks_like_transient_rpc_error(&message) {
        EngineError::RpcUnavailable(message)
    } else {
        EngineError::Internal(message)
    }
}

/// Holds the four adapter variants plus the per-chain token references and
/// custodial spender addresses resolved from configuration.
pub struct AdapterRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
    tokens: HashMap<(Chain, TokenSymbol), TokenRef>,
    spenders: HashMap<Chain, String>,
}

impl AdapterRegistry {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut adapters: HashMap<Chain, Arc<dyn ChainAdapter>> = HashMap::new();
        adapters.insert(
            Chain::Ethereum,
            Arc::new(EvmAdapter::new(
                Chain::Ethereum,
                &config.ethereum_rpc_url,
                config.ethereum_chain_id,
            )?),
        );
        adapters.insert(
            Chain::Bsc,
            Arc::new(EvmAdapter::new(
                Chain::Bsc,
                &config.bsc_rpc_url,
                config.bsc_chain_id,
            )?),
        );
        adapters.insert(
            Chain::Solana,
            Arc::new(SolanaAdapter::new(config.solana_rpc_url.clone())),
        );
        adapters.insert(
            Chain::Tron,
            Arc::new(TronAdapter::new(config.tron_api_url.clone())),
        );

        let mut tokens = HashMap::new();
        tokens.insert(
            (Chain::Ethereum, TokenSymbol::Usdc),
            TokenRef(config.ethereum_usdc_address.clone()),
        );
        tokens.insert(
            (Chain::Ethereum, TokenSymbol::Usdt),
            TokenRef(config.ethereum_usdt_address.clone()),
        );
        tokens.insert(
            (Chain::Bsc, TokenSymbol::Usdc),
            TokenRef(config.bsc_usdc_address.clone()),
        );
        tokens.insert(
            (Chain::Bsc, TokenSymbol::Usdt),
            TokenRef(config.bsc_usdt_address.clone()),
        );
        tokens.insert(
            (Chain::Solana, TokenSymbol::Usdc),
            TokenRef(config.solana_usdc_mint.clone()),
        );
        tokens.insert(
            (Chain::Solana, TokenSymbol::Usdt),
            TokenRef(config.solana_usdt_mint.clone()),
        );
        tokens.insert(
            (Chain::Tron, TokenSymbol::Usdc),
            TokenRef(config.tron_usdc_address.clone()),
        );
        tokens.insert(
            (Chain::Tron, TokenSymbol::Usdt),
            TokenRef(config.tron_usdt_address.clone()),
        );

        let mut spenders = HashMap::new();
        spenders.insert(Chain::Ethereum, config.ethereum_spender_address.clone());
        spenders.insert(Chain::Bsc, config.bsc_spender_address.clone());
        spenders.insert(Chain::Solana, config.solana_spender_address.clone());
        spenders.insert(Chain::Tron, config.tron_spender_address.clone());

        Ok(Self {
            adapters,
            tokens,
            spenders,
        })
    }

    /// Test/bench constructor taking prebuilt adapters.
    pub fn with_adapters(
        adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
        tokens: HashMap<(Chain, TokenSymbol), TokenRef>,
        spenders: HashMap<Chain, String>,
    ) -> Self {
        Self {
            adapters,
            tokens,
            spenders,
        }
    }

    pub fn adapter(&self, chain: Chain) -> Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("no adapter registered for {}", chain)))
    }

    pub fn token_ref(&self, chain: Chain, symbol: TokenSymbol) -> Option<&TokenRef> {
        self.tokens.get(&(chain, symbol))
    }

    pub fn spender(&self, chain: Chain) -> Result<&str> {
        self.spenders
            .get(&chain)
            .map(String::as_str)
            .ok_or_else(|| EngineError::Internal(format!("no spender configured for {}", chain)))
    }
}
