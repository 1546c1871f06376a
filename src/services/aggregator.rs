use chrono::Utc;
use ethers::types::U256;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::chains::AdapterRegistry;
use crate::constants::BALANCE_CALL_TIMEOUT_SECS;
use crate::error::{EngineError, Result};
use crate::models::{Chain, Snapshot, TokenBalance, TokenSymbol};
use crate::normalize::normalize;
use crate::session::QueryToken;

/// Fans one wallet's balance reads out concurrently and assembles a single
/// normalized snapshot. Individual failures degrade to a zero-with-error
/// entry; one bad asset feed never blocks the rest.
pub struct BalanceAggregator {
    registry: Arc<AdapterRegistry>,
}

impl BalanceAggregator {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Returns an immutable snapshot with exactly one entry per requested
    /// asset, native first, then tokens in caller order. The query token is
    /// carried through so late deliveries from an expired context can be
    /// discarded by the caller.
    pub async fn fetch_wallet_snapshot(
        &self,
        query: QueryToken,
        chain: Chain,
        address: &str,
        symbols: &[TokenSymbol],
    ) -> Snapshot {
        let mut ordered: Vec<TokenSymbol> = Vec::with_capacity(symbols.len());
        ordered.extend(symbols.iter().filter(|s| **s == TokenSymbol::Native));
        ordered.extend(symbols.iter().filter(|s| **s != TokenSymbol::Native));

        let futures = ordered.iter().map(|symbol| {
            let symbol = *symbol;
            async move {
                let outcome = tokio::time::timeout(
                    Duration::from_secs(BALANCE_CALL_TIMEOUT_SECS),
                    self.fetch_asset(chain, address, symbol),
                )
                .await;

                match outcome {
                    Ok(Ok((raw, decimals))) => TokenBalance {
                        chain,
                        address: address.to_string(),
                        symbol,
                        raw,
                        decimals,
                        normalized: normalize(raw, decimals),
                        error: None,
                    },
                    Ok(Err(err)) => {
                        tracing::warn!("{} {} balance fetch failed: {}", chain, symbol, err);
                        Self::degraded(chain, address, symbol, err.to_string())
                    }
                    Err(_) => {
                        tracing::debug!(
                            "{} {} balance fetch timed out after {}s",
                            chain,
                            symbol,
                            BALANCE_CALL_TIMEOUT_SECS
                        );
                        Self::degraded(chain, address, symbol, "fetch timed out".to_string())
                    }
                }
            }
        });

        let balances = join_all(futures).await;
        Snapshot {
            chain,
            address: address.to_string(),
            balances,
            fetched_at: Utc::now(),
            query,
        }
    }

    async fn fetch_asset(
        &self,
        chain: Chain,
        address: &str,
        symbol: TokenSymbol,
    ) -> Result<(U256, u32)> {
        let adapter = self.registry.adapter(chain)?;
        match symbol {
            TokenSymbol::Native => {
                let raw = adapter.native_balance(address).await?;
                Ok((raw, chain.native_decimals()))
            }
            token => {
                let token_ref = self.registry.token_ref(chain, token).ok_or_else(|| {
                    EngineError::InvalidInput(format!("no {} contract configured for {}", token, chain))
                })?;
                adapter.token_balance(address, token_ref).await
            }
        }
    }

    fn degraded(chain: Chain, address: &str, symbol: TokenSymbol, error: String) -> TokenBalance {
        TokenBalance {
            chain,
            address: address.to_string(),
            symbol,
            raw: U256::zero(),
            decimals: match symbol {
                TokenSymbol::Native => chain.native_decimals(),
                _ => 6,
            },
            normalized: "0".to_string(),
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{
        AllowanceState, ChainAdapter, ConfirmationHandle, ConfirmationOutcome, SignedApproval,
        UnsignedApproval,
    };
    use crate::models::TokenRef;
    use crate::session::SessionContext;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MockAdapter {
        chain: Chain,
        native: Option<U256>,
        tokens: HashMap<String, (U256, u32)>,
    }

    #[async_trait]
    impl ChainAdapter for MockAdapter {
        fn chain(&self) -> Chain {
            self.chain
        }

        fn supports_allowance_read(&self) -> bool {
            true
        }

        async fn native_balance(&self, _address: &str) -> crate::error::Result<U256> {
            self.native
                .ok_or_else(|| EngineError::RpcUnavailable("native feed down".into()))
        }

        async fn token_balance(
            &self,
            _address: &str,
            token: &TokenRef,
        ) -> crate::error::Result<(U256, u32)> {
            self.tokens
                .get(token.as_str())
                .copied()
                .ok_or_else(|| EngineError::RpcUnavailable("token feed down".into()))
        }

        async fn allowance(
            &self,
            _owner: &str,
            _spender: &str,
            _token: &TokenRef,
        ) -> crate::error::Result<AllowanceState> {
            Ok(AllowanceState::Known(U256::zero()))
        }

        async fn build_approval(
            &self,
            _owner: &str,
            _spender: &str,
            _token: &TokenRef,
        ) -> crate::error::Result<UnsignedApproval> {
            Err(EngineError::Internal("not used".into()))
        }

        async fn submit_approval(
            &self,
            _signed: SignedApproval,
        ) -> crate::error::Result<ConfirmationHandle> {
            Err(EngineError::Internal("not used".into()))
        }

        async fn confirm(
            &self,
            _handle: &ConfirmationHandle,
            _timeout: Duration,
        ) -> crate::error::Result<ConfirmationOutcome> {
            Err(EngineError::Internal("not used".into()))
        }
    }

    fn registry(adapter: MockAdapter) -> Arc<AdapterRegistry> {
        let chain = adapter.chain;
        let mut adapters: HashMap<Chain, Arc<dyn ChainAdapter>> = HashMap::new();
        adapters.insert(chain, Arc::new(adapter));

        let mut tokens = HashMap::new();
        tokens.insert((chain, TokenSymbol::Usdc), TokenRef("usdc-ref".into()));
        tokens.insert((chain, TokenSymbol::Usdt), TokenRef("usdt-ref".into()));

        let mut spenders = HashMap::new();
        spenders.insert(chain, "spender".to_string());

        Arc::new(AdapterRegistry::with_adapters(adapters, tokens, spenders))
    }

    const ALL: [TokenSymbol; 3] = [TokenSymbol::Usdc, TokenSymbol::Native, TokenSymbol::Usdt];

    #[tokio::test]
    async fn snapshot_contains_every_requested_asset_in_order() {
        let mut tokens = HashMap::new();
        tokens.insert("usdc-ref".to_string(), (U256::from(1_500_000u64), 6u32));
        tokens.insert("usdt-ref".to_string(), (U256::from(42_000_000u64), 6u32));
        let registry = registry(MockAdapter {
            chain: Chain::Ethereum,
            native: Some(U256::exp10(18)),
            tokens,
        });

        let session = SessionContext::new();
        let aggregator = BalanceAggregator::new(registry);
        let snapshot = aggregator
            .fetch_wallet_snapshot(session.token(), Chain::Ethereum, "0xabc", &ALL)
            .await;

        assert_eq!(snapshot.balances.len(), 3);
        // Native always leads, remaining tokens keep caller order.
        assert_eq!(snapshot.balances[0].symbol, TokenSymbol::Native);
        assert_eq!(snapshot.balances[0].normalized, "1");
        assert_eq!(snapshot.balances[1].symbol, TokenSymbol::Usdc);
        assert_eq!(snapshot.balances[1].normalized, "1.5");
        assert_eq!(snapshot.balances[2].symbol, TokenSymbol::Usdt);
        assert_eq!(snapshot.balances[2].normalized, "42");
        assert!(snapshot.is_current());
    }

    #[tokio::test]
    async fn one_failed_asset_degrades_without_aborting_the_snapshot() {
        let mut tokens = HashMap::new();
        tokens.insert("usdc-ref".to_string(), (U256::from(5_000_000u64), 6u32));
        // USDT feed intentionally missing.
        let registry = registry(MockAdapter {
            chain: Chain::Bsc,
            native: Some(U256::zero()),
            tokens,
        });

        let session = SessionContext::new();
        let aggregator = BalanceAggregator::new(registry);
        let snapshot = aggregator
            .fetch_wallet_snapshot(session.token(), Chain::Bsc, "0xabc", &ALL)
            .await;

        assert_eq!(snapshot.balances.len(), 3);
        let usdt = &snapshot.balances[2];
        assert_eq!(usdt.symbol, TokenSymbol::Usdt);
        assert_eq!(usdt.normalized, "0");
        assert!(usdt.error.is_some());
        assert!(snapshot.balances[1].error.is_none());
    }

    #[tokio::test]
    async fn every_call_failing_still_yields_a_full_snapshot() {
        let registry = registry(MockAdapter {
            chain: Chain::Solana,
            native: None,
            tokens: HashMap::new(),
        });

        let session = SessionContext::new();
        let aggregator = BalanceAggregator::new(registry);
        let snapshot = aggregator
            .fetch_wallet_snapshot(session.token(), Chain::Solana, "Owner111", &ALL)
            .await;

        assert_eq!(snapshot.balances.len(), 3);
        for balance in &snapshot.balances {
            assert_eq!(balance.normalized, "0");
            assert!(balance.error.is_some());
        }
    }

    #[tokio::test]
    async fn late_snapshot_is_detectably_stale() {
        let registry = registry(MockAdapter {
            chain: Chain::Ethereum,
            native: Some(U256::zero()),
            tokens: HashMap::new(),
        });

        let session = SessionContext::new();
        let token = session.token();
        let aggregator = BalanceAggregator::new(registry);
        let snapshot = aggregator
            .fetch_wallet_snapshot(token, Chain::Ethereum, "0xabc", &[TokenSymbol::Native])
            .await;

        // The user navigated away while the fetch was in flight.
        session.invalidate();
        assert!(!snapshot.is_current());
    }
}
