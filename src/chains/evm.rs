use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, TransactionRequest, H256, U256, U64,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::chains::{
    classify_rpc_error, with_retry, AllowanceState, ChainAdapter, ConfirmationHandle,
    ConfirmationOutcome, SignedApproval, UnsignedApproval,
};
use crate::constants::CONFIRMATION_POLL_INTERVAL_MS;
use crate::error::{EngineError, Result};
use crate::models::{Chain, TokenRef};

ethers::contract::abigen!(
    Erc20,
    r#"[
        function balanceOf(address) view returns (uint256)
        function decimals() view returns (uint8)
        function allowance(address,address) view returns (uint256)
        function approve(address,uint256) returns (bool)
    ]"#
);

/// One adapter covers both EVM chains; Ethereum and BSC differ only in
/// endpoint, chain id, and token contracts.
pub struct EvmAdapter {
    chain: Chain,
    chain_id: u64,
    provider: Arc<Provider<Http>>,
}

impl EvmAdapter {
    pub fn new(chain: Chain, rpc_url: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| EngineError::Internal(format!("Invalid EVM RPC URL: {}", e)))?;
        Ok(Self {
            chain,
            chain_id,
            provider: Arc::new(provider),
        })
    }

    fn parse_address(&self, value: &str) -> Result<Address> {
        Address::from_str(value.trim())
            .map_err(|_| EngineError::InvalidInput(format!("Invalid EVM address: {}", value)))
    }

    fn erc20(&self, token: &TokenRef) -> Result<Erc20<Provider<Http>>> {
        let contract = self.parse_address(token.as_str())?;
        Ok(Erc20::new(contract, self.provider.clone()))
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn supports_allowance_read(&self) -> bool {
        true
    }

    async fn native_balance(&self, address: &str) -> Result<U256> {
        let addr = self.parse_address(address)?;
        with_retry("evm_getBalance", || async {
            self.provider
                .get_balance(addr, None)
                .await
                .map_err(|e| classify_rpc_error(e.to_string()))
        })
        .await
    }

    async fn token_balance(&self, address: &str, token: &TokenRef) -> Result<(U256, u32)> {
        let owner = self.parse_address(address)?;
        let erc20 = self.erc20(token)?;

        let raw = with_retry("evm_erc20_balanceOf", || async {
            erc20
                .balance_of(owner)
                .call()
                .await
                .map_err(|e| classify_rpc_error(e.to_string()))
        })
        .await?;

        let decimals = match erc20.decimals().call().await {
            Ok(value) => u32::from(value),
            Err(err) => {
                tracing::warn!(
                    "evm decimals() failed for {} on {}, assuming 18: {}",
                    token.as_str(),
                    self.chain,
                    err
                );
                18
            }
        };
        Ok((raw, decimals))
    }

    async fn allowance(
        &self,
        owner: &str,
        spender: &str,
        token: &TokenRef,
    ) -> Result<AllowanceState> {
        let owner = self.parse_address(owner)?;
        let spender = self.parse_address(spender)?;
        let erc20 = self.erc20(token)?;

        let amount = with_retry("evm_erc20_allowance", || async {
            erc20
                .allowance(owner, spender)
                .call()
                .await
                .map_err(|e| classify_rpc_error(e.to_string()))
        })
        .await?;
        Ok(AllowanceState::Known(amount))
    }

    async fn build_approval(
        &self,
        owner: &str,
        spender: &str,
        token: &TokenRef,
    ) -> Result<UnsignedApproval> {
        let owner = self.parse_address(owner)?;
        let spender = self.parse_address(spender)?;
        let erc20 = self.erc20(token)?;
        let token_addr = self.parse_address(token.as_str())?;

        // Unlimited delegation: full 256-bit width, deliberately not narrowed.
        let calldata = erc20
            .approve(spender, U256::MAX)
            .calldata()
            .ok_or_else(|| EngineError::Internal("approve calldata encoding failed".into()))?;

        let tx = TransactionRequest::new()
            .from(owner)
            .to(token_addr)
            .data(calldata)
            .chain_id(self.chain_id);
        Ok(UnsignedApproval::Evm {
            chain: self.chain,
            tx: TypedTransaction::Legacy(tx),
        })
    }

    async fn submit_approval(&self, signed: SignedApproval) -> Result<ConfirmationHandle> {
        let raw_tx = match signed {
            SignedApproval::Evm { raw_tx } => raw_tx,
            _ => {
                return Err(EngineError::InvalidInput(
                    "non-EVM payload submitted to EVM adapter".into(),
                ))
            }
        };

        let pending = with_retry("evm_sendRawTransaction", || async {
            self.provider
                .send_raw_transaction(raw_tx.clone())
                .await
                .map_err(|e| classify_rpc_error(e.to_string()))
        })
        .await?;
        let tx_hash: H256 = *pending;

        Ok(ConfirmationHandle {
            chain: self.chain,
            tx_id: format!("{:#x}", tx_hash),
        })
    }

    async fn confirm(
        &self,
        handle: &ConfirmationHandle,
        timeout: Duration,
    ) -> Result<ConfirmationOutcome> {
        let tx_hash = H256::from_str(&handle.tx_id)
            .map_err(|_| EngineError::InvalidInput(format!("Invalid tx hash: {}", handle.tx_id)))?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Ok(ConfirmationOutcome::TimedOut);
            }

            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    return if receipt.status == Some(U64::from(1)) {
                        Ok(ConfirmationOutcome::Confirmed)
                    } else {
                        Ok(ConfirmationOutcome::Reverted)
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    // Receipt polling rides out transient provider hiccups.
                    tracing::debug!("evm receipt poll failed for {}: {}", handle.tx_id, err);
                }
            }
            tokio::time::sleep(Duration::from_millis(CONFIRMATION_POLL_INTERVAL_MS)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> EvmAdapter {
        EvmAdapter::new(Chain::Ethereum, "http://localhost:8545", 1).unwrap()
    }

    #[test]
    fn rejects_malformed_addresses() {
        let adapter = adapter();
        assert!(matches!(
            adapter.parse_address("not-an-address"),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(adapter
            .parse_address("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")
            .is_ok());
    }

    #[tokio::test]
    async fn approval_payload_targets_token_with_max_amount() {
        let adapter = adapter();
        let token = TokenRef("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string());
        let unsigned = adapter
            .build_approval(
                "0x1111111111111111111111111111111111111111",
                "0x2222222222222222222222222222222222222222",
                &token,
            )
            .await
            .unwrap();

        let UnsignedApproval::Evm { chain, tx } = unsigned else {
            panic!("expected EVM payload");
        };
        assert_eq!(chain, Chain::Ethereum);
        let data = tx.data().expect("calldata");
        // approve(address,uint256) selector
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        // final word is 2^256 - 1
        assert!(data[data.len() - 32..].iter().all(|b| *b == 0xff));
    }

    #[tokio::test]
    async fn submit_rejects_foreign_payloads() {
        let adapter = adapter();
        let result = adapter
            .submit_approval(SignedApproval::Solana {
                transaction_b64: "AAEC".into(),
            })
            .await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }
}
