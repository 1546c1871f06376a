use async_trait::async_trait;
use base64::Engine;
use ethers::types::U256;
use serde_json::{json, Value};
use std::time::Duration;

use crate::chains::{
    classify_rpc_error, with_retry, AllowanceState, ChainAdapter, ConfirmationHandle,
    ConfirmationOutcome, SignedApproval, UnsignedApproval,
};
use crate::constants::CONFIRMATION_POLL_INTERVAL_MS;
use crate::error::{EngineError, Result};
use crate::models::{Chain, TokenRef};

/// Solana JSON-RPC adapter. Token accounts are read with `jsonParsed`
/// encoding so raw amounts and decimals come straight from the RPC node;
/// a missing associated token account is a valid zero balance.
pub struct SolanaAdapter {
    rpc_url: String,
    client: reqwest::Client,
}

fn rpc_request(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    })
}

fn rpc_error_to_engine(error: &Value) -> EngineError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown RPC error")
        .to_string();
    if message.to_ascii_lowercase().contains("invalid param") {
        return EngineError::InvalidInput(message);
    }
    classify_rpc_error(message)
}

/// Pulls the `parsed.info` objects out of a `getTokenAccountsByOwner`
/// response value.
fn parsed_account_infos(value: &Value) -> Vec<&Value> {
    value
        .get("value")
        .and_then(Value::as_array)
        .map(|accounts| {
            accounts
                .iter()
                .filter_map(|entry| {
                    entry
                        .get("account")?
                        .get("data")?
                        .get("parsed")?
                        .get("info")
                })
                .collect()
        })
        .unwrap_or_default()
}

fn token_amount_from_info(info: &Value) -> Option<(U256, u32)> {
    let amount = info.get("tokenAmount")?;
    let raw = amount.get("amount")?.as_str()?;
    let decimals = amount.get("decimals")?.as_u64()? as u32;
    let raw = U256::from_dec_str(raw).ok()?;
    Some((raw, decimals))
}

fn delegated_to(info: &Value, spender: &str) -> Option<U256> {
    let delegate = info.get("delegate")?.as_str()?;
    if delegate != spender {
        return None;
    }
    let raw = info.get("delegatedAmount")?.get("amount")?.as_str()?;
    U256::from_dec_str(raw).ok()
}

impl SolanaAdapter {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc_url,
            client: reqwest::Client::new(),
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let request = rpc_request(method, params);
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::RpcUnavailable(e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| EngineError::RpcUnavailable(e.to_string()))?;

        if let Some(error) = payload.get("error") {
            return Err(rpc_error_to_engine(error));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| EngineError::RpcUnavailable("RPC result missing".into()))
    }

    async fn token_accounts(&self, owner: &str, mint: &str) -> Result<Value> {
        self.rpc_call(
            "getTokenAccountsByOwner",
            json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]),
        )
        .await
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    fn supports_allowance_read(&self) -> bool {
        true
    }

    async fn native_balance(&self, address: &str) -> Result<U256> {
        let result = with_retry("sol_getBalance", || async {
            self.rpc_call("getBalance", json!([address])).await
        })
        .await?;
        let lamports = result
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::RpcUnavailable("malformed getBalance response".into()))?;
        Ok(U256::from(lamports))
    }

    async fn token_balance(&self, address: &str, token: &TokenRef) -> Result<(U256, u32)> {
        let result = with_retry("sol_getTokenAccountsByOwner", || async {
            self.token_accounts(address, token.as_str()).await
        })
        .await?;

        let infos = parsed_account_infos(&result);
        if infos.is_empty() {
            // No associated token account yet: zero, not an error.
            return Ok((U256::zero(), 6));
        }

        let mut total = U256::zero();
        let mut decimals = 6u32;
        for info in infos {
            if let Some((raw, dec)) = token_amount_from_info(info) {
                total = total.saturating_add(raw);
                decimals = dec;
            }
        }
        Ok((total, decimals))
    }

    async fn allowance(
        &self,
        owner: &str,
        spender: &str,
        token: &TokenRef,
    ) -> Result<AllowanceState> {
        let result = with_retry("sol_getTokenAccountsByOwner", || async {
            self.token_accounts(owner, token.as_str()).await
        })
        .await?;

        let mut delegated = U256::zero();
        for info in parsed_account_infos(&result) {
            if let Some(amount) = delegated_to(info, spender) {
                delegated = delegated.saturating_add(amount);
            }
        }
        Ok(AllowanceState::Known(delegated))
    }

    async fn build_approval(
        &self,
        owner: &str,
        spender: &str,
        token: &TokenRef,
    ) -> Result<UnsignedApproval> {
        if owner.trim().is_empty() || spender.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "owner and delegate are required".into(),
            ));
        }
        // The wallet adapter builds and signs the SPL approve; the token
        // program's amount width is 64 bits, so unlimited means u64::MAX.
        Ok(UnsignedApproval::Solana {
            owner: owner.trim().to_string(),
            delegate: spender.trim().to_string(),
            mint: token.as_str().to_string(),
            amount: u64::MAX,
        })
    }

    async fn submit_approval(&self, signed: SignedApproval) -> Result<ConfirmationHandle> {
        let transaction_b64 = match signed {
            SignedApproval::Solana { transaction_b64 } => transaction_b64,
            _ => {
                return Err(EngineError::InvalidInput(
                    "non-Solana payload submitted to Solana adapter".into(),
                ))
            }
        };

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(transaction_b64.trim())
            .map_err(|_| EngineError::InvalidInput("signed transaction is not base64".into()))?;
        if decoded.is_empty() {
            return Err(EngineError::InvalidInput("signed transaction is empty".into()));
        }

        let result = with_retry("sol_sendTransaction", || async {
            self.rpc_call(
                "sendTransaction",
                json!([transaction_b64.trim(), { "encoding": "base64" }]),
            )
            .await
        })
        .await?;

        let signature = result
            .as_str()
            .ok_or_else(|| EngineError::RpcUnavailable("malformed sendTransaction response".into()))?;
        Ok(ConfirmationHandle {
            chain: Chain::Solana,
            tx_id: signature.to_string(),
        })
    }

    async fn confirm(
        &self,
        handle: &ConfirmationHandle,
        timeout: Duration,
    ) -> Result<ConfirmationOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Ok(ConfirmationOutcome::TimedOut);
            }

            let status = self
                .rpc_call(
                    "getSignatureStatuses",
                    json!([[handle.tx_id], { "searchTransactionHistory": true }]),
                )
                .await;

            match status {
                Ok(result) => {
                    let entry = result.get("value").and_then(|v| v.get(0));
                    if let Some(entry) = entry.filter(|v| !v.is_null()) {
                        if entry.get("err").map(|e| !e.is_null()).unwrap_or(false) {
                            return Ok(ConfirmationOutcome::Reverted);
                        }
                        let confirmation = entry
                            .get("confirmationStatus")
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        if confirmation == "confirmed" || confirmation == "finalized" {
                            return Ok(ConfirmationOutcome::Confirmed);
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!("solana status poll failed for {}: {}", handle.tx_id, err);
                }
            }
            tokio::time::sleep(Duration::from_millis(CONFIRMATION_POLL_INTERVAL_MS)).await;
        }
    }
}
