use async_trait::async_trait;
use ethers::types::U256;
use serde_json::{json, Value};
use std::time::Duration;

use crate::chains::{
    with_retry, AllowanceState, ChainAdapter, ConfirmationHandle, ConfirmationOutcome,
    SignedApproval, UnsignedApproval,
};
use crate::constants::CONFIRMATION_POLL_INTERVAL_MS;
use crate::error::{EngineError, Result};
use crate::models::{Chain, TokenRef};

const TRON_APPROVE_FEE_LIMIT: u64 = 100_000_000; // 100 TRX ceiling in SUN

/// Tron HTTP API adapter. Tron has no readable allowance primitive exposed
/// through the wallet surface this engine targets, so the capability flag is
/// off and approval state defers to the submit path's own success signal.
pub struct TronAdapter {
    base_url: String,
    client: reqwest::Client,
}

/// Decodes a base58check Tron address into its 21-byte hex form
/// (`41` prefix + 20 bytes).
fn tron_hex_address(address: &str) -> Result<String> {
    let bytes = bs58::decode(address.trim())
        .with_check(None)
        .into_vec()
        .map_err(|_| EngineError::InvalidInput(format!("Invalid Tron address: {}", address)))?;
    if bytes.len() != 21 || bytes[0] != 0x41 {
        return Err(EngineError::InvalidInput(format!(
            "Invalid Tron address payload: {}",
            address
        )));
    }
    Ok(hex::encode(bytes))
}

/// ABI-encodes a Tron address as a 32-byte word (20-byte body, left-padded).
fn abi_address_word(hex41: &str) -> String {
    format!("{:0>64}", &hex41[2..])
}

fn abi_uint_word(value: U256) -> String {
    format!("{:064x}", value)
}

fn hex_to_u256(value: &str) -> Result<U256> {
    let trimmed = value.trim().trim_start_matches("0x");
    if trimmed.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(trimmed, 16)
        .map_err(|_| EngineError::Internal(format!("Invalid hex amount: {}", value)))
}

impl TronAdapter {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::RpcUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(EngineError::RpcUnavailable(format!(
                "Tron API returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(EngineError::Internal(format!(
                "Tron API returned {}",
                status
            )));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::RpcUnavailable(e.to_string()))
    }

    async fn constant_call(
        &self,
        owner: &str,
        contract: &str,
        selector: &str,
        parameter: String,
    ) -> Result<Value> {
        self.post_json(
            "/walletsolidity/triggerconstantcontract",
            json!({
                "owner_address": owner,
                "contract_address": contract,
                "function_selector": selector,
                "parameter": parameter,
                "visible": true
            }),
        )
        .await
    }

    async fn token_decimals(&self, owner: &str, contract: &str) -> u32 {
        let response = self
            .constant_call(owner, contract, "decimals()", String::new())
            .await;
        match response {
            Ok(payload) => payload
                .get("constant_result")
                .and_then(|v| v.get(0))
                .and_then(Value::as_str)
                .and_then(|word| hex_to_u256(word).ok())
                .map(|value| value.low_u32())
                .unwrap_or(6),
            Err(err) => {
                tracing::warn!("tron decimals() failed for {}, assuming 6: {}", contract, err);
                6
            }
        }
    }
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn chain(&self) -> Chain {
        Chain::Tron
    }

    fn supports_allowance_read(&self) -> bool {
        false
    }

    async fn native_balance(&self, address: &str) -> Result<U256> {
        tron_hex_address(address)?;
        let payload = with_retry("tron_getaccount", || async {
            self.post_json(
                "/wallet/getaccount",
                json!({ "address": address, "visible": true }),
            )
            .await
        })
        .await?;

        // An unactivated account comes back as an empty object: zero balance.
        let sun = payload.get("balance").and_then(Value::as_u64).unwrap_or(0);
        Ok(U256::from(sun))
    }

    async fn token_balance(&self, address: &str, token: &TokenRef) -> Result<(U256, u32)> {
        let owner_hex = tron_hex_address(address)?;
        tron_hex_address(token.as_str())?;

        let payload = with_retry("tron_trc20_balanceOf", || async {
            self.constant_call(
                address,
                token.as_str(),
                "balanceOf(address)",
                abi_address_word(&owner_hex),
            )
            .await
        })
        .await?;

        let raw = payload
            .get("constant_result")
            .and_then(|v| v.get(0))
            .and_then(Value::as_str)
            .map(hex_to_u256)
            .transpose()?
            .unwrap_or_else(U256::zero);

        let decimals = self.token_decimals(address, token.as_str()).await;
        Ok((raw, decimals))
    }

    async fn allowance(
        &self,
        _owner: &str,
        _spender: &str,
        _token: &TokenRef,
    ) -> Result<AllowanceState> {
        Ok(AllowanceState::Unsupported)
    }

    async fn build_approval(
        &self,
        owner: &str,
        spender: &str,
        token: &TokenRef,
    ) -> Result<UnsignedApproval> {
        tron_hex_address(owner)?;
        let spender_hex = tron_hex_address(spender)?;
        tron_hex_address(token.as_str())?;

        let parameter = format!(
            "{}{}",
            abi_address_word(&spender_hex),
            abi_uint_word(U256::MAX)
        );

        let payload = with_retry("tron_triggersmartcontract", || async {
            self.post_json(
                "/wallet/triggersmartcontract",
                json!({
                    "owner_address": owner,
                    "contract_address": token.as_str(),
                    "function_selector": "approve(address,uint256)",
                    "parameter": parameter,
                    "fee_limit": TRON_APPROVE_FEE_LIMIT,
                    "call_value": 0,
                    "visible": true
                }),
            )
            .await
        })
        .await?;

        let ok = payload
            .get("result")
            .and_then(|r| r.get("result"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !ok {
            let message = payload
                .get("result")
                .and_then(|r| r.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("transaction build rejected");
            return Err(EngineError::Internal(format!(
                "Tron approve build failed: {}",
                message
            )));
        }

        let transaction = payload
            .get("transaction")
            .cloned()
            .ok_or_else(|| EngineError::Internal("Tron response missing transaction".into()))?;
        Ok(UnsignedApproval::Tron { transaction })
    }

    async fn submit_approval(&self, signed: SignedApproval) -> Result<ConfirmationHandle> {
        let transaction = match signed {
            SignedApproval::Tron { transaction } => transaction,
            _ => {
                return Err(EngineError::InvalidInput(
                    "non-Tron payload submitted to Tron adapter".into(),
                ))
            }
        };
        if transaction.get("signature").is_none() {
            return Err(EngineError::InvalidInput(
                "Tron transaction is missing its signature".into(),
            ));
        }

        let payload = with_retry("tron_broadcasttransaction", || async {
            self.post_json("/wallet/broadcasttransaction", transaction.clone())
                .await
        })
        .await?;

        let accepted = payload
            .get("result")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !accepted {
            let code = payload
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN");
            return Err(EngineError::Internal(format!(
                "Tron broadcast rejected: {}",
                code
            )));
        }

        let tx_id = payload
            .get("txid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                transaction
                    .get("txID")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| EngineError::Internal("Tron broadcast returned no txid".into()))?;

        Ok(ConfirmationHandle {
            chain: Chain::Tron,
            tx_id,
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

            let info = self
                .post_json(
                    "/wallet/gettransactioninfobyid",
                    json!({ "value": handle.tx_id }),
                )
                .await;

            match info {
                Ok(payload) => {
                    let receipt_result = payload
                        .get("receipt")
                        .and_then(|r| r.get("result"))
                        .and_then(Value::as_str);
                    match receipt_result {
                        Some("SUCCESS") => return Ok(ConfirmationOutcome::Confirmed),
                        Some(_) => return Ok(ConfirmationOutcome::Reverted),
                        None => {
                            if payload.get("result").and_then(Value::as_str) == Some("FAILED") {
                                return Ok(ConfirmationOutcome::Reverted);
                            }
                            // Empty object: not yet included.
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!("tron info poll failed for {}: {}", handle.tx_id, err);
                }
            }
            tokio::time::sleep(Duration::from_millis(CONFIRMATION_POLL_INTERVAL_MS)).await;
        }
    }
}
