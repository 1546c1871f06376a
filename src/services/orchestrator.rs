use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::chains::{AdapterRegistry, AllowanceState, ApprovalSigner, ConfirmationOutcome};
use crate::constants::CONFIRMATION_TIMEOUT_SECS;
use crate::error::{EngineError, Result};
use crate::models::{ApprovalStage, ApprovalState, Chain, TokenSymbol};
use crate::services::backend::ApprovalStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ApprovalKey {
    address: String,
    chain: Chain,
    symbol: TokenSymbol,
}

/// Legal stage transitions. `PendingSignature -> Approved` is deliberately
/// absent: a signed approval must pass through confirmation before it can be
/// reported as truth.
fn transition_allowed(from: ApprovalStage, to: ApprovalStage) -> bool {
    use ApprovalStage::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Unknown, NotApproved)
            | (Unknown, Approved)
            | (Unknown, PendingSignature)
            | (NotApproved, PendingSignature)
            | (NotApproved, Approved)
            | (PendingSignature, PendingConfirmation)
            | (PendingSignature, NotApproved)
            | (PendingConfirmation, Approved)
            | (PendingConfirmation, NotApproved)
            // A revoke observed on-chain; never produced locally.
            | (Approved, NotApproved)
    )
}

/// Drives the per-(wallet, chain, token) delegation state machine:
/// check allowance, request signature, submit, confirm, persist.
pub struct ApprovalOrchestrator {
    registry: Arc<AdapterRegistry>,
    signer: Arc<dyn ApprovalSigner>,
    store: Arc<dyn ApprovalStore>,
    states: RwLock<HashMap<ApprovalKey, ApprovalState>>,
}

impl ApprovalOrchestrator {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        signer: Arc<dyn ApprovalSigner>,
        store: Arc<dyn ApprovalStore>,
    ) -> Self {
        Self {
            registry,
            signer,
            store,
            states: RwLock::new(HashMap::new()),
        }
    }

    fn key(chain: Chain, address: &str, symbol: TokenSymbol) -> ApprovalKey {
        ApprovalKey {
            address: chain.normalize_address(address),
            chain,
            symbol,
        }
    }

    pub async fn state(&self, chain: Chain, address: &str, symbol: TokenSymbol) -> ApprovalState {
        let key = Self::key(chain, address, symbol);
        self.states
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_else(ApprovalState::unknown)
    }

    async fn apply(&self, key: &ApprovalKey, to: ApprovalStage) {
        let mut guard = self.states.write().await;
        let entry = guard
            .entry(key.clone())
            .or_insert_with(ApprovalState::unknown);
        if !transition_allowed(entry.stage, to) {
            tracing::warn!(
                "illegal approval transition {:?} -> {:?} for {} {} {}, ignoring",
                entry.stage,
                to,
                key.chain,
                key.address,
                key.symbol
            );
            return;
        }
        entry.stage = to;
        if to != ApprovalStage::Approved {
            entry.backend_synced = false;
            entry.reconciliation_pending = false;
        }
        entry.last_error = None;
    }

    async fn record_failure(&self, key: &ApprovalKey, to: ApprovalStage, err: &EngineError) {
        self.apply(key, to).await;
        let mut guard = self.states.write().await;
        if let Some(entry) = guard.get_mut(key) {
            entry.last_error = Some(err.to_string());
        }
    }

    /// Maps an on-chain allowance read onto the local stage. On chains
    /// without a readable allowance the stage stays `Unknown`; the user can
    /// still initiate an approval from there.
    pub async fn refresh(
        &self,
        chain: Chain,
        address: &str,
        symbol: TokenSymbol,
    ) -> Result<ApprovalState> {
        if symbol == TokenSymbol::Native {
            return Err(EngineError::InvalidInput(
                "native assets carry no delegation".into(),
            ));
        }
        let key = Self::key(chain, address, symbol);
        let adapter = self.registry.adapter(chain)?;
        let spender = self.registry.spender(chain)?.to_string();
        let token = self
            .registry
            .token_ref(chain, symbol)
            .cloned()
            .ok_or_else(|| {
                EngineError::InvalidInput(format!("no {} contract configured for {}", symbol, chain))
            })?;

        match adapter.allowance(&key.address, &spender, &token).await? {
            AllowanceState::Known(amount) if !amount.is_zero() => {
                self.apply(&key, ApprovalStage::Approved).await;
            }
            AllowanceState::Known(_) => {
                self.apply(&key, ApprovalStage::NotApproved).await;
            }
            AllowanceState::Unsupported => {}
        }

        let mut guard = self.states.write().await;
        let entry = guard
            .entry(key.clone())
            .or_insert_with(ApprovalState::unknown);
        entry.last_checked_at = Some(Utc::now());
        Ok(entry.clone())
    }

    /// Seeds local state from the backend approval-status store. Backend
    /// truth never downgrades an on-chain `Approved`.
    pub async fn load_backend_status(&self, chain: Chain, address: &str) -> Result<()> {
        let status = self.store.approval_status(address, chain).await?;
        for (symbol, approved) in [
            (TokenSymbol::Usdc, status.usdc_approved),
            (TokenSymbol::Usdt, status.usdt_approved),
        ] {
            if !approved {
                continue;
            }
            let key = Self::key(chain, address, symbol);
            self.apply(&key, ApprovalStage::Approved).await;
            let mut guard = self.states.write().await;
            if let Some(entry) = guard.get_mut(&key) {
                entry.backend_synced = true;
            }
        }
        Ok(())
    }

    /// Approves several tokens in one user action. Strictly sequential per
    /// token (each may require its own wallet prompt); one token's failure
    /// neither blocks the remaining tokens nor rolls back a confirmed one.
    pub async fn approve_tokens(
        &self,
        chain: Chain,
        address: &str,
        symbols: &[TokenSymbol],
    ) -> Vec<(TokenSymbol, ApprovalState)> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Err(err) = self.approve_one(chain, address, *symbol).await {
                tracing::warn!("{} {} approval attempt failed: {}", chain, symbol, err);
            }
            results.push((*symbol, self.state(chain, address, *symbol).await));
        }
        results
    }

    async fn approve_one(&self, chain: Chain, address: &str, symbol: TokenSymbol) -> Result<()> {
        if symbol == TokenSymbol::Native {
            return Err(EngineError::InvalidInput(
                "native assets carry no delegation".into(),
            ));
        }
        let key = Self::key(chain, address, symbol);
        let adapter = self.registry.adapter(chain)?;
        let spender = self.registry.spender(chain)?.to_string();
        let token = self
            .registry
            .token_ref(chain, symbol)
            .cloned()
            .ok_or_else(|| {
                EngineError::InvalidInput(format!("no {} contract configured for {}", symbol, chain))
            })?;

        // Skip the prompt when a readable allowance already covers the
        // spender. An unreadable precondition never skips the attempt.
        if adapter.supports_allowance_read() {
            match adapter.allowance(&key.address, &spender, &token).await {
                Ok(AllowanceState::Known(amount)) if !amount.is_zero() => {
                    self.apply(&key, ApprovalStage::Approved).await;
                    self.persist(&key).await;
                    return Ok(());
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(
                        "{} {} allowance pre-check failed, proceeding to signature: {}",
                        chain,
                        symbol,
                        err
                    );
                }
            }
        }

        self.apply(&key, ApprovalStage::PendingSignature).await;

        let unsigned = match adapter.build_approval(&key.address, &spender, &token).await {
            Ok(unsigned) => unsigned,
            Err(err) => {
                self.record_failure(&key, ApprovalStage::NotApproved, &err)
                    .await;
                return Err(err);
            }
        };

        // A declined signature is terminal for this attempt; no retry loop.
        let signed = match self.signer.sign(&unsigned).await {
            Ok(signed) => signed,
            Err(err) => {
                self.record_failure(&key, ApprovalStage::NotApproved, &err)
                    .await;
                return Err(err);
            }
        };

        self.apply(&key, ApprovalStage::PendingConfirmation).await;

        let handle = match adapter.submit_approval(signed).await {
            Ok(handle) => handle,
            Err(err) => {
                self.record_failure(&key, ApprovalStage::NotApproved, &err)
                    .await;
                return Err(err);
            }
        };

        let outcome = match adapter
            .confirm(&handle, Duration::from_secs(CONFIRMATION_TIMEOUT_SECS))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record_failure(&key, ApprovalStage::NotApproved, &err)
                    .await;
                return Err(err);
            }
        };

        match outcome {
            ConfirmationOutcome::Confirmed => {
                self.apply(&key, ApprovalStage::Approved).await;
                self.persist(&key).await;
                Ok(())
            }
            ConfirmationOutcome::TimedOut => {
                // Distinct from a revert: the transaction may still confirm
                // and must be re-checked, not assumed failed.
                let err = EngineError::ConfirmationTimeout;
                self.record_failure(&key, ApprovalStage::NotApproved, &err)
                    .await;
                Err(err)
            }
            ConfirmationOutcome::Reverted => {
                let err = EngineError::Reverted;
                self.record_failure(&key, ApprovalStage::NotApproved, &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Writes a confirmed approval to the backend store. The on-chain
    /// delegation stands either way, so a failed write only marks the entry
    /// reconciliation-pending; it is never reported as unapproved.
    async fn persist(&self, key: &ApprovalKey) {
        let result = self
            .store
            .put_approval_status(
                &key.address,
                key.chain,
                key.symbol,
                true,
                Some("on-chain approval confirmed"),
            )
            .await;

        let mut guard = self.states.write().await;
        let entry = guard
            .entry(key.clone())
            .or_insert_with(ApprovalState::unknown);
        entry.last_checked_at = Some(Utc::now());
        match result {
            Ok(()) => {
                entry.backend_synced = true;
                entry.reconciliation_pending = false;
            }
            Err(err) => {
                tracing::warn!(
                    "approval persisted on-chain but backend write failed for {} {} {}: {}",
                    key.chain,
                    key.address,
                    key.symbol,
                    err
                );
                entry.backend_synced = false;
                entry.reconciliation_pending = true;
                entry.last_error = Some(EngineError::BackendSync(err.to_string()).to_string());
            }
        }
    }

    /// Retries backend writes for approvals confirmed on-chain but not yet
    /// persisted. Returns how many entries were synced.
    pub async fn retry_pending_sync(&self) -> usize {
        let pending: Vec<ApprovalKey> = {
            let guard = self.states.read().await;
            guard
                .iter()
                .filter(|(_, state)| {
                    state.reconciliation_pending && state.stage == ApprovalStage::Approved
                })
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut synced = 0;
        for key in pending {
            self.persist(&key).await;
            let guard = self.states.read().await;
            if guard
                .get(&key)
                .map(|state| state.backend_synced)
                .unwrap_or(false)
            {
                synced += 1;
            }
        }
        synced
    }
}
