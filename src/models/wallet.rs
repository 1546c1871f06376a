use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::session::QueryToken;

/// The four supported chain identities. Ethereum and BSC share the EVM
/// execution model but are always distinct `(address, chain)` identities:
/// each has its own token contracts and allowance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Bsc,
    Solana,
    Tron,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bsc => "bsc",
            Chain::Solana => "solana",
            Chain::Tron => "tron",
        }
    }

    pub fn parse(value: &str) -> Option<Chain> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Some(Chain::Ethereum),
            "bsc" | "bnb" => Some(Chain::Bsc),
            "solana" | "sol" => Some(Chain::Solana),
            "tron" | "trx" => Some(Chain::Tron),
            _ => None,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Bsc => "BNB",
            Chain::Solana => "SOL",
            Chain::Tron => "TRX",
        }
    }

    pub fn native_decimals(&self) -> u32 {
        match self {
            Chain::Ethereum | Chain::Bsc => constants::ETHEREUM_NATIVE_DECIMALS,
            Chain::Solana => constants::SOLANA_NATIVE_DECIMALS,
            Chain::Tron => constants::TRON_NATIVE_DECIMALS,
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, Chain::Ethereum | Chain::Bsc)
    }

    /// EVM addresses compare case-insensitively; Solana and Tron are
    /// byte-exact.
    pub fn addresses_equal(&self, a: &str, b: &str) -> bool {
        if self.is_evm() {
            a.trim().eq_ignore_ascii_case(b.trim())
        } else {
            a.trim() == b.trim()
        }
    }

    /// Canonical form used for map keys and backend lookups.
    pub fn normalize_address(&self, address: &str) -> String {
        let trimmed = address.trim();
        if self.is_evm() {
            trimmed.to_ascii_lowercase()
        } else {
            trimmed.to_string()
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenSymbol {
    Native,
    Usdc,
    Usdt,
}

impl TokenSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSymbol::Native => "NATIVE",
            TokenSymbol::Usdc => "USDC",
            TokenSymbol::Usdt => "USDT",
        }
    }
}

impl std::fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque chain-specific token contract or mint reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef(pub String);

impl TokenRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One normalized asset balance. `normalized` is always
/// `raw / 10^decimals` computed with integer arithmetic; a failed fetch
/// degrades to `"0"` with `error` set instead of a missing entry.
#[derive(Debug, Clone, Serialize)]
pub struct TokenBalance {
    pub chain: Chain,
    pub address: String,
    pub symbol: TokenSymbol,
    pub raw: U256,
    pub decimals: u32,
    pub normalized: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Immutable balance view for one wallet. Re-fetching produces a new
/// snapshot; it never mutates one already handed out.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub chain: Chain,
    pub address: String,
    pub balances: Vec<TokenBalance>,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip)]
    pub query: QueryToken,
}

impl Snapshot {
    /// Late deliveries from an expired querying context must be discarded,
    /// never applied to another wallet's view.
    pub fn is_current(&self) -> bool {
        self.query.is_current()
    }
}

/// Delegation stage for one (address, chain, token) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStage {
    Unknown,
    NotApproved,
    PendingSignature,
    PendingConfirmation,
    Approved,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalState {
    pub stage: ApprovalStage,
    pub backend_synced: bool,
    /// Set when the on-chain approval stands but the backend write failed.
    /// Never downgraded to unapproved; retried on the next poll.
    pub reconciliation_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ApprovalState {
    pub fn unknown() -> Self {
        Self {
            stage: ApprovalStage::Unknown,
            backend_synced: false,
            reconciliation_pending: false,
            last_error: None,
            last_checked_at: None,
        }
    }
}

/// One surfaced wallet per chain; `backend_wallet_id` stays empty until the
/// reconciler resolves the address against the backend registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedWallet {
    pub address: String,
    pub chain: Chain,
    pub display_name: String,
    pub backend_wallet_id: Option<String>,
}

/// Discrete wallet-provider events consumed by the reconciler.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Connected {
        chain: Chain,
        address: String,
        public_key: Option<String>,
    },
    AccountChanged {
        chain: Chain,
        address: String,
    },
    Disconnected {
        chain: Chain,
    },
}

/// Backend response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_addresses_compare_case_insensitively() {
        assert!(Chain::Ethereum.addresses_equal(
            "0xAbCd000000000000000000000000000000000001",
            "0xabcd000000000000000000000000000000000001"
        ));
        assert!(!Chain::Solana.addresses_equal("So1ana", "so1ana"));
    }

    #[test]
    fn ethereum_and_bsc_are_distinct_chains() {
        // Same address string, different delegation identity.
        assert_ne!(Chain::Ethereum, Chain::Bsc);
        assert_eq!(Chain::Ethereum.normalize_address("0xABC"), "0xabc");
        assert_eq!(Chain::Tron.normalize_address(" TAbc "), "TAbc");
    }

    #[test]
    fn api_response_success_sets_flag() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, "ok");
    }
}
