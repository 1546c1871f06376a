use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::BACKEND_REQUEST_TIMEOUT_SECS;
use crate::error::{EngineError, Result};
use crate::models::{ApiResponse, Chain, TokenSymbol};

/// Backend wallet registry. The backend owns persistence; this engine only
/// reads and writes through it and tolerates read-after-write staleness.
#[async_trait]
pub trait WalletRegistry: Send + Sync {
    /// Lookup is always scoped to a single chain: EVM chains alias address
    /// strings, so the address alone is never an identity.
    async fn wallet_by_address(&self, address: &str, chain: Chain) -> Result<Option<String>>;

    async fn register_connected_wallet(
        &self,
        chain: Chain,
        address: &str,
        public_key: Option<&str>,
        note: Option<&str>,
    ) -> Result<String>;

    async fn delete_connected_wallet(&self, wallet_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StoredApprovalStatus {
    pub usdc_approved: bool,
    pub usdt_approved: bool,
}

/// Backend approval-status store keyed by (address, chain, token).
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn approval_status(&self, address: &str, chain: Chain) -> Result<StoredApprovalStatus>;

    async fn put_approval_status(
        &self,
        address: &str,
        chain: Chain,
        symbol: TokenSymbol,
        approved: bool,
        note: Option<&str>,
    ) -> Result<()>;
}

/// REST client for the backend API.
pub struct HttpBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WalletIdResponse {
    wallet_id: String,
}

#[derive(Debug, Serialize)]
struct RegisterWalletRequest<'a> {
    chain: &'a str,
    address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PutApprovalRequest<'a> {
    address: &'a str,
    chain: &'a str,
    token: &'a str,
    approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(BACKEND_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn expect_success(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = format!("{} returned {}", context, status);
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(EngineError::Backend(message))
        } else {
            Err(EngineError::Internal(message))
        }
    }
}

#[async_trait]
impl WalletRegistry for HttpBackend {
    async fn wallet_by_address(&self, address: &str, chain: Chain) -> Result<Option<String>> {
        let response = self
            .request(reqwest::Method::GET, "/api/v1/wallets/by-address")
            .query(&[("address", address), ("chain", chain.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "wallet lookup").await?;
        let payload: ApiResponse<WalletIdResponse> = response.json().await?;
        Ok(Some(payload.data.wallet_id))
    }

    async fn register_connected_wallet(
        &self,
        chain: Chain,
        address: &str,
        public_key: Option<&str>,
        note: Option<&str>,
    ) -> Result<String> {
        let response = self
            .request(reqwest::Method::POST, "/api/v1/wallets/connected")
            .json(&RegisterWalletRequest {
                chain: chain.as_str(),
                address,
                public_key,
                note,
            })
            .send()
            .await?;

        let response = Self::expect_success(response, "wallet registration").await?;
        let payload: ApiResponse<WalletIdResponse> = response.json().await?;
        Ok(payload.data.wallet_id)
    }

    async fn delete_connected_wallet(&self, wallet_id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/api/v1/wallets/connected/{}", wallet_id),
            )
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            // Already gone; deletion is idempotent from our side.
            return Ok(());
        }
        Self::expect_success(response, "wallet deletion").await?;
        Ok(())
    }
}

#[async_trait]
impl ApprovalStore for HttpBackend {
    async fn approval_status(&self, address: &str, chain: Chain) -> Result<StoredApprovalStatus> {
        let response = self
            .request(reqwest::Method::GET, "/api/v1/approvals/status")
            .query(&[("address", address), ("chain", chain.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            // Never observed before: implicitly unapproved.
            return Ok(StoredApprovalStatus::default());
        }
        let response = Self::expect_success(response, "approval status read").await?;
        let payload: ApiResponse<StoredApprovalStatus> = response.json().await?;
        Ok(payload.data)
    }

    async fn put_approval_status(
        &self,
        address: &str,
        chain: Chain,
        symbol: TokenSymbol,
        approved: bool,
        note: Option<&str>,
    ) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, "/api/v1/approvals/status")
            .json(&PutApprovalRequest {
                address,
                chain: chain.as_str(),
                token: symbol.as_str(),
                approved,
                note,
            })
            .send()
            .await?;

        Self::expect_success(response, "approval status write").await?;
        Ok(())
    }
}
