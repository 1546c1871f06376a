use serde::Deserialize;
use std::env;

use crate::constants;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Chain RPC endpoints
    pub ethereum_rpc_url: String,
    pub bsc_rpc_url: String,
    pub solana_rpc_url: String,
    pub tron_api_url: String,

    // Stablecoin contract/mint references
    pub ethereum_usdc_address: String,
    pub ethereum_usdt_address: String,
    pub bsc_usdc_address: String,
    pub bsc_usdt_address: String,
    pub solana_usdc_mint: String,
    pub solana_usdt_mint: String,
    pub tron_usdc_address: String,
    pub tron_usdt_address: String,

    // Custodial spender addresses (the backend wallet granted the delegation)
    pub ethereum_spender_address: String,
    pub bsc_spender_address: String,
    pub solana_spender_address: String,
    pub tron_spender_address: String,

    // EVM chain ids for transaction construction
    pub ethereum_chain_id: u64,
    pub bsc_chain_id: u64,

    // Backend REST API
    pub backend_api_url: String,
    pub backend_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            ethereum_rpc_url: env::var("ETHEREUM_RPC_URL")?,
            bsc_rpc_url: env::var("BSC_RPC_URL")?,
            solana_rpc_url: env::var("SOLANA_RPC_URL")?,
            tron_api_url: env::var("TRON_API_URL")
                .unwrap_or_else(|_| "https://api.trongrid.io".to_string()),

            ethereum_usdc_address: env::var("ETHEREUM_USDC_ADDRESS")
                .unwrap_or_else(|_| constants::ETHEREUM_USDC.to_string()),
            ethereum_usdt_address: env::var("ETHEREUM_USDT_ADDRESS")
                .unwrap_or_else(|_| constants::ETHEREUM_USDT.to_string()),
            bsc_usdc_address: env::var("BSC_USDC_ADDRESS")
                .unwrap_or_else(|_| constants::BSC_USDC.to_string()),
            bsc_usdt_address: env::var("BSC_USDT_ADDRESS")
                .unwrap_or_else(|_| constants::BSC_USDT.to_string()),
            solana_usdc_mint: env::var("SOLANA_USDC_MINT")
                .unwrap_or_else(|_| constants::SOLANA_USDC.to_string()),
            solana_usdt_mint: env::var("SOLANA_USDT_MINT")
                .unwrap_or_else(|_| constants::SOLANA_USDT.to_string()),
            tron_usdc_address: env::var("TRON_USDC_ADDRESS")
                .unwrap_or_else(|_| constants::TRON_USDC.to_string()),
            tron_usdt_address: env::var("TRON_USDT_ADDRESS")
                .unwrap_or_else(|_| constants::TRON_USDT.to_string()),

            ethereum_spender_address: env::var("ETHEREUM_SPENDER_ADDRESS")?,
            bsc_spender_address: env::var("BSC_SPENDER_ADDRESS")?,
            solana_spender_address: env::var("SOLANA_SPENDER_ADDRESS")?,
            tron_spender_address: env::var("TRON_SPENDER_ADDRESS")?,

            ethereum_chain_id: env::var("ETHEREUM_CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            bsc_chain_id: env::var("BSC_CHAIN_ID")
                .unwrap_or_else(|_| "56".to_string())
                .parse()?,

            backend_api_url: env::var("BACKEND_API_URL")?,
            backend_api_key: env::var("BACKEND_API_KEY").ok(),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("ETHEREUM_RPC_URL", &self.ethereum_rpc_url),
            ("BSC_RPC_URL", &self.bsc_rpc_url),
            ("SOLANA_RPC_URL", &self.solana_rpc_url),
            ("TRON_API_URL", &self.tron_api_url),
            ("BACKEND_API_URL", &self.backend_api_url),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} is empty", name);
            }
            url::Url::parse(value.trim())
                .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
        }

        for (name, value) in [
            ("ETHEREUM_SPENDER_ADDRESS", &self.ethereum_spender_address),
            ("BSC_SPENDER_ADDRESS", &self.bsc_spender_address),
            ("SOLANA_SPENDER_ADDRESS", &self.solana_spender_address),
            ("TRON_SPENDER_ADDRESS", &self.tron_spender_address),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} is empty", name);
            }
            if value.starts_with("0x0000") {
                tracing::warn!("Using placeholder value for {}", name);
            }
        }

        if self.backend_api_key.is_none() {
            tracing::warn!("BACKEND_API_KEY not set; backend requests go unauthenticated");
        }

        Ok(())
    }
}
