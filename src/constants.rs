/// Application constants

// Stablecoin contract references (mainnet defaults, overridable via env)
pub const ETHEREUM_USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
pub const ETHEREUM_USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";
pub const BSC_USDC: &str = "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d";
pub const BSC_USDT: &str = "0x55d398326f99059fF775485246999027B3197955";
pub const SOLANA_USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const SOLANA_USDT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";
pub const TRON_USDC: &str = "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8";
pub const TRON_USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

// Native asset decimals
pub const ETHEREUM_NATIVE_DECIMALS: u32 = 18;
pub const SOLANA_NATIVE_DECIMALS: u32 = 9;
pub const TRON_NATIVE_DECIMALS: u32 = 6;

// Normalized balance strings carry at most this many fractional digits.
pub const DISPLAY_FRACTION_DIGITS: u32 = 6;

// RPC budgets
pub const BALANCE_CALL_TIMEOUT_SECS: u64 = 10;
pub const RPC_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RPC_RETRY_BASE_MS: u64 = 250;
pub const CONFIRMATION_TIMEOUT_SECS: u64 = 90;
pub const CONFIRMATION_POLL_INTERVAL_MS: u64 = 2_000;

// Backend client
pub const BACKEND_REQUEST_TIMEOUT_SECS: u64 = 8;
