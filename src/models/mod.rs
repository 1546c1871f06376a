pub mod wallet;

pub use wallet::{
    ApiResponse, ApprovalStage, ApprovalState, Chain, LinkedWallet, ProviderEvent,
    Snapshot, TokenBalance, TokenRef, TokenSymbol,
};
