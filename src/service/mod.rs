pub mod bridge;
pub mod injection;
pub mod wallet;

pub use bridge::{BridgeProvider, BridgeRequest, BridgeResponse, WalletBridge};
pub use injection::ProviderRegistration;
pub use wallet::HeadlessWallet;
