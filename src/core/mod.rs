pub mod account;
pub mod chain;
pub mod config;
pub mod errors;
pub mod events;
pub mod state;
pub mod validation;

pub use account::{Account, AccountKeys, AccountStore};
pub use chain::{Chain, ChainFamily, ChainId, ChainRegistry, EvmChain, SolanaCluster};
pub use config::WalletConfig;
pub use errors::{ProviderRpcError, Result, WalletError};
pub use events::{EventEmitter, SubscriptionId};
pub use state::{StateManager, StatePatch, WalletState};
