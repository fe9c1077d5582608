//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use headless_wallet::core::config::{AccountConfig, WalletConfig};
use headless_wallet::provider::evm::{EvmEvent, EvmEventKind, EvmProvider};
use headless_wallet::{HeadlessWallet, HostPage};
use parking_lot::Mutex;
use std::sync::Arc;

/// Well-known local devnet keys (anvil / hardhat accounts 0 and 1).
pub const EVM_KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const EVM_ADDRESS_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const EVM_KEY_1: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b69690d";
pub const EVM_ADDRESS_1: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

/// 32-byte ed25519 seed, hex encoded.
pub const SOLANA_SEED_HEX: &str = "0101010101010101010101010101010101010101010101010101010101010101";

pub fn two_evm_accounts() -> WalletConfig {
    WalletConfig {
        id: Some("test-wallet".into()),
        accounts: vec![AccountConfig::evm(EVM_KEY_0), AccountConfig::evm(EVM_KEY_1)],
        ..Default::default()
    }
}

pub fn dual_account() -> WalletConfig {
    WalletConfig {
        id: Some("dual-wallet".into()),
        accounts: vec![AccountConfig::dual(EVM_KEY_0, SOLANA_SEED_HEX)],
        ..Default::default()
    }
}

pub fn wallet(config: WalletConfig) -> (Arc<HostPage>, HeadlessWallet) {
    let host = Arc::new(HostPage::localhost());
    let wallet = HeadlessWallet::new(config, Arc::clone(&host)).expect("wallet builds");
    (host, wallet)
}

/// Records every EVM event in delivery order.
pub fn record_evm_events(provider: &EvmProvider) -> Arc<Mutex<Vec<EvmEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in EvmEventKind::ALL {
        let sink = Arc::clone(&log);
        provider.on(kind, move |event| sink.lock().push(event.clone()));
    }
    log
}
