//! tests/injection_tests.rs
//!
//! Global attachment policies and teardown.

mod common;

use common::*;
use headless_wallet::core::config::{EvmInjection, InjectionConfig, SolanaInjection, WalletConfig};
use headless_wallet::core::errors::codes;
use headless_wallet::host::InjectedProvider;
use headless_wallet::service::injection::{install_external, providers_at};
use headless_wallet::{HeadlessWallet, HostPage};
use std::sync::Arc;
use test_case::test_case;

fn with_injection(evm: EvmInjection, solana: SolanaInjection) -> WalletConfig {
    WalletConfig {
        injection: InjectionConfig { evm, solana, solana_path: "phantom.solana".into() },
        ..dual_account()
    }
}

#[tokio::test]
async fn test_replace_then_teardown_restores_previous() {
    let host = Arc::new(HostPage::localhost());
    install_external(&host, "ethereum", "metamask");
    let wallet = HeadlessWallet::new(
        with_injection(EvmInjection::Replace, SolanaInjection::Global),
        Arc::clone(&host),
    )
    .unwrap();

    wallet.inject().unwrap();
    let attached = providers_at(&host, "ethereum");
    assert_eq!(attached.len(), 1);
    assert!(attached[0].as_evm().is_some());
    assert!(providers_at(&host, "phantom.solana")[0].as_solana().is_some());

    wallet.teardown();
    let restored = providers_at(&host, "ethereum");
    assert_eq!(restored.len(), 1);
    assert!(restored[0].same_as(&InjectedProvider::External("metamask".into())));
    assert!(host.global("phantom.solana").is_none());
    assert!(!wallet.is_injected());
}

#[tokio::test]
async fn test_append_coexists_with_other_provider() {
    let host = Arc::new(HostPage::localhost());
    install_external(&host, "ethereum", "metamask");
    let wallet = HeadlessWallet::new(
        with_injection(EvmInjection::Append, SolanaInjection::WalletStandard),
        Arc::clone(&host),
    )
    .unwrap();

    wallet.inject().unwrap();
    let providers = providers_at(&host, "ethereum");
    assert_eq!(providers.len(), 2);
    assert!(providers[1].as_evm().is_some());
    assert!(host.global("phantom.solana").is_none());

    wallet.teardown();
    let left = providers_at(&host, "ethereum");
    assert_eq!(left.len(), 1);
    assert!(left[0].same_as(&InjectedProvider::External("metamask".into())));
}

#[tokio::test]
async fn test_two_wallets_append_and_leave_independently() {
    let host = Arc::new(HostPage::localhost());
    let first = HeadlessWallet::new(
        WalletConfig { id: Some("a".into()), ..with_injection(EvmInjection::Append, SolanaInjection::WalletStandard) },
        Arc::clone(&host),
    )
    .unwrap();
    let second = HeadlessWallet::new(
        WalletConfig { id: Some("b".into()), ..with_injection(EvmInjection::Append, SolanaInjection::WalletStandard) },
        Arc::clone(&host),
    )
    .unwrap();
    first.inject().unwrap();
    second.inject().unwrap();
    assert_eq!(providers_at(&host, "ethereum").len(), 2);

    first.teardown();
    let left = providers_at(&host, "ethereum");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].as_evm().unwrap().wallet_id(), "b");
}

#[test_case(EvmInjection::Replace, true ; "replace attaches")]
#[test_case(EvmInjection::Append, true ; "append attaches")]
#[test_case(EvmInjection::AnnounceOnly, false ; "announce only skips the global")]
fn test_evm_global_per_mode(mode: EvmInjection, attached: bool) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    runtime.block_on(async {
        let host = Arc::new(HostPage::localhost());
        let wallet =
            HeadlessWallet::new(with_injection(mode, SolanaInjection::Global), Arc::clone(&host)).unwrap();
        wallet.inject().unwrap();
        assert_eq!(host.global("ethereum").is_some(), attached);
        assert!(wallet.announcer().is_active());
    });
}

#[tokio::test]
async fn test_double_inject_rejected() {
    let (_host, wallet) = wallet(dual_account());
    wallet.inject().unwrap();
    let err = wallet.inject().unwrap_err();
    assert_eq!(err.code(), codes::INTERNAL);

    wallet.teardown();
    wallet.inject().unwrap();
}

#[tokio::test]
async fn test_drop_detaches() {
    let host = Arc::new(HostPage::localhost());
    {
        let wallet = HeadlessWallet::new(dual_account(), Arc::clone(&host)).unwrap();
        wallet.inject().unwrap();
        assert!(host.global("ethereum").is_some());
    }
    assert!(host.global("ethereum").is_none());
    assert!(host.global("solana").is_none());
}
