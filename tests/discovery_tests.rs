//! tests/discovery_tests.rs
//!
//! EIP-6963 announcements and the Wallet Standard registration handshake.

mod common;

use common::*;
use headless_wallet::core::config::{BrandingConfig, WalletConfig};
use headless_wallet::discovery::wallet_standard::app_ready;
use headless_wallet::discovery::request_providers;
use headless_wallet::host::HostEvent;
use headless_wallet::{HeadlessWallet, HostPage};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn count_announcements(host: &HostPage) -> Arc<Mutex<usize>> {
    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    host.add_event_listener(move |event| {
        if matches!(event, HostEvent::AnnounceProvider(_)) {
            *sink.lock() += 1;
        }
    });
    count
}

#[tokio::test]
async fn test_each_request_yields_one_announcement() {
    let (host, wallet) = wallet(two_evm_accounts());
    wallet.inject().unwrap();
    let count = count_announcements(&host);

    host.dispatch_event(HostEvent::RequestProvider);
    assert_eq!(*count.lock(), 1);
    host.dispatch_event(HostEvent::RequestProvider);
    assert_eq!(*count.lock(), 2);
}

#[tokio::test]
async fn test_announces_on_start() {
    let host = Arc::new(HostPage::localhost());
    let count = count_announcements(&host);
    let wallet = HeadlessWallet::new(two_evm_accounts(), Arc::clone(&host)).unwrap();
    assert_eq!(*count.lock(), 0);
    wallet.inject().unwrap();
    assert_eq!(*count.lock(), 1);
}

#[tokio::test]
async fn test_announcement_carries_branding() {
    let config = WalletConfig {
        branding: BrandingConfig {
            name: "Test Wallet".into(),
            icon: "data:image/svg+xml,<svg/>".into(),
            rdns: "com.example.test".into(),
            uuid: Some("2f1a5f0e-36c1-4c46-9f37-1f3d8b4e9a10".into()),
        },
        ..two_evm_accounts()
    };
    let (host, wallet) = wallet(config);
    wallet.inject().unwrap();

    let found = request_providers(&host);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].info.name, "Test Wallet");
    assert_eq!(found[0].info.rdns, "com.example.test");
    assert_eq!(found[0].info.uuid, "2f1a5f0e-36c1-4c46-9f37-1f3d8b4e9a10");
    assert_eq!(found[0].provider.wallet_id(), wallet.id());
}

#[tokio::test]
async fn test_two_wallets_both_announce() {
    let host = Arc::new(HostPage::localhost());
    let first = HeadlessWallet::new(
        WalletConfig { id: Some("first".into()), ..Default::default() },
        Arc::clone(&host),
    )
    .unwrap();
    let second = HeadlessWallet::new(
        WalletConfig { id: Some("second".into()), ..Default::default() },
        Arc::clone(&host),
    )
    .unwrap();
    first.inject().unwrap();
    second.inject().unwrap();

    let mut ids: Vec<String> =
        request_providers(&host).iter().map(|d| d.provider.wallet_id().to_string()).collect();
    ids.sort();
    assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
    assert_ne!(first.announcer().info().uuid, second.announcer().info().uuid);
}

#[tokio::test]
async fn test_stopped_announcer_is_silent() {
    let (host, wallet) = wallet(two_evm_accounts());
    wallet.inject().unwrap();
    assert!(wallet.announcer().stop());
    assert!(!wallet.announcer().stop());
    assert!(request_providers(&host).is_empty());
}

#[tokio::test]
async fn test_teardown_removes_only_own_listeners() {
    let (host, wallet) = wallet(two_evm_accounts());
    let before = host.listener_count();
    wallet.inject().unwrap();
    assert_eq!(host.listener_count(), before + 2);
    wallet.teardown();
    assert_eq!(host.listener_count(), before);
}

#[tokio::test]
async fn test_wallet_standard_answers_app_ready() {
    let (host, wallet) = wallet(dual_account());
    wallet.inject().unwrap();

    let wallets = app_ready(&host);
    assert_eq!(wallets.len(), 1);
    assert_eq!(wallets[0].wallet_id(), wallet.id());
    assert!(wallets[0].features().iter().any(|f| f == "solana:signTransaction"));
    assert_eq!(wallets[0].version(), "1.0.0");
}
