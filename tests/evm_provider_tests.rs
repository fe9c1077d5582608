//! tests/evm_provider_tests.rs
//!
//! EIP-1193 surface through the wallet: connection events, account visibility, signing,
//! chain management, permissions and the method table.

mod common;

use common::*;
use ethers::types::{Address, Signature};
use headless_wallet::core::errors::codes;
use headless_wallet::provider::evm::{EvmEvent, RequestArguments};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn addresses(value: Value) -> Vec<String> {
    serde_json::from_value(value).expect("address list")
}

#[tokio::test]
async fn test_accounts_empty_until_connected() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();

    let before = evm.request(RequestArguments::method("eth_accounts")).await.unwrap();
    assert_eq!(addresses(before), Vec::<String>::new());

    let requested = evm.request(RequestArguments::method("eth_requestAccounts")).await.unwrap();
    let current = evm.request(RequestArguments::method("eth_accounts")).await.unwrap();
    assert_eq!(requested, current);
    assert_eq!(addresses(current), vec![EVM_ADDRESS_0.to_string(), EVM_ADDRESS_1.to_string()]);
}

#[tokio::test]
async fn test_connect_then_disconnect_event_order() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    let log = record_evm_events(evm);

    evm.request(RequestArguments::method("eth_requestAccounts")).await.unwrap();
    {
        let events = log.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], EvmEvent::Connect(info) if info.chain_id == "0x1"));
        assert_eq!(
            events[1],
            EvmEvent::AccountsChanged(vec![EVM_ADDRESS_0.to_string(), EVM_ADDRESS_1.to_string()])
        );
    }
    log.lock().clear();

    evm.disconnect().unwrap();
    let events = log.lock();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], EvmEvent::Disconnect(err) if err.code == codes::DISCONNECTED));
    assert_eq!(events[1], EvmEvent::AccountsChanged(Vec::new()));
    assert!(!evm.is_connected());
    assert!(evm.accounts().is_empty());
}

#[tokio::test]
async fn test_repeated_connect_emits_nothing_new() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();
    let log = record_evm_events(evm);
    evm.connect().unwrap();
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_chain_id_and_net_version() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    assert_eq!(evm.request(RequestArguments::method("eth_chainId")).await.unwrap(), json!("0x1"));
    assert_eq!(evm.request(RequestArguments::method("net_version")).await.unwrap(), json!("1"));
}

#[tokio::test]
async fn test_personal_sign_recovers_signer() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();

    let sig = evm
        .request(RequestArguments::new("personal_sign", json!(["hello headless", EVM_ADDRESS_0])))
        .await
        .unwrap();
    let sig: Signature = sig.as_str().unwrap().parse().unwrap();
    let expected: Address = EVM_ADDRESS_0.parse().unwrap();
    assert_eq!(sig.recover("hello headless").unwrap(), expected);
}

#[tokio::test]
async fn test_personal_sign_accepts_reversed_params() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();

    let sig = evm
        .request(RequestArguments::new("personal_sign", json!([EVM_ADDRESS_1, "reversed"])))
        .await
        .unwrap();
    let sig: Signature = sig.as_str().unwrap().parse().unwrap();
    assert_eq!(sig.recover("reversed").unwrap(), EVM_ADDRESS_1.parse::<Address>().unwrap());
}

#[tokio::test]
async fn test_sign_with_unknown_address_is_unauthorized() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();

    let stranger = "0x0000000000000000000000000000000000000001";
    let err = evm
        .request(RequestArguments::new("personal_sign", json!(["hi", stranger])))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_before_connect_is_unauthorized() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let err = wallet
        .evm()
        .request(RequestArguments::new("personal_sign", json!(["hi", EVM_ADDRESS_0])))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_typed_data_v4() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();

    let typed = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "chainId", "type": "uint256" }
            ],
            "Mail": [{ "name": "contents", "type": "string" }]
        },
        "primaryType": "Mail",
        "domain": { "name": "Headless", "chainId": 1 },
        "message": { "contents": "gm" }
    });
    let sig = evm
        .request(RequestArguments::new("eth_signTypedData_v4", json!([EVM_ADDRESS_0, typed.to_string()])))
        .await
        .unwrap();
    let sig = sig.as_str().unwrap();
    assert!(sig.starts_with("0x"));
    assert_eq!(sig.len(), 2 + 130);
}

#[tokio::test]
async fn test_typed_data_for_other_chain_rejected() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();

    let typed = json!({
        "types": {
            "EIP712Domain": [{ "name": "chainId", "type": "uint256" }],
            "Mail": [{ "name": "contents", "type": "string" }]
        },
        "primaryType": "Mail",
        "domain": { "chainId": 137 },
        "message": { "contents": "gm" }
    });
    let err = evm
        .request(RequestArguments::new("eth_signTypedData_v4", json!([EVM_ADDRESS_0, typed])))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::INVALID_PARAMS);
}

#[tokio::test]
async fn test_switch_to_active_chain_emits_nothing() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    let log = record_evm_events(evm);

    evm.request(RequestArguments::new("wallet_switchEthereumChain", json!([{ "chainId": "0x1" }])))
        .await
        .unwrap();
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_switch_to_other_chain_emits_once() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    let log = record_evm_events(evm);

    evm.request(RequestArguments::new("wallet_switchEthereumChain", json!([{ "chainId": "0xaa36a7" }])))
        .await
        .unwrap();
    assert_eq!(*log.lock(), vec![EvmEvent::ChainChanged("0xaa36a7".into())]);
    assert_eq!(evm.chain_id().unwrap(), 11_155_111);
}

#[tokio::test]
async fn test_switch_to_unknown_chain_fails_without_change() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    let log = record_evm_events(evm);

    for _ in 0..2 {
        let err = evm
            .request(RequestArguments::new("wallet_switchEthereumChain", json!([{ "chainId": "0x999" }])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::UNRECOGNIZED_CHAIN);
        assert!(err.to_string().contains("wallet_addEthereumChain"));
    }
    assert_eq!(evm.chain_id().unwrap(), 1);
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_add_chain_registers_and_switches() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    let log = record_evm_events(evm);

    evm.request(RequestArguments::new(
        "wallet_addEthereumChain",
        json!([{
            "chainId": "0x64",
            "chainName": "Gnosis",
            "nativeCurrency": { "name": "xDAI", "symbol": "XDAI", "decimals": 18 },
            "rpcUrls": ["https://rpc.gnosischain.com"],
            "blockExplorerUrls": ["https://gnosisscan.io"]
        }]),
    ))
    .await
    .unwrap();

    assert_eq!(evm.chain_id().unwrap(), 100);
    assert_eq!(evm.endpoint_for(100).as_deref(), Some("https://rpc.gnosischain.com"));
    assert_eq!(*log.lock(), vec![EvmEvent::ChainChanged("0x64".into())]);
}

#[tokio::test]
async fn test_add_chain_validation() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();

    let no_rpc = evm
        .request(RequestArguments::new(
            "wallet_addEthereumChain",
            json!([{ "chainId": "0x64", "chainName": "Gnosis", "rpcUrls": [] }]),
        ))
        .await
        .unwrap_err();
    assert_eq!(no_rpc.code(), codes::INVALID_PARAMS);

    let padded = evm
        .request(RequestArguments::new(
            "wallet_addEthereumChain",
            json!([{ "chainId": "0x064", "chainName": "Gnosis", "rpcUrls": ["https://rpc.gnosischain.com"] }]),
        ))
        .await
        .unwrap_err();
    assert_eq!(padded.code(), codes::INVALID_PARAMS);
    assert_eq!(evm.chain_id().unwrap(), 1);
}

#[tokio::test]
async fn test_simulated_send_advances_nonce() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();
    assert!(evm.simulates_transactions());

    let tx = json!([{ "from": EVM_ADDRESS_0, "to": EVM_ADDRESS_1, "value": "0x2386f26fc10000" }]);
    let first = evm.request(RequestArguments::new("eth_sendTransaction", tx.clone())).await.unwrap();
    let second = evm.request(RequestArguments::new("eth_sendTransaction", tx)).await.unwrap();

    let first = first.as_str().unwrap();
    assert!(first.starts_with("0x"));
    assert_eq!(first.len(), 66);
    assert_ne!(first, second.as_str().unwrap());
}

#[tokio::test]
async fn test_sign_transaction_rejects_foreign_chain_id() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();

    let err = evm
        .request(RequestArguments::new(
            "eth_signTransaction",
            json!([{ "from": EVM_ADDRESS_0, "to": EVM_ADDRESS_1, "chainId": "0x89" }]),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::INVALID_PARAMS);

    let raw = evm
        .request(RequestArguments::new(
            "eth_signTransaction",
            json!([{ "from": EVM_ADDRESS_0, "to": EVM_ADDRESS_1, "chainId": "0x1", "nonce": "0x5" }]),
        ))
        .await
        .unwrap();
    assert!(raw.as_str().unwrap().starts_with("0x02"), "EIP-1559 envelope expected: {}", raw);
}

#[tokio::test]
async fn test_caller_nonce_bounds() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();

    let send = |nonce: &str| {
        evm.request(RequestArguments::new(
            "eth_sendTransaction",
            json!([{ "from": EVM_ADDRESS_0, "to": EVM_ADDRESS_1, "nonce": nonce }]),
        ))
    };
    let hash = send("0xffffffffffffffff").await.unwrap();
    assert_eq!(hash.as_str().unwrap().len(), 66);

    let err = send("0x10000000000000005").await.unwrap_err();
    assert_eq!(err.code(), codes::INVALID_PARAMS);

    // The local counter saturates instead of wrapping.
    let next = evm
        .request(RequestArguments::new("eth_sendTransaction", json!([{ "from": EVM_ADDRESS_0, "to": EVM_ADDRESS_1 }])))
        .await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_send_from_unconnected_account_is_unauthorized() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let err = wallet
        .evm()
        .request(RequestArguments::new("eth_sendTransaction", json!([{ "from": EVM_ADDRESS_0, "to": EVM_ADDRESS_1 }])))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::UNAUTHORIZED);
}

#[tokio::test]
async fn test_permissions_lifecycle() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();

    let none = evm.request(RequestArguments::method("wallet_getPermissions")).await.unwrap();
    assert_eq!(none, json!([]));

    let granted = evm
        .request(RequestArguments::new("wallet_requestPermissions", json!([{ "eth_accounts": {} }])))
        .await
        .unwrap();
    assert_eq!(granted[0]["parentCapability"], json!("eth_accounts"));
    assert_eq!(granted[0]["caveats"][0]["value"][0], json!(EVM_ADDRESS_0));
    assert!(evm.is_connected());

    let unsupported = evm
        .request(RequestArguments::new("wallet_requestPermissions", json!([{ "eth_sign": {} }])))
        .await
        .unwrap_err();
    assert_eq!(unsupported.code(), codes::INVALID_PARAMS);

    evm.request(RequestArguments::new("wallet_revokePermissions", json!([{ "eth_accounts": {} }])))
        .await
        .unwrap();
    assert!(!evm.is_connected());
}

#[tokio::test]
async fn test_watch_asset() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    let usdc = json!([{
        "type": "ERC20",
        "options": { "address": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "symbol": "USDC", "decimals": 6 }
    }]);

    assert_eq!(evm.request(RequestArguments::new("wallet_watchAsset", usdc.clone())).await.unwrap(), json!(true));
    evm.request(RequestArguments::new("wallet_watchAsset", usdc)).await.unwrap();
    assert_eq!(evm.watched_assets().len(), 1);

    let nft = json!([{ "type": "ERC721", "options": { "address": EVM_ADDRESS_0, "symbol": "NFT", "decimals": 0 } }]);
    let err = evm.request(RequestArguments::new("wallet_watchAsset", nft)).await.unwrap_err();
    assert_eq!(err.code(), codes::INVALID_PARAMS);
}

#[tokio::test]
async fn test_unsupported_method() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let err = wallet.evm().request(RequestArguments::method("eth_subscribe")).await.unwrap_err();
    assert_eq!(err.code(), codes::UNSUPPORTED_METHOD);
    assert_eq!(err.to_rpc_error().code, 4200);
}

#[tokio::test]
async fn test_lock_hides_accounts() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();
    let log = record_evm_events(evm);

    wallet.lock().unwrap();
    assert!(evm.accounts().is_empty());
    assert_eq!(*log.lock(), vec![EvmEvent::AccountsChanged(Vec::new())]);

    let err = evm.connect().unwrap_err();
    assert_eq!(err.code(), codes::UNAUTHORIZED);

    wallet.unlock().unwrap();
    assert_eq!(evm.accounts().len(), 2);
}

#[tokio::test]
async fn test_switch_account_reorders_accounts() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    evm.connect().unwrap();
    let log = record_evm_events(evm);

    wallet.switch_account(1).unwrap();
    assert_eq!(
        *log.lock(),
        vec![EvmEvent::AccountsChanged(vec![EVM_ADDRESS_1.to_string(), EVM_ADDRESS_0.to_string()])]
    );
}

#[tokio::test]
async fn test_removed_listener_not_called() {
    let (_host, wallet) = wallet(two_evm_accounts());
    let evm = wallet.evm();
    let hits = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = std::sync::Arc::clone(&hits);
    let id = evm.on(headless_wallet::provider::evm::EvmEventKind::AccountsChanged, move |_| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });
    assert!(evm.remove_listener(headless_wallet::provider::evm::EvmEventKind::AccountsChanged, id));
    assert!(!evm.remove_listener(headless_wallet::provider::evm::EvmEventKind::AccountsChanged, id));

    evm.connect().unwrap();
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 0);
}
