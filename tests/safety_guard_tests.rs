//! tests/safety_guard_tests.rs
//!
//! Environment classification and policy-dependent blocking.

mod common;

use common::*;
use headless_wallet::core::config::{ProductionConfig, RateLimitConfig, SafetyMode, WalletConfig};
use headless_wallet::core::errors::codes;
use headless_wallet::security::{EnvironmentClassifier, ExecutionContext, SafetyGuard, SensitiveOperation, Verdict};
use headless_wallet::{HeadlessWallet, HostPage, RequestArguments};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use test_case::test_case;

fn config_with_mode(mode: SafetyMode) -> WalletConfig {
    WalletConfig {
        production: ProductionConfig { mode, ..Default::default() },
        ..two_evm_accounts()
    }
}

fn context(host: &str, protocol: &str, env: &[(&str, &str)]) -> ExecutionContext {
    ExecutionContext {
        hostname: host.to_string(),
        protocol: protocol.to_string(),
        env: env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>(),
    }
}

#[test_case("localhost", "http:", 0.0 ; "localhost is development")]
#[test_case("127.0.0.1", "http:", 0.0 ; "loopback is development")]
#[test_case("my-branch.ngrok.io", "https:", 0.0 ; "tunnels are development")]
#[test_case("staging.example.com", "https:", 0.0 ; "staging prefix is development")]
#[test_case("app.uniswap.org", "https:", 0.45 ; "public https host")]
fn test_hostname_scoring(host: &str, protocol: &str, expected: f64) {
    let classifier = EnvironmentClassifier::new(&ProductionConfig::default());
    let check = classifier.classify(&context(host, protocol, &[]));
    assert!((check.confidence - expected).abs() < 1e-9, "{} scored {}", host, check.confidence);
    assert!(check.is_valid);
}

#[test]
fn test_production_flag_on_public_host_is_confirmed() {
    let classifier = EnvironmentClassifier::new(&ProductionConfig::default());
    let check = classifier.classify(&context("app.uniswap.org", "https:", &[("NODE_ENV", "production")]));
    assert!(check.confidence >= 0.7);
    assert!(!check.is_valid);
    assert!(check.reasons.iter().any(|r| r.contains("NODE_ENV")));
}

#[test]
fn test_allowed_hosts_override_production_pattern() {
    let config = ProductionConfig { allowed_hosts: vec!["*.uniswap.org".into()], ..Default::default() };
    let check = EnvironmentClassifier::new(&config).classify(&context("app.uniswap.org", "https:", &[]));
    assert!(!check.has_production_signal());
}

#[test]
fn test_explicit_production_hosts_narrow_matching() {
    let config = ProductionConfig { production_hosts: vec!["app.uniswap.org".into()], ..Default::default() };
    let classifier = EnvironmentClassifier::new(&config);
    let other = classifier.classify(&context("docs.example.org", "http:", &[]));
    assert!(!other.has_production_signal());
    let listed = classifier.classify(&context("app.uniswap.org", "https:", &[]));
    assert!(listed.has_production_signal());
}

#[test]
fn test_verdict_per_mode() {
    let host = Arc::new(HostPage::new("https://app.uniswap.org").unwrap());
    let check = |mode| {
        let guard = SafetyGuard::new(&ProductionConfig { mode, ..Default::default() }, Arc::clone(&host));
        let env = guard.check_environment();
        guard.verdict(&env)
    };
    assert_eq!(check(SafetyMode::Permissive), Verdict::Warn);
    assert_eq!(check(SafetyMode::Standard), Verdict::Warn);
    assert_eq!(check(SafetyMode::Strict), Verdict::Block);
}

#[tokio::test]
async fn test_strict_blocks_on_production_host_permissive_allows() {
    let host = Arc::new(HostPage::new("https://app.uniswap.org").unwrap());

    let strict = HeadlessWallet::new(config_with_mode(SafetyMode::Strict), Arc::clone(&host)).unwrap();
    let err = strict.evm().connect().unwrap_err();
    assert_eq!(err.code(), codes::PRODUCTION_ENVIRONMENT);
    assert!(!strict.evm().is_connected());
    drop(strict);

    let permissive = HeadlessWallet::new(config_with_mode(SafetyMode::Permissive), Arc::clone(&host)).unwrap();
    let accounts = permissive.evm().connect().unwrap();
    assert_eq!(accounts.len(), 2);
}

#[tokio::test]
async fn test_standard_blocks_confirmed_production() {
    let host = Arc::new(HostPage::new("https://app.uniswap.org").unwrap().with_env("NODE_ENV", "production"));
    let wallet = HeadlessWallet::new(config_with_mode(SafetyMode::Standard), host).unwrap();
    let err = wallet
        .evm()
        .request(RequestArguments::method("eth_requestAccounts"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::PRODUCTION_ENVIRONMENT);
}

#[tokio::test]
async fn test_block_is_recoverable_after_navigation() {
    let host = Arc::new(HostPage::new("https://app.uniswap.org").unwrap());
    let wallet = HeadlessWallet::new(config_with_mode(SafetyMode::Strict), Arc::clone(&host)).unwrap();
    assert!(wallet.evm().connect().is_err());

    host.navigate("http://localhost:5173/").unwrap();
    assert_eq!(wallet.evm().connect().unwrap().len(), 2);
}

#[tokio::test]
async fn test_rate_limit_applies_per_operation() {
    let config = WalletConfig {
        production: ProductionConfig {
            rate_limit: RateLimitConfig { max_operations: 2, window_secs: 60 },
            ..Default::default()
        },
        ..two_evm_accounts()
    };
    let (_host, wallet) = wallet(config);
    let evm = wallet.evm();
    evm.connect().unwrap();

    let sign = || evm.request(RequestArguments::new("personal_sign", json!(["hi", EVM_ADDRESS_0])));
    sign().await.unwrap();
    sign().await.unwrap();
    let err = sign().await.unwrap_err();
    assert_eq!(err.code(), codes::LIMIT_EXCEEDED);

    // Other operations have their own budget.
    wallet.guard().assert_safe(SensitiveOperation::NetworkCall).unwrap();
}

#[test]
fn test_check_environment_serialises() {
    let guard = SafetyGuard::new(&ProductionConfig::default(), Arc::new(HostPage::localhost()));
    let json = serde_json::to_value(guard.check_environment()).unwrap();
    assert_eq!(json["isValid"], serde_json::Value::Bool(true));
    assert!(json["signals"].as_array().is_some());
}

#[test]
fn test_query_and_fragment_do_not_change_host_signal() {
    let classifier = EnvironmentClassifier::new(&ProductionConfig::default());
    for url in ["http://localhost?debug=1", "http://localhost:5173#/swap"] {
        let page = HostPage::new(url).unwrap();
        let check = classifier.classify(&ExecutionContext::from_host(&page));
        assert_eq!(check.confidence, 0.0, "{} scored {}", url, check.confidence);
    }
}
