use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use tracing::warn;

use crate::core::errors::{Result, WalletError};

/// Which key payload an account carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    #[default]
    Evm,
    Solana,
    Dual,
}

/// One configured account. Missing key material is generated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: AccountKind,
    /// secp256k1 private key, hex
    #[serde(default)]
    pub private_key: Option<SecretString>,
    /// ed25519 seed or keypair, base58 / hex / JSON byte array
    #[serde(default)]
    pub secret_key: Option<SecretString>,
    #[serde(default)]
    pub chain_ids: Vec<u64>,
    #[serde(default)]
    pub clusters: Vec<String>,
}

impl AccountConfig {
    pub fn evm(private_key: &str) -> Self {
        Self {
            kind: AccountKind::Evm,
            private_key: Some(SecretString::new(private_key.to_string())),
            ..Default::default()
        }
    }

    pub fn solana(secret_key: &str) -> Self {
        Self {
            kind: AccountKind::Solana,
            secret_key: Some(SecretString::new(secret_key.to_string())),
            ..Default::default()
        }
    }

    pub fn dual(private_key: &str, secret_key: &str) -> Self {
        Self {
            kind: AccountKind::Dual,
            private_key: Some(SecretString::new(private_key.to_string())),
            secret_key: Some(SecretString::new(secret_key.to_string())),
            ..Default::default()
        }
    }

    /// Account whose keys are generated at creation time.
    pub fn generated(kind: AccountKind) -> Self {
        Self { kind, ..Default::default() }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

/// EIP-6963 provider info.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandingConfig {
    #[serde(default = "BrandingConfig::default_name")]
    pub name: String,
    #[serde(default = "BrandingConfig::default_icon")]
    pub icon: String,
    #[serde(default = "BrandingConfig::default_rdns", alias = "reverseDomainId")]
    pub rdns: String,
    /// Stable announce uuid; generated per wallet when absent.
    #[serde(default)]
    pub uuid: Option<String>,
}

impl BrandingConfig {
    fn default_name() -> String {
        "Headless Wallet".to_string()
    }
    fn default_icon() -> String {
        "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHZpZXdCb3g9IjAgMCAzMiAzMiI+PHJlY3Qgd2lkdGg9IjMyIiBoZWlnaHQ9IjMyIiByeD0iOCIgZmlsbD0iIzFmMjkzNyIvPjwvc3ZnPg==".to_string()
    }
    fn default_rdns() -> String {
        "dev.headless-wallet".to_string()
    }
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            icon: Self::default_icon(),
            rdns: Self::default_rdns(),
            uuid: None,
        }
    }
}

/// Extra EVM chain definition supplied through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmChainConfig {
    pub chain_id: u64,
    pub name: String,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub currency_symbol: Option<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
    #[serde(default)]
    pub testnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmConfig {
    /// RPC endpoint of the default chain
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Per-chain RPC endpoints keyed by chain id (decimal or 0x hex)
    #[serde(default)]
    pub transports: HashMap<String, String>,
    #[serde(default)]
    pub default_chain: Option<u64>,
    #[serde(default)]
    pub chains: Vec<EvmChainConfig>,
    /// When true, signed transactions are hashed locally instead of broadcast.
    #[serde(default = "default_true")]
    pub simulate_transactions: bool,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            transports: HashMap::new(),
            default_chain: None,
            chains: Vec::new(),
            simulate_transactions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaConfig {
    #[serde(default = "SolanaConfig::default_cluster")]
    pub cluster: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default = "default_true")]
    pub simulate_transactions: bool,
}

impl SolanaConfig {
    fn default_cluster() -> String {
        "devnet".to_string()
    }
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self { cluster: Self::default_cluster(), rpc_url: None, simulate_transactions: true }
    }
}

/// How the EVM provider is exposed on the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvmInjection {
    /// Overwrite `ethereum`, restoring the previous value on teardown.
    #[default]
    Replace,
    /// Join the list of coexisting providers under `ethereum`.
    Append,
    /// No global attachment; discovery only.
    AnnounceOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolanaInjection {
    /// Attach under `InjectionConfig::solana_path`.
    #[default]
    Global,
    /// Register through the Wallet Standard handshake only.
    WalletStandard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionConfig {
    #[serde(default)]
    pub evm: EvmInjection,
    #[serde(default)]
    pub solana: SolanaInjection,
    #[serde(default = "InjectionConfig::default_solana_path")]
    pub solana_path: String,
}

impl InjectionConfig {
    fn default_solana_path() -> String {
        "solana".to_string()
    }
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            evm: EvmInjection::default(),
            solana: SolanaInjection::default(),
            solana_path: Self::default_solana_path(),
        }
    }
}

/// Safety guard policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    /// Warn only.
    Permissive,
    /// Warn, block confirmed production environments.
    #[default]
    Standard,
    /// Block on any production signal.
    Strict,
}

impl std::str::FromStr for SafetyMode {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "permissive" => Ok(SafetyMode::Permissive),
            "standard" => Ok(SafetyMode::Standard),
            "strict" => Ok(SafetyMode::Strict),
            other => Err(WalletError::Config(format!("Unknown safety mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_max_operations")]
    pub max_operations: u32,
    #[serde(default = "RateLimitConfig::default_window_secs")]
    pub window_secs: u64,
}

impl RateLimitConfig {
    fn default_max_operations() -> u32 {
        60
    }
    fn default_window_secs() -> u64 {
        60
    }

    pub fn window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_operations: Self::default_max_operations(),
            window_secs: Self::default_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionConfig {
    #[serde(default)]
    pub mode: SafetyMode,
    /// Hosts always treated as development (`name` or `*.suffix`)
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Known production hosts (`name` or `*.suffix`); empty means any public host
    #[serde(default)]
    pub production_hosts: Vec<String>,
    #[serde(default = "ProductionConfig::default_confirm_threshold")]
    pub confirm_threshold: f64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl ProductionConfig {
    fn default_confirm_threshold() -> f64 {
        0.7
    }
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            mode: SafetyMode::default(),
            allowed_hosts: Vec::new(),
            production_hosts: Vec::new(),
            confirm_threshold: Self::default_confirm_threshold(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "SessionConfig::default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "SessionConfig::default_storage_key")]
    pub storage_key: String,
    #[serde(default = "SessionConfig::default_debounce_ms")]
    pub debounce_ms: u64,
}

impl SessionConfig {
    fn default_ttl_secs() -> u64 {
        24 * 60 * 60
    }
    fn default_storage_key() -> String {
        "headless-wallet:session".to_string()
    }
    fn default_debounce_ms() -> u64 {
        50
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: Self::default_ttl_secs(),
            storage_key: Self::default_storage_key(),
            debounce_ms: Self::default_debounce_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Active EVM chain when `evm.defaultChain` is not set.
pub const DEFAULT_EVM_CHAIN: u64 = 1;

/// Top-level wallet configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConfig {
    /// Wallet instance id used by the bridge and the session key; defaults to `branding.rdns`.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub branding: BrandingConfig,
    #[serde(default)]
    pub evm: EvmConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub injection: InjectionConfig,
    #[serde(default)]
    pub production: ProductionConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl WalletConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| WalletError::Config(e.to_string()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| WalletError::Config(e.to_string()))
    }

    /// Overlay `HEADLESS_WALLET_*` environment variables.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(value) = env::var("HEADLESS_WALLET_DEBUG") {
            self.debug = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(url) = env::var("HEADLESS_WALLET_EVM_RPC_URL") {
            self.evm.rpc_url = Some(url);
        }
        if let Ok(chain) = env::var("HEADLESS_WALLET_EVM_CHAIN") {
            self.evm.default_chain = Some(crate::core::validation::parse_chain_id(&chain)?);
        }
        if let Ok(url) = env::var("HEADLESS_WALLET_SOLANA_RPC_URL") {
            self.solana.rpc_url = Some(url);
        }
        if let Ok(cluster) = env::var("HEADLESS_WALLET_SOLANA_CLUSTER") {
            self.solana.cluster = cluster;
        }
        if let Ok(mode) = env::var("HEADLESS_WALLET_SAFETY_MODE") {
            self.production.mode = mode.parse()?;
        }
        if let Ok(key) = env::var("HEADLESS_WALLET_PRIVATE_KEY") {
            if self.accounts.iter().any(|a| a.private_key.is_some()) {
                warn!("HEADLESS_WALLET_PRIVATE_KEY set alongside configured EVM keys; appending");
            }
            self.accounts.push(AccountConfig::evm(&key));
        }
        Ok(self)
    }

    /// RPC endpoint override for an EVM chain, if configured.
    pub fn evm_transport_for(&self, chain_id: u64) -> Option<String> {
        let from_map = self.evm.transports.iter().find_map(|(key, url)| {
            match crate::core::validation::parse_chain_id(key) {
                Ok(id) if id == chain_id => Some(url.clone()),
                _ => None,
            }
        });
        // `rpcUrl` belongs to the default chain only; other chains keep their preset RPC.
        from_map.or_else(|| {
            (self.evm.default_chain.unwrap_or(DEFAULT_EVM_CHAIN) == chain_id)
                .then(|| self.evm.rpc_url.clone())
                .flatten()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WalletConfig::default();
        assert_eq!(config.production.mode, SafetyMode::Standard);
        assert!(config.session.enabled);
        assert!(config.evm.simulate_transactions);
        assert_eq!(config.solana.cluster, "devnet");
        assert_eq!(config.injection.solana_path, "solana");
    }

    #[test]
    fn test_parse_json_camel_case() {
        let raw = r#"{
            "accounts": [{"type": "solana"}, {"privateKey": "0x01"}],
            "branding": {"name": "Test", "reverseDomainId": "com.example"},
            "evm": {"defaultChain": 31337, "transports": {"0x1": "http://mainnet"}},
            "injection": {"evm": "announceOnly", "solana": "walletStandard"},
            "production": {"mode": "strict"},
            "autoConnect": true
        }"#;
        let config = WalletConfig::from_json_str(raw).unwrap();
        assert_eq!(config.accounts[0].kind, AccountKind::Solana);
        assert_eq!(config.accounts[1].kind, AccountKind::Evm);
        assert_eq!(config.branding.rdns, "com.example");
        assert_eq!(config.injection.evm, EvmInjection::AnnounceOnly);
        assert_eq!(config.injection.solana, SolanaInjection::WalletStandard);
        assert_eq!(config.production.mode, SafetyMode::Strict);
        assert!(config.auto_connect);
        assert_eq!(config.evm_transport_for(1).as_deref(), Some("http://mainnet"));
        assert_eq!(config.evm_transport_for(5), None);
    }

    #[test]
    fn test_rpc_url_applies_to_default_chain_only() {
        let config = WalletConfig::from_json_str(r#"{"evm": {"rpcUrl": "http://mainnet"}}"#).unwrap();
        assert_eq!(config.evm_transport_for(DEFAULT_EVM_CHAIN).as_deref(), Some("http://mainnet"));
        assert_eq!(config.evm_transport_for(137), None);

        let polygon =
            WalletConfig::from_json_str(r#"{"evm": {"rpcUrl": "http://polygon", "defaultChain": 137}}"#).unwrap();
        assert_eq!(polygon.evm_transport_for(137).as_deref(), Some("http://polygon"));
        assert_eq!(polygon.evm_transport_for(1), None);
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            debug = true
            [solana]
            cluster = "localnet"
            rpcUrl = "http://127.0.0.1:8899"
        "#;
        let config = WalletConfig::from_toml_str(raw).unwrap();
        assert!(config.debug);
        assert_eq!(config.solana.cluster, "localnet");
    }

    #[test]
    fn test_unknown_safety_mode() {
        assert!("paranoid".parse::<SafetyMode>().is_err());
        assert_eq!("STRICT".parse::<SafetyMode>().unwrap(), SafetyMode::Strict);
    }
}
