//! Request routing for out-of-process drivers.
//!
//! A test runner talks to wallets by id: each [`BridgeRequest`] names a wallet, a provider
//! surface and a method, and gets back a [`BridgeResponse`] carrying either a result or an
//! EIP-1193 style error object.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::account::Account;
use crate::core::config::{AccountConfig, WalletConfig};
use crate::core::errors::{ProviderRpcError, Result, WalletError};
use crate::host::HostPage;
use crate::provider::evm::RequestArguments;
use crate::service::wallet::HeadlessWallet;

/// Which surface of the wallet a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeProvider {
    #[default]
    Evm,
    Solana,
    /// Administrative calls on the wallet itself.
    Wallet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    /// Echoed back for correlation.
    #[serde(default)]
    pub id: Option<Value>,
    /// Target wallet; may be omitted while exactly one wallet is registered.
    #[serde(default)]
    pub wallet_id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub provider: BridgeProvider,
}

impl BridgeRequest {
    pub fn new(wallet_id: &str, provider: BridgeProvider, method: &str, params: Value) -> Self {
        Self {
            id: None,
            wallet_id: Some(wallet_id.to_string()),
            method: method.to_string(),
            params: Some(params),
            provider,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderRpcError>,
}

impl BridgeResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn failure(id: Option<Value>, err: &WalletError) -> Self {
        Self { id, result: None, error: Some(err.to_rpc_error()) }
    }

    /// JSON-RPC parse error for a line that was not a request.
    pub fn parse_error(detail: &str) -> Self {
        Self {
            id: None,
            result: None,
            error: Some(ProviderRpcError { code: -32700, message: format!("Parse error: {}", detail), data: None }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub struct WalletBridge {
    host: Arc<HostPage>,
    wallets: RwLock<BTreeMap<String, Arc<HeadlessWallet>>>,
}

impl WalletBridge {
    pub fn new(host: Arc<HostPage>) -> Self {
        Self { host, wallets: RwLock::new(BTreeMap::new()) }
    }

    pub fn host(&self) -> &Arc<HostPage> {
        &self.host
    }

    pub fn register(&self, wallet: Arc<HeadlessWallet>) -> Result<()> {
        let mut wallets = self.wallets.write();
        if wallets.contains_key(wallet.id()) {
            return Err(WalletError::InvalidParams(format!("wallet {} is already registered", wallet.id())));
        }
        info!(wallet = %wallet.id(), "wallet registered with bridge");
        wallets.insert(wallet.id().to_string(), wallet);
        Ok(())
    }

    /// Builds a wallet on the bridge's page and registers it.
    pub fn create(&self, config: WalletConfig) -> Result<Arc<HeadlessWallet>> {
        if let Some(id) = &config.id {
            if self.wallets.read().contains_key(id) {
                return Err(WalletError::InvalidParams(format!("wallet {} is already registered", id)));
            }
        }
        let wallet = Arc::new(HeadlessWallet::new(config, Arc::clone(&self.host))?);
        self.register(Arc::clone(&wallet))?;
        Ok(wallet)
    }

    /// Tears the wallet down and forgets it.
    pub fn remove(&self, id: &str) -> bool {
        match self.wallets.write().remove(id) {
            Some(wallet) => {
                wallet.teardown();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<HeadlessWallet>> {
        self.wallets.read().get(id).cloned()
    }

    pub fn wallet_ids(&self) -> Vec<String> {
        self.wallets.read().keys().cloned().collect()
    }

    fn resolve(&self, id: Option<&str>) -> Result<Arc<HeadlessWallet>> {
        match id {
            Some(id) => self.get(id).ok_or_else(|| WalletError::InvalidParams(format!("unknown wallet {}", id))),
            None => {
                let wallets = self.wallets.read();
                match wallets.len() {
                    1 => Ok(wallets.values().next().cloned().ok_or_else(|| {
                        WalletError::Internal("wallet registry changed during lookup".into())
                    })?),
                    0 => Err(WalletError::InvalidParams("no wallet registered".into())),
                    _ => Err(WalletError::InvalidParams("walletId is required with several wallets".into())),
                }
            }
        }
    }

    pub async fn dispatch(&self, request: BridgeRequest) -> BridgeResponse {
        debug!(
            wallet = ?request.wallet_id,
            provider = ?request.provider,
            method = %request.method,
            "bridge request"
        );
        let id = request.id.clone();
        match self.route(request).await {
            Ok(result) => BridgeResponse::success(id, result),
            Err(err) => BridgeResponse::failure(id, &err),
        }
    }

    async fn route(&self, request: BridgeRequest) -> Result<Value> {
        match request.provider {
            BridgeProvider::Wallet => self.admin(request),
            BridgeProvider::Evm => {
                let wallet = self.resolve(request.wallet_id.as_deref())?;
                wallet
                    .evm()
                    .request(RequestArguments { method: request.method, params: request.params })
                    .await
            }
            BridgeProvider::Solana => {
                let wallet = self.resolve(request.wallet_id.as_deref())?;
                wallet.solana().request(&request.method, request.params).await
            }
        }
    }

    fn admin(&self, request: BridgeRequest) -> Result<Value> {
        let params = request.params.unwrap_or(Value::Null);
        match request.method.as_str() {
            "createWallet" => {
                let mut config: WalletConfig =
                    if params.is_null() { WalletConfig::default() } else { serde_json::from_value(params)? };
                if config.id.is_none() {
                    config.id = request.wallet_id.clone();
                }
                let wallet = self.create(config)?;
                Ok(json!({ "walletId": wallet.id() }))
            }
            "listWallets" => Ok(json!(self.wallet_ids())),
            "removeWallet" => {
                let id = request
                    .wallet_id
                    .as_deref()
                    .ok_or_else(|| WalletError::InvalidParams("walletId is required".into()))?;
                Ok(json!(self.remove(id)))
            }
            "navigate" => {
                let url = str_param(&params, "url")?;
                self.host.navigate(url)?;
                Ok(json!(self.host.origin()))
            }
            method => {
                let wallet = self.resolve(request.wallet_id.as_deref())?;
                wallet_admin(&wallet, method, &params)
            }
        }
    }
}

fn str_param<'v>(params: &'v Value, name: &str) -> Result<&'v str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| WalletError::InvalidParams(format!("missing string parameter '{}'", name)))
}

fn account_summary(account: &Account) -> Value {
    json!({
        "id": account.id,
        "label": account.label,
        "type": account.kind(),
        "evmAddress": account.evm_address(),
        "solanaAddress": account.solana_address(),
        "active": account.active,
        "createdAt": account.created_at.to_rfc3339(),
    })
}

fn wallet_admin(wallet: &HeadlessWallet, method: &str, params: &Value) -> Result<Value> {
    match method {
        "getState" => {
            let state = wallet.state();
            Ok(json!({
                "walletId": wallet.id(),
                "accounts": state.accounts.list().iter().map(account_summary).collect::<Vec<_>>(),
                "activeAccountIndex": state.active_account_index,
                "evmChainId": state.chains.active_evm().map(|c| c.chain_id_hex.clone()),
                "solanaCluster": state.chains.active_solana().map(|c| c.name.clone()),
                "isConnected": state.is_connected,
                "solanaConnected": wallet.solana().is_connected(),
                "isLocked": state.is_locked,
                "isInjected": wallet.is_injected(),
            }))
        }
        "addAccount" => {
            let config: AccountConfig = serde_json::from_value(params.clone())?;
            Ok(account_summary(&wallet.add_account(&config)?))
        }
        "removeAccount" => Ok(account_summary(&wallet.remove_account(str_param(params, "id")?)?)),
        "switchAccount" => {
            let index = params
                .get("index")
                .and_then(Value::as_u64)
                .ok_or_else(|| WalletError::InvalidParams("missing numeric parameter 'index'".into()))?;
            wallet.switch_account(index as usize)?;
            Ok(Value::Null)
        }
        "switchEvmChain" => {
            let chain_id = match params.get("chainId") {
                Some(Value::Number(n)) => n
                    .as_u64()
                    .ok_or_else(|| WalletError::InvalidParams(format!("invalid chainId {}", n)))?,
                Some(Value::String(s)) => crate::core::validation::parse_chain_id(s)?,
                _ => return Err(WalletError::InvalidParams("missing parameter 'chainId'".into())),
            };
            Ok(json!(wallet.switch_evm_chain(chain_id)?))
        }
        "switchSolanaCluster" => Ok(json!(wallet.switch_solana_cluster(str_param(params, "cluster")?)?)),
        "lock" => wallet.lock().map(|_| Value::Null),
        "unlock" => wallet.unlock().map(|_| Value::Null),
        "disconnect" => wallet.disconnect().map(|_| Value::Null),
        "inject" => wallet.inject().map(|_| Value::Null),
        "teardown" => {
            wallet.teardown();
            Ok(Value::Null)
        }
        "checkEnvironment" => Ok(serde_json::to_value(wallet.guard().check_environment())?),
        other => Err(WalletError::UnsupportedMethod(other.to_string())),
    }
}
