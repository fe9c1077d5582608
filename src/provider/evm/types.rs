use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ProviderRpcError;

/// Argument of `request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: &str, params: Value) -> Self {
        Self { method: method.to_string(), params: Some(params) }
    }

    pub fn method(method: &str) -> Self {
        Self { method: method.to_string(), params: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvmEventKind {
    Connect,
    Disconnect,
    AccountsChanged,
    ChainChanged,
    Message,
}

impl EvmEventKind {
    pub const ALL: [EvmEventKind; 5] = [
        EvmEventKind::Connect,
        EvmEventKind::Disconnect,
        EvmEventKind::AccountsChanged,
        EvmEventKind::ChainChanged,
        EvmEventKind::Message,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(EvmEventKind::Connect),
            "disconnect" => Some(EvmEventKind::Disconnect),
            "accountsChanged" => Some(EvmEventKind::AccountsChanged),
            "chainChanged" => Some(EvmEventKind::ChainChanged),
            "message" => Some(EvmEventKind::Message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    pub chain_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvmEvent {
    Connect(ConnectInfo),
    Disconnect(ProviderRpcError),
    AccountsChanged(Vec<String>),
    ChainChanged(String),
    Message(ProviderMessage),
}

impl EvmEvent {
    pub fn kind(&self) -> EvmEventKind {
        match self {
            EvmEvent::Connect(_) => EvmEventKind::Connect,
            EvmEvent::Disconnect(_) => EvmEventKind::Disconnect,
            EvmEvent::AccountsChanged(_) => EvmEventKind::AccountsChanged,
            EvmEvent::ChainChanged(_) => EvmEventKind::ChainChanged,
            EvmEvent::Message(_) => EvmEventKind::Message,
        }
    }
}

/// `eth_sendTransaction` / `eth_signTransaction` parameter object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default, alias = "input")]
    pub data: Option<String>,
    #[serde(default, alias = "gasLimit")]
    pub gas: Option<Value>,
    #[serde(default)]
    pub gas_price: Option<Value>,
    #[serde(default)]
    pub max_fee_per_gas: Option<Value>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<Value>,
    #[serde(default)]
    pub nonce: Option<Value>,
    #[serde(default)]
    pub chain_id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainNativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// `wallet_addEthereumChain` parameter (EIP-3085).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: Option<AddChainNativeCurrency>,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
    #[serde(default)]
    pub icon_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchChainParams {
    pub chain_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchAssetOptions {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// `wallet_watchAsset` parameter (EIP-747).
#[derive(Debug, Clone, Deserialize)]
pub struct WatchAssetParams {
    #[serde(rename = "type")]
    pub kind: String,
    pub options: WatchAssetOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedAsset {
    pub chain_id: u64,
    #[serde(flatten)]
    pub options: WatchAssetOptions,
}
