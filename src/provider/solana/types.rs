use serde::{Deserialize, Serialize};

/// Wallet Standard feature names the provider implements.
pub const FEATURES: &[&str] = &[
    "standard:connect",
    "standard:disconnect",
    "standard:events",
    "solana:signMessage",
    "solana:signTransaction",
    "solana:signAndSendTransaction",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolanaEventKind {
    Connect,
    Disconnect,
    Change,
}

impl SolanaEventKind {
    pub const ALL: [SolanaEventKind; 3] =
        [SolanaEventKind::Connect, SolanaEventKind::Disconnect, SolanaEventKind::Change];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(SolanaEventKind::Connect),
            "disconnect" => Some(SolanaEventKind::Disconnect),
            "change" | "accountChanged" => Some(SolanaEventKind::Change),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolanaEvent {
    Connect { public_key: String },
    Disconnect,
    Change { accounts: Vec<WalletAccount> },
}

impl SolanaEvent {
    pub fn kind(&self) -> SolanaEventKind {
        match self {
            SolanaEvent::Connect { .. } => SolanaEventKind::Connect,
            SolanaEvent::Disconnect => SolanaEventKind::Disconnect,
            SolanaEvent::Change { .. } => SolanaEventKind::Change,
        }
    }
}

/// Wallet Standard account descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    pub address: String,
    pub public_key: Vec<u8>,
    pub chains: Vec<String>,
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    #[serde(default)]
    pub only_if_trusted: bool,
}

impl ConnectOptions {
    pub fn trusted_only() -> Self {
        Self { only_if_trusted: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectOutput {
    pub accounts: Vec<WalletAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignMessageInput {
    /// Base58 address of the signing account.
    pub account: String,
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageOutput {
    pub signed_message: Vec<u8>,
    pub signature: Vec<u8>,
    pub signature_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignTransactionInput {
    pub account: String,
    /// Wire-format transaction.
    pub transaction: Vec<u8>,
    /// Wallet Standard chain id (`solana:devnet`); the active cluster when absent.
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionOutput {
    pub signed_transaction: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default)]
    pub skip_preflight: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight_commitment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignAndSendTransactionInput {
    pub account: String,
    pub transaction: Vec<u8>,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub options: Option<SendOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignAndSendTransactionOutput {
    /// Base58 transaction signature.
    pub signature: String,
}
