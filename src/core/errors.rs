use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::security::error_sanitizer::sanitize_error_message;

/// Result alias used across the wallet engine.
pub type Result<T> = std::result::Result<T, WalletError>;

/// Coarse grouping of errors, attached to every serialised error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Connection,
    Account,
    Chain,
    Transaction,
    Signature,
    Security,
    Provider,
    State,
    Storage,
    Network,
}

/// Standard provider error codes (EIP-1193 / EIP-1474).
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_INPUT: i64 = -32000;
    pub const RESOURCE_UNAVAILABLE: i64 = -32002;
    pub const LIMIT_EXCEEDED: i64 = -32005;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
    pub const PRODUCTION_ENVIRONMENT: i64 = 5001;
    pub const UNSAFE_OPERATION: i64 = 5002;
    pub const INVALID_CREDENTIALS: i64 = 5003;
}

/// Error type for every wallet operation.
#[derive(Debug, Error)]
pub enum WalletError {
    /// The provider is disconnected.
    #[error("Wallet is not connected")]
    NotConnected,
    /// A connection is already established or pending.
    #[error("Wallet is already connected")]
    AlreadyConnected,
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// The caller declined (or was not trusted for) the request.
    #[error("User rejected the request: {0}")]
    UserRejected(String),
    /// The requested account or method has not been authorized.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Invalid account format: {0}")]
    InvalidAccountFormat(String),
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("Unrecognized chain: {0}")]
    ChainNotFound(String),
    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    /// The safety guard classified the host as production.
    #[error("Production environment detected: {0}")]
    ProductionEnvironment(String),
    #[error("Unsafe operation: {0}")]
    UnsafeOperation(String),
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("The provider does not support the requested method: {0}")]
    UnsupportedMethod(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A state mutation would break a wallet invariant.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Session error: {0}")]
    Session(String),
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error object returned by a JSON-RPC node, passed through untouched.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String, data: Option<Value> },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// Stable numeric code aligned with EIP-1193 / EIP-1474.
    pub fn code(&self) -> i64 {
        use WalletError::*;
        match self {
            UserRejected(_) | TransactionRejected(_) | SignatureRejected(_) => codes::USER_REJECTED,
            Unauthorized(_) | AccountNotFound(_) => codes::UNAUTHORIZED,
            UnsupportedMethod(_) => codes::UNSUPPORTED_METHOD,
            NotConnected | ConnectionFailed(_) => codes::DISCONNECTED,
            ChainNotFound(_) | UnsupportedChain(_) => codes::UNRECOGNIZED_CHAIN,
            InvalidParams(_)
            | InvalidAccountFormat(_)
            | AccountAlreadyExists(_)
            | InvalidChain(_)
            | InvalidSignature(_) => codes::INVALID_PARAMS,
            InvalidTransaction(_) | InsufficientFunds(_) => codes::INVALID_INPUT,
            AlreadyConnected => codes::RESOURCE_UNAVAILABLE,
            RateLimited(_) => codes::LIMIT_EXCEEDED,
            ProductionEnvironment(_) => codes::PRODUCTION_ENVIRONMENT,
            UnsafeOperation(_) => codes::UNSAFE_OPERATION,
            InvalidCredentials(_) => codes::INVALID_CREDENTIALS,
            Rpc { code, .. } => *code,
            InvalidState(_) | Session(_) | Config(_) | Network(_) | Internal(_) => codes::INTERNAL,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        use WalletError::*;
        match self {
            NotConnected | AlreadyConnected | ConnectionFailed(_) | UserRejected(_) => {
                ErrorCategory::Connection
            }
            AccountNotFound(_) | InvalidAccountFormat(_) | AccountAlreadyExists(_) => {
                ErrorCategory::Account
            }
            UnsupportedChain(_) | ChainNotFound(_) | InvalidChain(_) => ErrorCategory::Chain,
            InvalidTransaction(_) | TransactionRejected(_) | InsufficientFunds(_) => {
                ErrorCategory::Transaction
            }
            InvalidSignature(_) | SignatureRejected(_) => ErrorCategory::Signature,
            ProductionEnvironment(_)
            | UnsafeOperation(_)
            | InvalidCredentials(_)
            | RateLimited(_)
            | Unauthorized(_) => ErrorCategory::Security,
            UnsupportedMethod(_) | InvalidParams(_) => ErrorCategory::Provider,
            InvalidState(_) | Config(_) | Internal(_) => ErrorCategory::State,
            Session(_) => ErrorCategory::Storage,
            Rpc { .. } | Network(_) => ErrorCategory::Network,
        }
    }

    /// Security blocks abort the operation but never the wallet.
    pub fn is_security_block(&self) -> bool {
        matches!(self, WalletError::ProductionEnvironment(_) | WalletError::RateLimited(_))
    }

    /// Serialisable `{code, message, data}` form handed to callers.
    pub fn to_rpc_error(&self) -> ProviderRpcError {
        let message = sanitize_error_message(&self.to_string());
        let mut data = json!({ "category": self.category() });
        if let WalletError::Rpc { data: Some(inner), .. } = self {
            data["detail"] = Value::String(sanitize_error_message(&inner.to_string()));
        }
        ProviderRpcError { code: self.code(), message, data: Some(data) }
    }
}

/// Error object in the shape injected-provider callers expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&WalletError> for ProviderRpcError {
    fn from(err: &WalletError) -> Self {
        err.to_rpc_error()
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::InvalidParams(err.to_string())
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        WalletError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_eip1193() {
        assert_eq!(WalletError::UnsupportedMethod("foo".into()).code(), 4200);
        assert_eq!(WalletError::AccountNotFound("0x1".into()).code(), 4100);
        assert_eq!(WalletError::ChainNotFound("0x99".into()).code(), 4902);
        assert_eq!(WalletError::NotConnected.code(), 4900);
        assert_eq!(WalletError::UserRejected("no".into()).code(), 4001);
    }

    #[test]
    fn test_rpc_passthrough_code() {
        let err = WalletError::Rpc { code: -32010, message: "nonce too low".into(), data: None };
        assert_eq!(err.code(), -32010);
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_rpc_error_payload_is_sanitized() {
        let key = format!("0x{}", "ab".repeat(32));
        let err = WalletError::InvalidAccountFormat(format!("bad key {}", key));
        let payload = err.to_rpc_error();
        assert_eq!(payload.code, -32602);
        assert!(!payload.message.contains(&key));
        assert_eq!(payload.data.unwrap()["category"], "account");
    }
}
