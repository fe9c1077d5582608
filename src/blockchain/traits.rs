use async_trait::async_trait;
use serde_json::Value;

use crate::core::errors::WalletError;

/// A JSON-RPC 2.0 endpoint.
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
    /// Sends one request and returns its `result`, or the node's error object as
    /// [`WalletError::Rpc`].
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;

    /// Endpoint URL, for logging and cache keys.
    fn endpoint(&self) -> &str;
}
