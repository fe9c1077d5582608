//! Read-only RPC access for both chain families.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::traits::JsonRpcTransport;
use crate::core::errors::{Result, WalletError};
use crate::security::error_sanitizer::sanitize_for_logging;

/// Responses that never change for a given endpoint.
const IMMUTABLE_METHODS: &[&str] = &["eth_chainId", "net_version", "getGenesisHash"];

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<Self> {
        let url = url.trim();
        reqwest::Url::parse(url).map_err(|e| WalletError::Config(format!("invalid RPC url '{}': {}", url, e)))?;
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if let Ok(proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("HTTP_PROXY")) {
            if let Ok(p) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(p.no_proxy(reqwest::NoProxy::from_env()));
            }
        }
        let client = builder
            .build()
            .map_err(|e| WalletError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url: url.to_string(), next_id: AtomicU64::new(1) })
    }
}

#[async_trait]
impl JsonRpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(endpoint = %self.url, method, id, "rpc request");

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| WalletError::Network(format!("rpc status {}: {}", status, e)))?;

        if let Some(err) = body.get("error") {
            return Err(WalletError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("rpc error")
                    .to_string(),
                data: err.get("data").cloned(),
            });
        }
        if !status.is_success() {
            return Err(WalletError::Network(format!(
                "rpc status {}: {}",
                status,
                sanitize_for_logging(&body.to_string())
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| WalletError::Network("rpc response has no result".into()))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Transports and immutable responses cached per endpoint for the wallet's lifetime.
#[derive(Default)]
pub struct RpcPool {
    transports: Mutex<HashMap<String, Arc<dyn JsonRpcTransport>>>,
    responses: Mutex<HashMap<(String, String), Value>>,
}

impl RpcPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom transport for `endpoint` (replacing any cached one).
    pub fn insert(&self, endpoint: &str, transport: Arc<dyn JsonRpcTransport>) {
        self.transports.lock().insert(endpoint.to_string(), transport);
    }

    pub fn transport(&self, endpoint: &str) -> Result<Arc<dyn JsonRpcTransport>> {
        let mut transports = self.transports.lock();
        if let Some(existing) = transports.get(endpoint) {
            return Ok(Arc::clone(existing));
        }
        let transport: Arc<dyn JsonRpcTransport> = Arc::new(HttpTransport::new(endpoint)?);
        transports.insert(endpoint.to_string(), Arc::clone(&transport));
        Ok(transport)
    }

    pub fn transport_count(&self) -> usize {
        self.transports.lock().len()
    }

    /// Calls `method` on `endpoint`. Errors propagate without retry.
    pub async fn request(&self, endpoint: &str, method: &str, params: Value) -> Result<Value> {
        let cacheable = IMMUTABLE_METHODS.contains(&method);
        let key = (endpoint.to_string(), method.to_string());
        if cacheable {
            if let Some(hit) = self.responses.lock().get(&key) {
                debug!(endpoint, method, "rpc cache hit");
                return Ok(hit.clone());
            }
        }
        let transport = self.transport(endpoint)?;
        let result = transport.request(method, params).await?;
        if cacheable {
            self.responses.lock().insert(key, result.clone());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTransport {
        calls: AtomicU64,
    }

    #[async_trait]
    impl JsonRpcTransport for CountingTransport {
        async fn request(&self, method: &str, _params: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match method {
                "eth_chainId" => Ok(json!("0x1")),
                "eth_blockNumber" => Ok(json!("0x10")),
                _ => Err(WalletError::Rpc { code: -32601, message: "method not found".into(), data: None }),
            }
        }

        fn endpoint(&self) -> &str {
            "mock://node"
        }
    }

    #[tokio::test]
    async fn test_immutable_responses_are_cached() {
        let pool = RpcPool::new();
        let transport = Arc::new(CountingTransport { calls: AtomicU64::new(0) });
        pool.insert("mock://node", transport.clone());

        for _ in 0..3 {
            assert_eq!(pool.request("mock://node", "eth_chainId", json!([])).await.unwrap(), json!("0x1"));
            pool.request("mock://node", "eth_blockNumber", json!([])).await.unwrap();
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_rpc_errors_pass_through() {
        let pool = RpcPool::new();
        pool.insert("mock://node", Arc::new(CountingTransport { calls: AtomicU64::new(0) }));
        let err = pool.request("mock://node", "eth_foo", json!([])).await.unwrap_err();
        assert_eq!(err.code(), -32601);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(RpcPool::new().transport("not a url").is_err());
    }
}
