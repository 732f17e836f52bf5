//! Narrow JSON-RPC capability used by the pool
//!
//! The pool only ever issues pass-through method calls (nonce queries,
//! raw transaction submission, receipt lookups), so the seam is a small
//! trait rather than a full client. Production uses an ethers HTTP
//! provider; tests substitute a mock.

use crate::error::{PoolError, PoolResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use serde_json::Value;
use tracing::debug;

/// Remote ledger interface: synchronous calls and fire-and-forget sends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Issue an RPC call and return the raw JSON result.
    async fn call(&self, method: &str, params: Vec<Value>) -> PoolResult<Value>;

    /// Submit an RPC call without interpreting the response.
    async fn send(&self, method: &str, params: Vec<Value>) -> PoolResult<()>;
}

/// HTTP JSON-RPC client backed by an ethers provider.
pub struct HttpRpc {
    inner: Provider<Http>,
}

impl HttpRpc {
    /// Connect to a node and verify it answers.
    ///
    /// Failure here is the only fatal error in the system; everything
    /// downstream degrades per-request.
    pub async fn connect(url: &str) -> PoolResult<Self> {
        let inner = Provider::<Http>::try_from(url)
            .map_err(|e| PoolError::Rpc(format!("invalid RPC URL {}: {}", url, e)))?;

        let block = inner
            .get_block_number()
            .await
            .map_err(|e| PoolError::Rpc(format!("node unreachable at {}: {}", url, e)))?;
        debug!("Connected to {} at block {}", url, block);

        Ok(Self { inner })
    }
}

#[async_trait]
impl LedgerRpc for HttpRpc {
    async fn call(&self, method: &str, params: Vec<Value>) -> PoolResult<Value> {
        self.inner
            .request(method, params)
            .await
            .map_err(|e| PoolError::Rpc(e.to_string()))
    }

    async fn send(&self, method: &str, params: Vec<Value>) -> PoolResult<()> {
        // Over HTTP the round trip happens either way; fire-and-forget
        // means the response body is discarded uninterpreted.
        let _: Value = self
            .inner
            .request(method, params)
            .await
            .map_err(|e| PoolError::Rpc(e.to_string()))?;
        Ok(())
    }
}

/// Parse a JSON-RPC hex quantity (e.g. `"0x1a"`) into a u64.
pub fn parse_hex_u64(value: &Value) -> PoolResult<u64> {
    let text = value
        .as_str()
        .ok_or_else(|| PoolError::Rpc(format!("expected hex quantity, got {}", value)))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16)
        .map_err(|e| PoolError::Rpc(format!("invalid hex quantity {}: {}", text, e)))
}
