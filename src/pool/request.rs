//! Request and result types flowing through the pool

use crate::error::{PoolError, PoolResult};

use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, H256};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

/// Lazy producer of call arguments, evaluated at batch-processing time so
/// arguments can reflect the freshest external state.
#[async_trait]
pub trait ArgProvider: Send + Sync {
    async fn produce_args(&self) -> PoolResult<Vec<Token>>;
}

/// Adapter for plain closures.
pub struct FnArgs<F>(pub F);

#[async_trait]
impl<F> ArgProvider for FnArgs<F>
where
    F: Fn() -> PoolResult<Vec<Token>> + Send + Sync,
{
    async fn produce_args(&self) -> PoolResult<Vec<Token>> {
        (self.0)()
    }
}

/// Pre-evaluated arguments, e.g. from the HTTP enqueue endpoint.
pub struct StaticArgs(pub Vec<Token>);

#[async_trait]
impl ArgProvider for StaticArgs {
    async fn produce_args(&self) -> PoolResult<Vec<Token>> {
        Ok(self.0.clone())
    }
}

/// Function call to relay.
pub struct TxPayload {
    pub function: String,
    pub args: Arc<dyn ArgProvider>,
}

impl fmt::Debug for TxPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxPayload")
            .field("function", &self.function)
            .finish_non_exhaustive()
    }
}

/// Outcome reported on the optional per-request channel.
#[derive(Debug)]
pub enum TxOutcome {
    /// Submitted to the node with this hash.
    Sent(H256),
    /// Dropped at some pipeline stage; never retried.
    Dropped(PoolError),
}

/// A queued write request, consumed exactly once by the pipeline.
pub struct TxRequest {
    pub contract: Address,
    pub secret: String,
    pub payload: TxPayload,
    /// Per-request schema override; the pool default applies when absent.
    pub abi: Option<Arc<Abi>>,
    /// Optional outcome channel. `None` keeps the original fire-and-forget
    /// caller semantics.
    pub notify: Option<oneshot::Sender<TxOutcome>>,
}

impl fmt::Debug for TxRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxRequest")
            .field("contract", &self.contract)
            .field("payload", &self.payload)
            .field("has_abi_override", &self.abi.is_some())
            .field("has_notify", &self.notify.is_some())
            .finish()
    }
}

impl TxRequest {
    pub fn new(contract: Address, secret: impl Into<String>, payload: TxPayload) -> Self {
        Self {
            contract,
            secret: secret.into(),
            payload,
            abi: None,
            notify: None,
        }
    }

    pub fn with_abi(mut self, abi: Arc<Abi>) -> Self {
        self.abi = Some(abi);
        self
    }

    /// Attach an outcome channel, returning its receiving half.
    pub fn with_notify(mut self) -> (Self, oneshot::Receiver<TxOutcome>) {
        let (tx, rx) = oneshot::channel();
        self.notify = Some(tx);
        (self, rx)
    }

    /// Report the outcome if a caller asked for it.
    pub(crate) fn resolve(&mut self, outcome: TxOutcome) {
        if let Some(notify) = self.notify.take() {
            // Receiver may have been dropped; that is the caller's choice.
            let _ = notify.send(outcome);
        }
    }
}

/// Signed wire transaction ready for dispatch, alive for one batch cycle.
#[derive(Debug)]
pub struct PreparedTx {
    pub raw: Bytes,
    pub hash: H256,
    pub nonce: u64,
    pub request: TxRequest,
}

/// A submitted transaction tracked for receipt monitoring.
#[derive(Debug)]
pub struct TxResult {
    pub hash: H256,
    pub request: TxRequest,
    pub sent_at: Instant,
}
