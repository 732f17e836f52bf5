//! Batching transaction pool that relays contract writes to an EVM chain
//!
//! Producers enqueue function-call requests; a periodic scheduler drains
//! them in bounded batches, allocates per-identity nonces, signs EIP-1559
//! transactions, and submits them over JSON-RPC, fire-and-forget by
//! default.

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod pool;
pub mod rpc;

pub use config::Settings;
pub use error::{PoolError, PoolResult};
pub use keys::{KeyCache, SigningIdentity};
pub use pool::{
    ArgProvider, FnArgs, StaticArgs, TransactionPool, TxOutcome, TxPayload, TxRequest,
};
pub use rpc::{HttpRpc, LedgerRpc};
