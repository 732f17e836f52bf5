//! Error types for the transaction pool relayer

use ethers::types::Address;
use thiserror::Error;

/// Main error type for the pool
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC transport error: {0}")]
    Rpc(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Argument provider failed: {0}")]
    Args(String),

    #[error("Call encoding failed for function {function}: {message}")]
    Encode { function: String, message: String },

    #[error("Nonce fetch failed for {address:?}: {message}")]
    Nonce { address: Address, message: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction serialization failed: {0}")]
    Marshal(String),

    #[error("Send failed for tx {tx_hash}: {message}")]
    Send { tx_hash: String, message: String },

    #[error("Receipt parsing failed: {0}")]
    ReceiptParse(String),
}

impl PoolError {
    /// Pipeline stage label, used for drop logging and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            PoolError::Config(_) => "config",
            PoolError::Rpc(_) => "rpc",
            PoolError::Derivation(_) => "derivation",
            PoolError::Args(_) => "args",
            PoolError::Encode { .. } => "encode",
            PoolError::Nonce { .. } => "nonce",
            PoolError::Signing(_) => "signing",
            PoolError::Marshal(_) => "marshal",
            PoolError::Send { .. } => "send",
            PoolError::ReceiptParse(_) => "receipt",
        }
    }
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;
