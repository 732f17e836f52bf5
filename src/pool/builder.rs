//! Build-and-sign pipeline
//!
//! Turns queued requests into signed EIP-1559 wire transactions. Every
//! stage failure drops only the request at hand; the batch continues.

use super::nonce::NonceAllocator;
use super::request::{PreparedTx, TxRequest};
use crate::codec;
use crate::config::ChainConfig;
use crate::error::{PoolError, PoolResult};
use crate::keys::KeyCache;

use ethers::abi::Abi;
use ethers::signers::Signer;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Eip1559TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use std::sync::Arc;

/// Builds and signs wire transactions for queued requests.
pub struct TxBuilder {
    keys: Arc<KeyCache>,
    nonces: Arc<NonceAllocator>,
    default_abi: Arc<Abi>,
    chain_id: u64,
    gas_limit: U256,
    max_fee_per_gas: U256,
}

impl TxBuilder {
    pub fn new(
        keys: Arc<KeyCache>,
        nonces: Arc<NonceAllocator>,
        default_abi: Arc<Abi>,
        chain: &ChainConfig,
    ) -> Self {
        Self {
            keys,
            nonces,
            default_abi,
            chain_id: chain.chain_id,
            gas_limit: U256::from(chain.gas_limit),
            max_fee_per_gas: U256::from(chain.max_fee_per_gas_wei),
        }
    }

    /// Run one request through args -> key -> encode -> nonce -> sign.
    ///
    /// On failure the request is handed back so the caller can log and
    /// resolve its notify channel. Stage order matters: the nonce is
    /// allocated only after arguments, key, and call data are good, so
    /// those failures never burn a sequence number. A signing failure
    /// after allocation leaves a gap, matching the dispatch path.
    pub async fn prepare(&self, request: TxRequest) -> Result<PreparedTx, (TxRequest, PoolError)> {
        match self.prepare_inner(&request).await {
            Ok((raw, hash, nonce)) => Ok(PreparedTx {
                raw: raw.into(),
                hash,
                nonce,
                request,
            }),
            Err(e) => Err((request, e)),
        }
    }

    async fn prepare_inner(&self, request: &TxRequest) -> PoolResult<(Vec<u8>, H256, u64)> {
        let args = request
            .payload
            .args
            .produce_args()
            .await
            .map_err(|e| PoolError::Args(e.to_string()))?;

        let identity = self.keys.get_or_derive(&request.secret)?;

        let abi = request.abi.as_deref().unwrap_or(&self.default_abi);
        let data = codec::encode_call(abi, &request.payload.function, &args)?;

        let nonce = self.nonces.next(identity.address).await?;

        // Fixed fee policy: zero tip, configured fee cap and gas limit,
        // no value transfer.
        let tx = Eip1559TransactionRequest::new()
            .to(request.contract)
            .data(data)
            .nonce(nonce)
            .gas(self.gas_limit)
            .max_fee_per_gas(self.max_fee_per_gas)
            .max_priority_fee_per_gas(U256::zero())
            .value(U256::zero())
            .chain_id(self.chain_id);
        let typed = TypedTransaction::Eip1559(tx);

        let signature = identity
            .wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| PoolError::Signing(e.to_string()))?;

        let raw = typed.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));

        Ok((raw.to_vec(), hash, nonce))
    }
}
