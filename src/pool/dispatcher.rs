//! Transaction submission
//!
//! Fire-and-forget by default; verified mode submits via a call, checks
//! the node-reported hash against the local one, and feeds the receipt
//! monitor.

use super::request::{PreparedTx, TxOutcome, TxResult};
use crate::codec;
use crate::error::PoolError;
use crate::rpc::LedgerRpc;

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct Dispatcher {
    rpc: Arc<dyn LedgerRpc>,
    verify: bool,
}

impl Dispatcher {
    pub fn new(rpc: Arc<dyn LedgerRpc>, verify: bool) -> Self {
        Self { rpc, verify }
    }

    /// Submit prepared transactions sequentially.
    ///
    /// A failed submission is logged and excluded; it is never retried
    /// and its nonce stays consumed. Returns the tracked results
    /// (non-empty only in verified mode's happy path; fire-and-forget
    /// callers ignore them).
    pub async fn dispatch(&self, prepared: Vec<PreparedTx>) -> Vec<TxResult> {
        let mut results = Vec::with_capacity(prepared.len());

        for mut tx in prepared {
            let raw_hex = format!("0x{}", hex::encode(&tx.raw[..]));

            if self.verify {
                let response = match self
                    .rpc
                    .call("eth_sendRawTransaction", vec![json!(raw_hex)])
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Failed to send tx {:?} (nonce {}): {}", tx.hash, tx.nonce, e);
                        crate::metrics::record_tx_dropped("send");
                        tx.request.resolve(TxOutcome::Dropped(PoolError::Send {
                            tx_hash: format!("{:?}", tx.hash),
                            message: e.to_string(),
                        }));
                        continue;
                    }
                };

                match codec::parse_hash(&response) {
                    Ok(accepted) if accepted != tx.hash => {
                        warn!(
                            "Hash mismatch for nonce {}: computed {:?}, node returned {:?}",
                            tx.nonce, tx.hash, accepted
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Accepted by the node but the response is unusable
                        // for tracking.
                        warn!("Unparseable send response for {:?}: {}", tx.hash, e);
                        crate::metrics::record_tx_sent();
                        let hash = tx.hash;
                        tx.request.resolve(TxOutcome::Sent(hash));
                        continue;
                    }
                }
            } else if let Err(e) = self
                .rpc
                .send("eth_sendRawTransaction", vec![json!(raw_hex)])
                .await
            {
                warn!("Failed to send tx {:?} (nonce {}): {}", tx.hash, tx.nonce, e);
                crate::metrics::record_tx_dropped("send");
                tx.request.resolve(TxOutcome::Dropped(PoolError::Send {
                    tx_hash: format!("{:?}", tx.hash),
                    message: e.to_string(),
                }));
                continue;
            }

            debug!("Sent tx {:?} with nonce {}", tx.hash, tx.nonce);
            crate::metrics::record_tx_sent();

            let hash = tx.hash;
            tx.request.resolve(TxOutcome::Sent(hash));
            results.push(TxResult {
                hash,
                request: tx.request,
                sent_at: Instant::now(),
            });
        }

        results
    }
}
