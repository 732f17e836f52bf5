//! Receipt monitoring (verified mode)
//!
//! Polls inclusion receipts for a flushed batch over a bounded number of
//! rounds and reports per-transaction success or failure in the logs.
//! Transactions still pending after the final round are abandoned.

use super::request::TxResult;
use crate::config::PoolConfig;
use crate::rpc::LedgerRpc;

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

pub struct ReceiptMonitor {
    rpc: Arc<dyn LedgerRpc>,
    initial_delay: Duration,
    poll_delay: Duration,
    max_rounds: u32,
}

impl ReceiptMonitor {
    pub fn new(rpc: Arc<dyn LedgerRpc>, config: &PoolConfig) -> Self {
        Self {
            rpc,
            initial_delay: Duration::from_millis(config.receipt_initial_delay_ms),
            poll_delay: Duration::from_millis(config.receipt_poll_delay_ms),
            max_rounds: config.receipt_max_rounds,
        }
    }

    /// Track a flushed batch until every receipt lands or rounds run out.
    pub async fn monitor(&self, mut tracked: Vec<TxResult>) {
        sleep(self.initial_delay).await;

        for round in 0..self.max_rounds {
            let mut pending = Vec::new();

            for tx in tracked {
                match self
                    .rpc
                    .call("eth_getTransactionReceipt", vec![json!(tx.hash)])
                    .await
                {
                    Err(e) => {
                        warn!("Error checking receipt for {:?}: {}", tx.hash, e);
                        pending.push(tx);
                    }
                    Ok(Value::Null) => pending.push(tx),
                    Ok(receipt) => self.settle(&tx, &receipt),
                }
            }

            if pending.is_empty() {
                return;
            }

            tracked = pending;
            if round + 1 < self.max_rounds {
                sleep(self.poll_delay).await;
            }
        }

        warn!(
            "Abandoning {} transactions with no receipt after {} rounds",
            tracked.len(),
            self.max_rounds
        );
        for tx in &tracked {
            crate::metrics::record_receipt_abandoned();
            warn!(
                "No receipt for {:?} (function {})",
                tx.hash, tx.request.payload.function
            );
        }
    }

    fn settle(&self, tx: &TxResult, receipt: &Value) {
        let status = match receipt.get("status").and_then(Value::as_str) {
            Some(status) => status,
            None => {
                warn!("Invalid receipt status for {:?}", tx.hash);
                return;
            }
        };

        // "0x1" means included and succeeded, "0x0" reverted.
        let succeeded = status != "0x0";
        crate::metrics::record_receipt(succeeded);

        if succeeded {
            info!(
                "Transaction succeeded: {:?} (function {}, {:?} after send)",
                tx.hash,
                tx.request.payload.function,
                tx.sent_at.elapsed()
            );
        } else {
            warn!(
                "Transaction reverted: {:?} (function {})",
                tx.hash, tx.request.payload.function
            );
        }
    }
}
