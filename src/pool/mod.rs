//! Batching transaction pool
//!
//! Producers enqueue write requests from any task; a single periodic
//! scheduler drains a bounded batch each tick and runs it through the
//! build/sign/dispatch pipeline. At most one batch cycle executes at a
//! time, and ingestion is never blocked by pipeline work.

pub mod builder;
pub mod dispatcher;
pub mod nonce;
pub mod receipt;
pub mod request;

pub use builder::TxBuilder;
pub use dispatcher::Dispatcher;
pub use nonce::NonceAllocator;
pub use receipt::ReceiptMonitor;
pub use request::{
    ArgProvider, FnArgs, PreparedTx, StaticArgs, TxOutcome, TxPayload, TxRequest, TxResult,
};

use crate::config::Settings;
use crate::keys::KeyCache;
use crate::rpc::LedgerRpc;

use ethers::abi::Abi;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

pub struct TransactionPool {
    /// Ingest lock: held only to append or slice off a batch.
    queue: StdMutex<Vec<TxRequest>>,
    /// Processing lock: serializes batch cycles even when one overruns
    /// the tick interval.
    processing: Mutex<()>,
    builder: TxBuilder,
    dispatcher: Dispatcher,
    monitor: Arc<ReceiptMonitor>,
    default_abi: Arc<Abi>,
    verify: bool,
    poll_interval: Duration,
    batch_size: usize,
    shutdown: RwLock<bool>,
}

impl TransactionPool {
    pub fn new(rpc: Arc<dyn LedgerRpc>, default_abi: Arc<Abi>, settings: &Settings) -> Arc<Self> {
        let keys = Arc::new(KeyCache::new(settings.chain.chain_id));
        let nonces = Arc::new(NonceAllocator::new(
            rpc.clone(),
            Duration::from_secs(settings.pool.nonce_stale_secs),
        ));

        Arc::new(Self {
            queue: StdMutex::new(Vec::with_capacity(settings.pool.batch_size)),
            processing: Mutex::new(()),
            builder: TxBuilder::new(keys, nonces, default_abi.clone(), &settings.chain),
            dispatcher: Dispatcher::new(rpc.clone(), settings.pool.verify_submissions),
            monitor: Arc::new(ReceiptMonitor::new(rpc, &settings.pool)),
            default_abi,
            verify: settings.pool.verify_submissions,
            poll_interval: Duration::from_millis(settings.pool.poll_interval_ms),
            batch_size: settings.pool.batch_size,
            shutdown: RwLock::new(false),
        })
    }

    /// Append a request to the ingest queue. Never fails; the request
    /// runs to completion or drop on a later tick.
    pub fn enqueue(&self, request: TxRequest) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        crate::metrics::record_enqueued();
    }

    /// Enqueue and receive the eventual outcome on a oneshot channel.
    pub fn enqueue_with_notify(
        &self,
        request: TxRequest,
    ) -> tokio::sync::oneshot::Receiver<TxOutcome> {
        let (request, outcome) = request.with_notify();
        self.enqueue(request);
        outcome
    }

    pub fn queue_depth(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Default call schema, for callers that coerce arguments up front.
    pub fn default_abi(&self) -> &Arc<Abi> {
        &self.default_abi
    }

    /// Periodic scheduler loop; runs until `stop` is called.
    pub async fn run(self: Arc<Self>) {
        let mut tick = interval(self.poll_interval);
        info!(
            "Transaction pool started (tick {:?}, batch size {})",
            self.poll_interval, self.batch_size
        );

        loop {
            if *self.shutdown.read().await {
                break;
            }
            tick.tick().await;
            self.process_once().await;
        }

        info!("Transaction pool stopped");
    }

    /// Signal shutdown and wait for the in-flight batch to finish.
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        let _flush = self.processing.lock().await;
        info!("Transaction pool shutdown complete");
    }

    /// Drain and process one batch. Called by the scheduler each tick.
    pub async fn process_once(&self) {
        let _cycle = self.processing.lock().await;

        let batch = self.drain_batch();
        if batch.is_empty() {
            return;
        }

        let started = Instant::now();
        let total = batch.len();
        debug!("Processing batch of {} transactions", total);

        let mut prepared = Vec::with_capacity(total);
        for (index, request) in batch.into_iter().enumerate() {
            match self.builder.prepare(request).await {
                Ok(tx) => prepared.push(tx),
                Err((mut request, e)) => {
                    warn!(
                        "Dropping request {} (function {}): {}",
                        index, request.payload.function, e
                    );
                    crate::metrics::record_tx_dropped(e.stage());
                    request.resolve(TxOutcome::Dropped(e));
                }
            }
        }

        let results = self.dispatcher.dispatch(prepared).await;

        let elapsed = started.elapsed();
        crate::metrics::record_batch(total, elapsed);
        info!("Sent {} of {} transactions in {:?}", results.len(), total, elapsed);

        if self.verify && !results.is_empty() {
            let monitor = self.monitor.clone();
            tokio::spawn(async move {
                monitor.monitor(results).await;
            });
        }
    }

    /// Slice off up to `batch_size` oldest requests, holding the ingest
    /// lock only for the slice.
    fn drain_batch(&self) -> Vec<TxRequest> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let take = queue.len().min(self.batch_size);
        queue.drain(..take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, ChainConfig, CodecConfig, MetricsConfig, PoolConfig, WalletConfig};
    use crate::rpc::MockLedgerRpc;

    use ethers::abi::Token;
    use ethers::types::{Address, U256};
    use serde_json::json;

    const SECRET: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn settings(batch_size: usize, verify: bool) -> Settings {
        Settings {
            pool: PoolConfig {
                poll_interval_ms: 50,
                batch_size,
                nonce_stale_secs: 30,
                verify_submissions: verify,
                receipt_initial_delay_ms: 2_000,
                receipt_poll_delay_ms: 3_000,
                receipt_max_rounds: 5,
            },
            chain: ChainConfig {
                rpc_url: "http://localhost:8545".into(),
                chain_id: 50312,
                gas_limit: 20_000_000,
                max_fee_per_gas_wei: 36_000_000_000,
            },
            codec: CodecConfig {
                abi_path: "abi/writer.json".into(),
            },
            api: ApiConfig {
                host: "127.0.0.1".into(),
                port: 8081,
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 9091,
            },
            wallet: WalletConfig::default(),
        }
    }

    fn test_abi() -> Arc<Abi> {
        Arc::new(
            serde_json::from_str(
                r#"[
                    {
                        "type": "function",
                        "name": "emitValue",
                        "inputs": [
                            {"name": "key", "type": "string"},
                            {"name": "value", "type": "uint256"}
                        ],
                        "outputs": [],
                        "stateMutability": "nonpayable"
                    }
                ]"#,
            )
            .unwrap(),
        )
    }

    fn request(value: u64) -> TxRequest {
        TxRequest::new(
            Address::repeat_byte(0x42),
            SECRET,
            TxPayload {
                function: "emitValue".into(),
                args: Arc::new(StaticArgs(vec![
                    Token::String("score".into()),
                    Token::Uint(U256::from(value)),
                ])),
            },
        )
    }

    #[tokio::test]
    async fn test_drain_takes_a_bounded_fifo_prefix() {
        let pool = TransactionPool::new(Arc::new(MockLedgerRpc::new()), test_abi(), &settings(100, false));

        for i in 0..150 {
            pool.enqueue(request(i));
        }
        assert_eq!(pool.queue_depth(), 150);

        let batch = pool.drain_batch();
        assert_eq!(batch.len(), 100);
        assert_eq!(pool.queue_depth(), 50);

        let rest = pool.drain_batch();
        assert_eq!(rest.len(), 50);
        assert_eq!(pool.queue_depth(), 0);
        assert!(pool.drain_batch().is_empty());
    }

    #[tokio::test]
    async fn test_empty_tick_touches_nothing() {
        let mut mock = MockLedgerRpc::new();
        mock.expect_call().times(0);
        mock.expect_send().times(0);

        let pool = TransactionPool::new(Arc::new(mock), test_abi(), &settings(100, false));
        pool.process_once().await;
    }

    #[tokio::test]
    async fn test_one_tick_sends_full_batch() {
        let mut mock = MockLedgerRpc::new();
        mock.expect_call()
            .times(1)
            .withf(|method, _| method == "eth_getTransactionCount")
            .returning(|_, _| Ok(json!("0x7")));
        mock.expect_send()
            .times(3)
            .withf(|method, _| method == "eth_sendRawTransaction")
            .returning(|_, _| Ok(()));

        let pool = TransactionPool::new(Arc::new(mock), test_abi(), &settings(100, false));

        let outcomes: Vec<_> = (0..3)
            .map(|i| pool.enqueue_with_notify(request(i)))
            .collect();

        pool.process_once().await;
        assert_eq!(pool.queue_depth(), 0);

        for outcome in outcomes {
            assert!(matches!(outcome.await.unwrap(), TxOutcome::Sent(_)));
        }
    }

    #[tokio::test]
    async fn test_overflow_waits_for_the_next_tick() {
        let mut mock = MockLedgerRpc::new();
        mock.expect_call()
            .withf(|method, _| method == "eth_getTransactionCount")
            .returning(|_, _| Ok(json!("0x0")));
        mock.expect_send().times(150).returning(|_, _| Ok(()));

        let pool = TransactionPool::new(Arc::new(mock), test_abi(), &settings(100, false));
        for i in 0..150 {
            pool.enqueue(request(i));
        }

        pool.process_once().await;
        assert_eq!(pool.queue_depth(), 50);

        pool.process_once().await;
        assert_eq!(pool.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_bad_request_does_not_abort_the_batch() {
        let mut mock = MockLedgerRpc::new();
        mock.expect_call()
            .times(1)
            .withf(|method, _| method == "eth_getTransactionCount")
            .returning(|_, _| Ok(json!("0x0")));
        mock.expect_send().times(1).returning(|_, _| Ok(()));

        let pool = TransactionPool::new(Arc::new(mock), test_abi(), &settings(100, false));

        let mut bad = request(1);
        bad.payload.function = "missing".into();
        let bad_outcome = pool.enqueue_with_notify(bad);
        let good_outcome = pool.enqueue_with_notify(request(2));

        pool.process_once().await;

        match bad_outcome.await.unwrap() {
            TxOutcome::Dropped(e) => assert_eq!(e.stage(), "encode"),
            other => panic!("expected drop, got {:?}", other),
        }
        assert!(matches!(good_outcome.await.unwrap(), TxOutcome::Sent(_)));
    }

    #[tokio::test]
    async fn test_stop_halts_the_scheduler() {
        let mut mock = MockLedgerRpc::new();
        mock.expect_call().returning(|_, _| Ok(json!("0x0")));
        mock.expect_send().returning(|_, _| Ok(()));

        let pool = TransactionPool::new(Arc::new(mock), test_abi(), &settings(100, false));
        let handle = tokio::spawn(pool.clone().run());

        tokio::time::sleep(Duration::from_millis(120)).await;
        pool.stop().await;

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
