//! Per-address nonce allocation
//!
//! Seeds each address from the node's pending transaction count, then
//! issues strictly increasing values locally. The cached value is
//! opportunistically reconciled against the node: a refresh adopts the
//! reported count only when it is higher, which catches externally
//! submitted transactions without ever reusing a value.

use crate::error::{PoolError, PoolResult};
use crate::rpc::{parse_hex_u64, LedgerRpc};

use dashmap::DashMap;
use ethers::types::Address;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct NonceState {
    current: u64,
    last_refreshed: Instant,
}

/// Issues unique, monotonically increasing nonces per address.
pub struct NonceAllocator {
    rpc: Arc<dyn LedgerRpc>,
    entries: DashMap<Address, Arc<Mutex<NonceState>>>,
    stale_after: Duration,
}

impl NonceAllocator {
    pub fn new(rpc: Arc<dyn LedgerRpc>, stale_after: Duration) -> Self {
        Self {
            rpc,
            entries: DashMap::new(),
            stale_after,
        }
    }

    /// Allocate the next nonce for an address.
    ///
    /// First use for an address blocks on a pending-count query; later
    /// calls are served from the cache, re-fetching only past the
    /// staleness threshold. A nonce handed out here is consumed even if
    /// the transaction later fails to build or send; the resulting gap is
    /// deliberate (the pool never reissues values).
    pub async fn next(&self, address: Address) -> PoolResult<u64> {
        let entry = match self.entries.get(&address).map(|e| e.value().clone()) {
            Some(entry) => entry,
            None => {
                // Fetch outside the map so concurrent first users do not
                // serialize on a shard; load-or-store picks one winner.
                let initial = self.fetch_pending_count(address).await?;
                debug!("Seeded nonce for {:?}: {}", address, initial);
                self.entries
                    .entry(address)
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(NonceState {
                            current: initial,
                            last_refreshed: Instant::now(),
                        }))
                    })
                    .clone()
            }
        };

        let mut state = entry.lock().await;

        if state.last_refreshed.elapsed() > self.stale_after {
            match self.fetch_pending_count(address).await {
                Ok(fresh) => {
                    // Monotonic-max merge: never move backwards even if
                    // the node reports a smaller pending count.
                    if fresh > state.current {
                        state.current = fresh;
                    }
                    state.last_refreshed = Instant::now();
                    crate::metrics::record_nonce_refresh();
                }
                Err(e) => {
                    warn!(
                        "Nonce refresh failed for {:?}, using cached value: {}",
                        address, e
                    );
                }
            }
        }

        let nonce = state.current;
        state.current += 1;
        Ok(nonce)
    }

    async fn fetch_pending_count(&self, address: Address) -> PoolResult<u64> {
        let result = self
            .rpc
            .call(
                "eth_getTransactionCount",
                vec![json!(address), json!("pending")],
            )
            .await
            .map_err(|e| PoolError::Nonce {
                address,
                message: e.to_string(),
            })?;

        parse_hex_u64(&result).map_err(|e| PoolError::Nonce {
            address,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockLedgerRpc;
    use mockall::Sequence;
    use std::collections::BTreeSet;

    fn allocator(mock: MockLedgerRpc, stale_after: Duration) -> Arc<NonceAllocator> {
        Arc::new(NonceAllocator::new(Arc::new(mock), stale_after))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_is_gapless() {
        let mut mock = MockLedgerRpc::new();
        mock.expect_call()
            .returning(|_, _| Ok(json!("0x5")));
        let allocator = allocator(mock, Duration::from_secs(30));
        let address = Address::repeat_byte(0xaa);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let allocator = allocator.clone();
                tokio::spawn(async move { allocator.next(address).await.unwrap() })
            })
            .collect();

        let issued: BTreeSet<u64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let expected: BTreeSet<u64> = (5..25).collect();
        assert_eq!(issued, expected);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let mut mock = MockLedgerRpc::new();
        mock.expect_call()
            .times(1)
            .returning(|_, _| Ok(json!("0x5")));
        let allocator = allocator(mock, Duration::from_secs(30));
        let address = Address::repeat_byte(0xaa);

        assert_eq!(allocator.next(address).await.unwrap(), 5);
        assert_eq!(allocator.next(address).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_refresh_never_decreases() {
        let mut mock = MockLedgerRpc::new();
        let mut seq = Sequence::new();
        // Initial seed at 10, then a refresh reporting a smaller count,
        // then a refresh failure.
        mock.expect_call()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(json!("0xa")));
        mock.expect_call()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(json!("0x5")));
        mock.expect_call()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(PoolError::Rpc("node down".into())));

        // Zero staleness forces a refresh on every allocation.
        let allocator = allocator(mock, Duration::ZERO);
        let address = Address::repeat_byte(0xbb);

        assert_eq!(allocator.next(address).await.unwrap(), 10);
        assert_eq!(allocator.next(address).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_addresses_are_independent() {
        let low = Address::repeat_byte(0x11);
        let mut mock = MockLedgerRpc::new();
        mock.expect_call().returning(move |_, params| {
            let queried = params[0].as_str().unwrap().to_string();
            if queried == format!("{:?}", low) {
                Ok(json!("0x0"))
            } else {
                Ok(json!("0x64"))
            }
        });
        let allocator = allocator(mock, Duration::from_secs(30));

        assert_eq!(allocator.next(low).await.unwrap(), 0);
        assert_eq!(
            allocator.next(Address::repeat_byte(0x22)).await.unwrap(),
            100
        );
        assert_eq!(allocator.next(low).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_first_use_failure_consumes_nothing() {
        let mut mock = MockLedgerRpc::new();
        let mut seq = Sequence::new();
        mock.expect_call()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(PoolError::Rpc("node down".into())));
        mock.expect_call()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(json!("0x3")));

        let allocator = allocator(mock, Duration::from_secs(30));
        let address = Address::repeat_byte(0xcc);

        let err = allocator.next(address).await.unwrap_err();
        assert_eq!(err.stage(), "nonce");
        // The failed first use left no state behind; the retry reseeds.
        assert_eq!(allocator.next(address).await.unwrap(), 3);
    }
}
