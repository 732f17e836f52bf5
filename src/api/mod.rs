//! HTTP producer surface: enqueue endpoint plus health and stats
//!
//! Submission is fire-and-forget from the caller's perspective; a 202
//! means queued, not sent. Outcomes are observable via logs and metrics.

use crate::codec;
use crate::config::{ApiConfig, WalletConfig};
use crate::error::PoolResult;
use crate::pool::{StaticArgs, TransactionPool, TxPayload, TxRequest};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<TransactionPool>,
    /// Secret used when a request does not carry one.
    pub default_secret: Option<String>,
}

impl AppState {
    pub fn new(pool: Arc<TransactionPool>, wallet: &WalletConfig) -> Self {
        let default_secret = wallet
            .secret_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok());
        Self {
            pool,
            default_secret,
        }
    }
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> PoolResult<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/v1/transactions", post(enqueue_transaction))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| crate::error::PoolError::Config(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::PoolError::Config(e.to_string()))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Queue statistics
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        queue_depth: state.pool.queue_depth(),
    })
}

/// Enqueue a contract write
async fn enqueue_transaction(
    State(state): State<AppState>,
    Json(body): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), (StatusCode, Json<ErrorResponse>)> {
    let contract: Address = body
        .contract
        .parse()
        .map_err(|_| bad_request(format!("invalid contract address: {}", body.contract)))?;

    let secret = body
        .secret
        .or_else(|| state.default_secret.clone())
        .ok_or_else(|| bad_request("no secret supplied and no default configured".to_string()))?;

    // Arguments arrive as JSON and are fixed at enqueue time; callers
    // needing fresh-at-send arguments use the library interface.
    let tokens = codec::coerce_args(state.pool.default_abi(), &body.function, &body.args)
        .map_err(|e| bad_request(e.to_string()))?;

    state.pool.enqueue(TxRequest::new(
        contract,
        secret,
        TxPayload {
            function: body.function,
            args: Arc::new(StaticArgs(tokens)),
        },
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            queued: true,
            queue_depth: state.pool.queue_depth(),
        }),
    ))
}

fn bad_request(error: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
}

// Request/response types

#[derive(Deserialize)]
struct EnqueueRequest {
    contract: String,
    function: String,
    #[serde(default)]
    args: Vec<Value>,
    secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    queued: bool,
    queue_depth: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct StatsResponse {
    queue_depth: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ApiConfig, ChainConfig, CodecConfig, MetricsConfig, PoolConfig, Settings, WalletConfig,
    };
    use crate::rpc::MockLedgerRpc;

    use ethers::abi::Abi;
    use serde_json::json;

    fn state() -> AppState {
        let settings = Settings {
            pool: PoolConfig {
                poll_interval_ms: 50,
                batch_size: 100,
                nonce_stale_secs: 30,
                verify_submissions: false,
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
        };

        let abi: Abi = serde_json::from_str(
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
        .unwrap();

        AppState {
            pool: TransactionPool::new(Arc::new(MockLedgerRpc::new()), Arc::new(abi), &settings),
            default_secret: Some(
                "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".into(),
            ),
        }
    }

    #[tokio::test]
    async fn test_enqueue_accepted() {
        let state = state();
        let body = EnqueueRequest {
            contract: "0x4242424242424242424242424242424242424242".into(),
            function: "emitValue".into(),
            args: vec![json!("score"), json!(7)],
            secret: None,
        };

        let (status, Json(response)) =
            enqueue_transaction(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(response.queued);
        assert_eq!(state.pool.queue_depth(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_bad_address() {
        let state = state();
        let body = EnqueueRequest {
            contract: "not-an-address".into(),
            function: "emitValue".into(),
            args: vec![],
            secret: None,
        };

        let (status, _) = enqueue_transaction(State(state.clone()), Json(body))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.pool.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_bad_args() {
        let state = state();
        let body = EnqueueRequest {
            contract: "0x4242424242424242424242424242424242424242".into(),
            function: "emitValue".into(),
            args: vec![json!("score")],
            secret: None,
        };

        let (status, _) = enqueue_transaction(State(state.clone()), Json(body))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.pool.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_requires_a_secret() {
        let mut state = state();
        state.default_secret = None;
        let body = EnqueueRequest {
            contract: "0x4242424242424242424242424242424242424242".into(),
            function: "emitValue".into(),
            args: vec![json!("score"), json!(7)],
            secret: None,
        };

        let (status, _) = enqueue_transaction(State(state), Json(body))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
