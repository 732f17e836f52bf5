//! Configuration management for the transaction pool relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub pool: PoolConfig,
    pub chain: ChainConfig,
    pub codec: CodecConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Batch scheduler tick interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum requests drained per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Cached nonces older than this are re-fetched before use
    #[serde(default = "default_nonce_stale_secs")]
    pub nonce_stale_secs: u64,
    /// Verified mode: submit via call, check the returned hash, poll receipts
    #[serde(default)]
    pub verify_submissions: bool,
    /// Delay before the first receipt poll (verified mode)
    #[serde(default = "default_receipt_initial_delay_ms")]
    pub receipt_initial_delay_ms: u64,
    /// Delay between receipt polling rounds (verified mode)
    #[serde(default = "default_receipt_poll_delay_ms")]
    pub receipt_poll_delay_ms: u64,
    /// Maximum receipt polling rounds before a transaction is abandoned
    #[serde(default = "default_receipt_max_rounds")]
    pub receipt_max_rounds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Fixed gas limit for every relayed transaction
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Fee cap in wei; the priority tip is always zero
    #[serde(default = "default_max_fee_per_gas_wei")]
    pub max_fee_per_gas_wei: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodecConfig {
    /// Path to the default call schema (ABI JSON), parsed once at startup
    pub abi_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the default signing secret for API callers
    pub secret_env: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_batch_size() -> usize {
    100
}

fn default_nonce_stale_secs() -> u64 {
    30
}

fn default_receipt_initial_delay_ms() -> u64 {
    2_000
}

fn default_receipt_poll_delay_ms() -> u64 {
    3_000
}

fn default_receipt_max_rounds() -> u32 {
    5
}

fn default_gas_limit() -> u64 {
    20_000_000
}

fn default_max_fee_per_gas_wei() -> u64 {
    36_000_000_000
}

impl Settings {
    /// Load settings from the configured file path
    pub fn load() -> Result<Self> {
        let config_path = env::var("TXPOOL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings = toml::from_str(&config_str)
            .with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.is_empty() {
            anyhow::bail!("chain.rpc_url must be set");
        }
        if self.chain.chain_id == 0 {
            anyhow::bail!("chain.chain_id must be non-zero");
        }
        if self.pool.batch_size == 0 {
            anyhow::bail!("pool.batch_size must be at least 1");
        }
        if self.pool.poll_interval_ms == 0 {
            anyhow::bail!("pool.poll_interval_ms must be at least 1");
        }
        if self.codec.abi_path.is_empty() {
            anyhow::bail!("codec.abi_path must be set");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_RPC_HOST", "node.example.com");
        let input = "rpc_url = \"https://${TEST_RPC_HOST}/rpc\"";
        let result = substitute_env_vars(&input);
        assert_eq!(result, "rpc_url = \"https://node.example.com/rpc\"");
    }

    #[test]
    fn test_load_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[pool]

[chain]
rpc_url = "http://localhost:8545"
chain_id = 50312

[codec]
abi_path = "abi/writer.json"

[api]
host = "127.0.0.1"
port = 8081

[metrics]
enabled = false
port = 9091
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.pool.poll_interval_ms, 50);
        assert_eq!(settings.pool.batch_size, 100);
        assert_eq!(settings.pool.nonce_stale_secs, 30);
        assert!(!settings.pool.verify_submissions);
        assert_eq!(settings.chain.gas_limit, 20_000_000);
        assert_eq!(settings.chain.max_fee_per_gas_wei, 36_000_000_000);
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[pool]
batch_size = 0

[chain]
rpc_url = "http://localhost:8545"
chain_id = 50312

[codec]
abi_path = "abi/writer.json"

[api]
host = "127.0.0.1"
port = 8081

[metrics]
enabled = false
port = 9091
"#
        )
        .unwrap();

        assert!(Settings::load_from(file.path()).is_err());
    }
}
