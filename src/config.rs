//! Configuration for the submission pipeline
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub node: NodeConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub rpc_urls: Vec<String>,
    /// Receipt polling interval while waiting for confirmation.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Optional upper bound on confirmation waits. Absent means wait forever.
    pub confirmation_timeout_secs: Option<u64>,
}

impl NodeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Deadline to pass to `wait`, if one is configured.
    pub fn confirmation_deadline(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }
}

/// Per-sender signing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key: String,
    pub chain_id: Option<u64>,
    /// Only enable if one process is signing for this sender. When true the
    /// nonce is seeded once from the node's pending count and incremented in
    /// memory for each transaction; when false the pending count is queried
    /// before every transaction.
    #[serde(default)]
    pub nonce_in_memory: bool,
    /// Fixed gas price in wei. If not set, the node is asked before each
    /// transaction.
    pub gas_price: Option<String>,
    /// Fixed gas limit. If not set, estimate_gas is called before each
    /// transaction.
    pub gas_limit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 4,
            delay_ms: 500,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("TXCOURIER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.node.rpc_urls.is_empty() {
            anyhow::bail!("At least one RPC URL must be configured");
        }
        if self.wallet.private_key.is_empty() {
            anyhow::bail!("wallet.private_key must be configured");
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
