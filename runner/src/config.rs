use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use scenario_common::config::{DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_REGISTRY_DIR, VERSION};
use scenario_common::network::Network;

// daemon address by default when no specified
pub const DEFAULT_DAEMON_ADDRESS: &str = "http://127.0.0.1:8080";

fn default_daemon_address() -> String {
    DEFAULT_DAEMON_ADDRESS.to_owned()
}

fn default_registry_dir() -> String {
    DEFAULT_REGISTRY_DIR.to_owned()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_network() -> Network {
    Network::Devnet
}

#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[clap(version = VERSION, about = "Run scenario scripts against deployed contracts")]
pub struct Config {
    /// Network to run the scenario against
    #[clap(long, default_value = "devnet")]
    #[serde(default = "default_network")]
    pub network: Network,
    /// Path to the scenario script to execute
    #[clap(long)]
    pub script: Option<PathBuf>,
    /// Directory holding the per-network contract registries
    #[clap(long, default_value = DEFAULT_REGISTRY_DIR)]
    #[serde(default = "default_registry_dir")]
    pub registry_dir: String,
    /// JSON file declaring contract ABIs
    #[clap(long)]
    pub abis: Option<PathBuf>,
    /// Daemon RPC endpoint executing deploys and calls
    #[clap(long, default_value = DEFAULT_DAEMON_ADDRESS)]
    #[serde(default = "default_daemon_address")]
    pub daemon_address: String,
    /// Per-command timeout in seconds
    #[clap(long, default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS)]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Named accounts as name=0xaddress; the first one is the default sender
    #[clap(long)]
    #[serde(default)]
    pub account: Vec<String>,
    /// Confirm execution against mainnet
    #[clap(long)]
    #[serde(default)]
    pub allow_mainnet: bool,
    /// Log level (off, error, warn, info, debug, trace)
    #[clap(long, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON config file to load the configuration from
    #[clap(long)]
    #[serde(skip)]
    pub config_file: Option<String>,
    /// Generate a config file template at the path given by --config-file
    #[clap(long)]
    #[serde(skip)]
    pub generate_config_template: bool,
}

impl Config {
    /// Mainnet scripts mutate the real registry and real contracts, so
    /// they require the explicit --allow-mainnet confirmation.
    pub fn network_allowed(&self) -> bool {
        !self.network.is_mainnet() || self.allow_mainnet
    }
}
