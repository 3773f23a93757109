pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Directory where per-network contract registries are stored by default
pub const DEFAULT_REGISTRY_DIR: &str = "networks/";

// Upper bound for a single command, including all of its
// network round-trips. The runner can override it.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
