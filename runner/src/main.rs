use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};

use scenario_common::abi::AbiRegistry;
use scenario_common::fetcher::Interpreter;
use scenario_common::registry::RegistryStore;
use scenario_common::value::parse_address;

use scenario_runner::client::DaemonExecutor;
use scenario_runner::commands;
use scenario_runner::config::Config;
use scenario_runner::logger;
use scenario_runner::script::{self, ScriptOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let mut config: Config = Config::parse();
    if let Some(path) = config.config_file.as_ref() {
        if config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {}", path);
                return Ok(());
            }

            let mut file = File::create(path).context("Error while creating config file")?;
            let json = serde_json::to_string_pretty(&config)
                .context("Error while serializing config file")?;
            file.write_all(json.as_bytes())
                .context("Error while writing config file")?;
            println!("Config file template generated at {}", path);
            return Ok(());
        }

        let file = File::open(path).context("Error while opening config file")?;
        config = serde_json::from_reader(file).context("Error while reading config file")?;
    } else if config.generate_config_template {
        eprintln!("--config-file is required to generate the config template");
        return Ok(());
    }

    let level = LevelFilter::from_str(&config.log_level)
        .map_err(|_| anyhow!("Invalid log level '{}'", config.log_level))?;
    logger::init(level).context("Error while initializing the logger")?;

    if !config.network_allowed() {
        return Err(anyhow!(
            "Refusing to run against mainnet without --allow-mainnet"
        ));
    }

    let script_path = config
        .script
        .as_ref()
        .ok_or_else(|| anyhow!("No scenario script given, use --script <path>"))?;

    let store = RegistryStore::new(&config.registry_dir);
    let mut world = store
        .load(config.network)
        .with_context(|| format!("Error while loading the {} registry", config.network))?;
    info!(
        "Loaded {} registry entries for {}",
        world.registry().len(),
        config.network
    );

    for raw in &config.account {
        let (name, address) = parse_account(raw)?;
        world = world.with_account(name, address);
    }

    let abis = match config.abis.as_ref() {
        Some(path) => AbiRegistry::load_from_file(path)
            .with_context(|| format!("Error while loading ABIs from {}", path.display()))?,
        None => AbiRegistry::new(),
    };
    let abis = Arc::new(abis);

    let executor = Arc::new(DaemonExecutor::new(&config.daemon_address, abis.clone()));
    let interpreter =
        Interpreter::with_timeout(executor, abis, Duration::from_secs(config.timeout_secs));
    commands::register_all(&interpreter)?;

    let source = std::fs::read_to_string(script_path)
        .with_context(|| format!("Error while reading {}", script_path.display()))?;
    let ScriptOutcome { world, error } = script::run_source(&interpreter, world, &source).await;

    // Registrations completed before a halt are still persisted
    store
        .persist(&world)
        .context("Error while persisting the contract registry")?;
    info!(
        "Persisted {} registry entries for {}",
        world.registry().len(),
        world.network()
    );

    match error {
        Some(err) => {
            error!("Script halted: {}", err);
            Err(err.into())
        }
        None => {
            info!("Script completed: {} command(s) executed", world.trace().len());
            Ok(())
        }
    }
}

fn parse_account(raw: &str) -> Result<(&str, scenario_common::value::Address)> {
    let (name, address) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid account '{}', expected name=0xaddress", raw))?;
    let address = parse_address(address)
        .ok_or_else(|| anyhow!("Invalid address for account '{}'", name))?;
    Ok((name, address))
}
