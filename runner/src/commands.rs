use log::info;

use scenario_common::abi::MethodDecl;
use scenario_common::argument::{Arg, Arguments};
use scenario_common::async_handler;
use scenario_common::executor::ArtifactRef;
use scenario_common::fetcher::{Fetcher, Interpreter, ScenarioError};
use scenario_common::value::{format_address, Value, ValueKind};
use scenario_common::world::{ContractMetadata, ContractPath, Registration, World};

const DEPLOY_DOCS: &str = r#"#### Deploy

* "Deploy <label> <artifact>" - Deploy a contract without constructor arguments
  * E.g. "Deploy MyVaultImpl BRNVault"
"#;

const DEPLOY_WITH_ARGS_DOCS: &str = r#"#### Deploy

* "Deploy <label> <artifact> <args...>" - Deploy a contract with constructor arguments
  * E.g. "Deploy MyVaultImpl BRNVault 2e26 true"
"#;

const SEND_DOCS: &str = r#"#### Send

* "Send <path> <method> <args...>" - Submit a state-changing call to a registered contract
  * E.g. "Send BRNVault.MyVaultImpl transfer 0x... 2e26"
"#;

const READ_DOCS: &str = r#"#### Read

* "Read <path> <method> <args...>" - Query a registered contract without a transaction
  * E.g. "Read MyVaultImpl balanceOf 0x..."
"#;

/// Register the standard command set. Within each family the specific
/// signature comes before the catchall one; declaration order is
/// overload priority.
pub fn register_all(interpreter: &Interpreter) -> Result<(), ScenarioError> {
    interpreter.add_fetcher(Fetcher::new(
        "Deploy",
        DEPLOY_DOCS,
        vec![
            Arg::new("label", ValueKind::String),
            Arg::new("artifact", ValueKind::String),
        ],
        async_handler!(deploy),
    ))?;
    interpreter.add_fetcher(Fetcher::new(
        "Deploy",
        DEPLOY_WITH_ARGS_DOCS,
        vec![
            Arg::new("label", ValueKind::String),
            Arg::new("artifact", ValueKind::String),
            Arg::catchall("args", ValueKind::String),
        ],
        async_handler!(deploy_with_args),
    ))?;
    interpreter.add_fetcher(Fetcher::new(
        "Send",
        SEND_DOCS,
        vec![
            Arg::new("path", ValueKind::String),
            Arg::new("method", ValueKind::String),
            Arg::catchall("args", ValueKind::String),
        ],
        async_handler!(send),
    ))?;
    interpreter.add_fetcher(Fetcher::new(
        "Read",
        READ_DOCS,
        vec![
            Arg::new("path", ValueKind::String),
            Arg::new("method", ValueKind::String),
            Arg::catchall("args", ValueKind::String),
        ],
        async_handler!(read),
    ))?;
    Ok(())
}

async fn deploy(
    interpreter: &Interpreter,
    world: World,
    mut args: Arguments,
) -> Result<World, ScenarioError> {
    let label = args.get_value("label")?.to_string_value()?;
    let artifact = args.get_value("artifact")?.to_string_value()?;
    deploy_contract(interpreter, world, label, artifact, Vec::new()).await
}

async fn deploy_with_args(
    interpreter: &Interpreter,
    world: World,
    mut args: Arguments,
) -> Result<World, ScenarioError> {
    let label = args.get_value("label")?.to_string_value()?;
    let artifact = args.get_value("artifact")?.to_string_value()?;
    let constructor_args = args.get_value("args")?.to_list()?;
    deploy_contract(interpreter, world, label, artifact, constructor_args).await
}

async fn deploy_contract(
    interpreter: &Interpreter,
    world: World,
    label: String,
    artifact: String,
    constructor_args: Vec<Value>,
) -> Result<World, ScenarioError> {
    // Validate both registry paths before touching the chain, so a bad
    // label never leaves an unregistered deployment behind
    let direct = ContractPath::single(&label)?;
    let qualified = ContractPath::new(vec![artifact.clone(), label.clone()])?;

    let sender = world.sender_address()?;
    let artifact_ref = ArtifactRef::new(&artifact);
    let (handle, receipt) = interpreter
        .executor()
        .deploy(sender, &artifact_ref, &constructor_args)
        .await
        .into_result()?;

    info!(
        "Deployed {} ({}) at {} (tx {:#x}, gas {})",
        label,
        artifact,
        format_address(&handle.address),
        receipt.transaction,
        receipt.gas_used
    );

    let metadata = ContractMetadata {
        name: handle.name.clone(),
        address: handle.address,
        abi: handle.abi.get_name().clone(),
    };
    // Addressable both by label and by contract-qualified path
    Ok(world.register(vec![
        Registration {
            path: direct,
            metadata: metadata.clone(),
        },
        Registration {
            path: qualified,
            metadata,
        },
    ]))
}

async fn send(
    interpreter: &Interpreter,
    world: World,
    mut args: Arguments,
) -> Result<World, ScenarioError> {
    let path: ContractPath = args.get_value("path")?.to_string_value()?.parse()?;
    let method = args.get_value("method")?.to_string_value()?;
    let raw_args = args.get_value("args")?.to_list()?;

    let metadata = world.lookup(&path)?.clone();
    let abi = interpreter.abis().get(&metadata.abi)?;
    let decl = abi.method(&method)?;
    decl.ensure_mutating()?;
    let call_args = coerce_to_params(decl, raw_args)?;
    decl.check_args(&call_args)?;

    let handle = scenario_common::executor::ContractHandle {
        name: metadata.name.clone(),
        address: metadata.address,
        abi: abi.clone(),
    };
    let sender = world.sender_address()?;
    let (_, receipt) = interpreter
        .executor()
        .send(&handle, &method, &call_args, sender)
        .await
        .into_result()?;

    info!(
        "Sent {}.{} (tx {:#x}, gas {})",
        path, method, receipt.transaction, receipt.gas_used
    );
    Ok(world)
}

async fn read(
    interpreter: &Interpreter,
    world: World,
    mut args: Arguments,
) -> Result<World, ScenarioError> {
    let path: ContractPath = args.get_value("path")?.to_string_value()?.parse()?;
    let method = args.get_value("method")?.to_string_value()?;
    let raw_args = args.get_value("args")?.to_list()?;

    let metadata = world.lookup(&path)?.clone();
    let abi = interpreter.abis().get(&metadata.abi)?;
    let decl = abi.method(&method)?;
    decl.ensure_view()?;
    let call_args = coerce_to_params(decl, raw_args)?;
    decl.check_args(&call_args)?;

    let handle = scenario_common::executor::ContractHandle {
        name: metadata.name.clone(),
        address: metadata.address,
        abi: abi.clone(),
    };
    let value = interpreter
        .executor()
        .call(&handle, &method, &call_args)
        .await?;

    info!("Read {}.{} -> {}", path, method, value);
    Ok(world)
}

// Catchall args arrive as strings; re-coerce them against the declared
// parameter kinds so the ABI check sees properly typed values.
fn coerce_to_params(decl: &MethodDecl, raw: Vec<Value>) -> Result<Vec<Value>, ScenarioError> {
    let mut coerced = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        // Extra values pass through untouched; check_args reports the arity
        let kind = match decl.params.get(index) {
            Some(kind) => kind,
            None => {
                coerced.push(value);
                continue;
            }
        };
        if value.kind() == *kind {
            coerced.push(value);
            continue;
        }
        match value {
            Value::String(token) => coerced.push(kind.coerce(&token)?),
            other => coerced.push(other),
        }
    }
    Ok(coerced)
}
