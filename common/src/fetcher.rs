use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Error;
use log::debug;
use thiserror::Error;
use tokio::time::timeout;

use crate::abi::{AbiError, AbiRegistry};
use crate::argument::{bind, validate_signature, Arg, ArgError, Arguments};
use crate::config::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::event::{Event, ParseError};
use crate::executor::Executor;
use crate::invokation::ExecutionError;
use crate::value::ValueError;
use crate::world::{World, WorldError};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Expected a command name")]
    ExpectedCommandName,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Arg(#[from] ArgError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("No fetcher matched '{}'{}", command, format_attempted(attempted))]
    NoMatchingFetcher {
        family: String,
        command: String,
        attempted: Vec<String>,
    },
    #[error("Command '{}' timed out after {}s", command, timeout.as_secs())]
    Timeout { command: String, timeout: Duration },
    #[error("Expected the command to revert, but it succeeded")]
    ExpectedRevert,
    #[error("Poison Error: {}", _0)]
    PoisonError(String),
    #[error(transparent)]
    Any(#[from] Error),
}

impl<T> From<PoisonError<T>> for ScenarioError {
    fn from(err: PoisonError<T>) -> Self {
        Self::PoisonError(format!("{}", err))
    }
}

fn format_attempted(attempted: &[String]) -> String {
    if attempted.is_empty() {
        return ": unknown command family".to_owned();
    }
    format!(". Attempted signatures:\n  {}", attempted.join("\n  "))
}

pub type AsyncResolverFn = for<'a> fn(
    &'a Interpreter,
    World,
    Arguments,
) -> Pin<Box<dyn Future<Output = Result<World, ScenarioError>> + 'a>>;

#[macro_export]
macro_rules! async_handler {
    ($func: expr) => {
        |interpreter, world, args| Box::pin($func(interpreter, world, args))
    };
}

/// One candidate handler of a command family: a typed signature,
/// markdown usage documentation, and an async resolver. Immutable
/// once registered.
pub struct Fetcher {
    name: String,
    docs: String,
    args: Vec<Arg>,
    resolver: AsyncResolverFn,
}

impl Fetcher {
    pub fn new(name: &str, docs: &str, args: Vec<Arg>, resolver: AsyncResolverFn) -> Self {
        Self {
            name: name.to_owned(),
            docs: docs.to_owned(),
            args,
            resolver,
        }
    }

    pub fn get_name(&self) -> &String {
        &self.name
    }

    pub fn get_docs(&self) -> &String {
        &self.docs
    }

    pub fn get_args(&self) -> &Vec<Arg> {
        &self.args
    }

    /// One-line signature: `<required>` for plain args, `[name]` for
    /// defaulted ones, `<name...>` for the trailing catchall.
    pub fn get_usage(&self) -> String {
        let mut parts = vec![self.name.clone()];
        for arg in &self.args {
            if arg.is_catchall() {
                parts.push(format!("<{}...>", arg.get_name()));
            } else if arg.get_default().is_some() {
                parts.push(format!("[{}]", arg.get_name()));
            } else {
                parts.push(format!("<{}>", arg.get_name()));
            }
        }
        parts.join(" ")
    }

    pub async fn execute(
        &self,
        interpreter: &Interpreter,
        world: World,
        values: Arguments,
    ) -> Result<World, ScenarioError> {
        (self.resolver)(interpreter, world, values).await
    }
}

// We use Mutex from std instead of tokio so registration stays usable
// from sync code; it is never held across an await.
pub struct Interpreter {
    fetchers: Mutex<Vec<Rc<Fetcher>>>,
    executor: Arc<dyn Executor>,
    abis: Arc<AbiRegistry>,
    command_timeout: Duration,
}

impl Interpreter {
    pub fn new(executor: Arc<dyn Executor>, abis: Arc<AbiRegistry>) -> Self {
        Self::with_timeout(
            executor,
            abis,
            Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        executor: Arc<dyn Executor>,
        abis: Arc<AbiRegistry>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            fetchers: Mutex::new(Vec::new()),
            executor,
            abis,
            command_timeout,
        }
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn abis(&self) -> &Arc<AbiRegistry> {
        &self.abis
    }

    /// Register a fetcher at the end of its family's overload order.
    /// Order is significant: specific signatures must be registered
    /// before generic/catchall ones.
    pub fn add_fetcher(&self, fetcher: Fetcher) -> Result<(), ScenarioError> {
        validate_signature(fetcher.get_args())?;
        let mut fetchers = self.fetchers.lock()?;
        fetchers.push(Rc::new(fetcher));
        Ok(())
    }

    /// Usage line of every fetcher, for help output.
    pub fn usage(&self) -> Result<Vec<String>, ScenarioError> {
        let fetchers = self.fetchers.lock()?;
        Ok(fetchers.iter().map(|f| f.get_usage()).collect())
    }

    /// Resolve an event against its command family: first fetcher in
    /// declaration order whose signature binds wins; its resolver runs
    /// under the per-command timeout. The caller's world is cloned for
    /// the resolver, so on any failure (including timeout) the caller
    /// still holds the pre-command world.
    pub async fn dispatch(&self, world: &World, event: &Event) -> Result<World, ScenarioError> {
        let family = event.name().ok_or(ScenarioError::ExpectedCommandName)?;
        let candidates: Vec<Rc<Fetcher>> = {
            let fetchers = self.fetchers.lock()?;
            fetchers
                .iter()
                .filter(|fetcher| fetcher.get_name() == family)
                .cloned()
                .collect()
        };

        let mut attempted = Vec::new();
        for fetcher in candidates {
            match bind(fetcher.get_args(), event.args()) {
                Ok(values) => {
                    debug!("Dispatching '{}' to {}", event, fetcher.get_usage());
                    return match timeout(
                        self.command_timeout,
                        fetcher.execute(self, world.clone(), values),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ScenarioError::Timeout {
                            command: event.to_string(),
                            timeout: self.command_timeout,
                        }),
                    };
                }
                Err(err) => {
                    attempted.push(format!(
                        "{} ({})\n{}",
                        fetcher.get_usage(),
                        err,
                        fetcher.get_docs().trim_end()
                    ));
                }
            }
        }

        Err(ScenarioError::NoMatchingFetcher {
            family: family.to_owned(),
            command: event.to_string(),
            attempted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ContractAbi;
    use crate::event::parse;
    use crate::executor::{ArtifactRef, ContractHandle, Executor};
    use crate::invokation::{ExecutionError, Invokation, Receipt};
    use crate::network::Network;
    use crate::value::{Address, Value, ValueKind};
    use async_trait::async_trait;
    use primitive_types::H256;

    struct StubExecutor;

    #[async_trait]
    impl Executor for StubExecutor {
        async fn deploy(
            &self,
            _sender: Address,
            artifact: &ArtifactRef,
            _args: &[Value],
        ) -> Invokation<ContractHandle> {
            Invokation::success(
                ContractHandle {
                    name: artifact.get_name().clone(),
                    address: Address::from_low_u64_be(0x1000),
                    abi: Arc::new(ContractAbi::new(artifact.get_name(), vec![])),
                },
                Receipt {
                    transaction: H256::from_low_u64_be(1),
                    gas_used: 1,
                },
            )
        }

        async fn send(
            &self,
            _handle: &ContractHandle,
            _method: &str,
            _args: &[Value],
            _sender: Address,
        ) -> Invokation<Receipt> {
            Invokation::failure(ExecutionError::Revert("stub".to_owned()))
        }

        async fn call(
            &self,
            _handle: &ContractHandle,
            _method: &str,
            _args: &[Value],
        ) -> Result<Value, ExecutionError> {
            Ok(Value::Bool(true))
        }
    }

    fn interpreter() -> Interpreter {
        Interpreter::with_timeout(
            Arc::new(StubExecutor),
            Arc::new(AbiRegistry::new()),
            Duration::from_millis(100),
        )
    }

    async fn numeric(
        _interpreter: &Interpreter,
        world: World,
        _args: Arguments,
    ) -> Result<World, ScenarioError> {
        Ok(world.record("numeric", "ok"))
    }

    async fn catchall(
        _interpreter: &Interpreter,
        world: World,
        _args: Arguments,
    ) -> Result<World, ScenarioError> {
        Ok(world.record("catchall", "ok"))
    }

    async fn sleepy(
        _interpreter: &Interpreter,
        world: World,
        _args: Arguments,
    ) -> Result<World, ScenarioError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(world)
    }

    fn register_deploy_family(interpreter: &Interpreter) {
        interpreter
            .add_fetcher(Fetcher::new(
                "Deploy",
                "Deploy with a numeric argument",
                vec![Arg::new("amount", ValueKind::Number)],
                async_handler!(numeric),
            ))
            .unwrap();
        interpreter
            .add_fetcher(Fetcher::new(
                "Deploy",
                "Deploy fallback",
                vec![Arg::catchall("args", ValueKind::String)],
                async_handler!(catchall),
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_prefers_declaration_order() {
        let interpreter = interpreter();
        register_deploy_family(&interpreter);
        let world = World::new(Network::Devnet);

        let result = interpreter
            .dispatch(&world, &parse("Deploy 5").unwrap())
            .await
            .unwrap();
        assert_eq!(result.trace()[0].command, "numeric");

        let result = interpreter
            .dispatch(&world, &parse("Deploy a b c").unwrap())
            .await
            .unwrap();
        assert_eq!(result.trace()[0].command, "catchall");
    }

    #[tokio::test]
    async fn test_dispatch_no_match_lists_signatures() {
        let interpreter = interpreter();
        interpreter
            .add_fetcher(Fetcher::new(
                "Mint",
                "Mint tokens",
                vec![Arg::new("amount", ValueKind::Number)],
                async_handler!(numeric),
            ))
            .unwrap();
        let world = World::new(Network::Devnet);

        let err = interpreter
            .dispatch(&world, &parse("Mint lots please").unwrap())
            .await
            .unwrap_err();
        match err {
            ScenarioError::NoMatchingFetcher { family, attempted, .. } => {
                assert_eq!(family, "Mint");
                assert_eq!(attempted.len(), 1);
                assert!(attempted[0].contains("Mint <amount>"));
                // Each rejected candidate carries its documentation
                assert!(attempted[0].contains("Mint tokens"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_unknown_family() {
        let interpreter = interpreter();
        let world = World::new(Network::Devnet);
        let err = interpreter
            .dispatch(&world, &parse("Nope").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::NoMatchingFetcher { attempted, .. } if attempted.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_dispatch_timeout_keeps_old_world() {
        let interpreter = interpreter();
        interpreter
            .add_fetcher(Fetcher::new(
                "Slow",
                "Sleeps past the command timeout",
                vec![],
                async_handler!(sleepy),
            ))
            .unwrap();
        let world = World::new(Network::Devnet);

        let err = interpreter
            .dispatch(&world, &parse("Slow").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ScenarioError::Timeout { .. }));
        // The caller's world was never substituted
        assert!(world.trace().is_empty());
    }

    #[tokio::test]
    async fn test_add_fetcher_rejects_bad_signature() {
        let interpreter = interpreter();
        let result = interpreter.add_fetcher(Fetcher::new(
            "Bad",
            "Catchall not last",
            vec![
                Arg::catchall("rest", ValueKind::String),
                Arg::new("tail", ValueKind::String),
            ],
            async_handler!(numeric),
        ));
        assert!(matches!(
            result,
            Err(ScenarioError::Arg(ArgError::InvalidSignature(_)))
        ));
    }

    #[test]
    fn test_usage_rendering() {
        let fetcher = Fetcher::new(
            "Deploy",
            "docs",
            vec![
                Arg::new("label", ValueKind::String),
                Arg::with_default("confirm", ValueKind::Bool, Value::Bool(false)),
                Arg::catchall("args", ValueKind::String),
            ],
            async_handler!(numeric),
        );
        assert_eq!(fetcher.get_usage(), "Deploy <label> [confirm] <args...>");
    }
}
