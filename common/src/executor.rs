use std::fmt;
use std::sync::Arc;

/// Execution capability trait for dependency injection
///
/// The interpreter invokes deployed contracts without depending on a
/// specific chain client. The runner implements this trait over its
/// RPC client and injects the executor into the interpreter; tests
/// inject an in-process stub.
use async_trait::async_trait;

use crate::abi::ContractAbi;
use crate::invokation::{ExecutionError, Invokation, Receipt};
use crate::value::{Address, Value};

/// Reference to a compiled contract artifact (bytecode + ABI), by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    name: String,
}

impl ArtifactRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }

    pub fn get_name(&self) -> &String {
        &self.name
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Live handle to a deployed contract: where it lives and what it answers to.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub name: String,
    pub address: Address,
    pub abi: Arc<ContractAbi>,
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Deploy a contract from an artifact with constructor arguments.
    async fn deploy(
        &self,
        sender: Address,
        artifact: &ArtifactRef,
        args: &[Value],
    ) -> Invokation<ContractHandle>;

    /// Submit a state-changing method call as a transaction.
    async fn send(
        &self,
        handle: &ContractHandle,
        method: &str,
        args: &[Value],
        sender: Address,
    ) -> Invokation<Receipt>;

    /// Read-only query. No receipt: it can only fail with a
    /// connectivity or argument error, never with a chain-state one.
    async fn call(
        &self,
        handle: &ContractHandle,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutionError>;
}
