use primitive_types::H256;
use thiserror::Error;

/// A deploy or send that failed at the execution layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Execution reverted: {}", _0)]
    Revert(String),
    #[error("Network error: {}", _0)]
    Network(String),
    #[error("Invalid arguments: {}", _0)]
    InvalidArguments(String),
}

/// Metadata of a mined transaction, kept for logging and retry/halt decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction: H256,
    pub gas_used: u64,
}

/// Outcome of a contract deployment or state-changing call: either a
/// value with its receipt, or a structured error. Exactly one side
/// exists by construction; `into_result` is the only way to reach the
/// value, so callers can never skip the error check.
#[derive(Debug, Clone)]
pub enum Invokation<T> {
    Success { value: T, receipt: Receipt },
    Failure { error: ExecutionError },
}

impl<T> Invokation<T> {
    pub fn success(value: T, receipt: Receipt) -> Self {
        Invokation::Success { value, receipt }
    }

    pub fn failure(error: ExecutionError) -> Self {
        Invokation::Failure { error }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Invokation::Failure { .. })
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            Invokation::Success { .. } => None,
            Invokation::Failure { error } => Some(error),
        }
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            Invokation::Success { receipt, .. } => Some(receipt),
            Invokation::Failure { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<(T, Receipt), ExecutionError> {
        match self {
            Invokation::Success { value, receipt } => Ok((value, receipt)),
            Invokation::Failure { error } => Err(error),
        }
    }
}
