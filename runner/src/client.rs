use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::trace;
use primitive_types::{H256, U256};
use serde_json::{json, Value as Json};

use scenario_common::abi::AbiRegistry;
use scenario_common::executor::{ArtifactRef, ContractHandle, Executor};
use scenario_common::invokation::{ExecutionError, Invokation, Receipt};
use scenario_common::value::{format_address, parse_address, Address, Value};

const JSON_RPC_VERSION: &str = "2.0";

/// `Executor` backed by the daemon's JSON-RPC API over HTTP.
/// ABIs are resolved locally from the registry shipped with the
/// scenario; the daemon only sees addresses and encoded arguments.
pub struct DaemonExecutor {
    client: reqwest::Client,
    endpoint: String,
    abis: Arc<AbiRegistry>,
    request_id: AtomicU64,
}

impl DaemonExecutor {
    pub fn new(endpoint: &str, abis: Arc<AbiRegistry>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_owned(),
            abis,
            request_id: AtomicU64::new(1),
        }
    }

    async fn request(&self, method: &str, params: Json) -> Result<Json, ExecutionError> {
        let body = json!({
            "jsonrpc": JSON_RPC_VERSION,
            "id": self.request_id.fetch_add(1, Ordering::SeqCst),
            "method": method,
            "params": params,
        });
        trace!("RPC request {}: {}", method, body);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| ExecutionError::Network(err.to_string()))?;
        let envelope: Json = response
            .json()
            .await
            .map_err(|err| ExecutionError::Network(err.to_string()))?;

        if let Some(error) = envelope.get("error") {
            return Err(fault_from(error));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Json::Null))
    }
}

// Revert payloads come back as an error object with a reason in data;
// everything else is a transport/daemon fault
fn fault_from(error: &Json) -> ExecutionError {
    if let Some(reason) = error
        .get("data")
        .and_then(|data| data.get("reason"))
        .and_then(Json::as_str)
    {
        return ExecutionError::Revert(reason.to_owned());
    }
    let message = error
        .get("message")
        .and_then(Json::as_str)
        .unwrap_or("unknown RPC error");
    if let Some(reason) = message.strip_prefix("execution reverted: ") {
        return ExecutionError::Revert(reason.to_owned());
    }
    ExecutionError::Network(message.to_owned())
}

pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => json!(s),
        // Numbers travel as decimal strings to survive 256-bit range
        Value::Number(n) => json!(n.to_string()),
        Value::Bool(b) => json!(b),
        Value::Address(a) => json!(format_address(a)),
        Value::List(values) => Json::Array(values.iter().map(value_to_json).collect()),
    }
}

pub fn json_to_value(json: &Json) -> Result<Value, ExecutionError> {
    match json {
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => n
            .as_u64()
            .map(|n| Value::Number(U256::from(n)))
            .ok_or_else(|| ExecutionError::Network(format!("non-integral result: {}", n))),
        Json::String(s) => {
            if let Some(address) = parse_address(s) {
                return Ok(Value::Address(address));
            }
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(number) = U256::from_dec_str(s) {
                    return Ok(Value::Number(number));
                }
            }
            Ok(Value::String(s.clone()))
        }
        Json::Array(items) => {
            let mut values = Vec::new();
            for item in items {
                values.push(json_to_value(item)?);
            }
            Ok(Value::List(values))
        }
        other => Err(ExecutionError::Network(format!(
            "unexpected result: {}",
            other
        ))),
    }
}

fn receipt_from(result: &Json) -> Result<Receipt, ExecutionError> {
    let transaction = result
        .get("transaction")
        .and_then(Json::as_str)
        .and_then(parse_h256)
        .ok_or_else(|| ExecutionError::Network("missing transaction hash in receipt".to_owned()))?;
    let gas_used = result
        .get("gas_used")
        .and_then(Json::as_u64)
        .unwrap_or_default();
    Ok(Receipt {
        transaction,
        gas_used,
    })
}

fn parse_h256(token: &str) -> Option<H256> {
    let hex_part = token.strip_prefix("0x")?;
    if hex_part.len() != 64 {
        return None;
    }
    let bytes = hex::decode(hex_part).ok()?;
    Some(H256::from_slice(&bytes))
}

#[async_trait]
impl Executor for DaemonExecutor {
    async fn deploy(
        &self,
        sender: Address,
        artifact: &ArtifactRef,
        args: &[Value],
    ) -> Invokation<ContractHandle> {
        let abi = match self.abis.get(artifact.get_name()) {
            Ok(abi) => abi,
            Err(err) => return Invokation::failure(ExecutionError::InvalidArguments(err.to_string())),
        };

        let params = json!({
            "sender": format_address(&sender),
            "artifact": artifact.get_name(),
            "args": args.iter().map(value_to_json).collect::<Vec<_>>(),
        });
        let result = match self.request("deploy_contract", params).await {
            Ok(result) => result,
            Err(err) => return Invokation::failure(err),
        };

        let address = match result
            .get("address")
            .and_then(Json::as_str)
            .and_then(parse_address)
        {
            Some(address) => address,
            None => {
                return Invokation::failure(ExecutionError::Network(
                    "missing contract address in deploy result".to_owned(),
                ))
            }
        };
        match receipt_from(&result) {
            Ok(receipt) => Invokation::success(
                ContractHandle {
                    name: artifact.get_name().clone(),
                    address,
                    abi,
                },
                receipt,
            ),
            Err(err) => Invokation::failure(err),
        }
    }

    async fn send(
        &self,
        handle: &ContractHandle,
        method: &str,
        args: &[Value],
        sender: Address,
    ) -> Invokation<Receipt> {
        let params = json!({
            "contract": format_address(&handle.address),
            "method": method,
            "args": args.iter().map(value_to_json).collect::<Vec<_>>(),
            "sender": format_address(&sender),
        });
        match self.request("invoke_contract", params).await {
            Ok(result) => match receipt_from(&result) {
                Ok(receipt) => Invokation::success(receipt.clone(), receipt),
                Err(err) => Invokation::failure(err),
            },
            Err(err) => Invokation::failure(err),
        }
    }

    async fn call(
        &self,
        handle: &ContractHandle,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutionError> {
        let params = json!({
            "contract": format_address(&handle.address),
            "method": method,
            "args": args.iter().map(value_to_json).collect::<Vec<_>>(),
        });
        let result = self.request("call_contract", params).await?;
        json_to_value(&result)
    }
}
