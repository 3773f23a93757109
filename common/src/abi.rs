use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{Value, ValueKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("Method '{}' not declared on contract '{}'", method, contract)]
    MethodNotFound { contract: String, method: String },
    #[error("Method '{}' expects {} argument(s), got {}", method, expected, got)]
    ArityMismatch {
        method: String,
        expected: usize,
        got: usize,
    },
    #[error("Method '{}' argument {}: expected {}, got {}", method, index, expected, got)]
    ArgumentKind {
        method: String,
        index: usize,
        expected: ValueKind,
        got: ValueKind,
    },
    #[error("Method '{}' mutates state and requires a transaction", _0)]
    RequiresTransaction(String),
    #[error("Method '{}' is read-only", _0)]
    ReadOnly(String),
    #[error("No ABI registered under '{}'", _0)]
    UnknownAbi(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    View,
    Mutating,
}

/// One typed method signature of a contract interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<ValueKind>,
    #[serde(default)]
    pub returns: Option<ValueKind>,
    pub mutability: Mutability,
}

impl MethodDecl {
    /// Validate argument shape before anything reaches the execution layer.
    pub fn check_args(&self, args: &[Value]) -> Result<(), AbiError> {
        if args.len() != self.params.len() {
            return Err(AbiError::ArityMismatch {
                method: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }
        for (index, (param, arg)) in self.params.iter().zip(args).enumerate() {
            if *param != arg.kind() {
                return Err(AbiError::ArgumentKind {
                    method: self.name.clone(),
                    index,
                    expected: param.clone(),
                    got: arg.kind(),
                });
            }
        }
        Ok(())
    }

    pub fn ensure_view(&self) -> Result<(), AbiError> {
        match self.mutability {
            Mutability::View => Ok(()),
            Mutability::Mutating => Err(AbiError::RequiresTransaction(self.name.clone())),
        }
    }

    pub fn ensure_mutating(&self) -> Result<(), AbiError> {
        match self.mutability {
            Mutability::Mutating => Ok(()),
            Mutability::View => Err(AbiError::ReadOnly(self.name.clone())),
        }
    }
}

/// A contract's callable surface: the union of the named method
/// interfaces it implements. Interfaces compose; there is no
/// inheritance hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractAbi {
    name: String,
    methods: IndexMap<String, MethodDecl>,
}

impl ContractAbi {
    pub fn new(name: &str, methods: Vec<MethodDecl>) -> Self {
        Self {
            name: name.to_owned(),
            methods: methods
                .into_iter()
                .map(|decl| (decl.name.clone(), decl))
                .collect(),
        }
    }

    /// Union of several interfaces under a new name. Later interfaces
    /// win on method-name collisions.
    pub fn compose(name: &str, interfaces: &[&ContractAbi]) -> Self {
        let mut methods = IndexMap::new();
        for interface in interfaces {
            for (method_name, decl) in &interface.methods {
                methods.insert(method_name.clone(), decl.clone());
            }
        }
        Self {
            name: name.to_owned(),
            methods,
        }
    }

    pub fn get_name(&self) -> &String {
        &self.name
    }

    pub fn method(&self, method: &str) -> Result<&MethodDecl, AbiError> {
        self.methods.get(method).ok_or_else(|| AbiError::MethodNotFound {
            contract: self.name.clone(),
            method: method.to_owned(),
        })
    }
}

/// Name-addressed ABI lookup, resolving the registry's abi references.
#[derive(Default)]
pub struct AbiRegistry {
    abis: HashMap<String, Arc<ContractAbi>>,
}

impl AbiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, abi: ContractAbi) {
        self.abis.insert(abi.get_name().clone(), Arc::new(abi));
    }

    pub fn get(&self, name: &str) -> Result<Arc<ContractAbi>, AbiError> {
        self.abis
            .get(name)
            .cloned()
            .ok_or_else(|| AbiError::UnknownAbi(name.to_owned()))
    }

    /// Load declarations from a JSON file holding an array of contract ABIs.
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let file = File::open(path)?;
        let abis: Vec<ContractAbi> = serde_json::from_reader(file)?;
        let mut registry = Self::new();
        for abi in abis {
            registry.insert(abi);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;

    fn transfer() -> MethodDecl {
        MethodDecl {
            name: "transfer".to_owned(),
            params: vec![ValueKind::Address, ValueKind::Number],
            returns: Some(ValueKind::Bool),
            mutability: Mutability::Mutating,
        }
    }

    fn balance_of() -> MethodDecl {
        MethodDecl {
            name: "balanceOf".to_owned(),
            params: vec![ValueKind::Address],
            returns: Some(ValueKind::Number),
            mutability: Mutability::View,
        }
    }

    #[test]
    fn test_check_args() {
        let decl = transfer();
        let to = Value::Address(crate::value::Address::from_low_u64_be(7));
        assert!(decl.check_args(&[to.clone(), Value::Number(U256::from(5u64))]).is_ok());

        assert!(matches!(
            decl.check_args(&[to.clone()]),
            Err(AbiError::ArityMismatch { expected: 2, got: 1, .. })
        ));
        assert!(matches!(
            decl.check_args(&[to, Value::String("5".to_owned())]),
            Err(AbiError::ArgumentKind { index: 1, .. })
        ));
    }

    #[test]
    fn test_mutability_checks() {
        assert!(transfer().ensure_mutating().is_ok());
        assert!(matches!(transfer().ensure_view(), Err(AbiError::RequiresTransaction(_))));
        assert!(balance_of().ensure_view().is_ok());
        assert!(matches!(balance_of().ensure_mutating(), Err(AbiError::ReadOnly(_))));
    }

    #[test]
    fn test_compose_unions_interfaces() {
        let erc20 = ContractAbi::new("ERC20", vec![transfer(), balance_of()]);
        let pausable = ContractAbi::new(
            "Pausable",
            vec![MethodDecl {
                name: "pause".to_owned(),
                params: vec![],
                returns: None,
                mutability: Mutability::Mutating,
            }],
        );
        let vault = ContractAbi::compose("BRNVault", &[&erc20, &pausable]);
        assert!(vault.method("transfer").is_ok());
        assert!(vault.method("pause").is_ok());
        assert!(matches!(
            vault.method("mint"),
            Err(AbiError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = AbiRegistry::new();
        registry.insert(ContractAbi::new("ERC20", vec![transfer()]));
        assert!(registry.get("ERC20").is_ok());
        assert!(matches!(registry.get("Nope"), Err(AbiError::UnknownAbi(_))));
    }
}
