use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::network::Network;
use crate::value::Address;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("No contract registered at '{}'", _0)]
    NotFound(ContractPath),
    #[error("Unknown account '{}'", _0)]
    UnknownAccount(String),
    #[error("No sender account configured")]
    NoSender,
    #[error("Invalid contract path '{}'", _0)]
    InvalidPath(String),
}

/// Symbolic registry address: an ordered sequence of segments,
/// written and persisted in dotted form (`BRNVault.MyVaultImpl`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractPath {
    segments: Vec<String>,
}

impl ContractPath {
    /// Segments may not be empty or contain the separator, so every
    /// constructible path survives `Display` -> `FromStr` unchanged
    /// (the persisted registry is keyed by the dotted form).
    pub fn new(segments: Vec<String>) -> Result<Self, WorldError> {
        if segments.is_empty()
            || segments
                .iter()
                .any(|segment| segment.is_empty() || segment.contains('.'))
        {
            return Err(WorldError::InvalidPath(segments.join(".")));
        }
        Ok(Self { segments })
    }

    pub fn single(segment: &str) -> Result<Self, WorldError> {
        Self::new(vec![segment.to_owned()])
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for ContractPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for ContractPath {
    type Err = WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split('.').map(str::to_owned).collect())
            .map_err(|_| WorldError::InvalidPath(s.to_owned()))
    }
}

impl Serialize for ContractPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContractPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(DeError::custom)
    }
}

/// What the registry remembers about one deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub name: String,
    pub address: Address,
    /// Reference into the ABI registry
    pub abi: String,
}

/// One registry write: a path bound to its full metadata record.
#[derive(Debug, Clone)]
pub struct Registration {
    pub path: ContractPath,
    pub metadata: ContractMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub command: String,
    pub outcome: String,
}

/// Immutable interpreter state threaded through every command.
/// Handlers never mutate a world in place; every update operation
/// returns a new world and the script loop alone substitutes it,
/// which is what makes runs deterministic and replayable.
#[derive(Clone)]
pub struct World {
    network: Network,
    accounts: IndexMap<String, Address>,
    sender: Option<String>,
    registry: IndexMap<ContractPath, ContractMetadata>,
    trace: Vec<TraceEntry>,
}

impl World {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            accounts: IndexMap::new(),
            sender: None,
            registry: IndexMap::new(),
            trace: Vec::new(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn accounts(&self) -> &IndexMap<String, Address> {
        &self.accounts
    }

    pub fn with_account(&self, name: &str, address: Address) -> World {
        let mut world = self.clone();
        world.accounts.insert(name.to_owned(), address);
        world
    }

    pub fn account(&self, name: &str) -> Result<Address, WorldError> {
        self.accounts
            .get(name)
            .copied()
            .ok_or_else(|| WorldError::UnknownAccount(name.to_owned()))
    }

    pub fn sender_name(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn with_sender(&self, name: &str) -> Result<World, WorldError> {
        // Validate up front so a typo'd From fails before any execution
        self.account(name)?;
        let mut world = self.clone();
        world.sender = Some(name.to_owned());
        Ok(world)
    }

    pub fn without_sender(&self) -> World {
        let mut world = self.clone();
        world.sender = None;
        world
    }

    /// Active sender address: the explicit sender if set, otherwise
    /// the first configured account.
    pub fn sender_address(&self) -> Result<Address, WorldError> {
        match &self.sender {
            Some(name) => self.account(name),
            None => self
                .accounts
                .first()
                .map(|(_, address)| *address)
                .ok_or(WorldError::NoSender),
        }
    }

    pub fn registry(&self) -> &IndexMap<ContractPath, ContractMetadata> {
        &self.registry
    }

    pub fn with_registry(&self, registry: IndexMap<ContractPath, ContractMetadata>) -> World {
        let mut world = self.clone();
        world.registry = registry;
        world
    }

    /// Bind each path to its metadata, atomically per path and
    /// last-write-wins on an existing path. No other path is touched.
    pub fn register(&self, entries: Vec<Registration>) -> World {
        let mut world = self.clone();
        for entry in entries {
            world.registry.insert(entry.path, entry.metadata);
        }
        world
    }

    pub fn lookup(&self, path: &ContractPath) -> Result<&ContractMetadata, WorldError> {
        self.registry
            .get(path)
            .ok_or_else(|| WorldError::NotFound(path.clone()))
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn record(&self, command: impl Into<String>, outcome: impl Into<String>) -> World {
        let mut world = self.clone();
        world.trace.push(TraceEntry {
            command: command.into(),
            outcome: outcome.into(),
        });
        world
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("World")
            .field("network", &self.network)
            .field("accounts", &self.accounts.len())
            .field("registry", &self.registry.len())
            .field("trace", &self.trace.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str, low: u64) -> ContractMetadata {
        ContractMetadata {
            name: name.to_owned(),
            address: Address::from_low_u64_be(low),
            abi: name.to_owned(),
        }
    }

    #[test]
    fn test_path_parse_and_display() {
        let path: ContractPath = "BRNVault.MyVaultImpl".parse().unwrap();
        assert_eq!(path.segments(), &["BRNVault".to_owned(), "MyVaultImpl".to_owned()]);
        assert_eq!(path.to_string(), "BRNVault.MyVaultImpl");

        assert!(matches!(
            "".parse::<ContractPath>(),
            Err(WorldError::InvalidPath(_))
        ));
        assert!(matches!(
            "a..b".parse::<ContractPath>(),
            Err(WorldError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_segments_may_not_contain_the_separator() {
        // A dotted label would serialize as two segments and no longer
        // resolve after a persist/load cycle, so it is rejected up front
        assert!(matches!(
            ContractPath::single("my.vault"),
            Err(WorldError::InvalidPath(_))
        ));
        assert!(matches!(
            ContractPath::new(vec!["Token".to_owned(), "my.vault".to_owned()]),
            Err(WorldError::InvalidPath(_))
        ));

        let path = ContractPath::new(vec!["Token".to_owned(), "Vault".to_owned()]).unwrap();
        assert_eq!(path.to_string().parse::<ContractPath>().unwrap(), path);
    }

    #[test]
    fn test_register_overwrites_exact_path_only() {
        let world = World::new(Network::Devnet);
        let world = world.register(vec![
            Registration {
                path: ContractPath::single("X").unwrap(),
                metadata: metadata("First", 0xa),
            },
            Registration {
                path: ContractPath::single("Y").unwrap(),
                metadata: metadata("Other", 0xb),
            },
        ]);
        let world = world.register(vec![Registration {
            path: ContractPath::single("X").unwrap(),
            metadata: metadata("Second", 0xc),
        }]);

        assert_eq!(
            world.lookup(&ContractPath::single("X").unwrap()).unwrap().address,
            Address::from_low_u64_be(0xc)
        );
        assert_eq!(
            world.lookup(&ContractPath::single("Y").unwrap()).unwrap().address,
            Address::from_low_u64_be(0xb)
        );
        assert_eq!(world.registry().len(), 2);
    }

    #[test]
    fn test_register_does_not_mutate_original() {
        let original = World::new(Network::Devnet);
        let _updated = original.register(vec![Registration {
            path: ContractPath::single("X").unwrap(),
            metadata: metadata("X", 1),
        }]);
        assert!(original.registry().is_empty());
    }

    #[test]
    fn test_lookup_miss() {
        let world = World::new(Network::Devnet);
        assert!(matches!(
            world.lookup(&ContractPath::single("missing").unwrap()),
            Err(WorldError::NotFound(_))
        ));
    }

    #[test]
    fn test_sender_resolution() {
        let world = World::new(Network::Devnet);
        assert!(matches!(world.sender_address(), Err(WorldError::NoSender)));

        let world = world
            .with_account("alice", Address::from_low_u64_be(1))
            .with_account("bob", Address::from_low_u64_be(2));
        // Defaults to the first configured account
        assert_eq!(world.sender_address().unwrap(), Address::from_low_u64_be(1));

        let scoped = world.with_sender("bob").unwrap();
        assert_eq!(scoped.sender_address().unwrap(), Address::from_low_u64_be(2));
        assert!(matches!(
            world.with_sender("carol"),
            Err(WorldError::UnknownAccount(_))
        ));
    }

    #[test]
    fn test_trace_is_appended() {
        let world = World::new(Network::Devnet)
            .record("Deploy X", "ok")
            .record("Send X ping", "ok");
        assert_eq!(world.trace().len(), 2);
        assert_eq!(world.trace()[0].command, "Deploy X");
    }
}
