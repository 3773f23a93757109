use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::network::Network;
use crate::world::{ContractMetadata, ContractPath, World};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Durable, per-network storage of the contract registry. One
/// pretty-printed JSON file per network, keyed by dotted path, keys
/// sorted so diffs are stable. The file, not process memory, is the
/// registry's store of record across script invocations.
pub struct RegistryStore {
    directory: PathBuf,
}

impl RegistryStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn file_for(&self, network: Network) -> PathBuf {
        self.directory.join(format!("{}.json", network))
    }

    /// Rehydrate a world from the network's persisted registry.
    /// A missing file is an empty world, not an error.
    pub fn load(&self, network: Network) -> Result<World, RegistryError> {
        let path = self.file_for(network);
        let world = World::new(network);
        if !path.exists() {
            return Ok(world);
        }

        let entries = read_entries(&path)?;
        debug!("Loaded {} registry entries from {}", entries.len(), path.display());
        Ok(world.with_registry(entries.into_iter().collect()))
    }

    /// Write the world's registry back to durable storage. Entries from
    /// this world overwrite their paths; entries persisted by other runs
    /// and untouched here survive (read-merge-write, so partial updates
    /// never clobber unrelated bindings).
    pub fn persist(&self, world: &World) -> Result<(), RegistryError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.file_for(world.network());

        let mut entries = if path.exists() {
            read_entries(&path)?
        } else {
            BTreeMap::new()
        };
        for (contract_path, metadata) in world.registry() {
            entries.insert(contract_path.clone(), metadata.clone());
        }

        // Write to a temp file first so a crash never truncates the registry
        let tmp_path = path.with_extension("json.tmp");
        let tmp = File::create(&tmp_path)?;
        serde_json::to_writer_pretty(&tmp, &entries)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &path)?;
        debug!("Persisted {} registry entries to {}", entries.len(), path.display());
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<ContractPath, ContractMetadata>, RegistryError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Address;
    use crate::world::Registration;

    fn temp_store(tag: &str) -> RegistryStore {
        let directory = std::env::temp_dir().join(format!(
            "scenario-registry-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&directory);
        RegistryStore::new(directory)
    }

    fn registration(path: &str, name: &str, low: u64) -> Registration {
        Registration {
            path: path.parse().unwrap(),
            metadata: ContractMetadata {
                name: name.to_owned(),
                address: Address::from_low_u64_be(low),
                abi: name.to_owned(),
            },
        }
    }

    #[test]
    fn test_load_missing_file_is_empty_world() {
        let store = temp_store("missing");
        let world = store.load(Network::Devnet).unwrap();
        assert!(world.registry().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let store = temp_store("roundtrip");
        let world = World::new(Network::Devnet).register(vec![
            registration("BRNVault.MyVaultImpl", "BRNVault", 0xaa),
            registration("MyVaultImpl", "BRNVault", 0xaa),
        ]);
        store.persist(&world).unwrap();

        let loaded = store.load(Network::Devnet).unwrap();
        assert_eq!(loaded.registry().len(), 2);
        assert_eq!(
            loaded
                .lookup(&"BRNVault.MyVaultImpl".parse().unwrap())
                .unwrap(),
            world
                .lookup(&"BRNVault.MyVaultImpl".parse().unwrap())
                .unwrap()
        );
    }

    #[test]
    fn test_persist_merges_unrelated_entries() {
        let store = temp_store("merge");

        let first = World::new(Network::Devnet)
            .register(vec![registration("A", "First", 0x1)]);
        store.persist(&first).unwrap();

        // A separate run that never saw "A" must not clobber it
        let second = World::new(Network::Devnet)
            .register(vec![registration("B", "Second", 0x2)]);
        store.persist(&second).unwrap();

        let loaded = store.load(Network::Devnet).unwrap();
        assert_eq!(loaded.registry().len(), 2);
        assert!(loaded.lookup(&"A".parse().unwrap()).is_ok());
        assert!(loaded.lookup(&"B".parse().unwrap()).is_ok());
    }

    #[test]
    fn test_networks_are_isolated() {
        let store = temp_store("isolated");

        let devnet = World::new(Network::Devnet)
            .register(vec![registration("X", "Dev", 0xd)]);
        let testnet = World::new(Network::Testnet)
            .register(vec![registration("X", "Test", 0x7)]);
        store.persist(&devnet).unwrap();
        store.persist(&testnet).unwrap();

        let dev_loaded = store.load(Network::Devnet).unwrap();
        let test_loaded = store.load(Network::Testnet).unwrap();
        assert_eq!(
            dev_loaded.lookup(&"X".parse().unwrap()).unwrap().address,
            Address::from_low_u64_be(0xd)
        );
        assert_eq!(
            test_loaded.lookup(&"X".parse().unwrap()).unwrap().address,
            Address::from_low_u64_be(0x7)
        );
    }

    #[test]
    fn test_persisted_file_is_deterministic() {
        let store_a = temp_store("det-a");
        let store_b = temp_store("det-b");

        // Same bindings registered in different orders
        let world_a = World::new(Network::Devnet).register(vec![
            registration("A", "One", 1),
            registration("B", "Two", 2),
        ]);
        let world_b = World::new(Network::Devnet).register(vec![
            registration("B", "Two", 2),
            registration("A", "One", 1),
        ]);
        store_a.persist(&world_a).unwrap();
        store_b.persist(&world_b).unwrap();

        let bytes_a = fs::read(store_a.file_for(Network::Devnet)).unwrap();
        let bytes_b = fs::read(store_b.file_for(Network::Devnet)).unwrap();
        assert_eq!(bytes_a, bytes_b);
    }
}
