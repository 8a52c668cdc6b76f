//! Generated member names
//!
//! Every owner with affected members gets a [`NameTable`]: eleven pools of
//! generated names, each keyed by the member the name stands in for. A name
//! is computed once and then returned unchanged for the rest of the run,
//! which is what lets the injection and rewrite passes agree on it.
//!
//! Names are a pool prefix followed by random alphanumerics drawn from a
//! generator seeded per owner, so a run over the same input produces the
//! same names.

use crate::config::Config;
use crate::definition::MemberKey;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Naming errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// No unused name was found within the attempt bound
    #[error("Name pool {pool} of {owner} exhausted after {attempts} attempts")]
    Exhausted {
        /// Owning type
        owner: String,
        /// Pool that ran out
        pool: Pool,
        /// Draws made
        attempts: u32,
    },
}

/// A pool of generated names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pool {
    /// Accessor surface: read an instance field
    InstanceGet,
    /// Accessor surface: write an instance field
    InstanceSet,
    /// Accessor surface: call an instance method
    InstanceInvoke,
    /// Accessor surface: read a static field
    StaticGet,
    /// Accessor surface: write a static field
    StaticSet,
    /// Accessor surface: call a static method
    StaticInvoke,
    /// Holder: read a static synthetic field
    HolderGet,
    /// Holder: write a static synthetic field
    HolderSet,
    /// Capability interface: read an instance synthetic field
    InterfaceGet,
    /// Capability interface: write an instance synthetic field
    InterfaceSet,
    /// Capability interface: write a mutable field
    MutableSet,
}

impl Pool {
    /// Every pool, in table order
    pub const ALL: [Pool; 11] = [
        Pool::InstanceGet,
        Pool::InstanceSet,
        Pool::InstanceInvoke,
        Pool::StaticGet,
        Pool::StaticSet,
        Pool::StaticInvoke,
        Pool::HolderGet,
        Pool::HolderSet,
        Pool::InterfaceGet,
        Pool::InterfaceSet,
        Pool::MutableSet,
    ];

    /// Pools whose entries live on the accessor surface
    pub const ACCESSOR: [Pool; 6] = [
        Pool::InstanceGet,
        Pool::InstanceSet,
        Pool::InstanceInvoke,
        Pool::StaticGet,
        Pool::StaticSet,
        Pool::StaticInvoke,
    ];

    /// Name prefix for this pool
    pub fn prefix(self) -> &'static str {
        match self {
            Pool::InstanceGet => "getInstance",
            Pool::InstanceSet => "setInstance",
            Pool::InstanceInvoke => "invokeInstance",
            Pool::StaticGet => "getStatic",
            Pool::StaticSet => "setStatic",
            Pool::StaticInvoke => "invokeStatic",
            Pool::HolderGet => "getHolder",
            Pool::HolderSet => "setHolder",
            Pool::InterfaceGet => "getSynthetic",
            Pool::InterfaceSet => "setSynthetic",
            Pool::MutableSet => "setMutable",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Default)]
struct PoolNames {
    by_key: BTreeMap<MemberKey, String>,
    taken: FxHashSet<String>,
}

/// Generated names for one owner
#[derive(Debug)]
pub struct NameTable {
    owner: String,
    owner_is_interface: bool,
    pools: [PoolNames; 11],
    rng: StdRng,
    name_length: usize,
    max_attempts: u32,
}

impl NameTable {
    /// Create an empty table for `owner`
    pub fn new(owner: impl Into<String>, config: &Config) -> Self {
        let owner = owner.into();
        Self {
            rng: StdRng::seed_from_u64(config.seed_for(&owner)),
            owner,
            owner_is_interface: false,
            pools: Default::default(),
            name_length: config.name_length,
            max_attempts: config.max_name_attempts,
        }
    }

    /// Internal name of the owner
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether the owner is an interface
    pub fn owner_is_interface(&self) -> bool {
        self.owner_is_interface
    }

    /// Record whether the owner is an interface
    pub fn set_owner_is_interface(&mut self, value: bool) {
        self.owner_is_interface = value;
    }

    /// Name for `key` in `pool`, generating it on first request
    pub fn name(&mut self, pool: Pool, key: &MemberKey) -> Result<String, NameError> {
        if let Some(name) = self.pools[pool.index()].by_key.get(key) {
            return Ok(name.clone());
        }

        for _ in 0..self.max_attempts {
            let candidate = self.draw(pool);
            let names = &mut self.pools[pool.index()];
            if names.taken.insert(candidate.clone()) {
                tracing::trace!(owner = %self.owner, %pool, member = %key, name = %candidate, "generated name");
                names.by_key.insert(key.clone(), candidate.clone());
                return Ok(candidate);
            }
        }

        Err(NameError::Exhausted {
            owner: self.owner.clone(),
            pool,
            attempts: self.max_attempts,
        })
    }

    fn draw(&mut self, pool: Pool) -> String {
        let mut name = String::with_capacity(pool.prefix().len() + self.name_length);
        name.push_str(pool.prefix());
        for _ in 0..self.name_length {
            let index = self.rng.gen_range(0..ALPHABET.len());
            name.push(char::from(ALPHABET[index]));
        }
        name
    }

    /// Previously generated name, without generating
    pub fn get(&self, pool: Pool, key: &MemberKey) -> Option<&str> {
        self.pools[pool.index()].by_key.get(key).map(String::as_str)
    }

    /// Entries of one pool, sorted by member
    pub fn entries(&self, pool: Pool) -> impl Iterator<Item = (&MemberKey, &str)> {
        self.pools[pool.index()]
            .by_key
            .iter()
            .map(|(key, name)| (key, name.as_str()))
    }

    /// Number of entries in one pool
    pub fn pool_len(&self, pool: Pool) -> usize {
        self.pools[pool.index()].by_key.len()
    }

    /// Check whether any of `pools` has entries
    pub fn any(&self, pools: &[Pool]) -> bool {
        pools.iter().any(|pool| self.pool_len(*pool) > 0)
    }

    /// Check whether `name` was generated by any pool
    pub fn contains_name(&self, name: &str) -> bool {
        self.pools.iter().any(|names| names.taken.contains(name))
    }

    /// Check whether nothing has been generated
    pub fn is_empty(&self) -> bool {
        self.pools.iter().all(|names| names.by_key.is_empty())
    }
}

/// Internal names of the companion types for one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionNames {
    /// Hosts static synthetic fields
    pub holder: String,
    /// Exposes instance synthetic fields and mutable setters
    pub interface: String,
    /// Exposes publicized members across module boundaries
    pub accessor: String,
    /// Concrete implementation of `interface`
    pub companion: String,
}

impl CompanionNames {
    /// Derive the names for `owner` under `package`
    pub fn new(package: &str, owner: &str) -> Self {
        let base = format!("{}/{}", package, owner);
        Self {
            holder: format!("{}$Holder", base),
            interface: format!("{}$Synthetic", base),
            accessor: format!("{}$Accessor", base),
            companion: format!("{}$Companion", base),
        }
    }
}

/// Shared owner to [`NameTable`] map
///
/// Each table sits behind its own lock, so two threads asking for names of
/// the same owner are serialized while unrelated owners proceed in parallel.
#[derive(Debug)]
pub struct NameTables {
    config: Config,
    tables: DashMap<String, Arc<Mutex<NameTable>>>,
}

impl NameTables {
    /// Create an empty set of tables
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tables: DashMap::new(),
        }
    }

    /// Table for `owner`, creating it if needed
    pub fn table(&self, owner: &str) -> Arc<Mutex<NameTable>> {
        if let Some(table) = self.tables.get(owner) {
            return Arc::clone(table.value());
        }
        let entry = self
            .tables
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(NameTable::new(owner, &self.config))));
        Arc::clone(entry.value())
    }

    /// Table for `owner`, if one was created
    pub fn get(&self, owner: &str) -> Option<Arc<Mutex<NameTable>>> {
        self.tables.get(owner).map(|table| Arc::clone(table.value()))
    }

    /// Owners with tables, sorted
    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<_> = self.tables.iter().map(|e| e.key().clone()).collect();
        owners.sort();
        owners
    }

    /// Companion type names for `owner`
    pub fn companion_names(&self, owner: &str) -> CompanionNames {
        CompanionNames::new(&self.config.companion_package, owner)
    }

    /// Configuration the tables were created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if no table exists
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
