//! Definition registry
//!
//! Maps an owner's internal name to its [`TypeDefinition`]. The registry is
//! assembled before either pass runs and is only read afterwards.

use crate::definition::{DefinitionError, TypeDefinition};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A definition is invalid, or conflicts with the stored one
    #[error("Definition for {owner} rejected: {source}")]
    Definition {
        /// Owner of the rejected definition
        owner: String,
        /// Cause
        #[source]
        source: DefinitionError,
    },
}

/// Owner name to definition map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    definitions: FxHashMap<String, TypeDefinition>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, merging definitions that share an owner
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = TypeDefinition>,
    ) -> Result<Self, RegistryError> {
        definitions
            .into_iter()
            .try_fold(Self::new(), |registry, definition| registry.merge(definition))
    }

    /// Definition for `owner`, if any
    pub fn get(&self, owner: &str) -> Option<&TypeDefinition> {
        self.definitions.get(owner)
    }

    /// Check whether `owner` has a definition
    pub fn contains(&self, owner: &str) -> bool {
        self.definitions.contains_key(owner)
    }

    /// Iterate over all definitions, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.definitions.values()
    }

    /// Definitions sorted by owner name
    pub fn sorted(&self) -> Vec<&TypeDefinition> {
        let mut definitions: Vec<_> = self.definitions.values().collect();
        definitions.sort_by(|a, b| a.name().cmp(b.name()));
        definitions
    }

    /// Number of owners
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if there are no definitions
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Add a definition, unioning it into any existing entry for its owner
    pub fn merge(mut self, definition: TypeDefinition) -> Result<Self, RegistryError> {
        let owner = definition.name().to_string();
        let reject = |source| RegistryError::Definition {
            owner: owner.clone(),
            source,
        };

        let merged = match self.definitions.get(&owner) {
            Some(existing) => existing.union(&definition).map_err(reject)?,
            None => {
                definition.validate().map_err(reject)?;
                definition
            }
        };

        tracing::trace!(owner = %owner, "merged definition");
        self.definitions.insert(owner, merged);
        Ok(self)
    }

    /// Merge every definition of `other` into this registry
    pub fn merge_all(self, other: Registry) -> Result<Self, RegistryError> {
        other
            .definitions
            .into_values()
            .try_fold(self, |registry, definition| registry.merge(definition))
    }
}

// The interchange form is a plain array of definitions, sorted by owner.

impl Serialize for Registry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.sorted())
    }
}

impl<'de> Deserialize<'de> for Registry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let definitions = Vec::<TypeDefinition>::deserialize(deserializer)?;
        Registry::from_definitions(definitions).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::SyntheticField;
    use umbra_bytecode::access::*;
    use umbra_bytecode::Type;

    fn field(access: u16, name: &str) -> SyntheticField {
        SyntheticField::new(access, name, Type::Int, None, None, None).unwrap()
    }

    #[test]
    fn test_merge_inserts_and_unions() {
        let first = TypeDefinition::builder("a/A")
            .synthetic_field(field(ACC_PRIVATE, "one"))
            .build()
            .unwrap();
        let second = TypeDefinition::builder("a/A")
            .synthetic_field(field(ACC_PRIVATE, "two"))
            .publicize_field("x", "I")
            .build()
            .unwrap();

        let registry = Registry::new().merge(first).unwrap().merge(second).unwrap();
        assert_eq!(registry.len(), 1);

        let def = registry.get("a/A").unwrap();
        assert_eq!(def.synthetic_fields().len(), 2);
        assert_eq!(def.publicized_fields().len(), 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let def = TypeDefinition::builder("a/A")
            .synthetic_field(field(ACC_PRIVATE, "one"))
            .build()
            .unwrap();
        let once = Registry::new().merge(def.clone()).unwrap();
        let twice = once.clone().merge(def).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_rejects_conflicting_synthetic_field() {
        let first = TypeDefinition::builder("a/A")
            .synthetic_field(field(ACC_PRIVATE, "one"))
            .build()
            .unwrap();
        let second = TypeDefinition::builder("a/A")
            .synthetic_field(field(ACC_PUBLIC, "one"))
            .build()
            .unwrap();

        let err = Registry::new()
            .merge(first)
            .unwrap()
            .merge(second)
            .unwrap_err();
        let RegistryError::Definition { owner, source } = err;
        assert_eq!(owner, "a/A");
        assert!(matches!(source, DefinitionError::DuplicateSyntheticField { .. }));
    }

    #[test]
    fn test_merge_all_and_lookup() {
        let left = Registry::from_definitions([
            TypeDefinition::builder("a/A").interface("x/I").build().unwrap(),
            TypeDefinition::builder("a/B").build().unwrap(),
        ])
        .unwrap();
        let right = Registry::from_definitions([TypeDefinition::builder("a/A")
            .interface("x/J")
            .build()
            .unwrap()])
        .unwrap();

        let merged = left.merge_all(right).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(merged.contains("a/B"));
        assert!(!merged.contains("a/C"));
        assert_eq!(merged.get("a/A").unwrap().interfaces().len(), 2);
        assert!(merged.get("a/C").is_none());

        let names: Vec<_> = merged.sorted().iter().map(|d| d.name()).collect();
        assert_eq!(names, ["a/A", "a/B"]);
    }
}
