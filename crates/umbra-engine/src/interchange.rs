//! JSON interchange for registries
//!
//! A registry is written as an array of definition records sorted by owner.
//! Descriptors are written in their symbolic form, dispatch as the invoke
//! opcode byte, and empty sets are omitted.

use crate::definition::{DefinitionError, TypeDefinition};
use crate::registry::{Registry, RegistryError};
use thiserror::Error;

/// Interchange errors
#[derive(Debug, Error)]
pub enum InterchangeError {
    /// Malformed JSON or a record that does not match the schema
    #[error("Failed to parse definitions: {0}")]
    Json(#[from] serde_json::Error),

    /// A record parsed but is not a valid definition
    #[error("Invalid definition for {owner}: {source}")]
    Invalid {
        /// Owner of the record
        owner: String,
        /// Cause
        #[source]
        source: DefinitionError,
    },

    /// Two records for one owner could not be merged
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Serialize a registry as compact JSON
pub fn to_json(registry: &Registry) -> Result<String, InterchangeError> {
    Ok(serde_json::to_string(registry)?)
}

/// Serialize a registry as indented JSON
pub fn to_json_pretty(registry: &Registry) -> Result<String, InterchangeError> {
    Ok(serde_json::to_string_pretty(registry)?)
}

/// Parse and validate a registry
pub fn from_json(text: &str) -> Result<Registry, InterchangeError> {
    let definitions: Vec<TypeDefinition> = serde_json::from_str(text)?;

    for definition in &definitions {
        definition
            .validate()
            .map_err(|source| InterchangeError::Invalid {
                owner: definition.name().to_string(),
                source,
            })?;
    }

    tracing::debug!(records = definitions.len(), "parsed definitions");
    Ok(Registry::from_definitions(definitions)?)
}
