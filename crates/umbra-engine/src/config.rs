//! Engine configuration
//!
//! Everything here has a working default; a TOML file only needs the keys it
//! wants to change.
//!
//! ```toml
//! seed_phrase = "release-7"
//! companion_package = "com/example/generated"
//! workers = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Phrase the name generators are seeded from
    pub seed_phrase: String,
    /// Random characters appended to each name prefix
    pub name_length: usize,
    /// Draws per name before giving up
    pub max_name_attempts: u32,
    /// Internal-name package for companion types, without trailing slash
    pub companion_package: String,
    /// Class-file version stamped on companion types
    pub class_version: u16,
    /// Implement the capability interface directly on each owner
    ///
    /// When off, rewritten code calls `$Synthetic` methods on owner
    /// instances that do not implement that interface. The host must then
    /// attach the emitted `$Companion` to each owner before the image runs;
    /// the rewritten image is not runnable on its own.
    pub retrofit_capability: bool,
    /// Fail the rewrite pass on references to affected members of an owner
    /// that was never injected, instead of keeping them and warning
    pub deny_unresolved_owners: bool,
    /// Worker threads for the rewrite pass; `None` uses every core
    pub workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed_phrase: "umbra".to_string(),
            name_length: 6,
            max_name_attempts: 4096,
            companion_package: "umbra/generated".to_string(),
            class_version: umbra_bytecode::V1_8,
            retrofit_capability: false,
            deny_unresolved_owners: false,
            workers: None,
        }
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name_length == 0 {
            return Err(ConfigError::Invalid("name_length must be at least 1".into()));
        }
        if self.max_name_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_name_attempts must be at least 1".into(),
            ));
        }
        if self.companion_package.is_empty()
            || self.companion_package.starts_with('/')
            || self.companion_package.ends_with('/')
        {
            return Err(ConfigError::Invalid(format!(
                "companion_package {:?} must be a non-empty internal name without leading or trailing '/'",
                self.companion_package
            )));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Name generator seed for one owner
    ///
    /// Each owner gets its own stream so names do not depend on the order
    /// owners are visited in.
    pub fn seed_for(&self, owner: &str) -> u64 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.seed_phrase.as_bytes());
        let phrase = hasher.clone().finalize();
        hasher.update(&[0]);
        hasher.update(owner.as_bytes());
        (u64::from(phrase) << 32) | u64::from(hasher.finalize())
    }

    /// Threads to use for parallel passes
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}
