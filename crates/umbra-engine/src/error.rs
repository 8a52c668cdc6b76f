//! Engine errors

use crate::companion::EmitError;
use crate::config::ConfigError;
use crate::inject::InjectError;
use crate::interchange::InterchangeError;
use crate::registry::RegistryError;
use crate::rewrite::RewriteError;
use thiserror::Error;

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Any failure of a pipeline run
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Definitions could not be merged
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Definitions could not be read
    #[error(transparent)]
    Interchange(#[from] InterchangeError),

    /// Pass one failed on a class
    #[error("Injection failed for {class}: {source}")]
    Inject {
        /// Class being processed
        class: String,
        /// Cause
        #[source]
        source: InjectError,
    },

    /// Pass two failed on a class
    #[error("Rewrite failed for {class}: {source}")]
    Rewrite {
        /// Class being processed
        class: String,
        /// Cause
        #[source]
        source: RewriteError,
    },

    /// A companion type could not be built
    #[error("Companion emission failed for {owner}: {source}")]
    Emit {
        /// Owner of the companions
        owner: String,
        /// Cause
        #[source]
        source: EmitError,
    },

    /// A worker thread died
    #[error("Worker thread panicked")]
    WorkerPanicked,
}
