//! Umbra Engine - Member Injection and Reference Rewriting
//!
//! Applies declarative [`TypeDefinition`]s to a program image in two passes.
//! Injection widens access and adds synthetic members to the types the
//! definitions name; rewriting then retargets every instruction in the image
//! that references an affected member. Companion types declare the
//! generated accessors both passes agree on.
//!
//! ```no_run
//! use umbra_engine::{Config, Engine};
//!
//! # fn run(image: Vec<umbra_bytecode::ClassNode>, json: &str) -> umbra_engine::EngineResult<()> {
//! let engine = Engine::from_json(Config::default(), json)?;
//! let output = engine.process(image)?;
//! println!("{} references rewritten", output.stats.rewritten());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod companion;
pub mod config;
pub mod definition;
pub mod error;
pub mod inject;
pub mod interchange;
pub mod names;
pub mod pipeline;
pub mod registry;
pub mod resolve;
pub mod rewrite;

pub use companion::{CompanionEmitter, EmitError};
pub use config::{Config, ConfigError};
pub use definition::{
    Accessor, DefinitionError, Dispatch, MemberKey, RedirectTarget, SyntheticField,
    SyntheticMethod, TypeDefinition, TypeDefinitionBuilder,
};
pub use error::{EngineError, EngineResult};
pub use inject::{inject, InjectError, Injector};
pub use interchange::InterchangeError;
pub use names::{CompanionNames, NameError, NameTable, NameTables, Pool};
pub use pipeline::{Engine, ProcessedImage};
pub use registry::{Registry, RegistryError};
pub use resolve::{IdentityResolver, OwnerResolver};
pub use rewrite::{RewriteError, RewriteStats, Rewriter};
