//! Whole-image pipeline
//!
//! [`Engine`] runs the passes in the only order that works: injection
//! reserves every generated name, rewriting reads them, and companion
//! emission declares them.

use crate::companion::CompanionEmitter;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::inject::Injector;
use crate::interchange;
use crate::names::NameTables;
use crate::registry::Registry;
use crate::resolve::{IdentityResolver, OwnerResolver};
use crate::rewrite::{RewriteStats, Rewriter};
use umbra_bytecode::ClassNode;

/// Output of [`Engine::process`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    /// Input classes after both passes, in input order
    pub classes: Vec<ClassNode>,
    /// Generated companion types, grouped by owner in name order
    pub companions: Vec<ClassNode>,
    /// Rewrite counts over the whole image
    pub stats: RewriteStats,
}

/// Transformation engine for one program image
pub struct Engine {
    config: Config,
    registry: Registry,
    names: NameTables,
    resolver: Box<dyn OwnerResolver>,
}

impl Engine {
    /// Create an engine with a validated config
    pub fn new(config: Config, registry: Registry) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            names: NameTables::new(config.clone()),
            config,
            registry,
            resolver: Box::new(IdentityResolver),
        })
    }

    /// Create an engine from JSON definitions
    pub fn from_json(config: Config, definitions: &str) -> EngineResult<Self> {
        let registry = interchange::from_json(definitions)?;
        Self::new(config, registry)
    }

    /// Use `resolver` to find declaring types during rewriting
    pub fn with_resolver(mut self, resolver: impl OwnerResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Engine settings
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Definitions being applied
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Generated names so far
    pub fn names(&self) -> &NameTables {
        &self.names
    }

    /// Pass one over every class
    #[tracing::instrument(level = "debug", skip_all, fields(count = classes.len()))]
    pub fn inject_all(&self, classes: Vec<ClassNode>) -> EngineResult<Vec<ClassNode>> {
        let injector = Injector::new(&self.registry, &self.names);
        parallel_map(classes, self.config.worker_count(), |class| {
            let name = class.name.clone();
            injector
                .inject(class)
                .map_err(|source| EngineError::Inject { class: name, source })
        })
    }

    /// Pass two over every class
    ///
    /// Must run after [`Engine::inject_all`] over the same image.
    #[tracing::instrument(level = "debug", skip_all, fields(count = classes.len()))]
    pub fn rewrite_all(
        &self,
        classes: Vec<ClassNode>,
    ) -> EngineResult<(Vec<ClassNode>, RewriteStats)> {
        let rewriter = Rewriter::new(&self.registry, &self.names, self.resolver.as_ref());
        let rewritten = parallel_map(classes, self.config.worker_count(), |mut class| {
            match rewriter.rewrite_class(&mut class) {
                Ok(stats) => Ok((class, stats)),
                Err(source) => Err(EngineError::Rewrite {
                    class: class.name,
                    source,
                }),
            }
        })?;

        let mut total = RewriteStats::default();
        let mut classes = Vec::with_capacity(rewritten.len());
        for (class, stats) in rewritten {
            total += stats;
            classes.push(class);
        }
        tracing::debug!(
            changed = total.changed_classes,
            rewritten = total.rewritten(),
            unresolved = total.unresolved,
            "rewrite finished"
        );
        Ok((classes, total))
    }

    /// Companion types for every owner with generated names
    pub fn companions(&self) -> EngineResult<Vec<ClassNode>> {
        let mut companions = Vec::new();
        for owner in self.names.owners() {
            let Some(table) = self.names.get(&owner) else {
                continue;
            };
            let table = table.lock();
            let emitter = CompanionEmitter::new(
                &table,
                self.names.companion_names(&owner),
                self.config.class_version,
            );
            let emitted = emitter
                .emit_all()
                .map_err(|source| EngineError::Emit { owner, source })?;
            companions.extend(emitted);
        }
        Ok(companions)
    }

    /// Inject, rewrite and emit companions
    pub fn process(&self, classes: Vec<ClassNode>) -> EngineResult<ProcessedImage> {
        let injected = self.inject_all(classes)?;
        let (classes, stats) = self.rewrite_all(injected)?;
        let companions = self.companions()?;
        tracing::info!(
            classes = classes.len(),
            companions = companions.len(),
            rewritten = stats.rewritten(),
            "processed image"
        );
        Ok(ProcessedImage {
            classes,
            companions,
            stats,
        })
    }
}

/// Map `f` over `items` on up to `workers` scoped threads, keeping order
///
/// The first error in input order wins.
fn parallel_map<T, R, F>(items: Vec<T>, workers: usize, f: F) -> EngineResult<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> EngineResult<R> + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.into_iter().map(f).collect();
    }

    let chunk_size = (items.len() + workers - 1) / workers;
    let mut chunks = Vec::with_capacity(workers);
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(chunk_size).collect::<Vec<T>>());
    }

    let f = &f;
    let results = crossbeam::scope(|scope| {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                scope.spawn(move |_| chunk.into_iter().map(f).collect::<EngineResult<Vec<R>>>())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().map_err(|_| EngineError::WorkerPanicked))
            .collect::<Vec<_>>()
    })
    .map_err(|_| EngineError::WorkerPanicked)?;

    let mut output = Vec::new();
    for result in results {
        output.extend(result??);
    }
    Ok(output)
}
