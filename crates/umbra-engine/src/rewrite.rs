//! Pass two: reference rewriting
//!
//! Every class in the image is visited, whether or not it has a definition,
//! because references to affected members can live anywhere. Each field and
//! method instruction is run through two rules in a fixed order:
//!
//! 1. the access rule, for publicized members and writes to mutable fields
//! 2. the synthetic rule, for synthetic fields and methods, ending with the
//!    getter/setter shape inference
//!
//! Rewrites replace one instruction with one call that consumes and
//! produces the same stack words, so method maxima stay valid.

use crate::definition::{MemberKey, TypeDefinition};
use crate::names::{NameTables, Pool};
use crate::registry::Registry;
use crate::resolve::OwnerResolver;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::ops::AddAssign;
use thiserror::Error;
use umbra_bytecode::{
    ClassNode, DescriptorError, FieldInsn, Insn, MethodDescriptor, MethodInsn, Opcode, Type, CLINIT,
    INIT,
};

/// Rewrite errors
#[derive(Debug, Error)]
pub enum RewriteError {
    /// A call instruction carries a descriptor that does not parse
    #[error("Bad call descriptor in {class}.{method}: {source}")]
    Descriptor {
        /// Class being rewritten
        class: String,
        /// Method containing the call
        method: String,
        /// Parse error
        #[source]
        source: DescriptorError,
    },

    /// An affected member belongs to an owner that was never injected
    #[error("{class}.{method} references {owner}.{member}, but {owner} was not injected")]
    UnresolvedOwner {
        /// Class being rewritten
        class: String,
        /// Method containing the reference
        method: String,
        /// Declaring type of the member
        owner: String,
        /// Referenced member
        member: String,
    },
}

/// Counts of rewritten instructions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteStats {
    /// Classes visited
    pub classes: usize,
    /// Classes with at least one rewrite
    pub changed_classes: usize,
    /// Publicized field accesses sent to the accessor surface
    pub publicized_fields: usize,
    /// Mutable field writes sent to the mutable setter
    pub mutable_writes: usize,
    /// Synthetic field accesses sent to the holder or capability interface
    pub synthetic_fields: usize,
    /// Publicized method calls sent to the accessor surface
    pub publicized_methods: usize,
    /// Synthetic method calls replaced by their redirect target
    pub redirected_methods: usize,
    /// Calls matched to a synthetic accessor by name and shape
    pub inferred_accessors: usize,
    /// References kept because their owner was never injected
    pub unresolved: usize,
}

impl RewriteStats {
    /// Total instructions rewritten
    pub fn rewritten(&self) -> usize {
        self.publicized_fields
            + self.mutable_writes
            + self.synthetic_fields
            + self.publicized_methods
            + self.redirected_methods
            + self.inferred_accessors
    }
}

impl AddAssign for RewriteStats {
    fn add_assign(&mut self, other: Self) {
        self.classes += other.classes;
        self.changed_classes += other.changed_classes;
        self.publicized_fields += other.publicized_fields;
        self.mutable_writes += other.mutable_writes;
        self.synthetic_fields += other.synthetic_fields;
        self.publicized_methods += other.publicized_methods;
        self.redirected_methods += other.redirected_methods;
        self.inferred_accessors += other.inferred_accessors;
        self.unresolved += other.unresolved;
    }
}

/// Where an instruction sits
struct Site<'s> {
    class: &'s str,
    method: &'s str,
    in_initializer: bool,
}

/// Call that replaces an instruction
struct Replacement {
    opcode: Opcode,
    owner: String,
    name: String,
    descriptor: String,
    interface: bool,
}

impl From<Replacement> for Insn {
    fn from(r: Replacement) -> Insn {
        MethodInsn::new(r.opcode, r.owner, r.name, r.descriptor, r.interface).into()
    }
}

/// Rewrites references to affected members
pub struct Rewriter<'a> {
    registry: &'a Registry,
    names: &'a NameTables,
    resolver: &'a dyn OwnerResolver,
}

impl<'a> Rewriter<'a> {
    /// Create a rewriter
    ///
    /// Names are only read here; every name must have been reserved by the
    /// injection pass.
    pub fn new(
        registry: &'a Registry,
        names: &'a NameTables,
        resolver: &'a dyn OwnerResolver,
    ) -> Self {
        Self {
            registry,
            names,
            resolver,
        }
    }

    /// Rewrite every method body of `class` in place
    #[tracing::instrument(level = "debug", skip_all, fields(class = %class.name))]
    pub fn rewrite_class(&self, class: &mut ClassNode) -> Result<RewriteStats, RewriteError> {
        let mut stats = RewriteStats {
            classes: 1,
            ..RewriteStats::default()
        };

        // Capability bridges on the owner read the real fields and must stay as they are.
        let mut bridges = FxHashSet::default();
        if let Some(table) = self.names.get(&class.name) {
            let table = table.lock();
            for method in &class.methods {
                if table.contains_name(&method.name) {
                    bridges.insert(method.name.clone());
                }
            }
        }

        for method in &mut class.methods {
            if bridges.contains(&method.name) {
                continue;
            }
            let Some(code) = method.code.as_mut() else {
                continue;
            };
            let site = Site {
                class: &class.name,
                method: &method.name,
                in_initializer: method.name == INIT || method.name == CLINIT,
            };

            for insn in &mut code.instructions {
                let replacement = match insn {
                    Insn::Field(field) => self.rewrite_field(&site, field, &mut stats)?,
                    Insn::Method(call) => self.rewrite_call(&site, call, &mut stats)?,
                    _ => None,
                };
                if let Some(replacement) = replacement {
                    tracing::trace!(method = %site.method, from = ?insn, to = %replacement.name, "rewrote");
                    *insn = replacement.into();
                }
            }
        }

        if stats.rewritten() > 0 {
            stats.changed_classes = 1;
            tracing::debug!(rewritten = stats.rewritten(), "rewrote references");
        }
        Ok(stats)
    }

    fn rewrite_field(
        &self,
        site: &Site<'_>,
        insn: &FieldInsn,
        stats: &mut RewriteStats,
    ) -> Result<Option<Replacement>, RewriteError> {
        let owner = self
            .resolver
            .resolve_field_owner(&insn.owner, &insn.name, &insn.descriptor);
        let Some(definition) = self.registry.get(&owner) else {
            return Ok(None);
        };
        let key = MemberKey::new(insn.name.clone(), insn.descriptor.clone());

        if let Some(replacement) = self.field_access_rule(site, &owner, definition, insn, &key, stats)? {
            return Ok(Some(replacement));
        }
        self.synthetic_field_rule(site, &owner, definition, insn, stats)
    }

    fn field_access_rule(
        &self,
        site: &Site<'_>,
        owner: &str,
        definition: &TypeDefinition,
        insn: &FieldInsn,
        key: &MemberKey,
        stats: &mut RewriteStats,
    ) -> Result<Option<Replacement>, RewriteError> {
        let mutable_write =
            insn.opcode == Opcode::Putfield && definition.mutable_fields().contains(key);
        if !mutable_write && !definition.publicized_fields().contains(key) {
            return Ok(None);
        }
        // Initializers assign fields of their own receiver, inherited ones
        // included, before that receiver is usable.
        let own_receiver = site.class == owner || site.class == insn.owner;
        if insn.is_put() && site.in_initializer && own_receiver {
            return Ok(None);
        }

        let companions = self.names.companion_names(owner);
        let (pool, target, opcode) = if mutable_write {
            (Pool::MutableSet, companions.interface, Opcode::Invokeinterface)
        } else {
            match insn.opcode {
                Opcode::Getstatic => (Pool::StaticGet, companions.accessor, Opcode::Invokestatic),
                Opcode::Putstatic => (Pool::StaticSet, companions.accessor, Opcode::Invokestatic),
                Opcode::Getfield => (Pool::InstanceGet, companions.accessor, Opcode::Invokeinterface),
                _ => (Pool::InstanceSet, companions.accessor, Opcode::Invokeinterface),
            }
        };
        let Some(name) = self.lookup(site, owner, pool, key, stats)? else {
            return Ok(None);
        };

        if mutable_write {
            stats.mutable_writes += 1;
        } else {
            stats.publicized_fields += 1;
        }
        Ok(Some(Replacement {
            opcode,
            owner: target,
            name,
            descriptor: accessor_descriptor(insn),
            interface: true,
        }))
    }

    fn synthetic_field_rule(
        &self,
        site: &Site<'_>,
        owner: &str,
        definition: &TypeDefinition,
        insn: &FieldInsn,
        stats: &mut RewriteStats,
    ) -> Result<Option<Replacement>, RewriteError> {
        let Some(field) = definition.synthetic_field(&insn.name, &insn.descriptor) else {
            return Ok(None);
        };
        let companions = self.names.companion_names(owner);
        let (pool, target, opcode, interface) = match insn.opcode {
            Opcode::Getstatic => (Pool::HolderGet, companions.holder, Opcode::Invokestatic, false),
            Opcode::Putstatic => (Pool::HolderSet, companions.holder, Opcode::Invokestatic, false),
            Opcode::Getfield => (
                Pool::InterfaceGet,
                companions.interface,
                Opcode::Invokeinterface,
                true,
            ),
            _ => (
                Pool::InterfaceSet,
                companions.interface,
                Opcode::Invokeinterface,
                true,
            ),
        };
        // A final instance field has no setter; its initializer write stays.
        let Some(name) = self.lookup(site, owner, pool, &field.key(), stats)? else {
            return Ok(None);
        };

        stats.synthetic_fields += 1;
        Ok(Some(Replacement {
            opcode,
            owner: target,
            name,
            descriptor: accessor_descriptor(insn),
            interface,
        }))
    }

    fn rewrite_call(
        &self,
        site: &Site<'_>,
        call: &MethodInsn,
        stats: &mut RewriteStats,
    ) -> Result<Option<Replacement>, RewriteError> {
        if call.opcode == Opcode::Invokespecial || call.name == INIT || call.name == CLINIT {
            return Ok(None);
        }
        let owner = self
            .resolver
            .resolve_method_owner(&call.owner, &call.name, &call.descriptor);
        let Some(definition) = self.registry.get(&owner) else {
            return Ok(None);
        };

        if let Some(replacement) = self.method_access_rule(site, &owner, definition, call, stats)? {
            return Ok(Some(replacement));
        }
        self.synthetic_method_rule(site, &owner, definition, call, stats)
    }

    fn method_access_rule(
        &self,
        site: &Site<'_>,
        owner: &str,
        definition: &TypeDefinition,
        call: &MethodInsn,
        stats: &mut RewriteStats,
    ) -> Result<Option<Replacement>, RewriteError> {
        let key = MemberKey::new(call.name.clone(), call.descriptor.clone());
        if !definition.publicized_methods().contains(&key) {
            return Ok(None);
        }
        let (pool, opcode) = if call.is_static() {
            (Pool::StaticInvoke, Opcode::Invokestatic)
        } else {
            (Pool::InstanceInvoke, Opcode::Invokeinterface)
        };
        let Some(name) = self.lookup(site, owner, pool, &key, stats)? else {
            return Ok(None);
        };

        stats.publicized_methods += 1;
        Ok(Some(Replacement {
            opcode,
            owner: self.names.companion_names(owner).accessor,
            name,
            descriptor: call.descriptor.clone(),
            interface: true,
        }))
    }

    fn synthetic_method_rule(
        &self,
        site: &Site<'_>,
        owner: &str,
        definition: &TypeDefinition,
        call: &MethodInsn,
        stats: &mut RewriteStats,
    ) -> Result<Option<Replacement>, RewriteError> {
        if let Some(method) = definition.synthetic_method(&call.name, &call.descriptor) {
            if method.is_static() == call.is_static() {
                let target = method.redirect();
                stats.redirected_methods += 1;
                return Ok(Some(Replacement {
                    opcode: method.dispatch().opcode(),
                    owner: target.owner.clone(),
                    name: target.name.clone(),
                    descriptor: target.descriptor.descriptor(),
                    interface: target.interface,
                }));
            }
        }

        // Shape inference: permissive, any matching name and shape is taken
        // to be the declared accessor.
        let descriptor =
            MethodDescriptor::parse(&call.descriptor).map_err(|source| RewriteError::Descriptor {
                class: site.class.to_string(),
                method: site.method.to_string(),
                source,
            })?;
        let setter = descriptor.params.len() == 1 && descriptor.ret == Type::Void;
        let getter = descriptor.params.is_empty() && descriptor.ret != Type::Void;
        let field = if setter {
            definition.synthetic_setter(&call.name, &call.descriptor)
        } else if getter {
            definition.synthetic_getter(&call.name, &call.descriptor)
        } else {
            None
        };
        let Some(field) = field else {
            return Ok(None);
        };

        let companions = self.names.companion_names(owner);
        let (pool, target, opcode, interface) = match (call.is_static(), setter) {
            (true, false) => (Pool::HolderGet, companions.holder, Opcode::Invokestatic, false),
            (true, true) => (Pool::HolderSet, companions.holder, Opcode::Invokestatic, false),
            (false, false) => (
                Pool::InterfaceGet,
                companions.interface,
                Opcode::Invokeinterface,
                true,
            ),
            (false, true) => (
                Pool::InterfaceSet,
                companions.interface,
                Opcode::Invokeinterface,
                true,
            ),
        };
        let Some(name) = self.lookup(site, owner, pool, &field.key(), stats)? else {
            return Ok(None);
        };

        stats.inferred_accessors += 1;
        Ok(Some(Replacement {
            opcode,
            owner: target,
            name,
            descriptor: call.descriptor.clone(),
            interface,
        }))
    }

    /// Generated name for `key`
    ///
    /// `None` with a table present means the owner has no such entry, e.g. a
    /// final field without a setter. Without a table the owner was never
    /// injected; the reference is counted and kept, or rejected when the
    /// config denies unresolved owners.
    fn lookup(
        &self,
        site: &Site<'_>,
        owner: &str,
        pool: Pool,
        key: &MemberKey,
        stats: &mut RewriteStats,
    ) -> Result<Option<String>, RewriteError> {
        let Some(table) = self.names.get(owner) else {
            if self.names.config().deny_unresolved_owners {
                return Err(RewriteError::UnresolvedOwner {
                    class: site.class.to_string(),
                    method: site.method.to_string(),
                    owner: owner.to_string(),
                    member: key.to_string(),
                });
            }
            tracing::warn!(
                class = %site.class,
                method = %site.method,
                owner,
                member = %key,
                "owner was not injected, keeping reference"
            );
            stats.unresolved += 1;
            return Ok(None);
        };
        let table = table.lock();
        Ok(table.get(pool, key).map(str::to_string))
    }
}

/// `()T` for reads, `(T)V` for writes
fn accessor_descriptor(insn: &FieldInsn) -> String {
    if insn.is_put() {
        format!("({})V", insn.descriptor)
    } else {
        format!("(){}", insn.descriptor)
    }
}
