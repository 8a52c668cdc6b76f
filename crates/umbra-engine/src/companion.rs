//! Companion type emission
//!
//! The generated names of one owner are only useful if something declares
//! them. Up to four types are built from a [`NameTable`]:
//!
//! - the holder, storing static synthetic fields
//! - the capability interface, declaring instance synthetic accessors and
//!   mutable setters
//! - the companion, a concrete implementation of the capability interface
//! - the accessor surface, forwarding to publicized members of the owner
//!
//! Each is emitted only when the table has entries for it.

use crate::definition::MemberKey;
use crate::inject::CAPABILITY;
use crate::names::{CompanionNames, NameTable, Pool};
use std::collections::BTreeSet;
use thiserror::Error;
use umbra_bytecode::access::{
    ACC_ABSTRACT, ACC_FINAL, ACC_INTERFACE, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER,
    ACC_SYNTHETIC,
};
use umbra_bytecode::{
    verify_class, ClassNode, CodeBuilder, DescriptorError, FieldNode, MethodDescriptor, MethodNode,
    Opcode, Type, VerifyError, INIT, OBJECT,
};

/// Emission errors
#[derive(Debug, Error)]
pub enum EmitError {
    /// A table key carries a descriptor that does not parse
    #[error("Bad descriptor for {member} in {class}: {source}")]
    Descriptor {
        /// Type being emitted
        class: String,
        /// Offending member
        member: String,
        /// Parse error
        #[source]
        source: DescriptorError,
    },

    /// An emitted type failed verification
    #[error("Emitted type {class} failed verification: {source}")]
    Verify {
        /// Type being emitted
        class: String,
        /// Cause
        #[source]
        source: VerifyError,
    },
}

/// Builds the companion types of one owner
pub struct CompanionEmitter<'a> {
    table: &'a NameTable,
    names: CompanionNames,
    version: u16,
}

impl<'a> CompanionEmitter<'a> {
    /// Create an emitter stamping `version` on every type
    pub fn new(table: &'a NameTable, names: CompanionNames, version: u16) -> Self {
        Self {
            table,
            names,
            version,
        }
    }

    /// Type names this emitter uses
    pub fn names(&self) -> &CompanionNames {
        &self.names
    }

    /// Whether any static synthetic field exists
    pub fn should_emit_holder(&self) -> bool {
        self.table.any(&[Pool::HolderGet, Pool::HolderSet])
    }

    /// Whether any instance synthetic field or mutable field exists
    pub fn should_emit_interface(&self) -> bool {
        self.table.any(&CAPABILITY)
    }

    /// Whether the capability interface needs an implementation
    pub fn should_emit_companion(&self) -> bool {
        self.should_emit_interface()
    }

    /// Whether any publicized member is exposed
    pub fn should_emit_accessor(&self) -> bool {
        self.table.any(&Pool::ACCESSOR)
    }

    /// Every type with at least one member, holder first
    #[tracing::instrument(level = "debug", skip_all, fields(owner = %self.table.owner()))]
    pub fn emit_all(&self) -> Result<Vec<ClassNode>, EmitError> {
        let mut classes = Vec::new();
        if self.should_emit_holder() {
            classes.push(self.emit_holder()?);
        }
        if self.should_emit_interface() {
            classes.push(self.emit_interface()?);
        }
        if self.should_emit_companion() {
            classes.push(self.emit_companion()?);
        }
        if self.should_emit_accessor() {
            classes.push(self.emit_accessor()?);
        }
        tracing::debug!(count = classes.len(), "emitted companions");
        Ok(classes)
    }

    /// Final class with private static storage and static get/set methods
    pub fn emit_holder(&self) -> Result<ClassNode, EmitError> {
        let holder = &self.names.holder;
        let mut class = ClassNode::new(
            self.version,
            ACC_PUBLIC | ACC_FINAL | ACC_SUPER | ACC_SYNTHETIC,
            holder.as_str(),
        );
        class.methods.push(constructor(ACC_PRIVATE));

        let keys = self.keys(&[Pool::HolderGet, Pool::HolderSet]);
        for key in &keys {
            class
                .fields
                .push(FieldNode::new(ACC_PRIVATE | ACC_STATIC, key.name.as_str(), key.descriptor.as_str()));
        }

        let access = ACC_PUBLIC | ACC_STATIC | ACC_SYNTHETIC;
        for (key, name) in self.table.entries(Pool::HolderGet) {
            let ty = self.field_type(holder, key)?;
            let mut code = CodeBuilder::for_method(access, &MethodDescriptor::getter(ty.clone()));
            code.field(Opcode::Getstatic, holder.as_str(), key.name.as_str(), &ty)
                .ret(&ty);
            class
                .methods
                .push(MethodNode::new(access, name, getter(&ty)).with_code(code.finish()));
        }
        for (key, name) in self.table.entries(Pool::HolderSet) {
            let ty = self.field_type(holder, key)?;
            let mut code = CodeBuilder::for_method(access, &MethodDescriptor::setter(ty.clone()));
            code.load(&ty, 0)
                .field(Opcode::Putstatic, holder.as_str(), key.name.as_str(), &ty)
                .ret(&Type::Void);
            class
                .methods
                .push(MethodNode::new(access, name, setter(&ty)).with_code(code.finish()));
        }

        self.finish(class)
    }

    /// Interface of abstract accessors for instance synthetic fields and
    /// mutable fields
    pub fn emit_interface(&self) -> Result<ClassNode, EmitError> {
        let interface = &self.names.interface;
        let mut class = ClassNode::new(
            self.version,
            ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT | ACC_SYNTHETIC,
            interface.as_str(),
        );

        let access = ACC_PUBLIC | ACC_ABSTRACT;
        for (key, name) in self.table.entries(Pool::InterfaceGet) {
            let ty = self.field_type(interface, key)?;
            class.methods.push(MethodNode::new(access, name, getter(&ty)));
        }
        for pool in [Pool::InterfaceSet, Pool::MutableSet] {
            for (key, name) in self.table.entries(pool) {
                let ty = self.field_type(interface, key)?;
                class.methods.push(MethodNode::new(access, name, setter(&ty)));
            }
        }

        self.finish(class)
    }

    /// Concrete implementation of the capability interface with private
    /// backing fields
    pub fn emit_companion(&self) -> Result<ClassNode, EmitError> {
        let companion = &self.names.companion;
        let mut class = ClassNode::new(
            self.version,
            ACC_PUBLIC | ACC_SUPER | ACC_SYNTHETIC,
            companion.as_str(),
        );
        class.interfaces.push(self.names.interface.clone());
        class.methods.push(constructor(ACC_PUBLIC));

        for key in &self.keys(&CAPABILITY) {
            class
                .fields
                .push(FieldNode::new(ACC_PRIVATE, key.name.as_str(), key.descriptor.as_str()));
        }

        let access = ACC_PUBLIC;
        for (key, name) in self.table.entries(Pool::InterfaceGet) {
            let ty = self.field_type(companion, key)?;
            let mut code = CodeBuilder::for_method(access, &MethodDescriptor::getter(ty.clone()));
            code.load_this()
                .field(Opcode::Getfield, companion.as_str(), key.name.as_str(), &ty)
                .ret(&ty);
            class
                .methods
                .push(MethodNode::new(access, name, getter(&ty)).with_code(code.finish()));
        }
        for pool in [Pool::InterfaceSet, Pool::MutableSet] {
            for (key, name) in self.table.entries(pool) {
                let ty = self.field_type(companion, key)?;
                let mut code =
                    CodeBuilder::for_method(access, &MethodDescriptor::setter(ty.clone()));
                code.load_this()
                    .load(&ty, 1)
                    .field(Opcode::Putfield, companion.as_str(), key.name.as_str(), &ty)
                    .ret(&Type::Void);
                class
                    .methods
                    .push(MethodNode::new(access, name, setter(&ty)).with_code(code.finish()));
            }
        }

        self.finish(class)
    }

    /// Interface forwarding to the owner's publicized members
    ///
    /// Instance entries are default methods that cast the receiver to the
    /// owner; static entries call the owner directly.
    pub fn emit_accessor(&self) -> Result<ClassNode, EmitError> {
        let accessor = &self.names.accessor;
        let owner = self.table.owner();
        let owner_is_interface = self.table.owner_is_interface();
        let mut class = ClassNode::new(
            self.version,
            ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT | ACC_SYNTHETIC,
            accessor.as_str(),
        );

        let instance = ACC_PUBLIC;
        let statics = ACC_PUBLIC | ACC_STATIC;

        for (key, name) in self.table.entries(Pool::InstanceGet) {
            let ty = self.field_type(accessor, key)?;
            let mut code = CodeBuilder::for_method(instance, &MethodDescriptor::getter(ty.clone()));
            code.load_this()
                .type_insn(Opcode::Checkcast, owner)
                .field(Opcode::Getfield, owner, key.name.as_str(), &ty)
                .ret(&ty);
            class
                .methods
                .push(MethodNode::new(instance, name, getter(&ty)).with_code(code.finish()));
        }
        for (key, name) in self.table.entries(Pool::InstanceSet) {
            let ty = self.field_type(accessor, key)?;
            let mut code = CodeBuilder::for_method(instance, &MethodDescriptor::setter(ty.clone()));
            code.load_this()
                .type_insn(Opcode::Checkcast, owner)
                .load(&ty, 1)
                .field(Opcode::Putfield, owner, key.name.as_str(), &ty)
                .ret(&Type::Void);
            class
                .methods
                .push(MethodNode::new(instance, name, setter(&ty)).with_code(code.finish()));
        }
        for (key, name) in self.table.entries(Pool::InstanceInvoke) {
            let descriptor = self.method_descriptor(accessor, key)?;
            let opcode = if owner_is_interface {
                Opcode::Invokeinterface
            } else {
                Opcode::Invokevirtual
            };
            let mut code = CodeBuilder::for_method(instance, &descriptor);
            code.load_this().type_insn(Opcode::Checkcast, owner);
            code.load_arguments(instance, &descriptor);
            code.invoke(opcode, owner, key.name.as_str(), &descriptor, owner_is_interface)
                .ret(&descriptor.ret);
            class.methods.push(
                MethodNode::new(instance, name, key.descriptor.as_str()).with_code(code.finish()),
            );
        }

        for (key, name) in self.table.entries(Pool::StaticGet) {
            let ty = self.field_type(accessor, key)?;
            let mut code = CodeBuilder::for_method(statics, &MethodDescriptor::getter(ty.clone()));
            code.field(Opcode::Getstatic, owner, key.name.as_str(), &ty)
                .ret(&ty);
            class
                .methods
                .push(MethodNode::new(statics, name, getter(&ty)).with_code(code.finish()));
        }
        for (key, name) in self.table.entries(Pool::StaticSet) {
            let ty = self.field_type(accessor, key)?;
            let mut code = CodeBuilder::for_method(statics, &MethodDescriptor::setter(ty.clone()));
            code.load(&ty, 0)
                .field(Opcode::Putstatic, owner, key.name.as_str(), &ty)
                .ret(&Type::Void);
            class
                .methods
                .push(MethodNode::new(statics, name, setter(&ty)).with_code(code.finish()));
        }
        for (key, name) in self.table.entries(Pool::StaticInvoke) {
            let descriptor = self.method_descriptor(accessor, key)?;
            let mut code = CodeBuilder::for_method(statics, &descriptor);
            code.load_arguments(statics, &descriptor);
            code.invoke(
                Opcode::Invokestatic,
                owner,
                key.name.as_str(),
                &descriptor,
                owner_is_interface,
            )
            .ret(&descriptor.ret);
            class.methods.push(
                MethodNode::new(statics, name, key.descriptor.as_str()).with_code(code.finish()),
            );
        }

        self.finish(class)
    }

    /// Distinct member keys across `pools`, sorted
    fn keys(&self, pools: &[Pool]) -> BTreeSet<&MemberKey> {
        pools
            .iter()
            .flat_map(|pool| self.table.entries(*pool).map(|(key, _)| key))
            .collect()
    }

    fn field_type(&self, class: &str, key: &MemberKey) -> Result<Type, EmitError> {
        Type::parse_value(&key.descriptor).map_err(|source| EmitError::Descriptor {
            class: class.to_string(),
            member: key.to_string(),
            source,
        })
    }

    fn method_descriptor(&self, class: &str, key: &MemberKey) -> Result<MethodDescriptor, EmitError> {
        MethodDescriptor::parse(&key.descriptor).map_err(|source| EmitError::Descriptor {
            class: class.to_string(),
            member: key.to_string(),
            source,
        })
    }

    fn finish(&self, class: ClassNode) -> Result<ClassNode, EmitError> {
        verify_class(&class).map_err(|source| EmitError::Verify {
            class: class.name.clone(),
            source,
        })?;
        tracing::trace!(class = %class.name, methods = class.methods.len(), "emitted");
        Ok(class)
    }
}

/// No-argument constructor calling `Object.<init>`
fn constructor(access: u16) -> MethodNode {
    let descriptor = MethodDescriptor::new(Vec::new(), Type::Void);
    let mut code = CodeBuilder::for_method(access, &descriptor);
    code.load_this()
        .invoke(Opcode::Invokespecial, OBJECT, INIT, &descriptor, false)
        .ret(&Type::Void);
    MethodNode::new(access, INIT, descriptor.descriptor()).with_code(code.finish())
}

fn getter(ty: &Type) -> String {
    format!("(){}", ty.descriptor())
}

fn setter(ty: &Type) -> String {
    format!("({})V", ty.descriptor())
}
