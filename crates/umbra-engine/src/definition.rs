//! Transformation definitions
//!
//! A [`TypeDefinition`] describes everything the engine does to one type:
//! interfaces to append, members whose access is widened, fields that lose
//! `final`, and synthetic fields and methods to add. All values are checked
//! when they are constructed, so a definition that exists is one the
//! injector can emit without failing on its shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use umbra_bytecode::access::{self, ACC_STATIC};
use umbra_bytecode::{
    DescriptorError, MethodDescriptor, Opcode, Type, ValueKind, CLINIT, INIT, MAX_PARAMETER_SLOTS,
};

/// Definition errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// An accessor's static bit disagrees with its field
    #[error("Accessor {accessor} of field {field} disagrees with the field's static bit (field static: {field_static})")]
    AccessorStatic {
        /// Field name
        field: String,
        /// Accessor method name
        accessor: String,
        /// Whether the field is static
        field_static: bool,
    },

    /// A setter was declared for a final field
    #[error("Field {field} is final and cannot have a setter")]
    SetterOnFinal {
        /// Field name
        field: String,
    },

    /// An accessor's declared type differs from its field's type
    #[error("Accessor {accessor} of field {field} declares {found}, field is {expected}")]
    AccessorType {
        /// Field name
        field: String,
        /// Accessor method name
        accessor: String,
        /// Field type
        expected: Type,
        /// Accessor type
        found: Type,
    },

    /// A field or accessor was declared `void`
    #[error("Field {0} cannot have type void")]
    VoidField(String),

    /// A generated member uses an initializer name
    #[error("{0} is reserved for initializers")]
    ReservedName(String),

    /// The class initializer cannot be publicized
    #[error("{owner}: <clinit> cannot be publicized")]
    PublicizedInitializer {
        /// Owning type
        owner: String,
    },

    /// A synthetic method's receiver and parameters exceed the local slot limit
    #[error("Method {method}{descriptor} needs {slots} parameter slots, limit is {limit}")]
    TooManyParameterSlots {
        /// Synthetic method name
        method: String,
        /// Synthetic method descriptor
        descriptor: MethodDescriptor,
        /// Slots needed, receiver included
        slots: u32,
        /// Largest allowed count
        limit: u32,
    },

    /// A byte that is not one of the four invoke opcodes
    #[error("Opcode {0} is not an invocation")]
    InvalidDispatch(u8),

    /// Dispatch opcode and the redirect target's interface flag disagree
    #[error("Method {method}: {dispatch} requires interface flag {expected} on the redirect target")]
    InterfaceFlag {
        /// Synthetic method name
        method: String,
        /// Declared dispatch
        dispatch: Dispatch,
        /// Flag the dispatch needs
        expected: bool,
    },

    /// The redirect target cannot accept what the synthetic method passes
    #[error("Method {method}{descriptor} cannot forward to {target}: {reason}")]
    RedirectMismatch {
        /// Synthetic method name
        method: String,
        /// Synthetic method descriptor
        descriptor: MethodDescriptor,
        /// Redirect target
        target: String,
        /// What disagrees
        reason: String,
    },

    /// A member key's descriptor does not parse
    #[error("{owner}: bad descriptor for {name}: {source}")]
    MemberDescriptor {
        /// Owning type
        owner: String,
        /// Member name
        name: String,
        /// Parse error
        #[source]
        source: DescriptorError,
    },

    /// Two different synthetic fields share an identity
    #[error("{owner}: duplicate synthetic field {name}:{descriptor}")]
    DuplicateSyntheticField {
        /// Owning type
        owner: String,
        /// Field name
        name: String,
        /// Field descriptor
        descriptor: String,
    },

    /// Two different generated methods share an identity
    #[error("{owner}: duplicate synthetic method {name}{descriptor}")]
    DuplicateSyntheticMethod {
        /// Owning type
        owner: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// Definitions for different owners cannot be combined
    #[error("Cannot merge definition for {found} into {expected}")]
    OwnerMismatch {
        /// Owner of the receiving definition
        expected: String,
        /// Owner of the merged definition
        found: String,
    },
}

/// Identity of a field or method within its owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberKey {
    /// Member name
    pub name: String,
    /// Field or method descriptor, in symbolic form
    pub descriptor: String,
}

impl MemberKey {
    /// Create a key
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descriptor.starts_with('(') {
            write!(f, "{}{}", self.name, self.descriptor)
        } else {
            write!(f, "{}:{}", self.name, self.descriptor)
        }
    }
}

/// How a synthetic method calls its redirect target
///
/// Serialized as the invoke opcode's byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Dispatch {
    /// `invokestatic`
    Static,
    /// `invokevirtual`
    Virtual,
    /// `invokespecial`
    Special,
    /// `invokeinterface`
    Interface,
}

impl Dispatch {
    /// The invoke opcode for this dispatch
    pub fn opcode(self) -> Opcode {
        match self {
            Dispatch::Static => Opcode::Invokestatic,
            Dispatch::Virtual => Opcode::Invokevirtual,
            Dispatch::Special => Opcode::Invokespecial,
            Dispatch::Interface => Opcode::Invokeinterface,
        }
    }

    /// Map an invoke opcode back to a dispatch
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Invokestatic => Some(Dispatch::Static),
            Opcode::Invokevirtual => Some(Dispatch::Virtual),
            Opcode::Invokespecial => Some(Dispatch::Special),
            Opcode::Invokeinterface => Some(Dispatch::Interface),
            _ => None,
        }
    }

    /// Whether the call consumes a receiver
    pub fn has_receiver(self) -> bool {
        self != Dispatch::Static
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode().name())
    }
}

impl TryFrom<u8> for Dispatch {
    type Error = DefinitionError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::from_u8(byte)
            .and_then(Dispatch::from_opcode)
            .ok_or(DefinitionError::InvalidDispatch(byte))
    }
}

impl From<Dispatch> for u8 {
    fn from(dispatch: Dispatch) -> u8 {
        dispatch.opcode().to_u8()
    }
}

/// Shape of a generated getter or setter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Accessor {
    access: u16,
    #[serde(rename = "type")]
    ty: Type,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl Accessor {
    /// Create an accessor for a field of type `ty`
    pub fn new(access: u16, ty: Type, name: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            access,
            ty,
            name: name.into(),
            signature,
        }
    }

    /// Method access flags
    pub fn access(&self) -> u16 {
        self.access
    }

    /// Value type read or written
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generic method signature
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Check for the static bit
    pub fn is_static(&self) -> bool {
        access::is_static(self.access)
    }

    /// `()T`
    pub fn getter_descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::getter(self.ty.clone())
    }

    /// `(T)V`
    pub fn setter_descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::setter(self.ty.clone())
    }
}

/// A field added to a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyntheticField {
    access: u16,
    name: String,
    #[serde(rename = "type")]
    ty: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    getter: Option<Accessor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    setter: Option<Accessor>,
}

impl SyntheticField {
    /// Create and validate a synthetic field
    pub fn new(
        access: u16,
        name: impl Into<String>,
        ty: Type,
        signature: Option<String>,
        getter: Option<Accessor>,
        setter: Option<Accessor>,
    ) -> Result<Self, DefinitionError> {
        let field = Self {
            access,
            name: name.into(),
            ty,
            signature,
            getter,
            setter,
        };
        field.validate()?;
        Ok(field)
    }

    /// Check accessor consistency
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.ty == Type::Void {
            return Err(DefinitionError::VoidField(self.name.clone()));
        }
        if self.setter.is_some() && access::is_final(self.access) {
            return Err(DefinitionError::SetterOnFinal {
                field: self.name.clone(),
            });
        }

        for accessor in self.getter.iter().chain(&self.setter) {
            if accessor.name == INIT || accessor.name == CLINIT {
                return Err(DefinitionError::ReservedName(accessor.name.clone()));
            }
            if accessor.is_static() != self.is_static() {
                return Err(DefinitionError::AccessorStatic {
                    field: self.name.clone(),
                    accessor: accessor.name.clone(),
                    field_static: self.is_static(),
                });
            }
            if accessor.ty != self.ty {
                return Err(DefinitionError::AccessorType {
                    field: self.name.clone(),
                    accessor: accessor.name.clone(),
                    expected: self.ty.clone(),
                    found: accessor.ty.clone(),
                });
            }
        }

        Ok(())
    }

    /// Field access flags
    pub fn access(&self) -> u16 {
        self.access
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Generic field signature
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Getter shape, if one is generated
    pub fn getter(&self) -> Option<&Accessor> {
        self.getter.as_ref()
    }

    /// Setter shape, if one is generated
    pub fn setter(&self) -> Option<&Accessor> {
        self.setter.as_ref()
    }

    /// Check for the static bit
    pub fn is_static(&self) -> bool {
        access::is_static(self.access)
    }

    /// Check for the final bit
    pub fn is_final(&self) -> bool {
        access::is_final(self.access)
    }

    /// Identity of the field
    pub fn key(&self) -> MemberKey {
        MemberKey::new(self.name.clone(), self.ty.descriptor())
    }
}

/// A call target elsewhere in the program image
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RedirectTarget {
    /// Internal name of the owning type
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: MethodDescriptor,
    /// Whether `owner` is an interface
    #[serde(default)]
    pub interface: bool,
}

impl RedirectTarget {
    /// Create a target
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: MethodDescriptor,
        interface: bool,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor,
            interface,
        }
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// A method added to a type whose body forwards to a [`RedirectTarget`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyntheticMethod {
    #[serde(rename = "opcode")]
    dispatch: Dispatch,
    access: u16,
    name: String,
    descriptor: MethodDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    redirect: RedirectTarget,
}

impl SyntheticMethod {
    /// Create and validate a synthetic method
    pub fn new(
        dispatch: Dispatch,
        access: u16,
        name: impl Into<String>,
        descriptor: MethodDescriptor,
        signature: Option<String>,
        redirect: RedirectTarget,
    ) -> Result<Self, DefinitionError> {
        let method = Self {
            dispatch,
            access,
            name: name.into(),
            descriptor,
            signature,
            redirect,
        };
        method.validate()?;
        Ok(method)
    }

    /// Check that the body this method implies is well formed
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name == INIT || self.name == CLINIT {
            return Err(DefinitionError::ReservedName(self.name.clone()));
        }

        let slots = self.descriptor.parameter_slots(self.is_static());
        if slots > MAX_PARAMETER_SLOTS {
            return Err(DefinitionError::TooManyParameterSlots {
                method: self.name.clone(),
                descriptor: self.descriptor.clone(),
                slots,
                limit: MAX_PARAMETER_SLOTS,
            });
        }

        match self.dispatch {
            Dispatch::Interface if !self.redirect.interface => {
                return Err(self.interface_flag(true));
            }
            Dispatch::Virtual if self.redirect.interface => {
                return Err(self.interface_flag(false));
            }
            _ => {}
        }

        // Values the body pushes, in order: receiver, then parameters.
        let mut pushed = Vec::with_capacity(self.descriptor.params.len() + 1);
        if !self.is_static() {
            pushed.push(ValueKind::Reference);
        }
        pushed.extend(self.descriptor.params.iter().map(Type::kind));

        let mut arguments = pushed.as_slice();
        if self.dispatch.has_receiver() {
            match arguments.split_first() {
                Some((ValueKind::Reference, rest)) => arguments = rest,
                _ => return Err(self.mismatch("no reference available as the call receiver")),
            }
        }

        let expected = self
            .redirect
            .descriptor
            .params
            .iter()
            .map(Type::kind)
            .collect::<Vec<_>>();
        if expected.as_slice() != arguments {
            return Err(self.mismatch(format!(
                "passes {:?}, target takes {:?}",
                arguments, expected
            )));
        }

        if self.redirect.descriptor.ret.kind() != self.descriptor.ret.kind() {
            return Err(self.mismatch(format!(
                "returns {}, target returns {}",
                self.descriptor.ret, self.redirect.descriptor.ret
            )));
        }

        Ok(())
    }

    fn interface_flag(&self, expected: bool) -> DefinitionError {
        DefinitionError::InterfaceFlag {
            method: self.name.clone(),
            dispatch: self.dispatch,
            expected,
        }
    }

    fn mismatch(&self, reason: impl Into<String>) -> DefinitionError {
        DefinitionError::RedirectMismatch {
            method: self.name.clone(),
            descriptor: self.descriptor.clone(),
            target: self.redirect.to_string(),
            reason: reason.into(),
        }
    }

    /// How the target is called
    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    /// Method access flags
    pub fn access(&self) -> u16 {
        self.access
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method descriptor
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Generic method signature
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Forwarding target
    pub fn redirect(&self) -> &RedirectTarget {
        &self.redirect
    }

    /// Check for the static bit
    pub fn is_static(&self) -> bool {
        access::is_static(self.access)
    }

    /// Identity of the method
    pub fn key(&self) -> MemberKey {
        MemberKey::new(self.name.clone(), self.descriptor.descriptor())
    }
}

/// Everything the engine changes about one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    name: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    interfaces: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    publicized_fields: BTreeSet<MemberKey>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    publicized_methods: BTreeSet<MemberKey>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    mutable_fields: BTreeSet<MemberKey>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    synthetic_fields: BTreeSet<SyntheticField>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    synthetic_methods: BTreeSet<SyntheticMethod>,
}

impl TypeDefinition {
    /// Start building a definition for `name`
    pub fn builder(name: impl Into<String>) -> TypeDefinitionBuilder {
        TypeDefinitionBuilder::new(name)
    }

    /// Check every member and the cross-member identity rules
    pub fn validate(&self) -> Result<(), DefinitionError> {
        for key in self.publicized_fields.iter().chain(&self.mutable_fields) {
            Type::parse_value(&key.descriptor).map_err(|source| self.bad_key(key, source))?;
        }
        for key in &self.publicized_methods {
            if key.name == CLINIT {
                return Err(DefinitionError::PublicizedInitializer {
                    owner: self.name.clone(),
                });
            }
            MethodDescriptor::parse(&key.descriptor).map_err(|source| self.bad_key(key, source))?;
        }

        let mut fields = BTreeSet::new();
        for field in &self.synthetic_fields {
            field.validate()?;
            let key = field.key();
            if !fields.insert(key.clone()) {
                return Err(DefinitionError::DuplicateSyntheticField {
                    owner: self.name.clone(),
                    name: key.name,
                    descriptor: key.descriptor,
                });
            }
        }

        // Accessors and synthetic methods all land in the same method table.
        let mut methods = BTreeSet::new();
        let accessors = self.synthetic_fields.iter().flat_map(|field| {
            let getter = field
                .getter()
                .map(|a| MemberKey::new(a.name(), a.getter_descriptor().descriptor()));
            let setter = field
                .setter()
                .map(|a| MemberKey::new(a.name(), a.setter_descriptor().descriptor()));
            getter.into_iter().chain(setter)
        });
        let synthetic = self.synthetic_methods.iter().map(|method| {
            method.validate().map(|()| method.key())
        });
        for key in accessors.map(Ok).chain(synthetic) {
            let key = key?;
            if !methods.insert(key.clone()) {
                return Err(DefinitionError::DuplicateSyntheticMethod {
                    owner: self.name.clone(),
                    name: key.name,
                    descriptor: key.descriptor,
                });
            }
        }

        Ok(())
    }

    fn bad_key(&self, key: &MemberKey, source: DescriptorError) -> DefinitionError {
        DefinitionError::MemberDescriptor {
            owner: self.name.clone(),
            name: key.name.clone(),
            source,
        }
    }

    /// Union two definitions for the same owner
    ///
    /// Identical members collapse; distinct members sharing an identity are
    /// rejected.
    pub fn union(&self, other: &TypeDefinition) -> Result<TypeDefinition, DefinitionError> {
        if self.name != other.name {
            return Err(DefinitionError::OwnerMismatch {
                expected: self.name.clone(),
                found: other.name.clone(),
            });
        }

        let merged = TypeDefinition {
            name: self.name.clone(),
            interfaces: self.interfaces.union(&other.interfaces).cloned().collect(),
            publicized_fields: self
                .publicized_fields
                .union(&other.publicized_fields)
                .cloned()
                .collect(),
            publicized_methods: self
                .publicized_methods
                .union(&other.publicized_methods)
                .cloned()
                .collect(),
            mutable_fields: self
                .mutable_fields
                .union(&other.mutable_fields)
                .cloned()
                .collect(),
            synthetic_fields: self
                .synthetic_fields
                .union(&other.synthetic_fields)
                .cloned()
                .collect(),
            synthetic_methods: self
                .synthetic_methods
                .union(&other.synthetic_methods)
                .cloned()
                .collect(),
        };
        merged.validate()?;
        Ok(merged)
    }

    /// Access flags a field ends up with
    pub fn field_access(&self, key: &MemberKey, access: u16) -> u16 {
        let mut access = access;
        if self.publicized_fields.contains(key) {
            access = access::publicize(access);
        }
        // A static final may only be assigned in <clinit>; leave it alone.
        if access & ACC_STATIC == 0 && self.mutable_fields.contains(key) {
            access = access::definalize(access);
        }
        access
    }

    /// Access flags a method ends up with
    pub fn method_access(&self, key: &MemberKey, access: u16) -> u16 {
        if self.publicized_methods.contains(key) {
            access::publicize(access)
        } else {
            access
        }
    }

    /// Synthetic field by name and field descriptor
    pub fn synthetic_field(&self, name: &str, descriptor: &str) -> Option<&SyntheticField> {
        self.synthetic_fields
            .iter()
            .find(|f| f.name == name && f.ty.descriptor() == descriptor)
    }

    /// Synthetic method by name and method descriptor
    pub fn synthetic_method(&self, name: &str, descriptor: &str) -> Option<&SyntheticMethod> {
        self.synthetic_methods
            .iter()
            .find(|m| m.name == name && m.descriptor.descriptor() == descriptor)
    }

    /// Synthetic field whose getter is `name` with descriptor `()T`
    pub fn synthetic_getter(&self, name: &str, descriptor: &str) -> Option<&SyntheticField> {
        self.synthetic_fields.iter().find(|f| {
            f.getter()
                .map_or(false, |a| a.name == name && a.getter_descriptor().descriptor() == descriptor)
        })
    }

    /// Synthetic field whose setter is `name` with descriptor `(T)V`
    pub fn synthetic_setter(&self, name: &str, descriptor: &str) -> Option<&SyntheticField> {
        self.synthetic_fields.iter().find(|f| {
            f.setter()
                .map_or(false, |a| a.name == name && a.setter_descriptor().descriptor() == descriptor)
        })
    }

    /// Internal name of the owning type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interfaces to append
    pub fn interfaces(&self) -> &BTreeSet<String> {
        &self.interfaces
    }

    /// Fields widened to public
    pub fn publicized_fields(&self) -> &BTreeSet<MemberKey> {
        &self.publicized_fields
    }

    /// Methods widened to public
    pub fn publicized_methods(&self) -> &BTreeSet<MemberKey> {
        &self.publicized_methods
    }

    /// Fields that lose `final`
    pub fn mutable_fields(&self) -> &BTreeSet<MemberKey> {
        &self.mutable_fields
    }

    /// Fields to add
    pub fn synthetic_fields(&self) -> &BTreeSet<SyntheticField> {
        &self.synthetic_fields
    }

    /// Methods to add
    pub fn synthetic_methods(&self) -> &BTreeSet<SyntheticMethod> {
        &self.synthetic_methods
    }

    /// Check whether the definition changes nothing
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
            && self.publicized_fields.is_empty()
            && self.publicized_methods.is_empty()
            && self.mutable_fields.is_empty()
            && self.synthetic_fields.is_empty()
            && self.synthetic_methods.is_empty()
    }
}

/// Builder for [`TypeDefinition`]
#[derive(Debug, Clone)]
pub struct TypeDefinitionBuilder {
    definition: TypeDefinition,
}

impl TypeDefinitionBuilder {
    /// Start an empty definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: TypeDefinition {
                name: name.into(),
                interfaces: BTreeSet::new(),
                publicized_fields: BTreeSet::new(),
                publicized_methods: BTreeSet::new(),
                mutable_fields: BTreeSet::new(),
                synthetic_fields: BTreeSet::new(),
                synthetic_methods: BTreeSet::new(),
            },
        }
    }

    /// Append an interface
    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.definition.interfaces.insert(name.into());
        self
    }

    /// Widen a field to public
    pub fn publicize_field(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.definition
            .publicized_fields
            .insert(MemberKey::new(name, descriptor));
        self
    }

    /// Widen a method to public
    pub fn publicize_method(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.definition
            .publicized_methods
            .insert(MemberKey::new(name, descriptor));
        self
    }

    /// Drop `final` from a field
    pub fn mutable_field(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.definition
            .mutable_fields
            .insert(MemberKey::new(name, descriptor));
        self
    }

    /// Add a synthetic field
    pub fn synthetic_field(mut self, field: SyntheticField) -> Self {
        self.definition.synthetic_fields.insert(field);
        self
    }

    /// Add a synthetic method
    pub fn synthetic_method(mut self, method: SyntheticMethod) -> Self {
        self.definition.synthetic_methods.insert(method);
        self
    }

    /// Validate and finish
    pub fn build(self) -> Result<TypeDefinition, DefinitionError> {
        self.definition.validate()?;
        Ok(self.definition)
    }
}
