//! Umbra Program Image Model
//!
//! This crate provides the class, field and method tree that the Umbra
//! engine edits: opcodes, access flags, descriptors, a body builder with
//! stack accounting, and a structural verifier.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod access;
pub mod builder;
pub mod descriptor;
pub mod node;
pub mod opcode;
pub mod verify;

pub use builder::CodeBuilder;
pub use descriptor::{DescriptorError, MethodDescriptor, Type, ValueKind, MAX_PARAMETER_SLOTS};
pub use node::{
    ClassNode, Code, Constant, FieldInsn, FieldNode, Insn, Label, MethodInsn, MethodNode, CLINIT,
    INIT, OBJECT, V1_8,
};
pub use opcode::{Opcode, OperandKind};
pub use verify::{compute_maxs, update_maxs, verify_class, verify_method, VerifyError};
