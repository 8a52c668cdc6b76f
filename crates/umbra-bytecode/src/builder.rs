//! Method body construction
//!
//! [`CodeBuilder`] appends instructions to a body while keeping a running
//! operand-stack depth, so straight-line bodies come out with exact
//! `max_stack` / `max_locals` values. Bodies with branches should be passed
//! through [`crate::verify::compute_maxs`] afterwards; the builder does not
//! follow control flow.

use crate::access;
use crate::descriptor::{MethodDescriptor, Type};
use crate::node::{Code, Constant, FieldInsn, Insn, Label, MethodInsn};
use crate::opcode::Opcode;

/// Instruction list writer with stack accounting
#[derive(Debug, Default)]
pub struct CodeBuilder {
    instructions: Vec<Insn>,
    depth: u16,
    max_stack: u16,
    max_locals: u16,
    next_label: u32,
}

impl CodeBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder whose locals already cover the receiver and parameters
    pub fn for_method(access: u16, descriptor: &MethodDescriptor) -> Self {
        Self {
            max_locals: clamp(descriptor.parameter_slots(access::is_static(access))),
            ..Self::default()
        }
    }

    /// Current stack depth in words
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Number of instructions written, labels included
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn apply(&mut self, pops: u16, pushes: u16) {
        self.depth = self.depth.saturating_sub(pops).saturating_add(pushes);
        self.max_stack = self.max_stack.max(self.depth);
    }

    fn touch_local(&mut self, slot: u16, size: u16) {
        self.max_locals = self.max_locals.max(slot.saturating_add(size));
    }

    // ===== Basic Emission =====

    /// Emit an operand-free instruction
    pub fn simple(&mut self, opcode: Opcode) -> &mut Self {
        if let Some((pops, pushes)) = opcode.stack_effect() {
            self.apply(pops, pushes);
        }
        self.instructions.push(Insn::Simple(opcode));
        self
    }

    /// Push an int constant using the shortest form
    pub fn push_int(&mut self, value: i32) -> &mut Self {
        match value {
            -1 => self.simple(Opcode::IconstM1),
            0 => self.simple(Opcode::Iconst0),
            1 => self.simple(Opcode::Iconst1),
            2 => self.simple(Opcode::Iconst2),
            3 => self.simple(Opcode::Iconst3),
            4 => self.simple(Opcode::Iconst4),
            5 => self.simple(Opcode::Iconst5),
            v if i8::try_from(v).is_ok() => self.int(Opcode::Bipush, v),
            v if i16::try_from(v).is_ok() => self.int(Opcode::Sipush, v),
            v => self.ldc(Constant::Int(v)),
        }
    }

    /// Emit `bipush`, `sipush` or `newarray`
    pub fn int(&mut self, opcode: Opcode, operand: i32) -> &mut Self {
        if let Some((pops, pushes)) = opcode.stack_effect() {
            self.apply(pops, pushes);
        }
        self.instructions.push(Insn::Int { opcode, operand });
        self
    }

    /// Emit `ldc`
    pub fn ldc(&mut self, constant: Constant) -> &mut Self {
        self.apply(0, constant.size());
        self.instructions.push(Insn::Ldc(constant));
        self
    }

    // ===== Locals =====

    /// Load a local of the given type
    ///
    /// Loading `void` emits nothing.
    pub fn load(&mut self, ty: &Type, slot: u16) -> &mut Self {
        if let Some(opcode) = ty.load_opcode() {
            self.touch_local(slot, ty.size());
            self.apply(0, ty.size());
            self.instructions.push(Insn::Var { opcode, slot });
        }
        self
    }

    /// Store into a local of the given type
    pub fn store(&mut self, ty: &Type, slot: u16) -> &mut Self {
        if let Some(opcode) = ty.store_opcode() {
            self.touch_local(slot, ty.size());
            self.apply(ty.size(), 0);
            self.instructions.push(Insn::Var { opcode, slot });
        }
        self
    }

    /// Load the receiver from slot 0
    pub fn load_this(&mut self) -> &mut Self {
        self.touch_local(0, 1);
        self.apply(0, 1);
        self.instructions.push(Insn::Var {
            opcode: Opcode::Aload,
            slot: 0,
        });
        self
    }

    /// Load every parameter in order, skipping the receiver slot for
    /// instance methods
    ///
    /// Returns the first slot past the parameters.
    pub fn load_arguments(&mut self, access: u16, descriptor: &MethodDescriptor) -> u16 {
        let mut slot = if access::is_static(access) { 0 } else { 1 };
        for param in &descriptor.params {
            self.load(param, slot);
            slot = slot.saturating_add(param.size());
        }
        slot
    }

    /// Emit the return matching `ty`
    pub fn ret(&mut self, ty: &Type) -> &mut Self {
        self.simple(ty.return_opcode())
    }

    // ===== Members =====

    /// Emit a field access
    pub fn field(
        &mut self,
        opcode: Opcode,
        owner: impl Into<String>,
        name: impl Into<String>,
        ty: &Type,
    ) -> &mut Self {
        let size = ty.size();
        let (pops, pushes) = match opcode {
            Opcode::Getstatic => (0, size),
            Opcode::Putstatic => (size, 0),
            Opcode::Getfield => (1, size),
            _ => (1 + size, 0),
        };
        self.apply(pops, pushes);
        self.instructions
            .push(FieldInsn::new(opcode, owner, name, ty.descriptor()).into());
        self
    }

    /// Emit an invocation
    pub fn invoke(
        &mut self,
        opcode: Opcode,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: &MethodDescriptor,
        interface: bool,
    ) -> &mut Self {
        let pops = descriptor.parameter_slots(opcode == Opcode::Invokestatic);
        self.apply(clamp(pops), descriptor.ret.size());
        self.instructions.push(
            MethodInsn::new(opcode, owner, name, descriptor.descriptor(), interface).into(),
        );
        self
    }

    /// Emit `new`, `anewarray`, `checkcast` or `instanceof`
    pub fn type_insn(&mut self, opcode: Opcode, type_name: impl Into<String>) -> &mut Self {
        if let Some((pops, pushes)) = opcode.stack_effect() {
            self.apply(pops, pushes);
        }
        self.instructions.push(Insn::Type {
            opcode,
            type_name: type_name.into(),
        });
        self
    }

    // ===== Control Flow =====

    /// Allocate a fresh label
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Place a label at the current position
    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.instructions.push(Insn::Label(label));
        self
    }

    /// Emit a branch
    pub fn jump(&mut self, opcode: Opcode, target: Label) -> &mut Self {
        if let Some((pops, pushes)) = opcode.stack_effect() {
            self.apply(pops, pushes);
        }
        self.instructions.push(Insn::Jump { opcode, target });
        self
    }

    /// Finish the body
    pub fn finish(self) -> Code {
        Code {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            instructions: self.instructions,
        }
    }
}

/// Slot counts past `u16::MAX` saturate; the verifier rejects such bodies.
fn clamp(slots: u32) -> u16 {
    u16::try_from(slots).unwrap_or(u16::MAX)
}
