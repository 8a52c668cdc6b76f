//! Method body verification
//!
//! The checks here are structural: operand shapes, operand-stack depth
//! along every control-flow path, local slot bounds, return opcodes
//! against the method descriptor, and that control never runs off the end
//! of a body. Types on the stack are not tracked.

use crate::access;
use crate::descriptor::{DescriptorError, MethodDescriptor, Type, MAX_PARAMETER_SLOTS};
use crate::node::{ClassNode, Code, Insn, Label, MethodNode};
use crate::opcode::{Opcode, OperandKind};
use rustc_hash::{FxHashMap, FxHashSet};

/// Verification errors
///
/// `method` is always `name` followed by the descriptor, e.g. `run(I)V`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    /// An instruction pops more than is on the stack
    #[error("Stack underflow in {method} at instruction {index}")]
    StackUnderflow {
        /// Method key
        method: String,
        /// Instruction index
        index: usize,
    },

    /// The body needs more stack than it declares
    #[error("Stack overflow in {method}: needs {needed}, declares {declared}")]
    StackOverflow {
        /// Method key
        method: String,
        /// Computed maximum
        needed: u16,
        /// Declared `max_stack`
        declared: u16,
    },

    /// A local slot lies outside the declared locals
    #[error("Invalid local variable reference in {method}: needs {needed} slots, declares {declared}")]
    InvalidLocalRef {
        /// Method key
        method: String,
        /// Computed slot count
        needed: u16,
        /// Declared `max_locals`
        declared: u16,
    },

    /// The receiver and parameters need more local slots than a method may have
    #[error("Method {method} needs {slots} parameter slots, limit is 255")]
    TooManyParameters {
        /// Method key
        method: String,
        /// Slots needed, receiver included
        slots: u32,
    },

    /// A call passes more argument slots than any method can take
    #[error("Call in {method} at instruction {index} passes {slots} argument slots, limit is 255")]
    TooManyArguments {
        /// Method key
        method: String,
        /// Instruction index
        index: usize,
        /// Slots passed, receiver included
        slots: u32,
    },

    /// A local slot lies past the last addressable slot
    #[error("Local slot {slot} in {method} is out of range")]
    LocalOutOfRange {
        /// Method key
        method: String,
        /// First slot past the access
        slot: u32,
    },

    /// A branch targets a label that is never placed
    #[error("Unknown label {label} in {method}")]
    UnknownLabel {
        /// Method key
        method: String,
        /// Label id
        label: u32,
    },

    /// A label is placed twice
    #[error("Label {label} placed twice in {method}")]
    DuplicateLabel {
        /// Method key
        method: String,
        /// Label id
        label: u32,
    },

    /// Two paths reach the same instruction with different depths
    #[error("Inconsistent stack depth in {method} at instruction {index}: {first} vs {second}")]
    InconsistentStack {
        /// Method key
        method: String,
        /// Instruction index
        index: usize,
        /// Depth recorded first
        first: u16,
        /// Depth seen later
        second: u16,
    },

    /// Execution can reach the end of the body
    #[error("Execution falls off end of {method}")]
    FallOffEnd {
        /// Method key
        method: String,
    },

    /// An instruction variant carries an opcode of the wrong shape
    #[error("Opcode {opcode} has the wrong operand shape in {method} at instruction {index}")]
    MismatchedOperand {
        /// Method key
        method: String,
        /// Instruction index
        index: usize,
        /// Offending opcode
        opcode: Opcode,
    },

    /// A return opcode disagrees with the method's return type
    #[error("{opcode} does not match the return type of {method} at instruction {index}")]
    MismatchedReturn {
        /// Method key
        method: String,
        /// Instruction index
        index: usize,
        /// Offending opcode
        opcode: Opcode,
    },

    /// A concrete method has no body
    #[error("Missing code for concrete method {method}")]
    MissingCode {
        /// Method key
        method: String,
    },

    /// An abstract or native method has a body
    #[error("Abstract or native method {method} has code")]
    UnexpectedCode {
        /// Method key
        method: String,
    },

    /// Two members share a name and descriptor
    #[error("Duplicate member {name}{descriptor} in {class}")]
    DuplicateMember {
        /// Declaring class
        class: String,
        /// Member name
        name: String,
        /// Member descriptor
        descriptor: String,
    },

    /// A descriptor failed to parse
    #[error("Bad descriptor in {method}: {source}")]
    Descriptor {
        /// Method key
        method: String,
        /// Parse error
        #[source]
        source: DescriptorError,
    },
}

/// Verify every member of a class
pub fn verify_class(class: &ClassNode) -> Result<(), VerifyError> {
    let mut seen = FxHashSet::default();
    for field in &class.fields {
        if !seen.insert((field.name.as_str(), field.descriptor.as_str())) {
            return Err(duplicate(class, &field.name, &field.descriptor));
        }
    }

    seen.clear();
    for method in &class.methods {
        if !seen.insert((method.name.as_str(), method.descriptor.as_str())) {
            return Err(duplicate(class, &method.name, &method.descriptor));
        }
        verify_method(method)?;
    }

    Ok(())
}

fn duplicate(class: &ClassNode, name: &str, descriptor: &str) -> VerifyError {
    VerifyError::DuplicateMember {
        class: class.name.clone(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
}

/// Verify a single method against its declared limits
pub fn verify_method(method: &MethodNode) -> Result<(), VerifyError> {
    let key = method_key(method);
    let bodiless = method.access & (access::ACC_ABSTRACT | access::ACC_NATIVE) != 0;

    let code = match (&method.code, bodiless) {
        (None, true) => return Ok(()),
        (Some(_), true) => return Err(VerifyError::UnexpectedCode { method: key }),
        (None, false) => return Err(VerifyError::MissingCode { method: key }),
        (Some(code), false) => code,
    };

    let (max_stack, max_locals) = compute_maxs(method)?;

    if max_stack > code.max_stack {
        return Err(VerifyError::StackOverflow {
            method: key,
            needed: max_stack,
            declared: code.max_stack,
        });
    }
    if max_locals > code.max_locals {
        return Err(VerifyError::InvalidLocalRef {
            method: key,
            needed: max_locals,
            declared: code.max_locals,
        });
    }

    Ok(())
}

/// Compute `(max_stack, max_locals)` for a method body
///
/// A method without code yields the slots its parameters need and an
/// empty stack.
pub fn compute_maxs(method: &MethodNode) -> Result<(u16, u16), VerifyError> {
    let key = method_key(method);
    let descriptor = method
        .method_descriptor()
        .map_err(|source| VerifyError::Descriptor {
            method: key.clone(),
            source,
        })?;

    let slots = descriptor.parameter_slots(method.is_static());
    if slots > MAX_PARAMETER_SLOTS {
        return Err(VerifyError::TooManyParameters { method: key, slots });
    }
    let param_slots = slots as u16;

    match &method.code {
        Some(code) => {
            let analysis = Analysis::new(&key, &descriptor, code)?;
            let max_stack = analysis.run()?;
            let extent = local_extent(code);
            let max_locals = u16::try_from(extent).map_err(|_| VerifyError::LocalOutOfRange {
                method: key.clone(),
                slot: extent,
            })?;
            Ok((max_stack, param_slots.max(max_locals)))
        }
        None => Ok((0, param_slots)),
    }
}

/// Recompute and store the maxima of a method body
pub fn update_maxs(method: &mut MethodNode) -> Result<(), VerifyError> {
    let (max_stack, max_locals) = compute_maxs(method)?;
    if let Some(code) = method.code.as_mut() {
        code.max_stack = max_stack;
        code.max_locals = max_locals;
    }
    Ok(())
}

fn method_key(method: &MethodNode) -> String {
    format!("{}{}", method.name, method.descriptor)
}

/// Highest local slot touched by the body, plus its width
fn local_extent(code: &Code) -> u32 {
    code.instructions
        .iter()
        .map(|insn| match insn {
            Insn::Var { opcode, slot } => {
                let wide = matches!(
                    opcode,
                    Opcode::Lload | Opcode::Dload | Opcode::Lstore | Opcode::Dstore
                );
                u32::from(*slot) + if wide { 2 } else { 1 }
            }
            Insn::Iinc { slot, .. } => u32::from(*slot) + 1,
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

/// Depth analysis over one body
struct Analysis<'a> {
    key: &'a str,
    ret: &'a Type,
    instructions: &'a [Insn],
    labels: FxHashMap<Label, usize>,
    effects: Vec<(u16, u16)>,
}

impl<'a> Analysis<'a> {
    fn new(key: &'a str, descriptor: &'a MethodDescriptor, code: &'a Code) -> Result<Self, VerifyError> {
        let instructions = code.instructions.as_slice();

        let mut labels = FxHashMap::default();
        for (index, insn) in instructions.iter().enumerate() {
            if let Insn::Label(label) = insn {
                if labels.insert(*label, index).is_some() {
                    return Err(VerifyError::DuplicateLabel {
                        method: key.to_string(),
                        label: label.0,
                    });
                }
            }
        }

        let effects = instructions
            .iter()
            .enumerate()
            .map(|(index, insn)| stack_effect(key, index, insn))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            key,
            ret: &descriptor.ret,
            instructions,
            labels,
            effects,
        })
    }

    fn target(&self, label: Label) -> Result<usize, VerifyError> {
        self.labels
            .get(&label)
            .copied()
            .ok_or_else(|| VerifyError::UnknownLabel {
                method: self.key.to_string(),
                label: label.0,
            })
    }

    fn run(&self) -> Result<u16, VerifyError> {
        let mut depths: Vec<Option<u16>> = vec![None; self.instructions.len()];
        let mut worklist = vec![(0usize, 0u16)];
        let mut max_stack = 0u16;

        while let Some((index, depth)) = worklist.pop() {
            if index >= self.instructions.len() {
                return Err(VerifyError::FallOffEnd {
                    method: self.key.to_string(),
                });
            }

            match depths[index] {
                Some(first) if first == depth => continue,
                Some(first) => {
                    return Err(VerifyError::InconsistentStack {
                        method: self.key.to_string(),
                        index,
                        first,
                        second: depth,
                    })
                }
                None => depths[index] = Some(depth),
            }

            let insn = &self.instructions[index];
            let (pops, pushes) = self.effects[index];
            if pops > depth {
                return Err(VerifyError::StackUnderflow {
                    method: self.key.to_string(),
                    index,
                });
            }
            let after = (depth - pops).saturating_add(pushes);
            max_stack = max_stack.max(after);

            let opcode = insn.opcode();
            if let Some(op) = opcode.filter(|op| op.is_return()) {
                if op != self.ret.return_opcode() {
                    return Err(VerifyError::MismatchedReturn {
                        method: self.key.to_string(),
                        index,
                        opcode: op,
                    });
                }
            }

            if let Insn::Jump { target, .. } = insn {
                worklist.push((self.target(*target)?, after));
            }
            if !opcode.map_or(false, Opcode::is_terminator) {
                worklist.push((index + 1, after));
            }
        }

        Ok(max_stack)
    }
}

/// Words popped and pushed by one instruction, checking its operand shape
fn stack_effect(key: &str, index: usize, insn: &Insn) -> Result<(u16, u16), VerifyError> {
    let mismatch = |opcode: Opcode| VerifyError::MismatchedOperand {
        method: key.to_string(),
        index,
        opcode,
    };
    let fixed = |opcode: Opcode, kind: OperandKind| {
        if opcode.operand_kind() != kind {
            return Err(mismatch(opcode));
        }
        opcode.stack_effect().ok_or_else(|| mismatch(opcode))
    };

    match insn {
        Insn::Label(_) => Ok((0, 0)),
        Insn::Simple(op) => fixed(*op, OperandKind::None),
        Insn::Int { opcode, .. } => fixed(*opcode, OperandKind::Int),
        Insn::Var { opcode, .. } => fixed(*opcode, OperandKind::Var),
        Insn::Iinc { .. } => Ok((0, 0)),
        Insn::Type { opcode, .. } => fixed(*opcode, OperandKind::Type),
        Insn::Jump { opcode, .. } => fixed(*opcode, OperandKind::Jump),
        Insn::Ldc(constant) => Ok((0, constant.size())),
        Insn::Field(field) => {
            if !field.opcode.is_field_access() {
                return Err(mismatch(field.opcode));
            }
            let size = Type::parse_value(&field.descriptor)
                .map_err(|source| VerifyError::Descriptor {
                    method: key.to_string(),
                    source,
                })?
                .size();
            Ok(match field.opcode {
                Opcode::Getstatic => (0, size),
                Opcode::Putstatic => (size, 0),
                Opcode::Getfield => (1, size),
                _ => (1 + size, 0),
            })
        }
        Insn::Method(call) => {
            if !call.opcode.is_invoke() {
                return Err(mismatch(call.opcode));
            }
            let descriptor =
                MethodDescriptor::parse(&call.descriptor).map_err(|source| VerifyError::Descriptor {
                    method: key.to_string(),
                    source,
                })?;
            let slots = descriptor.parameter_slots(call.is_static());
            if slots > MAX_PARAMETER_SLOTS {
                return Err(VerifyError::TooManyArguments {
                    method: key.to_string(),
                    index,
                    slots,
                });
            }
            Ok((slots as u16, descriptor.ret.size()))
        }
    }
}
