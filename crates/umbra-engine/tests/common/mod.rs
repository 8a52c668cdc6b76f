//! Test interpreter
//!
//! Runs method bodies of a program image so tests can compare what an image
//! computes before and after the engine has transformed it. It covers the
//! instructions the tests emit and checks declared stack and local limits
//! on every frame.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use umbra_bytecode::{
    ClassNode, Code, Constant, Insn, Label, MethodDescriptor, MethodNode, Opcode, Type, ValueKind,
    INIT, OBJECT,
};

const MAX_DEPTH: usize = 256;

/// A runtime value; wide values take one entry but count as two words
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<usize>),
    Str(String),
}

impl Value {
    pub fn zero(ty: &Type) -> Value {
        match ty.kind() {
            ValueKind::Int => Value::Int(0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Reference | ValueKind::Void => Value::Ref(None),
        }
    }

    fn words(&self) -> usize {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    fn int(&self) -> Result<i32, String> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(format!("expected int, found {:?}", other)),
        }
    }

    fn long(&self) -> Result<i64, String> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(format!("expected long, found {:?}", other)),
        }
    }

    fn double(&self) -> Result<f64, String> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(format!("expected double, found {:?}", other)),
        }
    }

    fn reference(&self) -> Result<Option<usize>, String> {
        match self {
            Value::Ref(r) => Ok(*r),
            other => Err(format!("expected reference, found {:?}", other)),
        }
    }
}

struct Object {
    class: String,
    fields: HashMap<(String, String), Value>,
}

/// Interpreter over a fixed set of classes
pub struct Machine {
    classes: HashMap<String, ClassNode>,
    heap: Vec<Object>,
    statics: HashMap<(String, String, String), Value>,
    depth: usize,
}

impl Machine {
    pub fn new(classes: impl IntoIterator<Item = ClassNode>) -> Self {
        Self {
            classes: classes.into_iter().map(|c| (c.name.clone(), c)).collect(),
            heap: Vec::new(),
            statics: HashMap::new(),
            depth: 0,
        }
    }

    /// Allocate without running a constructor
    pub fn allocate(&mut self, class: &str) -> Value {
        self.heap.push(Object {
            class: class.to_string(),
            fields: HashMap::new(),
        });
        Value::Ref(Some(self.heap.len() - 1))
    }

    /// Allocate and run the no-argument constructor
    pub fn instantiate(&mut self, class: &str) -> Result<Value, String> {
        let object = self.allocate(class);
        self.invoke(Opcode::Invokespecial, class, INIT, "()V", vec![object.clone()])?;
        Ok(object)
    }

    pub fn field(&self, object: &Value, name: &str, descriptor: &str) -> Result<Value, String> {
        let index = object.reference()?.ok_or("null object")?;
        let ty = Type::parse_value(descriptor).map_err(|e| e.to_string())?;
        Ok(self.heap[index]
            .fields
            .get(&(name.to_string(), descriptor.to_string()))
            .cloned()
            .unwrap_or_else(|| Value::zero(&ty)))
    }

    pub fn set_field(&mut self, object: &Value, name: &str, descriptor: &str, value: Value) {
        let index = object.reference().unwrap().unwrap();
        self.heap[index]
            .fields
            .insert((name.to_string(), descriptor.to_string()), value);
    }

    pub fn static_field(&self, owner: &str, name: &str, descriptor: &str) -> Value {
        let owner = self.field_owner(owner, name, descriptor);
        let ty = Type::parse_value(descriptor).unwrap();
        self.statics
            .get(&(owner, name.to_string(), descriptor.to_string()))
            .cloned()
            .unwrap_or_else(|| Value::zero(&ty))
    }

    pub fn invoke_static(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, String> {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor, args)
    }

    pub fn invoke_virtual(
        &mut self,
        receiver: &Value,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let mut all = vec![receiver.clone()];
        all.extend(args);
        let owner = self.class_of(receiver)?;
        self.invoke(Opcode::Invokevirtual, &owner, name, descriptor, all)
    }

    pub fn class_of(&self, object: &Value) -> Result<String, String> {
        let index = object.reference()?.ok_or("null receiver")?;
        Ok(self.heap[index].class.clone())
    }

    /// Call a method; `args` includes the receiver for non-static calls
    pub fn invoke(
        &mut self,
        opcode: Opcode,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let method = match opcode {
            Opcode::Invokestatic => self.find_in_chain(owner, name, descriptor, false),
            Opcode::Invokespecial => {
                if owner == OBJECT && name == INIT {
                    return Ok(None);
                }
                self.find_in_chain(owner, name, descriptor, true)
            }
            Opcode::Invokevirtual | Opcode::Invokeinterface => {
                let receiver = args.first().ok_or("missing receiver")?;
                let class = self.class_of(receiver)?;
                self.find_virtual(&class, name, descriptor)
            }
            other => return Err(format!("{} is not an invocation", other)),
        };
        let method = method.ok_or_else(|| format!("no method {}.{}{}", owner, name, descriptor))?;

        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("call depth exceeded".to_string());
        }
        let result = self.execute(&method, args);
        self.depth -= 1;
        result
    }

    fn find_in_chain(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        concrete: bool,
    ) -> Option<MethodNode> {
        let mut current = Some(owner.to_string());
        while let Some(class_name) = current {
            let class = self.classes.get(&class_name)?;
            if let Some(method) = class.find_method(name, descriptor) {
                if !concrete || method.code.is_some() {
                    return Some(method.clone());
                }
            }
            current = class.super_name.clone();
        }
        None
    }

    fn find_virtual(&self, class: &str, name: &str, descriptor: &str) -> Option<MethodNode> {
        if let Some(method) = self.find_in_chain(class, name, descriptor, true) {
            return Some(method);
        }
        // Default methods of every superinterface, nearest first.
        self.supertypes(class)
            .into_iter()
            .filter_map(|t| self.classes.get(&t))
            .filter(|c| c.is_interface())
            .find_map(|c| {
                c.find_method(name, descriptor)
                    .filter(|m| m.code.is_some() && !m.is_static())
                    .cloned()
            })
    }

    /// `class` and all its supertypes, breadth first
    fn supertypes(&self, class: &str) -> Vec<String> {
        let mut seen = Vec::new();
        let mut queue = VecDeque::from([class.to_string()]);
        while let Some(next) = queue.pop_front() {
            if seen.contains(&next) {
                continue;
            }
            if let Some(node) = self.classes.get(&next) {
                queue.extend(node.super_name.iter().cloned());
                queue.extend(node.interfaces.iter().cloned());
            }
            seen.push(next);
        }
        seen
    }

    fn is_subtype(&self, class: &str, target: &str) -> bool {
        target == OBJECT || self.supertypes(class).iter().any(|t| t == target)
    }

    fn field_owner(&self, owner: &str, name: &str, descriptor: &str) -> String {
        let mut current = Some(owner.to_string());
        while let Some(class_name) = current {
            match self.classes.get(&class_name) {
                Some(class) if class.find_field(name, descriptor).is_some() => return class_name,
                Some(class) => current = class.super_name.clone(),
                None => break,
            }
        }
        owner.to_string()
    }

    fn execute(&mut self, method: &MethodNode, args: Vec<Value>) -> Result<Option<Value>, String> {
        let code: &Code = method
            .code
            .as_ref()
            .ok_or_else(|| format!("{} has no code", method.name))?;
        let frame_name = format!("{}{}", method.name, method.descriptor);

        let mut locals: Vec<Option<Value>> = vec![None; code.max_locals as usize];
        let mut slot = 0;
        for arg in args {
            let words = arg.words();
            if slot + words > locals.len() {
                return Err(format!("{}: arguments exceed max_locals", frame_name));
            }
            locals[slot] = Some(arg);
            slot += words;
        }

        let labels: HashMap<Label, usize> = code
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Insn::Label(label) => Some((*label, i)),
                _ => None,
            })
            .collect();

        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;
        loop {
            let insn = code
                .instructions
                .get(pc)
                .ok_or_else(|| format!("{}: fell off the end", frame_name))?;
            pc += 1;

            match insn {
                Insn::Label(_) => {}
                Insn::Simple(op) => {
                    if let Some(result) = self.simple(*op, &mut stack)? {
                        return Ok(result);
                    }
                }
                Insn::Int { operand, .. } => stack.push(Value::Int(*operand)),
                Insn::Var { opcode, slot } => {
                    let slot = *slot as usize;
                    if slot >= locals.len() {
                        return Err(format!("{}: local {} outside max_locals", frame_name, slot));
                    }
                    match opcode {
                        Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload
                        | Opcode::Aload => {
                            let value = locals[slot]
                                .clone()
                                .ok_or_else(|| format!("{}: local {} unset", frame_name, slot))?;
                            stack.push(value);
                        }
                        _ => {
                            let value = pop(&mut stack)?;
                            if slot + value.words() > locals.len() {
                                return Err(format!("{}: wide store outside max_locals", frame_name));
                            }
                            locals[slot] = Some(value);
                        }
                    }
                }
                Insn::Iinc { slot, delta } => {
                    let slot = *slot as usize;
                    let value = locals[slot].as_ref().ok_or("iinc on unset local")?.int()?;
                    locals[slot] = Some(Value::Int(value.wrapping_add(i32::from(*delta))));
                }
                Insn::Type { opcode, type_name } => match opcode {
                    Opcode::New => {
                        let object = self.allocate(type_name);
                        stack.push(object);
                    }
                    Opcode::Checkcast => {
                        let top = stack.last().ok_or("checkcast on empty stack")?;
                        if let Some(index) = top.reference()? {
                            let class = self.heap[index].class.clone();
                            if !self.is_subtype(&class, type_name) {
                                return Err(format!("cannot cast {} to {}", class, type_name));
                            }
                        }
                    }
                    Opcode::Instanceof => {
                        let value = pop(&mut stack)?.reference()?;
                        let result = match value {
                            Some(index) => {
                                let class = self.heap[index].class.clone();
                                self.is_subtype(&class, type_name)
                            }
                            None => false,
                        };
                        stack.push(Value::Int(i32::from(result)));
                    }
                    other => return Err(format!("unsupported {}", other)),
                },
                Insn::Ldc(constant) => stack.push(match constant {
                    Constant::Int(v) => Value::Int(*v),
                    Constant::Long(v) => Value::Long(*v),
                    Constant::Float(v) => Value::Float(*v),
                    Constant::Double(v) => Value::Double(*v),
                    Constant::String(s) => Value::Str(s.clone()),
                    Constant::Class(c) => return Err(format!("class literal {} unsupported", c)),
                }),
                Insn::Field(field) => {
                    let ty = Type::parse_value(&field.descriptor).map_err(|e| e.to_string())?;
                    let key = (field.name.clone(), field.descriptor.clone());
                    match field.opcode {
                        Opcode::Getfield => {
                            let object = pop(&mut stack)?;
                            let value = self.field(&object, &field.name, &field.descriptor)?;
                            stack.push(value);
                        }
                        Opcode::Putfield => {
                            let value = pop(&mut stack)?;
                            let index = pop(&mut stack)?.reference()?.ok_or("null putfield")?;
                            self.heap[index].fields.insert(key, value);
                        }
                        Opcode::Getstatic => {
                            let owner = self.field_owner(&field.owner, &field.name, &field.descriptor);
                            let value = self
                                .statics
                                .get(&(owner, key.0, key.1))
                                .cloned()
                                .unwrap_or_else(|| Value::zero(&ty));
                            stack.push(value);
                        }
                        _ => {
                            let owner = self.field_owner(&field.owner, &field.name, &field.descriptor);
                            let value = pop(&mut stack)?;
                            self.statics.insert((owner, key.0, key.1), value);
                        }
                    }
                }
                Insn::Method(call) => {
                    let descriptor =
                        MethodDescriptor::parse(&call.descriptor).map_err(|e| e.to_string())?;
                    let mut args = Vec::new();
                    for _ in 0..descriptor.params.len() {
                        args.push(pop(&mut stack)?);
                    }
                    if call.opcode != Opcode::Invokestatic {
                        args.push(pop(&mut stack)?);
                    }
                    args.reverse();
                    let result =
                        self.invoke(call.opcode, &call.owner, &call.name, &call.descriptor, args)?;
                    if let Some(value) = result {
                        stack.push(value);
                    }
                }
                Insn::Jump { opcode, target } => {
                    let taken = match opcode {
                        Opcode::Goto => true,
                        Opcode::Ifeq => pop(&mut stack)?.int()? == 0,
                        Opcode::Ifne => pop(&mut stack)?.int()? != 0,
                        Opcode::Iflt => pop(&mut stack)?.int()? < 0,
                        Opcode::Ifge => pop(&mut stack)?.int()? >= 0,
                        Opcode::Ifgt => pop(&mut stack)?.int()? > 0,
                        Opcode::Ifle => pop(&mut stack)?.int()? <= 0,
                        Opcode::Ifnull => pop(&mut stack)?.reference()?.is_none(),
                        Opcode::Ifnonnull => pop(&mut stack)?.reference()?.is_some(),
                        _ => {
                            let right = pop(&mut stack)?.int()?;
                            let left = pop(&mut stack)?.int()?;
                            match opcode {
                                Opcode::IfIcmpeq => left == right,
                                Opcode::IfIcmpne => left != right,
                                Opcode::IfIcmplt => left < right,
                                Opcode::IfIcmpge => left >= right,
                                Opcode::IfIcmpgt => left > right,
                                Opcode::IfIcmple => left <= right,
                                other => return Err(format!("unsupported {}", other)),
                            }
                        }
                    };
                    if taken {
                        pc = *labels
                            .get(target)
                            .ok_or_else(|| format!("{}: unknown label", frame_name))?;
                    }
                }
            }

            let words: usize = stack.iter().map(Value::words).sum();
            if words > code.max_stack as usize {
                return Err(format!(
                    "{}: stack needs {} words, declares {}",
                    frame_name, words, code.max_stack
                ));
            }
        }
    }

    /// Returns `Some` when the instruction returns from the frame
    fn simple(
        &mut self,
        op: Opcode,
        stack: &mut Vec<Value>,
    ) -> Result<Option<Option<Value>>, String> {
        match op {
            Opcode::Nop => {}
            Opcode::AconstNull => stack.push(Value::Ref(None)),
            Opcode::IconstM1 => stack.push(Value::Int(-1)),
            Opcode::Iconst0 => stack.push(Value::Int(0)),
            Opcode::Iconst1 => stack.push(Value::Int(1)),
            Opcode::Iconst2 => stack.push(Value::Int(2)),
            Opcode::Iconst3 => stack.push(Value::Int(3)),
            Opcode::Iconst4 => stack.push(Value::Int(4)),
            Opcode::Iconst5 => stack.push(Value::Int(5)),
            Opcode::Lconst0 => stack.push(Value::Long(0)),
            Opcode::Lconst1 => stack.push(Value::Long(1)),
            Opcode::Dconst0 => stack.push(Value::Double(0.0)),
            Opcode::Dconst1 => stack.push(Value::Double(1.0)),
            Opcode::Iadd | Opcode::Isub | Opcode::Imul => {
                let right = pop(stack)?.int()?;
                let left = pop(stack)?.int()?;
                stack.push(Value::Int(match op {
                    Opcode::Iadd => left.wrapping_add(right),
                    Opcode::Isub => left.wrapping_sub(right),
                    _ => left.wrapping_mul(right),
                }));
            }
            Opcode::Ladd | Opcode::Lsub | Opcode::Lmul => {
                let right = pop(stack)?.long()?;
                let left = pop(stack)?.long()?;
                stack.push(Value::Long(match op {
                    Opcode::Ladd => left.wrapping_add(right),
                    Opcode::Lsub => left.wrapping_sub(right),
                    _ => left.wrapping_mul(right),
                }));
            }
            Opcode::Dadd | Opcode::Dmul => {
                let right = pop(stack)?.double()?;
                let left = pop(stack)?.double()?;
                stack.push(Value::Double(if op == Opcode::Dadd {
                    left + right
                } else {
                    left * right
                }));
            }
            Opcode::I2l => {
                let v = pop(stack)?.int()?;
                stack.push(Value::Long(i64::from(v)));
            }
            Opcode::L2i => {
                let v = pop(stack)?.long()?;
                stack.push(Value::Int(v as i32));
            }
            Opcode::I2d => {
                let v = pop(stack)?.int()?;
                stack.push(Value::Double(f64::from(v)));
            }
            Opcode::Pop => {
                pop(stack)?;
            }
            Opcode::Pop2 => {
                if pop(stack)?.words() == 1 {
                    pop(stack)?;
                }
            }
            Opcode::Dup => {
                let top = stack.last().cloned().ok_or("dup on empty stack")?;
                stack.push(top);
            }
            Opcode::Swap => {
                let a = pop(stack)?;
                let b = pop(stack)?;
                stack.push(a);
                stack.push(b);
            }
            Opcode::Return => return Ok(Some(None)),
            Opcode::Ireturn
            | Opcode::Lreturn
            | Opcode::Freturn
            | Opcode::Dreturn
            | Opcode::Areturn => return Ok(Some(Some(pop(stack)?))),
            other => return Err(format!("unsupported {}", other)),
        }
        Ok(None)
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, String> {
    stack.pop().ok_or_else(|| "stack underflow".to_string())
}

// ===== Image builders =====

/// Method with a hand-written body and its computed maxima
pub fn method(access: u16, name: &str, descriptor: &str, instructions: Vec<Insn>) -> MethodNode {
    let mut method = MethodNode::new(access, name, descriptor).with_code(Code {
        max_stack: 0,
        max_locals: 0,
        instructions,
    });
    umbra_bytecode::update_maxs(&mut method).expect("test body is well formed");
    method
}

/// `super()` constructor for a class extending `super_name`
pub fn constructor(super_name: &str, extra: Vec<Insn>) -> MethodNode {
    let mut instructions = vec![
        Insn::Var {
            opcode: Opcode::Aload,
            slot: 0,
        },
        umbra_bytecode::MethodInsn::new(Opcode::Invokespecial, super_name, INIT, "()V", false)
            .into(),
    ];
    instructions.extend(extra);
    instructions.push(Insn::Simple(Opcode::Return));
    method(umbra_bytecode::access::ACC_PUBLIC, INIT, "()V", instructions)
}

pub fn aload(slot: u16) -> Insn {
    Insn::Var {
        opcode: Opcode::Aload,
        slot,
    }
}

pub fn iload(slot: u16) -> Insn {
    Insn::Var {
        opcode: Opcode::Iload,
        slot,
    }
}

pub fn lload(slot: u16) -> Insn {
    Insn::Var {
        opcode: Opcode::Lload,
        slot,
    }
}

pub fn int(value: i32) -> Insn {
    Insn::Int {
        opcode: Opcode::Bipush,
        operand: value,
    }
}

pub fn op(opcode: Opcode) -> Insn {
    Insn::Simple(opcode)
}

pub fn field(opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> Insn {
    umbra_bytecode::FieldInsn::new(opcode, owner, name, descriptor).into()
}

pub fn call(opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> Insn {
    umbra_bytecode::MethodInsn::new(opcode, owner, name, descriptor, false).into()
}
