//! In-memory program image
//!
//! A [`ClassNode`] is the tree form of one type: its header, its fields and
//! its methods. Method bodies are flat instruction lists with symbolic
//! labels, so instructions can be inserted or replaced without fixing up
//! branch offsets.

use crate::access;
use crate::descriptor::{DescriptorError, MethodDescriptor, Type};
use crate::opcode::Opcode;
use serde::{Deserialize, Serialize};

/// Class-file major version for Java 8
pub const V1_8: u16 = 52;

/// Internal name of the root class
pub const OBJECT: &str = "java/lang/Object";

/// Name of instance initializers
pub const INIT: &str = "<init>";

/// Name of static initializers
pub const CLINIT: &str = "<clinit>";

/// One type in the program image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassNode {
    /// Class-file version
    pub version: u16,
    /// Access flags
    pub access: u16,
    /// Internal name, e.g. `com/example/Foo`
    pub name: String,
    /// Generic signature, if any
    pub signature: Option<String>,
    /// Superclass internal name; `None` only for the root class
    pub super_name: Option<String>,
    /// Implemented interfaces in declaration order
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldNode>,
    /// Declared methods
    pub methods: Vec<MethodNode>,
}

impl ClassNode {
    /// Create an empty class extending `java/lang/Object`
    pub fn new(version: u16, access: u16, name: impl Into<String>) -> Self {
        Self {
            version,
            access,
            name: name.into(),
            signature: None,
            super_name: Some(OBJECT.to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Check for the interface bit
    pub fn is_interface(&self) -> bool {
        access::is_interface(self.access)
    }

    /// Look up a field by name and descriptor
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldNode> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Look up a field mutably
    pub fn find_field_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut FieldNode> {
        self.fields
            .iter_mut()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Look up a method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Look up a method mutably
    pub fn find_method_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut MethodNode> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

/// A field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    /// Access flags
    pub access: u16,
    /// Simple name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Generic signature, if any
    pub signature: Option<String>,
    /// Constant initial value, static fields only
    pub value: Option<Constant>,
}

impl FieldNode {
    /// Create a field with no signature or initial value
    pub fn new(access: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            signature: None,
            value: None,
        }
    }

    /// Check for the static bit
    pub fn is_static(&self) -> bool {
        access::is_static(self.access)
    }

    /// Parsed field type
    pub fn field_type(&self) -> Result<Type, DescriptorError> {
        Type::parse_value(&self.descriptor)
    }
}

/// A method declaration, with its body when it has one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodNode {
    /// Access flags
    pub access: u16,
    /// Simple name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Generic signature, if any
    pub signature: Option<String>,
    /// Declared checked exceptions
    pub exceptions: Vec<String>,
    /// Body; `None` for abstract and native methods
    pub code: Option<Code>,
}

impl MethodNode {
    /// Create a method without a body
    pub fn new(access: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            signature: None,
            exceptions: Vec::new(),
            code: None,
        }
    }

    /// Attach a body
    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    /// Check for the static bit
    pub fn is_static(&self) -> bool {
        access::is_static(self.access)
    }

    /// Parsed descriptor
    pub fn method_descriptor(&self) -> Result<MethodDescriptor, DescriptorError> {
        MethodDescriptor::parse(&self.descriptor)
    }
}

/// A method body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Code {
    /// Maximum operand stack depth in words
    pub max_stack: u16,
    /// Number of local slots, including the receiver and parameters
    pub max_locals: u16,
    /// Instruction list
    pub instructions: Vec<Insn>,
}

/// A loadable constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `java/lang/String`
    String(String),
    /// A class literal, by internal name
    Class(String),
}

impl Constant {
    /// Stack words the constant occupies once loaded
    pub fn size(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// A branch target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u32);

/// A field reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldInsn {
    /// One of `getstatic`, `putstatic`, `getfield`, `putfield`
    pub opcode: Opcode,
    /// Declaring class
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

impl FieldInsn {
    /// Create a field reference
    pub fn new(
        opcode: Opcode,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            opcode,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Check for `getstatic` / `putstatic`
    pub fn is_static(&self) -> bool {
        matches!(self.opcode, Opcode::Getstatic | Opcode::Putstatic)
    }

    /// Check for `putstatic` / `putfield`
    pub fn is_put(&self) -> bool {
        matches!(self.opcode, Opcode::Putstatic | Opcode::Putfield)
    }
}

/// A method reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodInsn {
    /// One of the four invoke opcodes
    pub opcode: Opcode,
    /// Class or interface the reference resolves through
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Whether `owner` is an interface
    pub interface: bool,
}

impl MethodInsn {
    /// Create a method reference
    pub fn new(
        opcode: Opcode,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        interface: bool,
    ) -> Self {
        Self {
            opcode,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            interface,
        }
    }

    /// Check for `invokestatic`
    pub fn is_static(&self) -> bool {
        self.opcode == Opcode::Invokestatic
    }
}

/// One instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Insn {
    /// Operand-free instruction
    Simple(Opcode),
    /// `bipush`, `sipush`, `newarray`
    Int {
        /// Opcode
        opcode: Opcode,
        /// Immediate value
        operand: i32,
    },
    /// Local load or store
    Var {
        /// Opcode
        opcode: Opcode,
        /// Local slot
        slot: u16,
    },
    /// `iinc`
    Iinc {
        /// Local slot
        slot: u16,
        /// Increment
        delta: i16,
    },
    /// `new`, `anewarray`, `checkcast`, `instanceof`
    Type {
        /// Opcode
        opcode: Opcode,
        /// Internal name
        type_name: String,
    },
    /// `ldc`
    Ldc(Constant),
    /// Field access
    Field(FieldInsn),
    /// Invocation
    Method(MethodInsn),
    /// Branch
    Jump {
        /// Opcode
        opcode: Opcode,
        /// Target
        target: Label,
    },
    /// Position marker; not an executable instruction
    Label(Label),
}

impl Insn {
    /// Opcode of this instruction, `None` for labels
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Insn::Simple(op) => Some(*op),
            Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Jump { opcode, .. } => Some(*opcode),
            Insn::Iinc { .. } => Some(Opcode::Iinc),
            Insn::Ldc(_) => Some(Opcode::Ldc),
            Insn::Field(f) => Some(f.opcode),
            Insn::Method(m) => Some(m.opcode),
            Insn::Label(_) => None,
        }
    }
}

impl From<FieldInsn> for Insn {
    fn from(insn: FieldInsn) -> Self {
        Insn::Field(insn)
    }
}

impl From<MethodInsn> for Insn {
    fn from(insn: MethodInsn) -> Self {
        Insn::Method(insn)
    }
}
