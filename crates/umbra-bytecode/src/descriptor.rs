//! Field and method descriptors
//!
//! Descriptors are the symbolic type encoding used by field and method
//! references: `I`, `J`, `Ljava/lang/String;`, `[[D`, `(IJ)V`. Values of
//! type `long` and `double` occupy two local slots and two operand-stack
//! words; every other non-void type occupies one.

use crate::opcode::Opcode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Most local slots a method's receiver and parameters may occupy
pub const MAX_PARAMETER_SLOTS: u32 = 255;

/// Descriptor parse errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// Nothing to parse
    #[error("Empty descriptor")]
    Empty,

    /// Unexpected character
    #[error("Invalid descriptor {descriptor:?}: unexpected {found:?} at offset {offset}")]
    UnexpectedChar {
        /// Full descriptor text
        descriptor: String,
        /// Offending character
        found: char,
        /// Byte offset of the character
        offset: usize,
    },

    /// Descriptor ended inside a type
    #[error("Invalid descriptor {0:?}: unexpected end")]
    UnexpectedEnd(String),

    /// Characters left over after a complete type
    #[error("Invalid descriptor {0:?}: trailing characters")]
    TrailingInput(String),

    /// `V` used where a value type is required
    #[error("Invalid descriptor {0:?}: void is only valid as a return type")]
    VoidValue(String),
}

/// A value or return type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// `V`
    Void,
    /// `Z`
    Boolean,
    /// `C`
    Char,
    /// `B`
    Byte,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `F`
    Float,
    /// `J`
    Long,
    /// `D`
    Double,
    /// `L<internal name>;`
    Object(String),
    /// `[<element>`
    Array(Box<Type>),
}

/// Computational category of a value on the operand stack
///
/// Two types with the same kind are interchangeable as far as loads,
/// stores and returns are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// No value
    Void,
    /// `boolean`, `byte`, `char`, `short`, `int`
    Int,
    /// `float`
    Float,
    /// `long`
    Long,
    /// `double`
    Double,
    /// Objects and arrays
    Reference,
}

impl Type {
    /// Object type from an internal name such as `java/lang/Object`
    pub fn object(internal_name: impl Into<String>) -> Self {
        Type::Object(internal_name.into())
    }

    /// Parse a complete field descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        if descriptor.is_empty() {
            return Err(DescriptorError::Empty);
        }

        let mut cursor = Cursor::new(descriptor);
        let ty = cursor.read_type()?;
        if !cursor.at_end() {
            return Err(DescriptorError::TrailingInput(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Parse a field descriptor, rejecting `V`
    pub fn parse_value(descriptor: &str) -> Result<Self, DescriptorError> {
        let ty = Self::parse(descriptor)?;
        if ty == Type::Void {
            return Err(DescriptorError::VoidValue(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Render this type as a descriptor
    pub fn descriptor(&self) -> String {
        self.to_string()
    }

    /// Number of local slots / stack words a value of this type occupies
    pub fn size(&self) -> u16 {
        match self {
            Type::Void => 0,
            Type::Long | Type::Double => 2,
            _ => 1,
        }
    }

    /// Check for object and array types
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Object(_) | Type::Array(_))
    }

    /// Computational category of this type
    pub fn kind(&self) -> ValueKind {
        match self {
            Type::Void => ValueKind::Void,
            Type::Boolean | Type::Char | Type::Byte | Type::Short | Type::Int => ValueKind::Int,
            Type::Float => ValueKind::Float,
            Type::Long => ValueKind::Long,
            Type::Double => ValueKind::Double,
            Type::Object(_) | Type::Array(_) => ValueKind::Reference,
        }
    }

    /// Local variable load matching this type, `None` for void
    pub fn load_opcode(&self) -> Option<Opcode> {
        match self.kind() {
            ValueKind::Void => None,
            ValueKind::Int => Some(Opcode::Iload),
            ValueKind::Float => Some(Opcode::Fload),
            ValueKind::Long => Some(Opcode::Lload),
            ValueKind::Double => Some(Opcode::Dload),
            ValueKind::Reference => Some(Opcode::Aload),
        }
    }

    /// Local variable store matching this type, `None` for void
    pub fn store_opcode(&self) -> Option<Opcode> {
        match self.kind() {
            ValueKind::Void => None,
            ValueKind::Int => Some(Opcode::Istore),
            ValueKind::Float => Some(Opcode::Fstore),
            ValueKind::Long => Some(Opcode::Lstore),
            ValueKind::Double => Some(Opcode::Dstore),
            ValueKind::Reference => Some(Opcode::Astore),
        }
    }

    /// Return instruction matching this type
    pub fn return_opcode(&self) -> Opcode {
        match self.kind() {
            ValueKind::Void => Opcode::Return,
            ValueKind::Int => Opcode::Ireturn,
            ValueKind::Float => Opcode::Freturn,
            ValueKind::Long => Opcode::Lreturn,
            ValueKind::Double => Opcode::Dreturn,
            ValueKind::Reference => Opcode::Areturn,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("V"),
            Type::Boolean => f.write_str("Z"),
            Type::Char => f.write_str("C"),
            Type::Byte => f.write_str("B"),
            Type::Short => f.write_str("S"),
            Type::Int => f.write_str("I"),
            Type::Float => f.write_str("F"),
            Type::Long => f.write_str("J"),
            Type::Double => f.write_str("D"),
            Type::Object(name) => write!(f, "L{};", name),
            Type::Array(element) => write!(f, "[{}", element),
        }
    }
}

impl FromStr for Type {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<Type>,
    /// Return type, `Type::Void` for none
    pub ret: Type,
}

impl MethodDescriptor {
    /// Create a descriptor from parts
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }

    /// `()T`
    pub fn getter(ty: Type) -> Self {
        Self::new(Vec::new(), ty)
    }

    /// `(T)V`
    pub fn setter(ty: Type) -> Self {
        Self::new(vec![ty], Type::Void)
    }

    /// Parse a complete method descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        if descriptor.is_empty() {
            return Err(DescriptorError::Empty);
        }

        let mut cursor = Cursor::new(descriptor);
        cursor.expect('(')?;

        let mut params = Vec::new();
        while cursor.peek() != Some(')') {
            let ty = cursor.read_type()?;
            if ty == Type::Void {
                return Err(DescriptorError::VoidValue(descriptor.to_string()));
            }
            params.push(ty);
        }
        cursor.expect(')')?;

        let ret = cursor.read_type()?;
        if !cursor.at_end() {
            return Err(DescriptorError::TrailingInput(descriptor.to_string()));
        }

        Ok(Self { params, ret })
    }

    /// Total slots taken by the parameters, excluding any receiver
    pub fn argument_slots(&self) -> u32 {
        self.params
            .iter()
            .fold(0u32, |slots, param| slots.saturating_add(u32::from(param.size())))
    }

    /// Slots taken by the parameters plus the receiver of an instance method
    pub fn parameter_slots(&self, is_static: bool) -> u32 {
        self.argument_slots().saturating_add(u32::from(!is_static))
    }

    /// Check whether a method of this shape fits the parameter slot limit
    pub fn fits_parameter_slots(&self, is_static: bool) -> bool {
        self.parameter_slots(is_static) <= MAX_PARAMETER_SLOTS
    }

    /// Render as a descriptor string
    pub fn descriptor(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, "){}", self.ret)
    }
}

impl FromStr for MethodDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Descriptors travel as their symbolic string form.

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Type::parse(&text).map_err(serde::de::Error::custom)
    }
}

impl Serialize for MethodDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MethodDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        MethodDescriptor::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Byte cursor over a descriptor
struct Cursor<'a> {
    text: &'a str,
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, offset: 0 }
    }

    fn at_end(&self) -> bool {
        self.offset >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.text[self.offset..].chars().next()
    }

    fn next(&mut self) -> Result<char, DescriptorError> {
        let c = self
            .peek()
            .ok_or_else(|| DescriptorError::UnexpectedEnd(self.text.to_string()))?;
        self.offset += c.len_utf8();
        Ok(c)
    }

    fn expect(&mut self, expected: char) -> Result<(), DescriptorError> {
        let offset = self.offset;
        let found = self.next()?;
        if found != expected {
            return Err(DescriptorError::UnexpectedChar {
                descriptor: self.text.to_string(),
                found,
                offset,
            });
        }
        Ok(())
    }

    fn read_type(&mut self) -> Result<Type, DescriptorError> {
        let offset = self.offset;
        let ty = match self.next()? {
            'V' => Type::Void,
            'Z' => Type::Boolean,
            'C' => Type::Char,
            'B' => Type::Byte,
            'S' => Type::Short,
            'I' => Type::Int,
            'F' => Type::Float,
            'J' => Type::Long,
            'D' => Type::Double,
            'L' => {
                let rest = &self.text[self.offset..];
                let end = rest
                    .find(';')
                    .ok_or_else(|| DescriptorError::UnexpectedEnd(self.text.to_string()))?;
                if end == 0 {
                    return Err(DescriptorError::UnexpectedChar {
                        descriptor: self.text.to_string(),
                        found: ';',
                        offset: self.offset,
                    });
                }
                let name = rest[..end].to_string();
                self.offset += end + 1;
                Type::Object(name)
            }
            '[' => {
                let element = self.read_type()?;
                if element == Type::Void {
                    return Err(DescriptorError::VoidValue(self.text.to_string()));
                }
                Type::Array(Box::new(element))
            }
            found => {
                return Err(DescriptorError::UnexpectedChar {
                    descriptor: self.text.to_string(),
                    found,
                    offset,
                })
            }
        };
        Ok(ty)
    }
}
