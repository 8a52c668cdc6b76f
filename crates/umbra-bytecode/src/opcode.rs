//! Instruction opcodes
//!
//! The instruction set follows the JVM class-file encoding: every opcode
//! carries its real byte value so a host encoder can write it out unchanged.
//! Opcodes that only exist as compact encodings of a generic form
//! (`iload_0`, `ldc_w`, `wide`, ...) are not modelled; the tree form always
//! uses the generic instruction and leaves the short form to the encoder.
//!
//! Opcodes are organized into categories:
//! - 0x00-0x14: Constants
//! - 0x15-0x56: Local variables and array elements
//! - 0x57-0x5F: Operand stack manipulation
//! - 0x60-0x93: Arithmetic, logic and conversions
//! - 0x94-0xA7: Comparisons and branches
//! - 0xAC-0xB1: Returns
//! - 0xB2-0xB9: Field access and invocation
//! - 0xBB-0xC7: Objects, arrays, monitors and null branches

use serde::{Deserialize, Serialize};

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $value:literal => $name:literal, )*) => {
        /// Instruction opcode
        ///
        /// Discriminants are the class-file byte values.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Opcode {
            $( $(#[$doc])* $variant = $value, )*
        }

        impl Opcode {
            /// Convert a byte to an opcode
            ///
            /// Returns `None` for bytes that are not modelled.
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $( $value => Some(Self::$variant), )*
                    _ => None,
                }
            }

            /// Get the mnemonic of this opcode
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }
        }
    };
}

opcodes! {
    // ===== Constants =====
    /// No operation
    Nop = 0x00 => "nop",
    /// Push null
    AconstNull = 0x01 => "aconst_null",
    /// Push int -1
    IconstM1 = 0x02 => "iconst_m1",
    /// Push int 0
    Iconst0 = 0x03 => "iconst_0",
    /// Push int 1
    Iconst1 = 0x04 => "iconst_1",
    /// Push int 2
    Iconst2 = 0x05 => "iconst_2",
    /// Push int 3
    Iconst3 = 0x06 => "iconst_3",
    /// Push int 4
    Iconst4 = 0x07 => "iconst_4",
    /// Push int 5
    Iconst5 = 0x08 => "iconst_5",
    /// Push long 0
    Lconst0 = 0x09 => "lconst_0",
    /// Push long 1
    Lconst1 = 0x0A => "lconst_1",
    /// Push float 0
    Fconst0 = 0x0B => "fconst_0",
    /// Push float 1
    Fconst1 = 0x0C => "fconst_1",
    /// Push float 2
    Fconst2 = 0x0D => "fconst_2",
    /// Push double 0
    Dconst0 = 0x0E => "dconst_0",
    /// Push double 1
    Dconst1 = 0x0F => "dconst_1",
    /// Push sign-extended byte (operand: i8)
    Bipush = 0x10 => "bipush",
    /// Push sign-extended short (operand: i16)
    Sipush = 0x11 => "sipush",
    /// Push constant pool entry (operand: constant)
    Ldc = 0x12 => "ldc",

    // ===== Local Variables =====
    /// Load int local (operand: slot)
    Iload = 0x15 => "iload",
    /// Load long local (operand: slot)
    Lload = 0x16 => "lload",
    /// Load float local (operand: slot)
    Fload = 0x17 => "fload",
    /// Load double local (operand: slot)
    Dload = 0x18 => "dload",
    /// Load reference local (operand: slot)
    Aload = 0x19 => "aload",
    /// Load int array element
    Iaload = 0x2E => "iaload",
    /// Load long array element
    Laload = 0x2F => "laload",
    /// Load float array element
    Faload = 0x30 => "faload",
    /// Load double array element
    Daload = 0x31 => "daload",
    /// Load reference array element
    Aaload = 0x32 => "aaload",
    /// Load byte or boolean array element
    Baload = 0x33 => "baload",
    /// Load char array element
    Caload = 0x34 => "caload",
    /// Load short array element
    Saload = 0x35 => "saload",
    /// Store int local (operand: slot)
    Istore = 0x36 => "istore",
    /// Store long local (operand: slot)
    Lstore = 0x37 => "lstore",
    /// Store float local (operand: slot)
    Fstore = 0x38 => "fstore",
    /// Store double local (operand: slot)
    Dstore = 0x39 => "dstore",
    /// Store reference local (operand: slot)
    Astore = 0x3A => "astore",
    /// Store int array element
    Iastore = 0x4F => "iastore",
    /// Store long array element
    Lastore = 0x50 => "lastore",
    /// Store float array element
    Fastore = 0x51 => "fastore",
    /// Store double array element
    Dastore = 0x52 => "dastore",
    /// Store reference array element
    Aastore = 0x53 => "aastore",
    /// Store byte or boolean array element
    Bastore = 0x54 => "bastore",
    /// Store char array element
    Castore = 0x55 => "castore",
    /// Store short array element
    Sastore = 0x56 => "sastore",

    // ===== Stack Manipulation =====
    /// Pop one word
    Pop = 0x57 => "pop",
    /// Pop two words
    Pop2 = 0x58 => "pop2",
    /// Duplicate top word
    Dup = 0x59 => "dup",
    /// Duplicate top word beneath the second word
    DupX1 = 0x5A => "dup_x1",
    /// Duplicate top word beneath the third word
    DupX2 = 0x5B => "dup_x2",
    /// Duplicate top two words
    Dup2 = 0x5C => "dup2",
    /// Duplicate top two words beneath the third word
    Dup2X1 = 0x5D => "dup2_x1",
    /// Duplicate top two words beneath the fourth word
    Dup2X2 = 0x5E => "dup2_x2",
    /// Swap top two words
    Swap = 0x5F => "swap",

    // ===== Arithmetic =====
    /// Int addition
    Iadd = 0x60 => "iadd",
    /// Long addition
    Ladd = 0x61 => "ladd",
    /// Float addition
    Fadd = 0x62 => "fadd",
    /// Double addition
    Dadd = 0x63 => "dadd",
    /// Int subtraction
    Isub = 0x64 => "isub",
    /// Long subtraction
    Lsub = 0x65 => "lsub",
    /// Float subtraction
    Fsub = 0x66 => "fsub",
    /// Double subtraction
    Dsub = 0x67 => "dsub",
    /// Int multiplication
    Imul = 0x68 => "imul",
    /// Long multiplication
    Lmul = 0x69 => "lmul",
    /// Float multiplication
    Fmul = 0x6A => "fmul",
    /// Double multiplication
    Dmul = 0x6B => "dmul",
    /// Int division
    Idiv = 0x6C => "idiv",
    /// Long division
    Ldiv = 0x6D => "ldiv",
    /// Float division
    Fdiv = 0x6E => "fdiv",
    /// Double division
    Ddiv = 0x6F => "ddiv",
    /// Int remainder
    Irem = 0x70 => "irem",
    /// Long remainder
    Lrem = 0x71 => "lrem",
    /// Float remainder
    Frem = 0x72 => "frem",
    /// Double remainder
    Drem = 0x73 => "drem",
    /// Int negation
    Ineg = 0x74 => "ineg",
    /// Long negation
    Lneg = 0x75 => "lneg",
    /// Float negation
    Fneg = 0x76 => "fneg",
    /// Double negation
    Dneg = 0x77 => "dneg",
    /// Int shift left
    Ishl = 0x78 => "ishl",
    /// Long shift left
    Lshl = 0x79 => "lshl",
    /// Int arithmetic shift right
    Ishr = 0x7A => "ishr",
    /// Long arithmetic shift right
    Lshr = 0x7B => "lshr",
    /// Int logical shift right
    Iushr = 0x7C => "iushr",
    /// Long logical shift right
    Lushr = 0x7D => "lushr",
    /// Int bitwise and
    Iand = 0x7E => "iand",
    /// Long bitwise and
    Land = 0x7F => "land",
    /// Int bitwise or
    Ior = 0x80 => "ior",
    /// Long bitwise or
    Lor = 0x81 => "lor",
    /// Int bitwise xor
    Ixor = 0x82 => "ixor",
    /// Long bitwise xor
    Lxor = 0x83 => "lxor",
    /// Increment int local (operands: slot, delta)
    Iinc = 0x84 => "iinc",

    // ===== Conversions =====
    /// Int to long
    I2l = 0x85 => "i2l",
    /// Int to float
    I2f = 0x86 => "i2f",
    /// Int to double
    I2d = 0x87 => "i2d",
    /// Long to int
    L2i = 0x88 => "l2i",
    /// Long to float
    L2f = 0x89 => "l2f",
    /// Long to double
    L2d = 0x8A => "l2d",
    /// Float to int
    F2i = 0x8B => "f2i",
    /// Float to long
    F2l = 0x8C => "f2l",
    /// Float to double
    F2d = 0x8D => "f2d",
    /// Double to int
    D2i = 0x8E => "d2i",
    /// Double to long
    D2l = 0x8F => "d2l",
    /// Double to float
    D2f = 0x90 => "d2f",
    /// Int to byte
    I2b = 0x91 => "i2b",
    /// Int to char
    I2c = 0x92 => "i2c",
    /// Int to short
    I2s = 0x93 => "i2s",

    // ===== Comparisons & Branches =====
    /// Compare longs
    Lcmp = 0x94 => "lcmp",
    /// Compare floats (NaN yields -1)
    Fcmpl = 0x95 => "fcmpl",
    /// Compare floats (NaN yields 1)
    Fcmpg = 0x96 => "fcmpg",
    /// Compare doubles (NaN yields -1)
    Dcmpl = 0x97 => "dcmpl",
    /// Compare doubles (NaN yields 1)
    Dcmpg = 0x98 => "dcmpg",
    /// Branch if int is zero (operand: label)
    Ifeq = 0x99 => "ifeq",
    /// Branch if int is non-zero (operand: label)
    Ifne = 0x9A => "ifne",
    /// Branch if int is negative (operand: label)
    Iflt = 0x9B => "iflt",
    /// Branch if int is non-negative (operand: label)
    Ifge = 0x9C => "ifge",
    /// Branch if int is positive (operand: label)
    Ifgt = 0x9D => "ifgt",
    /// Branch if int is non-positive (operand: label)
    Ifle = 0x9E => "ifle",
    /// Branch if ints are equal (operand: label)
    IfIcmpeq = 0x9F => "if_icmpeq",
    /// Branch if ints differ (operand: label)
    IfIcmpne = 0xA0 => "if_icmpne",
    /// Branch if int less than (operand: label)
    IfIcmplt = 0xA1 => "if_icmplt",
    /// Branch if int greater or equal (operand: label)
    IfIcmpge = 0xA2 => "if_icmpge",
    /// Branch if int greater than (operand: label)
    IfIcmpgt = 0xA3 => "if_icmpgt",
    /// Branch if int less or equal (operand: label)
    IfIcmple = 0xA4 => "if_icmple",
    /// Branch if references are identical (operand: label)
    IfAcmpeq = 0xA5 => "if_acmpeq",
    /// Branch if references differ (operand: label)
    IfAcmpne = 0xA6 => "if_acmpne",
    /// Unconditional branch (operand: label)
    Goto = 0xA7 => "goto",

    // ===== Returns =====
    /// Return int-like value
    Ireturn = 0xAC => "ireturn",
    /// Return long
    Lreturn = 0xAD => "lreturn",
    /// Return float
    Freturn = 0xAE => "freturn",
    /// Return double
    Dreturn = 0xAF => "dreturn",
    /// Return reference
    Areturn = 0xB0 => "areturn",
    /// Return void
    Return = 0xB1 => "return",

    // ===== Fields & Invocation =====
    /// Read static field (operand: field reference)
    Getstatic = 0xB2 => "getstatic",
    /// Write static field (operand: field reference)
    Putstatic = 0xB3 => "putstatic",
    /// Read instance field (operand: field reference)
    Getfield = 0xB4 => "getfield",
    /// Write instance field (operand: field reference)
    Putfield = 0xB5 => "putfield",
    /// Virtual dispatch (operand: method reference)
    Invokevirtual = 0xB6 => "invokevirtual",
    /// Non-virtual instance call (operand: method reference)
    Invokespecial = 0xB7 => "invokespecial",
    /// Static call (operand: method reference)
    Invokestatic = 0xB8 => "invokestatic",
    /// Interface dispatch (operand: method reference)
    Invokeinterface = 0xB9 => "invokeinterface",

    // ===== Objects & Arrays =====
    /// Allocate object (operand: internal name)
    New = 0xBB => "new",
    /// Allocate primitive array (operand: array type code)
    Newarray = 0xBC => "newarray",
    /// Allocate reference array (operand: internal name)
    Anewarray = 0xBD => "anewarray",
    /// Array length
    Arraylength = 0xBE => "arraylength",
    /// Throw reference
    Athrow = 0xBF => "athrow",
    /// Checked cast (operand: internal name)
    Checkcast = 0xC0 => "checkcast",
    /// Instance test (operand: internal name)
    Instanceof = 0xC1 => "instanceof",
    /// Enter monitor
    Monitorenter = 0xC2 => "monitorenter",
    /// Exit monitor
    Monitorexit = 0xC3 => "monitorexit",
    /// Branch if reference is null (operand: label)
    Ifnull = 0xC6 => "ifnull",
    /// Branch if reference is not null (operand: label)
    Ifnonnull = 0xC7 => "ifnonnull",
}

/// The operand shape an opcode requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// Immediate integer (`bipush`, `sipush`, `newarray`)
    Int,
    /// Local slot
    Var,
    /// Local slot and increment
    Iinc,
    /// Internal class name
    Type,
    /// Loadable constant
    Constant,
    /// Field reference
    Field,
    /// Method reference
    Method,
    /// Branch label
    Jump,
}

impl Opcode {
    /// Convert opcode to its byte value
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the operand shape this opcode expects
    pub fn operand_kind(self) -> OperandKind {
        use Opcode::*;
        match self {
            Bipush | Sipush | Newarray => OperandKind::Int,
            Iload | Lload | Fload | Dload | Aload | Istore | Lstore | Fstore | Dstore | Astore => {
                OperandKind::Var
            }
            Iinc => OperandKind::Iinc,
            New | Anewarray | Checkcast | Instanceof => OperandKind::Type,
            Ldc => OperandKind::Constant,
            Getstatic | Putstatic | Getfield | Putfield => OperandKind::Field,
            Invokevirtual | Invokespecial | Invokestatic | Invokeinterface => OperandKind::Method,
            _ if self.is_jump() => OperandKind::Jump,
            _ => OperandKind::None,
        }
    }

    /// Fixed operand-stack effect as `(pops, pushes)` in words
    ///
    /// Returns `None` when the effect depends on the operand (field and
    /// method references, constants).
    pub fn stack_effect(self) -> Option<(u16, u16)> {
        use Opcode::*;
        let effect = match self {
            Nop | Goto | Return | Iinc => (0, 0),
            AconstNull | IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5
            | Fconst0 | Fconst1 | Fconst2 | Bipush | Sipush => (0, 1),
            Lconst0 | Lconst1 | Dconst0 | Dconst1 => (0, 2),

            Iload | Fload | Aload => (0, 1),
            Lload | Dload => (0, 2),
            Istore | Fstore | Astore => (1, 0),
            Lstore | Dstore => (2, 0),
            Iaload | Faload | Aaload | Baload | Caload | Saload => (2, 1),
            Laload | Daload => (2, 2),
            Iastore | Fastore | Aastore | Bastore | Castore | Sastore => (3, 0),
            Lastore | Dastore => (4, 0),

            Pop => (1, 0),
            Pop2 => (2, 0),
            Dup => (1, 2),
            DupX1 => (2, 3),
            DupX2 => (3, 4),
            Dup2 => (2, 4),
            Dup2X1 => (3, 5),
            Dup2X2 => (4, 6),
            Swap => (2, 2),

            Iadd | Isub | Imul | Idiv | Irem | Ishl | Ishr | Iushr | Iand | Ior | Ixor => (2, 1),
            Fadd | Fsub | Fmul | Fdiv | Frem => (2, 1),
            Ladd | Lsub | Lmul | Ldiv | Lrem | Land | Lor | Lxor => (4, 2),
            Dadd | Dsub | Dmul | Ddiv | Drem => (4, 2),
            Lshl | Lshr | Lushr => (3, 2),
            Ineg | Fneg => (1, 1),
            Lneg | Dneg => (2, 2),

            I2f | F2i | I2b | I2c | I2s => (1, 1),
            I2l | I2d | F2l | F2d => (1, 2),
            L2i | L2f | D2i | D2f => (2, 1),
            L2d | D2l => (2, 2),

            Lcmp | Dcmpl | Dcmpg => (4, 1),
            Fcmpl | Fcmpg => (2, 1),
            Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | Ifnull | Ifnonnull => (1, 0),
            IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq
            | IfAcmpne => (2, 0),

            Ireturn | Freturn | Areturn => (1, 0),
            Lreturn | Dreturn => (2, 0),

            New => (0, 1),
            Newarray | Anewarray | Arraylength | Checkcast | Instanceof => (1, 1),
            Athrow | Monitorenter | Monitorexit => (1, 0),

            Ldc | Getstatic | Putstatic | Getfield | Putfield | Invokevirtual | Invokespecial
            | Invokestatic | Invokeinterface => return None,
        };
        Some(effect)
    }

    /// Check if this opcode is a branch
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Ifeq
                | Opcode::Ifne
                | Opcode::Iflt
                | Opcode::Ifge
                | Opcode::Ifgt
                | Opcode::Ifle
                | Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple
                | Opcode::IfAcmpeq
                | Opcode::IfAcmpne
                | Opcode::Goto
                | Opcode::Ifnull
                | Opcode::Ifnonnull
        )
    }

    /// Check if this opcode is a method invocation
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::Invokevirtual
                | Opcode::Invokespecial
                | Opcode::Invokestatic
                | Opcode::Invokeinterface
        )
    }

    /// Check if this opcode reads or writes a field
    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield
        )
    }

    /// Check if this opcode returns from the method
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
        )
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return() || matches!(self, Opcode::Athrow | Opcode::Goto)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
