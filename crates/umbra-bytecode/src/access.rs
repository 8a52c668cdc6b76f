//! Access flags for classes, fields and methods
//!
//! Flags share one `u16` namespace; several bits carry different meanings
//! depending on the kind of declaration (`ACC_SUPER` and `ACC_SYNCHRONIZED`,
//! `ACC_VOLATILE` and `ACC_BRIDGE`, `ACC_TRANSIENT` and `ACC_VARARGS`).

/// Declared public
pub const ACC_PUBLIC: u16 = 0x0001;
/// Declared private
pub const ACC_PRIVATE: u16 = 0x0002;
/// Declared protected
pub const ACC_PROTECTED: u16 = 0x0004;
/// Declared static
pub const ACC_STATIC: u16 = 0x0008;
/// Declared final
pub const ACC_FINAL: u16 = 0x0010;
/// Class: treat superclass methods specially on invokespecial
pub const ACC_SUPER: u16 = 0x0020;
/// Method: invocation wrapped by a monitor
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
/// Field: cannot be cached
pub const ACC_VOLATILE: u16 = 0x0040;
/// Method: bridge generated by the compiler
pub const ACC_BRIDGE: u16 = 0x0040;
/// Field: not serialized
pub const ACC_TRANSIENT: u16 = 0x0080;
/// Method: variable arity
pub const ACC_VARARGS: u16 = 0x0080;
/// Method: implemented outside the image
pub const ACC_NATIVE: u16 = 0x0100;
/// Class: is an interface
pub const ACC_INTERFACE: u16 = 0x0200;
/// Declared abstract
pub const ACC_ABSTRACT: u16 = 0x0400;
/// Method: strict floating point
pub const ACC_STRICT: u16 = 0x0800;
/// Not present in source
pub const ACC_SYNTHETIC: u16 = 0x1000;
/// Class: annotation type
pub const ACC_ANNOTATION: u16 = 0x2000;
/// Class or field: enum
pub const ACC_ENUM: u16 = 0x4000;

/// Check for the static bit
#[inline]
pub fn is_static(access: u16) -> bool {
    access & ACC_STATIC != 0
}

/// Check for the final bit
#[inline]
pub fn is_final(access: u16) -> bool {
    access & ACC_FINAL != 0
}

/// Check for the abstract bit
#[inline]
pub fn is_abstract(access: u16) -> bool {
    access & ACC_ABSTRACT != 0
}

/// Check for the interface bit
#[inline]
pub fn is_interface(access: u16) -> bool {
    access & ACC_INTERFACE != 0
}

/// Widen visibility to public, dropping private and protected
#[inline]
pub fn publicize(access: u16) -> u16 {
    (access | ACC_PUBLIC) & !(ACC_PRIVATE | ACC_PROTECTED)
}

/// Drop the final bit
#[inline]
pub fn definalize(access: u16) -> u16 {
    access & !ACC_FINAL
}

/// Render member flags as source-order modifiers, e.g. `private static final`
///
/// Only the modifiers meaningful for fields and methods are rendered; this
/// is for diagnostics, not for round-tripping.
pub fn describe(access: u16) -> String {
    const MODIFIERS: [(u16, &str); 6] = [
        (ACC_PUBLIC, "public"),
        (ACC_PRIVATE, "private"),
        (ACC_PROTECTED, "protected"),
        (ACC_ABSTRACT, "abstract"),
        (ACC_STATIC, "static"),
        (ACC_FINAL, "final"),
    ];

    MODIFIERS
        .iter()
        .filter(|(bit, _)| access & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}
