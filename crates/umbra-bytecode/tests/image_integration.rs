//! Integration tests for the program image model

use pretty_assertions::assert_eq;
use umbra_bytecode::access::*;
use umbra_bytecode::{
    compute_maxs, verify_class, ClassNode, CodeBuilder, FieldNode, Insn, MethodDescriptor,
    MethodNode, Opcode, Type, VerifyError, INIT, OBJECT, V1_8,
};

/// `class Counter { private long total; public void add(int n) { total += n; } }`
fn counter() -> ClassNode {
    let mut class = ClassNode::new(V1_8, ACC_PUBLIC | ACC_SUPER, "demo/Counter");
    class.fields.push(FieldNode::new(ACC_PRIVATE, "total", "J"));

    let ctor_desc = MethodDescriptor::parse("()V").unwrap();
    let mut ctor = CodeBuilder::for_method(ACC_PUBLIC, &ctor_desc);
    ctor.load_this()
        .invoke(Opcode::Invokespecial, OBJECT, INIT, &ctor_desc, false)
        .ret(&Type::Void);
    class
        .methods
        .push(MethodNode::new(ACC_PUBLIC, INIT, "()V").with_code(ctor.finish()));

    let add_desc = MethodDescriptor::parse("(I)V").unwrap();
    let mut add = CodeBuilder::for_method(ACC_PUBLIC, &add_desc);
    add.load_this().simple(Opcode::Dup);
    add.field(Opcode::Getfield, "demo/Counter", "total", &Type::Long);
    add.load(&Type::Int, 1).simple(Opcode::I2l).simple(Opcode::Ladd);
    add.field(Opcode::Putfield, "demo/Counter", "total", &Type::Long);
    add.ret(&Type::Void);
    class
        .methods
        .push(MethodNode::new(ACC_PUBLIC, "add", "(I)V").with_code(add.finish()));

    class
}

#[test]
fn test_built_class_verifies() {
    let class = counter();
    verify_class(&class).unwrap();

    let add = class.find_method("add", "(I)V").unwrap();
    let code = add.code.as_ref().unwrap();
    // this, long, then the widened int on top
    assert_eq!((code.max_stack, code.max_locals), (5, 2));
    assert_eq!(compute_maxs(add).unwrap(), (5, 2));
}

#[test]
fn test_tampered_body_is_rejected() {
    let mut class = counter();
    let add = class.find_method_mut("add", "(I)V").unwrap();
    let code = add.code.as_mut().unwrap();
    code.instructions.retain(|insn| !matches!(insn, Insn::Simple(Opcode::Dup)));

    let err = verify_class(&class).unwrap_err();
    assert!(matches!(err, VerifyError::StackUnderflow { .. }), "{err}");
    assert!(err.to_string().starts_with("Stack underflow in add(I)V"));
}

#[test]
fn test_class_roundtrips_through_serde() {
    let class = counter();
    let json = serde_json::to_string(&class).unwrap();
    let back: ClassNode = serde_json::from_str(&json).unwrap();
    assert_eq!(back, class);
}

#[test]
fn test_descriptor_display_matches_input() {
    for text in ["()V", "(IJ)D", "([Ljava/lang/String;)V", "(ZBCS)[[I"] {
        assert_eq!(MethodDescriptor::parse(text).unwrap().to_string(), text);
    }
}
