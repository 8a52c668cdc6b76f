//! Pass one: member injection
//!
//! The injector edits the types that have a definition. It widens access
//! flags, appends interfaces, and adds the synthetic fields, their accessors
//! and the forwarding methods. It also reserves every generated name the
//! owner will need, so the rewrite pass only ever reads the name tables.

use crate::definition::{Accessor, MemberKey, SyntheticField, SyntheticMethod, TypeDefinition};
use crate::names::{CompanionNames, NameError, NameTable, NameTables, Pool};
use crate::registry::Registry;
use thiserror::Error;
use umbra_bytecode::access::{self, ACC_PUBLIC, ACC_SYNTHETIC};
use umbra_bytecode::{
    verify_method, ClassNode, CodeBuilder, FieldNode, MethodDescriptor, MethodNode, Opcode, Type,
    VerifyError, INIT,
};

/// Pools served by the capability interface
pub(crate) const CAPABILITY: [Pool; 3] = [Pool::InterfaceGet, Pool::InterfaceSet, Pool::MutableSet];

/// Injection errors
#[derive(Debug, Error)]
pub enum InjectError {
    /// A synthetic field has the identity of an existing field
    #[error("Field {name}:{descriptor} already exists in {class}")]
    FieldCollision {
        /// Target class
        class: String,
        /// Field name
        name: String,
        /// Field descriptor
        descriptor: String,
    },

    /// A generated method has the identity of an existing method
    #[error("Method {name}{descriptor} already exists in {class}")]
    MethodCollision {
        /// Target class
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// A generated name could not be reserved
    #[error(transparent)]
    Names(#[from] NameError),

    /// A generated method failed verification
    #[error("Generated code in {class} failed verification: {source}")]
    Verify {
        /// Target class
        class: String,
        /// Cause
        #[source]
        source: VerifyError,
    },
}

/// Applies definitions to the types they name
pub struct Injector<'a> {
    registry: &'a Registry,
    names: &'a NameTables,
}

impl<'a> Injector<'a> {
    /// Create an injector over a registry and the shared name tables
    pub fn new(registry: &'a Registry, names: &'a NameTables) -> Self {
        Self { registry, names }
    }

    /// Inject one class
    ///
    /// A class without a definition comes back unchanged. On error nothing
    /// of the class is usable; the caller drops it.
    #[tracing::instrument(level = "debug", skip_all, fields(class = %class.name))]
    pub fn inject(&self, mut class: ClassNode) -> Result<ClassNode, InjectError> {
        let Some(definition) = self.registry.get(&class.name) else {
            return Ok(class);
        };

        let companions = self.names.companion_names(&class.name);
        let table = self.names.table(&class.name);
        let mut table = table.lock();
        table.set_owner_is_interface(class.is_interface());

        // Flags are read before widening: a final field gets no setter name.
        reserve_names(&class, definition, &mut table)?;
        widen_access(&mut class, definition);

        let mut interfaces: Vec<String> = definition.interfaces().iter().cloned().collect();
        if table.any(&[Pool::InstanceGet, Pool::InstanceSet, Pool::InstanceInvoke]) {
            interfaces.push(companions.accessor.clone());
        }
        let retrofit = self.names.config().retrofit_capability && table.any(&CAPABILITY);
        if retrofit {
            interfaces.push(companions.interface.clone());
        }
        append_interfaces(&mut class, interfaces);

        let fields_before = class.fields.len();
        let methods_before = class.methods.len();

        for field in definition.synthetic_fields() {
            add_synthetic_field(&mut class, field)?;
        }
        for method in definition.synthetic_methods() {
            let node = forwarding_method(method);
            push_method(&mut class, node)?;
        }
        if retrofit {
            add_capability_bridges(&mut class, definition, &table, &companions)?;
        }

        tracing::debug!(
            fields = class.fields.len() - fields_before,
            methods = class.methods.len() - methods_before,
            interfaces = class.interfaces.len(),
            "injected"
        );
        Ok(class)
    }
}

/// Inject one class with a one-off [`Injector`]
pub fn inject(
    class: ClassNode,
    registry: &Registry,
    names: &NameTables,
) -> Result<ClassNode, InjectError> {
    Injector::new(registry, names).inject(class)
}

/// Reserve every name the owner's companions and call sites will use
///
/// The order is fixed so that a run over the same input draws the same
/// names: publicized fields, mutable fields, publicized methods, then
/// synthetic fields.
fn reserve_names(
    class: &ClassNode,
    definition: &TypeDefinition,
    table: &mut NameTable,
) -> Result<(), NameError> {
    for field in &class.fields {
        let key = MemberKey::new(field.name.clone(), field.descriptor.clone());
        if !definition.publicized_fields().contains(&key) {
            continue;
        }
        let is_final = access::is_final(field.access);
        if field.is_static() {
            table.name(Pool::StaticGet, &key)?;
            if !is_final {
                table.name(Pool::StaticSet, &key)?;
            }
        } else {
            table.name(Pool::InstanceGet, &key)?;
            if !is_final && !definition.mutable_fields().contains(&key) {
                table.name(Pool::InstanceSet, &key)?;
            }
        }
    }

    for field in &class.fields {
        let key = MemberKey::new(field.name.clone(), field.descriptor.clone());
        if !field.is_static() && definition.mutable_fields().contains(&key) {
            table.name(Pool::MutableSet, &key)?;
        }
    }

    for method in &class.methods {
        let key = MemberKey::new(method.name.clone(), method.descriptor.clone());
        if method.name == INIT || !definition.publicized_methods().contains(&key) {
            continue;
        }
        let pool = if method.is_static() {
            Pool::StaticInvoke
        } else {
            Pool::InstanceInvoke
        };
        table.name(pool, &key)?;
    }

    for field in definition.synthetic_fields() {
        let key = field.key();
        if field.is_static() {
            table.name(Pool::HolderGet, &key)?;
            table.name(Pool::HolderSet, &key)?;
        } else {
            table.name(Pool::InterfaceGet, &key)?;
            if !field.is_final() {
                table.name(Pool::InterfaceSet, &key)?;
            }
        }
    }

    Ok(())
}

fn widen_access(class: &mut ClassNode, definition: &TypeDefinition) {
    for field in &mut class.fields {
        let key = MemberKey::new(field.name.clone(), field.descriptor.clone());
        field.access = definition.field_access(&key, field.access);
    }
    for method in &mut class.methods {
        let key = MemberKey::new(method.name.clone(), method.descriptor.clone());
        method.access = definition.method_access(&key, method.access);
    }
}

/// Append interfaces not already declared, extending the generic signature
/// to match
fn append_interfaces(class: &mut ClassNode, interfaces: Vec<String>) {
    for interface in interfaces {
        if class.interfaces.contains(&interface) {
            continue;
        }
        if let Some(signature) = class.signature.as_mut() {
            signature.push('L');
            signature.push_str(&interface);
            signature.push(';');
        }
        class.interfaces.push(interface);
    }
}

fn add_synthetic_field(class: &mut ClassNode, field: &SyntheticField) -> Result<(), InjectError> {
    let descriptor = field.ty().descriptor();
    if class.find_field(field.name(), &descriptor).is_some() {
        return Err(InjectError::FieldCollision {
            class: class.name.clone(),
            name: field.name().to_string(),
            descriptor,
        });
    }

    let mut node = FieldNode::new(field.access(), field.name(), descriptor);
    node.signature = field.signature().map(str::to_string);
    class.fields.push(node);

    if let Some(getter) = field.getter() {
        let method = field_getter(&class.name, field.name(), getter);
        push_method(class, method)?;
    }
    if let Some(setter) = field.setter() {
        let method = field_setter(&class.name, field.name(), setter);
        push_method(class, method)?;
    }
    Ok(())
}

fn field_getter(owner: &str, field: &str, accessor: &Accessor) -> MethodNode {
    let descriptor = accessor.getter_descriptor();
    let ty = accessor.ty();
    let mut code = CodeBuilder::for_method(accessor.access(), &descriptor);
    if accessor.is_static() {
        code.field(Opcode::Getstatic, owner, field, ty);
    } else {
        code.load_this().field(Opcode::Getfield, owner, field, ty);
    }
    code.ret(ty);

    let mut method = MethodNode::new(accessor.access(), accessor.name(), descriptor.descriptor())
        .with_code(code.finish());
    method.signature = accessor.signature().map(str::to_string);
    method
}

fn field_setter(owner: &str, field: &str, accessor: &Accessor) -> MethodNode {
    let descriptor = accessor.setter_descriptor();
    let ty = accessor.ty();
    let mut code = CodeBuilder::for_method(accessor.access(), &descriptor);
    if accessor.is_static() {
        code.load(ty, 0).field(Opcode::Putstatic, owner, field, ty);
    } else {
        code.load_this()
            .load(ty, 1)
            .field(Opcode::Putfield, owner, field, ty);
    }
    code.ret(&Type::Void);

    let mut method = MethodNode::new(accessor.access(), accessor.name(), descriptor.descriptor())
        .with_code(code.finish());
    method.signature = accessor.signature().map(str::to_string);
    method
}

/// Body: receiver, parameters, call the redirect target, return its result
fn forwarding_method(method: &SyntheticMethod) -> MethodNode {
    let descriptor = method.descriptor();
    let target = method.redirect();

    let mut code = CodeBuilder::for_method(method.access(), descriptor);
    if !method.is_static() {
        code.load_this();
    }
    code.load_arguments(method.access(), descriptor);
    code.invoke(
        method.dispatch().opcode(),
        target.owner.as_str(),
        target.name.as_str(),
        &target.descriptor,
        target.interface,
    )
    .ret(&descriptor.ret);

    let mut node = MethodNode::new(method.access(), method.name(), descriptor.descriptor())
        .with_code(code.finish());
    node.signature = method.signature().map(str::to_string);
    node
}

/// Implement the capability interface on the owner itself
fn add_capability_bridges(
    class: &mut ClassNode,
    definition: &TypeDefinition,
    table: &NameTable,
    companions: &CompanionNames,
) -> Result<(), InjectError> {
    let access = ACC_PUBLIC | ACC_SYNTHETIC;
    let owner = class.name.clone();
    let mut bridges = Vec::new();

    for field in definition.synthetic_fields().iter().filter(|f| !f.is_static()) {
        let key = field.key();
        if let Some(name) = table.get(Pool::InterfaceGet, &key) {
            bridges.push(bridge_get(access, &owner, name, &key.name, field.ty()));
        }
        if let Some(name) = table.get(Pool::InterfaceSet, &key) {
            bridges.push(bridge_set(access, &owner, name, &key.name, field.ty()));
        }
    }

    for (key, name) in table.entries(Pool::MutableSet) {
        // Descriptors of existing fields were parsed when the definition was built.
        let Ok(ty) = Type::parse_value(&key.descriptor) else {
            continue;
        };
        bridges.push(bridge_set(access, &owner, name, &key.name, &ty));
    }

    tracing::trace!(count = bridges.len(), interface = %companions.interface, "capability bridges");
    for bridge in bridges {
        push_method(class, bridge)?;
    }
    Ok(())
}

fn bridge_get(access: u16, owner: &str, name: &str, field: &str, ty: &Type) -> MethodNode {
    let descriptor = MethodDescriptor::getter(ty.clone());
    let mut code = CodeBuilder::for_method(access, &descriptor);
    code.load_this().field(Opcode::Getfield, owner, field, ty).ret(ty);
    MethodNode::new(access, name, descriptor.descriptor()).with_code(code.finish())
}

fn bridge_set(access: u16, owner: &str, name: &str, field: &str, ty: &Type) -> MethodNode {
    let descriptor = MethodDescriptor::setter(ty.clone());
    let mut code = CodeBuilder::for_method(access, &descriptor);
    code.load_this()
        .load(ty, 1)
        .field(Opcode::Putfield, owner, field, ty)
        .ret(&Type::Void);
    MethodNode::new(access, name, descriptor.descriptor()).with_code(code.finish())
}

fn push_method(class: &mut ClassNode, method: MethodNode) -> Result<(), InjectError> {
    if class.find_method(&method.name, &method.descriptor).is_some() {
        return Err(InjectError::MethodCollision {
            class: class.name.clone(),
            name: method.name,
            descriptor: method.descriptor,
        });
    }
    verify_method(&method).map_err(|source| InjectError::Verify {
        class: class.name.clone(),
        source,
    })?;
    class.methods.push(method);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::definition::{Dispatch, RedirectTarget};
    use pretty_assertions::assert_eq;
    use umbra_bytecode::access::*;
    use umbra_bytecode::{Code, FieldInsn, Insn, MethodInsn, V1_8};

    fn class(name: &str) -> ClassNode {
        ClassNode::new(V1_8, ACC_PUBLIC | ACC_SUPER, name)
    }

    fn run(class: ClassNode, definition: TypeDefinition, config: Config) -> (ClassNode, NameTables) {
        let registry = Registry::from_definitions([definition]).unwrap();
        let names = NameTables::new(config);
        let injected = inject(class, &registry, &names).unwrap();
        (injected, names)
    }

    fn body(method: &MethodNode) -> &Code {
        method.code.as_ref().unwrap()
    }

    #[test]
    fn test_class_without_definition_is_untouched() {
        let mut original = class("a/A");
        original.fields.push(FieldNode::new(ACC_PRIVATE, "x", "I"));
        let registry = Registry::new();
        let names = NameTables::new(Config::default());

        let result = inject(original.clone(), &registry, &names).unwrap();
        assert_eq!(result, original);
        assert!(names.is_empty());
    }

    #[test]
    fn test_interfaces_and_signature() {
        let mut target = class("a/A");
        target.interfaces.push("x/I".to_string());
        target.signature = Some("<T:Ljava/lang/Object;>Ljava/lang/Object;Lx/I;".to_string());
        let definition = TypeDefinition::builder("a/A")
            .interface("x/I")
            .interface("x/J")
            .build()
            .unwrap();

        let (result, _) = run(target, definition, Config::default());
        assert_eq!(result.interfaces, ["x/I", "x/J"]);
        assert_eq!(
            result.signature.as_deref(),
            Some("<T:Ljava/lang/Object;>Ljava/lang/Object;Lx/I;Lx/J;")
        );
    }

    #[test]
    fn test_access_widening_and_accessor_interface() {
        let mut target = class("a/A");
        target
            .fields
            .push(FieldNode::new(ACC_PRIVATE | ACC_FINAL, "x", "I"));
        target
            .methods
            .push(MethodNode::new(ACC_PROTECTED | ACC_ABSTRACT, "run", "()V"));
        let definition = TypeDefinition::builder("a/A")
            .publicize_field("x", "I")
            .mutable_field("x", "I")
            .publicize_method("run", "()V")
            .build()
            .unwrap();

        let (result, names) = run(target, definition, Config::default());
        assert_eq!(result.fields[0].access, ACC_PUBLIC);
        assert_eq!(result.methods[0].access, ACC_PUBLIC | ACC_ABSTRACT);
        assert_eq!(result.interfaces, ["umbra/generated/a/A$Accessor"]);

        let table = names.get("a/A").unwrap();
        let table = table.lock();
        let x = MemberKey::new("x", "I");
        assert!(table.get(Pool::InstanceGet, &x).is_some());
        // Writes to a mutable field go through the mutable setter instead.
        assert!(table.get(Pool::InstanceSet, &x).is_none());
        assert!(table.get(Pool::MutableSet, &x).is_some());
        assert!(table
            .get(Pool::InstanceInvoke, &MemberKey::new("run", "()V"))
            .is_some());
    }

    #[test]
    fn test_static_members_do_not_attach_accessor() {
        let mut target = class("a/A");
        target
            .fields
            .push(FieldNode::new(ACC_PRIVATE | ACC_STATIC, "COUNT", "J"));
        let definition = TypeDefinition::builder("a/A")
            .publicize_field("COUNT", "J")
            .build()
            .unwrap();

        let (result, names) = run(target, definition, Config::default());
        assert!(result.interfaces.is_empty());
        let table = names.get("a/A").unwrap();
        let table = table.lock();
        assert_eq!(table.pool_len(Pool::StaticGet), 1);
        assert_eq!(table.pool_len(Pool::StaticSet), 1);
    }

    #[test]
    fn test_synthetic_field_with_both_accessors() {
        let field = SyntheticField::new(
            ACC_PRIVATE,
            "total",
            Type::Long,
            None,
            Some(Accessor::new(ACC_PUBLIC, Type::Long, "getTotal", None)),
            Some(Accessor::new(ACC_PUBLIC, Type::Long, "setTotal", None)),
        )
        .unwrap();
        let definition = TypeDefinition::builder("a/A")
            .synthetic_field(field)
            .build()
            .unwrap();

        let (result, _) = run(class("a/A"), definition, Config::default());
        assert_eq!(result.fields, [FieldNode::new(ACC_PRIVATE, "total", "J")]);

        let getter = result.find_method("getTotal", "()J").unwrap();
        assert_eq!(
            body(getter).instructions,
            [
                Insn::Var { opcode: Opcode::Aload, slot: 0 },
                FieldInsn::new(Opcode::Getfield, "a/A", "total", "J").into(),
                Insn::Simple(Opcode::Lreturn),
            ]
        );
        assert_eq!((body(getter).max_stack, body(getter).max_locals), (2, 1));

        let setter = result.find_method("setTotal", "(J)V").unwrap();
        assert_eq!(
            body(setter).instructions,
            [
                Insn::Var { opcode: Opcode::Aload, slot: 0 },
                Insn::Var { opcode: Opcode::Lload, slot: 1 },
                FieldInsn::new(Opcode::Putfield, "a/A", "total", "J").into(),
                Insn::Simple(Opcode::Return),
            ]
        );
        assert_eq!((body(setter).max_stack, body(setter).max_locals), (3, 3));
    }

    #[test]
    fn test_static_forwarding_method_with_wide_arguments() {
        let method = SyntheticMethod::new(
            Dispatch::Static,
            ACC_PUBLIC | ACC_STATIC,
            "mix",
            MethodDescriptor::parse("(JID)D").unwrap(),
            None,
            RedirectTarget::new("b/Math", "mix", MethodDescriptor::parse("(JID)D").unwrap(), false),
        )
        .unwrap();
        let definition = TypeDefinition::builder("a/A")
            .synthetic_method(method)
            .build()
            .unwrap();

        let (result, _) = run(class("a/A"), definition, Config::default());
        let mix = result.find_method("mix", "(JID)D").unwrap();
        assert_eq!(
            body(mix).instructions,
            [
                Insn::Var { opcode: Opcode::Lload, slot: 0 },
                Insn::Var { opcode: Opcode::Iload, slot: 2 },
                Insn::Var { opcode: Opcode::Dload, slot: 3 },
                MethodInsn::new(Opcode::Invokestatic, "b/Math", "mix", "(JID)D", false).into(),
                Insn::Simple(Opcode::Dreturn),
            ]
        );
        assert_eq!((body(mix).max_stack, body(mix).max_locals), (5, 5));
    }

    #[test]
    fn test_collisions_are_rejected() {
        let mut target = class("a/A");
        target.fields.push(FieldNode::new(ACC_PRIVATE, "x", "I"));
        let field = SyntheticField::new(ACC_PRIVATE, "x", Type::Int, None, None, None).unwrap();
        let definition = TypeDefinition::builder("a/A")
            .synthetic_field(field)
            .build()
            .unwrap();
        let registry = Registry::from_definitions([definition]).unwrap();
        let names = NameTables::new(Config::default());
        let err = inject(target, &registry, &names).unwrap_err();
        assert!(matches!(err, InjectError::FieldCollision { .. }));

        let mut target = class("a/A");
        target.methods.push(
            MethodNode::new(ACC_PUBLIC, "getY", "()I").with_code(Code {
                max_stack: 1,
                max_locals: 1,
                instructions: vec![Insn::Simple(Opcode::Iconst0), Insn::Simple(Opcode::Ireturn)],
            }),
        );
        let field = SyntheticField::new(
            ACC_PRIVATE,
            "y",
            Type::Int,
            None,
            Some(Accessor::new(ACC_PUBLIC, Type::Int, "getY", None)),
            None,
        )
        .unwrap();
        let definition = TypeDefinition::builder("a/A")
            .synthetic_field(field)
            .build()
            .unwrap();
        let registry = Registry::from_definitions([definition]).unwrap();
        let err = inject(target, &registry, &names).unwrap_err();
        assert!(matches!(err, InjectError::MethodCollision { .. }));
    }

    #[test]
    fn test_abstract_forwarding_method_fails_verification() {
        let method = SyntheticMethod::new(
            Dispatch::Static,
            ACC_PUBLIC | ACC_STATIC | ACC_ABSTRACT,
            "go",
            MethodDescriptor::parse("()V").unwrap(),
            None,
            RedirectTarget::new("b/B", "go", MethodDescriptor::parse("()V").unwrap(), false),
        )
        .unwrap();
        let definition = TypeDefinition::builder("a/A")
            .synthetic_method(method)
            .build()
            .unwrap();
        let registry = Registry::from_definitions([definition]).unwrap();
        let names = NameTables::new(Config::default());
        let err = inject(class("a/A"), &registry, &names).unwrap_err();
        assert!(matches!(
            err,
            InjectError::Verify {
                source: VerifyError::UnexpectedCode { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_retrofit_adds_bridges() {
        let mut target = class("a/A");
        target
            .fields
            .push(FieldNode::new(ACC_PRIVATE | ACC_FINAL, "id", "Ljava/lang/String;"));
        let field = SyntheticField::new(ACC_PRIVATE, "tag", Type::Int, None, None, None).unwrap();
        let definition = TypeDefinition::builder("a/A")
            .mutable_field("id", "Ljava/lang/String;")
            .synthetic_field(field)
            .build()
            .unwrap();
        let config = Config {
            retrofit_capability: true,
            ..Config::default()
        };

        let (result, names) = run(target, definition, config);
        assert_eq!(result.interfaces, ["umbra/generated/a/A$Synthetic"]);
        assert_eq!(result.fields[0].access, ACC_PRIVATE);

        let table = names.get("a/A").unwrap();
        let table = table.lock();
        let get = table.get(Pool::InterfaceGet, &MemberKey::new("tag", "I")).unwrap();
        let set = table.get(Pool::InterfaceSet, &MemberKey::new("tag", "I")).unwrap();
        let mutable = table
            .get(Pool::MutableSet, &MemberKey::new("id", "Ljava/lang/String;"))
            .unwrap();

        let bridge = result.find_method(get, "()I").unwrap();
        assert_eq!(bridge.access, ACC_PUBLIC | ACC_SYNTHETIC);
        assert!(result.find_method(set, "(I)V").is_some());
        let bridge = result.find_method(mutable, "(Ljava/lang/String;)V").unwrap();
        assert_eq!(
            body(bridge).instructions[2],
            FieldInsn::new(Opcode::Putfield, "a/A", "id", "Ljava/lang/String;").into()
        );
    }

    #[test]
    fn test_names_are_reserved_in_fixed_order() {
        let build = || {
            let mut target = class("a/A");
            target.fields.push(FieldNode::new(ACC_PRIVATE, "b", "I"));
            target.fields.push(FieldNode::new(ACC_PRIVATE, "a", "I"));
            let definition = TypeDefinition::builder("a/A")
                .publicize_field("a", "I")
                .publicize_field("b", "I")
                .build()
                .unwrap();
            run(target, definition, Config::default()).1
        };

        let left = build();
        let right = build();
        let left = left.get("a/A").unwrap();
        let right = right.get("a/A").unwrap();
        let left: Vec<_> = left
            .lock()
            .entries(Pool::InstanceGet)
            .map(|(k, n)| (k.clone(), n.to_string()))
            .collect();
        let right: Vec<_> = right
            .lock()
            .entries(Pool::InstanceGet)
            .map(|(k, n)| (k.clone(), n.to_string()))
            .collect();
        assert_eq!(left, right);
        assert_eq!(left.len(), 2);
    }
}
