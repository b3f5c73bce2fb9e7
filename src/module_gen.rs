//! The module-level builder surface.
//!
//! A [`ModuleGen`] declares types and members, hands out [`CodeGen`]
//! bodies, and finalizes everything into a module sink. Declaration is
//! eager: every call validates immediately and returns a hash handle, so
//! forward references are just hashes computed before the target exists.

use codeforge_compiler::body::{BodyCompiler, BodyContext};
use codeforge_compiler::module::{ModuleBuilder, ModuleSink};
use codeforge_compiler::operand::{BinOp, Operand};
use codeforge_core::{
    BuildError, DataType, EventDef, FinalizeError, MethodKind, Modifiers, ParamDef, TypeDef,
    TypeHash, TypeKind, Visibility,
};
use rustc_hash::FxHashMap;
use std::ops::{Deref, DerefMut};

use crate::code_gen::CodeGen;

/// A pending instance field initializer, replayed into constructor
/// prologues.
#[derive(Debug, Clone)]
pub(crate) struct FieldInit {
    pub slot: u32,
    pub data_type: DataType,
    pub value: Operand,
}

/// Builder for one module.
#[derive(Debug)]
pub struct ModuleGen {
    pub(crate) builder: ModuleBuilder,
    namespaces: Vec<String>,
    field_inits: FxHashMap<TypeHash, Vec<FieldInit>>,
}

impl ModuleGen {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            builder: ModuleBuilder::new(name),
            namespaces: Vec::new(),
            field_inits: FxHashMap::default(),
        }
    }

    /// Enter a namespace; declarations made through the guard get
    /// qualified names, and the namespace closes when the guard drops.
    pub fn namespace(&mut self, name: &str) -> NamespaceGuard<'_> {
        self.namespaces.push(name.into());
        NamespaceGuard { module: self }
    }

    fn qualified(&self, name: &str) -> String {
        if self.namespaces.is_empty() {
            name.into()
        } else {
            format!("{}.{}", self.namespaces.join("."), name)
        }
    }

    /// Look up a declared or catalog type by (unqualified-as-given) name.
    pub fn type_named(&self, name: &str) -> Option<TypeHash> {
        self.builder
            .registry()
            .get_by_name(name)
            .map(|def| def.type_hash)
    }

    // =========================================================================
    // Type Declarations
    // =========================================================================

    /// Declare a public class.
    pub fn declare_class(&mut self, name: &str) -> Result<TypeHash, BuildError> {
        self.declare_type(name, Visibility::Public, TypeKind::Class, None)
    }

    /// Declare a public class extending a declared base.
    pub fn declare_class_extending(
        &mut self,
        name: &str,
        base: TypeHash,
    ) -> Result<TypeHash, BuildError> {
        self.declare_type(name, Visibility::Public, TypeKind::Class, Some(base))
    }

    /// Declare a public struct.
    pub fn declare_struct(&mut self, name: &str) -> Result<TypeHash, BuildError> {
        self.declare_type(name, Visibility::Public, TypeKind::Struct, None)
    }

    /// Declare a type with explicit visibility, kind, and base.
    pub fn declare_type(
        &mut self,
        name: &str,
        visibility: Visibility,
        kind: TypeKind,
        base: Option<TypeHash>,
    ) -> Result<TypeHash, BuildError> {
        if kind == TypeKind::Delegate {
            return Err(BuildError::InvalidContext {
                message: format!("'{name}' must be declared through declare_delegate"),
            });
        }
        let mut def = TypeDef::new(self.qualified(name), visibility, kind);
        def.base = base;
        self.builder.registry_mut().register(def)
    }

    /// Declare a delegate type with one invocation signature.
    pub fn declare_delegate(
        &mut self,
        name: &str,
        params: Vec<ParamDef>,
        return_type: DataType,
    ) -> Result<TypeHash, BuildError> {
        let def = TypeDef::delegate(self.qualified(name), Visibility::Public, params, return_type);
        self.builder.registry_mut().register(def)
    }

    // =========================================================================
    // Member Declarations
    // =========================================================================

    /// Declare a public instance field.
    pub fn field(
        &mut self,
        owner: TypeHash,
        name: &str,
        data_type: DataType,
    ) -> Result<TypeHash, BuildError> {
        self.field_with(owner, name, data_type, Visibility::Public, Modifiers::empty())
    }

    /// Declare a public static field.
    pub fn static_field(
        &mut self,
        owner: TypeHash,
        name: &str,
        data_type: DataType,
    ) -> Result<TypeHash, BuildError> {
        self.field_with(owner, name, data_type, Visibility::Public, Modifiers::STATIC)
    }

    /// Declare a field with explicit visibility and modifiers.
    pub fn field_with(
        &mut self,
        owner: TypeHash,
        name: &str,
        data_type: DataType,
        visibility: Visibility,
        modifiers: Modifiers,
    ) -> Result<TypeHash, BuildError> {
        self.builder
            .registry_mut()
            .add_field(owner, name, visibility, modifiers, data_type, false)
    }

    /// Declare an instance field with an initializer.
    ///
    /// The initializer is replayed in every constructor prologue, so it
    /// may not reference parameters.
    pub fn field_init(
        &mut self,
        owner: TypeHash,
        name: &str,
        data_type: DataType,
        value: impl Into<Operand>,
    ) -> Result<TypeHash, BuildError> {
        let value = value.into();
        if !self
            .builder
            .registry()
            .is_assignable(value.data_type(), data_type)
        {
            return Err(BuildError::TypeMismatch {
                message: format!(
                    "initializer of '{name}' has type {}, field is {data_type}",
                    value.data_type()
                ),
            });
        }
        let field_hash = self.field_with(
            owner,
            name,
            data_type,
            Visibility::Public,
            Modifiers::empty(),
        )?;
        let slot = self.field_slot(owner, field_hash)?;
        self.field_inits.entry(owner).or_default().push(FieldInit {
            slot,
            data_type,
            value,
        });
        Ok(field_hash)
    }

    /// Declare an event of a delegate type.
    ///
    /// Synthesizes a private backing field plus add and remove accessors
    /// whose bodies apply the delegate combine and remove algebra.
    pub fn event(
        &mut self,
        owner: TypeHash,
        name: &str,
        delegate_type: TypeHash,
    ) -> Result<(), BuildError> {
        if !self.builder.registry().is_delegate(delegate_type) {
            return Err(BuildError::TypeMismatch {
                message: format!("event '{name}' needs a delegate type"),
            });
        }
        let def = self.builder.registry().expect(owner)?;
        if def.declares_name(name) {
            return Err(BuildError::DuplicateMember {
                name: name.into(),
                owner: def.name.clone(),
            });
        }
        let owner_name = def.name.clone();
        let base = def.base;
        let delegate_dt = DataType::new(delegate_type);

        let backing_name = format!("__{name}_handlers");
        let backing = self.builder.registry_mut().add_field(
            owner,
            &backing_name,
            Visibility::Private,
            Modifiers::empty(),
            delegate_dt,
            true,
        )?;
        let add_name = format!("add_{name}");
        let remove_name = format!("remove_{name}");
        let add_method = self.builder.registry_mut().add_method(
            owner,
            &add_name,
            Visibility::Public,
            Modifiers::empty(),
            vec![ParamDef::new("value", delegate_dt)],
            DataType::void(),
            MethodKind::EventAdd,
            false,
        )?;
        let remove_method = self.builder.registry_mut().add_method(
            owner,
            &remove_name,
            Visibility::Public,
            Modifiers::empty(),
            vec![ParamDef::new("value", delegate_dt)],
            DataType::void(),
            MethodKind::EventRemove,
            false,
        )?;
        self.builder.registry_mut().add_event(
            owner,
            EventDef {
                name: name.into(),
                visibility: Visibility::Public,
                modifiers: Modifiers::empty(),
                delegate_type: delegate_dt,
                event_hash: TypeHash::from_event(owner, name),
                backing_field: backing,
                add_method,
                remove_method,
            },
        )?;

        let slot = self.field_slot(owner, backing)?;
        for (hash, method_name, op) in [
            (add_method, add_name, BinOp::Add),
            (remove_method, remove_name, BinOp::Sub),
        ] {
            let ctx = BodyContext {
                owner,
                owner_name: owner_name.clone(),
                method_name,
                method_hash: hash,
                return_type: DataType::void(),
                is_static: false,
                is_ctor: false,
                base,
            };
            let mut body =
                BodyCompiler::new(ctx, &[ParamDef::new("value", delegate_dt)])?;
            let backing_op = Operand::EventBacking {
                receiver: Box::new(body.this_ref()?),
                slot,
                data_type: delegate_dt,
            };
            let value = body.arg("value")?;
            let (registry, pool) = self.builder.session();
            body.assign_op(registry, pool, op, &backing_op, value)?;
            self.builder.add_body(hash, body.finish()?)?;
        }
        Ok(())
    }

    fn field_slot(&self, owner: TypeHash, field: TypeHash) -> Result<u32, BuildError> {
        self.builder
            .registry()
            .expect(owner)?
            .find_field_by_hash(field)
            .map(|f| f.slot)
            .ok_or_else(|| BuildError::UnknownType(field.to_string()))
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    /// Open a public instance method body.
    pub fn begin_method(
        &mut self,
        owner: TypeHash,
        name: &str,
        params: Vec<ParamDef>,
        return_type: DataType,
    ) -> Result<CodeGen<'_>, BuildError> {
        self.begin_member(
            owner,
            name,
            params,
            return_type,
            Modifiers::empty(),
            MethodKind::Method,
        )
    }

    /// Open a public static method body.
    pub fn begin_static_method(
        &mut self,
        owner: TypeHash,
        name: &str,
        params: Vec<ParamDef>,
        return_type: DataType,
    ) -> Result<CodeGen<'_>, BuildError> {
        self.begin_member(
            owner,
            name,
            params,
            return_type,
            Modifiers::STATIC,
            MethodKind::Method,
        )
    }

    /// Open a constructor body.
    ///
    /// The base constructor call and field initializers are emitted
    /// implicitly before the first statement unless the body chains to a
    /// base constructor explicitly.
    pub fn begin_ctor(
        &mut self,
        owner: TypeHash,
        params: Vec<ParamDef>,
    ) -> Result<CodeGen<'_>, BuildError> {
        self.begin_member(
            owner,
            ".ctor",
            params,
            DataType::void(),
            Modifiers::empty(),
            MethodKind::Constructor,
        )
    }

    fn begin_member(
        &mut self,
        owner: TypeHash,
        name: &str,
        params: Vec<ParamDef>,
        return_type: DataType,
        modifiers: Modifiers,
        kind: MethodKind,
    ) -> Result<CodeGen<'_>, BuildError> {
        let def = self.builder.registry().expect(owner)?;
        let owner_name = def.name.clone();
        let base = def.base;
        let method_hash = self.builder.registry_mut().add_method(
            owner,
            name,
            Visibility::Public,
            modifiers,
            params.clone(),
            return_type,
            kind,
            false,
        )?;

        let is_ctor = kind == MethodKind::Constructor;
        let ctx = BodyContext {
            owner,
            owner_name,
            method_name: name.into(),
            method_hash,
            return_type,
            is_static: modifiers.is_static(),
            is_ctor,
            base,
        };
        let body = BodyCompiler::new(ctx, &params)?;
        let inits = if is_ctor {
            self.field_inits.get(&owner).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(CodeGen::new(self, body, method_hash, is_ctor, inits))
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Finalize the module into a sink.
    ///
    /// Types that never declared a constructor get a default one here, so
    /// their field initializers and base chaining still run.
    pub fn finalize<S: ModuleSink>(mut self, sink: &mut S) -> Result<S::Output, FinalizeError> {
        let ctorless: Vec<TypeHash> = self
            .builder
            .registry()
            .declared()
            .filter(|def| def.kind != TypeKind::Delegate)
            .filter(|def| def.constructors().next().is_none())
            .map(|def| def.type_hash)
            .collect();
        for owner in ctorless {
            self.synthesize_default_ctor(owner)?;
        }
        self.builder.finalize(sink)
    }

    fn synthesize_default_ctor(&mut self, owner: TypeHash) -> Result<(), BuildError> {
        let def = self.builder.registry().expect(owner)?;
        let owner_name = def.name.clone();
        let base = def.base;
        let method_hash = self.builder.registry_mut().add_method(
            owner,
            ".ctor",
            Visibility::Public,
            Modifiers::empty(),
            vec![],
            DataType::void(),
            MethodKind::Constructor,
            false,
        )?;

        let ctx = BodyContext {
            owner,
            owner_name,
            method_name: ".ctor".into(),
            method_hash,
            return_type: DataType::void(),
            is_static: false,
            is_ctor: true,
            base,
        };
        let mut body = BodyCompiler::new(ctx, &[])?;
        let inits = self.field_inits.get(&owner).cloned().unwrap_or_default();
        let (registry, pool) = self.builder.session();
        body.invoke_base_ctor(registry, pool, vec![])?;
        for init in inits {
            let target = Operand::Field {
                receiver: Some(Box::new(body.this_ref()?)),
                slot: init.slot,
                is_static: false,
                data_type: init.data_type,
            };
            body.assign(registry, pool, &target, init.value)?;
        }
        self.builder.add_body(method_hash, body.finish()?)
    }
}

/// Scoped namespace handle; closes the namespace on drop.
#[derive(Debug)]
pub struct NamespaceGuard<'m> {
    module: &'m mut ModuleGen,
}

impl Deref for NamespaceGuard<'_> {
    type Target = ModuleGen;

    fn deref(&self) -> &ModuleGen {
        self.module
    }
}

impl DerefMut for NamespaceGuard<'_> {
    fn deref_mut(&mut self) -> &mut ModuleGen {
        self.module
    }
}

impl Drop for NamespaceGuard<'_> {
    fn drop(&mut self) {
        self.module.namespaces.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeforge_core::builtins;

    #[test]
    fn namespaces_qualify_declarations() {
        let mut m = ModuleGen::new("shop");
        let book = {
            let mut ns = m.namespace("Bookstore");
            ns.declare_struct("Book").unwrap()
        };
        assert_eq!(book, TypeHash::from_name("Bookstore.Book"));
        // The guard dropped; later declarations are unqualified.
        let app = m.declare_class("App").unwrap();
        assert_eq!(app, TypeHash::from_name("App"));
    }

    #[test]
    fn event_declaration_synthesizes_members() {
        let mut m = ModuleGen::new("events");
        let notify = m
            .declare_delegate("Notify", vec![], DataType::void())
            .unwrap();
        let source = m.declare_class("Source").unwrap();
        m.event(source, "Changed", notify).unwrap();

        let def = m.builder.registry().expect(source).unwrap();
        let event = def.find_event("Changed").unwrap();
        assert!(def.find_field("Changed").is_none());
        assert!(def.find_field_by_hash(event.backing_field).is_some());
        assert!(m.builder.has_body(event.add_method));
        assert!(m.builder.has_body(event.remove_method));
    }

    #[test]
    fn event_needs_a_delegate_type() {
        let mut m = ModuleGen::new("events");
        let source = m.declare_class("Source").unwrap();
        let err = m.event(source, "Changed", builtins::STRING).unwrap_err();
        assert!(matches!(err, BuildError::TypeMismatch { .. }));
    }

    #[test]
    fn field_initializer_must_be_assignable() {
        let mut m = ModuleGen::new("inits");
        let t = m.declare_class("Holder").unwrap();
        let err = m
            .field_init(t, "count", DataType::new(builtins::INT32), "zero")
            .unwrap_err();
        assert!(matches!(err, BuildError::TypeMismatch { .. }));
    }
}
