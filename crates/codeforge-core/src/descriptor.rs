//! Accumulating descriptors for module elements.
//!
//! A descriptor is the pre-finalization representation of a type or member.
//! Descriptors live in the module's registry, addressed by [`TypeHash`]
//! rather than by owning references, so a type can reference its base, its
//! members, and other types without ownership cycles. They are freely
//! mutable until the module emitter performs its single finalization pass.

use crate::data_type::DataType;
use crate::type_hash::TypeHash;
use crate::visibility::{Modifiers, Visibility};

/// Kind of a type under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
    /// A delegate type: exactly one synthesized invocation signature,
    /// no other members.
    Delegate,
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub data_type: DataType,
}

impl ParamDef {
    /// Create a named parameter.
    pub fn new(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub visibility: Visibility,
    pub modifiers: Modifiers,
    pub data_type: DataType,
    /// Identity: `TypeHash::from_field(owner, name)`.
    pub field_hash: TypeHash,
    /// Instance slot (absolute, base fields first) or static slot index.
    pub slot: u32,
    /// Synthesized backing slot for an event; hidden from normal lookup.
    pub is_event_backing: bool,
}

/// What role a method descriptor plays.
///
/// Constructors and event/indexer accessors are ordinary methods with a
/// role tag; they share hashing, body compilation, and emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Constructor,
    EventAdd,
    EventRemove,
    IndexerGet,
    IndexerSet,
}

/// A declared method, constructor, or accessor.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Simple name; constructors use `.ctor`.
    pub name: String,
    pub visibility: Visibility,
    pub modifiers: Modifiers,
    pub params: Vec<ParamDef>,
    pub return_type: DataType,
    /// Identity: owner + name + parameter types.
    pub method_hash: TypeHash,
    pub kind: MethodKind,
    /// Supplied by the target runtime; has no compiled body.
    pub is_native: bool,
}

impl MethodDef {
    /// Parameter type hashes, in declaration order.
    pub fn param_hashes(&self) -> Vec<TypeHash> {
        self.params.iter().map(|p| p.data_type.hash).collect()
    }

    /// Check the static flag.
    pub fn is_static(&self) -> bool {
        self.modifiers.is_static()
    }

    /// Render `name(t1, t2)` for error messages.
    pub fn signature_string(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.data_type.to_string()).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// A declared event.
///
/// Declaration synthesizes a private delegate-typed backing field plus add
/// and remove accessor methods; this descriptor ties the three together.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    pub name: String,
    pub visibility: Visibility,
    pub modifiers: Modifiers,
    pub delegate_type: DataType,
    /// Identity: `TypeHash::from_event(owner, name)`.
    pub event_hash: TypeHash,
    /// Hash of the synthesized backing field.
    pub backing_field: TypeHash,
    /// Hash of the add accessor method.
    pub add_method: TypeHash,
    /// Hash of the remove accessor method.
    pub remove_method: TypeHash,
}

/// A declared indexer: `receiver[index]` access.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerDef {
    pub index_type: DataType,
    pub element_type: DataType,
    pub getter: Option<TypeHash>,
    pub setter: Option<TypeHash>,
}

/// The synthesized invocation signature of a delegate type.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateSig {
    pub params: Vec<ParamDef>,
    pub return_type: DataType,
}

/// A type under construction (or an external catalog type).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub type_hash: TypeHash,
    /// Qualified name, e.g. `Bookstore.Book`.
    pub name: String,
    pub visibility: Visibility,
    pub kind: TypeKind,
    /// `None` means the implicit default base (`object`).
    pub base: Option<TypeHash>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub events: Vec<EventDef>,
    pub indexer: Option<IndexerDef>,
    /// Present iff `kind == Delegate`.
    pub delegate_sig: Option<DelegateSig>,
    /// Supplied by the target-type catalog rather than declared here.
    pub is_external: bool,
    /// Usable as the collection of an iteration statement.
    pub is_iterable: bool,
}

impl TypeDef {
    /// Create an empty class or struct descriptor.
    pub fn new(name: impl Into<String>, visibility: Visibility, kind: TypeKind) -> Self {
        let name = name.into();
        debug_assert!(kind != TypeKind::Delegate, "use TypeDef::delegate");
        Self {
            type_hash: TypeHash::from_name(&name),
            name,
            visibility,
            kind,
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
            events: Vec::new(),
            indexer: None,
            delegate_sig: None,
            is_external: false,
            is_iterable: false,
        }
    }

    /// Create a delegate type descriptor.
    ///
    /// A delegate carries exactly one invocation signature and no other
    /// members; this constructor is the only way to attach one.
    pub fn delegate(
        name: impl Into<String>,
        visibility: Visibility,
        params: Vec<ParamDef>,
        return_type: DataType,
    ) -> Self {
        let name = name.into();
        Self {
            type_hash: TypeHash::from_name(&name),
            name,
            visibility,
            kind: TypeKind::Delegate,
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
            events: Vec::new(),
            indexer: None,
            delegate_sig: Some(DelegateSig {
                params,
                return_type,
            }),
            is_external: false,
            is_iterable: false,
        }
    }

    /// Find a visible (non-backing) field by name.
    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name && !f.is_event_backing)
    }

    /// Find a field by its hash, backing fields included.
    pub fn find_field_by_hash(&self, hash: TypeHash) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.field_hash == hash)
    }

    /// Find an event by name.
    pub fn find_event(&self, name: &str) -> Option<&EventDef> {
        self.events.iter().find(|e| e.name == name)
    }

    /// All method overloads with the given name (constructors excluded).
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDef> {
        self.methods
            .iter()
            .filter(move |m| m.kind == MethodKind::Method && m.name == name)
    }

    /// All declared constructors.
    pub fn constructors(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods
            .iter()
            .filter(|m| m.kind == MethodKind::Constructor)
    }

    /// Whether any member (field, event, or method) uses this name.
    pub fn declares_name(&self, name: &str) -> bool {
        self.find_field(name).is_some()
            || self.find_event(name).is_some()
            || self.methods_named(name).next().is_some()
    }

    /// Number of instance fields declared directly on this type.
    pub fn own_instance_field_count(&self) -> u32 {
        self.fields
            .iter()
            .filter(|f| !f.modifiers.is_static())
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::builtins;

    #[test]
    fn delegate_descriptor_carries_only_a_signature() {
        let d = TypeDef::delegate(
            "MyDelegate",
            Visibility::Public,
            vec![ParamDef::new("s", builtins::STRING)],
            DataType::void(),
        );
        assert_eq!(d.kind, TypeKind::Delegate);
        let sig = d.delegate_sig.as_ref().unwrap();
        assert_eq!(sig.params.len(), 1);
        assert!(sig.return_type.is_void());
        assert!(d.fields.is_empty() && d.methods.is_empty() && d.events.is_empty());
    }

    #[test]
    fn backing_fields_are_hidden_from_lookup() {
        let mut t = TypeDef::new("Holder", Visibility::Public, TypeKind::Class);
        t.fields.push(FieldDef {
            name: "changed_backing".into(),
            visibility: Visibility::Private,
            modifiers: Modifiers::empty(),
            data_type: DataType::new(builtins::OBJECT),
            field_hash: TypeHash::from_field(t.type_hash, "changed_backing"),
            slot: 0,
            is_event_backing: true,
        });
        assert!(t.find_field("changed_backing").is_none());
        assert!(
            t.find_field_by_hash(TypeHash::from_field(t.type_hash, "changed_backing"))
                .is_some()
        );
    }

    #[test]
    fn methods_named_excludes_constructors() {
        let mut t = TypeDef::new("Book", Visibility::Public, TypeKind::Struct);
        t.methods.push(MethodDef {
            name: ".ctor".into(),
            visibility: Visibility::Public,
            modifiers: Modifiers::empty(),
            params: vec![],
            return_type: DataType::void(),
            method_hash: TypeHash::from_constructor(t.type_hash, &[]),
            kind: MethodKind::Constructor,
            is_native: false,
        });
        assert_eq!(t.methods_named(".ctor").count(), 0);
        assert_eq!(t.constructors().count(), 1);
    }
}
