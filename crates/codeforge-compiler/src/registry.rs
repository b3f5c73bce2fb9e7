//! The module's symbol registry.
//!
//! One registry per module under construction. It owns every type
//! descriptor (declared and catalog-supplied), maps qualified names to
//! hashes, assigns field slots, and answers the assignability questions the
//! operand checker asks. Member mutation goes through the registry so the
//! per-type uniqueness rules are enforced in one place.

use codeforge_core::{
    BuildError, DataType, FieldDef, IndexerDef, MethodDef, MethodKind, Modifiers, ParamDef,
    TypeDef, TypeHash, TypeKind, Visibility, builtins,
};
use rustc_hash::FxHashMap;

/// Symbol registry for one module under construction.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    types: FxHashMap<TypeHash, TypeDef>,
    by_name: FxHashMap<String, TypeHash>,
    /// Declared (non-catalog) types in declaration order.
    order: Vec<TypeHash>,
    /// Module static field slot types, in slot order.
    statics: Vec<DataType>,
}

impl SymbolRegistry {
    /// Create a registry pre-populated with the target-type catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            types: FxHashMap::default(),
            by_name: FxHashMap::default(),
            order: Vec::new(),
            statics: Vec::new(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        let primitives: &[(&str, TypeHash)] = &[
            ("void", builtins::VOID),
            ("bool", builtins::BOOL),
            ("int32", builtins::INT32),
            ("int64", builtins::INT64),
            ("float64", builtins::FLOAT64),
            ("decimal", builtins::DECIMAL),
            ("null", builtins::NULL),
        ];
        for &(name, hash) in primitives {
            self.register_external(catalog_type(name, hash, TypeKind::Struct));
        }

        self.register_external(catalog_type("object", builtins::OBJECT, TypeKind::Class));
        self.register_external(catalog_type("string", builtins::STRING, TypeKind::Class));

        // The growable untyped list: the one iterable the catalog supplies.
        let mut list = catalog_type("list", builtins::LIST, TypeKind::Class);
        list.is_iterable = true;
        let object = DataType::new(builtins::OBJECT);
        let int32 = DataType::new(builtins::INT32);
        list.methods.push(native_method(
            builtins::LIST,
            "add",
            vec![ParamDef::new("item", object)],
            int32,
        ));
        list.methods.push(native_method(
            builtins::LIST,
            "clear",
            vec![],
            DataType::void(),
        ));
        list.methods.push(native_method(
            builtins::LIST,
            "count",
            vec![],
            int32,
        ));
        let get_item = native_method(
            builtins::LIST,
            "get_item",
            vec![ParamDef::new("index", int32)],
            object,
        );
        let set_item = native_method(
            builtins::LIST,
            "set_item",
            vec![ParamDef::new("index", int32), ParamDef::new("value", object)],
            DataType::void(),
        );
        list.indexer = Some(IndexerDef {
            index_type: int32,
            element_type: object,
            getter: Some(get_item.method_hash),
            setter: Some(set_item.method_hash),
        });
        list.methods.push(get_item);
        list.methods.push(set_item);
        self.register_external(list);
    }

    fn register_external(&mut self, def: TypeDef) {
        self.by_name.insert(def.name.clone(), def.type_hash);
        self.types.insert(def.type_hash, def);
    }

    // =========================================================================
    // Type Registration & Lookup
    // =========================================================================

    /// Register a declared type.
    pub fn register(&mut self, def: TypeDef) -> Result<TypeHash, BuildError> {
        if self.by_name.contains_key(&def.name) {
            return Err(BuildError::DuplicateType(def.name.clone()));
        }
        if let Some(base) = def.base
            && !self.types.contains_key(&base)
        {
            return Err(BuildError::UnknownType(base.to_string()));
        }
        let hash = def.type_hash;
        self.by_name.insert(def.name.clone(), hash);
        self.order.push(hash);
        self.types.insert(hash, def);
        Ok(hash)
    }

    /// Look up a type by hash.
    pub fn get(&self, hash: TypeHash) -> Option<&TypeDef> {
        self.types.get(&hash)
    }

    /// Look up a type by hash, erroring if unknown.
    pub fn expect(&self, hash: TypeHash) -> Result<&TypeDef, BuildError> {
        self.types
            .get(&hash)
            .ok_or_else(|| BuildError::UnknownType(hash.to_string()))
    }

    /// Look up a type by qualified name.
    pub fn get_by_name(&self, name: &str) -> Option<&TypeDef> {
        self.by_name.get(name).and_then(|hash| self.types.get(hash))
    }

    /// Declared types, in declaration order.
    pub fn declared(&self) -> impl Iterator<Item = &TypeDef> {
        self.order.iter().filter_map(|hash| self.types.get(hash))
    }

    /// Static field slot types, in slot order.
    pub fn statics(&self) -> &[DataType] {
        &self.statics
    }

    /// Walk a type and its bases, most-derived first.
    ///
    /// Types without a declared base get `object` appended implicitly,
    /// except `object` itself, the non-reference primitives, and delegates.
    pub fn chain(&self, start: TypeHash) -> impl Iterator<Item = &TypeDef> {
        let mut next = Some(start);
        std::iter::from_fn(move || {
            let hash = next?;
            let def = self.types.get(&hash)?;
            next = match def.base {
                Some(base) => Some(base),
                None => {
                    let implicit = hash != builtins::OBJECT
                        && hash != builtins::VOID
                        && hash != builtins::NULL
                        && def.kind == TypeKind::Class;
                    implicit.then_some(builtins::OBJECT)
                }
            };
            Some(def)
        })
    }

    /// Total instance field slots of a type, base chain included.
    pub fn instance_field_count(&self, hash: TypeHash) -> u32 {
        self.chain(hash).map(TypeDef::own_instance_field_count).sum()
    }

    /// Whether a type is a declared delegate.
    pub fn is_delegate(&self, hash: TypeHash) -> bool {
        self.get(hash)
            .map(|def| def.kind == TypeKind::Delegate)
            .unwrap_or(false)
    }

    /// Whether a type can drive an iteration statement.
    pub fn is_iterable(&self, hash: TypeHash) -> bool {
        self.chain(hash).any(|def| def.is_iterable)
    }

    // =========================================================================
    // Assignability
    // =========================================================================

    /// Check whether a value of type `from` may flow into a slot of type
    /// `to` without an explicit conversion.
    ///
    /// Identity, the numeric widening ladder, null-to-reference, and
    /// derived-to-base (with `object` as the universal sink). Narrowing is
    /// never implicit.
    pub fn is_assignable(&self, from: DataType, to: DataType) -> bool {
        if from == to {
            return true;
        }
        if from.is_void() || to.is_void() || to.is_null() {
            return false;
        }
        if from.is_null() {
            return self.is_reference(to);
        }
        if from.widens_to(to) {
            return true;
        }
        if to.hash == builtins::OBJECT {
            return true;
        }
        self.chain(from.hash).any(|def| def.type_hash == to.hash)
    }

    /// Conversion cost for overload ranking: 0 for identity, 1 for any
    /// implicit conversion, `None` when not assignable.
    pub fn conversion_cost(&self, from: DataType, to: DataType) -> Option<u32> {
        if from == to {
            Some(0)
        } else if self.is_assignable(from, to) {
            Some(1)
        } else {
            None
        }
    }

    /// Common type of two binary arithmetic/comparison operands.
    pub fn promote(&self, a: DataType, b: DataType) -> Option<DataType> {
        if !a.is_numeric() || !b.is_numeric() {
            return None;
        }
        if a == b {
            Some(a)
        } else if a.widens_to(b) {
            Some(b)
        } else if b.widens_to(a) {
            Some(a)
        } else {
            None
        }
    }

    fn is_reference(&self, data_type: DataType) -> bool {
        !(data_type.is_numeric()
            || data_type.is_bool()
            || data_type.is_void()
            || data_type.is_null())
    }

    // =========================================================================
    // Member Declaration
    // =========================================================================

    /// Declare a field, assigning its slot.
    ///
    /// Instance slots are absolute: base-chain fields first, so a derived
    /// object's layout extends its base's. Static fields take module-wide
    /// slots.
    pub fn add_field(
        &mut self,
        owner: TypeHash,
        name: &str,
        visibility: Visibility,
        modifiers: Modifiers,
        data_type: DataType,
        is_event_backing: bool,
    ) -> Result<TypeHash, BuildError> {
        let def = self.expect(owner)?;
        if def.kind == TypeKind::Delegate {
            return Err(BuildError::InvalidContext {
                message: format!("delegate type '{}' cannot declare fields", def.name),
            });
        }
        if def.declares_name(name) {
            return Err(BuildError::DuplicateMember {
                name: name.into(),
                owner: def.name.clone(),
            });
        }
        if data_type.is_void() {
            return Err(BuildError::TypeMismatch {
                message: format!("field '{name}' cannot have type void"),
            });
        }

        let slot = if modifiers.is_static() {
            let slot = self.statics.len() as u32;
            self.statics.push(data_type);
            slot
        } else {
            self.instance_field_count(owner)
        };

        let field_hash = TypeHash::from_field(owner, name);
        let owner_def = self
            .types
            .get_mut(&owner)
            .ok_or_else(|| BuildError::UnknownType(owner.to_string()))?;
        owner_def.fields.push(FieldDef {
            name: name.into(),
            visibility,
            modifiers,
            data_type,
            field_hash,
            slot,
            is_event_backing,
        });
        Ok(field_hash)
    }

    /// Declare a method, constructor, or accessor.
    ///
    /// Overloads are legal; an identical signature, or a name already taken
    /// by a field or event, is not.
    #[allow(clippy::too_many_arguments)]
    pub fn add_method(
        &mut self,
        owner: TypeHash,
        name: &str,
        visibility: Visibility,
        modifiers: Modifiers,
        params: Vec<ParamDef>,
        return_type: DataType,
        kind: MethodKind,
        is_native: bool,
    ) -> Result<TypeHash, BuildError> {
        let def = self.expect(owner)?;
        if def.kind == TypeKind::Delegate {
            return Err(BuildError::InvalidContext {
                message: format!("delegate type '{}' cannot declare methods", def.name),
            });
        }
        if kind == MethodKind::Method
            && (def.find_field(name).is_some() || def.find_event(name).is_some())
        {
            return Err(BuildError::DuplicateMember {
                name: name.into(),
                owner: def.name.clone(),
            });
        }

        let param_hashes: Vec<TypeHash> = params.iter().map(|p| p.data_type.hash).collect();
        let method_hash = if kind == MethodKind::Constructor {
            TypeHash::from_constructor(owner, &param_hashes)
        } else {
            TypeHash::from_method(owner, name, &param_hashes)
        };

        let method = MethodDef {
            name: name.into(),
            visibility,
            modifiers,
            params,
            return_type,
            method_hash,
            kind,
            is_native,
        };

        if def.methods.iter().any(|m| m.method_hash == method_hash) {
            return Err(BuildError::DuplicateMember {
                name: method.signature_string(),
                owner: def.name.clone(),
            });
        }

        let owner_def = self
            .types
            .get_mut(&owner)
            .ok_or_else(|| BuildError::UnknownType(owner.to_string()))?;
        owner_def.methods.push(method);
        Ok(method_hash)
    }

    /// Attach an indexer to a type.
    pub fn add_indexer(&mut self, owner: TypeHash, indexer: IndexerDef) -> Result<(), BuildError> {
        let def = self.expect(owner)?;
        if def.indexer.is_some() {
            return Err(BuildError::DuplicateMember {
                name: "this[]".into(),
                owner: def.name.clone(),
            });
        }
        let owner_def = self
            .types
            .get_mut(&owner)
            .ok_or_else(|| BuildError::UnknownType(owner.to_string()))?;
        owner_def.indexer = Some(indexer);
        Ok(())
    }

    /// Record an event descriptor on its owner.
    ///
    /// The caller (the builder surface) synthesizes the backing field and
    /// accessor methods first; this ties them together and enforces name
    /// uniqueness.
    pub fn add_event(
        &mut self,
        owner: TypeHash,
        event: codeforge_core::EventDef,
    ) -> Result<(), BuildError> {
        let def = self.expect(owner)?;
        if def.find_event(&event.name).is_some() || def.find_field(&event.name).is_some() {
            return Err(BuildError::DuplicateMember {
                name: event.name.clone(),
                owner: def.name.clone(),
            });
        }
        let owner_def = self
            .types
            .get_mut(&owner)
            .ok_or_else(|| BuildError::UnknownType(owner.to_string()))?;
        owner_def.events.push(event);
        Ok(())
    }
}

fn catalog_type(name: &str, hash: TypeHash, kind: TypeKind) -> TypeDef {
    let mut def = TypeDef::new(name, Visibility::Public, kind);
    def.type_hash = hash;
    def.is_external = true;
    def
}

fn native_method(
    owner: TypeHash,
    name: &str,
    params: Vec<ParamDef>,
    return_type: DataType,
) -> MethodDef {
    let param_hashes: Vec<TypeHash> = params.iter().map(|p| p.data_type.hash).collect();
    MethodDef {
        name: name.into(),
        visibility: Visibility::Public,
        modifiers: Modifiers::empty(),
        params,
        return_type,
        method_hash: TypeHash::from_method(owner, name, &param_hashes),
        kind: MethodKind::Method,
        is_native: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(hash: TypeHash) -> DataType {
        DataType::new(hash)
    }

    #[test]
    fn builtins_are_resolvable_by_name() {
        let registry = SymbolRegistry::with_builtins();
        assert_eq!(registry.get_by_name("int32").unwrap().type_hash, builtins::INT32);
        assert_eq!(registry.get_by_name("list").unwrap().type_hash, builtins::LIST);
        assert!(registry.get_by_name("list").unwrap().is_iterable);
        assert_eq!(registry.declared().count(), 0);
    }

    #[test]
    fn list_catalog_surface() {
        let registry = SymbolRegistry::with_builtins();
        let list = registry.get(builtins::LIST).unwrap();
        assert!(list.methods_named("add").next().unwrap().is_native);
        assert!(list.methods_named("count").next().is_some());
        let indexer = list.indexer.as_ref().unwrap();
        assert_eq!(indexer.index_type, dt(builtins::INT32));
        assert_eq!(indexer.element_type, dt(builtins::OBJECT));
    }

    #[test]
    fn duplicate_type_names_are_rejected() {
        let mut registry = SymbolRegistry::with_builtins();
        registry
            .register(TypeDef::new("Book", Visibility::Public, TypeKind::Struct))
            .unwrap();
        let err = registry
            .register(TypeDef::new("Book", Visibility::Public, TypeKind::Class))
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateType(name) if name == "Book"));
    }

    #[test]
    fn assignability_rules() {
        let mut registry = SymbolRegistry::with_builtins();
        let base = registry
            .register(TypeDef::new("Animal", Visibility::Public, TypeKind::Class))
            .unwrap();
        let mut derived = TypeDef::new("Dog", Visibility::Public, TypeKind::Class);
        derived.base = Some(base);
        let derived = registry.register(derived).unwrap();

        // Identity and widening.
        assert!(registry.is_assignable(dt(builtins::INT32), dt(builtins::INT32)));
        assert!(registry.is_assignable(dt(builtins::INT32), dt(builtins::INT64)));
        assert!(registry.is_assignable(dt(builtins::INT64), dt(builtins::DECIMAL)));
        assert!(!registry.is_assignable(dt(builtins::INT64), dt(builtins::INT32)));
        assert!(!registry.is_assignable(dt(builtins::FLOAT64), dt(builtins::DECIMAL)));

        // References.
        assert!(registry.is_assignable(dt(derived), dt(base)));
        assert!(!registry.is_assignable(dt(base), dt(derived)));
        assert!(registry.is_assignable(dt(derived), dt(builtins::OBJECT)));
        assert!(registry.is_assignable(dt(builtins::INT32), dt(builtins::OBJECT)));

        // Null.
        assert!(registry.is_assignable(dt(builtins::NULL), dt(base)));
        assert!(registry.is_assignable(dt(builtins::NULL), dt(builtins::STRING)));
        assert!(!registry.is_assignable(dt(builtins::NULL), dt(builtins::INT32)));
    }

    #[test]
    fn promotion_picks_the_wider_operand() {
        let registry = SymbolRegistry::with_builtins();
        assert_eq!(
            registry.promote(dt(builtins::INT32), dt(builtins::INT64)),
            Some(dt(builtins::INT64))
        );
        assert_eq!(
            registry.promote(dt(builtins::INT32), dt(builtins::DECIMAL)),
            Some(dt(builtins::DECIMAL))
        );
        assert_eq!(
            registry.promote(dt(builtins::FLOAT64), dt(builtins::DECIMAL)),
            None
        );
        assert_eq!(registry.promote(dt(builtins::STRING), dt(builtins::INT32)), None);
    }

    #[test]
    fn derived_field_slots_extend_the_base_layout() {
        let mut registry = SymbolRegistry::with_builtins();
        let base = registry
            .register(TypeDef::new("Base", Visibility::Public, TypeKind::Class))
            .unwrap();
        registry
            .add_field(
                base,
                "a",
                Visibility::Private,
                Modifiers::empty(),
                dt(builtins::INT32),
                false,
            )
            .unwrap();

        let mut derived = TypeDef::new("Derived", Visibility::Public, TypeKind::Class);
        derived.base = Some(base);
        let derived = registry.register(derived).unwrap();
        registry
            .add_field(
                derived,
                "b",
                Visibility::Private,
                Modifiers::empty(),
                dt(builtins::INT32),
                false,
            )
            .unwrap();

        let b = registry.get(derived).unwrap().find_field("b").unwrap();
        assert_eq!(b.slot, 1);
        assert_eq!(registry.instance_field_count(derived), 2);
    }

    #[test]
    fn static_fields_take_module_slots() {
        let mut registry = SymbolRegistry::with_builtins();
        let t = registry
            .register(TypeDef::new("Counters", Visibility::Public, TypeKind::Class))
            .unwrap();
        registry
            .add_field(
                t,
                "total",
                Visibility::Public,
                Modifiers::STATIC,
                dt(builtins::INT32),
                false,
            )
            .unwrap();
        registry
            .add_field(
                t,
                "name",
                Visibility::Public,
                Modifiers::STATIC,
                dt(builtins::STRING),
                false,
            )
            .unwrap();
        assert_eq!(registry.statics().len(), 2);
        assert_eq!(registry.statics()[1], dt(builtins::STRING));
    }

    #[test]
    fn duplicate_signature_is_rejected_but_overloads_are_not() {
        let mut registry = SymbolRegistry::with_builtins();
        let t = registry
            .register(TypeDef::new("Math2", Visibility::Public, TypeKind::Class))
            .unwrap();
        registry
            .add_method(
                t,
                "abs",
                Visibility::Public,
                Modifiers::STATIC,
                vec![ParamDef::new("v", builtins::INT32)],
                dt(builtins::INT32),
                MethodKind::Method,
                false,
            )
            .unwrap();
        // A different parameter list is a legal overload.
        registry
            .add_method(
                t,
                "abs",
                Visibility::Public,
                Modifiers::STATIC,
                vec![ParamDef::new("v", builtins::FLOAT64)],
                dt(builtins::FLOAT64),
                MethodKind::Method,
                false,
            )
            .unwrap();
        let err = registry
            .add_method(
                t,
                "abs",
                Visibility::Public,
                Modifiers::STATIC,
                vec![ParamDef::new("other", builtins::INT32)],
                dt(builtins::INT32),
                MethodKind::Method,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMember { .. }));
    }
}
