//! Member resolution and overload selection.
//!
//! Resolution walks the receiver's base chain most-derived first and stops
//! at the first type declaring the name: a derived member hides every base
//! member of that name, so base overloads never join a derived overload
//! set. Among the overloads found there, a candidate is applicable when the
//! argument count matches and every argument is assignable to its
//! parameter without narrowing. Exact matches beat widening ones; a tie is
//! ambiguous.

use codeforge_core::{
    BuildError, DataType, EventDef, FieldDef, IndexerDef, MethodDef, MethodKind, TypeDef,
    TypeHash, TypeKind, builtins,
};

use crate::registry::SymbolRegistry;

/// What kind of receiver a member access goes through.
///
/// The tag decides static filtering and, for `Base`, where the chain walk
/// starts; it is attached when the receiver operand is built, not inferred
/// at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverKind {
    /// An instance expression.
    Instance(DataType),
    /// A type name; only static members apply.
    Static(TypeHash),
    /// The implicit `this` of the body being compiled.
    SelfRef(TypeHash),
    /// The `base` view of `this`: resolution starts at the base type.
    Base(TypeHash),
}

impl ReceiverKind {
    /// The type the chain walk starts at.
    pub fn start_type(&self) -> TypeHash {
        match self {
            ReceiverKind::Instance(dt) => dt.hash,
            ReceiverKind::Static(hash)
            | ReceiverKind::SelfRef(hash)
            | ReceiverKind::Base(hash) => *hash,
        }
    }

    /// Whether only static members apply.
    pub fn wants_static(&self) -> bool {
        matches!(self, ReceiverKind::Static(_))
    }

    /// Render the receiver for error messages.
    pub fn describe(&self, registry: &SymbolRegistry) -> String {
        let hash = self.start_type();
        let name = registry
            .get(hash)
            .map(|def| def.name.clone())
            .unwrap_or_else(|| hash.to_string());
        match self {
            ReceiverKind::Instance(_) | ReceiverKind::SelfRef(_) => name,
            ReceiverKind::Static(_) => format!("static {name}"),
            ReceiverKind::Base(_) => format!("base {name}"),
        }
    }
}

/// A resolved field or event reference.
#[derive(Debug, Clone, Copy)]
pub enum MemberRef<'a> {
    Field {
        owner: &'a TypeDef,
        field: &'a FieldDef,
    },
    Event {
        owner: &'a TypeDef,
        event: &'a EventDef,
    },
}

/// Resolve a field or event by name.
pub fn resolve_member<'a>(
    registry: &'a SymbolRegistry,
    receiver: &ReceiverKind,
    name: &str,
) -> Result<MemberRef<'a>, BuildError> {
    for def in registry.chain(receiver.start_type()) {
        if let Some(field) = def.find_field(name) {
            if field.modifiers.is_static() != receiver.wants_static() {
                return Err(BuildError::InvalidContext {
                    message: static_mismatch(name, field.modifiers.is_static()),
                });
            }
            return Ok(MemberRef::Field { owner: def, field });
        }
        if let Some(event) = def.find_event(name) {
            return Ok(MemberRef::Event { owner: def, event });
        }
        if def.methods_named(name).next().is_some() {
            // The name is hidden by a method here; it is not a field.
            break;
        }
    }
    Err(BuildError::UnresolvedMember {
        name: name.into(),
        receiver: receiver.describe(registry),
    })
}

/// Resolve a method call by name and argument types.
pub fn resolve_method<'a>(
    registry: &'a SymbolRegistry,
    receiver: &ReceiverKind,
    name: &'a str,
    args: &[DataType],
) -> Result<&'a MethodDef, BuildError> {
    for def in registry.chain(receiver.start_type()) {
        if !def.declares_name(name) {
            continue;
        }
        let candidates: Vec<&MethodDef> = def
            .methods_named(name)
            .filter(|m| m.is_static() == receiver.wants_static())
            .collect();
        if candidates.is_empty() {
            // A field or event hides the name, or every overload is on the
            // wrong side of the static divide.
            break;
        }
        return pick_overload(registry, receiver, name, &candidates, args);
    }
    Err(BuildError::UnresolvedMember {
        name: name.into(),
        receiver: receiver.describe(registry),
    })
}

/// A resolved constructor call.
#[derive(Debug, Clone)]
pub struct CtorResolution {
    pub method_hash: TypeHash,
    /// Declared parameter types, for argument coercion.
    pub param_types: Vec<DataType>,
    /// True when the type declares no constructors and the zero-argument
    /// default is synthesized at finalization.
    pub implicit_default: bool,
}

/// Resolve a constructor for an object construction expression.
pub fn resolve_ctor(
    registry: &SymbolRegistry,
    type_hash: TypeHash,
    args: &[DataType],
) -> Result<CtorResolution, BuildError> {
    let def = registry.expect(type_hash)?;
    if def.kind == TypeKind::Delegate {
        return Err(BuildError::InvalidContext {
            message: format!("'{}' is a delegate; construct it from a method", def.name),
        });
    }
    if def.is_external && def.type_hash != builtins::LIST {
        return Err(BuildError::InvalidContext {
            message: format!("catalog type '{}' cannot be constructed", def.name),
        });
    }

    let ctors: Vec<&MethodDef> = def.constructors().collect();
    if ctors.is_empty() {
        if args.is_empty() {
            return Ok(CtorResolution {
                method_hash: TypeHash::from_constructor(type_hash, &[]),
                param_types: Vec::new(),
                implicit_default: true,
            });
        }
        return Err(BuildError::UnresolvedMember {
            name: ".ctor".into(),
            receiver: def.name.clone(),
        });
    }

    let receiver = ReceiverKind::Instance(DataType::new(type_hash));
    let picked = pick_overload(registry, &receiver, ".ctor", &ctors, args)?;
    Ok(CtorResolution {
        method_hash: picked.method_hash,
        param_types: picked.params.iter().map(|p| p.data_type).collect(),
        implicit_default: false,
    })
}

/// Resolve an event by name.
pub fn resolve_event<'a>(
    registry: &'a SymbolRegistry,
    receiver: &ReceiverKind,
    name: &str,
) -> Result<(&'a TypeDef, &'a EventDef), BuildError> {
    match resolve_member(registry, receiver, name)? {
        MemberRef::Event { owner, event } => Ok((owner, event)),
        MemberRef::Field { owner, .. } => Err(BuildError::UnresolvedMember {
            name: format!("{name} (a field, not an event)"),
            receiver: owner.name.clone(),
        }),
    }
}

/// Resolve the indexer of a receiver type.
pub fn resolve_indexer<'a>(
    registry: &'a SymbolRegistry,
    receiver_type: TypeHash,
) -> Result<&'a IndexerDef, BuildError> {
    registry
        .chain(receiver_type)
        .find_map(|def| def.indexer.as_ref())
        .ok_or_else(|| BuildError::UnresolvedMember {
            name: "this[]".into(),
            receiver: ReceiverKind::Instance(DataType::new(receiver_type)).describe(registry),
        })
}

/// Rank applicable candidates by total conversion cost; exact matches cost
/// zero per argument, so an all-exact candidate always beats a widening
/// one. Ties are ambiguous.
fn pick_overload<'a>(
    registry: &SymbolRegistry,
    receiver: &ReceiverKind,
    name: &str,
    candidates: &[&'a MethodDef],
    args: &[DataType],
) -> Result<&'a MethodDef, BuildError> {
    let mut best: Option<(&MethodDef, u32)> = None;
    let mut tie_count = 0usize;

    for &candidate in candidates {
        let Some(cost) = applicability_cost(registry, candidate, args) else {
            continue;
        };
        match best {
            None => {
                best = Some((candidate, cost));
                tie_count = 1;
            }
            Some((_, best_cost)) if cost < best_cost => {
                best = Some((candidate, cost));
                tie_count = 1;
            }
            Some((_, best_cost)) if cost == best_cost => tie_count += 1,
            Some(_) => {}
        }
    }

    match best {
        Some((picked, _)) if tie_count == 1 => Ok(picked),
        Some(_) => Err(BuildError::AmbiguousMember {
            name: name.into(),
            count: tie_count,
        }),
        None => Err(BuildError::UnresolvedMember {
            name: name.into(),
            receiver: receiver.describe(registry),
        }),
    }
}

fn applicability_cost(
    registry: &SymbolRegistry,
    candidate: &MethodDef,
    args: &[DataType],
) -> Option<u32> {
    if candidate.params.len() != args.len() {
        return None;
    }
    let mut total = 0u32;
    for (param, &arg) in candidate.params.iter().zip(args) {
        total += registry.conversion_cost(arg, param.data_type)?;
    }
    Some(total)
}

fn static_mismatch(name: &str, member_is_static: bool) -> String {
    if member_is_static {
        format!("static member '{name}' accessed through an instance")
    } else {
        format!("instance member '{name}' accessed through a type name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeforge_core::{Modifiers, ParamDef, Visibility};

    fn dt(hash: TypeHash) -> DataType {
        DataType::new(hash)
    }

    fn registry_with(types: &[(&str, Option<&str>)]) -> SymbolRegistry {
        let mut registry = SymbolRegistry::with_builtins();
        for &(name, base) in types {
            let mut def = TypeDef::new(name, Visibility::Public, TypeKind::Class);
            if let Some(base) = base {
                def.base = Some(TypeHash::from_name(base));
            }
            registry.register(def).unwrap();
        }
        registry
    }

    fn add_method(
        registry: &mut SymbolRegistry,
        owner: &str,
        name: &str,
        params: &[TypeHash],
        is_static: bool,
    ) -> TypeHash {
        let owner = TypeHash::from_name(owner);
        let modifiers = if is_static {
            Modifiers::STATIC
        } else {
            Modifiers::empty()
        };
        let params = params
            .iter()
            .enumerate()
            .map(|(i, &p)| ParamDef::new(format!("p{i}"), p))
            .collect();
        registry
            .add_method(
                owner,
                name,
                Visibility::Public,
                modifiers,
                params,
                DataType::void(),
                MethodKind::Method,
                false,
            )
            .unwrap()
    }

    #[test]
    fn exact_match_beats_widening() {
        let mut registry = registry_with(&[("Printer", None)]);
        let exact = add_method(&mut registry, "Printer", "print", &[builtins::INT32], false);
        add_method(&mut registry, "Printer", "print", &[builtins::INT64], false);

        let receiver = ReceiverKind::Instance(dt(TypeHash::from_name("Printer")));
        let picked = resolve_method(&registry, &receiver, "print", &[dt(builtins::INT32)]).unwrap();
        assert_eq!(picked.method_hash, exact);
    }

    #[test]
    fn equally_wide_overloads_are_ambiguous() {
        let mut registry = registry_with(&[("Printer", None)]);
        add_method(&mut registry, "Printer", "print", &[builtins::INT64], false);
        add_method(&mut registry, "Printer", "print", &[builtins::FLOAT64], false);

        let receiver = ReceiverKind::Instance(dt(TypeHash::from_name("Printer")));
        let err =
            resolve_method(&registry, &receiver, "print", &[dt(builtins::INT32)]).unwrap_err();
        assert!(matches!(err, BuildError::AmbiguousMember { count: 2, .. }));
    }

    #[test]
    fn derived_declaration_hides_base_overloads() {
        let mut registry = registry_with(&[("Base", None), ("Derived", Some("Base"))]);
        // Base has the exact overload, but Derived declares the name, so
        // only Derived's widening overload is considered.
        add_method(&mut registry, "Base", "emit", &[builtins::INT32], false);
        let wide = add_method(&mut registry, "Derived", "emit", &[builtins::INT64], false);

        let receiver = ReceiverKind::Instance(dt(TypeHash::from_name("Derived")));
        let picked = resolve_method(&registry, &receiver, "emit", &[dt(builtins::INT32)]).unwrap();
        assert_eq!(picked.method_hash, wide);
    }

    #[test]
    fn base_receiver_starts_past_the_derived_type() {
        let mut registry = registry_with(&[("Base", None), ("Derived", Some("Base"))]);
        let base_m = add_method(&mut registry, "Base", "emit", &[], false);
        add_method(&mut registry, "Derived", "emit", &[], false);

        let receiver = ReceiverKind::Base(TypeHash::from_name("Base"));
        let picked = resolve_method(&registry, &receiver, "emit", &[]).unwrap();
        assert_eq!(picked.method_hash, base_m);
    }

    #[test]
    fn static_receiver_sees_only_static_members() {
        let mut registry = registry_with(&[("Util", None)]);
        add_method(&mut registry, "Util", "run", &[], false);
        let err = resolve_method(
            &registry,
            &ReceiverKind::Static(TypeHash::from_name("Util")),
            "run",
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedMember { .. }));

        let s = add_method(&mut registry, "Util", "run_static", &[], true);
        let picked = resolve_method(
            &registry,
            &ReceiverKind::Static(TypeHash::from_name("Util")),
            "run_static",
            &[],
        )
        .unwrap();
        assert_eq!(picked.method_hash, s);
    }

    #[test]
    fn missing_member_reports_the_receiver() {
        let registry = registry_with(&[("Book", None)]);
        let receiver = ReceiverKind::Instance(dt(TypeHash::from_name("Book")));
        let err = resolve_member(&registry, &receiver, "price").unwrap_err();
        assert!(
            matches!(err, BuildError::UnresolvedMember { name, receiver }
                if name == "price" && receiver == "Book")
        );
    }

    #[test]
    fn ctorless_type_gets_an_implicit_default() {
        let registry = registry_with(&[("Plain", None)]);
        let plain = TypeHash::from_name("Plain");
        let resolved = resolve_ctor(&registry, plain, &[]).unwrap();
        assert!(resolved.implicit_default);
        assert_eq!(resolved.method_hash, TypeHash::from_constructor(plain, &[]));

        let err = resolve_ctor(&registry, plain, &[dt(builtins::INT32)]).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedMember { .. }));
    }

    #[test]
    fn list_indexer_resolves_through_the_catalog() {
        let registry = SymbolRegistry::with_builtins();
        let indexer = resolve_indexer(&registry, builtins::LIST).unwrap();
        assert!(indexer.getter.is_some() && indexer.setter.is_some());

        let err = resolve_indexer(&registry, builtins::STRING).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedMember { .. }));
    }
}
