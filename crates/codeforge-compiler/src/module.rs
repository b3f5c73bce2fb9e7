//! Module assembly and finalization.
//!
//! A [`ModuleBuilder`] accumulates the registry, the constant pool, and
//! compiled bodies while the builder surface runs. Finalization is a
//! single consuming pass: validate the graph, freeze it into a
//! [`CompiledModule`], and hand it to a [`ModuleSink`]. After that the
//! builder is gone; nothing can mutate a loaded module.

use codeforge_core::{BuildError, DataType, FinalizeError, LoadError, TypeDef, TypeHash};
use rustc_hash::FxHashMap;

use crate::body::CompiledBody;
use crate::bytecode::ConstantPool;
use crate::registry::SymbolRegistry;

/// A frozen, loadable module.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub name: String,
    /// Declared types, in declaration order.
    pub types: Vec<TypeDef>,
    pub constants: ConstantPool,
    /// Compiled bodies by method hash.
    pub bodies: FxHashMap<TypeHash, CompiledBody>,
    /// Module static slot types, in slot order.
    pub statics: Vec<DataType>,
}

impl CompiledModule {
    /// Find a declared type by hash.
    pub fn type_by_hash(&self, hash: TypeHash) -> Option<&TypeDef> {
        self.types.iter().find(|def| def.type_hash == hash)
    }
}

/// Where a finalized module goes.
///
/// The sink decides what "loading" means: an interpreter, a serializer, a
/// disassembler. Rejection is opaque and unrecoverable.
pub trait ModuleSink {
    type Output;

    fn load(&mut self, module: CompiledModule) -> Result<Self::Output, LoadError>;
}

/// Accumulates one module under construction.
#[derive(Debug)]
pub struct ModuleBuilder {
    name: String,
    registry: SymbolRegistry,
    constants: ConstantPool,
    bodies: FxHashMap<TypeHash, CompiledBody>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: SymbolRegistry::with_builtins(),
            constants: ConstantPool::new(),
            bodies: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SymbolRegistry {
        &mut self.registry
    }

    /// Split borrow for body compilation: statements need the registry
    /// immutably and the pool mutably at the same time.
    pub fn session(&mut self) -> (&SymbolRegistry, &mut ConstantPool) {
        (&self.registry, &mut self.constants)
    }

    /// Attach a finished body to its method.
    pub fn add_body(
        &mut self,
        method_hash: TypeHash,
        body: CompiledBody,
    ) -> Result<(), BuildError> {
        if self.bodies.contains_key(&method_hash) {
            return Err(BuildError::DuplicateMember {
                name: method_hash.to_string(),
                owner: self.name.clone(),
            });
        }
        self.bodies.insert(method_hash, body);
        Ok(())
    }

    pub fn has_body(&self, method_hash: TypeHash) -> bool {
        self.bodies.contains_key(&method_hash)
    }

    /// Validate, freeze, and load the module through a sink.
    ///
    /// Every non-native method of every declared type must have a body by
    /// now; the builder surface synthesizes default constructors and
    /// accessor bodies before calling this.
    pub fn finalize<S: ModuleSink>(self, sink: &mut S) -> Result<S::Output, FinalizeError> {
        for def in self.registry.declared() {
            for method in &def.methods {
                if !method.is_native && !self.bodies.contains_key(&method.method_hash) {
                    return Err(BuildError::IncompleteBody {
                        member: format!("{}.{}", def.name, method.name),
                    }
                    .into());
                }
            }
        }

        let module = CompiledModule {
            name: self.name,
            types: self.registry.declared().cloned().collect(),
            constants: self.constants,
            bodies: self.bodies,
            statics: self.registry.statics().to_vec(),
        };
        Ok(sink.load(module)?)
    }
}
