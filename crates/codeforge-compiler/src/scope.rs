//! Local variable scopes within a method body.
//!
//! Tracks declared locals (parameters included), assigns frame slots, and
//! enforces lexical scoping: an inner scope may shadow an outer name, and
//! locals disappear when their scope closes. Slots are never reused within
//! a body; the peak slot count becomes the frame size.

use codeforge_core::{BuildError, DataType};

/// A declared local variable or parameter.
#[derive(Debug, Clone)]
pub struct LocalVar {
    /// `None` for compiler-synthesized temporaries.
    pub name: Option<String>,
    pub data_type: DataType,
    /// Frame slot index.
    pub slot: u32,
    /// Lexical depth at declaration; parameters are depth 0.
    pub depth: u32,
}

/// The local scope stack of one method body.
#[derive(Debug, Clone, Default)]
pub struct LocalScope {
    variables: Vec<LocalVar>,
    scope_depth: u32,
    next_slot: u32,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lexical depth.
    pub fn depth(&self) -> u32 {
        self.scope_depth
    }

    /// Number of frame slots the body needs.
    pub fn frame_size(&self) -> u32 {
        self.next_slot
    }

    /// Open a nested scope.
    pub fn push_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Close the current scope, dropping its locals.
    ///
    /// Their slots stay reserved so live values in sibling scopes never
    /// alias.
    pub fn pop_scope(&mut self) {
        debug_assert!(self.scope_depth > 0, "pop without matching push");
        self.variables
            .retain(|var| var.depth < self.scope_depth);
        self.scope_depth -= 1;
    }

    /// Declare a local in the current scope and assign it a slot.
    ///
    /// A named local may shadow an outer scope's name but not collide with
    /// one declared at the same depth. Anonymous temporaries never collide.
    pub fn declare(
        &mut self,
        name: Option<&str>,
        data_type: DataType,
    ) -> Result<u32, BuildError> {
        if let Some(name) = name {
            let taken = self
                .variables
                .iter()
                .any(|var| var.depth == self.scope_depth && var.name.as_deref() == Some(name));
            if taken {
                return Err(BuildError::DuplicateLocal { name: name.into() });
            }
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.variables.push(LocalVar {
            name: name.map(str::to_owned),
            data_type,
            slot,
            depth: self.scope_depth,
        });
        Ok(slot)
    }

    /// Resolve a name to the innermost local declaring it.
    pub fn resolve(&self, name: &str) -> Option<&LocalVar> {
        self.variables
            .iter()
            .rev()
            .find(|var| var.name.as_deref() == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeforge_core::builtins;

    fn int32() -> DataType {
        DataType::new(builtins::INT32)
    }

    #[test]
    fn slots_assigned_in_declaration_order() {
        let mut scope = LocalScope::new();
        assert_eq!(scope.declare(Some("a"), int32()).unwrap(), 0);
        assert_eq!(scope.declare(Some("b"), int32()).unwrap(), 1);
        assert_eq!(scope.declare(None, int32()).unwrap(), 2);
        assert_eq!(scope.frame_size(), 3);
    }

    #[test]
    fn inner_scope_shadows_then_uncovers() {
        let mut scope = LocalScope::new();
        let outer = scope.declare(Some("x"), int32()).unwrap();

        scope.push_scope();
        let inner = scope
            .declare(Some("x"), DataType::new(builtins::STRING))
            .unwrap();
        assert_eq!(scope.resolve("x").unwrap().slot, inner);
        scope.pop_scope();

        assert_eq!(scope.resolve("x").unwrap().slot, outer);
    }

    #[test]
    fn same_depth_redeclaration_is_rejected() {
        let mut scope = LocalScope::new();
        scope.declare(Some("x"), int32()).unwrap();
        let err = scope.declare(Some("x"), int32()).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateLocal { name } if name == "x"));
    }

    #[test]
    fn closed_scope_locals_are_gone_but_slots_stay_reserved() {
        let mut scope = LocalScope::new();
        scope.push_scope();
        scope.declare(Some("tmp"), int32()).unwrap();
        scope.pop_scope();

        assert!(scope.resolve("tmp").is_none());
        // A later declaration must not reuse the dead slot.
        assert_eq!(scope.declare(Some("y"), int32()).unwrap(), 1);
        assert_eq!(scope.frame_size(), 2);
    }
}
