//! The per-body builder surface.
//!
//! A [`CodeGen`] wraps one open method body: expression helpers build
//! checked operands, statement helpers emit bytecode through the body
//! compiler. Constructor bodies get a prologue (base constructor call,
//! then field initializers) emitted lazily before the first statement, so
//! an explicit base chaining call can still replace the implicit one.

use codeforge_compiler::body::BodyCompiler;
use codeforge_compiler::operand::{self, BinOp, Callee, DelegateTarget, Operand};
use codeforge_core::{BuildError, DataType, TypeHash, builtins};

use crate::module_gen::{FieldInit, ModuleGen};

/// Builder for one method, constructor, or accessor body.
#[derive(Debug)]
pub struct CodeGen<'m> {
    module: &'m mut ModuleGen,
    body: BodyCompiler,
    method_hash: TypeHash,
    prologue_done: bool,
    inits: Vec<FieldInit>,
}

impl<'m> CodeGen<'m> {
    pub(crate) fn new(
        module: &'m mut ModuleGen,
        body: BodyCompiler,
        method_hash: TypeHash,
        is_ctor: bool,
        inits: Vec<FieldInit>,
    ) -> Self {
        Self {
            module,
            body,
            method_hash,
            prologue_done: !is_ctor,
            inits,
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Reference a parameter by name.
    pub fn arg(&self, name: &str) -> Result<Operand, BuildError> {
        self.body.arg(name)
    }

    /// Reference the current instance.
    pub fn this(&self) -> Result<Operand, BuildError> {
        self.body.this_ref()
    }

    /// Reference the current instance as its base type.
    pub fn base(&self) -> Result<Operand, BuildError> {
        self.body.base_ref()
    }

    /// Access a field (or, inside its owner, an event's backing delegate).
    pub fn field(&self, receiver: &Operand, name: &str) -> Result<Operand, BuildError> {
        operand::field_access(
            self.module.builder.registry(),
            Some(self.body.context().owner),
            receiver.clone(),
            name,
        )
    }

    /// Access a static field of a type.
    pub fn static_field(&self, owner: TypeHash, name: &str) -> Result<Operand, BuildError> {
        operand::static_field_access(self.module.builder.registry(), owner, name)
    }

    /// Index into a value: `receiver[index]`.
    pub fn index(
        &self,
        receiver: &Operand,
        index: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        operand::index_access(self.module.builder.registry(), receiver.clone(), index.into())
    }

    pub fn add(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Mul, lhs, rhs)
    }

    pub fn div(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Div, lhs, rhs)
    }

    pub fn rem(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Mod, lhs, rhs)
    }

    pub fn eq(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Eq, lhs, rhs)
    }

    pub fn ne(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Ne, lhs, rhs)
    }

    pub fn lt(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Lt, lhs, rhs)
    }

    pub fn le(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Le, lhs, rhs)
    }

    pub fn gt(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Gt, lhs, rhs)
    }

    pub fn ge(
        &self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.binary(BinOp::Ge, lhs, rhs)
    }

    fn binary(
        &self,
        op: BinOp,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        operand::binary(self.module.builder.registry(), op, lhs.into(), rhs.into())
    }

    /// Arithmetic negation.
    pub fn neg(&self, value: impl Into<Operand>) -> Result<Operand, BuildError> {
        operand::negate(value.into())
    }

    /// Boolean negation.
    pub fn not(&self, value: impl Into<Operand>) -> Result<Operand, BuildError> {
        operand::logical_not(value.into())
    }

    /// Build an instance method call expression.
    pub fn call(
        &self,
        receiver: &Operand,
        name: &str,
        args: Vec<Operand>,
    ) -> Result<Operand, BuildError> {
        operand::call(
            self.module.builder.registry(),
            Callee::Instance(receiver.clone()),
            name,
            args,
        )
    }

    /// Build a static method call expression.
    pub fn call_static(
        &self,
        owner: TypeHash,
        name: &str,
        args: Vec<Operand>,
    ) -> Result<Operand, BuildError> {
        operand::call(
            self.module.builder.registry(),
            Callee::Static(owner),
            name,
            args,
        )
    }

    /// Build a construction expression.
    pub fn new_obj(
        &self,
        type_hash: TypeHash,
        args: Vec<Operand>,
    ) -> Result<Operand, BuildError> {
        operand::new_object(self.module.builder.registry(), type_hash, args)
    }

    /// Build an empty catalog list.
    pub fn new_list(&self) -> Result<Operand, BuildError> {
        self.new_obj(builtins::LIST, vec![])
    }

    /// Build a delegate construction expression.
    pub fn new_delegate(
        &self,
        delegate_type: TypeHash,
        target: DelegateTarget,
    ) -> Result<Operand, BuildError> {
        operand::new_delegate(self.module.builder.registry(), delegate_type, target)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Declare an uninitialized local of an explicit type.
    pub fn declare(&mut self, name: &str, data_type: DataType) -> Result<Operand, BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body
            .declare_local(registry, pool, Some(name), Some(data_type), None)
    }

    /// Declare a local whose type is inferred from its initializer.
    pub fn declare_init(
        &mut self,
        name: &str,
        value: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body
            .declare_local(registry, pool, Some(name), None, Some(value.into()))
    }

    /// Declare a typed local with an initializer.
    pub fn declare_init_as(
        &mut self,
        name: &str,
        data_type: DataType,
        value: impl Into<Operand>,
    ) -> Result<Operand, BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body
            .declare_local(registry, pool, Some(name), Some(data_type), Some(value.into()))
    }

    /// Assign a value to an addressable target.
    pub fn assign(
        &mut self,
        target: &Operand,
        value: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body.assign(registry, pool, target, value.into())
    }

    /// `target = target + value`.
    pub fn add_assign(
        &mut self,
        target: &Operand,
        value: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body
            .assign_op(registry, pool, BinOp::Add, target, value.into())
    }

    /// `target = target - value`.
    pub fn sub_assign(
        &mut self,
        target: &Operand,
        value: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body
            .assign_op(registry, pool, BinOp::Sub, target, value.into())
    }

    /// Call an instance method as a statement, discarding any result.
    pub fn invoke(
        &mut self,
        receiver: &Operand,
        name: &str,
        args: Vec<Operand>,
    ) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let expr = self.call(receiver, name, args)?;
        let (registry, pool) = self.module.builder.session();
        self.body.expr_statement(registry, pool, expr)
    }

    /// Call a static method as a statement, discarding any result.
    pub fn invoke_static(
        &mut self,
        owner: TypeHash,
        name: &str,
        args: Vec<Operand>,
    ) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let expr = self.call_static(owner, name, args)?;
        let (registry, pool) = self.module.builder.session();
        self.body.expr_statement(registry, pool, expr)
    }

    /// Dispatch a delegate's invocation list.
    pub fn invoke_delegate(
        &mut self,
        delegate: Operand,
        args: Vec<Operand>,
    ) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body.invoke_delegate(registry, pool, delegate, args)
    }

    /// Open a conditional block; close it with [`CodeGen::end`].
    pub fn begin_if(&mut self, condition: impl Into<Operand>) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body.begin_if(registry, pool, condition.into())
    }

    /// Open an iteration over a collection; returns the element variable.
    pub fn begin_foreach(
        &mut self,
        name: &str,
        element_type: DataType,
        collection: Operand,
    ) -> Result<Operand, BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body
            .begin_foreach(registry, pool, name, element_type, collection)
    }

    /// Close the innermost open block.
    pub fn end(&mut self) -> Result<(), BuildError> {
        self.body.end()
    }

    /// Return a value from the body.
    pub fn ret(&mut self, value: impl Into<Operand>) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body.ret(registry, pool, Some(value.into()))
    }

    /// Return from a void body.
    pub fn ret_void(&mut self) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body.ret(registry, pool, None)
    }

    /// Subscribe a handler to an event through its add accessor.
    pub fn subscribe(
        &mut self,
        receiver: &Operand,
        event_name: &str,
        handler: Operand,
    ) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body
            .event_accessor(registry, pool, receiver.clone(), event_name, handler, true)
    }

    /// Unsubscribe a handler from an event through its remove accessor.
    pub fn unsubscribe(
        &mut self,
        receiver: &Operand,
        event_name: &str,
        handler: Operand,
    ) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body
            .event_accessor(registry, pool, receiver.clone(), event_name, handler, false)
    }

    /// Emit a formatted line through the host. Placeholders are `{0}`,
    /// `{1}`, ... over the arguments.
    pub fn write_line(&mut self, format: &str, args: Vec<Operand>) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let (registry, pool) = self.module.builder.session();
        self.body.write_line(registry, pool, format, args)
    }

    /// Chain to a base constructor explicitly.
    ///
    /// Must be the first statement of a constructor body; it replaces the
    /// implicit zero-argument chaining and is followed by the field
    /// initializers.
    pub fn invoke_base_ctor(&mut self, args: Vec<Operand>) -> Result<(), BuildError> {
        if !self.body.context().is_ctor {
            let (registry, pool) = self.module.builder.session();
            return self.body.invoke_base_ctor(registry, pool, args);
        }
        if self.prologue_done {
            return Err(BuildError::InvalidContext {
                message: format!(
                    "base constructor call must be the first statement of '{}.{}'",
                    self.body.context().owner_name,
                    self.body.context().method_name
                ),
            });
        }
        self.prologue_done = true;
        let (registry, pool) = self.module.builder.session();
        self.body.invoke_base_ctor(registry, pool, args)?;
        self.emit_field_inits()
    }

    /// Finish the body and attach it to its method.
    pub fn finish(mut self) -> Result<(), BuildError> {
        self.ensure_prologue()?;
        let CodeGen {
            module,
            body,
            method_hash,
            ..
        } = self;
        module.builder.add_body(method_hash, body.finish()?)
    }

    fn ensure_prologue(&mut self) -> Result<(), BuildError> {
        if self.prologue_done {
            return Ok(());
        }
        self.prologue_done = true;
        let (registry, pool) = self.module.builder.session();
        self.body.invoke_base_ctor(registry, pool, Vec::new())?;
        self.emit_field_inits()
    }

    fn emit_field_inits(&mut self) -> Result<(), BuildError> {
        let inits = std::mem::take(&mut self.inits);
        for init in inits {
            let target = Operand::Field {
                receiver: Some(Box::new(self.body.this_ref()?)),
                slot: init.slot,
                is_static: false,
                data_type: init.data_type,
            };
            let (registry, pool) = self.module.builder.session();
            self.body.assign(registry, pool, &target, init.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeforge_compiler::bytecode::OpCode;
    use codeforge_core::ParamDef;

    #[test]
    fn ctor_prologue_runs_field_initializers() {
        let mut m = ModuleGen::new("inits");
        let t = m.declare_class("Counter").unwrap();
        m.field_init(t, "count", DataType::new(builtins::INT32), 3)
            .unwrap();

        let mut g = m.begin_ctor(t, vec![]).unwrap();
        g.ret_void().unwrap();
        // GetThis, Constant, SetField from the initializer, then the return.
        g.body.chunk().assert_opcodes(&[
            OpCode::GetThis,
            OpCode::Constant,
            OpCode::SetField,
            OpCode::ReturnVoid,
        ]);
        g.finish().unwrap();
    }

    #[test]
    fn explicit_base_chaining_replaces_the_implicit_call() {
        let mut m = ModuleGen::new("chain");
        let base = m.declare_class("Base").unwrap();
        let mut g = m.begin_ctor(base, vec![ParamDef::new("n", builtins::INT32)]).unwrap();
        g.ret_void().unwrap();
        g.finish().unwrap();

        let derived = m.declare_class_extending("Derived", base).unwrap();
        let mut g = m.begin_ctor(derived, vec![]).unwrap();
        g.invoke_base_ctor(vec![7.into()]).unwrap();
        g.body.chunk().assert_opcodes(&[
            OpCode::GetThis,
            OpCode::Constant,
            OpCode::CallMethod,
        ]);
        g.finish().unwrap();
    }

    #[test]
    fn late_base_chaining_is_rejected() {
        let mut m = ModuleGen::new("chain");
        let base = m.declare_class("Base").unwrap();
        m.begin_ctor(base, vec![]).unwrap().finish().unwrap();

        let derived = m.declare_class_extending("Derived", base).unwrap();
        let mut g = m.begin_ctor(derived, vec![]).unwrap();
        g.declare_init("x", 1).unwrap();
        let err = g.invoke_base_ctor(vec![]).unwrap_err();
        assert!(matches!(err, BuildError::InvalidContext { .. }));
    }

    #[test]
    fn base_chaining_outside_a_ctor_is_rejected() {
        let mut m = ModuleGen::new("chain");
        let t = m.declare_class("Plain").unwrap();
        let mut g = m
            .begin_method(t, "run", vec![], DataType::void())
            .unwrap();
        let err = g.invoke_base_ctor(vec![]).unwrap_err();
        assert!(matches!(err, BuildError::InvalidContext { .. }));
    }

    #[test]
    fn statements_compose_into_a_static_body() {
        let mut m = ModuleGen::new("sum");
        let t = m.declare_class("App").unwrap();
        let mut g = m
            .begin_static_method(t, "run", vec![], DataType::new(builtins::INT32))
            .unwrap();
        let total = g.declare_init("total", 0).unwrap();
        let expr = g.add(total.clone(), 5).unwrap();
        g.assign(&total, expr).unwrap();
        g.ret(total).unwrap();
        g.finish().unwrap();
    }

    #[test]
    fn this_is_unavailable_in_static_bodies() {
        let mut m = ModuleGen::new("s");
        let t = m.declare_class("App").unwrap();
        let g = m
            .begin_static_method(t, "run", vec![], DataType::void())
            .unwrap();
        assert!(matches!(
            g.this().unwrap_err(),
            BuildError::InvalidContext { .. }
        ));
    }
}
