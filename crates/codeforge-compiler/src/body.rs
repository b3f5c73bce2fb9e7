//! Method body compilation.
//!
//! A [`BodyCompiler`] turns builder statement calls into bytecode as they
//! arrive: no statement tree is retained. Control constructs push onto a
//! scope stack and a single generic `end` closes the innermost one, so an
//! unmatched close is caught immediately and an unclosed construct is
//! caught when the body is finished.

use codeforge_core::{BuildError, DataType, ParamDef, TypeHash, builtins};

use crate::bytecode::{Chunk, Constant, ConstantPool, OpCode};
use crate::operand::{self, BinOp, Literal, Operand};
use crate::registry::SymbolRegistry;
use crate::resolve::{self, ReceiverKind};
use crate::scope::LocalScope;

/// Host function id for formatted line output.
pub const HOST_WRITE_LINE: u8 = 0;

/// Everything a body compilation needs to know about its member.
#[derive(Debug, Clone)]
pub struct BodyContext {
    pub owner: TypeHash,
    pub owner_name: String,
    pub method_name: String,
    pub method_hash: TypeHash,
    pub return_type: DataType,
    pub is_static: bool,
    pub is_ctor: bool,
    /// The owner's declared base, for `base` references.
    pub base: Option<TypeHash>,
}

/// A finished, attachable method body.
#[derive(Debug, Clone)]
pub struct CompiledBody {
    pub chunk: Chunk,
    pub frame_size: u32,
    pub param_count: u8,
    pub is_instance: bool,
}

/// An open control construct awaiting its `end`.
#[derive(Debug)]
enum OpenScope {
    If {
        exit_jump: usize,
    },
    Foreach {
        loop_start: usize,
        exit_jump: usize,
        idx_slot: u32,
    },
}

/// Streaming compiler for one method body.
#[derive(Debug)]
pub struct BodyCompiler {
    ctx: BodyContext,
    chunk: Chunk,
    locals: LocalScope,
    control: Vec<OpenScope>,
    param_count: u8,
    stmt: u32,
}

impl BodyCompiler {
    /// Start compiling a body; parameters become the first frame slots.
    pub fn new(ctx: BodyContext, params: &[ParamDef]) -> Result<Self, BuildError> {
        let param_count = u8::try_from(params.len()).map_err(|_| BuildError::InvalidContext {
            message: format!("'{}' has more than 255 parameters", ctx.method_name),
        })?;
        let mut locals = LocalScope::new();
        for param in params {
            locals.declare(Some(&param.name), param.data_type)?;
        }
        Ok(Self {
            ctx,
            chunk: Chunk::new(),
            locals,
            control: Vec::new(),
            param_count,
            stmt: 0,
        })
    }

    pub fn context(&self) -> &BodyContext {
        &self.ctx
    }

    /// The chunk compiled so far; tests assert on its opcodes.
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    // =========================================================================
    // Operand Entry Points
    // =========================================================================

    /// Reference a parameter by name.
    pub fn arg(&self, name: &str) -> Result<Operand, BuildError> {
        match self.locals.resolve(name) {
            Some(var) if var.slot < self.param_count as u32 && var.depth == 0 => {
                Ok(Operand::Arg {
                    slot: var.slot,
                    data_type: var.data_type,
                })
            }
            _ => Err(BuildError::UnresolvedMember {
                name: name.into(),
                receiver: format!("parameters of '{}'", self.ctx.method_name),
            }),
        }
    }

    /// Reference the current instance.
    pub fn this_ref(&self) -> Result<Operand, BuildError> {
        if self.ctx.is_static {
            return Err(BuildError::InvalidContext {
                message: format!("'this' used in static member '{}'", self.ctx.method_name),
            });
        }
        Ok(Operand::This {
            data_type: DataType::new(self.ctx.owner),
        })
    }

    /// Reference the current instance as its base type.
    pub fn base_ref(&self) -> Result<Operand, BuildError> {
        if self.ctx.is_static {
            return Err(BuildError::InvalidContext {
                message: format!("'base' used in static member '{}'", self.ctx.method_name),
            });
        }
        let base = self.ctx.base.ok_or_else(|| BuildError::InvalidContext {
            message: format!("'{}' has no base type", self.ctx.owner_name),
        })?;
        Ok(Operand::BaseRef {
            data_type: DataType::new(base),
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Declare a local, optionally initialized.
    ///
    /// The type may be omitted when an initializer supplies it.
    pub fn declare_local(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        name: Option<&str>,
        data_type: Option<DataType>,
        init: Option<Operand>,
    ) -> Result<Operand, BuildError> {
        self.stmt += 1;
        let data_type = match (data_type, &init) {
            (Some(dt), _) => dt,
            (None, Some(init)) => init.data_type(),
            (None, None) => {
                return Err(BuildError::InvalidContext {
                    message: "local declared without a type or an initializer".into(),
                });
            }
        };
        if data_type.is_void() || data_type.is_null() {
            return Err(BuildError::TypeMismatch {
                message: format!("a local cannot have type {data_type}"),
            });
        }

        let slot = self.locals.declare(name, data_type)?;
        let local = Operand::Local { slot, data_type };
        if let Some(init) = init {
            let init = operand::coerce(registry, init, data_type)?;
            self.emit_operand(registry, pool, &init)?;
            self.emit_set_local(slot)?;
        }
        Ok(local)
    }

    /// Assign a value to an addressable target.
    pub fn assign(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        target: &Operand,
        value: Operand,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        self.assign_inner(registry, pool, target, value)
    }

    /// Compound assignment: `target = target op value`.
    pub fn assign_op(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        op: BinOp,
        target: &Operand,
        value: Operand,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        let combined = operand::binary(registry, op, target.clone(), value)?;
        self.assign_inner(registry, pool, target, combined)
    }

    fn assign_inner(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        target: &Operand,
        value: Operand,
    ) -> Result<(), BuildError> {
        if !target.is_addressable() {
            return Err(BuildError::NotAssignable {
                target: target.describe().into(),
            });
        }
        let value = operand::coerce(registry, value, target.data_type())?;

        match target {
            Operand::Local { slot, .. } | Operand::Arg { slot, .. } => {
                self.emit_operand(registry, pool, &value)?;
                self.emit_set_local(*slot)
            }
            Operand::Field {
                receiver: None,
                slot,
                ..
            } => {
                self.emit_operand(registry, pool, &value)?;
                self.chunk.write_op(OpCode::SetStatic, self.stmt);
                self.chunk.write_u16(slot_u16(*slot)?, self.stmt);
                Ok(())
            }
            Operand::Field {
                receiver: Some(receiver),
                slot,
                ..
            } => {
                self.emit_operand(registry, pool, receiver)?;
                self.emit_operand(registry, pool, &value)?;
                self.chunk.write_op(OpCode::SetField, self.stmt);
                self.chunk.write_u16(slot_u16(*slot)?, self.stmt);
                Ok(())
            }
            Operand::EventBacking { receiver, slot, .. } => {
                self.emit_operand(registry, pool, receiver)?;
                self.emit_operand(registry, pool, &value)?;
                self.chunk.write_op(OpCode::SetField, self.stmt);
                self.chunk.write_u16(slot_u16(*slot)?, self.stmt);
                Ok(())
            }
            Operand::Index {
                receiver,
                index,
                setter,
                ..
            } => {
                let setter = setter.ok_or_else(|| BuildError::NotAssignable {
                    target: "an indexer with no setter".into(),
                })?;
                self.emit_operand(registry, pool, receiver)?;
                self.emit_operand(registry, pool, index)?;
                self.emit_operand(registry, pool, &value)?;
                self.emit_call_method(pool, setter, 2);
                Ok(())
            }
            _ => Err(BuildError::NotAssignable {
                target: target.describe().into(),
            }),
        }
    }

    /// Evaluate an expression for its effect, discarding any value.
    pub fn expr_statement(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        expr: Operand,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        let produces_value = !expr.data_type().is_void();
        self.emit_operand(registry, pool, &expr)?;
        if produces_value {
            self.chunk.write_op(OpCode::Pop, self.stmt);
        }
        Ok(())
    }

    /// Dispatch a delegate's invocation list as a statement.
    pub fn invoke_delegate(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        delegate: Operand,
        args: Vec<Operand>,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        let delegate_type = delegate.data_type();
        let def = registry.expect(delegate_type.hash)?;
        let sig = def
            .delegate_sig
            .as_ref()
            .ok_or_else(|| BuildError::TypeMismatch {
                message: format!("cannot invoke non-delegate {delegate_type}"),
            })?;
        if sig.params.len() != args.len() {
            return Err(BuildError::TypeMismatch {
                message: format!(
                    "delegate '{}' takes {} arguments, got {}",
                    def.name,
                    sig.params.len(),
                    args.len()
                ),
            });
        }
        let param_types: Vec<DataType> = sig.params.iter().map(|p| p.data_type).collect();
        let keeps_value = !sig.return_type.is_void();
        let argc = argc_u8(args.len())?;

        for (arg, &param) in args.into_iter().zip(&param_types) {
            let arg = operand::coerce(registry, arg, param)?;
            self.emit_operand(registry, pool, &arg)?;
        }
        self.emit_operand(registry, pool, &delegate)?;
        self.chunk.write_op(OpCode::InvokeDelegate, self.stmt);
        self.chunk.write_byte(argc, self.stmt);
        if keeps_value {
            // Only the last entry's return survives dispatch; as a
            // statement it is discarded.
            self.chunk.write_op(OpCode::Pop, self.stmt);
        }
        Ok(())
    }

    /// Open a conditional; the body runs when the condition holds.
    pub fn begin_if(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        condition: Operand,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        if !condition.data_type().is_bool() {
            return Err(BuildError::TypeMismatch {
                message: format!("condition must be bool, got {}", condition.data_type()),
            });
        }
        self.emit_operand(registry, pool, &condition)?;
        let exit_jump = self.chunk.emit_jump(OpCode::JumpIfFalse, self.stmt);
        self.control.push(OpenScope::If { exit_jump });
        self.locals.push_scope();
        Ok(())
    }

    /// Open an iteration over a collection; returns the element variable.
    pub fn begin_foreach(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        name: &str,
        element_type: DataType,
        collection: Operand,
    ) -> Result<Operand, BuildError> {
        self.stmt += 1;
        if !registry.is_iterable(collection.data_type().hash) {
            return Err(BuildError::TypeMismatch {
                message: format!("{} is not iterable", collection.data_type()),
            });
        }

        self.locals.push_scope();
        let list_slot = self.locals.declare(None, collection.data_type())?;
        let idx_slot = self
            .locals
            .declare(None, DataType::new(builtins::INT32))?;
        let elem_slot = self.locals.declare(Some(name), element_type)?;

        self.emit_operand(registry, pool, &collection)?;
        self.emit_set_local(list_slot)?;
        self.chunk.write_op(OpCode::PushZero, self.stmt);
        self.emit_set_local(idx_slot)?;

        let loop_start = self.chunk.len();
        self.emit_get_local(idx_slot)?;
        self.emit_get_local(list_slot)?;
        self.chunk.write_op(OpCode::ListLen, self.stmt);
        self.chunk.write_op(OpCode::Lt, self.stmt);
        let exit_jump = self.chunk.emit_jump(OpCode::JumpIfFalse, self.stmt);

        self.emit_get_local(list_slot)?;
        self.emit_get_local(idx_slot)?;
        self.chunk.write_op(OpCode::ListGet, self.stmt);
        self.emit_set_local(elem_slot)?;

        self.control.push(OpenScope::Foreach {
            loop_start,
            exit_jump,
            idx_slot,
        });
        Ok(Operand::Local {
            slot: elem_slot,
            data_type: element_type,
        })
    }

    /// Close the innermost open construct.
    pub fn end(&mut self) -> Result<(), BuildError> {
        self.stmt += 1;
        let open = self.control.pop().ok_or_else(|| BuildError::UnbalancedScope {
            message: format!("'end' with no open construct in '{}'", self.ctx.method_name),
        })?;
        match open {
            OpenScope::If { exit_jump } => {
                self.chunk.patch_jump(exit_jump)?;
            }
            OpenScope::Foreach {
                loop_start,
                exit_jump,
                idx_slot,
            } => {
                self.emit_get_local(idx_slot)?;
                self.chunk.write_op(OpCode::PushOne, self.stmt);
                self.chunk.write_op(OpCode::AddI32, self.stmt);
                self.emit_set_local(idx_slot)?;
                self.chunk.emit_loop(loop_start, self.stmt)?;
                self.chunk.patch_jump(exit_jump)?;
            }
        }
        self.locals.pop_scope();
        Ok(())
    }

    /// Return from the body.
    pub fn ret(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        value: Option<Operand>,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        match value {
            Some(value) => {
                if self.ctx.return_type.is_void() {
                    return Err(BuildError::TypeMismatch {
                        message: format!("'{}' returns void", self.ctx.method_name),
                    });
                }
                let value = operand::coerce(registry, value, self.ctx.return_type)?;
                self.emit_operand(registry, pool, &value)?;
                self.chunk.write_op(OpCode::Return, self.stmt);
            }
            None => {
                if !self.ctx.return_type.is_void() {
                    return Err(BuildError::TypeMismatch {
                        message: format!(
                            "'{}' must return {}",
                            self.ctx.method_name, self.ctx.return_type
                        ),
                    });
                }
                self.chunk.write_op(OpCode::ReturnVoid, self.stmt);
            }
        }
        Ok(())
    }

    /// Subscribe or unsubscribe a handler through an event's accessors.
    pub fn event_accessor(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        receiver: Operand,
        event_name: &str,
        handler: Operand,
        subscribe: bool,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        let kind = match &receiver {
            Operand::This { data_type } => ReceiverKind::SelfRef(data_type.hash),
            Operand::BaseRef { data_type } => ReceiverKind::Base(data_type.hash),
            other => ReceiverKind::Instance(other.data_type()),
        };
        let (_, event) = resolve::resolve_event(registry, &kind, event_name)?;
        let accessor = if subscribe {
            event.add_method
        } else {
            event.remove_method
        };
        let handler = operand::coerce(registry, handler, event.delegate_type)?;

        self.emit_operand(registry, pool, &receiver)?;
        self.emit_operand(registry, pool, &handler)?;
        self.emit_call_method(pool, accessor, 1);
        Ok(())
    }

    /// Emit a formatted line through the host.
    ///
    /// The format string uses `{0}`-style placeholders over the arguments.
    pub fn write_line(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        format: &str,
        args: Vec<Operand>,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        let argc = argc_u8(args.len() + 1)?;
        let format_index = pool.add(Constant::Str(format.into()));
        self.emit_constant(format_index);
        for arg in &args {
            if arg.data_type().is_void() {
                return Err(BuildError::TypeMismatch {
                    message: "cannot format a void value".into(),
                });
            }
            self.emit_operand(registry, pool, arg)?;
        }
        self.chunk.write_op(OpCode::CallHost, self.stmt);
        self.chunk.write_byte(HOST_WRITE_LINE, self.stmt);
        self.chunk.write_byte(argc, self.stmt);
        Ok(())
    }

    /// Chain to a base constructor; only valid inside a constructor body.
    pub fn invoke_base_ctor(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        args: Vec<Operand>,
    ) -> Result<(), BuildError> {
        self.stmt += 1;
        if !self.ctx.is_ctor {
            return Err(BuildError::InvalidContext {
                message: format!(
                    "base constructor call outside a constructor ('{}')",
                    self.ctx.method_name
                ),
            });
        }
        let Some(base) = self.ctx.base else {
            // No declared base: object initialization is implicit.
            return Ok(());
        };
        let base_def = registry.expect(base)?;
        if base_def.is_external {
            // Catalog bases initialize natively at allocation.
            return Ok(());
        }

        let arg_types: Vec<DataType> = args.iter().map(Operand::data_type).collect();
        let resolved = resolve::resolve_ctor(registry, base, &arg_types)?;
        let argc = argc_u8(args.len())?;

        self.chunk.write_op(OpCode::GetThis, self.stmt);
        for (arg, &param) in args.into_iter().zip(&resolved.param_types) {
            let arg = operand::coerce(registry, arg, param)?;
            self.emit_operand(registry, pool, &arg)?;
        }
        self.emit_call_method(pool, resolved.method_hash, argc);
        Ok(())
    }

    /// Finish the body: every construct must be closed.
    pub fn finish(mut self) -> Result<CompiledBody, BuildError> {
        if !self.control.is_empty() {
            return Err(BuildError::IncompleteBody {
                member: format!("{}.{}", self.ctx.owner_name, self.ctx.method_name),
            });
        }
        // Fall-off-the-end return; dead when the body already returned.
        self.chunk.write_op(OpCode::ReturnVoid, self.stmt);
        Ok(CompiledBody {
            chunk: self.chunk,
            frame_size: self.locals.frame_size(),
            param_count: self.param_count,
            is_instance: !self.ctx.is_static,
        })
    }

    // =========================================================================
    // Emission
    // =========================================================================

    fn emit_operand(
        &mut self,
        registry: &SymbolRegistry,
        pool: &mut ConstantPool,
        operand: &Operand,
    ) -> Result<(), BuildError> {
        match operand {
            Operand::Literal(lit) => self.emit_literal(pool, lit),
            Operand::Local { slot, .. } | Operand::Arg { slot, .. } => self.emit_get_local(*slot),
            Operand::This { .. } | Operand::BaseRef { .. } => {
                self.chunk.write_op(OpCode::GetThis, self.stmt);
                Ok(())
            }
            Operand::Field {
                receiver: None,
                slot,
                ..
            } => {
                self.chunk.write_op(OpCode::GetStatic, self.stmt);
                self.chunk.write_u16(slot_u16(*slot)?, self.stmt);
                Ok(())
            }
            Operand::Field {
                receiver: Some(receiver),
                slot,
                ..
            } => {
                self.emit_operand(registry, pool, receiver)?;
                self.chunk.write_op(OpCode::GetField, self.stmt);
                self.chunk.write_u16(slot_u16(*slot)?, self.stmt);
                Ok(())
            }
            Operand::EventBacking { receiver, slot, .. } => {
                self.emit_operand(registry, pool, receiver)?;
                self.chunk.write_op(OpCode::GetField, self.stmt);
                self.chunk.write_u16(slot_u16(*slot)?, self.stmt);
                Ok(())
            }
            Operand::Index {
                receiver,
                index,
                getter,
                ..
            } => {
                let getter = getter.ok_or_else(|| BuildError::UnresolvedMember {
                    name: "this[] getter".into(),
                    receiver: receiver.data_type().to_string(),
                })?;
                self.emit_operand(registry, pool, receiver)?;
                self.emit_operand(registry, pool, index)?;
                self.emit_call_method(pool, getter, 1);
                Ok(())
            }
            Operand::Binary {
                op,
                lhs,
                rhs,
                data_type,
            } => {
                self.emit_operand(registry, pool, lhs)?;
                self.emit_operand(registry, pool, rhs)?;
                let opcode = match op {
                    BinOp::DelegateCombine => OpCode::DelegateCombine,
                    BinOp::DelegateRemove => OpCode::DelegateRemove,
                    BinOp::Eq => OpCode::Eq,
                    BinOp::Ne => OpCode::Ne,
                    BinOp::Lt => OpCode::Lt,
                    BinOp::Le => OpCode::Le,
                    BinOp::Gt => OpCode::Gt,
                    BinOp::Ge => OpCode::Ge,
                    arith => arith_opcode(*arith, *data_type)?,
                };
                self.chunk.write_op(opcode, self.stmt);
                Ok(())
            }
            Operand::Negate { value, data_type } => {
                self.emit_operand(registry, pool, value)?;
                let opcode = match data_type.hash {
                    builtins::INT32 => OpCode::NegI32,
                    builtins::INT64 => OpCode::NegI64,
                    builtins::FLOAT64 => OpCode::NegF64,
                    builtins::DECIMAL => OpCode::NegDec,
                    _ => {
                        return Err(BuildError::TypeMismatch {
                            message: format!("cannot negate {data_type}"),
                        });
                    }
                };
                self.chunk.write_op(opcode, self.stmt);
                Ok(())
            }
            Operand::Not { value } => {
                self.emit_operand(registry, pool, value)?;
                self.chunk.write_op(OpCode::Not, self.stmt);
                Ok(())
            }
            Operand::Convert { value, data_type } => {
                self.emit_operand(registry, pool, value)?;
                let opcode = convert_opcode(value.data_type(), *data_type)?;
                self.chunk.write_op(opcode, self.stmt);
                Ok(())
            }
            Operand::Call {
                receiver,
                method,
                args,
                ..
            } => {
                let argc = argc_u8(args.len())?;
                match receiver {
                    Some(receiver) => {
                        self.emit_operand(registry, pool, receiver)?;
                        for arg in args {
                            self.emit_operand(registry, pool, arg)?;
                        }
                        self.emit_call_method(pool, *method, argc);
                    }
                    None => {
                        for arg in args {
                            self.emit_operand(registry, pool, arg)?;
                        }
                        let index = pool.add_hash(*method);
                        self.chunk.write_op(OpCode::Call, self.stmt);
                        self.chunk.write_u16(index, self.stmt);
                        self.chunk.write_byte(argc, self.stmt);
                    }
                }
                Ok(())
            }
            Operand::New { ctor, args, .. } => {
                let argc = argc_u8(args.len())?;
                for arg in args {
                    self.emit_operand(registry, pool, arg)?;
                }
                let index = pool.add_hash(*ctor);
                self.chunk.write_op(OpCode::New, self.stmt);
                self.chunk.write_u16(index, self.stmt);
                self.chunk.write_byte(argc, self.stmt);
                Ok(())
            }
            Operand::NewDelegate {
                receiver, method, ..
            } => {
                let flags = match receiver {
                    Some(receiver) => {
                        self.emit_operand(registry, pool, receiver)?;
                        1u8
                    }
                    None => 0u8,
                };
                let index = pool.add_hash(*method);
                self.chunk.write_op(OpCode::NewDelegate, self.stmt);
                self.chunk.write_u16(index, self.stmt);
                self.chunk.write_byte(flags, self.stmt);
                Ok(())
            }
        }
    }

    fn emit_literal(
        &mut self,
        pool: &mut ConstantPool,
        literal: &Literal,
    ) -> Result<(), BuildError> {
        match literal {
            Literal::Null => self.chunk.write_op(OpCode::PushNull, self.stmt),
            Literal::Bool(true) => self.chunk.write_op(OpCode::PushTrue, self.stmt),
            Literal::Bool(false) => self.chunk.write_op(OpCode::PushFalse, self.stmt),
            Literal::Int32(0) => self.chunk.write_op(OpCode::PushZero, self.stmt),
            Literal::Int32(1) => self.chunk.write_op(OpCode::PushOne, self.stmt),
            Literal::Int32(v) => {
                let index = pool.add(Constant::Int32(*v));
                self.emit_constant(index);
            }
            Literal::Int64(v) => {
                let index = pool.add(Constant::Int64(*v));
                self.emit_constant(index);
            }
            Literal::Float64(v) => {
                let index = pool.add(Constant::Float64(*v));
                self.emit_constant(index);
            }
            Literal::Decimal(v) => {
                let index = pool.add(Constant::Decimal(*v));
                self.emit_constant(index);
            }
            Literal::Str(v) => {
                let index = pool.add(Constant::Str(v.clone()));
                self.emit_constant(index);
            }
        }
        Ok(())
    }

    fn emit_constant(&mut self, index: u16) {
        if index <= u8::MAX as u16 {
            self.chunk.write_op(OpCode::Constant, self.stmt);
            self.chunk.write_byte(index as u8, self.stmt);
        } else {
            self.chunk.write_op(OpCode::ConstantWide, self.stmt);
            self.chunk.write_u16(index, self.stmt);
        }
    }

    fn emit_get_local(&mut self, slot: u32) -> Result<(), BuildError> {
        if slot <= u8::MAX as u32 {
            self.chunk.write_op(OpCode::GetLocal, self.stmt);
            self.chunk.write_byte(slot as u8, self.stmt);
        } else {
            self.chunk.write_op(OpCode::GetLocalWide, self.stmt);
            self.chunk.write_u16(slot_u16(slot)?, self.stmt);
        }
        Ok(())
    }

    fn emit_set_local(&mut self, slot: u32) -> Result<(), BuildError> {
        if slot <= u8::MAX as u32 {
            self.chunk.write_op(OpCode::SetLocal, self.stmt);
            self.chunk.write_byte(slot as u8, self.stmt);
        } else {
            self.chunk.write_op(OpCode::SetLocalWide, self.stmt);
            self.chunk.write_u16(slot_u16(slot)?, self.stmt);
        }
        Ok(())
    }

    fn emit_call_method(&mut self, pool: &mut ConstantPool, method: TypeHash, argc: u8) {
        let index = pool.add_hash(method);
        self.chunk.write_op(OpCode::CallMethod, self.stmt);
        self.chunk.write_u16(index, self.stmt);
        self.chunk.write_byte(argc, self.stmt);
    }
}

fn arith_opcode(op: BinOp, data_type: DataType) -> Result<OpCode, BuildError> {
    let opcode = match (op, data_type.hash) {
        (BinOp::Add, builtins::INT32) => OpCode::AddI32,
        (BinOp::Sub, builtins::INT32) => OpCode::SubI32,
        (BinOp::Mul, builtins::INT32) => OpCode::MulI32,
        (BinOp::Div, builtins::INT32) => OpCode::DivI32,
        (BinOp::Mod, builtins::INT32) => OpCode::ModI32,
        (BinOp::Add, builtins::INT64) => OpCode::AddI64,
        (BinOp::Sub, builtins::INT64) => OpCode::SubI64,
        (BinOp::Mul, builtins::INT64) => OpCode::MulI64,
        (BinOp::Div, builtins::INT64) => OpCode::DivI64,
        (BinOp::Mod, builtins::INT64) => OpCode::ModI64,
        (BinOp::Add, builtins::FLOAT64) => OpCode::AddF64,
        (BinOp::Sub, builtins::FLOAT64) => OpCode::SubF64,
        (BinOp::Mul, builtins::FLOAT64) => OpCode::MulF64,
        (BinOp::Div, builtins::FLOAT64) => OpCode::DivF64,
        (BinOp::Add, builtins::DECIMAL) => OpCode::AddDec,
        (BinOp::Sub, builtins::DECIMAL) => OpCode::SubDec,
        (BinOp::Mul, builtins::DECIMAL) => OpCode::MulDec,
        (BinOp::Div, builtins::DECIMAL) => OpCode::DivDec,
        _ => {
            return Err(BuildError::TypeMismatch {
                message: format!("operator {op:?} is not defined for {data_type}"),
            });
        }
    };
    Ok(opcode)
}

fn convert_opcode(from: DataType, to: DataType) -> Result<OpCode, BuildError> {
    let opcode = match (from.hash, to.hash) {
        (builtins::INT32, builtins::INT64) => OpCode::I32ToI64,
        (builtins::INT32, builtins::FLOAT64) => OpCode::I32ToF64,
        (builtins::INT64, builtins::FLOAT64) => OpCode::I64ToF64,
        (builtins::INT32, builtins::DECIMAL) => OpCode::I32ToDec,
        (builtins::INT64, builtins::DECIMAL) => OpCode::I64ToDec,
        _ => {
            return Err(BuildError::TypeMismatch {
                message: format!("no implicit conversion from {from} to {to}"),
            });
        }
    };
    Ok(opcode)
}

fn argc_u8(count: usize) -> Result<u8, BuildError> {
    u8::try_from(count).map_err(|_| BuildError::InvalidContext {
        message: "more than 255 arguments".into(),
    })
}

fn slot_u16(slot: u32) -> Result<u16, BuildError> {
    u16::try_from(slot).map_err(|_| BuildError::InvalidContext {
        message: "slot index exceeds 16 bits".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::null;

    fn test_ctx(return_type: DataType) -> BodyContext {
        let owner = TypeHash::from_name("Test");
        BodyContext {
            owner,
            owner_name: "Test".into(),
            method_name: "run".into(),
            method_hash: TypeHash::from_method(owner, "run", &[]),
            return_type,
            is_static: true,
            is_ctor: false,
            base: None,
        }
    }

    fn setup() -> (SymbolRegistry, ConstantPool) {
        (SymbolRegistry::with_builtins(), ConstantPool::new())
    }

    #[test]
    fn local_init_emits_store() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let total = body
            .declare_local(&registry, &mut pool, Some("total"), None, Some(5.into()))
            .unwrap();
        assert_eq!(total.data_type().hash, builtins::INT32);
        body.chunk()
            .assert_opcodes(&[OpCode::Constant, OpCode::SetLocal]);
    }

    #[test]
    fn compound_assignment_reads_then_writes() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let total = body
            .declare_local(
                &registry,
                &mut pool,
                Some("total"),
                Some(DataType::new(builtins::INT32)),
                None,
            )
            .unwrap();
        body.assign_op(&registry, &mut pool, BinOp::Add, &total, 2.into())
            .unwrap();
        body.chunk().assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::Constant,
            OpCode::AddI32,
            OpCode::SetLocal,
        ]);
    }

    #[test]
    fn assigning_a_literal_target_is_rejected() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let err = body
            .assign(&registry, &mut pool, &Operand::from(3), 4.into())
            .unwrap_err();
        assert!(matches!(err, BuildError::NotAssignable { .. }));
    }

    #[test]
    fn if_block_shape() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let flag = body
            .declare_local(
                &registry,
                &mut pool,
                Some("flag"),
                None,
                Some(true.into()),
            )
            .unwrap();
        body.begin_if(&registry, &mut pool, flag).unwrap();
        body.ret(&registry, &mut pool, None).unwrap();
        body.end().unwrap();
        let compiled = body.finish().unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::PushTrue,
            OpCode::SetLocal,
            OpCode::GetLocal,
            OpCode::JumpIfFalse,
            OpCode::ReturnVoid,
            OpCode::ReturnVoid,
        ]);
    }

    #[test]
    fn non_bool_condition_is_rejected() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let err = body
            .begin_if(&registry, &mut pool, 1.into())
            .unwrap_err();
        assert!(matches!(err, BuildError::TypeMismatch { .. }));
    }

    #[test]
    fn foreach_lowers_to_a_counted_loop() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(
            test_ctx(DataType::void()),
            &[ParamDef::new("items", builtins::LIST)],
        )
        .unwrap();
        let items = body.arg("items").unwrap();
        let elem = body
            .begin_foreach(
                &registry,
                &mut pool,
                "item",
                DataType::new(builtins::OBJECT),
                items,
            )
            .unwrap();
        assert!(matches!(elem, Operand::Local { .. }));
        body.end().unwrap();
        let compiled = body.finish().unwrap();
        compiled.chunk.assert_contains_opcodes(&[
            OpCode::GetLocal,
            OpCode::GetLocal,
            OpCode::ListLen,
            OpCode::Lt,
            OpCode::JumpIfFalse,
        ]);
        compiled.chunk.assert_contains_opcodes(&[
            OpCode::PushOne,
            OpCode::AddI32,
            OpCode::SetLocal,
            OpCode::Loop,
        ]);
        // Hidden list + index slots, the element, and the parameter.
        assert_eq!(compiled.frame_size, 4);
    }

    #[test]
    fn foreach_over_a_non_iterable_is_rejected() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let err = body
            .begin_foreach(
                &registry,
                &mut pool,
                "c",
                DataType::new(builtins::OBJECT),
                "text".into(),
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::TypeMismatch { .. }));
    }

    #[test]
    fn end_without_open_is_unbalanced() {
        let (_registry, _pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let err = body.end().unwrap_err();
        assert!(matches!(err, BuildError::UnbalancedScope { .. }));
    }

    #[test]
    fn unclosed_construct_fails_finish() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        body.begin_if(&registry, &mut pool, true.into()).unwrap();
        let err = body.finish().unwrap_err();
        assert!(matches!(err, BuildError::IncompleteBody { member } if member == "Test.run"));
    }

    #[test]
    fn return_type_is_enforced() {
        let (registry, mut pool) = setup();
        let mut body =
            BodyCompiler::new(test_ctx(DataType::new(builtins::INT64)), &[]).unwrap();
        // Widening return is fine and reified as a conversion.
        body.ret(&registry, &mut pool, Some(7.into())).unwrap();
        body.chunk()
            .assert_opcodes(&[OpCode::Constant, OpCode::I32ToI64, OpCode::Return]);

        let mut void_body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let err = void_body
            .ret(&registry, &mut pool, Some(7.into()))
            .unwrap_err();
        assert!(matches!(err, BuildError::TypeMismatch { .. }));
    }

    #[test]
    fn write_line_pushes_format_then_args() {
        let (registry, mut pool) = setup();
        let mut body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        body.write_line(&registry, &mut pool, "total: {0}", vec![42.into()])
            .unwrap();
        body.chunk()
            .assert_opcodes(&[OpCode::Constant, OpCode::Constant, OpCode::CallHost]);
    }

    #[test]
    fn this_is_rejected_in_static_bodies() {
        let body = BodyCompiler::new(test_ctx(DataType::void()), &[]).unwrap();
        let err = body.this_ref().unwrap_err();
        assert!(matches!(err, BuildError::InvalidContext { .. }));
    }

    #[test]
    fn delegate_statement_invocation_pops_kept_returns() {
        let mut registry = SymbolRegistry::with_builtins();
        let d = registry
            .register(codeforge_core::TypeDef::delegate(
                "Supplier",
                codeforge_core::Visibility::Public,
                vec![],
                DataType::new(builtins::INT32),
            ))
            .unwrap();
        let mut pool = ConstantPool::new();
        let mut body = BodyCompiler::new(
            test_ctx(DataType::void()),
            &[ParamDef::new("f", d)],
        )
        .unwrap();
        let f = body.arg("f").unwrap();
        body.invoke_delegate(&registry, &mut pool, f, vec![]).unwrap();
        body.chunk()
            .assert_opcodes(&[OpCode::GetLocal, OpCode::InvokeDelegate, OpCode::Pop]);
    }

    #[test]
    fn null_handler_unsubscribe_coerces() {
        // Null is assignable to a delegate slot, so passing it through an
        // accessor must typecheck.
        let mut registry = SymbolRegistry::with_builtins();
        let d = registry
            .register(codeforge_core::TypeDef::delegate(
                "Notify",
                codeforge_core::Visibility::Public,
                vec![],
                DataType::void(),
            ))
            .unwrap();
        let coerced = operand::coerce(&registry, null(), DataType::new(d)).unwrap();
        assert!(matches!(coerced, Operand::Literal(Literal::Null)));
    }
}
