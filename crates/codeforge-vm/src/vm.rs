//! A stack interpreter for compiled modules.
//!
//! The [`Vm`] is the reference [`ModuleSink`]: loading builds dispatch
//! tables from the module's type descriptors, and execution walks chunk
//! bytecode with one frame per call. Host output collects into
//! [`Vm::output`] so callers can assert on it.

use std::rc::Rc;

use codeforge_core::{
    DataType, Decimal, LoadError, RuntimeError, TypeDef, TypeHash, builtins,
};
use codeforge_compiler::body::HOST_WRITE_LINE;
use codeforge_compiler::bytecode::{Constant, OpCode};
use codeforge_compiler::module::{CompiledModule, ModuleSink};
use codeforge_compiler::CompiledBody;
use rustc_hash::FxHashMap;

use crate::value::{
    DelegateEntry, ObjectData, Value, delegate_combine, delegate_remove, value_eq,
};

/// Loads compiled modules into a [`Vm`].
#[derive(Debug, Default)]
pub struct VmSink;

impl ModuleSink for VmSink {
    type Output = Vm;

    fn load(&mut self, module: CompiledModule) -> Result<Vm, LoadError> {
        Vm::load(module)
    }
}

/// Catalog functions implemented by the interpreter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Native {
    ListCtor,
    ListAdd,
    ListClear,
    ListCount,
    ListGetItem,
    ListSetItem,
}

#[derive(Debug, Clone, Copy)]
struct MethodInfo {
    returns_value: bool,
    owner: TypeHash,
    native: Option<Native>,
}

/// An executable loaded module.
#[derive(Debug)]
pub struct Vm {
    module: CompiledModule,
    bodies: FxHashMap<TypeHash, Rc<CompiledBody>>,
    methods: FxHashMap<TypeHash, MethodInfo>,
    /// Instance field types per declared type, slot order.
    layouts: FxHashMap<TypeHash, Vec<DataType>>,
    statics: Vec<Value>,
    /// Lines produced by the host write-line function.
    pub output: Vec<String>,
}

impl Vm {
    /// Build dispatch tables and static storage from a frozen module.
    pub fn load(module: CompiledModule) -> Result<Self, LoadError> {
        let mut methods = FxHashMap::default();
        register_list_natives(&mut methods);

        for def in &module.types {
            for m in &def.methods {
                methods.insert(
                    m.method_hash,
                    MethodInfo {
                        returns_value: !m.return_type.is_void(),
                        owner: def.type_hash,
                        native: None,
                    },
                );
                if !m.is_native && !module.bodies.contains_key(&m.method_hash) {
                    return Err(LoadError::MissingBody(m.method_hash.0));
                }
            }
        }

        let layouts = build_layouts(&module.types);
        let statics = module.statics.iter().map(|&dt| default_value(dt)).collect();
        let bodies = module
            .bodies
            .iter()
            .map(|(&hash, body)| (hash, Rc::new(body.clone())))
            .collect();

        Ok(Self {
            module,
            bodies,
            methods,
            layouts,
            statics,
            output: Vec::new(),
        })
    }

    /// The loaded module's name.
    pub fn module_name(&self) -> &str {
        &self.module.name
    }

    /// Call a static method of a declared type by name.
    pub fn call_static(
        &mut self,
        type_name: &str,
        method_name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let def = self
            .module
            .types
            .iter()
            .find(|def| def.name == type_name)
            .ok_or_else(|| {
                RuntimeError::InvalidOperand(format!("no type named '{type_name}'"))
            })?;
        let method = def
            .methods
            .iter()
            .find(|m| m.name == method_name && m.is_static() && m.params.len() == args.len())
            .ok_or_else(|| {
                RuntimeError::InvalidOperand(format!(
                    "no static method '{method_name}/{}' on '{type_name}'",
                    args.len()
                ))
            })?;
        let hash = method.method_hash;
        self.run(hash, None, args)
    }

    /// Call any loaded function by hash.
    pub fn call_hash(
        &mut self,
        method: TypeHash,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        self.run(method, this, args)
    }

    // =========================================================================
    // Interpreter
    // =========================================================================

    fn run(
        &mut self,
        method: TypeHash,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if let Some(native) = self.methods.get(&method).and_then(|info| info.native) {
            return self.run_native(native, this, args);
        }
        let body = Rc::clone(
            self.bodies
                .get(&method)
                .ok_or(RuntimeError::UnknownFunction(method.0))?,
        );

        let mut locals = vec![Value::Null; body.frame_size as usize];
        for (slot, arg) in args.into_iter().enumerate() {
            locals[slot] = arg;
        }
        let mut stack: Vec<Value> = Vec::new();
        let mut ip = 0usize;
        let chunk = &body.chunk;

        loop {
            let at = ip;
            let byte = chunk
                .read_byte(ip)
                .ok_or(RuntimeError::MalformedBytecode(at))?;
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::MalformedBytecode(at))?;
            ip += 1;

            match op {
                OpCode::Constant => {
                    let index = chunk
                        .read_byte(ip)
                        .ok_or(RuntimeError::MalformedBytecode(at))?;
                    ip += 1;
                    stack.push(self.constant_value(index as u16)?);
                }
                OpCode::ConstantWide => {
                    let index = self.read_u16(chunk, &mut ip, at)?;
                    stack.push(self.constant_value(index)?);
                }
                OpCode::PushNull => stack.push(Value::Null),
                OpCode::PushTrue => stack.push(Value::Bool(true)),
                OpCode::PushFalse => stack.push(Value::Bool(false)),
                OpCode::PushZero => stack.push(Value::Int32(0)),
                OpCode::PushOne => stack.push(Value::Int32(1)),

                OpCode::Pop => {
                    pop(&mut stack)?;
                }
                OpCode::Dup => {
                    let top = stack.last().cloned().ok_or(RuntimeError::StackUnderflow)?;
                    stack.push(top);
                }

                OpCode::GetLocal => {
                    let slot = chunk
                        .read_byte(ip)
                        .ok_or(RuntimeError::MalformedBytecode(at))?
                        as usize;
                    ip += 1;
                    stack.push(local_at(&locals, slot)?);
                }
                OpCode::SetLocal => {
                    let slot = chunk
                        .read_byte(ip)
                        .ok_or(RuntimeError::MalformedBytecode(at))?
                        as usize;
                    ip += 1;
                    let value = pop(&mut stack)?;
                    set_local(&mut locals, slot, value)?;
                }
                OpCode::GetLocalWide => {
                    let slot = self.read_u16(chunk, &mut ip, at)? as usize;
                    stack.push(local_at(&locals, slot)?);
                }
                OpCode::SetLocalWide => {
                    let slot = self.read_u16(chunk, &mut ip, at)? as usize;
                    let value = pop(&mut stack)?;
                    set_local(&mut locals, slot, value)?;
                }

                OpCode::GetStatic => {
                    let slot = self.read_u16(chunk, &mut ip, at)? as usize;
                    let value = self
                        .statics
                        .get(slot)
                        .cloned()
                        .ok_or_else(|| bad_slot("static", slot))?;
                    stack.push(value);
                }
                OpCode::SetStatic => {
                    let slot = self.read_u16(chunk, &mut ip, at)? as usize;
                    let value = pop(&mut stack)?;
                    let target = self
                        .statics
                        .get_mut(slot)
                        .ok_or_else(|| bad_slot("static", slot))?;
                    *target = value;
                }

                OpCode::GetField => {
                    let slot = self.read_u16(chunk, &mut ip, at)? as usize;
                    let receiver = pop(&mut stack)?;
                    stack.push(get_field(&receiver, slot)?);
                }
                OpCode::SetField => {
                    let slot = self.read_u16(chunk, &mut ip, at)? as usize;
                    let value = pop(&mut stack)?;
                    let receiver = pop(&mut stack)?;
                    set_field(&receiver, slot, value)?;
                }
                OpCode::GetThis => {
                    let value = this.clone().ok_or_else(|| {
                        RuntimeError::InvalidOperand("'this' in a static frame".into())
                    })?;
                    stack.push(value);
                }

                OpCode::AddI32 => int32_op(&mut stack, |a, b| Ok(a.wrapping_add(b)))?,
                OpCode::SubI32 => int32_op(&mut stack, |a, b| Ok(a.wrapping_sub(b)))?,
                OpCode::MulI32 => int32_op(&mut stack, |a, b| Ok(a.wrapping_mul(b)))?,
                OpCode::DivI32 => int32_op(&mut stack, |a, b| {
                    a.checked_div(b).ok_or(RuntimeError::DivisionByZero)
                })?,
                OpCode::ModI32 => int32_op(&mut stack, |a, b| {
                    a.checked_rem(b).ok_or(RuntimeError::DivisionByZero)
                })?,
                OpCode::NegI32 => match pop(&mut stack)? {
                    Value::Int32(v) => stack.push(Value::Int32(v.wrapping_neg())),
                    other => return Err(type_error("int32", &other)),
                },

                OpCode::AddI64 => int64_op(&mut stack, |a, b| Ok(a.wrapping_add(b)))?,
                OpCode::SubI64 => int64_op(&mut stack, |a, b| Ok(a.wrapping_sub(b)))?,
                OpCode::MulI64 => int64_op(&mut stack, |a, b| Ok(a.wrapping_mul(b)))?,
                OpCode::DivI64 => int64_op(&mut stack, |a, b| {
                    a.checked_div(b).ok_or(RuntimeError::DivisionByZero)
                })?,
                OpCode::ModI64 => int64_op(&mut stack, |a, b| {
                    a.checked_rem(b).ok_or(RuntimeError::DivisionByZero)
                })?,
                OpCode::NegI64 => match pop(&mut stack)? {
                    Value::Int64(v) => stack.push(Value::Int64(v.wrapping_neg())),
                    other => return Err(type_error("int64", &other)),
                },

                OpCode::AddF64 => float_op(&mut stack, |a, b| a + b)?,
                OpCode::SubF64 => float_op(&mut stack, |a, b| a - b)?,
                OpCode::MulF64 => float_op(&mut stack, |a, b| a * b)?,
                OpCode::DivF64 => float_op(&mut stack, |a, b| a / b)?,
                OpCode::NegF64 => match pop(&mut stack)? {
                    Value::Float64(v) => stack.push(Value::Float64(-v)),
                    other => return Err(type_error("float64", &other)),
                },

                OpCode::AddDec => decimal_op(&mut stack, |a, b| Ok(a + b))?,
                OpCode::SubDec => decimal_op(&mut stack, |a, b| Ok(a - b))?,
                OpCode::MulDec => decimal_op(&mut stack, |a, b| Ok(a * b))?,
                OpCode::DivDec => decimal_op(&mut stack, |a, b| {
                    a.checked_div(b).ok_or(RuntimeError::DivisionByZero)
                })?,
                OpCode::NegDec => match pop(&mut stack)? {
                    Value::Decimal(v) => stack.push(Value::Decimal(-v)),
                    other => return Err(type_error("decimal", &other)),
                },

                OpCode::I32ToI64 => match pop(&mut stack)? {
                    Value::Int32(v) => stack.push(Value::Int64(v as i64)),
                    other => return Err(type_error("int32", &other)),
                },
                OpCode::I32ToF64 => match pop(&mut stack)? {
                    Value::Int32(v) => stack.push(Value::Float64(v as f64)),
                    other => return Err(type_error("int32", &other)),
                },
                OpCode::I64ToF64 => match pop(&mut stack)? {
                    Value::Int64(v) => stack.push(Value::Float64(v as f64)),
                    other => return Err(type_error("int64", &other)),
                },
                OpCode::I32ToDec => match pop(&mut stack)? {
                    Value::Int32(v) => stack.push(Value::Decimal(Decimal::from_int(v as i64))),
                    other => return Err(type_error("int32", &other)),
                },
                OpCode::I64ToDec => match pop(&mut stack)? {
                    Value::Int64(v) => stack.push(Value::Decimal(Decimal::from_int(v))),
                    other => return Err(type_error("int64", &other)),
                },

                OpCode::Eq => {
                    let b = pop(&mut stack)?;
                    let a = pop(&mut stack)?;
                    stack.push(Value::Bool(value_eq(&a, &b)));
                }
                OpCode::Ne => {
                    let b = pop(&mut stack)?;
                    let a = pop(&mut stack)?;
                    stack.push(Value::Bool(!value_eq(&a, &b)));
                }
                OpCode::Lt => compare(&mut stack, |ord| ord.is_lt())?,
                OpCode::Le => compare(&mut stack, |ord| ord.is_le())?,
                OpCode::Gt => compare(&mut stack, |ord| ord.is_gt())?,
                OpCode::Ge => compare(&mut stack, |ord| ord.is_ge())?,
                OpCode::Not => match pop(&mut stack)? {
                    Value::Bool(v) => stack.push(Value::Bool(!v)),
                    other => return Err(type_error("bool", &other)),
                },

                OpCode::Jump => {
                    let distance = self.read_u16(chunk, &mut ip, at)? as usize;
                    ip += distance;
                }
                OpCode::JumpIfFalse => {
                    let distance = self.read_u16(chunk, &mut ip, at)? as usize;
                    match pop(&mut stack)? {
                        Value::Bool(false) => ip += distance,
                        Value::Bool(true) => {}
                        other => return Err(type_error("bool", &other)),
                    }
                }
                OpCode::JumpIfTrue => {
                    let distance = self.read_u16(chunk, &mut ip, at)? as usize;
                    match pop(&mut stack)? {
                        Value::Bool(true) => ip += distance,
                        Value::Bool(false) => {}
                        other => return Err(type_error("bool", &other)),
                    }
                }
                OpCode::Loop => {
                    let distance = self.read_u16(chunk, &mut ip, at)? as usize;
                    ip -= distance;
                }

                OpCode::Call => {
                    let hash = self.hash_operand(chunk, &mut ip, at)?;
                    let argc = self.argc_operand(chunk, &mut ip, at)?;
                    let call_args = pop_n(&mut stack, argc)?;
                    let result = self.run(hash, None, call_args)?;
                    self.push_result(&mut stack, hash, result);
                }
                OpCode::CallMethod => {
                    let hash = self.hash_operand(chunk, &mut ip, at)?;
                    let argc = self.argc_operand(chunk, &mut ip, at)?;
                    let call_args = pop_n(&mut stack, argc)?;
                    let receiver = pop(&mut stack)?;
                    if receiver.is_null() {
                        return Err(RuntimeError::NullReference(
                            "method call on a null receiver".into(),
                        ));
                    }
                    let result = self.run(hash, Some(receiver), call_args)?;
                    self.push_result(&mut stack, hash, result);
                }
                OpCode::New => {
                    let ctor = self.hash_operand(chunk, &mut ip, at)?;
                    let argc = self.argc_operand(chunk, &mut ip, at)?;
                    let call_args = pop_n(&mut stack, argc)?;
                    let value = self.construct(ctor, call_args)?;
                    stack.push(value);
                }
                OpCode::CallHost => {
                    let id = chunk
                        .read_byte(ip)
                        .ok_or(RuntimeError::MalformedBytecode(at))?;
                    ip += 1;
                    let argc = self.argc_operand(chunk, &mut ip, at)?;
                    let host_args = pop_n(&mut stack, argc)?;
                    self.call_host(id, host_args)?;
                }

                OpCode::NewDelegate => {
                    let hash = self.hash_operand(chunk, &mut ip, at)?;
                    let flags = chunk
                        .read_byte(ip)
                        .ok_or(RuntimeError::MalformedBytecode(at))?;
                    ip += 1;
                    let receiver = if flags & 1 != 0 {
                        let receiver = pop(&mut stack)?;
                        if receiver.is_null() {
                            return Err(RuntimeError::NullReference(
                                "binding a delegate to a null receiver".into(),
                            ));
                        }
                        Some(receiver)
                    } else {
                        None
                    };
                    stack.push(Value::delegate(vec![DelegateEntry {
                        receiver,
                        method: hash,
                    }]));
                }
                OpCode::DelegateCombine => {
                    let b = pop(&mut stack)?;
                    let a = pop(&mut stack)?;
                    stack.push(delegate_combine(&a, &b));
                }
                OpCode::DelegateRemove => {
                    let b = pop(&mut stack)?;
                    let a = pop(&mut stack)?;
                    stack.push(delegate_remove(&a, &b));
                }
                OpCode::InvokeDelegate => {
                    let argc = self.argc_operand(chunk, &mut ip, at)?;
                    let target = pop(&mut stack)?;
                    let call_args = pop_n(&mut stack, argc)?;
                    let Value::Delegate(delegate) = target else {
                        if target.is_null() {
                            return Err(RuntimeError::NullReference(
                                "invoking a null delegate".into(),
                            ));
                        }
                        return Err(type_error("delegate", &target));
                    };
                    let mut last = Value::Unit;
                    let mut last_method = None;
                    for entry in &delegate.entries {
                        last =
                            self.run(entry.method, entry.receiver.clone(), call_args.clone())?;
                        last_method = Some(entry.method);
                    }
                    // Only the last entry's return survives dispatch.
                    if let Some(hash) = last_method {
                        self.push_result(&mut stack, hash, last);
                    }
                }

                OpCode::ListLen => match pop(&mut stack)? {
                    Value::List(list) => stack.push(Value::Int32(list.borrow().len() as i32)),
                    Value::Null => {
                        return Err(RuntimeError::NullReference("iterating a null list".into()));
                    }
                    other => return Err(type_error("list", &other)),
                },
                OpCode::ListGet => {
                    let index = pop(&mut stack)?;
                    let list = pop(&mut stack)?;
                    stack.push(list_get(&list, &index)?);
                }

                OpCode::Return => return pop(&mut stack),
                OpCode::ReturnVoid => return Ok(Value::Unit),
            }
        }
    }

    /// Push a call result when the callee declares a return value.
    ///
    /// A value-returning body that falls off its end yields null.
    fn push_result(&self, stack: &mut Vec<Value>, method: TypeHash, result: Value) {
        let returns_value = self
            .methods
            .get(&method)
            .map(|info| info.returns_value)
            .unwrap_or(false);
        if returns_value {
            let value = match result {
                Value::Unit => Value::Null,
                other => other,
            };
            stack.push(value);
        }
    }

    fn construct(&mut self, ctor: TypeHash, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let info = self
            .methods
            .get(&ctor)
            .copied()
            .ok_or(RuntimeError::UnknownFunction(ctor.0))?;
        if info.native == Some(Native::ListCtor) {
            return Ok(Value::list(Vec::new()));
        }
        let layout = self
            .layouts
            .get(&info.owner)
            .ok_or(RuntimeError::UnknownFunction(ctor.0))?;
        let fields = layout.iter().map(|&dt| default_value(dt)).collect();
        let object = Value::Object(Rc::new(std::cell::RefCell::new(ObjectData {
            type_hash: info.owner,
            fields,
        })));
        self.run(ctor, Some(object.clone()), args)?;
        Ok(object)
    }

    fn run_native(
        &mut self,
        native: Native,
        this: Option<Value>,
        mut args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match native {
            Native::ListCtor => Ok(Value::list(Vec::new())),
            Native::ListAdd => {
                let list = expect_list(this)?;
                let item = take_arg(&mut args)?;
                let mut items = list.borrow_mut();
                items.push(item);
                Ok(Value::Int32(items.len() as i32 - 1))
            }
            Native::ListClear => {
                let list = expect_list(this)?;
                list.borrow_mut().clear();
                Ok(Value::Unit)
            }
            Native::ListCount => {
                let list = expect_list(this)?;
                let len = list.borrow().len();
                Ok(Value::Int32(len as i32))
            }
            Native::ListGetItem => {
                let list = expect_list(this)?;
                let index = take_arg(&mut args)?;
                list_get(&Value::List(list), &index)
            }
            Native::ListSetItem => {
                let list = expect_list(this)?;
                let index = take_arg(&mut args)?;
                let value = take_arg(&mut args)?;
                let Value::Int32(index) = index else {
                    return Err(type_error("int32", &index));
                };
                let mut items = list.borrow_mut();
                let slot = items
                    .get_mut(index as usize)
                    .ok_or_else(|| bad_slot("list element", index as usize))?;
                *slot = value;
                Ok(Value::Unit)
            }
        }
    }

    fn call_host(&mut self, id: u8, args: Vec<Value>) -> Result<(), RuntimeError> {
        match id {
            HOST_WRITE_LINE => {
                let mut args = args.into_iter();
                let format = match args.next() {
                    Some(Value::Str(s)) => s,
                    Some(other) => return Err(type_error("string", &other)),
                    None => return Err(RuntimeError::StackUnderflow),
                };
                let values: Vec<Value> = args.collect();
                let line = format_line(&format, &values);
                self.output.push(line);
                Ok(())
            }
            other => Err(RuntimeError::InvalidOperand(format!(
                "unknown host function {other}"
            ))),
        }
    }

    fn constant_value(&self, index: u16) -> Result<Value, RuntimeError> {
        match self.module.constants.get(index) {
            Some(Constant::Int32(v)) => Ok(Value::Int32(*v)),
            Some(Constant::Int64(v)) => Ok(Value::Int64(*v)),
            Some(Constant::Float64(v)) => Ok(Value::Float64(*v)),
            Some(Constant::Decimal(v)) => Ok(Value::Decimal(*v)),
            Some(Constant::Str(v)) => Ok(Value::string(v.clone())),
            Some(Constant::Hash(_)) => Err(RuntimeError::InvalidOperand(
                "member hash loaded as a value".into(),
            )),
            None => Err(RuntimeError::InvalidOperand(format!(
                "constant index {index} out of range"
            ))),
        }
    }

    fn hash_operand(
        &self,
        chunk: &codeforge_compiler::Chunk,
        ip: &mut usize,
        at: usize,
    ) -> Result<TypeHash, RuntimeError> {
        let index = self.read_u16(chunk, ip, at)?;
        match self.module.constants.get(index) {
            Some(Constant::Hash(hash)) => Ok(*hash),
            _ => Err(RuntimeError::MalformedBytecode(at)),
        }
    }

    fn argc_operand(
        &self,
        chunk: &codeforge_compiler::Chunk,
        ip: &mut usize,
        at: usize,
    ) -> Result<usize, RuntimeError> {
        let argc = chunk
            .read_byte(*ip)
            .ok_or(RuntimeError::MalformedBytecode(at))?;
        *ip += 1;
        Ok(argc as usize)
    }

    fn read_u16(
        &self,
        chunk: &codeforge_compiler::Chunk,
        ip: &mut usize,
        at: usize,
    ) -> Result<u16, RuntimeError> {
        let value = chunk
            .read_u16(*ip)
            .ok_or(RuntimeError::MalformedBytecode(at))?;
        *ip += 2;
        Ok(value)
    }
}

// =============================================================================
// Loading Helpers
// =============================================================================

fn register_list_natives(methods: &mut FxHashMap<TypeHash, MethodInfo>) {
    let object = builtins::OBJECT;
    let int32 = builtins::INT32;
    let entries = [
        (
            TypeHash::from_constructor(builtins::LIST, &[]),
            Native::ListCtor,
            false,
        ),
        (
            TypeHash::from_method(builtins::LIST, "add", &[object]),
            Native::ListAdd,
            true,
        ),
        (
            TypeHash::from_method(builtins::LIST, "clear", &[]),
            Native::ListClear,
            false,
        ),
        (
            TypeHash::from_method(builtins::LIST, "count", &[]),
            Native::ListCount,
            true,
        ),
        (
            TypeHash::from_method(builtins::LIST, "get_item", &[int32]),
            Native::ListGetItem,
            true,
        ),
        (
            TypeHash::from_method(builtins::LIST, "set_item", &[int32, object]),
            Native::ListSetItem,
            false,
        ),
    ];
    for (hash, native, returns_value) in entries {
        methods.insert(
            hash,
            MethodInfo {
                returns_value,
                owner: builtins::LIST,
                native: Some(native),
            },
        );
    }
}

/// Compute each declared type's full instance layout, base chain first.
///
/// Field slots are absolute, so the layout is filled by slot from every
/// type in the chain. Catalog bases contribute no fields.
fn build_layouts(types: &[TypeDef]) -> FxHashMap<TypeHash, Vec<DataType>> {
    let by_hash: FxHashMap<TypeHash, &TypeDef> =
        types.iter().map(|def| (def.type_hash, def)).collect();
    let mut layouts = FxHashMap::default();

    for def in types {
        let mut slots: Vec<(u32, DataType)> = Vec::new();
        let mut cursor = Some(def.type_hash);
        while let Some(hash) = cursor {
            let Some(current) = by_hash.get(&hash) else {
                break;
            };
            for field in &current.fields {
                if !field.modifiers.is_static() {
                    slots.push((field.slot, field.data_type));
                }
            }
            cursor = current.base;
        }
        slots.sort_by_key(|&(slot, _)| slot);
        layouts.insert(def.type_hash, slots.into_iter().map(|(_, dt)| dt).collect());
    }
    layouts
}

fn default_value(data_type: DataType) -> Value {
    match data_type.hash {
        builtins::BOOL => Value::Bool(false),
        builtins::INT32 => Value::Int32(0),
        builtins::INT64 => Value::Int64(0),
        builtins::FLOAT64 => Value::Float64(0.0),
        builtins::DECIMAL => Value::Decimal(Decimal::ZERO),
        _ => Value::Null,
    }
}

// =============================================================================
// Execution Helpers
// =============================================================================

fn pop(stack: &mut Vec<Value>) -> Result<Value, RuntimeError> {
    stack.pop().ok_or(RuntimeError::StackUnderflow)
}

/// Pop `count` values, restoring pushed order.
fn pop_n(stack: &mut Vec<Value>, count: usize) -> Result<Vec<Value>, RuntimeError> {
    if stack.len() < count {
        return Err(RuntimeError::StackUnderflow);
    }
    Ok(stack.split_off(stack.len() - count))
}

fn type_error(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::InvalidOperand(format!("expected {expected}, got {got}"))
}

fn bad_slot(kind: &str, slot: usize) -> RuntimeError {
    RuntimeError::InvalidOperand(format!("{kind} slot {slot} out of range"))
}

fn local_at(locals: &[Value], slot: usize) -> Result<Value, RuntimeError> {
    locals
        .get(slot)
        .cloned()
        .ok_or_else(|| bad_slot("local", slot))
}

fn set_local(locals: &mut [Value], slot: usize, value: Value) -> Result<(), RuntimeError> {
    let target = locals.get_mut(slot).ok_or_else(|| bad_slot("local", slot))?;
    *target = value;
    Ok(())
}

fn get_field(receiver: &Value, slot: usize) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Object(object) => object
            .borrow()
            .fields
            .get(slot)
            .cloned()
            .ok_or_else(|| bad_slot("field", slot)),
        Value::Null => Err(RuntimeError::NullReference(
            "field access on a null receiver".into(),
        )),
        other => Err(type_error("object", other)),
    }
}

fn set_field(receiver: &Value, slot: usize, value: Value) -> Result<(), RuntimeError> {
    match receiver {
        Value::Object(object) => {
            let mut data = object.borrow_mut();
            let target = data
                .fields
                .get_mut(slot)
                .ok_or_else(|| bad_slot("field", slot))?;
            *target = value;
            Ok(())
        }
        Value::Null => Err(RuntimeError::NullReference(
            "field store on a null receiver".into(),
        )),
        other => Err(type_error("object", other)),
    }
}

fn list_get(list: &Value, index: &Value) -> Result<Value, RuntimeError> {
    let Value::List(list) = list else {
        if list.is_null() {
            return Err(RuntimeError::NullReference("indexing a null list".into()));
        }
        return Err(type_error("list", list));
    };
    let Value::Int32(index) = index else {
        return Err(type_error("int32", index));
    };
    list.borrow()
        .get(*index as usize)
        .cloned()
        .ok_or_else(|| bad_slot("list element", *index as usize))
}

fn expect_list(this: Option<Value>) -> Result<Rc<std::cell::RefCell<Vec<Value>>>, RuntimeError> {
    match this {
        Some(Value::List(list)) => Ok(list),
        Some(Value::Null) | None => {
            Err(RuntimeError::NullReference("list method on null".into()))
        }
        Some(other) => Err(type_error("list", &other)),
    }
}

fn take_arg(args: &mut Vec<Value>) -> Result<Value, RuntimeError> {
    if args.is_empty() {
        return Err(RuntimeError::StackUnderflow);
    }
    Ok(args.remove(0))
}

fn int32_op(
    stack: &mut Vec<Value>,
    f: impl Fn(i32, i32) -> Result<i32, RuntimeError>,
) -> Result<(), RuntimeError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    match (a, b) {
        (Value::Int32(a), Value::Int32(b)) => {
            stack.push(Value::Int32(f(a, b)?));
            Ok(())
        }
        (a, _) => Err(type_error("int32", &a)),
    }
}

fn int64_op(
    stack: &mut Vec<Value>,
    f: impl Fn(i64, i64) -> Result<i64, RuntimeError>,
) -> Result<(), RuntimeError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    match (a, b) {
        (Value::Int64(a), Value::Int64(b)) => {
            stack.push(Value::Int64(f(a, b)?));
            Ok(())
        }
        (a, _) => Err(type_error("int64", &a)),
    }
}

fn float_op(stack: &mut Vec<Value>, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    match (a, b) {
        (Value::Float64(a), Value::Float64(b)) => {
            stack.push(Value::Float64(f(a, b)));
            Ok(())
        }
        (a, _) => Err(type_error("float64", &a)),
    }
}

fn decimal_op(
    stack: &mut Vec<Value>,
    f: impl Fn(Decimal, Decimal) -> Result<Decimal, RuntimeError>,
) -> Result<(), RuntimeError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    match (a, b) {
        (Value::Decimal(a), Value::Decimal(b)) => {
            stack.push(Value::Decimal(f(a, b)?));
            Ok(())
        }
        (a, _) => Err(type_error("decimal", &a)),
    }
}

fn compare(
    stack: &mut Vec<Value>,
    keep: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<(), RuntimeError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    let ordering = match (&a, &b) {
        (Value::Int32(x), Value::Int32(y)) => x.cmp(y),
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Float64(x), Value::Float64(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| RuntimeError::InvalidOperand("NaN comparison".into()))?,
        (Value::Decimal(x), Value::Decimal(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| RuntimeError::InvalidOperand("decimal comparison".into()))?,
        _ => return Err(type_error("comparable operands", &a)),
    };
    stack.push(Value::Bool(keep(ordering)));
    Ok(())
}

/// Expand `{0}`-style placeholders over formatted values.
fn format_line(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }
        if chars.peek() == Some(&'}') && !digits.is_empty() {
            chars.next();
            match digits.parse::<usize>().ok().and_then(|i| args.get(i)) {
                Some(value) => out.push_str(&value.to_string()),
                None => {
                    out.push('{');
                    out.push_str(&digits);
                    out.push('}');
                }
            }
        } else {
            out.push('{');
            out.push_str(&digits);
        }
    }
    out
}
