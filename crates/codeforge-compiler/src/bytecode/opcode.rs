//! Bytecode operation codes.
//!
//! The instruction set for the target stack machine. Each opcode is a
//! single byte, with big-endian operands following inline.

/// Bytecode operation codes.
///
/// The target is a stack machine: most operations pop operands from the
/// value stack and push results back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Constants
    // =========================================================================
    /// Push constant from pool (8-bit index).
    /// Operand: u8 constant index
    Constant = 0,
    /// Push constant from pool (16-bit index).
    /// Operand: u16 constant index (big-endian)
    ConstantWide,
    /// Push the null reference.
    PushNull,
    /// Push boolean true.
    PushTrue,
    /// Push boolean false.
    PushFalse,
    /// Push int32 0.
    PushZero,
    /// Push int32 1.
    PushOne,

    // =========================================================================
    // Stack Operations
    // =========================================================================
    /// Pop top of stack.
    Pop,
    /// Duplicate top of stack.
    Dup,

    // =========================================================================
    // Local Variables
    // =========================================================================
    /// Load local variable.
    /// Operand: u8 slot index
    GetLocal,
    /// Store to local variable.
    /// Operand: u8 slot index
    SetLocal,
    /// Load local variable (16-bit slot).
    /// Operand: u16 slot index
    GetLocalWide,
    /// Store to local variable (16-bit slot).
    /// Operand: u16 slot index
    SetLocalWide,

    // =========================================================================
    // Static Fields
    // =========================================================================
    /// Load module static slot.
    /// Operand: u16 slot index
    GetStatic,
    /// Store to module static slot.
    /// Operand: u16 slot index
    SetStatic,

    // =========================================================================
    // Object Fields
    // =========================================================================
    /// Load field of the object on top of the stack.
    /// Operand: u16 field slot
    GetField,
    /// Store to field: pops value, pops object.
    /// Operand: u16 field slot
    SetField,
    /// Push the `this` reference.
    GetThis,

    // =========================================================================
    // Arithmetic (int32)
    // =========================================================================
    AddI32,
    SubI32,
    MulI32,
    DivI32,
    ModI32,
    NegI32,

    // =========================================================================
    // Arithmetic (int64)
    // =========================================================================
    AddI64,
    SubI64,
    MulI64,
    DivI64,
    ModI64,
    NegI64,

    // =========================================================================
    // Arithmetic (float64)
    // =========================================================================
    AddF64,
    SubF64,
    MulF64,
    DivF64,
    NegF64,

    // =========================================================================
    // Arithmetic (decimal, exact)
    // =========================================================================
    AddDec,
    SubDec,
    MulDec,
    DivDec,
    NegDec,

    // =========================================================================
    // Widening Conversions
    // =========================================================================
    I32ToI64,
    I32ToF64,
    I64ToF64,
    I32ToDec,
    I64ToDec,

    // =========================================================================
    // Comparison / Logic
    // =========================================================================
    /// Equality on two values of the same runtime kind.
    Eq,
    /// Inequality.
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Boolean negation.
    Not,

    // =========================================================================
    // Control Flow
    // =========================================================================
    /// Unconditional forward jump.
    /// Operand: u16 offset
    Jump,
    /// Jump forward if top of stack is false (pops it).
    /// Operand: u16 offset
    JumpIfFalse,
    /// Jump forward if top of stack is true (pops it).
    /// Operand: u16 offset
    JumpIfTrue,
    /// Jump backward (loop).
    /// Operand: u16 offset
    Loop,

    // =========================================================================
    // Calls
    // =========================================================================
    /// Call a static method.
    /// Operand: u16 constant index (method hash) + u8 arg count
    Call,
    /// Call an instance method: pops args, then receiver.
    /// Operand: u16 constant index (method hash) + u8 arg count
    CallMethod,
    /// Allocate an object and run its constructor: pops args.
    /// Operand: u16 constant index (constructor hash) + u8 arg count
    New,
    /// Call a host function supplied by the target runtime: pops args.
    /// Operand: u8 host function id + u8 arg count
    CallHost,

    // =========================================================================
    // Delegates
    // =========================================================================
    /// Build a single-entry delegate. If flags bit 0 is set, pops the bound
    /// receiver from the stack.
    /// Operand: u16 constant index (method hash) + u8 flags
    NewDelegate,
    /// Append the invocation list of the top delegate to the one below it.
    DelegateCombine,
    /// Remove the last contiguous occurrence of the top delegate's list
    /// from the one below it.
    DelegateRemove,
    /// Dispatch a delegate: pops the delegate, then the args, and calls
    /// each entry of the invocation list in order.
    /// Operand: u8 arg count
    InvokeDelegate,

    // =========================================================================
    // Lists (iteration support)
    // =========================================================================
    /// Pop a list, push its element count (int32).
    ListLen,
    /// Pop an index, pop a list, push the element.
    ListGet,

    // =========================================================================
    // Returns
    // =========================================================================
    /// Return the top of stack.
    Return,
    /// Return with no value.
    ReturnVoid,
}

impl OpCode {
    /// Convert from u8, returning None for invalid values.
    pub fn from_u8(value: u8) -> Option<Self> {
        if value <= OpCode::ReturnVoid as u8 {
            // SAFETY: OpCode is repr(u8) and the value is in range
            Some(unsafe { std::mem::transmute::<u8, OpCode>(value) })
        } else {
            None
        }
    }

    /// Size of this opcode's inline operands in bytes.
    ///
    /// Does NOT include the opcode byte itself.
    pub fn operand_size(&self) -> usize {
        match self {
            OpCode::PushNull
            | OpCode::PushTrue
            | OpCode::PushFalse
            | OpCode::PushZero
            | OpCode::PushOne
            | OpCode::Pop
            | OpCode::Dup
            | OpCode::GetThis
            | OpCode::AddI32
            | OpCode::SubI32
            | OpCode::MulI32
            | OpCode::DivI32
            | OpCode::ModI32
            | OpCode::NegI32
            | OpCode::AddI64
            | OpCode::SubI64
            | OpCode::MulI64
            | OpCode::DivI64
            | OpCode::ModI64
            | OpCode::NegI64
            | OpCode::AddF64
            | OpCode::SubF64
            | OpCode::MulF64
            | OpCode::DivF64
            | OpCode::NegF64
            | OpCode::AddDec
            | OpCode::SubDec
            | OpCode::MulDec
            | OpCode::DivDec
            | OpCode::NegDec
            | OpCode::I32ToI64
            | OpCode::I32ToF64
            | OpCode::I64ToF64
            | OpCode::I32ToDec
            | OpCode::I64ToDec
            | OpCode::Eq
            | OpCode::Ne
            | OpCode::Lt
            | OpCode::Le
            | OpCode::Gt
            | OpCode::Ge
            | OpCode::Not
            | OpCode::DelegateCombine
            | OpCode::DelegateRemove
            | OpCode::ListLen
            | OpCode::ListGet
            | OpCode::Return
            | OpCode::ReturnVoid => 0,

            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::InvokeDelegate => 1,

            OpCode::ConstantWide
            | OpCode::GetLocalWide
            | OpCode::SetLocalWide
            | OpCode::GetStatic
            | OpCode::SetStatic
            | OpCode::GetField
            | OpCode::SetField
            | OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::JumpIfTrue
            | OpCode::Loop
            | OpCode::CallHost => 2,

            OpCode::Call | OpCode::CallMethod | OpCode::New | OpCode::NewDelegate => 3,
        }
    }

    /// Opcode name for debugging and test failure messages.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Constant => "CONSTANT",
            OpCode::ConstantWide => "CONSTANT_WIDE",
            OpCode::PushNull => "PUSH_NULL",
            OpCode::PushTrue => "PUSH_TRUE",
            OpCode::PushFalse => "PUSH_FALSE",
            OpCode::PushZero => "PUSH_ZERO",
            OpCode::PushOne => "PUSH_ONE",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::GetLocalWide => "GET_LOCAL_WIDE",
            OpCode::SetLocalWide => "SET_LOCAL_WIDE",
            OpCode::GetStatic => "GET_STATIC",
            OpCode::SetStatic => "SET_STATIC",
            OpCode::GetField => "GET_FIELD",
            OpCode::SetField => "SET_FIELD",
            OpCode::GetThis => "GET_THIS",
            OpCode::AddI32 => "ADD_I32",
            OpCode::SubI32 => "SUB_I32",
            OpCode::MulI32 => "MUL_I32",
            OpCode::DivI32 => "DIV_I32",
            OpCode::ModI32 => "MOD_I32",
            OpCode::NegI32 => "NEG_I32",
            OpCode::AddI64 => "ADD_I64",
            OpCode::SubI64 => "SUB_I64",
            OpCode::MulI64 => "MUL_I64",
            OpCode::DivI64 => "DIV_I64",
            OpCode::ModI64 => "MOD_I64",
            OpCode::NegI64 => "NEG_I64",
            OpCode::AddF64 => "ADD_F64",
            OpCode::SubF64 => "SUB_F64",
            OpCode::MulF64 => "MUL_F64",
            OpCode::DivF64 => "DIV_F64",
            OpCode::NegF64 => "NEG_F64",
            OpCode::AddDec => "ADD_DEC",
            OpCode::SubDec => "SUB_DEC",
            OpCode::MulDec => "MUL_DEC",
            OpCode::DivDec => "DIV_DEC",
            OpCode::NegDec => "NEG_DEC",
            OpCode::I32ToI64 => "I32_TO_I64",
            OpCode::I32ToF64 => "I32_TO_F64",
            OpCode::I64ToF64 => "I64_TO_F64",
            OpCode::I32ToDec => "I32_TO_DEC",
            OpCode::I64ToDec => "I64_TO_DEC",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Gt => "GT",
            OpCode::Ge => "GE",
            OpCode::Not => "NOT",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::JumpIfTrue => "JUMP_IF_TRUE",
            OpCode::Loop => "LOOP",
            OpCode::Call => "CALL",
            OpCode::CallMethod => "CALL_METHOD",
            OpCode::New => "NEW",
            OpCode::CallHost => "CALL_HOST",
            OpCode::NewDelegate => "NEW_DELEGATE",
            OpCode::DelegateCombine => "DELEGATE_COMBINE",
            OpCode::DelegateRemove => "DELEGATE_REMOVE",
            OpCode::InvokeDelegate => "INVOKE_DELEGATE",
            OpCode::ListLen => "LIST_LEN",
            OpCode::ListGet => "LIST_GET",
            OpCode::Return => "RETURN",
            OpCode::ReturnVoid => "RETURN_VOID",
        }
    }
}
