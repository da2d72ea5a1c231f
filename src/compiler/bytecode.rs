//! Bytecode instruction set and chunk format
//!
//! Registers form three regions: scratch registers allocated in stack order, local
//! variable slots, and read-only registers that address the constant pool.

use serde::Serialize;

use crate::error::JsError;
use crate::value::JsString;

/// Register index
pub type Register = u16;

/// Constant pool index
pub type ConstantIndex = u16;

/// Jump target (instruction offset)
pub type JumpTarget = u32;

/// Number of scratch registers
pub const REGULAR_REGISTER_LIMIT: Register = 128;

/// Number of local variable slots
pub const VARIABLE_LIMIT: Register = 256;

/// First constant register; constant `i` lives in register `CONSTANT_REGISTER_BASE + i`
pub const CONSTANT_REGISTER_BASE: Register = REGULAR_REGISTER_LIMIT + VARIABLE_LIMIT;

pub fn is_scratch_register(r: Register) -> bool {
    r < REGULAR_REGISTER_LIMIT
}

pub fn is_local_register(r: Register) -> bool {
    (REGULAR_REGISTER_LIMIT..CONSTANT_REGISTER_BASE).contains(&r)
}

pub fn is_constant_register(r: Register) -> bool {
    r >= CONSTANT_REGISTER_BASE
}

/// Register of local slot `slot`
pub fn local_register(slot: usize) -> Option<Register> {
    let slot = Register::try_from(slot).ok()?;
    (slot < VARIABLE_LIMIT).then_some(REGULAR_REGISTER_LIMIT + slot)
}

/// Register addressing constant `idx`
pub fn constant_register(idx: ConstantIndex) -> Option<Register> {
    CONSTANT_REGISTER_BASE.checked_add(idx)
}

/// Bytecode instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Op {
    // ═══════════════════════════════════════════════════════════════════════════════
    // Constants & Register Operations
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Load constant from pool: r[dst] = constants[idx]
    LoadConst { dst: Register, idx: ConstantIndex },

    /// r[dst] = undefined
    LoadUndefined { dst: Register },

    /// r[dst] = null
    LoadNull { dst: Register },

    /// r[dst] = value
    LoadBool { dst: Register, value: bool },

    /// Small integer without a constant pool entry: r[dst] = value
    LoadInt { dst: Register, value: i32 },

    /// r[dst] = r[src]
    Move { dst: Register, src: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Binary Operations
    // ═══════════════════════════════════════════════════════════════════════════════
    Add { dst: Register, left: Register, right: Register },
    Sub { dst: Register, left: Register, right: Register },
    Mul { dst: Register, left: Register, right: Register },
    Div { dst: Register, left: Register, right: Register },
    Mod { dst: Register, left: Register, right: Register },
    Eq { dst: Register, left: Register, right: Register },
    NotEq { dst: Register, left: Register, right: Register },
    StrictEq { dst: Register, left: Register, right: Register },
    StrictNotEq { dst: Register, left: Register, right: Register },
    Lt { dst: Register, left: Register, right: Register },
    LtEq { dst: Register, left: Register, right: Register },
    Gt { dst: Register, left: Register, right: Register },
    GtEq { dst: Register, left: Register, right: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Unary Operations
    // ═══════════════════════════════════════════════════════════════════════════════
    Neg { dst: Register, src: Register },
    ToNumber { dst: Register, src: Register },
    Not { dst: Register, src: Register },
    Typeof { dst: Register, src: Register },

    /// `typeof name` that yields "undefined" for unresolvable names instead of throwing
    TypeofVar { dst: Register, name: ConstantIndex },

    /// r[dst] = ToNumber(r[src]) + 1
    Inc { dst: Register, src: Register },

    /// r[dst] = ToNumber(r[src]) - 1
    Dec { dst: Register, src: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Control Flow
    // ═══════════════════════════════════════════════════════════════════════════════
    Jump { target: JumpTarget },
    JumpIfTrue { cond: Register, target: JumpTarget },
    JumpIfFalse { cond: Register, target: JumpTarget },
    JumpIfNullish { cond: Register, target: JumpTarget },
    JumpIfNotNullish { cond: Register, target: JumpTarget },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Named Bindings
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Read a binding by name: r[dst] = name
    GetVar { dst: Register, name: ConstantIndex },

    /// Write a binding by name. An unresolvable name throws in strict code and
    /// creates a global property otherwise.
    SetVar {
        name: ConstantIndex,
        src: Register,
        strict: bool,
    },

    /// Hoisted `var`: create the global property if absent
    DeclareVar { name: ConstantIndex },

    /// Initialize a top-level let/const binding
    InitLexical {
        name: ConstantIndex,
        src: Register,
        mutable: bool,
    },

    /// Access to a lexical binding before its initialization
    ThrowReferenceError { name: ConstantIndex },

    /// Assignment to a const binding
    ThrowConstAssignment { name: ConstantIndex },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Objects & Arrays
    // ═══════════════════════════════════════════════════════════════════════════════
    CreateObject { dst: Register },

    /// r[dst] = [r[start], ..., r[start + count - 1]]
    CreateArray {
        dst: Register,
        start: Register,
        count: u16,
    },

    /// r[dst] = r[obj][r[key]]
    GetProperty {
        dst: Register,
        obj: Register,
        key: Register,
    },

    /// r[dst] = r[obj][constants[key]]
    GetPropertyConst {
        dst: Register,
        obj: Register,
        key: ConstantIndex,
    },

    /// r[dst] = r[obj][index]
    GetIndex {
        dst: Register,
        obj: Register,
        index: u32,
    },

    /// r[obj][r[key]] = r[value]; a rejected write throws when `strict`
    SetProperty {
        obj: Register,
        key: Register,
        value: Register,
        strict: bool,
    },

    /// r[obj][constants[key]] = r[value]; a rejected write throws when `strict`
    SetPropertyConst {
        obj: Register,
        key: ConstantIndex,
        value: Register,
        strict: bool,
    },

    /// Object literal entry (define semantics, never rejected)
    DefineProperty {
        obj: Register,
        key: Register,
        value: Register,
    },

    DefinePropertyConst {
        obj: Register,
        key: ConstantIndex,
        value: Register,
    },

    /// Throw TypeError when r[src] is null or undefined
    RequireObjectCoercible { src: Register },

    /// r[dst] = elements of r[src] from `start` on, as a new array
    ArrayRest {
        dst: Register,
        src: Register,
        start: u32,
    },

    /// r[dst] = own enumerable properties of r[src] except `constants[excluded]`
    /// and the keys held in r[keys_start..keys_start + keys_count]
    CopyObjectExcluding {
        dst: Register,
        src: Register,
        excluded: ConstantIndex,
        keys_start: Register,
        keys_count: u16,
    },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Calls & Completion
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = r[callee](r[args_start], ..., r[args_start + argc - 1])
    Call {
        dst: Register,
        callee: Register,
        args_start: Register,
        argc: u16,
    },

    Return { src: Register },

    Halt,
}

impl Op {
    /// Target of a jump instruction
    pub fn jump_target(&self) -> Option<JumpTarget> {
        match self {
            Op::Jump { target }
            | Op::JumpIfTrue { target, .. }
            | Op::JumpIfFalse { target, .. }
            | Op::JumpIfNullish { target, .. }
            | Op::JumpIfNotNullish { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn is_jump(&self) -> bool {
        self.jump_target().is_some()
    }
}

/// Constants that can be stored in the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),

    /// Keys to skip when collecting an object rest element
    ExcludedKeys(Vec<JsString>),
}

/// A compiled unit
#[derive(Debug, Clone, Default, Serialize)]
pub struct BytecodeChunk {
    /// The bytecode instructions
    pub code: Vec<Op>,

    /// Constant pool
    pub constants: Vec<Constant>,

    /// Scratch register high-water mark
    pub register_count: u16,

    /// Number of local variable slots
    pub local_count: u16,

    /// Local slot names, indexed by slot
    pub local_names: Vec<JsString>,

    /// let/const names whose declaring initialization was compiled, in order
    pub lexically_declared: Vec<JsString>,
}

impl BytecodeChunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the instruction at the given offset
    pub fn get(&self, offset: usize) -> Option<&Op> {
        self.code.get(offset)
    }

    /// Get a constant from the pool
    pub fn get_constant(&self, idx: ConstantIndex) -> Option<&Constant> {
        self.constants.get(idx as usize)
    }

    /// Constant addressed by a constant register
    pub fn constant_for_register(&self, r: Register) -> Option<&Constant> {
        let idx = r.checked_sub(CONSTANT_REGISTER_BASE)?;
        self.get_constant(idx)
    }

    /// Register of a local variable by name
    pub fn local_register(&self, name: &str) -> Option<Register> {
        let slot = self.local_names.iter().position(|n| n.as_str() == name)?;
        local_register(slot)
    }

    /// JSON dump of the chunk, for inspection tooling
    pub fn to_json(&self) -> Result<String, JsError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| JsError::internal_error(format!("chunk serialization failed: {}", e)))
    }
}
