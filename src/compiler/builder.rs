//! BytecodeBuilder - helper for emitting bytecode instructions
//!
//! Provides the instruction buffer, the stack-discipline register allocator and
//! forward-jump patching.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use super::bytecode::{
    BytecodeChunk, CONSTANT_REGISTER_BASE, Constant, ConstantIndex, JumpTarget, Op,
    REGULAR_REGISTER_LIMIT, Register, constant_register, is_scratch_register,
};
use crate::error::JsError;
use crate::value::{CheapClone, JsString};

/// Placeholder for a jump that needs to be patched later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpPlaceholder {
    /// Index of the jump instruction in the code
    pub instruction_index: usize,
}

/// Register allocator for bytecode compilation
///
/// Every register in use sits on one stack. Scratch registers are numbered by the
/// count of scratch registers below them; local and constant registers are pushed
/// as they are without consuming a scratch index.
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    stack: Vec<Register>,

    /// Live scratch registers
    scratch_depth: Register,

    /// Maximum scratch depth reached (for determining register_count)
    max_used: Register,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh scratch register
    pub fn acquire(&mut self) -> Result<Register, JsError> {
        if self.scratch_depth >= REGULAR_REGISTER_LIMIT {
            return Err(JsError::internal_error(format!(
                "Too many registers needed (max {})",
                REGULAR_REGISTER_LIMIT
            )));
        }
        let r = self.scratch_depth;
        self.scratch_depth += 1;
        self.max_used = self.max_used.max(self.scratch_depth);
        self.stack.push(r);
        Ok(r)
    }

    /// Push an existing local or constant register
    pub fn push_slot(&mut self, r: Register) -> Result<(), JsError> {
        if is_scratch_register(r) {
            return Err(JsError::internal_error(format!(
                "register {} is a scratch register and must be acquired",
                r
            )));
        }
        self.stack.push(r);
        Ok(())
    }

    /// Release the most recently pushed register
    pub fn release(&mut self, r: Register) -> Result<(), JsError> {
        match self.stack.last() {
            Some(&top) if top == r => {
                self.stack.pop();
                if is_scratch_register(r) {
                    self.scratch_depth -= 1;
                }
                Ok(())
            }
            Some(&top) => Err(JsError::internal_error(format!(
                "register {} released while {} is on top of the register stack",
                r, top
            ))),
            None => Err(JsError::internal_error(format!(
                "register {} released from an empty register stack",
                r
            ))),
        }
    }

    /// Topmost register in use
    pub fn peek(&self) -> Option<Register> {
        self.stack.last().copied()
    }

    /// Number of registers in use
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn max_used(&self) -> Register {
        self.max_used
    }
}

/// Builder for constructing bytecode chunks
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    /// Bytecode instructions
    code: Vec<Op>,

    /// Constant pool
    constants: Vec<Constant>,

    /// String constant deduplication map
    string_map: FxHashMap<JsString, ConstantIndex>,

    /// Number constant deduplication map
    number_map: FxHashMap<u64, ConstantIndex>,

    /// Pool index of undefined, null, false, true
    singleton_map: FxHashMap<u8, ConstantIndex>,

    /// Jumps emitted but not yet patched
    pending_jumps: FxHashSet<usize>,

    registers: RegisterAllocator,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get access to the register allocator
    pub fn registers(&mut self) -> &mut RegisterAllocator {
        &mut self.registers
    }

    /// Emit an instruction and return its index
    pub fn emit(&mut self, op: Op) -> usize {
        let index = self.code.len();
        self.code.push(op);
        index
    }

    fn emit_placeholder(&mut self, op: Op) -> JumpPlaceholder {
        let index = self.emit(op);
        self.pending_jumps.insert(index);
        JumpPlaceholder {
            instruction_index: index,
        }
    }

    /// Emit a jump instruction with a placeholder target
    pub fn emit_jump(&mut self) -> JumpPlaceholder {
        self.emit_placeholder(Op::Jump { target: 0 })
    }

    /// Emit a conditional jump (if true) with a placeholder target
    pub fn emit_jump_if_true(&mut self, cond: Register) -> JumpPlaceholder {
        self.emit_placeholder(Op::JumpIfTrue { cond, target: 0 })
    }

    /// Emit a conditional jump (if false) with a placeholder target
    pub fn emit_jump_if_false(&mut self, cond: Register) -> JumpPlaceholder {
        self.emit_placeholder(Op::JumpIfFalse { cond, target: 0 })
    }

    /// Emit a conditional jump (if nullish) with a placeholder target
    pub fn emit_jump_if_nullish(&mut self, cond: Register) -> JumpPlaceholder {
        self.emit_placeholder(Op::JumpIfNullish { cond, target: 0 })
    }

    /// Emit a conditional jump (if NOT nullish) with a placeholder target
    pub fn emit_jump_if_not_nullish(&mut self, cond: Register) -> JumpPlaceholder {
        self.emit_placeholder(Op::JumpIfNotNullish { cond, target: 0 })
    }

    /// Patch a jump placeholder to jump to the current position
    pub fn patch_jump(&mut self, placeholder: JumpPlaceholder) -> Result<(), JsError> {
        let target = JumpTarget::try_from(self.code.len())
            .map_err(|_| JsError::internal_error("bytecode too long for a jump target"))?;
        self.patch_jump_to(placeholder, target)
    }

    /// Patch a jump placeholder to jump to a specific target.
    ///
    /// Each placeholder is patched exactly once, never to a position before itself.
    pub fn patch_jump_to(
        &mut self,
        placeholder: JumpPlaceholder,
        target: JumpTarget,
    ) -> Result<(), JsError> {
        let index = placeholder.instruction_index;
        if !self.pending_jumps.remove(&index) {
            return Err(JsError::internal_error(format!(
                "jump at {} is not awaiting a target",
                index
            )));
        }
        if (target as usize) < index {
            return Err(JsError::internal_error(format!(
                "forward jump at {} patched to earlier position {}",
                index, target
            )));
        }
        match self.code.get_mut(index) {
            Some(
                Op::Jump { target: t }
                | Op::JumpIfTrue { target: t, .. }
                | Op::JumpIfFalse { target: t, .. }
                | Op::JumpIfNullish { target: t, .. }
                | Op::JumpIfNotNullish { target: t, .. },
            ) => {
                *t = target;
                Ok(())
            }
            _ => Err(JsError::internal_error(format!(
                "instruction at {} is not a jump",
                index
            ))),
        }
    }

    /// Get the current instruction offset (for jump targets)
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Position of the most recent instruction matching `kind`
    pub fn last_position_of(&self, kind: impl Fn(&Op) -> bool) -> Option<usize> {
        self.code.iter().rposition(kind)
    }

    /// Instruction at a previously returned position
    pub fn peek(&self, position: usize) -> Option<&Op> {
        self.code.get(position)
    }

    /// Add a string constant to the pool (with deduplication)
    pub fn add_string(&mut self, s: JsString) -> Result<ConstantIndex, JsError> {
        if let Some(&idx) = self.string_map.get(&s) {
            return Ok(idx);
        }

        let idx = self.push_constant(Constant::String(s.cheap_clone()))?;
        self.string_map.insert(s, idx);
        Ok(idx)
    }

    /// Add a number constant to the pool (with deduplication)
    pub fn add_number(&mut self, n: f64) -> Result<ConstantIndex, JsError> {
        let bits = n.to_bits();
        if let Some(&idx) = self.number_map.get(&bits) {
            return Ok(idx);
        }

        let idx = self.push_constant(Constant::Number(n))?;
        self.number_map.insert(bits, idx);
        Ok(idx)
    }

    fn add_singleton(&mut self, key: u8, constant: Constant) -> Result<ConstantIndex, JsError> {
        if let Some(&idx) = self.singleton_map.get(&key) {
            return Ok(idx);
        }
        let idx = self.push_constant(constant)?;
        self.singleton_map.insert(key, idx);
        Ok(idx)
    }

    /// Add a constant to the pool, deduplicating primitives
    pub fn add_constant(&mut self, constant: Constant) -> Result<ConstantIndex, JsError> {
        match constant {
            Constant::String(s) => self.add_string(s),
            Constant::Number(n) => self.add_number(n),
            Constant::Undefined => self.add_singleton(0, Constant::Undefined),
            Constant::Null => self.add_singleton(1, Constant::Null),
            Constant::Boolean(b) => self.add_singleton(2 + b as u8, Constant::Boolean(b)),
            other => self.push_constant(other),
        }
    }

    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, JsError> {
        let limit = (Register::MAX - CONSTANT_REGISTER_BASE) as usize;
        if self.constants.len() >= limit {
            return Err(JsError::internal_error(format!(
                "Too many constants (max {})",
                limit
            )));
        }

        let idx = self.constants.len() as ConstantIndex;
        trace!(idx, ?constant, "constant pool entry");
        self.constants.push(constant);
        Ok(idx)
    }

    /// Read-only register holding `constant`
    pub fn constant_register(&mut self, constant: Constant) -> Result<Register, JsError> {
        let idx = self.add_constant(constant)?;
        constant_register(idx)
            .ok_or_else(|| JsError::internal_error("constant register space exhausted"))
    }

    /// Emit LoadConst for a string
    pub fn emit_load_string(&mut self, dst: Register, s: JsString) -> Result<(), JsError> {
        let idx = self.add_string(s)?;
        self.emit(Op::LoadConst { dst, idx });
        Ok(())
    }

    /// Emit LoadConst for a number
    pub fn emit_load_number(&mut self, dst: Register, n: f64) -> Result<(), JsError> {
        // Small integers skip the constant pool
        if n.fract() == 0.0 && (-128.0..=127.0).contains(&n) && !(n == 0.0 && n.is_sign_negative())
        {
            self.emit(Op::LoadInt {
                dst,
                value: n as i32,
            });
            return Ok(());
        }

        let idx = self.add_number(n)?;
        self.emit(Op::LoadConst { dst, idx });
        Ok(())
    }

    /// Emit Halt instruction
    pub fn emit_halt(&mut self) {
        self.emit(Op::Halt);
    }

    /// Allocate a scratch register
    pub fn alloc_register(&mut self) -> Result<Register, JsError> {
        self.registers.acquire()
    }

    /// Free a register
    pub fn free_register(&mut self, r: Register) -> Result<(), JsError> {
        self.registers.release(r)
    }

    /// Finish building and return the bytecode chunk.
    ///
    /// Fails when a forward jump was never patched or a register is still held.
    pub fn finish(self) -> Result<BytecodeChunk, JsError> {
        if let Some(index) = self.pending_jumps.iter().min() {
            return Err(JsError::internal_error(format!(
                "jump at {} was never patched",
                index
            )));
        }
        if let Some(r) = self.registers.peek() {
            return Err(JsError::internal_error(format!(
                "register {} still held when the unit was finished",
                r
            )));
        }
        Ok(BytecodeChunk {
            code: self.code,
            constants: self.constants,
            register_count: self.registers.max_used(),
            ..BytecodeChunk::default()
        })
    }
}
