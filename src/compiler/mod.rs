//! Bytecode compiler for the assignment core
//!
//! This module compiles the AST to bytecode for execution by the register VM.
//! Scratch registers are handed out by a stack allocator; local variables of a
//! function unit live in fixed slots above them, and constants are addressable as
//! read-only registers above the slots.

mod alias;
mod builder;
mod bytecode;
mod compile_assign;
mod compile_expr;
mod compile_pattern;
mod compile_stmt;
mod context;
mod identifiers;
mod scope;

pub use alias::{can_use_direct_register, has_alias_hazard};
pub use builder::{BytecodeBuilder, JumpPlaceholder, RegisterAllocator};
pub use bytecode::{
    BytecodeChunk, CONSTANT_REGISTER_BASE, Constant, ConstantIndex, JumpTarget, Op,
    REGULAR_REGISTER_LIMIT, Register, VARIABLE_LIMIT, constant_register, is_constant_register,
    is_local_register, is_scratch_register, local_register,
};
pub use context::{CompileContext, ContextFlags};
pub use identifiers::{Access, IdentifierUse, Identifiers, bound_names};
pub use scope::{Resolution, Scope};

use std::rc::Rc;

use tracing::debug;

use crate::ast::{Program, Statement};
use crate::config::CompilerConfig;
use crate::error::JsError;
use crate::value::CheapClone;

/// Compiler state for converting AST to bytecode
pub struct Compiler {
    /// Current bytecode builder
    builder: BytecodeBuilder,

    /// Flags and the set of initialized lexical names
    context: CompileContext,

    /// Declarations of the unit being compiled
    scope: Scope,

    config: CompilerConfig,
}

impl Compiler {
    /// Create a compiler for one unit
    pub fn new(statements: &[Statement], config: &CompilerConfig) -> Result<Self, JsError> {
        Ok(Self {
            builder: BytecodeBuilder::new(),
            context: CompileContext::new(config),
            scope: Scope::analyze(statements, config)?,
            config: *config,
        })
    }

    /// Compile a program to bytecode
    pub fn compile_program(
        program: &Program,
        config: &CompilerConfig,
    ) -> Result<Rc<BytecodeChunk>, JsError> {
        let mut compiler = Compiler::new(&program.body, config)?;
        compiler.emit_hoisted_declarations()?;
        compiler.compile_statements(&program.body)?;

        let ends_with_return = compiler
            .builder
            .last_position_of(|op| matches!(op, Op::Return { .. }))
            .is_some_and(|pos| pos + 1 == compiler.builder.current_offset());
        if !ends_with_return {
            compiler.builder.emit_halt();
        }

        Ok(Rc::new(compiler.finish()?))
    }

    fn finish(self) -> Result<BytecodeChunk, JsError> {
        let mut chunk = self.builder.finish()?;
        chunk.local_count = self.scope.local_count()?;
        chunk.local_names = self.scope.local_names();
        chunk.lexically_declared = self
            .context
            .lexically_declared_names()
            .map(|name| name.cheap_clone())
            .collect();
        debug!(
            instructions = chunk.code.len(),
            constants = chunk.constants.len(),
            registers = chunk.register_count,
            locals = chunk.local_count,
            "compiled unit"
        );
        Ok(chunk)
    }

    /// Run `f` with `flags` installed, restoring the current flags afterwards
    pub(crate) fn with_flags<T>(
        &mut self,
        flags: ContextFlags,
        f: impl FnOnce(&mut Self) -> Result<T, JsError>,
    ) -> Result<T, JsError> {
        let saved = self.context.replace_flags(flags);
        let result = f(self);
        self.context.replace_flags(saved);
        result
    }

    fn acquire(&mut self) -> Result<Register, JsError> {
        self.builder.alloc_register()
    }

    fn release(&mut self, r: Register) -> Result<(), JsError> {
        self.builder.free_register(r)
    }

    /// Acquire `count` consecutive scratch registers, returning them in order
    fn acquire_block(&mut self, count: usize) -> Result<Vec<Register>, JsError> {
        (0..count).map(|_| self.acquire()).collect()
    }

    fn release_block(&mut self, registers: &[Register]) -> Result<(), JsError> {
        for &r in registers.iter().rev() {
            self.release(r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_with_flags_restores_on_error() {
        let config = CompilerConfig::function();
        let mut compiler = Compiler::new(&[], &config).unwrap();
        let parent = compiler.context.flags();

        let result: Result<(), JsError> =
            compiler.with_flags(parent.without_register_skip(), |c| {
                assert!(!c.context.flags().can_skip_copy_to_register);
                Err(JsError::internal_error("nested failure"))
            });

        assert!(result.is_err());
        assert_eq!(compiler.context.flags(), parent);
    }
}
