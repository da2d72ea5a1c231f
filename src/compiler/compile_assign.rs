//! Assignment compilation
//!
//! A simple assignment takes one of three routes:
//!
//! - slow: the value mentions a name the target mentions, so the value is
//!   evaluated into a scratch register before anything is stored
//! - register-direct: a local target whose slot may be written in place receives
//!   the value directly, with no intermediate register
//! - general: the value is evaluated into its own register and then stored
//!
//! Compound, logical and update assignments read the target through the same
//! addresses the store later uses.

use tracing::{debug, trace};

use super::Compiler;
use super::alias::has_alias_hazard;
use super::bytecode::{Op, Register, is_constant_register};
use super::compile_expr::{binary_op, literal_constant};
use crate::ast::{
    AssignmentExpression, AssignmentOp, AssignmentTarget, BinaryOp, Expression, ExpressionKind,
    UpdateExpression, UpdateOp,
};
use crate::error::JsError;

fn compound_operator(op: AssignmentOp) -> Option<BinaryOp> {
    match op {
        AssignmentOp::AddAssign => Some(BinaryOp::Add),
        AssignmentOp::SubAssign => Some(BinaryOp::Sub),
        AssignmentOp::MulAssign => Some(BinaryOp::Mul),
        AssignmentOp::DivAssign => Some(BinaryOp::Div),
        AssignmentOp::ModAssign => Some(BinaryOp::Mod),
        AssignmentOp::Assign
        | AssignmentOp::AndAssign
        | AssignmentOp::OrAssign
        | AssignmentOp::NullishAssign => None,
    }
}

fn is_simple_target(target: &AssignmentTarget) -> bool {
    matches!(
        target,
        AssignmentTarget::Identifier(_) | AssignmentTarget::Member(_)
    )
}

impl Compiler {
    pub(super) fn compile_assignment_expression(
        &mut self,
        assign: &AssignmentExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        match assign.operator {
            AssignmentOp::Assign => self.compile_simple_assignment(&assign.target, &assign.value, dst),
            AssignmentOp::AndAssign | AssignmentOp::OrAssign | AssignmentOp::NullishAssign => {
                self.compile_logical_assignment(assign, dst)
            }
            op => {
                let operator = compound_operator(op).ok_or_else(|| {
                    JsError::internal_error(format!("{:?} is not a compound operator", op))
                })?;
                self.compile_compound_assignment(assign, operator, dst)
            }
        }
    }

    /// `target = value` whose result lands in `dst`
    fn compile_simple_assignment(
        &mut self,
        target: &AssignmentTarget,
        value: &Expression,
        dst: Register,
    ) -> Result<(), JsError> {
        let init = self.context.take_lexical_binding_init() && target.as_identifier().is_some();
        let flags = self.context.flags().outside_declaration();

        self.with_flags(flags, |c| {
            let slow = has_alias_hazard(target, value);
            debug!(slow, "assignment with result");

            let address = if slow {
                let no_skip = c.context.flags().without_register_skip();
                c.with_flags(no_skip, |c| c.resolve_address(target))?
            } else {
                c.resolve_address(target)?
            };
            c.compile_expression(value, dst)?;

            c.context.set_lexical_binding_init(init);
            c.store(target, &address, dst)?;
            c.context.ensure_lexical_binding_init_cleared()?;
            c.release_address(address)
        })
    }

    /// `target = value` in a position whose value is discarded
    pub(super) fn compile_assignment_result_not_required(
        &mut self,
        target: &AssignmentTarget,
        value: &Expression,
    ) -> Result<(), JsError> {
        let init = self.context.take_lexical_binding_init() && target.as_identifier().is_some();
        let flags = self.context.flags().outside_declaration();
        self.with_flags(flags, |c| c.compile_discarded_assignment(target, value, init))?;
        self.context.ensure_lexical_binding_init_cleared()
    }

    fn compile_discarded_assignment(
        &mut self,
        target: &AssignmentTarget,
        value: &Expression,
        init: bool,
    ) -> Result<(), JsError> {
        if has_alias_hazard(target, value) {
            debug!("assignment target aliases its value; evaluating value first");
            let no_skip = self.context.flags().without_register_skip();
            let (src, address) = self.with_flags(no_skip, |c| {
                let src = c.register_for(value)?;
                let address = c.resolve_address(target)?;
                Ok((src, address))
            })?;
            self.compile_expression(value, src)?;
            return self.finish_store(target, address, src, init);
        }

        if let Some(id) = target.as_identifier()
            && !matches!(
                value.kind(),
                ExpressionKind::RegisterReference | ExpressionKind::Array | ExpressionKind::Object
            )
            && let Some(slot) = self.allocable_local(&id.name, init)
        {
            if init {
                self.context.add_lexically_declared_name(id.name());
            }

            if let Expression::Literal(lit) = value
                && self.config.constant_registers
            {
                let src = self.builder.constant_register(literal_constant(lit))?;
                if is_constant_register(src) {
                    trace!(name = %id.name, slot, src, "literal stored with one move");
                    self.builder.emit(Op::Move { dst: slot, src });
                    return Ok(());
                }
            }

            debug!(name = %id.name, slot, "value evaluated straight into local slot");
            self.builder.registers().push_slot(slot)?;
            self.compile_expression(value, slot)?;
            return self.release(slot);
        }

        let src = self.register_for(value)?;
        let address = self.resolve_address(target)?;
        self.compile_expression(value, src)?;
        self.finish_store(target, address, src, init)
    }

    /// Store `src`, then release the address and `src`
    fn finish_store(
        &mut self,
        target: &AssignmentTarget,
        address: super::compile_pattern::Address,
        src: Register,
        init: bool,
    ) -> Result<(), JsError> {
        self.context.set_lexical_binding_init(init);
        self.store(target, &address, src)?;
        self.context.ensure_lexical_binding_init_cleared()?;
        self.release_address(address)?;
        self.release(src)
    }

    /// `target op= value`
    fn compile_compound_assignment(
        &mut self,
        assign: &AssignmentExpression,
        operator: BinaryOp,
        dst: Register,
    ) -> Result<(), JsError> {
        let target = &assign.target;
        if !is_simple_target(target) {
            return Err(JsError::syntax_error("Invalid left-hand side in assignment"));
        }

        let flags = self.context.flags().outside_declaration();
        self.with_flags(flags, |c| {
            let address = if has_alias_hazard(target, &assign.value) {
                let no_skip = c.context.flags().without_register_skip();
                c.with_flags(no_skip, |c| c.resolve_address(target))?
            } else {
                c.resolve_address(target)?
            };

            c.load_target(target, &address, dst)?;
            let right = c.compile_to_register(&assign.value)?;
            c.builder.emit(binary_op(operator, dst, dst, right));
            c.release(right)?;

            c.store(target, &address, dst)?;
            c.release_address(address)
        })
    }

    /// `target &&= value`, `target ||= value`, `target ??= value`: the store only
    /// happens when the current value does not decide the result.
    fn compile_logical_assignment(
        &mut self,
        assign: &AssignmentExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        let target = &assign.target;
        if !is_simple_target(target) {
            return Err(JsError::syntax_error("Invalid left-hand side in assignment"));
        }

        let flags = self.context.flags().outside_declaration();
        self.with_flags(flags, |c| {
            let address = if has_alias_hazard(target, &assign.value) {
                let no_skip = c.context.flags().without_register_skip();
                c.with_flags(no_skip, |c| c.resolve_address(target))?
            } else {
                c.resolve_address(target)?
            };
            c.load_target(target, &address, dst)?;
            let skip = match assign.operator {
                AssignmentOp::AndAssign => c.builder.emit_jump_if_false(dst),
                AssignmentOp::OrAssign => c.builder.emit_jump_if_true(dst),
                _ => c.builder.emit_jump_if_not_nullish(dst),
            };

            c.compile_expression(&assign.value, dst)?;
            c.store(target, &address, dst)?;
            c.builder.patch_jump(skip)?;
            c.release_address(address)
        })
    }

    /// `++x`, `x--`, `o.p++`: the result is the new value for prefix forms and the
    /// old value converted to a number for postfix forms.
    pub(super) fn compile_update_expression(
        &mut self,
        update: &UpdateExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        let target = update.argument.as_ref();
        if !is_simple_target(target) {
            let position = if update.prefix { "prefix" } else { "postfix" };
            return Err(JsError::syntax_error(format!(
                "Invalid left-hand side expression in {} operation",
                position
            )));
        }

        let step = |dst, src| match update.operator {
            UpdateOp::Increment => Op::Inc { dst, src },
            UpdateOp::Decrement => Op::Dec { dst, src },
        };

        let flags = self.context.flags().outside_declaration();
        self.with_flags(flags, |c| {
            let address = c.resolve_address(target)?;
            c.load_target(target, &address, dst)?;

            if update.prefix {
                c.builder.emit(step(dst, dst));
                c.store(target, &address, dst)?;
            } else {
                c.builder.emit(Op::ToNumber { dst, src: dst });
                let new_value = c.acquire()?;
                c.builder.emit(step(new_value, dst));
                c.store(target, &address, new_value)?;
                c.release(new_value)?;
            }
            c.release_address(address)
        })
    }
}
