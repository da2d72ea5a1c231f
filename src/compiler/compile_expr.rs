//! Expression compilation
//!
//! Compiles AST expressions to bytecode instructions. Every expression is compiled
//! into a destination register chosen by the caller; [`Compiler::register_for`]
//! picks that register, reusing a local slot or constant register in place when
//! the context allows it.

use tracing::{debug, trace};

use super::Compiler;
use super::alias::can_use_direct_register;
use super::bytecode::{
    Constant, ConstantIndex, Op, Register, is_constant_register, is_scratch_register,
};
use super::context::ContextFlags;
use super::scope::{BindingCheck, Resolution};
use crate::ast::{
    ArrayExpression, AssignmentOp, BinaryExpression, BinaryOp, CallExpression, ConditionalExpression,
    Expression, LiteralValue, LogicalExpression, LogicalOp, MemberExpression, MemberProperty,
    ObjectExpression, PropertyKey, UnaryExpression, UnaryOp,
};
use crate::error::JsError;
use crate::value::{CheapClone, JsString};

pub(super) fn literal_constant(lit: &LiteralValue) -> Constant {
    match lit {
        LiteralValue::Undefined => Constant::Undefined,
        LiteralValue::Null => Constant::Null,
        LiteralValue::Boolean(b) => Constant::Boolean(*b),
        LiteralValue::Number(n) => Constant::Number(*n),
        LiteralValue::String(s) => Constant::String(s.cheap_clone()),
    }
}

pub(super) fn binary_op(operator: BinaryOp, dst: Register, left: Register, right: Register) -> Op {
    match operator {
        BinaryOp::Add => Op::Add { dst, left, right },
        BinaryOp::Sub => Op::Sub { dst, left, right },
        BinaryOp::Mul => Op::Mul { dst, left, right },
        BinaryOp::Div => Op::Div { dst, left, right },
        BinaryOp::Mod => Op::Mod { dst, left, right },
        BinaryOp::Eq => Op::Eq { dst, left, right },
        BinaryOp::NotEq => Op::NotEq { dst, left, right },
        BinaryOp::StrictEq => Op::StrictEq { dst, left, right },
        BinaryOp::StrictNotEq => Op::StrictNotEq { dst, left, right },
        BinaryOp::Lt => Op::Lt { dst, left, right },
        BinaryOp::LtEq => Op::LtEq { dst, left, right },
        BinaryOp::Gt => Op::Gt { dst, left, right },
        BinaryOp::GtEq => Op::GtEq { dst, left, right },
    }
}

impl Compiler {
    /// Compile an expression, placing result in the specified destination register
    pub fn compile_expression(&mut self, expr: &Expression, dst: Register) -> Result<(), JsError> {
        // Nested expressions never initialize the declaration being compiled
        let flags = self.context.flags();
        if flags.declaration.is_some() {
            return self.with_flags(flags.outside_declaration(), |c| {
                c.compile_expression(expr, dst)
            });
        }

        if is_constant_register(dst) && !matches!(expr, Expression::Literal(_)) {
            return Err(JsError::internal_error(format!(
                "constant register {} used as a destination",
                dst
            )));
        }

        match expr {
            Expression::Literal(lit) => self.compile_literal(lit, dst),
            Expression::Identifier(id) => self.compile_identifier(&id.name, dst),
            Expression::Member(member) => self.compile_member_expression(member, dst),
            Expression::Array(array) => self.compile_array_expression(array, dst),
            Expression::Object(object) => self.compile_object_expression(object, dst),
            Expression::Unary(unary) => self.compile_unary_expression(unary, dst),
            Expression::Binary(binary) => self.compile_binary_expression(binary, dst),
            Expression::Logical(logical) => self.compile_logical_expression(logical, dst),
            Expression::Conditional(cond) => self.compile_conditional_expression(cond, dst),
            Expression::Assignment(assign) => self.compile_assignment_expression(assign, dst),
            Expression::Update(update) => self.compile_update_expression(update, dst),
            Expression::Sequence(exprs) => self.compile_sequence_expression(exprs, dst),
            Expression::Call(call) => self.compile_call_expression(call, dst),
            Expression::RegisterReference(src) => {
                if *src != dst {
                    self.builder.emit(Op::Move { dst, src: *src });
                }
                Ok(())
            }
        }
    }

    /// Compile an expression whose value is discarded
    pub fn compile_expression_result_not_required(
        &mut self,
        expr: &Expression,
    ) -> Result<(), JsError> {
        match expr {
            Expression::Assignment(assign)
                if assign.operator == AssignmentOp::Assign =>
            {
                self.compile_assignment_result_not_required(&assign.target, &assign.value)
            }
            Expression::Sequence(exprs) => {
                for expr in exprs {
                    self.compile_expression_result_not_required(expr)?;
                }
                Ok(())
            }
            _ => {
                let r = self.compile_to_register(expr)?;
                self.release(r)
            }
        }
    }

    /// Pick the register `expr` will be evaluated into and push it on the register
    /// stack. Literals map to their constant register and readable locals to their
    /// slot; anything else gets a fresh scratch register.
    pub(super) fn register_for(&mut self, expr: &Expression) -> Result<Register, JsError> {
        let direct = match expr {
            Expression::Literal(lit) if self.config.constant_registers => {
                Some(self.builder.constant_register(literal_constant(lit))?)
            }
            Expression::Identifier(id) if self.context.flags().can_skip_copy_to_register => {
                self.readable_local(&id.name)
            }
            Expression::RegisterReference(r) if !is_scratch_register(*r) => Some(*r),
            _ => None,
        };

        match direct {
            Some(r) => {
                trace!(register = r, "using register in place");
                self.builder.registers().push_slot(r)?;
                Ok(r)
            }
            None => self.acquire(),
        }
    }

    /// Compile `expr` into the register [`register_for`](Self::register_for) picks.
    /// The caller releases it.
    pub(super) fn compile_to_register(&mut self, expr: &Expression) -> Result<Register, JsError> {
        let r = self.register_for(expr)?;
        self.compile_expression(expr, r)?;
        Ok(r)
    }

    /// Flags for compiling two operands: in-place local reads are turned off when
    /// one operand writes a name the other one reads.
    pub(super) fn operand_flags(&self, left: &Expression, right: &Expression) -> ContextFlags {
        let flags = self.context.flags();
        if flags.can_skip_copy_to_register && !can_use_direct_register(left, right) {
            debug!("operands alias; copying locals to scratch registers");
            return flags.without_register_skip();
        }
        flags
    }

    fn compile_literal(&mut self, lit: &LiteralValue, dst: Register) -> Result<(), JsError> {
        if is_constant_register(dst) {
            // register_for already placed the value
            let expected = self.builder.constant_register(literal_constant(lit))?;
            if expected != dst {
                return Err(JsError::internal_error(format!(
                    "literal compiled into unrelated constant register {}",
                    dst
                )));
            }
            return Ok(());
        }

        match lit {
            LiteralValue::Undefined => {
                self.builder.emit(Op::LoadUndefined { dst });
            }
            LiteralValue::Null => {
                self.builder.emit(Op::LoadNull { dst });
            }
            LiteralValue::Boolean(value) => {
                self.builder.emit(Op::LoadBool { dst, value: *value });
            }
            LiteralValue::Number(n) => self.builder.emit_load_number(dst, *n)?,
            LiteralValue::String(s) => self.builder.emit_load_string(dst, s.cheap_clone())?,
        }
        Ok(())
    }

    pub(super) fn compile_identifier(
        &mut self,
        name: &JsString,
        dst: Register,
    ) -> Result<(), JsError> {
        let check = self.check_binding_read(name);
        if self.emit_binding_error(check, name)? {
            return Ok(());
        }

        match self.scope.resolve(name) {
            Resolution::Local(slot) => {
                if slot != dst {
                    self.builder.emit(Op::Move { dst, src: slot });
                }
            }
            Resolution::Named => {
                let name = self.builder.add_string(name.cheap_clone())?;
                self.builder.emit(Op::GetVar { dst, name });
            }
        }
        Ok(())
    }

    fn compile_member_expression(
        &mut self,
        member: &MemberExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        match &member.property {
            MemberProperty::Identifier(id) => {
                let obj = self.compile_to_register(&member.object)?;
                let key = self.builder.add_string(id.name.cheap_clone())?;
                self.builder.emit(Op::GetPropertyConst { dst, obj, key });
                self.release(obj)
            }
            MemberProperty::Expression(key_expr) => {
                let flags = self.operand_flags(&member.object, key_expr);
                self.with_flags(flags, |c| {
                    let obj = c.compile_to_register(&member.object)?;
                    let key = c.compile_to_register(key_expr)?;
                    c.builder.emit(Op::GetProperty { dst, obj, key });
                    c.release(key)?;
                    c.release(obj)
                })
            }
        }
    }

    fn compile_array_expression(
        &mut self,
        array: &ArrayExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        let count = u16::try_from(array.elements.len())
            .map_err(|_| JsError::internal_error("array literal has too many elements"))?;
        let elements = self.acquire_block(array.elements.len())?;
        for (element, &r) in array.elements.iter().zip(&elements) {
            self.compile_expression(element, r)?;
        }
        let start = elements.first().copied().unwrap_or(0);
        self.builder.emit(Op::CreateArray { dst, start, count });
        self.release_block(&elements)
    }

    fn compile_object_expression(
        &mut self,
        object: &ObjectExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        self.builder.emit(Op::CreateObject { dst });

        for property in &object.properties {
            match &property.key {
                PropertyKey::Name(name) => {
                    let key = self.builder.add_string(name.cheap_clone())?;
                    self.compile_const_key_property(dst, key, &property.value)?;
                }
                PropertyKey::Index(index) => {
                    let key = self.builder.add_string(JsString::from(index.to_string()))?;
                    self.compile_const_key_property(dst, key, &property.value)?;
                }
                PropertyKey::Computed(key_expr) => {
                    let flags = self.operand_flags(key_expr, &property.value);
                    self.with_flags(flags, |c| {
                        let key = c.compile_to_register(key_expr)?;
                        let value = c.compile_to_register(&property.value)?;
                        c.builder.emit(Op::DefineProperty {
                            obj: dst,
                            key,
                            value,
                        });
                        c.release(value)?;
                        c.release(key)
                    })?;
                }
            }
        }
        Ok(())
    }

    fn compile_const_key_property(
        &mut self,
        obj: Register,
        key: ConstantIndex,
        value_expr: &Expression,
    ) -> Result<(), JsError> {
        let value = self.compile_to_register(value_expr)?;
        self.builder
            .emit(Op::DefinePropertyConst { obj, key, value });
        self.release(value)
    }

    fn compile_unary_expression(
        &mut self,
        unary: &UnaryExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        // typeof of an unresolvable name is "undefined" rather than a ReferenceError
        if unary.operator == UnaryOp::Typeof
            && let Expression::Identifier(id) = unary.argument.as_ref()
            && self.scope.resolve(&id.name) == Resolution::Named
            && self.check_binding_read(&id.name) == BindingCheck::Ok
        {
            let name = self.builder.add_string(id.name.cheap_clone())?;
            self.builder.emit(Op::TypeofVar { dst, name });
            return Ok(());
        }

        let src = self.compile_to_register(&unary.argument)?;
        match unary.operator {
            UnaryOp::Minus => {
                self.builder.emit(Op::Neg { dst, src });
            }
            UnaryOp::Plus => {
                self.builder.emit(Op::ToNumber { dst, src });
            }
            UnaryOp::Not => {
                self.builder.emit(Op::Not { dst, src });
            }
            UnaryOp::Typeof => {
                self.builder.emit(Op::Typeof { dst, src });
            }
            UnaryOp::Void => {
                self.builder.emit(Op::LoadUndefined { dst });
            }
        }
        self.release(src)
    }

    fn compile_binary_expression(
        &mut self,
        binary: &BinaryExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        let flags = self.operand_flags(&binary.left, &binary.right);
        self.with_flags(flags, |c| {
            let left = c.compile_to_register(&binary.left)?;
            let right = c.compile_to_register(&binary.right)?;
            c.builder.emit(binary_op(binary.operator, dst, left, right));
            c.release(right)?;
            c.release(left)
        })
    }

    /// `a && b`, `a || b`, `a ?? b`: the left value lands in `dst`; one forward jump
    /// skips the right operand when it decides the result.
    fn compile_logical_expression(
        &mut self,
        logical: &LogicalExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        let flags = self.operand_flags(&logical.left, &logical.right);
        self.with_flags(flags, |c| {
            c.compile_expression(&logical.left, dst)?;
            let skip_right = match logical.operator {
                LogicalOp::And => c.builder.emit_jump_if_false(dst),
                LogicalOp::Or => c.builder.emit_jump_if_true(dst),
                LogicalOp::NullishCoalescing => c.builder.emit_jump_if_not_nullish(dst),
            };
            c.compile_expression(&logical.right, dst)?;
            c.builder.patch_jump(skip_right)
        })
    }

    fn compile_conditional_expression(
        &mut self,
        cond: &ConditionalExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        let test = self.compile_to_register(&cond.test)?;
        let to_alternate = self.builder.emit_jump_if_false(test);
        self.release(test)?;

        self.compile_expression(&cond.consequent, dst)?;
        let to_end = self.builder.emit_jump();

        self.builder.patch_jump(to_alternate)?;
        self.compile_expression(&cond.alternate, dst)?;
        self.builder.patch_jump(to_end)
    }

    fn compile_sequence_expression(
        &mut self,
        exprs: &[Expression],
        dst: Register,
    ) -> Result<(), JsError> {
        let Some((last, init)) = exprs.split_last() else {
            self.builder.emit(Op::LoadUndefined { dst });
            return Ok(());
        };
        for expr in init {
            self.compile_expression_result_not_required(expr)?;
        }
        self.compile_expression(last, dst)
    }

    fn compile_call_expression(
        &mut self,
        call: &CallExpression,
        dst: Register,
    ) -> Result<(), JsError> {
        let argc = u16::try_from(call.arguments.len())
            .map_err(|_| JsError::internal_error("call has too many arguments"))?;

        let mut flags = self.context.flags();
        if flags.can_skip_copy_to_register
            && !call
                .arguments
                .iter()
                .all(|arg| can_use_direct_register(&call.callee, arg))
        {
            debug!("callee aliases an argument; copying locals to scratch registers");
            flags = flags.without_register_skip();
        }

        self.with_flags(flags, |c| {
            let callee = c.compile_to_register(&call.callee)?;
            let args = c.acquire_block(call.arguments.len())?;
            for (arg, &r) in call.arguments.iter().zip(&args) {
                c.compile_expression(arg, r)?;
            }
            let args_start = args.first().copied().unwrap_or(0);
            c.builder.emit(Op::Call {
                dst,
                callee,
                args_start,
                argc,
            });
            c.release_block(&args)?;
            c.release(callee)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::ast::{AstBuilder, BinaryOp};
    use crate::compiler::{Compiler, Op};
    use crate::config::CompilerConfig;

    #[test]
    fn test_literal_in_place_needs_no_load() {
        let mut b = AstBuilder::new();
        let value = b.number(1000.0);
        let body = vec![b.ret(value)];
        let program = b.program(body);
        let chunk = Compiler::compile_program(&program, &CompilerConfig::function()).unwrap();
        assert!(matches!(chunk.code.as_slice(), [Op::Return { src }] if *src >= 384));
    }

    #[test]
    fn test_and_patches_one_jump_past_right_operand() {
        let mut b = AstBuilder::new();
        let (x, y) = (b.ident("x"), b.ident("y"));
        let value = b.and(x, y);
        let body = vec![b.ret(value)];
        let program = b.program(body);
        let chunk = Compiler::compile_program(&program, &CompilerConfig::default()).unwrap();

        let jumps: Vec<_> = chunk.code.iter().filter(|op| op.is_jump()).collect();
        assert_eq!(jumps.len(), 1);
        assert!(matches!(
            chunk.code.as_slice(),
            [
                Op::GetVar { dst: 0, .. },
                Op::JumpIfFalse { cond: 0, target: 3 },
                Op::GetVar { dst: 0, .. },
                Op::Return { src: 0 },
            ]
        ));
    }

    #[test]
    fn test_binary_reads_locals_in_place() {
        let mut b = AstBuilder::new();
        let one = b.number(1.0);
        let two = b.number(2.0);
        let (x, y) = (b.ident("x"), b.ident("y"));
        let sum = b.binary(BinaryOp::Add, x, y);
        let body = vec![
            b.let_decl("x", Some(one)),
            b.let_decl("y", Some(two)),
            b.ret(sum),
        ];
        let program = b.program(body);
        let chunk = Compiler::compile_program(&program, &CompilerConfig::function()).unwrap();
        assert!(chunk.code.contains(&Op::Add {
            dst: 0,
            left: 128,
            right: 129
        }));
    }
}
