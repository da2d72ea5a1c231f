//! Statement compilation

use tracing::trace;

use super::Compiler;
use super::alias::has_alias_hazard;
use super::bytecode::Op;
use crate::ast::{
    AssignmentTarget, Expression, LiteralValue, Statement, VariableDeclaration,
    VariableDeclarator, VariableKind,
};
use crate::error::JsError;

impl Compiler {
    /// Compile a sequence of statements
    pub(super) fn compile_statements(&mut self, statements: &[Statement]) -> Result<(), JsError> {
        for stmt in statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// Compile a single statement
    pub fn compile_statement(&mut self, stmt: &Statement) -> Result<(), JsError> {
        match stmt {
            Statement::Expression(expr) => self.compile_expression_result_not_required(expr)?,
            Statement::VariableDeclaration(decl) => self.compile_variable_declaration(decl)?,
            Statement::Return(expr) => {
                let src = self.compile_to_register(expr)?;
                self.builder.emit(Op::Return { src });
                self.release(src)?;
            }
        }

        self.context.ensure_lexical_binding_init_cleared()?;
        if let Some(r) = self.builder.registers().peek() {
            return Err(JsError::internal_error(format!(
                "register {} still held after statement",
                r
            )));
        }
        Ok(())
    }

    fn compile_variable_declaration(&mut self, decl: &VariableDeclaration) -> Result<(), JsError> {
        let flags = self.context.flags().in_declaration(decl.kind);
        self.with_flags(flags, |c| {
            for declarator in &decl.declarations {
                c.compile_declarator(decl.kind, declarator)?;
            }
            Ok(())
        })
    }

    fn compile_declarator(
        &mut self,
        kind: VariableKind,
        declarator: &VariableDeclarator,
    ) -> Result<(), JsError> {
        let target = &declarator.target;
        match (target, &declarator.init) {
            (AssignmentTarget::Identifier(_), Some(init)) => {
                self.context.set_lexical_binding_init(kind.is_lexical());
                self.compile_assignment_result_not_required(target, init)
            }
            (AssignmentTarget::Identifier(id), None) => match kind {
                VariableKind::Var => Ok(()),
                VariableKind::Const => Err(JsError::syntax_error(
                    "Missing initializer in const declaration",
                )),
                VariableKind::Let => {
                    trace!(name = %id.name, "let without initializer");
                    let undefined = Expression::Literal(LiteralValue::Undefined);
                    self.context.set_lexical_binding_init(true);
                    self.compile_assignment_result_not_required(target, &undefined)
                }
            },
            (_, Some(init)) => self.compile_pattern_declaration(target, init),
            (_, None) => Err(JsError::syntax_error(
                "Missing initializer in destructuring declaration",
            )),
        }
    }

    /// `let [a, b] = init`: the pattern stores run with the declaration flags set,
    /// so each bound name is initialized by its own store.
    fn compile_pattern_declaration(
        &mut self,
        target: &AssignmentTarget,
        init: &Expression,
    ) -> Result<(), JsError> {
        let src = if has_alias_hazard(target, init) {
            let no_skip = self.context.flags().without_register_skip();
            self.with_flags(no_skip, |c| c.register_for(init))?
        } else {
            self.register_for(init)?
        };
        self.compile_expression(init, src)?;

        let address = self.resolve_address(target)?;
        self.store(target, &address, src)?;
        self.release_address(address)?;
        self.release(src)
    }
}
