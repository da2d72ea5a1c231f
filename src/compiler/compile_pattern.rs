//! Stores to assignment targets
//!
//! A store happens in two steps. [`Compiler::resolve_address`] evaluates whatever
//! the target needs before the value is known (the object and key of a member
//! target) and [`Compiler::store`] writes a value through that address.
//! Destructuring patterns and defaults are compiled as stores.

use tracing::trace;

use super::Compiler;
use super::alias::has_alias_hazard;
use super::bytecode::{Constant, ConstantIndex, Op, Register};
use super::scope::Resolution;
use crate::ast::{
    ArrayPattern, AssignmentTarget, DefaultTarget, Expression, LiteralValue, MemberExpression,
    MemberProperty, ObjectPattern, PropertyKey, VariableKind,
};
use crate::error::JsError;
use crate::value::{CheapClone, JsString};

/// Key of a resolved member target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MemberKey {
    Named(ConstantIndex),
    Computed(Register),
}

/// Registers a target holds between address resolution and the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Address {
    None,
    Member { object: Register, key: MemberKey },
}

impl Compiler {
    /// Evaluate the parts of `target` that precede the value
    pub(super) fn resolve_address(&mut self, target: &AssignmentTarget) -> Result<Address, JsError> {
        match target {
            AssignmentTarget::Member(member) => {
                if self.context.flags().declaration.is_some() {
                    return Err(JsError::syntax_error(
                        "Illegal property in declaration context",
                    ));
                }
                self.resolve_member_address(member)
            }
            AssignmentTarget::Default(default) => self.resolve_address(&default.target),
            AssignmentTarget::Identifier(_)
            | AssignmentTarget::ArrayPattern(_)
            | AssignmentTarget::ObjectPattern(_) => Ok(Address::None),
        }
    }

    fn resolve_member_address(&mut self, member: &MemberExpression) -> Result<Address, JsError> {
        match &member.property {
            MemberProperty::Identifier(id) => {
                let object = self.compile_to_register(&member.object)?;
                let key = self.builder.add_string(id.name.cheap_clone())?;
                Ok(Address::Member {
                    object,
                    key: MemberKey::Named(key),
                })
            }
            MemberProperty::Expression(key_expr) => {
                let flags = self.operand_flags(&member.object, key_expr);
                self.with_flags(flags, |c| {
                    let object = c.compile_to_register(&member.object)?;
                    let key = c.compile_to_register(key_expr)?;
                    Ok(Address::Member {
                        object,
                        key: MemberKey::Computed(key),
                    })
                })
            }
        }
    }

    pub(super) fn release_address(&mut self, address: Address) -> Result<(), JsError> {
        match address {
            Address::None => Ok(()),
            Address::Member { object, key } => {
                if let MemberKey::Computed(key) = key {
                    self.release(key)?;
                }
                self.release(object)
            }
        }
    }

    /// Read the current value of a simple target through its address
    pub(super) fn load_target(
        &mut self,
        target: &AssignmentTarget,
        address: &Address,
        dst: Register,
    ) -> Result<(), JsError> {
        match (target, address) {
            (AssignmentTarget::Identifier(id), _) => self.compile_identifier(&id.name, dst),
            (AssignmentTarget::Member(_), Address::Member { object, key }) => {
                let obj = *object;
                match *key {
                    MemberKey::Named(key) => {
                        self.builder.emit(Op::GetPropertyConst { dst, obj, key });
                    }
                    MemberKey::Computed(key) => {
                        self.builder.emit(Op::GetProperty { dst, obj, key });
                    }
                }
                Ok(())
            }
            _ => Err(JsError::internal_error(
                "target read without a matching address",
            )),
        }
    }

    /// Write `src` to `target`. Does not release `src` or the address.
    pub(super) fn store(
        &mut self,
        target: &AssignmentTarget,
        address: &Address,
        src: Register,
    ) -> Result<(), JsError> {
        match target {
            AssignmentTarget::Identifier(id) => {
                if self
                    .context
                    .flags()
                    .declaration
                    .is_some_and(VariableKind::is_lexical)
                {
                    self.context.set_lexical_binding_init(true);
                }
                self.store_identifier(&id.name, src)
            }
            AssignmentTarget::Member(_) => {
                let Address::Member { object, key } = *address else {
                    return Err(JsError::internal_error(
                        "member target stored without its address",
                    ));
                };
                let strict = self.context.flags().strict;
                match key {
                    MemberKey::Named(key) => self.builder.emit(Op::SetPropertyConst {
                        obj: object,
                        key,
                        value: src,
                        strict,
                    }),
                    MemberKey::Computed(key) => self.builder.emit(Op::SetProperty {
                        obj: object,
                        key,
                        value: src,
                        strict,
                    }),
                };
                Ok(())
            }
            AssignmentTarget::ArrayPattern(pattern) => self.store_array_pattern(pattern, src),
            AssignmentTarget::ObjectPattern(pattern) => self.store_object_pattern(pattern, src),
            AssignmentTarget::Default(default) => self.store_with_default(default, address, src),
        }
    }

    fn store_identifier(&mut self, name: &JsString, src: Register) -> Result<(), JsError> {
        let init = self.context.take_lexical_binding_init();
        let check = self.check_binding_write(name, init);
        if self.emit_binding_error(check, name)? {
            return Ok(());
        }
        if init {
            self.context.add_lexically_declared_name(name.cheap_clone());
        }

        match self.scope.resolve(name) {
            Resolution::Local(slot) => {
                if slot != src {
                    self.builder.emit(Op::Move { dst: slot, src });
                }
            }
            Resolution::Named => {
                let name_idx = self.builder.add_string(name.cheap_clone())?;
                match self.scope.lexical_kind(name) {
                    Some(kind) if init => {
                        self.builder.emit(Op::InitLexical {
                            name: name_idx,
                            src,
                            mutable: kind != VariableKind::Const,
                        });
                    }
                    _ => {
                        self.builder.emit(Op::SetVar {
                            name: name_idx,
                            src,
                            strict: self.context.flags().strict,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Store `src` to the inner target, or the default when `src` is undefined.
    ///
    /// ```text
    ///     StrictEq   cmp, src, undefined
    ///     JumpIfTrue cmp -> use_default
    ///     <store src>
    ///     Jump       -> done
    /// use_default:
    ///     <default into tmp>
    ///     <store tmp>
    /// done:
    /// ```
    fn store_with_default(
        &mut self,
        default: &DefaultTarget,
        address: &Address,
        src: Register,
    ) -> Result<(), JsError> {
        let undefined_literal = Expression::Literal(LiteralValue::Undefined);
        let undefined = self.compile_to_register(&undefined_literal)?;
        let cmp = self.acquire()?;
        self.builder.emit(Op::StrictEq {
            dst: cmp,
            left: src,
            right: undefined,
        });
        let use_default = self.builder.emit_jump_if_true(cmp);
        self.release(cmp)?;
        self.release(undefined)?;

        // The flag is consumed by whichever store runs; both branches need it
        let init = self.context.is_lexical_binding_init();
        let declared = self.context.lexically_declared_len();
        self.store(&default.target, address, src)?;
        let done = self.builder.emit_jump();

        // Names the branch above initialized are still uninitialized in the default
        self.context.truncate_lexically_declared(declared);
        self.builder.patch_jump(use_default)?;
        let value = self.compile_to_register(&default.default)?;
        self.context.set_lexical_binding_init(init);
        self.store(&default.target, address, value)?;
        self.release(value)?;

        self.builder.patch_jump(done)
    }

    fn store_array_pattern(&mut self, pattern: &ArrayPattern, src: Register) -> Result<(), JsError> {
        self.builder.emit(Op::RequireObjectCoercible { src });

        for (index, element) in pattern.elements.iter().enumerate() {
            let Some(target) = element else {
                continue;
            };
            let index = u32::try_from(index)
                .map_err(|_| JsError::internal_error("array pattern too long"))?;
            let value = self.acquire()?;
            let address = self.resolve_address(target)?;
            self.builder.emit(Op::GetIndex {
                dst: value,
                obj: src,
                index,
            });
            self.store(target, &address, value)?;
            self.release_address(address)?;
            self.release(value)?;
        }

        if let Some(rest) = &pattern.rest {
            let start = u32::try_from(pattern.elements.len())
                .map_err(|_| JsError::internal_error("array pattern too long"))?;
            let value = self.acquire()?;
            let address = self.resolve_address(rest)?;
            self.builder.emit(Op::ArrayRest {
                dst: value,
                src,
                start,
            });
            self.store(rest, &address, value)?;
            self.release_address(address)?;
            self.release(value)?;
        }
        Ok(())
    }

    fn store_object_pattern(
        &mut self,
        pattern: &ObjectPattern,
        src: Register,
    ) -> Result<(), JsError> {
        self.builder.emit(Op::RequireObjectCoercible { src });

        // With a rest element, computed keys stay live until the rest copy
        let computed_count = if pattern.rest.is_some() {
            pattern
                .properties
                .iter()
                .filter(|p| matches!(p.key, PropertyKey::Computed(_)))
                .count()
        } else {
            0
        };
        let kept_keys = self.acquire_block(computed_count)?;
        let mut kept = kept_keys.iter().copied();
        let mut excluded: Vec<JsString> = Vec::new();

        for property in &pattern.properties {
            let value = self.acquire()?;
            let mut temporary_key = None;
            let read = match &property.key {
                PropertyKey::Name(name) => {
                    excluded.push(name.cheap_clone());
                    let key = self.builder.add_string(name.cheap_clone())?;
                    Op::GetPropertyConst {
                        dst: value,
                        obj: src,
                        key,
                    }
                }
                PropertyKey::Index(index) => {
                    excluded.push(JsString::from(index.to_string()));
                    Op::GetIndex {
                        dst: value,
                        obj: src,
                        index: *index,
                    }
                }
                PropertyKey::Computed(key_expr) => {
                    let key = match kept.next() {
                        Some(key) => {
                            self.compile_expression(key_expr, key)?;
                            key
                        }
                        None => {
                            // The target is resolved after the key is read
                            let flags = if has_alias_hazard(&property.target, key_expr) {
                                self.context.flags().without_register_skip()
                            } else {
                                self.context.flags()
                            };
                            let key = self.with_flags(flags, |c| c.compile_to_register(key_expr))?;
                            temporary_key = Some(key);
                            key
                        }
                    };
                    Op::GetProperty {
                        dst: value,
                        obj: src,
                        key,
                    }
                }
            };

            let address = self.resolve_address(&property.target)?;
            self.builder.emit(read);
            self.store(&property.target, &address, value)?;
            self.release_address(address)?;
            if let Some(key) = temporary_key {
                self.release(key)?;
            }
            self.release(value)?;
        }

        if let Some(rest) = &pattern.rest {
            trace!(excluded = excluded.len(), "object rest");
            let excluded_idx = self.builder.add_constant(Constant::ExcludedKeys(excluded))?;
            let keys_count = u16::try_from(kept_keys.len())
                .map_err(|_| JsError::internal_error("object pattern too long"))?;
            let value = self.acquire()?;
            let address = self.resolve_address(rest)?;
            self.builder.emit(Op::CopyObjectExcluding {
                dst: value,
                src,
                excluded: excluded_idx,
                keys_start: kept_keys.first().copied().unwrap_or(0),
                keys_count,
            });
            self.store(rest, &address, value)?;
            self.release_address(address)?;
            self.release(value)?;
        }

        self.release_block(&kept_keys)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use crate::ast::AstBuilder;
    use crate::compiler::{Compiler, Op};
    use crate::config::CompilerConfig;

    #[test]
    fn test_default_store_shape() {
        let mut b = AstBuilder::new();
        let a = b.target("a");
        let seven = b.number(7.0);
        let with_default = b.with_default(a, seven);
        let pattern = b.array_pattern(vec![Some(with_default)]);
        let source = b.ident("arr");
        let assign = b.assign(pattern, source);
        let body = vec![b.expr_stmt(assign)];
        let program = b.program(body);
        let chunk = Compiler::compile_program(&program, &CompilerConfig::default()).unwrap();

        let jumps: Vec<usize> = chunk
            .code
            .iter()
            .enumerate()
            .filter(|(_, op)| op.is_jump())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(jumps.len(), 2);

        let (first, second) = (jumps[0], jumps[1]);
        assert!(matches!(chunk.code[first], Op::JumpIfTrue { .. }));
        assert!(matches!(chunk.code[first - 1], Op::StrictEq { .. }));
        assert!(matches!(chunk.code[second], Op::Jump { .. }));
        // Not-undefined branch stores the incoming value
        assert!(matches!(chunk.code[second - 1], Op::SetVar { .. }));
        assert_eq!(chunk.code[first].jump_target(), Some(second as u32 + 1));
        // The default's store is the last instruction before the join
        let join = chunk.code[second].jump_target().unwrap() as usize;
        assert!(matches!(chunk.code[join - 1], Op::SetVar { .. }));
        assert!(matches!(chunk.code[join], Op::Halt));
    }

    #[test]
    fn test_member_in_declaration_pattern_rejected() {
        let mut b = AstBuilder::new();
        let o = b.ident("o");
        let member = b.member_target(o, "x");
        let pattern = b.array_pattern(vec![Some(member)]);
        let init = b.ident("arr");
        let body = vec![b.declare(crate::ast::VariableKind::Let, pattern, Some(init))];
        let program = b.program(body);
        assert!(Compiler::compile_program(&program, &CompilerConfig::default()).is_err());
    }
}
