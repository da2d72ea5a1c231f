//! Declarations of a compilation unit
//!
//! `var` names are hoisted to the top of the unit; `let`/`const` names are known up
//! front but stay uninitialized until their declaration is compiled. In function
//! units every declared name gets a local slot, recorded in an [`ObjectStructure`]
//! so the descriptor of a slot answers whether it may be written in place.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use super::Compiler;
use super::bytecode::{Op, Register, VARIABLE_LIMIT, local_register};
use super::identifiers::bound_names;
use crate::ast::{Statement, VariableKind};
use crate::config::CompilerConfig;
use crate::error::JsError;
use crate::property::{PropertyName, StructureDescriptor};
use crate::structure::ObjectStructure;
use crate::value::{CheapClone, JsString};

/// Where a name lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local slot of this unit
    Local(Register),
    /// Global object, outer environment, or nowhere
    Named,
}

#[derive(Debug, Default)]
pub struct Scope {
    locals: ObjectStructure,
    lexical: FxHashMap<JsString, VariableKind>,
    vars: FxHashSet<JsString>,
    hoisted_vars: Vec<JsString>,
}

impl Scope {
    /// Collect the declarations of a unit
    pub fn analyze(statements: &[Statement], config: &CompilerConfig) -> Result<Self, JsError> {
        let mut scope = Scope::default();
        let mut declared: Vec<(JsString, VariableKind)> = Vec::new();

        for stmt in statements {
            let Statement::VariableDeclaration(decl) = stmt else {
                continue;
            };
            for declarator in &decl.declarations {
                for name in bound_names(&declarator.target) {
                    if scope.declare(name, decl.kind)? {
                        declared.push((name.cheap_clone(), decl.kind));
                    }
                }
            }
        }

        if !config.uses_named_bindings() {
            for (name, kind) in declared {
                let descriptor = match kind {
                    VariableKind::Const => StructureDescriptor::plain_data(false, true, false),
                    VariableKind::Let | VariableKind::Var => StructureDescriptor::all_present(),
                };
                let slot = scope.locals.add(PropertyName::Name(name), descriptor);
                if slot >= VARIABLE_LIMIT as usize {
                    return Err(JsError::internal_error(format!(
                        "Too many local variables (max {})",
                        VARIABLE_LIMIT
                    )));
                }
            }
        }

        Ok(scope)
    }

    /// Record one declared name. Returns true when the name is new to the unit.
    fn declare(&mut self, name: &JsString, kind: VariableKind) -> Result<bool, JsError> {
        let conflict = if kind.is_lexical() {
            self.lexical.contains_key(name) || self.vars.contains(name)
        } else {
            self.lexical.contains_key(name)
        };
        if conflict {
            return Err(JsError::syntax_error(format!(
                "Identifier '{}' has already been declared",
                name
            )));
        }

        if kind.is_lexical() {
            self.lexical.insert(name.cheap_clone(), kind);
            return Ok(true);
        }
        if self.vars.insert(name.cheap_clone()) {
            self.hoisted_vars.push(name.cheap_clone());
            return Ok(true);
        }
        Ok(false)
    }

    pub fn resolve(&self, name: &JsString) -> Resolution {
        match self.local(name) {
            Some((r, _)) => Resolution::Local(r),
            None => Resolution::Named,
        }
    }

    /// Register and descriptor of a local slot
    pub fn local(&self, name: &JsString) -> Option<(Register, StructureDescriptor)> {
        let (slot, descriptor) = self
            .locals
            .lookup(&PropertyName::Name(name.cheap_clone()))?;
        Some((local_register(slot)?, *descriptor))
    }

    /// Local slot that a store may target in place: a plain writable, enumerable,
    /// configurable data slot, or any plain data slot during its declaring
    /// initialization.
    pub fn allocable_slot(&self, name: &JsString, init: bool) -> Option<Register> {
        let (r, descriptor) = self.local(name)?;
        let allocable = descriptor.is_data_writable_enumerable_configurable()
            || (init && descriptor.is_plain_data_property());
        allocable.then_some(r)
    }

    pub fn lexical_kind(&self, name: &JsString) -> Option<VariableKind> {
        self.lexical.get(name).copied()
    }

    pub fn hoisted_vars(&self) -> &[JsString] {
        &self.hoisted_vars
    }

    pub fn local_count(&self) -> Result<u16, JsError> {
        u16::try_from(self.locals.len())
            .map_err(|_| JsError::internal_error("too many local variables"))
    }

    pub fn local_names(&self) -> Vec<JsString> {
        self.locals
            .iter()
            .map(|(name, _)| name.to_js_string())
            .collect()
    }
}

/// Outcome of the temporal-dead-zone and constness checks for one access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingCheck {
    Ok,
    /// let/const accessed before its declaration
    Uninitialized,
    /// Write to an initialized const
    ConstAssignment,
}

impl Compiler {
    /// Emit DeclareVar for hoisted vars of a unit whose bindings are named
    pub(super) fn emit_hoisted_declarations(&mut self) -> Result<(), JsError> {
        if !self.context.flags().uses_named_bindings() {
            return Ok(());
        }
        for name in self.scope.hoisted_vars().to_vec() {
            trace!(name = %name, "hoisting var");
            let name_idx = self.builder.add_string(name)?;
            self.builder.emit(Op::DeclareVar { name: name_idx });
        }
        Ok(())
    }

    pub(super) fn check_binding_read(&self, name: &JsString) -> BindingCheck {
        match self.scope.lexical_kind(name) {
            Some(_) if !self.context.is_lexically_declared(name) => BindingCheck::Uninitialized,
            _ => BindingCheck::Ok,
        }
    }

    /// Checks for a store; `init` marks the declaring initialization
    pub(super) fn check_binding_write(&self, name: &JsString, init: bool) -> BindingCheck {
        if init {
            return BindingCheck::Ok;
        }
        match self.scope.lexical_kind(name) {
            None => BindingCheck::Ok,
            Some(_) if !self.context.is_lexically_declared(name) => BindingCheck::Uninitialized,
            Some(VariableKind::Const) => BindingCheck::ConstAssignment,
            Some(_) => BindingCheck::Ok,
        }
    }

    /// Emit the throwing op for a failed check. Returns true when one was emitted.
    pub(super) fn emit_binding_error(
        &mut self,
        check: BindingCheck,
        name: &JsString,
    ) -> Result<bool, JsError> {
        let op = match check {
            BindingCheck::Ok => return Ok(false),
            BindingCheck::Uninitialized => Op::ThrowReferenceError {
                name: self.builder.add_string(name.cheap_clone())?,
            },
            BindingCheck::ConstAssignment => Op::ThrowConstAssignment {
                name: self.builder.add_string(name.cheap_clone())?,
            },
        };
        trace!(name = %name, ?check, "binding check fails statically");
        self.builder.emit(op);
        Ok(true)
    }

    /// Local slot a value may be evaluated straight into: only in units with local
    /// slots, and only when the store would pass its binding checks.
    pub(super) fn allocable_local(&self, name: &JsString, init: bool) -> Option<Register> {
        let flags = self.context.flags();
        if flags.global_scope || flags.eval_code {
            return None;
        }
        if self.check_binding_write(name, init) != BindingCheck::Ok {
            return None;
        }
        self.scope.allocable_slot(name, init)
    }

    /// Local slot that reads may use without a copy
    pub(super) fn readable_local(&self, name: &JsString) -> Option<Register> {
        if self.check_binding_read(name) != BindingCheck::Ok {
            return None;
        }
        match self.scope.resolve(name) {
            Resolution::Local(r) => Some(r),
            Resolution::Named => None,
        }
    }
}
