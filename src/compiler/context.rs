//! Per-unit compilation state
//!
//! Flags that nested compilation temporarily changes live in [`ContextFlags`] and are
//! only changed through [`Compiler::with_flags`](super::Compiler::with_flags), which
//! restores the parent's flags on every exit path.

use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;

use crate::ast::VariableKind;
use crate::config::CompilerConfig;
use crate::error::JsError;
use crate::value::JsString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextFlags {
    /// Unit is top-level script code
    pub global_scope: bool,

    /// Unit is direct-eval code
    pub eval_code: bool,

    pub strict: bool,

    /// A local variable may be used in place without copying it to a scratch register
    pub can_skip_copy_to_register: bool,

    /// Identifier stores are the declaring initialization of this declaration kind
    pub declaration: Option<VariableKind>,
}

impl ContextFlags {
    pub fn without_register_skip(self) -> Self {
        Self {
            can_skip_copy_to_register: false,
            ..self
        }
    }

    pub fn outside_declaration(self) -> Self {
        Self {
            declaration: None,
            ..self
        }
    }

    pub fn in_declaration(self, kind: VariableKind) -> Self {
        Self {
            declaration: Some(kind),
            ..self
        }
    }

    /// Whether a store may create or reach bindings outside this unit
    pub fn uses_named_bindings(&self) -> bool {
        self.global_scope || self.eval_code
    }
}

#[derive(Debug)]
pub struct CompileContext {
    flags: ContextFlags,

    /// Set for exactly one identifier store: the declaring initialization of a let/const
    lexical_binding_init: bool,

    lexically_declared: IndexSet<JsString, FxBuildHasher>,
}

impl CompileContext {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            flags: ContextFlags {
                global_scope: config.global_scope,
                eval_code: config.eval_code,
                strict: config.strict,
                can_skip_copy_to_register: true,
                declaration: None,
            },
            lexical_binding_init: false,
            lexically_declared: IndexSet::default(),
        }
    }

    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    /// Install `flags`, returning the previous ones
    pub(super) fn replace_flags(&mut self, flags: ContextFlags) -> ContextFlags {
        std::mem::replace(&mut self.flags, flags)
    }

    pub fn set_lexical_binding_init(&mut self, init: bool) {
        self.lexical_binding_init = init;
    }

    /// Read and clear the declaring-initialization flag
    pub fn take_lexical_binding_init(&mut self) -> bool {
        std::mem::take(&mut self.lexical_binding_init)
    }

    pub fn is_lexical_binding_init(&self) -> bool {
        self.lexical_binding_init
    }

    /// The flag must never survive the store it was set for
    pub fn ensure_lexical_binding_init_cleared(&self) -> Result<(), JsError> {
        if self.lexical_binding_init {
            return Err(JsError::internal_error(
                "lexical binding initialization left pending after its store",
            ));
        }
        Ok(())
    }

    /// Idempotent
    pub fn add_lexically_declared_name(&mut self, name: JsString) {
        self.lexically_declared.insert(name);
    }

    pub fn is_lexically_declared(&self, name: &JsString) -> bool {
        self.lexically_declared.contains(name)
    }

    pub fn lexically_declared_names(&self) -> impl Iterator<Item = &JsString> {
        self.lexically_declared.iter()
    }

    /// Number of names declared so far, for [`truncate_lexically_declared`](Self::truncate_lexically_declared)
    pub fn lexically_declared_len(&self) -> usize {
        self.lexically_declared.len()
    }

    /// Forget the names declared after the set had `len` entries
    pub fn truncate_lexically_declared(&mut self, len: usize) {
        self.lexically_declared.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_clears_flag() {
        let mut ctx = CompileContext::new(&CompilerConfig::function());
        ctx.set_lexical_binding_init(true);
        assert!(ctx.ensure_lexical_binding_init_cleared().is_err());
        assert!(ctx.take_lexical_binding_init());
        assert!(!ctx.take_lexical_binding_init());
        assert!(ctx.ensure_lexical_binding_init_cleared().is_ok());
    }

    #[test]
    fn test_lexically_declared_is_ordered_set() {
        let mut ctx = CompileContext::new(&CompilerConfig::default());
        ctx.add_lexically_declared_name(JsString::from("b"));
        ctx.add_lexically_declared_name(JsString::from("a"));
        ctx.add_lexically_declared_name(JsString::from("b"));
        let names: Vec<&str> = ctx.lexically_declared_names().map(|n| n.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn test_flag_helpers() {
        let ctx = CompileContext::new(&CompilerConfig::function());
        let flags = ctx.flags();
        assert!(flags.can_skip_copy_to_register);
        assert!(!flags.without_register_skip().can_skip_copy_to_register);
        assert_eq!(
            flags.in_declaration(VariableKind::Let).outside_declaration(),
            flags
        );
    }
}
