//! Compiler configuration
//!
//! A [`CompilerConfig`] describes the compilation unit being built. Every field has a
//! default, so a JSON document only needs to name what it changes.

use serde::{Deserialize, Serialize};

use crate::error::JsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Top-level script code: declarations live on the global object and assignments
    /// may create outer bindings.
    pub global_scope: bool,

    /// Direct-eval code. Treated like global code for binding purposes.
    pub eval_code: bool,

    /// Strict mode: rejected writes throw and undeclared assignment is a ReferenceError.
    pub strict: bool,

    /// Address primitive literals through read-only constant registers.
    pub constant_registers: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            global_scope: true,
            eval_code: false,
            strict: false,
            constant_registers: true,
        }
    }
}

impl CompilerConfig {
    /// Configuration for a function body: every declared name gets a local slot.
    pub fn function() -> Self {
        Self {
            global_scope: false,
            ..Self::default()
        }
    }

    /// Configuration for direct-eval code
    pub fn eval() -> Self {
        Self {
            global_scope: false,
            eval_code: true,
            ..Self::default()
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_constant_registers(mut self, enabled: bool) -> Self {
        self.constant_registers = enabled;
        self
    }

    /// Whether declared names are accessed by name rather than through local slots
    pub fn uses_named_bindings(&self) -> bool {
        self.global_scope || self.eval_code
    }

    pub fn from_json(json: &str) -> Result<Self, JsError> {
        serde_json::from_str(json)
            .map_err(|e| JsError::internal_error(format!("invalid compiler config: {}", e)))
    }
}
