//! Register-machine bytecode compiler for JavaScript assignments
//!
//! Compiles simple, compound and destructuring assignments, default-value
//! patterns and the short-circuit operators `&&`, `||` and `??` to register
//! bytecode, and runs the result on a small VM built around a property-structure
//! object model.
//!
//! # Example
//!
//! ```
//! use jsreg::ast::{AstBuilder, BinaryOp};
//! use jsreg::{CompilerConfig, Interpreter, JsValue};
//!
//! let mut b = AstBuilder::new();
//! let one = b.number(1.0);
//! let x = b.ident("x");
//! let sum = b.binary(BinaryOp::Add, x, b.number(2.0));
//! let body = vec![b.let_decl("x", Some(one)), b.ret(sum)];
//! let program = b.program(body);
//!
//! let mut interp = Interpreter::new();
//! let result = interp.eval(&program, &CompilerConfig::function()).unwrap();
//! assert_eq!(result, JsValue::Number(3.0));
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod object;
pub mod property;
pub mod string_dict;
pub mod structure;
pub mod value;

pub use compiler::{BytecodeChunk, Compiler, Op};
pub use config::CompilerConfig;
pub use error::JsError;
pub use interpreter::Interpreter;
pub use value::CheapClone;
pub use value::JsString;
pub use value::JsValue;
pub use value::ObjectId;

use std::rc::Rc;

/// Compile a program into a bytecode chunk
pub fn compile(program: &ast::Program, config: &CompilerConfig) -> Result<Rc<BytecodeChunk>, JsError> {
    Compiler::compile_program(program, config)
}
