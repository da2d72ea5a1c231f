//! Tests for the bytecode compiler
//!
//! These tests verify the shape of the bytecode generated for assignments,
//! defaults and short-circuit operators.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use jsreg::ast::{AstBuilder, BinaryOp, Program, VariableKind};
use jsreg::compiler::{
    BytecodeBuilder, BytecodeChunk, Compiler, Constant, Op, RegisterAllocator, is_constant_register,
    is_local_register, is_scratch_register,
};
use jsreg::{CompilerConfig, JsError};

/// Compile a program, panicking on failure
#[allow(clippy::expect_used)]
fn compile(program: &Program, config: &CompilerConfig) -> BytecodeChunk {
    let chunk = Compiler::compile_program(program, config).expect("compile failed");
    (*chunk).clone()
}

/// Helper to check if bytecode contains a specific opcode type
fn contains_op<F: Fn(&Op) -> bool>(chunk: &BytecodeChunk, predicate: F) -> bool {
    chunk.code.iter().any(predicate)
}

fn count_ops<F: Fn(&Op) -> bool>(chunk: &BytecodeChunk, predicate: F) -> usize {
    chunk.code.iter().filter(|op| predicate(op)).count()
}

fn is_generic_store(op: &Op) -> bool {
    matches!(
        op,
        Op::SetVar { .. }
            | Op::InitLexical { .. }
            | Op::SetProperty { .. }
            | Op::SetPropertyConst { .. }
            | Op::GetVar { .. }
    )
}

/// Every jump lands at or after itself and inside the code (or one past its end)
fn assert_jumps_forward(chunk: &BytecodeChunk) {
    for (index, op) in chunk.code.iter().enumerate() {
        if let Some(target) = op.jump_target() {
            let target = target as usize;
            assert!(target >= index, "jump at {} points back to {}", index, target);
            assert!(target <= chunk.code.len(), "jump at {} points past the end", index);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Simple assignment
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_literal_assignment_to_local_is_single_move() {
    // let a; a = 5;
    let mut b = AstBuilder::new();
    let target = b.target("a");
    let five = b.number(5.0);
    let body = vec![b.let_decl("a", None), b.expr_stmt(b.assign(target, five))];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::function());

    let slot = chunk.local_register("a");
    assert_eq!(slot, Some(128));
    assert!(!contains_op(&chunk, is_generic_store), "got {:?}", chunk.code);

    // The second statement is exactly one move from a constant register
    assert!(
        matches!(chunk.code[1], Op::Move { dst: 128, src } if is_constant_register(src)),
        "got {:?}",
        chunk.code
    );
    if let Op::Move { src, .. } = chunk.code[1] {
        assert_eq!(chunk.constant_for_register(src), Some(&Constant::Number(5.0)));
    }
    assert!(matches!(chunk.code.get(2), Some(Op::Halt)));
    assert_eq!(chunk.register_count, 0);
}

#[test]
fn test_literal_assignment_without_constant_registers() {
    let mut b = AstBuilder::new();
    let target = b.target("a");
    let five = b.number(5.0);
    let body = vec![b.let_decl("a", None), b.expr_stmt(b.assign(target, five))];
    let program = b.program(body);
    let config = CompilerConfig::function().with_constant_registers(false);
    let chunk = compile(&program, &config);

    // The value is loaded straight into the slot, still without a generic store
    assert!(!contains_op(&chunk, is_generic_store));
    assert!(contains_op(&chunk, |op| matches!(
        op,
        Op::LoadInt { dst: 128, value: 5 }
    )));
    assert!(!contains_op(&chunk, |op| matches!(op, Op::Move { .. })));
}

#[test]
fn test_self_assignment_with_result_takes_slow_path() {
    // let a = 3; return (a = a);
    let mut b = AstBuilder::new();
    let three = b.number(3.0);
    let target = b.target("a");
    let a = b.ident("a");
    let body = vec![b.let_decl("a", Some(three)), b.ret(b.assign(target, a))];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::function());

    // Value copied out of the slot into a scratch register, then stored back from it
    let code = &chunk.code;
    let load = code
        .iter()
        .position(|op| matches!(op, Op::Move { dst, src: 128 } if is_scratch_register(*dst)));
    let store = code
        .iter()
        .position(|op| matches!(op, Op::Move { dst: 128, src } if is_scratch_register(*src)));
    assert!(load.is_some() && store.is_some(), "got {:?}", code);
    assert!(load < store);
    assert!(matches!(code.last(), Some(Op::Return { src }) if is_scratch_register(*src)));
}

#[test]
fn test_swap_evaluates_value_before_any_store() {
    // let a = 1; let b = 2; [a, b] = [b, a];
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let two = b.number(2.0);
    let ta = b.target("a");
    let tb = b.target("b");
    let pattern = b.array_pattern(vec![Some(ta), Some(tb)]);
    let (vb, va) = (b.ident("b"), b.ident("a"));
    let value = b.array(vec![vb, va]);
    let body = vec![
        b.let_decl("a", Some(one)),
        b.let_decl("b", Some(two)),
        b.expr_stmt(b.assign(pattern, value)),
    ];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::function());

    let create = chunk
        .code
        .iter()
        .position(|op| matches!(op, Op::CreateArray { .. }))
        .unwrap_or(usize::MAX);
    let first_slot_write = chunk
        .code
        .iter()
        .enumerate()
        .skip(2)
        .find(|(_, op)| matches!(op, Op::Move { dst, .. } if is_local_register(*dst)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    assert!(create < first_slot_write, "got {:?}", chunk.code);
}

#[test]
fn test_global_unit_stores_by_name() {
    // a = 5 at top level goes through SetVar, never a local slot
    let mut b = AstBuilder::new();
    let target = b.target("a");
    let five = b.number(5.0);
    let body = vec![b.var_decl("a", None), b.expr_stmt(b.assign(target, five))];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::default());

    assert!(matches!(chunk.code.first(), Some(Op::DeclareVar { .. })));
    assert!(contains_op(&chunk, |op| matches!(op, Op::SetVar { strict: false, .. })));
    assert!(!contains_op(&chunk, |op| matches!(op, Op::Move { dst, .. } if is_local_register(*dst))));
    assert_eq!(chunk.local_count, 0);
}

#[test]
fn test_eval_unit_disables_register_direct_path() {
    let mut b = AstBuilder::new();
    let target = b.target("a");
    let five = b.number(5.0);
    let body = vec![b.expr_stmt(b.assign(target, five))];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::eval().with_strict(true));

    assert!(contains_op(&chunk, |op| matches!(op, Op::SetVar { strict: true, .. })));
}

#[test]
fn test_member_assignment_uses_named_store() {
    let mut b = AstBuilder::new();
    let obj = b.object(vec![]);
    let o = b.ident("o");
    let target = b.member_target(o, "p");
    let one = b.number(1.0);
    let body = vec![b.let_decl("o", Some(obj)), b.expr_stmt(b.assign(target, one))];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::function());

    assert!(contains_op(&chunk, |op| matches!(op, Op::SetPropertyConst { obj: 128, .. })));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Defaults and short-circuit operators
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_default_pattern_patches_both_jumps() {
    // [x = 10] = arr
    let mut b = AstBuilder::new();
    let x = b.target("x");
    let ten = b.number(10.0);
    let pattern = b.array_pattern(vec![Some(b.with_default(x, ten))]);
    let arr = b.ident("arr");
    let body = vec![b.expr_stmt(b.assign(pattern, arr))];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::default());

    assert_eq!(count_ops(&chunk, Op::is_jump), 2);
    assert_eq!(count_ops(&chunk, |op| matches!(op, Op::SetVar { .. })), 2);
    assert!(contains_op(&chunk, |op| matches!(op, Op::StrictEq { .. })));
    assert_jumps_forward(&chunk);
}

#[test]
fn test_short_circuit_operators_jump_past_right_operand() {
    let mut b = AstBuilder::new();
    let (l1, r1) = (b.ident("a"), b.ident("b"));
    let (l2, r2) = (b.ident("a"), b.ident("b"));
    let (l3, r3) = (b.ident("a"), b.ident("b"));
    let body = vec![
        b.expr_stmt(b.and(l1, r1)),
        b.expr_stmt(b.or(l2, r2)),
        b.expr_stmt(b.nullish(l3, r3)),
    ];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::default());

    assert!(contains_op(&chunk, |op| matches!(op, Op::JumpIfFalse { .. })));
    assert!(contains_op(&chunk, |op| matches!(op, Op::JumpIfTrue { .. })));
    assert!(contains_op(&chunk, |op| matches!(op, Op::JumpIfNotNullish { .. })));
    for (index, op) in chunk.code.iter().enumerate() {
        if let Some(target) = op.jump_target() {
            // Each jump skips exactly the GetVar of the right operand
            assert_eq!(target as usize, index + 2, "got {:?}", chunk.code);
        }
    }
}

#[test]
fn test_operand_written_by_sibling_is_copied() {
    // let a = 1; let c = a + (a = 2); the left operand must not be read in place
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let two = b.number(2.0);
    let left = b.ident("a");
    let target = b.target("a");
    let right = b.assign(target, two);
    let sum = b.binary(BinaryOp::Add, left, right);
    let body = vec![b.let_decl("a", Some(one)), b.let_decl("c", Some(sum))];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::function());

    assert!(
        contains_op(&chunk, |op| matches!(
            op,
            Op::Add { dst: 129, left, .. } if is_scratch_register(*left)
        )),
        "got {:?}",
        chunk.code
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// Declarations and early errors
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_const_initialization_then_assignment() {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let two = b.number(2.0);
    let target = b.target("c");
    let body = vec![b.const_decl("c", one), b.expr_stmt(b.assign(target, two))];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::function());

    assert!(contains_op(&chunk, |op| matches!(op, Op::ThrowConstAssignment { .. })));
    assert_eq!(chunk.lexically_declared.len(), 1);
}

#[test]
fn test_write_before_let_throws_on_every_path() {
    // x = 1; let x = 2; in both kinds of unit
    for config in [CompilerConfig::function(), CompilerConfig::default()] {
        let mut b = AstBuilder::new();
        let target = b.target("x");
        let one = b.number(1.0);
        let two = b.number(2.0);
        let body = vec![b.expr_stmt(b.assign(target, one)), b.let_decl("x", Some(two))];
        let program = b.program(body);
        let chunk = compile(&program, &config);
        assert!(
            contains_op(&chunk, |op| matches!(op, Op::ThrowReferenceError { .. })),
            "{:?}: {:?}",
            config,
            chunk.code
        );
    }
}

#[test]
fn test_redeclaration_is_syntax_error() {
    let mut b = AstBuilder::new();
    let body = vec![b.let_decl("x", None), b.var_decl("x", None)];
    let program = b.program(body);
    let err = Compiler::compile_program(&program, &CompilerConfig::function()).unwrap_err();
    assert!(matches!(err, JsError::SyntaxError { .. }));
}

#[test]
fn test_destructuring_declaration_requires_initializer() {
    let mut b = AstBuilder::new();
    let x = b.target("x");
    let pattern = b.array_pattern(vec![Some(x)]);
    let body = vec![b.declare(VariableKind::Let, pattern, None)];
    let program = b.program(body);
    let err = Compiler::compile_program(&program, &CompilerConfig::default()).unwrap_err();
    assert!(matches!(err, JsError::SyntaxError { .. }));
}

#[test]
fn test_update_of_pattern_is_syntax_error() {
    let mut b = AstBuilder::new();
    let x = b.target("x");
    let pattern = b.array_pattern(vec![Some(x)]);
    let body = vec![b.expr_stmt(b.update(jsreg::ast::UpdateOp::Increment, true, pattern))];
    let program = b.program(body);
    let err = Compiler::compile_program(&program, &CompilerConfig::default()).unwrap_err();
    assert!(matches!(err, JsError::SyntaxError { .. }));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Allocator and builder invariants
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_out_of_order_release_is_internal_error() {
    let mut regs = RegisterAllocator::new();
    let r0 = regs.acquire().unwrap();
    let _r1 = regs.acquire().unwrap();
    let err = regs.release(r0).unwrap_err();
    assert!(err.is_internal());
}

#[test]
fn test_double_patch_is_internal_error() {
    let mut builder = BytecodeBuilder::new();
    let jump = builder.emit_jump();
    builder.patch_jump(jump).unwrap();
    assert!(builder.patch_jump(jump).unwrap_err().is_internal());
}

#[test]
fn test_every_unit_leaves_no_pending_jumps() {
    let mut b = AstBuilder::new();
    let (a, c) = (b.ident("a"), b.ident("c"));
    let cond = b.conditional(a, b.number(1.0), b.number(2.0));
    let x = b.target("x");
    let y = b.target("y");
    let pattern = b.array_pattern(vec![Some(b.with_default(x, cond)), Some(b.with_default(y, c))]);
    let source = b.ident("src");
    let body = vec![b.expr_stmt(b.assign(pattern, source))];
    let program = b.program(body);

    // finish() rejects unpatched jumps, so a successful compile is the check
    let chunk = compile(&program, &CompilerConfig::default());
    assert_jumps_forward(&chunk);
    assert_eq!(count_ops(&chunk, Op::is_jump), 6);
}

#[test]
fn test_binary_result_register_count() {
    let mut b = AstBuilder::new();
    let (x, y) = (b.ident("x"), b.ident("y"));
    let sum = b.binary(BinaryOp::Add, x, y);
    let body = vec![b.ret(sum)];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::default());
    assert_eq!(chunk.register_count, 3);
}

#[test]
fn test_chunk_json_dump() {
    let mut b = AstBuilder::new();
    let hello = b.string("hello");
    let body = vec![b.ret(hello)];
    let program = b.program(body);
    let chunk = compile(&program, &CompilerConfig::default());
    let json = chunk.to_json().unwrap();
    assert!(json.contains("Return"));
    assert!(json.contains("hello"));
}

#[test]
fn test_config_from_json() {
    let config = CompilerConfig::from_json(r#"{"global_scope": false, "strict": true}"#).unwrap();
    assert!(!config.global_scope);
    assert!(config.strict);
    assert!(config.constant_registers);
    assert!(CompilerConfig::from_json(r#"{"strict": 1}"#).is_err());
}
