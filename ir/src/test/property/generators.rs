//! Generators for property-based testing.
//!
//! Integer expressions are generated as a plain reference tree ([`Term`]) that
//! can be evaluated directly and lowered through the folding constructors, so
//! the two results can be compared.

use std::collections::HashMap;

use proptest::prelude::*;

use tessel_dtype::DType;

use crate::expr::{Expr, ExprKind, Var};
use crate::types::{BinaryOp, ConstValue, UnaryOp};

pub const NUM_VARS: usize = 3;

// ============================================================================
// Reference terms
// ============================================================================

#[derive(Debug, Clone)]
pub enum Term {
    Var(usize),
    Lit(i64),
    Bin(BinaryOp, Box<Term>, Box<Term>),
}

impl Term {
    pub fn eval(&self, env: &[i64]) -> i64 {
        match self {
            Term::Var(i) => env[*i],
            Term::Lit(c) => *c,
            Term::Bin(op, a, b) => apply_int(*op, a.eval(env), b.eval(env)),
        }
    }

    pub fn lower(&self, vars: &[Var]) -> Expr {
        match self {
            Term::Var(i) => vars[*i].expr(),
            Term::Lit(c) => Expr::int(*c),
            Term::Bin(op, a, b) => Expr::binary(*op, a.lower(vars), b.lower(vars)),
        }
    }
}

fn apply_int(op: BinaryOp, a: i64, b: i64) -> i64 {
    match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        _ => unreachable!("not generated: {op:?}"),
    }
}

fn compare(op: BinaryOp, a: i64, b: i64) -> bool {
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        _ => unreachable!("not a comparison: {op:?}"),
    }
}

// ============================================================================
// Evaluation of folded expressions
// ============================================================================

/// Evaluate a folded expression with variables bound by id.
pub fn eval(expr: &Expr, env: &HashMap<u64, i64>) -> ConstValue {
    match expr.kind() {
        ExprKind::Var(v) => ConstValue::Int(env[&v.id()]),
        ExprKind::Const(c) => c.clone(),
        ExprKind::Unary(UnaryOp::Neg, a) => ConstValue::Int(eval(a, env).as_int().unwrap().wrapping_neg()),
        ExprKind::Unary(UnaryOp::Not, a) => ConstValue::Bool(!eval(a, env).as_bool().unwrap()),
        ExprKind::Binary(op, a, b) => {
            let (x, y) = (eval(a, env), eval(b, env));
            if op.is_comparison() {
                ConstValue::Bool(compare(*op, x.as_int().unwrap(), y.as_int().unwrap()))
            } else if op.is_logical() {
                let (x, y) = (x.as_bool().unwrap(), y.as_bool().unwrap());
                ConstValue::Bool(if *op == BinaryOp::And { x && y } else { x || y })
            } else {
                ConstValue::Int(apply_int(*op, x.as_int().unwrap(), y.as_int().unwrap()))
            }
        }
        ExprKind::Cast(a) => eval(a, env),
        other => panic!("unexpected node in integer expression: {other:?}"),
    }
}

pub fn make_vars() -> Vec<Var> {
    (0..NUM_VARS).map(|i| Var::new(format!("v{i}"), DType::S32)).collect()
}

pub fn bind(vars: &[Var], values: &[i64]) -> HashMap<u64, i64> {
    vars.iter().zip(values).map(|(v, x)| (v.id(), *x)).collect()
}

// ============================================================================
// Strategies
// ============================================================================

pub fn arb_arith_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::Min),
        Just(BinaryOp::Max),
    ]
}

pub fn arb_cmp_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Lt),
        Just(BinaryOp::Le),
        Just(BinaryOp::Gt),
        Just(BinaryOp::Ge),
        Just(BinaryOp::Eq),
        Just(BinaryOp::Ne),
    ]
}

/// Small literals, biased towards the identities the folder knows about.
pub fn arb_literal() -> impl Strategy<Value = i64> {
    prop_oneof![Just(0i64), Just(1i64), Just(-1i64), -64i64..=64]
}

pub fn arb_term() -> impl Strategy<Value = Term> {
    let leaf = prop_oneof![(0..NUM_VARS).prop_map(Term::Var), arb_literal().prop_map(Term::Lit)];
    leaf.prop_recursive(4, 32, 2, |inner| {
        (arb_arith_op(), inner.clone(), inner).prop_map(|(op, a, b)| Term::Bin(op, Box::new(a), Box::new(b)))
    })
}

pub fn arb_env() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-1000i64..=1000, NUM_VARS)
}

// ============================================================================
// Statement programs
// ============================================================================

/// One step of a flat builder program.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Declare a fresh variable.
    Declare,
    /// Use the n-th (modulo) variable declared so far.
    Use(usize),
    /// Open a nested scope.
    Open,
    /// Close the innermost nested scope, if any.
    Close,
}

pub fn arb_program() -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        3 => Just(Step::Declare),
        4 => (0usize..16).prop_map(Step::Use),
        1 => Just(Step::Open),
        1 => Just(Step::Close),
    ];
    prop::collection::vec(step, 0..40)
}
