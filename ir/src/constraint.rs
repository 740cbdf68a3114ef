//! Build-time assumptions about runtime values.
//!
//! Constraints are never checked at runtime: a kernel launched with data that
//! violates them has undefined behavior. They let the planner and the
//! simplifier drop dynamic branches whose outcome is already known.

use crate::expr::{Expr, ExprKind, Var};
use crate::types::{BinaryOp, ConstValue};

#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: Vec<Expr>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an assumption. Conjunctions are split into their terms.
    pub fn add(&mut self, expr: Expr) {
        match expr.kind() {
            ExprKind::Binary(BinaryOp::And, a, b) => {
                self.add(a.clone());
                self.add(b.clone());
            }
            ExprKind::Const(ConstValue::Bool(true)) => {}
            _ => {
                if !self.constraints.contains(&expr) {
                    tracing::trace!(constraint = %expr, "assume");
                    self.constraints.push(expr);
                }
            }
        }
    }

    pub fn with(mut self, expr: Expr) -> Self {
        self.add(expr);
        self
    }

    pub fn constraints(&self) -> &[Expr] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Value `var` is pinned to by an `var == c` assumption.
    pub fn single_value(&self, var: &Var) -> Option<Expr> {
        self.constraints.iter().find_map(|c| match c.kind() {
            ExprKind::Binary(BinaryOp::Eq, x, v) if x.as_var() == Some(var) && v.is_const() => Some(v.clone()),
            _ => None,
        })
    }

    /// Replace every pinned variable by its value.
    pub fn substitute_known(&self, expr: &Expr) -> Expr {
        expr.rewrite(&mut |e| e.as_var().and_then(|v| self.single_value(v)))
    }

    /// Whether `expr` holds under the registered assumptions.
    ///
    /// Recognised forms: constants, conjunctions and disjunctions, `x % c == 0`,
    /// integer comparisons of `x + c` against constants, and exact matches.
    pub fn can_prove(&self, expr: &Expr) -> bool {
        let expr = self.substitute_known(expr);
        if let Some(b) = expr.as_bool() {
            return b;
        }
        if self.constraints.contains(&expr) {
            return true;
        }

        let ExprKind::Binary(op, lhs, rhs) = expr.kind() else { return false };
        match op {
            BinaryOp::And => self.can_prove(lhs) && self.can_prove(rhs),
            BinaryOp::Or => self.can_prove(lhs) || self.can_prove(rhs),
            BinaryOp::Eq if rhs.as_int() == Some(0) => match lhs.kind() {
                ExprKind::Binary(BinaryOp::Mod, x, m) => m.as_int().is_some_and(|m| self.is_multiple_of(x, m)),
                _ => self.bounds(lhs) == (Some(0), Some(0)),
            },
            _ if op.is_comparison() => {
                let Some(c) = rhs.as_int() else { return false };
                let (x, off) = lhs.split_offset();
                // x + off OP c  <=>  x OP c - off
                let c = c - off;
                let (lo, hi) = self.bounds(&x);
                match op {
                    BinaryOp::Ge => lo.is_some_and(|lo| lo >= c),
                    BinaryOp::Gt => lo.is_some_and(|lo| lo > c),
                    BinaryOp::Le => hi.is_some_and(|hi| hi <= c),
                    BinaryOp::Lt => hi.is_some_and(|hi| hi < c),
                    BinaryOp::Eq => lo == Some(c) && hi == Some(c),
                    BinaryOp::Ne => lo.is_some_and(|lo| lo > c) || hi.is_some_and(|hi| hi < c),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Whether `expr` is known to be false.
    pub fn can_refute(&self, expr: &Expr) -> bool {
        match expr.kind() {
            ExprKind::Binary(BinaryOp::And, a, b) => self.can_refute(a) || self.can_refute(b),
            ExprKind::Binary(BinaryOp::Or, a, b) => self.can_refute(a) && self.can_refute(b),
            _ => self.can_prove(&!expr.clone()),
        }
    }

    /// `x` is a multiple of `m`.
    fn is_multiple_of(&self, x: &Expr, m: i64) -> bool {
        if m == 0 {
            return false;
        }
        if let Some(v) = x.as_int() {
            return v % m == 0;
        }
        match x.kind() {
            ExprKind::Binary(BinaryOp::Add, a, b) => self.is_multiple_of(a, m) && self.is_multiple_of(b, m),
            ExprKind::Binary(BinaryOp::Mul, a, b) => self.is_multiple_of(a, m) || self.is_multiple_of(b, m),
            _ => self.constraints.iter().any(|c| match c.kind() {
                ExprKind::Binary(BinaryOp::Eq, lhs, zero) if zero.as_int() == Some(0) => match lhs.kind() {
                    ExprKind::Binary(BinaryOp::Mod, y, k) => y == x && k.as_int().is_some_and(|k| k % m == 0),
                    _ => false,
                },
                _ => false,
            }),
        }
    }

    /// Tightest integer bounds on `x` implied by direct assumptions.
    fn bounds(&self, x: &Expr) -> (Option<i64>, Option<i64>) {
        if let Some(v) = x.as_int() {
            return (Some(v), Some(v));
        }
        let mut lo: Option<i64> = None;
        let mut hi: Option<i64> = None;
        let mut lower = |v: i64| lo = Some(lo.map_or(v, |l| l.max(v)));
        let mut upper = |v: i64| hi = Some(hi.map_or(v, |h| h.min(v)));
        for c in &self.constraints {
            let ExprKind::Binary(op, lhs, rhs) = c.kind() else { continue };
            let Some(v) = rhs.as_int() else { continue };
            let (y, off) = lhs.split_offset();
            if &y != x {
                continue;
            }
            let v = v - off;
            match op {
                BinaryOp::Ge => lower(v),
                BinaryOp::Gt => lower(v + 1),
                BinaryOp::Le => upper(v),
                BinaryOp::Lt => upper(v - 1),
                BinaryOp::Eq => {
                    lower(v);
                    upper(v);
                }
                _ => {}
            }
        }
        (lo, hi)
    }
}
