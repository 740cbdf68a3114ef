//! Read-only traversal helpers.

use crate::expr::{Expr, ExprKind, Var};
use crate::stmt::Stmt;

/// Pre-order walk over a statement tree.
pub fn walk<'a>(stmt: &'a Stmt, f: &mut impl FnMut(&'a Stmt)) {
    f(stmt);
    for child in stmt.children() {
        walk(child, f);
    }
}

/// Number of statements in the tree matching `pred`.
pub fn count(stmt: &Stmt, mut pred: impl FnMut(&Stmt) -> bool) -> usize {
    let mut n = 0;
    walk(stmt, &mut |s| {
        if pred(s) {
            n += 1;
        }
    });
    n
}

/// Call `f` for every variable referenced by `expr`.
pub fn for_each_var<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Var)) {
    if let ExprKind::Var(v) = expr.kind() {
        f(v);
    }
    for child in expr.children() {
        for_each_var(child, f);
    }
}

pub fn expr_vars(expr: &Expr) -> Vec<Var> {
    let mut out = Vec::new();
    for_each_var(expr, &mut |v| {
        if !out.contains(v) {
            out.push(v.clone());
        }
    });
    out
}

/// Whether `var` is referenced anywhere in `stmt`.
pub fn uses_var(stmt: &Stmt, var: &Var) -> bool {
    let mut found = false;
    walk(stmt, &mut |s| {
        if matches!(s, Stmt::Assign { var: v, .. } | Stmt::ZeroOut { buf: v, .. } if v == var) {
            found = true;
        }
        for e in s.exprs() {
            for_each_var(e, &mut |v| found |= v == var);
        }
    });
    found
}
