//! Structural checks on finished statement trees.

use std::collections::HashSet;

use snafu::ensure;

use crate::error::{Result, UnboundVariableSnafu};
use crate::expr::{Expr, Var};
use crate::stmt::Stmt;
use crate::visit::for_each_var;

/// Verify that every variable is referenced only inside the subtree of the
/// `Let`/`Alloc` that binds it.
pub fn check_scopes(stmt: &Stmt) -> Result<()> {
    let mut bound = HashSet::new();
    check(stmt, &mut bound)
}

fn check(stmt: &Stmt, bound: &mut HashSet<u64>) -> Result<()> {
    let check_var = |bound: &HashSet<u64>, v: &Var| -> Result<()> {
        ensure!(bound.contains(&v.id()), UnboundVariableSnafu { name: v.name(), id: v.id() });
        Ok(())
    };
    let check_expr = |bound: &HashSet<u64>, e: &Expr| -> Result<()> {
        let mut res = Ok(());
        for_each_var(e, &mut |v| {
            if res.is_ok() {
                res = check_var(bound, v);
            }
        });
        res
    };

    for e in stmt.exprs() {
        check_expr(bound, e)?;
    }
    match stmt {
        Stmt::Assign { var, .. } | Stmt::ZeroOut { buf: var, .. } => check_var(bound, var)?,
        Stmt::Let { var, body, .. } | Stmt::Alloc { buf: var, body, .. } => {
            let inserted = bound.insert(var.id());
            if let Some(body) = body {
                check(body, bound)?;
            }
            if inserted {
                bound.remove(&var.id());
            }
            return Ok(());
        }
        _ => {}
    }
    for child in stmt.children() {
        check(child, bound)?;
    }
    Ok(())
}
