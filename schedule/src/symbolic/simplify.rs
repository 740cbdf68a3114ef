//! Constraint-aware simplification of a finished kernel body.
//!
//! Substitutes pinned values, folds constants and removes branches whose
//! condition the constraint set decides. Inside an `if`, the condition is
//! assumed for the then-branch and its negation for the else-branch, as long
//! as the branch does not reassign a variable the condition reads.

use smallvec::SmallVec;
use tessel_ir::visit::{expr_vars, walk};
use tessel_ir::{Block2d, ConstraintSet, DpasStmt, Expr, MadStmt, SendShape, SendStmt, Stmt, Var};

/// Counters reported by [`simplify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    /// `if` statements replaced by one of their branches.
    pub branches: usize,
    /// `while` loops that can never run.
    pub loops: usize,
}

#[tracing::instrument(skip_all)]
pub fn simplify(stmt: &Stmt, cset: &ConstraintSet) -> Stmt {
    simplify_with_stats(stmt, cset).0
}

pub fn simplify_with_stats(stmt: &Stmt, cset: &ConstraintSet) -> (Stmt, SimplifyStats) {
    let mut stats = SimplifyStats::default();
    let out = simplify_stmt(stmt, cset, &mut stats);
    tracing::debug!(branches = stats.branches, loops = stats.loops, "simplified");
    (out, stats)
}

fn simplify_stmt(stmt: &Stmt, cset: &ConstraintSet, stats: &mut SimplifyStats) -> Stmt {
    let e = |x: &Expr| cset.substitute_known(x);
    let body = |b: &Option<Box<Stmt>>, stats: &mut SimplifyStats| {
        b.as_ref().map(|b| Box::new(simplify_stmt(b, cset, stats)))
    };

    match stmt {
        Stmt::Let { var, value, body: b } => {
            Stmt::Let { var: var.clone(), value: value.as_ref().map(e), body: body(b, stats) }
        }
        Stmt::Alloc { buf, size, kind, body: b } => {
            Stmt::Alloc { buf: buf.clone(), size: *size, kind: *kind, body: body(b, stats) }
        }
        Stmt::Assign { var, value } => Stmt::Assign { var: var.clone(), value: e(value) },
        Stmt::Store { buf, offset, value } => Stmt::Store { buf: e(buf), offset: e(offset), value: e(value) },
        Stmt::Seq(stmts) => Stmt::seq(stmts.iter().map(|s| simplify_stmt(s, cset, stats))),
        Stmt::Chain(stmts) => Stmt::Chain(stmts.iter().map(|s| simplify_stmt(s, cset, stats)).collect()),
        Stmt::If { cond, then_body, else_body } => {
            let cond = decide(cond, cset);
            match cond.as_bool() {
                Some(true) => {
                    stats.branches += 1;
                    simplify_stmt(then_body, cset, stats)
                }
                Some(false) => {
                    stats.branches += 1;
                    else_body.as_ref().map_or_else(Stmt::empty, |s| simplify_stmt(s, cset, stats))
                }
                None => {
                    let then_cset = assume_in(cset, &cond, then_body);
                    let then_body = simplify_stmt(then_body, &then_cset, stats);
                    let else_body = else_body.as_ref().map(|s| {
                        let else_cset = assume_in(cset, &!cond.clone(), s);
                        simplify_stmt(s, &else_cset, stats)
                    });
                    Stmt::if_then(cond, then_body, else_body)
                }
            }
        }
        Stmt::While { cond, body } => {
            let cond = decide(cond, cset);
            if cond.as_bool() == Some(false) {
                stats.loops += 1;
                return Stmt::empty();
            }
            Stmt::while_loop(cond, simplify_stmt(body, cset, stats))
        }
        Stmt::Send(s) => Stmt::Send(simplify_send(s, cset)),
        Stmt::Dpas(d) => Stmt::Dpas(DpasStmt { dst: e(&d.dst), acc: e(&d.acc), a: e(&d.a), b: e(&d.b), ..d.clone() }),
        Stmt::Mad(m) => Stmt::Mad(MadStmt { dst: e(&m.dst), acc: e(&m.acc), a: e(&m.a), b: e(&m.b), ..m.clone() }),
        Stmt::ZeroOut { .. } | Stmt::Barrier => stmt.clone(),
    }
}

fn simplify_send(s: &SendStmt, cset: &ConstraintSet) -> SendStmt {
    let e = |x: &Expr| cset.substitute_known(x);
    let shape = match &s.shape {
        SendShape::Block2d(b) => SendShape::Block2d(Block2d {
            surface_width: e(&b.surface_width),
            surface_height: e(&b.surface_height),
            surface_pitch: e(&b.surface_pitch),
            ..b.clone()
        }),
        other => other.clone(),
    };
    SendStmt {
        shape,
        mem_buf: e(&s.mem_buf),
        mem_off: e(&s.mem_off),
        reg: s.reg.as_ref().map(e),
        coords: s.coords.as_ref().map(|(x, y)| (e(x), e(y))),
        ..s.clone()
    }
}

/// Condition with pinned values substituted, or a constant when the
/// constraints decide it.
fn decide(cond: &Expr, cset: &ConstraintSet) -> Expr {
    let cond = cset.substitute_known(cond);
    if cset.can_prove(&cond) {
        Expr::bool(true)
    } else if cset.can_refute(&cond) {
        Expr::bool(false)
    } else {
        cond
    }
}

/// `cset` extended with `cond` for a branch, unless the branch writes one of
/// the variables `cond` reads.
fn assume_in(cset: &ConstraintSet, cond: &Expr, branch: &Stmt) -> ConstraintSet {
    let read = expr_vars(cond);
    let mut written: SmallVec<[&Var; 4]> = SmallVec::new();
    walk(branch, &mut |s| {
        if let Stmt::Assign { var, .. } = s {
            written.push(var);
        }
    });
    if written.iter().any(|w| read.contains(*w)) {
        return cset.clone();
    }
    cset.clone().with(cond.clone())
}
