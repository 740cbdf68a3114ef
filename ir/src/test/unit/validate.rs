//! Scope validation and traversal helpers.

use tessel_dtype::DType;

use crate::error::Error;
use crate::expr::{Expr, Var};
use crate::stmt::Stmt;
use crate::types::AllocKind;
use crate::validate::check_scopes;
use crate::visit::{expr_vars, uses_var};

#[test]
fn test_bound_use_is_accepted() {
    let x = Var::new("x", DType::S32);
    let acc = Var::new_mut("acc", DType::S32);
    let body = Stmt::Assign { var: acc.clone(), value: x.expr() + 1 };
    let tree = Stmt::let_(acc, Some(Expr::int(0))).with_body(Stmt::let_(x, None).with_body(body));
    assert_eq!(check_scopes(&tree), Ok(()));
}

#[test]
fn test_unbound_use_is_rejected() {
    let x = Var::new("x", DType::S32);
    let acc = Var::new_mut("acc", DType::S32);
    let tree = Stmt::let_(acc.clone(), None).with_body(Stmt::Assign { var: acc, value: x.expr() });
    assert_eq!(check_scopes(&tree), Err(Error::UnboundVariable { name: "x".into(), id: x.id() }));
}

#[test]
fn test_binding_value_cannot_reference_itself() {
    let x = Var::new("x", DType::S32);
    let tree = Stmt::let_(x.clone(), Some(x.expr() + 1));
    assert!(check_scopes(&tree).is_err());
}

#[test]
fn test_sibling_scope_does_not_leak() {
    let x = Var::new("x", DType::S32);
    let acc = Var::new_mut("acc", DType::S32);
    let then = Stmt::let_(x.clone(), None).with_body(Stmt::Barrier);
    let after = Stmt::Assign { var: acc.clone(), value: x.expr() };
    let tree = Stmt::let_(acc, None).with_body(Stmt::seq([Stmt::if_then(Expr::bool(true), then, None), after]));
    assert!(matches!(check_scopes(&tree), Err(Error::UnboundVariable { .. })));
}

#[test]
fn test_zero_out_needs_allocation() {
    let c = Var::new_mut("C_blk", DType::F32.vec(16));
    let bad = Stmt::ZeroOut { buf: c.clone(), size: 64 };
    assert!(check_scopes(&bad).is_err());

    let good = Stmt::alloc(c.clone(), 64, AllocKind::Grf).with_body(Stmt::ZeroOut { buf: c, size: 64 });
    assert_eq!(check_scopes(&good), Ok(()));
}

#[test]
fn test_expr_vars_and_uses() {
    let x = Var::new("x", DType::S32);
    let y = Var::new("y", DType::S32);
    let e = (x.expr() * 4 + y.expr()).max(&x);
    let vars = expr_vars(&e);
    assert!(vars.contains(&x));
    assert!(vars.contains(&y));

    let acc = Var::new_mut("acc", DType::S32);
    let stmt = Stmt::Assign { var: acc, value: e };
    assert!(uses_var(&stmt, &y));
    assert!(!uses_var(&stmt, &Var::new("z", DType::S32)));
}
