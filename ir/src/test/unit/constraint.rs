//! Constraint set tests.

use tessel_dtype::DType;

use crate::constraint::ConstraintSet;
use crate::expr::{Expr, Var};

#[test]
fn test_single_value() {
    let k = Var::new("k", DType::S32);
    let m = Var::new("m", DType::S32);
    let cset = ConstraintSet::new().with(k.expr().eq_(256));
    assert_eq!(cset.single_value(&k).and_then(|e| e.as_int()), Some(256));
    assert_eq!(cset.single_value(&m), None);
}

#[test]
fn test_conjunctions_are_split() {
    let k = Var::new("k", DType::S32);
    let cset = ConstraintSet::new().with(k.expr().ge(0) & k.expr().lt(100));
    assert_eq!(cset.len(), 2);
    assert!(cset.can_prove(&k.expr().ge(0)));
    assert!(cset.can_prove(&k.expr().lt(100)));
}

#[test]
fn test_divisibility() {
    let ld = Var::new("lda", DType::S32);
    let cset = ConstraintSet::new().with((ld.expr() % 32).eq_(0));
    assert!(cset.can_prove(&(ld.expr() % 8).eq_(0)));
    assert!(cset.can_prove(&(ld.expr() % 32).eq_(0)));
    assert!(!cset.can_prove(&(ld.expr() % 64).eq_(0)));
    assert!(cset.can_prove(&((ld.expr() * 3) % 16).eq_(0)));
    assert!(cset.can_prove(&((ld.expr() + 64) % 16).eq_(0)));
}

#[test]
fn test_bounds() {
    let ld = Var::new("ldb", DType::S32);
    let cset = ConstraintSet::new().with(ld.expr().ge(32));
    assert!(cset.can_prove(&ld.expr().ge(32)));
    assert!(cset.can_prove(&ld.expr().ge(16)));
    assert!(cset.can_prove(&ld.expr().gt(31)));
    assert!(!cset.can_prove(&ld.expr().ge(64)));
    assert!(cset.can_prove(&(ld.expr() + 8).ge(40)));
    assert!(cset.can_refute(&ld.expr().lt(32)));
    assert!(!cset.can_refute(&ld.expr().lt(64)));
}

#[test]
fn test_two_dimensional_gate() {
    // Pitch gate for 2-byte elements: pitch % 8 == 0 && pitch >= 32.
    let ld = Var::new("lda", DType::S32);
    let gate = (ld.expr() % 8).eq_(0) & ld.expr().ge(32);

    let none = ConstraintSet::new();
    assert!(!none.can_prove(&gate));
    assert!(!none.can_refute(&gate));

    let aligned = ConstraintSet::new().with((ld.expr() % 32).eq_(0)).with(ld.expr().ge(32));
    assert!(aligned.can_prove(&gate));
}

#[test]
fn test_pinned_values_fold() {
    let k = Var::new("k", DType::S32);
    let cset = ConstraintSet::new().with(k.expr().eq_(16));
    assert!(cset.can_prove(&k.expr().lt(64)));
    assert!(cset.can_refute(&k.expr().ge(64)));
    assert_eq!(cset.substitute_known(&(k.expr() + 1)).as_int(), Some(17));
}

#[test]
fn test_constants() {
    let cset = ConstraintSet::new();
    assert!(cset.can_prove(&Expr::bool(true)));
    assert!(!cset.can_prove(&Expr::bool(false)));
    assert!(cset.can_refute(&Expr::bool(false)));
}
