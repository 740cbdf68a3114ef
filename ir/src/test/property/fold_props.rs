//! Property tests for expression folding and scope folding.

use proptest::prelude::*;

use tessel_dtype::DType;

use crate::builder::Builder;
use crate::constraint::ConstraintSet;
use crate::expr::{Expr, Var};
use crate::kernel::{ExecConfig, Hw, KernelIface};
use crate::stmt::Stmt;
use crate::types::{BinaryOp, ConstValue};
use crate::visit::count;

use super::generators::*;

// ============================================================================
// Expression folding
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Folding during construction never changes the value of an expression.
    #[test]
    fn folding_preserves_value(term in arb_term(), env in arb_env()) {
        let vars = make_vars();
        let folded = term.lower(&vars);
        let got = eval(&folded, &bind(&vars, &env));
        prop_assert_eq!(got, ConstValue::Int(term.eval(&env)), "folded: {}", folded);
    }

    /// A term without variables folds to a constant.
    #[test]
    fn closed_terms_fold_to_constants(term in arb_term()) {
        let vars = make_vars();
        let closed = term.lower(&vars);
        let closed = vars.iter().fold(closed, |e, v| e.substitute(v, &Expr::int(7)));
        prop_assert_eq!(closed.as_int(), Some(term.eval(&[7; NUM_VARS])));
    }

    /// Comparisons and their negations agree with plain integer comparison.
    #[test]
    fn comparison_negation(op in arb_cmp_op(), a in arb_term(), b in arb_term(), env in arb_env()) {
        let vars = make_vars();
        let bound = bind(&vars, &env);
        let (x, y) = (a.eval(&env), b.eval(&env));
        let cmp = Expr::binary(op, a.lower(&vars), b.lower(&vars));
        let expected = match op {
            BinaryOp::Lt => x < y,
            BinaryOp::Le => x <= y,
            BinaryOp::Gt => x > y,
            BinaryOp::Ge => x >= y,
            BinaryOp::Eq => x == y,
            _ => x != y,
        };
        prop_assert_eq!(eval(&cmp, &bound), ConstValue::Bool(expected));
        prop_assert_eq!(eval(&!cmp, &bound), ConstValue::Bool(!expected));
    }

    /// Offsets split off an expression add back up to the original value.
    #[test]
    fn split_offset_is_exact(term in arb_term(), env in arb_env()) {
        let vars = make_vars();
        let bound = bind(&vars, &env);
        let (base, off) = term.lower(&vars).split_offset();
        let base = eval(&base, &bound).as_int().unwrap();
        prop_assert_eq!(base.wrapping_add(off), term.eval(&env));
    }
}

// ============================================================================
// Scope folding
// ============================================================================

fn run_program(steps: &[Step]) -> (Stmt, usize) {
    let mut b = Builder::new();
    b.declare_kernel(KernelIface::new(), ExecConfig::new(Hw::XeHpc, 128, 16), ConstraintSet::new()).unwrap();
    let sink = b.def(DType::S32, "sink", Some(Expr::int(0)), false).unwrap();

    // Variables visible in each open scope, innermost last.
    let mut frames: Vec<Vec<Var>> = vec![vec![]];
    let mut declared = 0;
    for step in steps {
        match *step {
            Step::Declare => {
                let v = b.let_typed(DType::S32, &format!("x{declared}"), Some(Expr::int(declared as i64))).unwrap();
                frames.last_mut().unwrap().push(v);
                declared += 1;
            }
            Step::Use(n) => {
                let visible: Vec<&Var> = frames.iter().flatten().collect();
                if !visible.is_empty() {
                    let v = visible[n % visible.len()];
                    b.assign(&sink, v.expr() + 1).unwrap();
                }
            }
            Step::Open => {
                b.begin_scope();
                frames.push(vec![]);
            }
            Step::Close if frames.len() > 1 => {
                b.end_scope().unwrap();
                frames.pop();
            }
            Step::Close => {}
        }
    }
    for _ in 1..frames.len() {
        b.end_scope().unwrap();
    }
    (b.end_kernel().unwrap(), declared)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Every use that was legal while building is inside its binding after folding.
    #[test]
    fn folded_programs_are_well_scoped(steps in arb_program()) {
        let (body, declared) = run_program(&steps);
        let lets = count(&body, |s| matches!(s, Stmt::Let { value: Some(_), .. }));
        // declared variables plus the sink
        prop_assert_eq!(lets, declared + 1);
    }

    /// The number of uses survives folding.
    #[test]
    fn folding_keeps_every_statement(steps in arb_program()) {
        let (body, _) = run_program(&steps);
        let uses = count(&body, |s| matches!(s, Stmt::Assign { .. }));
        let mut frames = vec![0usize];
        let mut want = 0usize;
        for step in &steps {
            match *step {
                Step::Declare => *frames.last_mut().unwrap() += 1,
                Step::Use(_) if frames.iter().sum::<usize>() > 0 => want += 1,
                Step::Open => frames.push(0),
                Step::Close if frames.len() > 1 => {
                    frames.pop();
                }
                _ => {}
            }
        }
        prop_assert_eq!(uses, want);
    }
}
