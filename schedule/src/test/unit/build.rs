//! Kernel construction: interface, support checks, branch selection and
//! stride assumptions.

use test_case::test_case;
use tessel_ir::{ConstraintSet, DType, Hw, Stmt};

use crate::config::BuildConfig;
use crate::error::Error;
use crate::gemm::{
    GemmIrDesc, GemmProblem, GemmStrategy, MatrixAddressing, MatrixLayout, build_ir, build_ir_with, check_supported,
};
use crate::symbolic::simplify_with_stats;
use crate::test::helpers::*;

fn desc(strategy: GemmStrategy) -> GemmIrDesc {
    GemmIrDesc::new(f32_problem(), strategy, HW)
}

#[test]
fn test_standard_interface() {
    let d = desc(pipelined_strategy());
    let names: Vec<_> = d.kernel_iface().args().iter().map(|v| v.name().to_string()).collect();
    assert_eq!(names, ["A", "B", "C", "offset_A", "offset_B", "offset_C", "lda", "ldb", "ldc", "m", "n", "k"]);
    assert_eq!(d.kernel_name(), "gemm_kernel");

    let c = d.kernel_iface().find_arg("C").unwrap();
    assert!(c.dtype().is_ptr());
    assert_eq!(*d.kernel_iface().find_arg("offset_A").unwrap().dtype(), DType::S64);
}

#[test]
fn test_compile_ctx_thread_group() {
    let fixed = GemmStrategy::builder().unroll_m(32).unroll_n(4).unroll_k(32).wg([8, 4, 1]).fixed_wg(true).build();
    assert_eq!(desc(fixed).compile_ctx().thread_group_size, 32);

    let ctx = desc(pipelined_strategy()).compile_ctx();
    assert_eq!(ctx.thread_group_size, 0);
    assert_eq!(ctx.exec.regs, 128);
    assert_eq!(ctx.exec.simd, 16);
    assert_eq!(ctx.hw(), HW);
}

// =========================================================================
// Support checks
// =========================================================================

#[test_case(|s| s.k_parallel = true, "k-parallel"; "k parallel")]
#[test_case(|s| s.k_parallel_local = true, "k-parallel"; "local k parallel")]
#[test_case(|s| s.persistent = true, "persistent loop"; "persistent")]
fn test_unsupported_strategy(tweak: fn(&mut GemmStrategy), feature: &str) {
    let mut strategy = pipelined_strategy();
    tweak(&mut strategy);
    let err = check_supported(&desc(strategy)).unwrap_err();
    assert_eq!(err, Error::Unsupported { feature: feature.to_string() });
    assert!(!err.is_contract_violation());
}

#[test]
fn test_type_conversion_is_unsupported() {
    let problem = GemmProblem::builder().ta(DType::F32).tb(DType::F32).tc(DType::F32).ta_ext(DType::F16).build();
    let err = check_supported(&GemmIrDesc::new(problem, pipelined_strategy(), HW)).unwrap_err();
    assert!(matches!(err, Error::Unsupported { ref feature } if feature == "type conversion"));
}

#[test]
fn test_systolic_needs_hardware_support() {
    let mut strategy = pipelined_strategy();
    strategy.systolic = true;
    let err = check_supported(&GemmIrDesc::new(f32_problem(), strategy.clone(), Hw::XeLp)).unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
    assert!(check_supported(&GemmIrDesc::new(f32_problem(), strategy, Hw::XeHpc)).is_ok());
}

#[test]
fn test_slm_copies_only_warn() {
    let mut strategy = pipelined_strategy();
    strategy.slm_a = true;
    strategy.slm_b = true;
    assert!(check_supported(&desc(strategy)).is_ok());
}

#[test]
fn test_unsupported_fails_build() {
    let mut strategy = pipelined_strategy();
    strategy.persistent = true;
    let err = build_ir_with(&desc(strategy), ConstraintSet::new(), &no_simplify()).unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
}

// =========================================================================
// Kernel body
// =========================================================================

#[test]
fn test_body_has_both_loop_variants() {
    let built = build(pipelined_strategy());
    assert_eq!(count_whiles(&built.body), 2);
    // bounds, m/n/k_idx and the leading-dimension limits
    assert!(built.constraints.len() >= 5 + 3);
}

#[test]
fn test_pinned_k_selects_short_loop() {
    let d = desc(pipelined_strategy());
    let k = d.kernel_iface().find_arg("k").unwrap().expr();
    let cset = ConstraintSet::new().with(k.eq_(16));

    let raw = build_ir_with(&d, cset.clone(), &no_simplify()).unwrap();
    let (body, stats) = simplify_with_stats(&raw.body, &raw.constraints);
    assert!(stats.branches >= 1);
    assert_eq!(count_whiles(&body), 1);

    let simplified = build_ir_with(&d, cset, &BuildConfig::default()).unwrap();
    assert_eq!(count_whiles(&simplified.body), 1);
    assert_eq!(sends(&simplified.body).len(), sends(&body).len());
}

#[test]
fn test_aligned_leading_dimensions_skip_runtime_gates() {
    let aligned = MatrixAddressing::new(MatrixLayout::N, 16);
    let problem = GemmProblem::builder()
        .ta(DType::F32)
        .tb(DType::F32)
        .tc(DType::F32)
        .a(aligned)
        .b(aligned)
        .c(aligned)
        .build();
    let d = GemmIrDesc::new(problem, pipelined_strategy(), HW);

    let built = build_ir_with(&d, ConstraintSet::new(), &no_simplify()).unwrap();
    // thread bounds check and the main/short choice
    assert_eq!(count_ifs(&built.body), 2);
    assert!(sends(&built.body).iter().all(|s| s.shape.is_2d()));

    let unaligned = build(pipelined_strategy());
    assert!(count_ifs(&unaligned.body) > 2);
}

#[test]
fn test_transposed_operands_swap_dimensions() {
    let problem = GemmProblem::builder()
        .ta(DType::F32)
        .tb(DType::F32)
        .tc(DType::F32)
        .a(MatrixAddressing::new(MatrixLayout::T, 0))
        .build();
    assert_eq!(problem.a_dims(), [tessel_ir::Dim::K, tessel_ir::Dim::M]);
    let d = GemmIrDesc::new(problem, pipelined_strategy(), HW);
    assert!(build_ir_with(&d, ConstraintSet::new(), &no_simplify()).is_ok());
}

#[test]
fn test_subgroup_must_divide_tile() {
    let strategy = GemmStrategy::builder().unroll_m(8).unroll_n(4).unroll_k(32).systolic(false).build();
    let err = build_ir_with(&desc(strategy), ConstraintSet::new(), &no_simplify()).unwrap_err();
    assert!(matches!(err, Error::Ir { .. }), "{err}");
}

#[test]
fn test_build_ir_returns_body() {
    let body = build_ir(&desc(pipelined_strategy()), ConstraintSet::new()).unwrap();
    assert!(!matches!(body, Stmt::Seq(ref v) if v.is_empty()));
}
