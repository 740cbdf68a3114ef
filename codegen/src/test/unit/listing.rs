use enumset::EnumSet;
use tessel_ir::{Builder, ConstraintSet, DType, ExecConfig, Hw, KernelIface, Stmt};

use crate::error::Error;
use crate::handoff::setup_interface;
use crate::test::unit::compile::{f32_desc, systolic_desc};
use crate::types::Capability;
use crate::{Encoder, ListingEncoder, compile_gemm, lower_ir};

fn barrier_kernel() -> (Stmt, tessel_ir::CompileCtx) {
    let iface = KernelIface::new().with_arg("n", DType::S32);
    let exec = ExecConfig::new(Hw::XeHpg, 128, 8);
    let mut b = Builder::new();
    b.declare_kernel(iface.clone(), exec, ConstraintSet::new()).unwrap();
    b.barrier().unwrap();
    let body = b.end_kernel().unwrap();
    (body, tessel_ir::CompileCtx::new("sync", iface, exec, 16))
}

#[test]
fn test_directives() {
    let (body, ctx) = barrier_kernel();
    let image = lower_ir(&body, &ctx, &ListingEncoder::new()).unwrap();
    let text = image.as_text().unwrap();

    assert_eq!(image.backend, "listing");
    assert_eq!(image.name, "sync");
    let header: Vec<_> = text.lines().take_while(|l| !l.is_empty()).collect();
    assert_eq!(
        header,
        vec![".kernel sync", ".hw XeHpg", ".regs 128", ".simd 8", ".slm 0", ".thread_group 16", ".caps barrier", ".arg n s32"]
    );
}

#[test]
fn test_gemm_listing() {
    let kernel = compile_gemm(&f32_desc()).unwrap();
    let image = kernel.encode(&ListingEncoder::new()).unwrap();
    let text = image.as_text().unwrap();

    assert!(text.starts_with(".kernel gemm_kernel\n"));
    assert!(text.contains(".arg C global_ptr(stateless, mut)"));
    assert!(text.contains(".arg A global_ptr(stateless)\n"));
    assert!(text.lines().any(|l| l.trim_start().starts_with("while ")));
    assert!(text.lines().any(|l| l.trim_start().starts_with("mad.")));
    assert_eq!(image.manifest, kernel.manifest);
}

#[test]
fn test_nesting_is_indented() {
    let kernel = compile_gemm(&f32_desc()).unwrap();
    let image = kernel.encode(&ListingEncoder::new()).unwrap();
    let text = image.as_text().unwrap();

    let depth = |l: &str| (l.len() - l.trim_start().len()) / 2;
    let whiles: Vec<_> = text.lines().filter(|l| l.trim_start().starts_with("while ")).collect();
    assert!(!whiles.is_empty());
    // Both k-loops sit inside the bounds check and the loop-variant branch.
    assert!(whiles.iter().all(|l| depth(l) >= 2));
}

#[test]
fn test_restricted_encoder_rejects_dpas() {
    let kernel = compile_gemm(&systolic_desc()).unwrap();
    let encoder = ListingEncoder::new().with_capabilities(EnumSet::only(Capability::Barrier));
    assert_eq!(encoder.capabilities(), EnumSet::only(Capability::Barrier));

    let err = kernel.encode(&encoder).unwrap_err();
    assert_eq!(err, Error::UnsupportedCapability { backend: "listing".into(), capability: Capability::Systolic });
    assert_eq!(err.to_string(), "listing encoder cannot emit systolic");
}

#[test]
fn test_restricted_encoder_accepts_plain_body() {
    let (body, ctx) = barrier_kernel();
    let manifest = setup_interface(&ctx, &body).unwrap();
    let encoder = ListingEncoder::new().with_capabilities(EnumSet::only(Capability::Barrier));
    assert!(lower_ir(&body, &ctx, &encoder).is_ok());
    assert!(encoder.encode(&body, &manifest).is_ok());
}
