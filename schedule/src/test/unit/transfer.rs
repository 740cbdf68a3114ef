//! Memory transfer emission: 2D gating, block chunking and scattered paths.

use tessel_ir::{CacheHint, ConstraintSet, Coord, Dim, KernelIface, SendOp, SendShape, Stmt, Tile};

use crate::error::Error;
use crate::test::helpers::*;
use crate::transfer::{AccessType, Transform, TransformKind, load, plan_for, prefetch, store};

fn block_plan() -> Transform {
    plan_for(AccessType::Block, 0, CacheHint::default(), [Dim::M, Dim::K], false).unwrap()
}

/// `lda` is a multiple of 4 elements and at least 16: every 2D condition holds.
fn pitch_aligned(iface: &KernelIface) -> ConstraintSet {
    let lda = arg(iface, "lda");
    ConstraintSet::new().with((&lda % 4).eq_(0)).with(lda.ge(16))
}

/// `lda` is too small for 2D messages.
fn pitch_narrow(iface: &KernelIface) -> ConstraintSet {
    ConstraintSet::new().with(arg(iface, "lda").le(8))
}

fn build_load(cset: impl FnOnce(&KernelIface) -> ConstraintSet, tile: Tile) -> Result<Stmt, Error> {
    let mut b = transfer_kernel(cset);
    let g = a_tile(&b, tile.clone());
    let layout = block_plan().layout(&tile, &g.dtype)?;
    let t = b.def_tensor(layout, "A_blk", None)?;
    load(&mut b, &t, &g, &block_plan(), &Coord::new())?;
    Ok(b.end_kernel()?)
}

fn mk(m: i64, k: i64) -> Tile {
    Tile::from([(Dim::M, m), (Dim::K, k)])
}

// =========================================================================
// 2D gate
// =========================================================================

#[test]
fn test_proven_pitch_emits_only_2d() {
    let body = build_load(pitch_aligned, mk(32, 32)).unwrap();

    assert_eq!(count_ifs(&body), 0);
    let sends = sends(&body);
    // 16 f32 columns by 32 rows per message
    assert_eq!(sends.len(), 2);
    for s in sends {
        let SendShape::Block2d(shape) = &s.shape else { panic!("expected a 2D message, got {:?}", s.shape) };
        assert_eq!((shape.width, shape.height, shape.count), (16, 32, 1));
        assert!(shape.zero_out && !shape.vnni && !shape.transpose);
        assert_eq!(s.op, SendOp::Load);
        assert!(s.coords.is_some() && s.reg.is_some());
    }
}

#[test]
fn test_refuted_pitch_emits_only_block() {
    let body = build_load(pitch_narrow, mk(32, 32)).unwrap();

    assert_eq!(count_ifs(&body), 0);
    let sends = sends(&body);
    // one 128-byte message per column
    assert_eq!(sends.len(), 32);
    assert!(sends.iter().all(|s| s.shape == SendShape::Block { owords: 8 } && s.coords.is_none()));
}

#[test]
fn test_unknown_pitch_emits_runtime_choice() {
    let body = build_load(|_| ConstraintSet::new(), mk(32, 32)).unwrap();

    assert_eq!(count_ifs(&body), 1);
    let Some(Stmt::If { then_body, else_body: Some(else_body), .. }) = find_if(&body) else {
        panic!("missing 2D gate in\n{}", body.tree());
    };
    assert!(sends(then_body).iter().all(|s| s.shape.is_2d()));
    assert!(sends(else_body).iter().all(|s| !s.shape.is_2d()));
    assert_eq!(sends(&body).len(), 2 + 32);
}

fn find_if(stmt: &Stmt) -> Option<&Stmt> {
    let mut found = None;
    tessel_ir::visit::walk(stmt, &mut |s| {
        if found.is_none() && matches!(s, Stmt::If { .. }) {
            found = Some(s);
        }
    });
    found
}

// =========================================================================
// Block messages
// =========================================================================

#[test]
fn test_block_chunks_are_powers_of_two() {
    let body = build_load(pitch_narrow, mk(48, 1)).unwrap();
    let shapes: Vec<_> = sends(&body).iter().map(|s| s.shape.clone()).collect();
    assert_eq!(shapes, vec![SendShape::Block { owords: 8 }, SendShape::Block { owords: 4 }]);
}

#[test]
fn test_block_width_must_be_oword_aligned() {
    let err = build_load(pitch_narrow, mk(3, 2)).unwrap_err();
    assert_eq!(err, Error::BlockWidthMisaligned { width_bytes: 12 });
    assert!(err.is_contract_violation());
}

#[test]
fn test_store_mirrors_load() {
    let mut b = transfer_kernel(pitch_narrow);
    let g = a_tile(&b, mk(32, 2));
    let t = b.def_tensor(block_plan().layout(&g.tile, &g.dtype).unwrap(), "C_blk", None).unwrap();
    store(&mut b, &g, &t, &block_plan(), &Coord::new()).unwrap();
    let body = b.end_kernel().unwrap();

    let sends = sends(&body);
    assert_eq!(sends.len(), 2);
    assert!(sends.iter().all(|s| s.op == SendOp::Store));
}

#[test]
fn test_prefetch_has_no_register() {
    let mut b = transfer_kernel(|_| ConstraintSet::new());
    let g = a_tile(&b, mk(32, 32));
    prefetch(&mut b, &g, &block_plan(), &Coord::new()).unwrap();
    let body = b.end_kernel().unwrap();
    assert!(sends(&body).iter().all(|s| s.op == SendOp::Prefetch && s.reg.is_none()));
}

// =========================================================================
// Scattered
// =========================================================================

#[test]
fn test_scattered_prefetch_is_dropped() {
    let plan = plan_for(AccessType::Scattered, 0, CacheHint::default(), [Dim::M, Dim::K], true).unwrap();
    assert_eq!(plan.kind, TransformKind::None);

    let mut b = transfer_kernel(pitch_narrow);
    let g = a_tile(&b, mk(8, 4));
    prefetch(&mut b, &g, &plan, &Coord::new()).unwrap();
    let body = b.end_kernel().unwrap();
    assert!(sends(&body).is_empty());
}

#[test]
fn test_scattered_load_is_not_implemented() {
    let dims = [Dim::M, Dim::K];
    let plan = Transform { kind: TransformKind::None, tile_r: 0, cache_hint: CacheHint::default(), dims };
    let mut b = transfer_kernel(pitch_narrow);
    let g = a_tile(&b, mk(8, 4));
    let t = b.def_tensor(plan.layout(&g.tile, &g.dtype).unwrap(), "A_blk", None).unwrap();

    let err = load(&mut b, &t, &g, &plan, &Coord::new()).unwrap_err();
    assert!(matches!(err, Error::NotImplemented { ref feature } if feature == "scattered transfer"), "{err}");
}
