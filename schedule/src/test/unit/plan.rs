//! Transfer plan selection and register layouts.

use test_case::test_case;
use tessel_ir::{CacheHint, DType, Dim, Tile};

use crate::error::Error;
use crate::transfer::plan::{AccessType, Transform, TransformKind, plan_for};

const MK: [Dim; 2] = [Dim::M, Dim::K];

#[test_case(AccessType::Block, TransformKind::Block; "block")]
#[test_case(AccessType::PseudoBlock, TransformKind::Block; "pseudo block")]
#[test_case(AccessType::Block2d, TransformKind::Block; "block 2d")]
#[test_case(AccessType::Block2dVnni, TransformKind::Vnni; "vnni")]
#[test_case(AccessType::Block2dTranspose, TransformKind::TransposeVnni; "transpose")]
fn test_plan_kind(access: AccessType, expected: TransformKind) {
    let plan = plan_for(access, 0, CacheHint::default(), MK, false).unwrap();
    assert_eq!(plan.kind, expected);
    assert_eq!(plan.dims, MK);
}

#[test_case(AccessType::Scattered)]
#[test_case(AccessType::ChannelScattered)]
#[test_case(AccessType::CacheLine)]
fn test_plan_unimplemented_loads(access: AccessType) {
    let err = plan_for(access, 0, CacheHint::default(), MK, false).unwrap_err();
    assert!(matches!(err, Error::NotImplemented { .. }), "{err}");
    assert!(!err.is_contract_violation());
}

#[test]
fn test_scattered_prefetch_is_untransformed() {
    let plan = plan_for(AccessType::Scattered, 8, CacheHint::default(), MK, true).unwrap();
    assert_eq!(plan.kind, TransformKind::None);
    assert_eq!(plan.tile_r, 0);
    assert!(!plan.is_2d_capable());
}

fn block(kind: TransformKind, tile_r: i64) -> Transform {
    Transform { kind, tile_r, cache_hint: CacheHint::default(), dims: MK }
}

#[test]
fn test_block_layout_is_width_major() {
    let tile = Tile::from([(Dim::M, 32), (Dim::K, 8)]);
    let layout = block(TransformKind::Block, 0).layout(&tile, &DType::F32).unwrap();
    assert_eq!(layout.stride(Dim::M), Some(1));
    assert_eq!(layout.stride(Dim::K), Some(32));
    assert_eq!(layout.elems(), 256);
}

#[test]
fn test_block_layout_splits_rows() {
    let tile = Tile::from([(Dim::M, 32), (Dim::K, 8)]);
    let layout = block(TransformKind::Block, 16).layout(&tile, &DType::F32).unwrap();
    assert_eq!(layout.blocks().len(), 3);
    assert_eq!(layout.stride(Dim::K), Some(16));
    assert_eq!(layout.dim_sizes(), tile);
    assert_eq!(layout.offset_elems(&[(Dim::M, 16)].into()).unwrap(), 128);
}

#[test]
fn test_vnni_packs_height() {
    let tile = Tile::from([(Dim::M, 16), (Dim::K, 32)]);
    let layout = block(TransformKind::Vnni, 0).layout(&tile, &DType::F16).unwrap();
    let first = layout.blocks()[0];
    assert_eq!((first.dim, first.size, first.stride), (Dim::K, 2, 1));
    assert_eq!(layout.stride(Dim::M), Some(2));
    assert_eq!(layout.dim_sizes().get_or_default(Dim::K), 32);
}

#[test]
fn test_vnni_rejects_odd_height() {
    let tile = Tile::from([(Dim::M, 16), (Dim::K, 3)]);
    let err = block(TransformKind::Vnni, 0).layout(&tile, &DType::F16).unwrap_err();
    assert!(err.is_contract_violation(), "{err}");
}

#[test_case(TransformKind::Block, &DType::F32, 16; "f32 block")]
#[test_case(TransformKind::Block, &DType::F16, 32; "f16 block")]
#[test_case(TransformKind::TransposeVnni, &DType::F32, 8; "f32 transpose")]
fn test_tile_2d_width(kind: TransformKind, dtype: &DType, width: i64) {
    let tile = block(kind, 0).tile_2d(dtype);
    assert_eq!(tile[Dim::M], width);
    assert_eq!(tile[Dim::K], 32);
}
