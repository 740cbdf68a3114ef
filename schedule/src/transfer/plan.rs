//! Transfer plans: how a tile travels between memory and registers.

use snafu::ensure;
use tessel_ir::error::TileNotDivisibleSnafu;
use tessel_ir::{CacheHint, DType, Dim, Layout, Tile};

use crate::error::*;

/// Memory access type requested by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(strum::Display, strum::AsRefStr, strum::EnumIter)]
pub enum AccessType {
    Scattered,
    ChannelScattered,
    #[default]
    Block,
    PseudoBlock,
    Block2d,
    Block2dTranspose,
    Block2dVnni,
    CacheLine,
}

/// Register-side arrangement produced by a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TransformKind {
    None,
    Block,
    /// Packs `4 / size` elements of the second dimension innermost.
    Vnni,
    /// Transposing 2D load, packed along the first dimension.
    TransposeVnni,
}

/// Transfer plan for one operand.
///
/// `dims[0]` is the contiguous (width) dimension in memory, `dims[1]` the
/// pitched (height) dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transform {
    pub kind: TransformKind,
    /// Register tile rows along `dims[0]`, zero when unrestricted.
    pub tile_r: i64,
    pub cache_hint: CacheHint,
    pub dims: [Dim; 2],
}

/// Hardware limits of 2D block messages.
pub const MAX_2D_WIDTH_BYTES: i64 = 64;
pub const MAX_2D_TRANSPOSE_WIDTH_BYTES: i64 = 32;
pub const MAX_2D_HEIGHT: i64 = 32;
/// Largest linear block message.
pub const MAX_BLOCK_BYTES: i64 = 512;
/// 2D messages need a 16-byte aligned pitch of at least 64 bytes.
pub const MIN_ALIGN_2D: i64 = 16;
pub const MIN_PITCH_2D: i64 = 64;

/// Choose a transform for an access type.
///
/// Scattered prefetches degrade to untransformed prefetches; scattered,
/// channel-scattered and cache-line loads have no implementation yet.
pub fn plan_for(
    access: AccessType,
    tile_r: i64,
    cache_hint: CacheHint,
    dims: [Dim; 2],
    is_prefetch: bool,
) -> Result<Transform> {
    let kind = match access {
        AccessType::Scattered if is_prefetch => {
            return Ok(Transform { kind: TransformKind::None, tile_r: 0, cache_hint, dims });
        }
        AccessType::Block | AccessType::PseudoBlock | AccessType::Block2d => TransformKind::Block,
        AccessType::Block2dVnni => TransformKind::Vnni,
        AccessType::Block2dTranspose => TransformKind::TransposeVnni,
        AccessType::Scattered | AccessType::ChannelScattered | AccessType::CacheLine => {
            tracing::warn!(access = %access, "access type has no transfer implementation");
            return NotImplementedSnafu { feature: format!("{} transfer", access.as_ref().to_lowercase()) }.fail();
        }
    };
    Ok(Transform { kind, tile_r, cache_hint, dims })
}

impl Transform {
    /// Elements packed together by the VNNI transforms.
    pub fn pack(dtype: &DType) -> i64 {
        (4 / dtype.bytes().max(1) as i64).max(1)
    }

    /// Register layout of `tile` after this transform.
    pub fn layout(&self, tile: &Tile, dtype: &DType) -> Result<Layout> {
        let [d0, d1] = self.dims;
        let w = tile.get(d0).copied().unwrap_or(1);
        let h = tile.get(d1).copied().unwrap_or(1);
        let pack = Self::pack(dtype);
        let mut layout = Layout::new(dtype.clone());

        match self.kind {
            TransformKind::None | TransformKind::Block => {
                let inner = if self.tile_r > 0 && self.tile_r < w { self.tile_r } else { w };
                ensure!(w % inner == 0, TileNotDivisibleSnafu { dim: d0, size: w, step: inner });
                layout.add_block(d0, inner, 1);
                layout.add_block(d1, h, inner);
                if inner < w {
                    layout.add_block(d0, w / inner, inner * h);
                }
            }
            TransformKind::Vnni => {
                ensure!(h % pack == 0, TileNotDivisibleSnafu { dim: d1, size: h, step: pack });
                if pack > 1 {
                    layout.add_block(d1, pack, 1);
                }
                layout.add_block(d0, w, pack);
                layout.add_block(d1, h / pack, pack * w);
            }
            TransformKind::TransposeVnni => {
                ensure!(w % pack == 0, TileNotDivisibleSnafu { dim: d0, size: w, step: pack });
                if pack > 1 {
                    layout.add_block(d0, pack, 1);
                }
                layout.add_block(d1, h, pack);
                layout.add_block(d0, w / pack, pack * h);
            }
        }
        Ok(layout)
    }

    /// Largest sub-tile moved by one 2D message.
    pub fn tile_2d(&self, dtype: &DType) -> Tile {
        let width_bytes = match self.kind {
            TransformKind::TransposeVnni => MAX_2D_TRANSPOSE_WIDTH_BYTES,
            _ => MAX_2D_WIDTH_BYTES,
        };
        Tile::from([(self.dims[0], (width_bytes / dtype.bytes().max(1) as i64).max(1)), (self.dims[1], MAX_2D_HEIGHT)])
    }

    /// Sub-tile covered by one row of linear block messages.
    pub fn block_tile(&self, dtype: &DType) -> Tile {
        Tile::from([(self.dims[0], (MAX_BLOCK_BYTES / dtype.bytes().max(1) as i64).max(1)), (self.dims[1], 1)])
    }

    pub fn is_2d_capable(&self) -> bool {
        !matches!(self.kind, TransformKind::None)
    }
}
