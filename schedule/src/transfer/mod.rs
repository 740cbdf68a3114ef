//! Memory access planner.
//!
//! Turns a tile transfer between a [`GlobalTensor`] and a register [`Tensor`]
//! into `Send` statements. Three paths exist:
//!
//! - **2D block**: one message per hardware-sized sub-block, optionally with
//!   VNNI repacking or a transpose. Needs an aligned pitch, so it is gated by a
//!   condition on the runtime pitch unless the constraint set decides it.
//! - **Block**: linear messages of power-of-two oword counts, one row at a time.
//! - **Scattered**: not implemented.

pub mod plan;

use snafu::{OptionExt, ensure};
use tessel_ir::error::{MissingDimensionSnafu, NoOpenScopeSnafu};
use tessel_ir::layout::for_each;
use tessel_ir::{Block2d, Builder, Coord, Expr, GlobalTensor, SendOp, SendShape, SendStmt, Tensor, Tile};

use crate::error::*;

pub use plan::{AccessType, Transform, TransformKind, plan_for};
use plan::{MAX_BLOCK_BYTES, MIN_ALIGN_2D, MIN_PITCH_2D};

/// Load the tile of `g` at `base` into `t`.
pub fn load(b: &mut Builder, t: &Tensor, g: &GlobalTensor, plan: &Transform, base: &Coord) -> Result<()> {
    load_store(b, Some(t), g, plan, SendOp::Load, base)
}

/// Store `t` to the tile of `g` at `base`.
pub fn store(b: &mut Builder, g: &GlobalTensor, t: &Tensor, plan: &Transform, base: &Coord) -> Result<()> {
    load_store(b, Some(t), g, plan, SendOp::Store, base)
}

/// Prefetch the tile of `g` at `base` into the cache.
pub fn prefetch(b: &mut Builder, g: &GlobalTensor, plan: &Transform, base: &Coord) -> Result<()> {
    load_store(b, None, g, plan, SendOp::Prefetch, base)
}

/// Sub-tile origins of `tile` in steps of `step`, first dimension fastest.
pub fn tile_coords(tile: &Tile, step: &Tile) -> Vec<Coord> {
    let mut out = Vec::new();
    for_each(tile, step, |c| out.push(c.clone()));
    out
}

fn load_store(
    b: &mut Builder,
    t: Option<&Tensor>,
    g: &GlobalTensor,
    plan: &Transform,
    op: SendOp,
    base: &Coord,
) -> Result<()> {
    let [w_dim, h_dim] = plan.dims;
    let size = g.dtype.bytes().max(1) as i64;
    let grf_size = b.exec().map(|e| e.grf_size()).context(NoOpenScopeSnafu { what: "memory transfer" })?;

    let row_elems = match t {
        Some(t) => t.layout.dim_sizes().get_or_default(w_dim),
        None => g.tile.get_or_default(w_dim),
    };
    let try_2d = plan.is_2d_capable() || row_elems * size <= grf_size;
    if !try_2d {
        return block_message(b, t, g, plan, op, base);
    }

    let pitch = g.strides.get(h_dim).cloned().context(MissingDimensionSnafu { dim: h_dim })?;
    let gate = (&pitch % (MIN_ALIGN_2D / size)).eq_(0) & pitch.ge(MIN_PITCH_2D / size);
    let fallback = |b: &mut Builder| match plan.kind {
        TransformKind::Block => block_message(b, t, g, plan, op, base),
        _ => scatter_message(op),
    };

    let (proven, refuted) = {
        let cset = b.constraints();
        (cset.can_prove(&gate), cset.can_refute(&gate))
    };
    if proven {
        tracing::trace!(op = %op, "2D transfer proven legal");
        block_2d_message(b, t, g, plan, op, base)
    } else if refuted {
        tracing::trace!(op = %op, "2D transfer proven illegal");
        fallback(b)
    } else {
        b.if_else(gate, |b| block_2d_message(b, t, g, plan, op, base), fallback)
    }
}

// ============================================================================
// Message kinds
// ============================================================================

fn scatter_message(op: SendOp) -> Result<()> {
    if op == SendOp::Prefetch {
        // Dropping a prefetch only costs latency.
        tracing::warn!("scattered prefetch is not implemented, skipping");
        return Ok(());
    }
    tracing::warn!(op = %op, "scattered messages are not yet implemented");
    NotImplementedSnafu { feature: "scattered transfer" }.fail()
}

fn block_message(
    b: &mut Builder,
    t: Option<&Tensor>,
    g: &GlobalTensor,
    plan: &Transform,
    op: SendOp,
    base: &Coord,
) -> Result<()> {
    let w_dim = plan.dims[0];
    let size = g.dtype.bytes().max(1) as i64;
    let tile = plan.block_tile(&g.dtype);

    for coord in tile_coords(&g.tile, &tile) {
        let width = tile.get_or_default(w_dim).min(g.tile.get_or_default(w_dim) - coord.get_or_default(w_dim));
        let mut width_bytes = width * size;
        ensure!(width_bytes % 16 == 0, BlockWidthMisalignedSnafu { width_bytes });

        let mut local = &coord + base;
        while width_bytes > 0 {
            let chunk = prev_power_of_two(width_bytes.min(MAX_BLOCK_BYTES));
            let reg = t.map(|t| t.at(&local)).transpose()?;
            b.append(SendStmt {
                op,
                shape: SendShape::Block { owords: (chunk / 16) as u32 },
                dtype: g.dtype.clone(),
                mem_buf: g.buffer.clone(),
                mem_off: g.offset_bytes(&local),
                reg,
                coords: None,
                cache: plan.cache_hint,
            })?;
            width_bytes -= chunk;
            local.set(w_dim, local.get_or_default(w_dim) + chunk / size);
        }
    }
    Ok(())
}

fn block_2d_message(
    b: &mut Builder,
    t: Option<&Tensor>,
    g: &GlobalTensor,
    plan: &Transform,
    op: SendOp,
    base: &Coord,
) -> Result<()> {
    let [w_dim, h_dim] = plan.dims;
    let size = g.dtype.bytes().max(1) as i64;
    let tile = plan.tile_2d(&g.dtype);

    let dim_expr = |map: &tessel_ir::DimMap<Expr>, dim| map.get(dim).cloned().context(MissingDimensionSnafu { dim });
    let surface_width = dim_expr(&g.sizes, w_dim)?;
    let surface_height = dim_expr(&g.sizes, h_dim)?;
    let surface_pitch = dim_expr(&g.strides, h_dim)?;
    let x_idx = dim_expr(&g.idxs, w_dim)?;
    let y_idx = dim_expr(&g.idxs, h_dim)?;

    for coord in tile_coords(&g.tile, &tile) {
        let at = &coord + base;
        let width = tile[w_dim].min(g.tile.get_or_default(w_dim) - coord.get_or_default(w_dim));
        let height = tile[h_dim].min(g.tile.get_or_default(h_dim) - coord.get_or_default(h_dim));
        let reg = t.map(|t| t.at(&at)).transpose()?;

        tracing::trace!(op = %op, width, height, "2D block message");
        b.append(SendStmt {
            op,
            shape: SendShape::Block2d(Block2d {
                surface_width: surface_width.clone(),
                surface_height: surface_height.clone(),
                surface_pitch: surface_pitch.clone(),
                width,
                height,
                count: 1,
                vnni: plan.kind == TransformKind::Vnni,
                transpose: plan.kind == TransformKind::TransposeVnni,
                zero_out: true,
            }),
            dtype: g.dtype.clone(),
            mem_buf: g.buffer.clone(),
            mem_off: &g.base_offset * size,
            reg,
            coords: Some((&x_idx + at.get_or_default(w_dim), &y_idx + at.get_or_default(h_dim))),
            cache: plan.cache_hint,
        })?;
    }
    Ok(())
}

fn prev_power_of_two(x: i64) -> i64 {
    if x <= 0 { 0 } else { 1 << (63 - x.leading_zeros()) }
}
