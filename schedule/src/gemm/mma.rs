//! Multiply-accumulate emission over register tiles.

use snafu::{OptionExt, ensure};
use tessel_ir::error::NoOpenScopeSnafu;
use tessel_ir::{Builder, Coord, Dim, DpasStmt, Layout, MadStmt, Stmt, Tensor, Tile};

use crate::error::*;
use crate::transfer::tile_coords;

/// Systolic instruction shape.
const SYSTOLIC_SIMD: i64 = 16;
const SYSTOLIC_DEPTH: i64 = 8;
const MAX_SYSTOLIC_RCOUNT: i64 = 8;

const MAX_MAD_SIMD: i64 = 32;

/// Register operands of `C += A * B`.
///
/// `a` and `b` may be multi-copy buffers; `a_base`/`b_base` select the
/// position of the current reduction step inside them.
#[derive(Debug, Clone)]
pub struct MmaOperands<'a> {
    pub c: &'a Tensor,
    pub a: &'a Tensor,
    pub b: &'a Tensor,
    pub a_base: Coord,
    pub b_base: Coord,
}

/// Emit `C += A * B` over `tile`, which holds the C extents plus the
/// reduction extent.
pub fn mma(b: &mut Builder, ops: &MmaOperands<'_>, tile: &Tile, systolic: bool) -> Result<()> {
    if systolic { mma_systolic(b, ops, tile) } else { mma_mad(b, ops, tile) }
}

/// Dpas chain. The C layout must have the systolic width innermost.
fn mma_systolic(b: &mut Builder, ops: &MmaOperands<'_>, tile: &Tile) -> Result<()> {
    let [dim_simd, dim_rcount] = leading_dims(&ops.c.layout, "C")?;
    let [a0, a1] = leading_dims(&ops.a.layout, "A")?;
    let dim_sdepth = if a0 == dim_simd { a1 } else { a0 };

    let a_size = ops.a.layout.dtype().bytes().max(1) as i64;
    let sdepth = SYSTOLIC_DEPTH * (4 / a_size).max(1);

    let simd_extent = tile.get_or_default(dim_simd);
    ensure!(
        simd_extent % SYSTOLIC_SIMD == 0,
        InstructionShapeSnafu { reason: format!("{dim_simd} extent {simd_extent} is not a multiple of {SYSTOLIC_SIMD}") }
    );
    let depth_extent = tile.get_or_default(dim_sdepth);
    ensure!(
        depth_extent % sdepth == 0,
        InstructionShapeSnafu {
            reason: format!("{dim_sdepth} extent {depth_extent} is not a multiple of the systolic depth {sdepth}")
        }
    );
    let inner = ops.c.layout.blocks()[0].size;
    ensure!(
        inner == SYSTOLIC_SIMD,
        InstructionShapeSnafu { reason: format!("C innermost block is {inner}, systolic width is {SYSTOLIC_SIMD}") }
    );

    let inst = Tile::from([(dim_simd, SYSTOLIC_SIMD), (dim_sdepth, sdepth), (dim_rcount, MAX_SYSTOLIC_RCOUNT)]);
    let mut chain = Vec::new();
    for coord in tile_coords(tile, &inst) {
        let rcount = MAX_SYSTOLIC_RCOUNT.min(tile.get_or_default(dim_rcount) - coord.get_or_default(dim_rcount));
        let (dst, a, bv) = operand_regions(ops, &coord)?;
        chain.push(Stmt::Dpas(DpasStmt {
            simd: SYSTOLIC_SIMD as u8,
            sdepth: SYSTOLIC_DEPTH as u8,
            rcount: rcount as u8,
            c_type: ops.c.layout.dtype().clone(),
            a_type: ops.a.layout.dtype().clone(),
            b_type: ops.b.layout.dtype().clone(),
            acc: dst.clone(),
            dst,
            a,
            b: bv,
        }));
    }
    tracing::trace!(instructions = chain.len(), "dpas chain");
    b.append(Stmt::Chain(chain))?;
    Ok(())
}

/// Generic fused multiply-add sweep, one SIMD row of C per instruction.
fn mma_mad(b: &mut Builder, ops: &MmaOperands<'_>, tile: &Tile) -> Result<()> {
    let grf_size = b.exec().map(|e| e.grf_size()).context(NoOpenScopeSnafu { what: "mad" })?;
    let [dim_simd, dim_rcount] = leading_dims(&ops.c.layout, "C")?;
    let [a0, a1] = leading_dims(&ops.a.layout, "A")?;
    let k_dim = if a1 == dim_simd || a1 == dim_rcount { a0 } else { a1 };

    let c_size = ops.c.layout.dtype().bytes().max(1) as i64;
    let simd_extent = tile.get_or_default(dim_simd);
    ensure!(
        simd_extent * c_size % grf_size == 0,
        InstructionShapeSnafu {
            reason: format!("{dim_simd} extent {simd_extent} does not fill whole {grf_size}-byte registers")
        }
    );

    let inst = Tile::from([(dim_simd, MAX_MAD_SIMD), (dim_rcount, 1), (k_dim, 1)]);
    let extent = |d: Dim| inst.get(d).copied().unwrap_or(1);
    let a_stride = if extent(Dim::M) * extent(Dim::K) == 1 { 0 } else { layout_stride(&ops.a.layout, Dim::M)? };
    let b_stride = if extent(Dim::K) * extent(Dim::N) == 1 { 0 } else { layout_stride(&ops.b.layout, Dim::N)? };

    for coord in tile_coords(tile, &inst) {
        let simd = MAX_MAD_SIMD.min(simd_extent - coord.get_or_default(dim_simd));
        let (dst, a, bv) = operand_regions(ops, &coord)?;
        b.append(MadStmt {
            simd: simd as u32,
            c_type: ops.c.layout.dtype().clone(),
            a_type: ops.a.layout.dtype().clone(),
            a_stride,
            b_type: ops.b.layout.dtype().clone(),
            b_stride,
            acc: dst.clone(),
            dst,
            a,
            b: bv,
        })?;
    }
    Ok(())
}

fn leading_dims(layout: &Layout, name: &str) -> Result<[Dim; 2]> {
    match layout.blocks() {
        [b0, b1, ..] => Ok([b0.dim, b1.dim]),
        _ => InstructionShapeSnafu { reason: format!("{name} layout {layout} has fewer than two blocks") }.fail(),
    }
}

fn layout_stride(layout: &Layout, dim: Dim) -> Result<i64> {
    layout
        .stride(dim)
        .context(InstructionShapeSnafu { reason: format!("layout {layout} has no {dim} block") })
}

/// C, A and B register regions at `coord`.
fn operand_regions(
    ops: &MmaOperands<'_>,
    coord: &Coord,
) -> Result<(tessel_ir::Expr, tessel_ir::Expr, tessel_ir::Expr)> {
    let c = ops.c.at(&project(coord, &ops.c.layout))?;
    let a = ops.a.at(&project(&(&ops.a_base + coord), &ops.a.layout))?;
    let b = ops.b.at(&project(&(&ops.b_base + coord), &ops.b.layout))?;
    Ok((c, a, b))
}

/// Restrict `coord` to the dimensions `layout` has.
fn project(coord: &Coord, layout: &Layout) -> Coord {
    let dims = layout.dim_sizes().dim_set();
    coord.iter().filter(|(d, _)| dims.contains(*d)).map(|(d, &v)| (d, v)).collect()
}
