//! Tiles, coordinates and blocked register layouts.
//!
//! Dimensions are named ([`Dim`]) rather than positional. A [`Layout`] is a
//! list of blocks, innermost first, each covering part of one dimension with
//! an element stride.

use std::ops;

use enumset::{EnumSet, EnumSetType};
use smallvec::SmallVec;
use snafu::ensure;
use tessel_dtype::DType;

use crate::error::{MissingDimensionSnafu, Result, TileNotDivisibleSnafu};
use crate::expr::Expr;

/// Logical GEMM dimension.
#[derive(Debug, Hash, PartialOrd, Ord, EnumSetType, strum::Display, strum::AsRefStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Dim {
    M,
    N,
    K,
}

// ============================================================================
// DimMap
// ============================================================================

/// Small ordered map keyed by [`Dim`]. Iteration follows insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimMap<T> {
    entries: SmallVec<[(Dim, T); 3]>,
}

/// Extent per dimension.
pub type Tile = DimMap<i64>;
/// Position per dimension.
pub type Coord = DimMap<i64>;

impl<T> Default for DimMap<T> {
    fn default() -> Self {
        Self { entries: SmallVec::new() }
    }
}

impl<T> DimMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dim: Dim) -> Option<&T> {
        self.entries.iter().find(|(d, _)| *d == dim).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, dim: Dim) -> Option<&mut T> {
        self.entries.iter_mut().find(|(d, _)| *d == dim).map(|(_, v)| v)
    }

    /// Insert or replace; new dimensions are appended.
    pub fn set(&mut self, dim: Dim, value: T) {
        match self.get_mut(dim) {
            Some(v) => *v = value,
            None => self.entries.push((dim, value)),
        }
    }

    pub fn with(mut self, dim: Dim, value: T) -> Self {
        self.set(dim, value);
        self
    }

    pub fn contains(&self, dim: Dim) -> bool {
        self.get(dim).is_some()
    }

    pub fn dims(&self) -> impl Iterator<Item = Dim> + '_ {
        self.entries.iter().map(|(d, _)| *d)
    }

    pub fn dim_set(&self) -> EnumSet<Dim> {
        self.dims().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dim, &T)> {
        self.entries.iter().map(|(d, v)| (*d, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone + Default> DimMap<T> {
    pub fn get_or_default(&self, dim: Dim) -> T {
        self.get(dim).cloned().unwrap_or_default()
    }
}

impl<T> ops::Index<Dim> for DimMap<T> {
    type Output = T;

    fn index(&self, dim: Dim) -> &T {
        self.get(dim).unwrap_or_else(|| panic!("dimension {dim} is not in the map"))
    }
}

impl<T> FromIterator<(Dim, T)> for DimMap<T> {
    fn from_iter<I: IntoIterator<Item = (Dim, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (d, v) in iter {
            map.set(d, v);
        }
        map
    }
}

impl<T, const N: usize> From<[(Dim, T); N]> for DimMap<T> {
    fn from(entries: [(Dim, T); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl DimMap<i64> {
    /// Product of all extents.
    pub fn elems(&self) -> i64 {
        self.entries.iter().map(|(_, v)| *v).product()
    }

    /// Every extent is a multiple of the corresponding `step` extent.
    pub fn check_divisible(&self, step: &Tile) -> Result<()> {
        for (dim, &size) in self.iter() {
            let s = step.get(dim).copied().unwrap_or(size);
            ensure!(s > 0 && size % s == 0, TileNotDivisibleSnafu { dim, size, step: s });
        }
        Ok(())
    }
}

impl ops::Add<&Coord> for &Coord {
    type Output = Coord;

    /// Union of both coordinates, summing shared dimensions.
    fn add(self, rhs: &Coord) -> Coord {
        let mut out = self.clone();
        for (d, &v) in rhs.iter() {
            out.set(d, out.get(d).copied().unwrap_or(0) + v);
        }
        out
    }
}

impl<T: std::fmt::Display> std::fmt::Display for DimMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, (d, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}: {v}")?;
        }
        write!(f, "]")
    }
}

/// Visit every sub-tile origin of `tile` in steps of `step`.
///
/// The first dimension of `tile` varies fastest. A dimension missing from
/// `step` is taken whole. Extents that are not a multiple of the step produce
/// a final partial step; callers clip against `tile`.
pub fn for_each(tile: &Tile, step: &Tile, mut f: impl FnMut(&Coord)) {
    let dims: SmallVec<[(Dim, i64, i64); 3]> = tile
        .iter()
        .map(|(d, &size)| (d, size, step.get(d).copied().unwrap_or(size).max(1)))
        .collect();
    if dims.iter().any(|&(_, size, _)| size <= 0) {
        return;
    }

    let mut coord: Coord = dims.iter().map(|&(d, _, _)| (d, 0)).collect();
    loop {
        f(&coord);
        let mut carried = true;
        for &(d, size, s) in &dims {
            let Some(v) = coord.get_mut(d) else { continue };
            *v += s;
            if *v < size {
                carried = false;
                break;
            }
            *v = 0;
        }
        if carried {
            return;
        }
    }
}

// ============================================================================
// Layout
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    pub dim: Dim,
    pub size: i64,
    /// Stride in elements.
    pub stride: i64,
}

/// Blocked register layout, first block innermost.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    dtype: DType,
    blocks: SmallVec<[Block; 4]>,
}

impl Layout {
    pub fn new(dtype: DType) -> Self {
        Self { dtype, blocks: SmallVec::new() }
    }

    /// Dense layout over `tile`, dimensions in the given order, innermost first.
    pub fn dense(dtype: DType, tile: &Tile) -> Self {
        let mut layout = Self::new(dtype);
        for (d, &size) in tile.iter() {
            let stride = layout.elems();
            layout.add_block(d, size, stride);
        }
        layout
    }

    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Append an outer block.
    pub fn add_block(&mut self, dim: Dim, size: i64, stride: i64) {
        self.blocks.push(Block { dim, size, stride });
    }

    pub fn with_block(mut self, dim: Dim, size: i64, stride: i64) -> Self {
        self.add_block(dim, size, stride);
        self
    }

    pub fn elems(&self) -> i64 {
        self.blocks.iter().map(|b| b.size).product()
    }

    pub fn size_bytes(&self) -> i64 {
        (self.elems() * self.dtype.bits() as i64 + 7) / 8
    }

    /// Extent per dimension, in order of first appearance.
    pub fn dim_sizes(&self) -> Tile {
        let mut tile = Tile::new();
        for b in &self.blocks {
            let cur = tile.get(b.dim).copied().unwrap_or(1);
            tile.set(b.dim, cur * b.size);
        }
        tile
    }

    /// Stride of the innermost block of `dim`.
    pub fn stride(&self, dim: Dim) -> Option<i64> {
        self.blocks.iter().find(|b| b.dim == dim).map(|b| b.stride)
    }

    /// Element offset of `coord`. Each coordinate is split across the blocks
    /// of its dimension, the outermost block absorbing any remainder.
    pub fn offset_elems(&self, coord: &Coord) -> Result<i64> {
        let mut off = 0;
        for (dim, &c) in coord.iter() {
            let blocks: SmallVec<[&Block; 4]> = self.blocks.iter().filter(|b| b.dim == dim).collect();
            if blocks.is_empty() {
                ensure!(c == 0, MissingDimensionSnafu { dim });
                continue;
            }
            let mut rem = c;
            for (i, b) in blocks.iter().enumerate() {
                if i + 1 == blocks.len() {
                    off += rem * b.stride;
                } else {
                    off += rem.rem_euclid(b.size) * b.stride;
                    rem = rem.div_euclid(b.size);
                }
            }
        }
        Ok(off)
    }

    pub fn offset_in_bytes(&self, coord: &Coord) -> Result<i64> {
        Ok(self.offset_elems(coord)? * self.dtype.bits() as i64 / 8)
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.dtype)?;
        for b in &self.blocks {
            write!(f, " {}{}*{}", b.dim, b.size, b.stride)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tensors
// ============================================================================

/// Register buffer viewed through a layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub buffer: Expr,
    pub layout: Layout,
}

impl Tensor {
    pub fn new(buffer: Expr, layout: Layout) -> Self {
        Self { buffer, layout }
    }

    /// View of the region starting at `coord`, described by `layout`.
    pub fn sub_tensor(&self, layout: Layout, coord: &Coord) -> Result<Tensor> {
        let off = self.layout.offset_in_bytes(coord)?;
        Ok(Tensor { buffer: self.buffer.index(off), layout })
    }

    /// Register region at `coord`.
    pub fn at(&self, coord: &Coord) -> Result<Expr> {
        Ok(self.buffer.index(self.layout.offset_in_bytes(coord)?))
    }
}

/// Tile of a matrix in device memory.
///
/// `idxs` are the runtime origin of the tile, `strides` and `sizes` the
/// matrix strides and extents (all in elements).
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalTensor {
    pub buffer: Expr,
    pub dtype: DType,
    pub base_offset: Expr,
    pub idxs: DimMap<Expr>,
    pub strides: DimMap<Expr>,
    pub sizes: DimMap<Expr>,
    pub tile: Tile,
}

impl GlobalTensor {
    /// Element offset of `coord` relative to the tile origin:
    /// `base_offset + sum((idx[d] + coord[d]) * stride[d])`.
    pub fn offset(&self, coord: &Coord) -> Expr {
        let mut ret = self.base_offset.clone();
        for (d, stride) in self.strides.iter() {
            let Some(idx) = self.idxs.get(d) else { continue };
            let c = coord.get(d).copied().unwrap_or(0);
            ret = ret + (idx + c) * stride;
        }
        ret
    }

    pub fn offset_bytes(&self, coord: &Coord) -> Expr {
        self.offset(coord) * self.dtype.bytes() as i64
    }
}
