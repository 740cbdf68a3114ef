//! Software-pipelined reduction loop.
//!
//! The loop over K is split into three phases:
//!
//! - **Prologue**: steps `-warmup..0`, issuing the prefetches and loads that
//!   must be in flight before the first multiply.
//! - **Steady state**: a runtime `while` over unrolled blocks of `k_blk`,
//!   every stage active, followed by advancing `k_idx`.
//! - **Drain**: steps `0..round_up(warmup, k_blk)`, computing what is already
//!   in registers and issuing only the transfers that are still in range.
//!
//! Loads rotate through `copies` register buffers per operand so a load for
//! step `s + distance` never overwrites the slot that step `s` reads.

use itertools::Itertools;
use snafu::ensure;
use tessel_ir::error::TileNotDivisibleSnafu;
use tessel_ir::{Builder, Coord, DType, Dim, DimMap, Expr, GlobalTensor, Layout, Tensor, Tile, Var};

use super::mma::{MmaOperands, mma};
use crate::error::*;
use crate::transfer::{Transform, load, prefetch};

// ============================================================================
// Trace
// ============================================================================

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Prologue,
    Steady,
    Drain,
}

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    PrefetchA,
    PrefetchB,
    LoadA,
    LoadB,
    Mma,
}

/// One issued stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub phase: Phase,
    pub stage: Stage,
    /// Unroll step relative to `k_idx`.
    pub step: i64,
    /// Reduction offset the stage works on, relative to `k_idx`.
    pub offset: i64,
    /// Copy slot written (loads) or read (A operand of the multiply).
    pub slot: i64,
}

/// Record of every stage issued while building one k-loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineTrace {
    pub k_blk: i64,
    pub warmup: i64,
    pub k_unroll_blk: i64,
    entries: Vec<TraceEntry>,
}

impl PipelineTrace {
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Number of issues of `stage`, optionally restricted to one phase.
    pub fn count(&self, stage: Stage, phase: Option<Phase>) -> usize {
        self.entries.iter().filter(|e| e.stage == stage && phase.is_none_or(|p| e.phase == p)).count()
    }

    /// Trips of the steady-state loop for a reduction of length `k`.
    pub fn steady_iterations(&self, k: i64) -> i64 {
        if k <= self.warmup || self.k_blk <= 0 { 0 } else { (k - self.warmup + self.k_blk - 1) / self.k_blk }
    }

    /// Absolute reduction offsets `stage` touches at runtime for length `k`,
    /// sorted.
    pub fn positions(&self, stage: Stage, k: i64) -> Vec<i64> {
        let iters = self.steady_iterations(k);
        let k_blk = self.k_blk;
        self.entries
            .iter()
            .filter(|e| e.stage == stage)
            .flat_map(|e| {
                let (first, trips) = match e.phase {
                    Phase::Prologue => (e.offset, 1),
                    Phase::Steady => (e.offset, iters),
                    Phase::Drain => (iters * k_blk + e.offset, 1),
                };
                (0..trips).map(move |i| first + i * k_blk)
            })
            .sorted_unstable()
            .collect()
    }

    fn record(&mut self, entry: TraceEntry) {
        tracing::trace!(phase = %entry.phase, stage = %entry.stage, step = entry.step, slot = entry.slot, "issue");
        self.entries.push(entry);
    }
}

// ============================================================================
// Iterator
// ============================================================================

/// Memory operand as passed to the kernel.
#[derive(Debug, Clone)]
pub struct GlobalOperand {
    pub buffer: Expr,
    /// Element offset of the matrix inside `buffer`.
    pub offset: Expr,
    pub dtype: DType,
    pub strides: DimMap<Expr>,
}

/// Runtime problem extents.
#[derive(Debug, Clone)]
pub struct LoopBounds {
    pub m: Expr,
    pub n: Expr,
    pub k: Expr,
}

/// Static tiling of the iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IteratorTiling {
    pub m_blk: i64,
    pub n_blk: i64,
    pub ka_prefetch: i64,
    pub ka_load: i64,
    pub kb_prefetch: i64,
    pub kb_load: i64,
    /// Dimension the SIMD lanes of a subgroup are spread over.
    pub subgroup_dim: Dim,
    pub subgroup_size: i64,
}

/// Tracks the tile origin of one thread and the reduction cursors of every
/// stage. Stage cursors are kept relative to `k_idx`.
#[derive(Debug, Clone)]
pub struct KLoopIterator {
    bounds: LoopBounds,
    m_idx: Expr,
    n_idx: Expr,
    k_idx: Var,

    prefetch_a: i64,
    prefetch_b: i64,
    load_a: i64,
    load_b: i64,

    a_prefetch: GlobalTensor,
    a_load: GlobalTensor,
    b_prefetch: GlobalTensor,
    b_load: GlobalTensor,
    c_store: GlobalTensor,
}

impl KLoopIterator {
    /// Bind the thread's tile origin and the reduction index, and register
    /// what is known about them.
    #[tracing::instrument(skip_all, fields(m_blk = tiling.m_blk, n_blk = tiling.n_blk))]
    pub fn new(
        b: &mut Builder,
        bounds: LoopBounds,
        [a, bo, c]: [&GlobalOperand; 3],
        tiling: &IteratorTiling,
    ) -> Result<Self> {
        let [tg0, tg1, _] = b.group_ids()?;
        let [lid0, lid1, _] = b.local_ids()?;
        let [ls0, ls1, _] = b.local_sizes()?;

        let per_lane = |dim: Dim, blk: i64| -> Result<i64> {
            let lanes = if tiling.subgroup_dim == dim { tiling.subgroup_size.max(1) } else { 1 };
            ensure!(blk % lanes == 0, TileNotDivisibleSnafu { dim, size: blk, step: lanes });
            Ok(blk / lanes)
        };
        let m_step = per_lane(Dim::M, tiling.m_blk)?;
        let n_step = per_lane(Dim::N, tiling.n_blk)?;
        let m_idx = b.let_("m_idx", (&tg0 * &ls0 + &lid0) * m_step)?.expr();
        let n_idx = b.let_("n_idx", (&tg1 * &ls1 + &lid1) * n_step)?.expr();
        let k_idx = b.def(DType::S32, "k_idx", Some(Expr::int(0)), false)?;

        b.assume((&m_idx % tiling.m_blk).eq_(0));
        b.assume((&n_idx % tiling.n_blk).eq_(0));
        b.assume(m_idx.ge(0));
        b.assume(n_idx.ge(0));
        b.assume(k_idx.expr().ge(0));

        let k = k_idx.expr();
        let LoopBounds { m, n, k: k_size } = &bounds;
        let a_idxs = DimMap::from([(Dim::M, m_idx.clone()), (Dim::K, k.clone())]);
        let a_sizes = DimMap::from([(Dim::M, m.clone()), (Dim::K, k_size.clone())]);
        let b_idxs = DimMap::from([(Dim::K, k.clone()), (Dim::N, n_idx.clone())]);
        let b_sizes = DimMap::from([(Dim::K, k_size.clone()), (Dim::N, n.clone())]);
        let c_idxs = DimMap::from([(Dim::M, m_idx.clone()), (Dim::N, n_idx.clone())]);
        let c_sizes = DimMap::from([(Dim::M, m.clone()), (Dim::N, n.clone())]);

        let a_tile = |kb| Tile::from([(Dim::M, tiling.m_blk), (Dim::K, kb)]);
        let b_tile = |kb| Tile::from([(Dim::K, kb), (Dim::N, tiling.n_blk)]);
        let c_tile = Tile::from([(Dim::M, tiling.m_blk), (Dim::N, tiling.n_blk)]);

        Ok(Self {
            a_prefetch: global(a, a_idxs.clone(), a_sizes.clone(), a_tile(tiling.ka_prefetch)),
            a_load: global(a, a_idxs, a_sizes, a_tile(tiling.ka_load)),
            b_prefetch: global(bo, b_idxs.clone(), b_sizes.clone(), b_tile(tiling.kb_prefetch)),
            b_load: global(bo, b_idxs, b_sizes, b_tile(tiling.kb_load)),
            c_store: global(c, c_idxs, c_sizes, c_tile),
            bounds,
            m_idx,
            n_idx,
            k_idx,
            prefetch_a: 0,
            prefetch_b: 0,
            load_a: 0,
            load_b: 0,
        })
    }

    pub fn m_idx(&self) -> &Expr {
        &self.m_idx
    }

    pub fn n_idx(&self) -> &Expr {
        &self.n_idx
    }

    pub fn k_idx(&self) -> &Var {
        &self.k_idx
    }

    pub fn a_prefetch(&self) -> &GlobalTensor {
        &self.a_prefetch
    }

    pub fn a_load(&self) -> &GlobalTensor {
        &self.a_load
    }

    pub fn b_prefetch(&self) -> &GlobalTensor {
        &self.b_prefetch
    }

    pub fn b_load(&self) -> &GlobalTensor {
        &self.b_load
    }

    pub fn c_store(&self) -> &GlobalTensor {
        &self.c_store
    }

    /// Cursor of a transfer stage relative to `k_idx`.
    pub fn cursor(&self, stage: Stage) -> i64 {
        match stage {
            Stage::PrefetchA => self.prefetch_a,
            Stage::PrefetchB => self.prefetch_b,
            Stage::LoadA => self.load_a,
            Stage::LoadB => self.load_b,
            Stage::Mma => 0,
        }
    }

    pub fn inc_prefetch_a(&mut self, k_block: i64) {
        self.prefetch_a += k_block;
        set_k(&mut self.a_prefetch, &self.k_idx, self.prefetch_a);
    }

    pub fn inc_prefetch_b(&mut self, k_block: i64) {
        self.prefetch_b += k_block;
        set_k(&mut self.b_prefetch, &self.k_idx, self.prefetch_b);
    }

    pub fn inc_load_a(&mut self, k_block: i64) {
        self.load_a += k_block;
        set_k(&mut self.a_load, &self.k_idx, self.load_a);
    }

    pub fn inc_load_b(&mut self, k_block: i64) {
        self.load_b += k_block;
        set_k(&mut self.b_load, &self.k_idx, self.load_b);
    }

    /// Advance `k_idx` by `k_block` at runtime. Stage cursors are relative, so
    /// they move back by the same amount.
    pub fn inc_kloop(&mut self, b: &mut Builder, k_block: i64) -> tessel_ir::Result<()> {
        self.inc_prefetch_a(-k_block);
        self.inc_prefetch_b(-k_block);
        self.inc_load_a(-k_block);
        self.inc_load_b(-k_block);
        b.assign(&self.k_idx, self.k_idx.expr() + k_block)
    }

    /// `m_idx < m && n_idx < n && k_idx < k - increment`
    pub fn is_inbounds(&self, increment: i64) -> Expr {
        self.m_idx.lt(&self.bounds.m) & self.n_idx.lt(&self.bounds.n) & self.k_idx.expr().lt(&self.bounds.k - increment)
    }

    fn advance(&mut self, stage: Stage, k_block: i64) {
        match stage {
            Stage::PrefetchA => self.inc_prefetch_a(k_block),
            Stage::PrefetchB => self.inc_prefetch_b(k_block),
            Stage::LoadA => self.inc_load_a(k_block),
            Stage::LoadB => self.inc_load_b(k_block),
            Stage::Mma => {}
        }
    }
}

fn global(op: &GlobalOperand, idxs: DimMap<Expr>, sizes: DimMap<Expr>, tile: Tile) -> GlobalTensor {
    GlobalTensor {
        buffer: op.buffer.clone(),
        dtype: op.dtype.clone(),
        base_offset: op.offset.clone(),
        idxs,
        strides: op.strides.clone(),
        sizes,
        tile,
    }
}

fn set_k(g: &mut GlobalTensor, k_idx: &Var, offset: i64) {
    g.idxs.set(Dim::K, k_idx.expr() + offset);
}

// ============================================================================
// Configuration
// ============================================================================

/// Register side of one loaded operand.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorConfig {
    /// Layout of a single copy.
    pub layout: Layout,
    pub tile: Tile,
    /// All copies, stacked along K.
    pub copy_layout: Layout,
    pub copy_tile: Tile,
    pub transform: Transform,
}

impl TensorConfig {
    pub fn new(g: &GlobalTensor, transform: Transform, copies: i64) -> Result<Self> {
        ensure!(copies >= 1, PipelineMisconfiguredSnafu { reason: format!("copy count {copies} must be positive") });
        let layout = transform.layout(&g.tile, &g.dtype)?;
        let tile = g.tile.clone();
        let copy_layout = layout.clone().with_block(Dim::K, copies, layout.elems());
        let copy_tile = tile.clone().with(Dim::K, tile.get_or_default(Dim::K) * copies);
        Ok(Self { layout, tile, copy_layout, copy_tile, transform })
    }

    pub fn tile_k(&self) -> i64 {
        self.tile.get_or_default(Dim::K)
    }

    /// Reduction extent held by all copies.
    pub fn copy_k(&self) -> i64 {
        self.copy_tile.get_or_default(Dim::K)
    }

    /// How far ahead of compute this operand is loaded.
    pub fn warmup(&self) -> i64 {
        self.copy_k() - self.tile_k()
    }
}

/// One k-loop variant.
#[derive(Debug, Clone)]
pub struct KLoopConfig {
    /// Steady-state unroll.
    pub k_blk: i64,
    /// Prefetch distances, zero when prefetching is off.
    pub warmup_prefetch_a: i64,
    pub warmup_prefetch_b: i64,
    pub a_load: TensorConfig,
    pub b_load: TensorConfig,
    pub a_prefetch: Transform,
    pub b_prefetch: Transform,
    pub c: Tensor,
}

impl KLoopConfig {
    pub fn warmup_load_a(&self) -> i64 {
        self.a_load.warmup()
    }

    pub fn warmup_load_b(&self) -> i64 {
        self.b_load.warmup()
    }

    /// Longest distance any stage runs ahead of compute.
    pub fn warmup_k(&self) -> i64 {
        self.warmup_load_a().max(self.warmup_load_b()).max(self.warmup_prefetch_a).max(self.warmup_prefetch_b)
    }
}

// ============================================================================
// Loop construction
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct StageSpec {
    stage: Stage,
    /// Reduction extent per issue, zero when the stage is off.
    blk: i64,
    distance: i64,
    /// Slot rotation period.
    period: i64,
}

struct Pipeline<'a> {
    cfg: &'a KLoopConfig,
    it: KLoopIterator,
    a: Tensor,
    b: Tensor,
    systolic: bool,
    mma_k: i64,
    stages: [StageSpec; 4],
    trace: PipelineTrace,
}

/// Emit one k-loop variant and return what was issued.
#[tracing::instrument(skip_all, fields(k_blk = cfg.k_blk, warmup = cfg.warmup_k()))]
pub fn build_k_loop(b: &mut Builder, cfg: &KLoopConfig, it: &KLoopIterator, systolic: bool) -> Result<PipelineTrace> {
    let mut p = Pipeline::new(b, cfg, it.clone(), systolic)?;
    let k_blk = cfg.k_blk;
    let warmup = p.trace.warmup;
    let unroll = p.trace.k_unroll_blk as usize;

    for step in (-warmup..0).step_by(unroll) {
        p.body(b, Phase::Prologue, step, |s| step + s.distance >= 0, false)?;
    }

    let cond = p.it.is_inbounds(warmup);
    b.while_(cond, |b| {
        for step in (0..k_blk).step_by(unroll) {
            p.body(b, Phase::Steady, step, |_| true, true)?;
        }
        Ok::<_, Error>(p.it.inc_kloop(b, k_blk)?)
    })?;

    let tail_end = round_up(warmup, k_blk);
    for step in (0..tail_end).step_by(unroll) {
        p.body(b, Phase::Drain, step, |s| step + s.distance < tail_end, true)?;
    }

    tracing::debug!(issued = p.trace.entries().len(), tail_end, "k-loop built");
    Ok(p.trace)
}

impl<'a> Pipeline<'a> {
    fn new(bld: &mut Builder, cfg: &'a KLoopConfig, it: KLoopIterator, systolic: bool) -> Result<Self> {
        let misconfigured = |reason: String| PipelineMisconfiguredSnafu { reason }.build();

        let (tile_a, tile_b) = (cfg.a_load.tile_k(), cfg.b_load.tile_k());
        if tile_a <= 0 || tile_b <= 0 {
            return Err(misconfigured(format!("load tiles need a K extent, got A {tile_a} and B {tile_b}")));
        }
        let mma_k = tile_a.min(tile_b);
        if tile_a % mma_k != 0 || tile_b % mma_k != 0 {
            return Err(misconfigured(format!("K tiles {tile_a} and {tile_b} do not share a multiply block")));
        }

        let k_blk = cfg.k_blk;
        for (name, copy_k) in [("A", cfg.a_load.copy_k()), ("B", cfg.b_load.copy_k())] {
            if k_blk <= 0 || k_blk % copy_k != 0 {
                let reason = format!("k_blk {k_blk} is not a multiple of the {name} copy depth {copy_k}");
                return Err(misconfigured(reason));
            }
        }

        let prefetch_blk = |name: &str, distance: i64, g: &GlobalTensor| -> Result<i64> {
            if distance == 0 {
                return Ok(0);
            }
            let blk = g.tile.get_or_default(Dim::K);
            if blk <= 0 || k_blk % blk != 0 || distance % blk != 0 {
                return Err(misconfigured(format!(
                    "{name} prefetch block {blk} must divide k_blk {k_blk} and the distance {distance}"
                )));
            }
            Ok(blk)
        };
        let pf_a = prefetch_blk("A", cfg.warmup_prefetch_a, it.a_prefetch())?;
        let pf_b = prefetch_blk("B", cfg.warmup_prefetch_b, it.b_prefetch())?;

        let stages = [
            StageSpec { stage: Stage::PrefetchA, blk: pf_a, distance: cfg.warmup_prefetch_a, period: pf_a },
            StageSpec { stage: Stage::PrefetchB, blk: pf_b, distance: cfg.warmup_prefetch_b, period: pf_b },
            StageSpec { stage: Stage::LoadA, blk: tile_a, distance: cfg.warmup_load_a(), period: cfg.a_load.copy_k() },
            StageSpec { stage: Stage::LoadB, blk: tile_b, distance: cfg.warmup_load_b(), period: cfg.b_load.copy_k() },
        ];
        let k_unroll_blk = stages.iter().fold(k_blk, |acc, s| gcd(acc, s.blk));

        let a = bld.def_tensor(cfg.a_load.copy_layout.clone(), "A_blk", None)?;
        let b = bld.def_tensor(cfg.b_load.copy_layout.clone(), "B_blk", None)?;
        tracing::debug!(a = %a.layout, b = %b.layout, mma_k, k_unroll_blk, "operand buffers");

        let trace = PipelineTrace { k_blk, warmup: cfg.warmup_k(), k_unroll_blk, entries: Vec::new() };
        Ok(Self { cfg, it, a, b, systolic, mma_k, stages, trace })
    }

    /// Everything issued at one unroll step.
    fn body(
        &mut self,
        b: &mut Builder,
        phase: Phase,
        step: i64,
        enabled: impl Fn(&StageSpec) -> bool,
        compute: bool,
    ) -> Result<()> {
        for spec in self.stages {
            if spec.blk > 0 && enabled(&spec) {
                self.issue(b, phase, spec, step)?;
            }
        }
        if compute && step.rem_euclid(self.mma_k) == 0 {
            self.compute(b, phase, step)?;
        }
        Ok(())
    }

    fn issue(&mut self, b: &mut Builder, phase: Phase, spec: StageSpec, step: i64) -> Result<()> {
        let slot = (step + spec.distance).rem_euclid(spec.period);
        if slot % spec.blk != 0 {
            return Ok(());
        }
        let origin = Coord::new();
        match spec.stage {
            Stage::PrefetchA => prefetch(b, self.it.a_prefetch(), &self.cfg.a_prefetch, &origin)?,
            Stage::PrefetchB => prefetch(b, self.it.b_prefetch(), &self.cfg.b_prefetch, &origin)?,
            Stage::LoadA => {
                let dst = self.a.sub_tensor(self.cfg.a_load.layout.clone(), &Coord::from([(Dim::K, slot)]))?;
                load(b, &dst, self.it.a_load(), &self.cfg.a_load.transform, &origin)?;
            }
            Stage::LoadB => {
                let dst = self.b.sub_tensor(self.cfg.b_load.layout.clone(), &Coord::from([(Dim::K, slot)]))?;
                load(b, &dst, self.it.b_load(), &self.cfg.b_load.transform, &origin)?;
            }
            Stage::Mma => return Ok(()),
        }
        self.it.advance(spec.stage, spec.blk);
        self.trace.record(TraceEntry { phase, stage: spec.stage, step, offset: step + spec.distance, slot });
        Ok(())
    }

    fn compute(&mut self, b: &mut Builder, phase: Phase, step: i64) -> Result<()> {
        let a_slot = step.rem_euclid(self.cfg.a_load.copy_k());
        let b_slot = step.rem_euclid(self.cfg.b_load.copy_k());
        let tile = self.cfg.c.layout.dim_sizes().with(Dim::K, self.mma_k);
        let ops = MmaOperands {
            c: &self.cfg.c,
            a: &self.a,
            b: &self.b,
            a_base: Coord::from([(Dim::K, a_slot)]),
            b_base: Coord::from([(Dim::K, b_slot)]),
        };
        mma(b, &ops, &tile, self.systolic)?;
        self.trace.record(TraceEntry { phase, stage: Stage::Mma, step, offset: step, slot: a_slot });
        Ok(())
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a.abs() } else { gcd(b, a % b) }
}

pub(crate) fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 { 0 } else { (a / gcd(a, b) * b).abs() }
}

fn round_up(x: i64, to: i64) -> i64 {
    if to <= 0 { x } else { (x + to - 1).div_euclid(to) * to }
}
