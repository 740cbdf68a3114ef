//! GEMM strategy: tiling, transfer and pipelining choices for one kernel.

use bon::bon;
use tessel_ir::{CacheHint, Dim};

use crate::error::*;
use crate::transfer::{AccessType, Transform, plan_for};

/// How one operand is moved between memory and registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatrixStrategy {
    pub access: AccessType,
    /// Register tile rows, zero when unrestricted.
    pub tile_r: i64,
    pub cache_hint: CacheHint,
}

#[bon]
impl MatrixStrategy {
    #[builder]
    pub fn builder(
        #[builder(default)] access: AccessType,
        #[builder(default = 0)] tile_r: i64,
        #[builder(default)] cache_hint: CacheHint,
    ) -> Self {
        Self { access, tile_r, cache_hint }
    }

    /// Transfer plan for an operand whose memory dimensions are `dims`.
    pub fn plan(&self, dims: [Dim; 2], is_prefetch: bool) -> Result<Transform> {
        plan_for(self.access, self.tile_r, self.cache_hint, dims, is_prefetch)
    }
}

/// Kernel-wide strategy.
///
/// `unroll_*` are the per-thread tile sizes, `ka_*`/`kb_*` the reduction
/// extent moved by one load or prefetch, and `prefetch_a`/`prefetch_b` the
/// prefetch distances along the reduction dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmStrategy {
    pub unroll_m: i64,
    pub unroll_n: i64,
    pub unroll_k: i64,

    pub a: MatrixStrategy,
    pub b: MatrixStrategy,
    pub c: MatrixStrategy,
    pub a_prefetch: MatrixStrategy,
    pub b_prefetch: MatrixStrategy,

    pub ka_load: i64,
    pub kb_load: i64,
    pub ka_prefetch: i64,
    pub kb_prefetch: i64,
    pub prefetch_a: i64,
    pub prefetch_b: i64,
    pub a_copies: i64,
    pub b_copies: i64,

    pub systolic: bool,
    pub subgroup_size: u32,
    pub grfs: u32,
    /// Thread-group shape.
    pub wg: [i64; 3],
    pub fixed_wg: bool,

    pub k_parallel: bool,
    pub k_parallel_local: bool,
    pub persistent: bool,
    pub slm_a: bool,
    pub slm_b: bool,
}

#[bon]
impl GemmStrategy {
    /// Create a strategy with builder pattern.
    ///
    /// Load extents default to the K unroll, prefetches are off.
    #[builder]
    pub fn builder(
        unroll_m: i64,
        unroll_n: i64,
        unroll_k: i64,
        #[builder(default)] a: MatrixStrategy,
        #[builder(default)] b: MatrixStrategy,
        #[builder(default)] c: MatrixStrategy,
        #[builder(default)] a_prefetch: MatrixStrategy,
        #[builder(default)] b_prefetch: MatrixStrategy,
        ka_load: Option<i64>,
        kb_load: Option<i64>,
        #[builder(default = 0)] ka_prefetch: i64,
        #[builder(default = 0)] kb_prefetch: i64,
        #[builder(default = 0)] prefetch_a: i64,
        #[builder(default = 0)] prefetch_b: i64,
        #[builder(default = 1)] a_copies: i64,
        #[builder(default = 1)] b_copies: i64,
        #[builder(default = true)] systolic: bool,
        #[builder(default = 16)] subgroup_size: u32,
        #[builder(default = 128)] grfs: u32,
        #[builder(default = [1, 1, 1])] wg: [i64; 3],
        #[builder(default = false)] fixed_wg: bool,
        #[builder(default = false)] k_parallel: bool,
        #[builder(default = false)] k_parallel_local: bool,
        #[builder(default = false)] persistent: bool,
        #[builder(default = false)] slm_a: bool,
        #[builder(default = false)] slm_b: bool,
    ) -> Self {
        Self {
            unroll_m,
            unroll_n,
            unroll_k,
            a,
            b,
            c,
            a_prefetch,
            b_prefetch,
            ka_load: ka_load.unwrap_or(unroll_k),
            kb_load: kb_load.unwrap_or(unroll_k),
            ka_prefetch,
            kb_prefetch,
            prefetch_a,
            prefetch_b,
            a_copies,
            b_copies,
            systolic,
            subgroup_size,
            grfs,
            wg,
            fixed_wg,
            k_parallel,
            k_parallel_local,
            persistent,
            slm_a,
            slm_b,
        }
    }

    /// Thread-group size when fixed at compile time.
    pub fn fixed_thread_group_size(&self) -> Option<i64> {
        self.fixed_wg.then(|| self.wg.iter().product())
    }

    /// Prefetch distance of A rounded down to whole prefetch tiles.
    pub fn effective_prefetch_a(&self) -> i64 {
        round_prefetch("A", self.prefetch_a, self.ka_prefetch)
    }

    pub fn effective_prefetch_b(&self) -> i64 {
        round_prefetch("B", self.prefetch_b, self.kb_prefetch)
    }
}

fn round_prefetch(operand: &str, distance: i64, k_prefetch: i64) -> i64 {
    if distance <= 0 {
        return 0;
    }
    let rounded = if k_prefetch > 0 { distance / k_prefetch * k_prefetch } else { 0 };
    if rounded != distance {
        tracing::warn!(operand, requested = distance, used = rounded, "partial tile prefetch is unimplemented");
    }
    rounded
}
