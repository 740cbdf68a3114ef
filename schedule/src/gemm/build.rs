//! GEMM kernel construction.

use tessel_ir::{
    AddrSpace, Builder, CompileCtx, ConstraintSet, Coord, DimMap, ExecConfig, Expr, Hw, KernelIface, ScalarDType,
    Stmt, Tile,
};
use tessel_ir::{DType, Dim};

use super::kloop::{
    GlobalOperand, IteratorTiling, KLoopConfig, KLoopIterator, LoopBounds, PipelineTrace, TensorConfig, build_k_loop,
    lcm,
};
use super::problem::{GemmProblem, MatrixAddressing};
use super::strategy::GemmStrategy;
use crate::config::BuildConfig;
use crate::error::*;
use crate::symbolic::simplify;
use crate::transfer::plan::MIN_PITCH_2D;
use crate::transfer::store;

pub const KERNEL_NAME: &str = "gemm_kernel";

/// Everything needed to build one GEMM kernel.
#[derive(Debug, Clone)]
pub struct GemmIrDesc {
    pub problem: GemmProblem,
    pub strategy: GemmStrategy,
    pub hw: Hw,
    iface: KernelIface,
}

impl GemmIrDesc {
    /// Descriptor with the standard GEMM argument list.
    pub fn new(problem: GemmProblem, strategy: GemmStrategy, hw: Hw) -> Self {
        let iface = standard_iface(&problem);
        Self { problem, strategy, hw, iface }
    }

    /// Replace the kernel interface. It must still provide every standard argument.
    pub fn with_iface(mut self, iface: KernelIface) -> Self {
        self.iface = iface;
        self
    }

    pub fn kernel_name(&self) -> &'static str {
        KERNEL_NAME
    }

    pub fn kernel_iface(&self) -> &KernelIface {
        &self.iface
    }

    pub fn exec_config(&self) -> ExecConfig {
        ExecConfig::new(self.hw, self.strategy.grfs, self.strategy.subgroup_size)
    }

    pub fn compile_ctx(&self) -> CompileCtx {
        let tg_size = self.strategy.fixed_thread_group_size().unwrap_or(0);
        CompileCtx::new(self.kernel_name(), self.iface.clone(), self.exec_config(), tg_size)
    }
}

/// `A, B, C, offset_A, offset_B, offset_C, lda, ldb, ldc, m, n, k`
pub fn standard_iface(problem: &GemmProblem) -> KernelIface {
    let ptr = |t: &DType| DType::Scalar(t.base()).ptr(AddrSpace::Global);
    KernelIface::new()
        .with_arg("A", ptr(&problem.ta_ext))
        .with_arg("B", ptr(&problem.tb_ext))
        .with_arg("C", ptr(&problem.tc_ext).with_mut())
        .with_arg("offset_A", DType::Scalar(ScalarDType::S64))
        .with_arg("offset_B", DType::Scalar(ScalarDType::S64))
        .with_arg("offset_C", DType::Scalar(ScalarDType::S64))
        .with_arg("lda", DType::S32)
        .with_arg("ldb", DType::S32)
        .with_arg("ldc", DType::S32)
        .with_arg("m", DType::S32)
        .with_arg("n", DType::S32)
        .with_arg("k", DType::S32)
}

/// Result of a full build.
#[derive(Debug, Clone)]
pub struct GemmBuild {
    pub body: Stmt,
    /// Caller constraints plus everything assumed while building.
    pub constraints: ConstraintSet,
    /// Issue trace of the main (pipelined) k-loop.
    pub main: PipelineTrace,
    /// Issue trace of the short k-loop used when `k` is below the main warmup.
    pub short: PipelineTrace,
}

/// Build and simplify the kernel body.
pub fn build_ir(desc: &GemmIrDesc, cset: ConstraintSet) -> Result<Stmt> {
    Ok(build_ir_with(desc, cset, &BuildConfig::from_env())?.body)
}

#[tracing::instrument(skip_all, fields(kernel = desc.kernel_name(), hw = %desc.hw))]
pub fn build_ir_with(desc: &GemmIrDesc, cset: ConstraintSet, config: &BuildConfig) -> Result<GemmBuild> {
    let mut build = emit_kernel(desc, cset)?;
    config.trace_pass("build gemm_ir", &build.body);

    if config.simplify {
        build.body = simplify(&build.body, &build.constraints);
        config.trace_pass("simplify", &build.body);
    }
    Ok(build)
}

/// Reject strategies the builder has no implementation for.
pub fn check_supported(desc: &GemmIrDesc) -> Result<()> {
    let (problem, strategy) = (&desc.problem, &desc.strategy);
    let unsupported = |feature: &str| {
        tracing::warn!(feature, "unsupported strategy");
        UnsupportedSnafu { feature }.fail()
    };

    if strategy.k_parallel || strategy.k_parallel_local {
        return unsupported("k-parallel");
    }
    if strategy.persistent {
        return unsupported("persistent loop");
    }
    if strategy.slm_a || strategy.slm_b {
        tracing::warn!(slm_a = strategy.slm_a, slm_b = strategy.slm_b, "SLM copies are unimplemented, ignoring");
    }
    if problem.has_type_conversion() {
        return unsupported("type conversion");
    }
    if strategy.systolic && !desc.hw.has_systolic() {
        return unsupported("systolic multiply");
    }
    Ok(())
}

fn emit_kernel(desc: &GemmIrDesc, cset: ConstraintSet) -> Result<GemmBuild> {
    check_supported(desc)?;
    let (problem, strategy) = (&desc.problem, &desc.strategy);

    let mut b = Builder::new();
    b.declare_kernel(desc.kernel_iface().clone(), desc.exec_config(), cset)?;

    let bounds = LoopBounds { m: b.arg("m")?, n: b.arg("n")?, k: b.arg("k")? };
    let (m_blk, n_blk) = (strategy.unroll_m, strategy.unroll_n);

    let (a_dims, b_dims, c_dims) = (problem.a_dims(), problem.b_dims(), problem.c_dims());
    let a_prefetch_plan = strategy.a_prefetch.plan(a_dims, true)?;
    let a_load_plan = strategy.a.plan(a_dims, false)?;
    let b_prefetch_plan = strategy.b_prefetch.plan(b_dims, true)?;
    let b_load_plan = strategy.b.plan(b_dims, false)?;
    let c_plan = strategy.c.plan(c_dims, false)?;

    let c_layout = c_plan.layout(&Tile::from([(Dim::M, m_blk), (Dim::N, n_blk)]), &problem.tc)?;
    let c = b.def_tensor(c_layout, "C_blk", Some(Expr::int(0)))?;

    let a_op = operand(&b, "A", "offset_A", "lda", &problem.ta_ext, a_dims)?;
    let b_op = operand(&b, "B", "offset_B", "ldb", &problem.tb_ext, b_dims)?;
    let c_op = operand(&b, "C", "offset_C", "ldc", &problem.tc_ext, c_dims)?;

    let tiling = IteratorTiling {
        m_blk,
        n_blk,
        ka_prefetch: strategy.ka_prefetch,
        ka_load: strategy.ka_load,
        kb_prefetch: strategy.kb_prefetch,
        kb_load: strategy.kb_load,
        subgroup_dim: c.layout.blocks().first().map_or(Dim::M, |blk| blk.dim),
        subgroup_size: strategy.subgroup_size as i64,
    };
    let it = KLoopIterator::new(&mut b, bounds.clone(), [&a_op, &b_op, &c_op], &tiling)?;

    let main = KLoopConfig {
        k_blk: strategy.unroll_k,
        warmup_prefetch_a: strategy.effective_prefetch_a(),
        warmup_prefetch_b: strategy.effective_prefetch_b(),
        a_load: TensorConfig::new(it.a_load(), a_load_plan, strategy.a_copies)?,
        b_load: TensorConfig::new(it.b_load(), b_load_plan, strategy.b_copies)?,
        a_prefetch: a_prefetch_plan,
        b_prefetch: b_prefetch_plan,
        c: c.clone(),
    };
    let short_a = TensorConfig::new(it.a_load(), a_load_plan, 1)?;
    let short_b = TensorConfig::new(it.b_load(), b_load_plan, 1)?;
    let short = KLoopConfig {
        k_blk: lcm(short_a.tile_k(), short_b.tile_k()),
        warmup_prefetch_a: 0,
        warmup_prefetch_b: 0,
        a_load: short_a,
        b_load: short_b,
        a_prefetch: a_prefetch_plan,
        b_prefetch: b_prefetch_plan,
        c: c.clone(),
    };

    assume_strides(&mut b, problem)?;

    let warmup_main = main.warmup_k();
    tracing::debug!(warmup_main, k_blk_main = main.k_blk, k_blk_short = short.k_blk, "k-loop variants");

    let systolic = strategy.systolic;
    let mut main_trace = PipelineTrace::default();
    let mut short_trace = PipelineTrace::default();
    b.if_(it.is_inbounds(0), |b| {
        b.if_else(
            bounds.k.ge(warmup_main),
            |b| {
                main_trace = build_k_loop(b, &main, &it, systolic)?;
                Ok::<_, Error>(())
            },
            |b| {
                short_trace = build_k_loop(b, &short, &it, systolic)?;
                Ok(())
            },
        )?;
        store(b, it.c_store(), &c, &c_plan, &Coord::new())
    })?;

    let body = b.end_kernel()?;
    Ok(GemmBuild { body, constraints: b.into_constraints(), main: main_trace, short: short_trace })
}

fn operand(b: &Builder, buffer: &str, offset: &str, ld: &str, dtype: &DType, dims: [Dim; 2]) -> Result<GlobalOperand> {
    Ok(GlobalOperand {
        buffer: b.arg(buffer)?,
        offset: b.arg(offset)?,
        dtype: dtype.clone(),
        strides: DimMap::from([(dims[0], Expr::int(1)), (dims[1], b.arg(ld)?)]),
    })
}

/// Leading dimensions are multiples of the known alignment and wide enough
/// for 2D messages.
fn assume_strides(b: &mut Builder, problem: &GemmProblem) -> Result<()> {
    let operands: [(&str, &MatrixAddressing, &DType); 3] =
        [("lda", &problem.a, &problem.ta_ext), ("ldb", &problem.b, &problem.tb_ext), ("ldc", &problem.c, &problem.tc_ext)];
    for (name, addressing, dtype) in operands {
        let size = dtype.bytes().max(1) as i64;
        let ld = b.arg(name)?;
        let align_elems = addressing.alignment / size;
        if align_elems > 0 {
            b.assume((&ld % align_elems).eq_(0));
        }
        b.assume(ld.ge(MIN_PITCH_2D / size));
    }
    Ok(())
}
