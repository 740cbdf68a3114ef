//! Interface setup and resource checks ahead of encoding.

use enumset::EnumSet;
use snafu::ensure;
use tessel_dtype::DType;
use tessel_ir::visit::walk;
use tessel_ir::{AllocKind, CompileCtx, KernelIface, Stmt};

use crate::error::*;
use crate::types::{ArgAccess, ArgKind, Capability, KernelArg, KernelManifest};

/// Local-id builtins every kernel requests.
pub const LOCAL_IDS: usize = 3;

/// What one pass over the body found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrScan {
    pub capabilities: EnumSet<Capability>,
    /// Sum of all SLM allocations.
    pub slm_bytes: i64,
    pub sends: usize,
    pub dpas: usize,
    pub mads: usize,
}

pub fn scan_ir(body: &Stmt) -> IrScan {
    let mut scan = IrScan::default();
    walk(body, &mut |s| match s {
        Stmt::Dpas(_) => {
            scan.dpas += 1;
            scan.capabilities |= Capability::Systolic;
        }
        Stmt::Mad(_) => scan.mads += 1,
        Stmt::Send(send) => {
            scan.sends += 1;
            if send.op.is_atomic() {
                scan.capabilities |= Capability::GlobalAtomics;
            }
        }
        Stmt::Barrier => scan.capabilities |= Capability::Barrier,
        Stmt::Alloc { kind: AllocKind::Slm, size, .. } => scan.slm_bytes += size,
        _ => {}
    });
    scan
}

/// Kernel arguments as the encoder sees them. Pointers are always passed as
/// stateless global addresses.
pub fn kernel_args(iface: &KernelIface) -> Vec<KernelArg> {
    iface
        .args()
        .iter()
        .map(|v| {
            let kind = match v.dtype() {
                DType::Ptr { mutable, .. } => ArgKind::GlobalPtr { access: ArgAccess::Stateless, mutable: *mutable },
                dtype => ArgKind::Scalar(dtype.clone()),
            };
            KernelArg { name: v.name().to_string(), kind }
        })
        .collect()
}

/// Build the manifest for `body` and check it against the hardware budget.
#[tracing::instrument(skip_all, fields(kernel = %ctx.kernel_name))]
pub fn setup_interface(ctx: &CompileCtx, body: &Stmt) -> Result<KernelManifest> {
    let scan = scan_ir(body);
    let hw = ctx.hw();
    let tg_size = ctx.thread_group_size;

    let limit = if tg_size > 0 {
        hw.max_slm_per_thread_group(tg_size, ctx.exec.is_large_grf())
    } else {
        hw.slm_per_thread_group_cap()
    };
    if scan.slm_bytes > limit {
        tracing::warn!(slm_bytes = scan.slm_bytes, limit, tg_size, "SLM budget exceeded");
    }
    ensure!(
        scan.slm_bytes <= limit,
        ResourceLimitExceededSnafu { slm_bytes: scan.slm_bytes, limit, thread_group_size: tg_size }
    );

    tracing::debug!(
        sends = scan.sends,
        dpas = scan.dpas,
        mads = scan.mads,
        slm_bytes = scan.slm_bytes,
        capabilities = ?scan.capabilities,
        "kernel resources"
    );

    Ok(KernelManifest {
        name: ctx.kernel_name.clone(),
        hw,
        args: kernel_args(&ctx.iface),
        local_ids: LOCAL_IDS,
        local_size: true,
        regs: ctx.exec.regs,
        simd: ctx.exec.simd,
        capabilities: scan.capabilities,
        slm_bytes: scan.slm_bytes,
        thread_group_size: tg_size,
    })
}
