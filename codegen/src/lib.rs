//! Lowering handoff for Tessel kernels.
//!
//! Packages a finished kernel body for a native encoder: the kernel
//! interface, builtins, register budget and capability flags, plus a check of
//! the shared local memory budget.
//!
//! # Architecture
//!
//! - **Handoff**: [`setup_interface`] scans the body once and builds the
//!   [`KernelManifest`]
//! - **Traits**: Backend-agnostic [`Encoder`] interface
//! - **Listing**: Reference encoder emitting a textual listing
//!
//! # Usage
//!
//! ```ignore
//! use tessel_codegen::{ListingEncoder, compile_gemm};
//!
//! let kernel = compile_gemm(&desc)?;
//! let image = kernel.encode(&ListingEncoder::new())?;
//! ```

pub mod error;
pub mod handoff;
pub mod listing;
pub mod traits;
pub mod types;


use tessel_ir::{CompileCtx, ConstraintSet, Stmt};
use tessel_schedule::gemm::{GemmIrDesc, build_ir_with};
use tessel_schedule::BuildConfig;

pub use error::*;
pub use handoff::{IrScan, scan_ir, setup_interface};
pub use listing::ListingEncoder;
pub use traits::*;
pub use types::*;

/// Set up the interface of `body` and encode it.
#[tracing::instrument(skip_all, fields(kernel = %ctx.kernel_name, backend = encoder.backend_name()))]
pub fn lower_ir(body: &Stmt, ctx: &CompileCtx, encoder: &dyn Encoder) -> Result<KernelImage> {
    let manifest = setup_interface(ctx, body)?;
    encode(body, &manifest, encoder)
}

fn encode(body: &Stmt, manifest: &KernelManifest, encoder: &dyn Encoder) -> Result<KernelImage> {
    let missing = manifest.capabilities - encoder.capabilities();
    if let Some(capability) = missing.iter().next() {
        tracing::warn!(%capability, backend = encoder.backend_name(), "capability not encodable");
        return UnsupportedCapabilitySnafu { backend: encoder.backend_name(), capability }.fail();
    }
    encoder.encode(body, manifest)
}

/// Built, simplified and checked GEMM kernel, ready for an encoder.
#[derive(Debug, Clone)]
pub struct GemmKernel {
    pub body: Stmt,
    pub manifest: KernelManifest,
    pub ctx: CompileCtx,
    /// Everything known about the kernel's arguments after the build.
    pub constraints: ConstraintSet,
}

impl GemmKernel {
    pub fn encode(&self, encoder: &dyn Encoder) -> Result<KernelImage> {
        encode(&self.body, &self.manifest, encoder)
    }
}

/// Build, simplify and set up a GEMM kernel with no prior knowledge of its
/// arguments.
pub fn compile_gemm(desc: &GemmIrDesc) -> Result<GemmKernel> {
    compile_gemm_with(desc, ConstraintSet::new(), &BuildConfig::from_env())
}

#[tracing::instrument(skip_all, fields(kernel = desc.kernel_name(), hw = %desc.hw))]
pub fn compile_gemm_with(desc: &GemmIrDesc, cset: ConstraintSet, config: &BuildConfig) -> Result<GemmKernel> {
    let build = build_ir_with(desc, cset, config)?;
    let ctx = desc.compile_ctx();
    let manifest = setup_interface(&ctx, &build.body)?;
    Ok(GemmKernel { body: build.body, manifest, ctx, constraints: build.constraints })
}
