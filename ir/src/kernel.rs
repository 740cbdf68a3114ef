//! Kernel interface, hardware model and compile context.

use smallvec::SmallVec;
use tessel_dtype::DType;

use crate::expr::Var;

// ============================================================================
// Kernel interface
// ============================================================================

/// Ordered kernel arguments.
#[derive(Debug, Clone, Default)]
pub struct KernelIface {
    args: SmallVec<[Var; 16]>,
}

impl KernelIface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_arg(&mut self, name: &str, dtype: DType) -> Var {
        let var = Var::new(name, dtype);
        self.args.push(var.clone());
        var
    }

    pub fn with_arg(mut self, name: &str, dtype: DType) -> Self {
        self.add_arg(name, dtype);
        self
    }

    pub fn find_arg(&self, name: &str) -> Option<&Var> {
        self.args.iter().find(|a| a.name() == name)
    }

    pub fn args(&self) -> &[Var] {
        &self.args
    }

    pub fn nargs(&self) -> usize {
        self.args.len()
    }
}

// ============================================================================
// Hardware
// ============================================================================

/// Target GPU generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::AsRefStr, strum::EnumIter)]
pub enum Hw {
    XeLp,
    XeHp,
    XeHpg,
    XeHpc,
    Xe2,
    Xe3,
}

impl Hw {
    /// Bytes per general register.
    pub const fn grf_size(self) -> i64 {
        match self {
            Self::XeLp | Self::XeHp | Self::XeHpg => 32,
            Self::XeHpc | Self::Xe2 | Self::Xe3 => 64,
        }
    }

    pub const fn has_systolic(self) -> bool {
        !matches!(self, Self::XeLp)
    }

    /// Hardware threads per EU; the large register file halves occupancy.
    pub const fn threads_per_eu(self, large_grf: bool) -> i64 {
        match (self, large_grf) {
            (Self::XeLp, _) => 7,
            (_, true) => 4,
            (_, false) => 8,
        }
    }

    pub const fn eus_per_subslice(self) -> i64 {
        match self {
            Self::XeLp | Self::XeHp | Self::XeHpg => 16,
            Self::XeHpc | Self::Xe2 | Self::Xe3 => 8,
        }
    }

    pub const fn slm_per_subslice(self) -> i64 {
        match self {
            Self::XeLp => 64 * 1024,
            _ => 128 * 1024,
        }
    }

    /// Hard per-thread-group SLM cap.
    pub const fn slm_per_thread_group_cap(self) -> i64 {
        match self {
            Self::XeLp | Self::XeHp | Self::XeHpg => 64 * 1024,
            Self::XeHpc | Self::Xe2 | Self::Xe3 => 128 * 1024,
        }
    }

    /// SLM available to one thread group of `tg_size` threads when the
    /// sub-slice is filled with as many such groups as fit.
    pub fn max_slm_per_thread_group(self, tg_size: i64, large_grf: bool) -> i64 {
        let threads = self.threads_per_eu(large_grf) * self.eus_per_subslice();
        let groups_per_subslice = (threads / tg_size.max(1)).max(1);
        (self.slm_per_subslice() / groups_per_subslice).min(self.slm_per_thread_group_cap())
    }
}

/// Register budget and SIMD width of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecConfig {
    pub hw: Hw,
    /// Number of general registers.
    pub regs: u32,
    pub simd: u32,
}

impl ExecConfig {
    pub fn new(hw: Hw, regs: u32, simd: u32) -> Self {
        Self { hw, regs, simd }
    }

    pub fn grf_size(&self) -> i64 {
        self.hw.grf_size()
    }

    pub fn is_large_grf(&self) -> bool {
        self.regs > 128
    }
}

/// Everything the lowering handoff needs besides the kernel body.
#[derive(Debug, Clone)]
pub struct CompileCtx {
    pub kernel_name: String,
    pub iface: KernelIface,
    pub exec: ExecConfig,
    /// Fixed thread-group size, or zero when chosen at launch.
    pub thread_group_size: i64,
}

impl CompileCtx {
    pub fn new(kernel_name: impl Into<String>, iface: KernelIface, exec: ExecConfig, thread_group_size: i64) -> Self {
        Self { kernel_name: kernel_name.into(), iface, exec, thread_group_size }
    }

    pub fn hw(&self) -> Hw {
        self.exec.hw
    }
}
