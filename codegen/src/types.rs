//! Manifest and image types handed to and produced by encoders.

use enumset::EnumSet;
use tessel_dtype::DType;
use tessel_ir::Hw;

/// How a pointer argument is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ArgAccess {
    /// Raw 64-bit global address.
    #[default]
    Stateless,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    GlobalPtr { access: ArgAccess, mutable: bool },
    Scalar(DType),
}

impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GlobalPtr { access, mutable: true } => write!(f, "global_ptr({access}, mut)"),
            Self::GlobalPtr { access, mutable: false } => write!(f, "global_ptr({access})"),
            Self::Scalar(dtype) => write!(f, "{dtype}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelArg {
    pub name: String,
    pub kind: ArgKind,
}

/// Hardware features a kernel requests from the encoder.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::AsRefStr, strum::EnumIter)]
#[derive(enumset::EnumSetType)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    /// Matrix-engine (`dpas`) instructions.
    Systolic,
    /// Cross-thread atomics on global memory.
    GlobalAtomics,
    /// Thread-group barrier.
    Barrier,
}

/// Everything an encoder needs besides the body.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelManifest {
    pub name: String,
    pub hw: Hw,
    pub args: Vec<KernelArg>,
    /// Number of local-id builtins requested.
    pub local_ids: usize,
    pub local_size: bool,
    pub regs: u32,
    pub simd: u32,
    pub capabilities: EnumSet<Capability>,
    pub slm_bytes: i64,
    /// Fixed thread-group size, or zero.
    pub thread_group_size: i64,
}

impl KernelManifest {
    pub fn find_arg(&self, name: &str) -> Option<&KernelArg> {
        self.args.iter().find(|a| a.name == name)
    }
}

/// Encoded kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelImage {
    pub name: String,
    pub backend: String,
    pub code: Vec<u8>,
    pub manifest: KernelManifest,
}

impl KernelImage {
    /// The image as text, for encoders that produce listings.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.code).ok()
    }
}
