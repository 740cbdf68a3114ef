//! Error types for planning and scheduling.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Error from the IR layer.
    #[snafu(display("IR error: {source}"), context(false))]
    Ir { source: tessel_ir::Error },

    // =========================================================================
    // Build-contract violations
    // =========================================================================
    /// Linear block transfers move whole 16-byte units.
    #[snafu(display("block transfer width of {width_bytes} bytes is not a multiple of 16"))]
    BlockWidthMisaligned { width_bytes: i64 },

    /// Copy depths, unroll and stage blocks do not fit together.
    #[snafu(display("pipeline misconfigured: {reason}"))]
    PipelineMisconfigured { reason: String },

    /// Tile or layout does not match the shape of a compute instruction.
    #[snafu(display("invalid instruction shape: {reason}"))]
    InstructionShape { reason: String },

    // =========================================================================
    // Reported failures
    // =========================================================================
    /// A transfer or compute path exists but is not built yet.
    #[snafu(display("{feature} is not implemented"))]
    NotImplemented { feature: String },

    /// The strategy asks for something this builder does not support.
    #[snafu(display("{feature} support is unimplemented"))]
    Unsupported { feature: String },
}

impl Error {
    /// Contract violations are bugs in the strategy or in the builder itself;
    /// everything else can be handled by picking another strategy.
    pub fn is_contract_violation(&self) -> bool {
        match self {
            Self::Ir { source } => source.is_contract_violation(),
            Self::BlockWidthMisaligned { .. } | Self::PipelineMisconfigured { .. } | Self::InstructionShape { .. } => {
                true
            }
            Self::NotImplemented { .. } | Self::Unsupported { .. } => false,
        }
    }
}
