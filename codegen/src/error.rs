//! Error types for the lowering handoff.

use snafu::Snafu;

use crate::types::Capability;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Error from the IR layer.
    #[snafu(display("IR error: {source}"), context(false))]
    Ir { source: tessel_ir::Error },

    /// Error while building the kernel body.
    #[snafu(display("schedule error: {source}"), context(false))]
    Schedule { source: tessel_schedule::Error },

    /// Declared SLM does not fit the thread-group budget.
    #[snafu(display(
        "resource limit exceeded: {slm_bytes} bytes of SLM requested, {limit} available per thread group of {thread_group_size}"
    ))]
    ResourceLimitExceeded { slm_bytes: i64, limit: i64, thread_group_size: i64 },

    /// The kernel needs a capability the encoder cannot emit.
    #[snafu(display("{backend} encoder cannot emit {capability}"))]
    UnsupportedCapability { backend: String, capability: Capability },
}

impl Error {
    /// Contract violations are bugs in the code that built the kernel;
    /// resource and capability failures are reported to the caller.
    pub fn is_contract_violation(&self) -> bool {
        match self {
            Self::Ir { source } => source.is_contract_violation(),
            Self::Schedule { source } => source.is_contract_violation(),
            Self::ResourceLimitExceeded { .. } | Self::UnsupportedCapability { .. } => false,
        }
    }
}
