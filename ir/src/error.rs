use snafu::Snafu;
use tessel_dtype::DType;

use crate::layout::Dim;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    // =========================================================================
    // Build-contract violations (bugs in the calling strategy code)
    // =========================================================================
    /// A kernel was declared while another one is still being built.
    #[snafu(display("invalid generation of a kernel within a kernel (scope depth {depth})"))]
    KernelAlreadyOpen { depth: usize },

    /// `end_kernel` found open scopes other than the kernel scope.
    #[snafu(display("invalid end of kernel, imbalanced scopes detected: expected depth 1, found {depth}"))]
    ScopeImbalance { depth: usize },

    /// A statement was emitted while no scope is open.
    #[snafu(display("cannot instantiate {what} outside of a kernel"))]
    NoOpenScope { what: String },

    /// A variable is referenced outside of the subtree that binds it.
    #[snafu(display("variable '{name}' (id {id}) is used outside of its scope"))]
    UnboundVariable { name: String, id: u64 },

    /// The kernel interface has no argument with this name.
    #[snafu(display("kernel interface has no argument named '{name}'"))]
    UnknownArgument { name: String },

    /// Register allocations can only be zero-initialised.
    #[snafu(display("allocation '{name}' can only be initialised with zero, got {init}"))]
    NonZeroAllocInit { name: String, init: String },

    /// A tile dimension is not a multiple of the requested step.
    #[snafu(display("tile size {size} along {dim} is not divisible by {step}"))]
    TileNotDivisible { dim: Dim, size: i64, step: i64 },

    /// Coordinate or tile refers to a dimension the layout does not have.
    #[snafu(display("dimension {dim} is not part of the layout"))]
    MissingDimension { dim: Dim },

    /// Condition of an if/while must be boolean.
    #[snafu(display("condition must be bool, got {actual}"))]
    ConditionNotBool { actual: DType },
}

impl Error {
    /// Contract violations indicate a bug in the code driving the builder,
    /// as opposed to a reportable unsupported configuration.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::KernelAlreadyOpen { .. }
                | Self::ScopeImbalance { .. }
                | Self::NoOpenScope { .. }
                | Self::UnboundVariable { .. }
                | Self::UnknownArgument { .. }
                | Self::NonZeroAllocInit { .. }
                | Self::TileNotDivisible { .. }
                | Self::MissingDimension { .. }
                | Self::ConditionNotBool { .. }
        )
    }
}
