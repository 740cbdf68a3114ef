//! GEMM scheduling for Tessel kernels.
//!
//! Turns a GEMM problem and strategy into an IR kernel body: memory
//! transfers, a software-pipelined reduction loop and the multiply-accumulate
//! sweep, followed by constraint-aware simplification.
//!
//! # Module Organization
//!
//! - [`transfer`] - Transfer plans and `Send` emission
//! - [`gemm`] - Problem, strategy, k-loop and kernel construction
//! - [`symbolic`] - Simplification of the finished body
//! - [`config`] - Build switches
//! - [`error`] - Error types and result handling

pub mod config;
pub mod error;
pub mod gemm;
pub mod symbolic;
pub mod transfer;

#[cfg(test)]
pub mod test;

pub use config::BuildConfig;
pub use error::{Error, Result};
pub use gemm::{GemmBuild, GemmIrDesc, GemmProblem, GemmStrategy, MatrixStrategy, build_ir, build_ir_with};
pub use symbolic::simplify;
pub use transfer::{AccessType, Transform, TransformKind, load, prefetch, store};
