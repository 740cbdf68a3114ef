//! GEMM kernel builder.
//!
//! - [`problem`] - Types and memory layouts of the operands
//! - [`strategy`] - Tiling, transfer and pipelining choices
//! - [`kloop`] - Software-pipelined reduction loop
//! - [`mma`] - Multiply-accumulate emission
//! - [`build`] - Kernel body construction

pub mod build;
pub mod kloop;
pub mod mma;
pub mod problem;
pub mod strategy;

pub use build::{GemmBuild, GemmIrDesc, KERNEL_NAME, build_ir, build_ir_with, check_supported, standard_iface};
pub use kloop::{KLoopConfig, KLoopIterator, Phase, PipelineTrace, Stage, TensorConfig, TraceEntry, build_k_loop};
pub use mma::{MmaOperands, mma};
pub use problem::{GemmProblem, MatrixAddressing, MatrixLayout};
pub use strategy::{GemmStrategy, MatrixStrategy};
