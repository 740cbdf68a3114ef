//! Intermediate representation for Tessel GEMM kernels.
//!
//! # Module Organization
//!
//! - [`types`] - Constants, operator kinds and transfer enums
//! - [`expr`] - Typed, folding expression nodes and variables
//! - [`stmt`] - Statement tree
//! - [`layout`] - Named dimensions, tiles and blocked layouts
//! - [`constraint`] - Build-time assumptions and the prover behind them
//! - [`kernel`] - Kernel interface, hardware model and compile context
//! - [`builder`] - Procedural construction with scope folding
//! - [`validate`] - Scope checks on finished trees
//! - [`visit`] - Traversal helpers
//! - [`tree`] - ASCII tree rendering
//! - [`error`] - Error types and result handling

pub mod builder;
pub mod constraint;
pub mod error;
pub mod expr;
pub mod kernel;
pub mod layout;
pub mod prelude;
pub mod stmt;
pub mod tree;
pub mod types;
pub mod validate;
pub mod visit;


pub use builder::Builder;
pub use constraint::ConstraintSet;
pub use error::{Error, Result};
pub use expr::{Expr, ExprKind, Var};
pub use kernel::{CompileCtx, ExecConfig, Hw, KernelIface};
pub use layout::{Coord, Dim, DimMap, GlobalTensor, Layout, Tensor, Tile};
pub use stmt::{Block2d, DpasStmt, MadStmt, SendShape, SendStmt, Stmt};
pub use types::{AllocKind, BinaryOp, CacheHint, ConstValue, SendOp, UnaryOp};

pub use tessel_dtype::{AddrSpace, DType, ScalarDType};
