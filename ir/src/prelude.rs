//! Common imports for building kernels.
//!
//! ```rust,ignore
//! use tessel_ir::prelude::*;
//! ```

// Core nodes
pub use crate::expr::{Expr, ExprKind, Var};
pub use crate::stmt::{Block2d, DpasStmt, MadStmt, SendShape, SendStmt, Stmt};

// Operation types
pub use crate::types::{AllocKind, BinaryOp, CacheHint, ConstValue, SendOp, UnaryOp};

// Construction
pub use crate::builder::Builder;
pub use crate::constraint::ConstraintSet;
pub use crate::kernel::{CompileCtx, ExecConfig, Hw, KernelIface};
pub use crate::layout::{Coord, Dim, DimMap, GlobalTensor, Layout, Tensor, Tile};

// Re-exports from dependencies
pub use tessel_dtype::{AddrSpace, DType, ScalarDType};
