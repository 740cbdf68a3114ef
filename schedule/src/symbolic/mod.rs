//! Constraint-driven simplification of built kernels.

pub mod simplify;

pub use simplify::{SimplifyStats, simplify, simplify_with_stats};
