//! Type definitions for IR nodes.
//!
//! Constants, operator kinds, allocation kinds and memory-transfer enums shared
//! by [`crate::expr`] and [`crate::stmt`].

use std::hash::{Hash, Hasher};
use std::mem::discriminant;

use tessel_dtype::{DType, ScalarDType};

/// Constant value that can be stored in an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant(self).hash(state);
        match self {
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Bool(v) => v.hash(state),
        }
    }
}

impl ConstValue {
    pub const fn zero(dtype: ScalarDType) -> Self {
        if dtype.is_bool() {
            Self::Bool(false)
        } else if dtype.is_float() {
            Self::Float(0.0)
        } else {
            Self::Int(0)
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Self::Int(v) => *v == 0,
            Self::Float(v) => *v == 0.0,
            Self::Bool(v) => !*v,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(*v as i64),
            Self::Float(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            Self::Float(_) => None,
        }
    }

    /// Convert this constant to the representation used by `dtype`.
    ///
    /// Integers are truncated to the target width the way `as` does.
    pub fn cast(&self, dtype: &DType) -> Option<Self> {
        let scalar = dtype.scalar()?;
        Some(match (*self, scalar) {
            (v, ScalarDType::Bool) => Self::Bool(v.as_bool().unwrap_or_else(|| v.as_f64() != 0.0)),
            (Self::Float(v), s) if s.is_int() => Self::Int(truncate(v as i64, s)),
            (v, s) if s.is_int() => Self::Int(truncate(v.as_int()?, s)),
            (v, s) if s.is_float() => Self::Float(v.as_f64()),
            _ => return None,
        })
    }

    fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
            Self::Bool(v) => *v as u8 as f64,
        }
    }
}

fn truncate(v: i64, to: ScalarDType) -> i64 {
    use ScalarDType::*;
    match to {
        S8 => v as i8 as i64,
        U8 => v as u8 as i64,
        S16 => v as i16 as i64,
        U16 => v as u16 as i64,
        S32 => v as i32 as i64,
        U32 => v as u32 as i64,
        _ => v,
    }
}

impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Unary operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    /// Arithmetic negation: -x
    Neg,
    /// Logical negation: !x (bool only)
    Not,
}

/// Binary operation types.
///
/// Arithmetic operations preserve the operand dtype, comparisons and logical
/// operations produce `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Integer division truncated toward zero.
    Div,
    /// C-style remainder, sign of the dividend.
    Mod,
    Min,
    Max,

    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,

    /// Logical and (bool operands).
    And,
    /// Logical or (bool operands).
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::Min | Self::Max | Self::Eq | Self::Ne | Self::And | Self::Or)
    }

    /// Operator with its operands swapped: `a op b == b op.swapped() a`.
    pub fn swapped(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            other => other,
        }
    }

    /// Infix symbol used by listings and tree rendering.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Min => "min",
            Self::Max => "max",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Storage kind of an `Alloc` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AllocKind {
    /// Device memory passed in as a kernel argument.
    Global,
    /// Shared local memory, counted against the thread-group budget.
    Slm,
    /// Register file.
    Grf,
}

/// Memory transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SendOp {
    Load,
    Store,
    Prefetch,
    AtomicAdd,
}

impl SendOp {
    pub fn is_atomic(self) -> bool {
        matches!(self, Self::AtomicAdd)
    }

    /// Prefetches only touch the cache and never bind a register buffer.
    pub fn has_payload(self) -> bool {
        !matches!(self, Self::Prefetch)
    }
}

/// Cache control requested for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CacheHint {
    #[default]
    Default,
    Uncached,
    Cached,
    Streaming,
    WriteBack,
}
